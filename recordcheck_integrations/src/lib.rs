//! Concrete collaborators for recordcheck: the judicial case search client,
//! the file report renderer and the system-of-record extractor.

pub mod judicial;
pub mod report;
pub mod source;

pub use judicial::JudicialCaseFetcher;
pub use report::FileReportRenderer;
pub use source::SqliteSourceExtractor;
