use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("unknown consultation status: {0}")]
    UnknownConsultationStatus(String),
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| ParseError::InvalidId(s.to_string()))
            }
        }
    };
}

row_id!(
    /// Row identifier of a client record in the operational store.
    ClientId
);
row_id!(
    /// Row identifier of a processing attempt.
    ProcessId
);
row_id!(
    /// Row identifier of a persisted report.
    ReportId
);

/// Identifier attached to one processing attempt and its report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// `daemon_` followed by 12 lowercase hex characters.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("daemon_{}", &hex[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a client record; the status column doubles as the work queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConsultationStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Pending => "Pending",
            ConsultationStatus::Processing => "Processing",
            ConsultationStatus::Processed => "Processed",
            ConsultationStatus::Error => "Error",
        }
    }

    pub const ALL: [ConsultationStatus; 4] = [
        ConsultationStatus::Pending,
        ConsultationStatus::Processing,
        ConsultationStatus::Processed,
        ConsultationStatus::Error,
    ];
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ConsultationStatus::Pending),
            "Processing" => Ok(ConsultationStatus::Processing),
            "Processed" => Ok(ConsultationStatus::Processed),
            "Error" => Ok(ConsultationStatus::Error),
            other => Err(ParseError::UnknownConsultationStatus(other.to_string())),
        }
    }
}

/// Identity of one party on a loan application (applicant, spouse or co-signer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyIdentity {
    pub national_id: Option<String>,
    pub first_names: Option<String>,
    pub last_names: Option<String>,
}

impl PartyIdentity {
    pub fn new(
        national_id: Option<String>,
        first_names: Option<String>,
        last_names: Option<String>,
    ) -> Self {
        Self {
            national_id,
            first_names,
            last_names,
        }
    }

    /// "LAST FIRST" with surrounding whitespace trimmed; `None` when both are blank.
    pub fn display_name(&self) -> Option<String> {
        let last = self.last_names.as_deref().unwrap_or("").trim();
        let first = self.first_names.as_deref().unwrap_or("").trim();
        let joined = format!("{last} {first}");
        let joined = joined.trim();
        if joined.is_empty() {
            None
        } else {
            Some(joined.to_string())
        }
    }
}

/// Snapshot of a loan application as read from the system of record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub external_id: Option<i64>,
    pub submitted_on: Option<NaiveDate>,
    pub status_code: Option<String>,
    pub branch: Option<String>,
    pub product_id: Option<i64>,
    pub product: Option<String>,
    pub applicant: PartyIdentity,
    pub marital_status: Option<String>,
    pub spouse: PartyIdentity,
    pub co_signer: PartyIdentity,
}

/// Fields required to insert a client record; status and timestamps are set by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClient {
    pub external_id: Option<i64>,
    pub submitted_on: Option<NaiveDate>,
    pub status_code: Option<String>,
    pub branch: Option<String>,
    pub product_id: Option<i64>,
    pub product: Option<String>,
    pub applicant: PartyIdentity,
    pub marital_status: Option<String>,
    pub spouse: PartyIdentity,
    pub co_signer: PartyIdentity,
}

impl From<SourceRecord> for NewClient {
    fn from(r: SourceRecord) -> Self {
        Self {
            external_id: r.external_id,
            submitted_on: r.submitted_on,
            status_code: r.status_code,
            branch: r.branch,
            product_id: r.product_id,
            product: r.product,
            applicant: r.applicant,
            marital_status: r.marital_status,
            spouse: r.spouse,
            co_signer: r.co_signer,
        }
    }
}

/// Client record owned by the operational store. Rows are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub external_id: Option<i64>,
    pub submitted_on: Option<NaiveDate>,
    pub status_code: Option<String>,
    pub branch: Option<String>,
    pub product_id: Option<i64>,
    pub product: Option<String>,
    pub applicant: PartyIdentity,
    pub marital_status: Option<String>,
    pub spouse: PartyIdentity,
    pub co_signer: PartyIdentity,
    pub consultation_status: ConsultationStatus,
    pub created_at: DateTime<Utc>,
    pub last_consulted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_has_prefix_and_twelve_hex_chars() {
        let id = JobId::generate();
        let suffix = id.as_str().strip_prefix("daemon_").unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(JobId::generate(), id);
    }

    #[test]
    fn consultation_status_parses_its_own_names() {
        for status in ConsultationStatus::ALL {
            assert_eq!(status.as_str().parse::<ConsultationStatus>().unwrap(), status);
        }
        assert!("Pendiente".parse::<ConsultationStatus>().is_err());
    }

    #[test]
    fn display_name_skips_blank_parts() {
        let p = PartyIdentity::new(None, Some("  ANA ".into()), Some("".into()));
        assert_eq!(p.display_name().as_deref(), Some("ANA"));
        assert_eq!(PartyIdentity::default().display_name(), None);
    }
}
