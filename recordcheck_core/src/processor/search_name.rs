/// Normalize one name component: hyphens become spaces, periods are dropped.
fn normalize_part(part: Option<&str>) -> String {
    part.unwrap_or("")
        .trim()
        .replace('-', " ")
        .replace('.', "")
}

/// Build the defendant search name as "LAST FIRST".
///
/// Repeated whitespace collapses to a single space. Returns `None` when
/// nothing searchable remains.
pub fn build_search_name(last_names: Option<&str>, first_names: Option<&str>) -> Option<String> {
    let joined = format!(
        "{} {}",
        normalize_part(last_names),
        normalize_part(first_names)
    );
    let name = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() { None } else { Some(name) }
}
