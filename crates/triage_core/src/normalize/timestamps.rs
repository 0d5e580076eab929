use time::format_description::well_known::Rfc3339;
use time::{format_description, OffsetDateTime, PrimitiveDateTime, UtcOffset};

const DISPLAY_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second] UTC";

// Offset-less ISO-like forms, tried in order. These are assumed to be UTC.
const NAIVE_FORMATS: [&str; 5] = [
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]",
    "[year]-[month]-[day]T[hour]:[minute]:[second]",
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]",
    "[year]-[month]-[day] [hour]:[minute]:[second]",
    "[year]-[month]-[day]T[hour]:[minute]",
];

/// Current UTC time as RFC3339 (`Z` suffix).
pub fn now_rfc3339_utc() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn parse_naive_assume_utc(raw: &str, fmt: &str) -> Option<OffsetDateTime> {
    let items = format_description::parse(fmt).ok()?;
    PrimitiveDateTime::parse(raw, &items)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Parse an ISO-8601 event timestamp into UTC.
///
/// RFC3339 inputs are converted to UTC. Offset-less inputs from a deterministic allowlist
/// (with or without fractional seconds) are assumed to be UTC. Anything else is `None`.
pub fn parse_event_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(dt.to_offset(UtcOffset::UTC));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| parse_naive_assume_utc(trimmed, fmt))
}

/// Display form of an instant, `YYYY-MM-DD HH:MM:SS UTC`.
pub fn display_instant(dt: OffsetDateTime) -> String {
    let utc = dt.to_offset(UtcOffset::UTC);
    format_description::parse(DISPLAY_FORMAT)
        .ok()
        .and_then(|items| utc.format(&items).ok())
        .unwrap_or_else(|| utc.unix_timestamp().to_string())
}

/// Display form of an event timestamp; unparseable input is returned unchanged.
pub fn display_utc(raw: &str) -> String {
    match parse_event_timestamp(raw) {
        Some(dt) => display_instant(dt),
        None => raw.to_string(),
    }
}
