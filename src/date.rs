use chrono::{Local, NaiveDate};

/// Cache key used when no explicit date was requested.
pub const TODAY_KEY: &str = "today";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// First day the APOD archive has an entry for.
pub fn first_apod_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1995, 6, 16).unwrap_or_default()
}

/// Returns the requested date when it is a well-formed `YYYY-MM-DD` inside
/// the archive range, `None` ("use today") for anything else.
pub fn normalize_date(input: Option<&str>, today: NaiveDate) -> Option<NaiveDate> {
    let date = parse_iso_date(input?)?;
    if date < first_apod_date() || date > today {
        return None;
    }
    Some(date)
}

/// `normalize_date` against the server's local calendar day.
pub fn normalize_date_today(input: Option<&str>) -> Option<NaiveDate> {
    normalize_date(input, Local::now().date_naive())
}

/// Strict `YYYY-MM-DD` parse without any range check.
pub fn parse_iso_date(input: &str) -> Option<NaiveDate> {
    if !has_iso_shape(input) {
        return None;
    }
    NaiveDate::parse_from_str(input, DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn cache_key(date: Option<NaiveDate>) -> String {
    date.map(format_date)
        .unwrap_or_else(|| TODAY_KEY.to_string())
}

// chrono alone accepts "2024-1-5" and signed years
fn has_iso_shape(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}
