use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Default timezone defining the business "today" of the ledger.
pub const DEFAULT_LEDGER_TZ: Tz = chrono_tz::Europe::Paris;

/// Converts a UTC instant to a ledger date in the given timezone.
///
/// Every instant-to-date conversion goes through here, including parsed
/// timestamps and epoch values.
pub fn ledger_date_from_utc(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// Today's date in the given timezone.
pub fn ledger_date_today(tz: Tz) -> NaiveDate {
    ledger_date_from_utc(Utc::now(), tz)
}

/// Parses a value date from the loosely formatted strings found in user input
/// and broker payloads, in the default ledger timezone.
pub fn parse_value_date(raw: &str) -> Option<NaiveDate> {
    parse_value_date_in(raw, DEFAULT_LEDGER_TZ)
}

/// Accepted shapes: `YYYY-MM-DD`, RFC 3339 (`Z` or offset), offsets without a
/// colon (`+0000`), naive date-times with or without fractional seconds.
/// Instants carrying an offset go through [`ledger_date_from_utc`]; plain
/// dates and naive date-times keep their written date.
pub fn parse_value_date_in(raw: &str, tz: Tz) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(ledger_date_from_utc(dt.with_timezone(&Utc), tz));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(ledger_date_from_utc(dt.with_timezone(&Utc), tz));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Converts epoch milliseconds to a ledger date in the default timezone.
pub fn date_from_epoch_millis(millis: i64) -> Option<NaiveDate> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|instant| ledger_date_from_utc(instant, DEFAULT_LEDGER_TZ))
}
