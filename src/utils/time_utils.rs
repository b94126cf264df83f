use chrono::{DateTime, NaiveDate, TimeZone, Utc};

// Dates travel as unix timestamps internally and as RFC 3339
// strings on the API. Forms are also allowed to send a bare date.
// chrono formatting reference:
// https://docs.rs/chrono/0.4.19/chrono/format/strftime/index.html
const DATE_FORMAT_COMPACT: &str = "%Y-%m-%d";

pub fn current_timestamp() -> i64 {
  Utc::now().timestamp()
}

pub fn timestamp_to_rfc3339(timestamp: i64) -> String {
  Utc
    .timestamp_opt(timestamp, 0)
    .single()
    // Out of range timestamps shouldn't happen with our data,
    // render the epoch rather than panic.
    .unwrap_or(DateTime::UNIX_EPOCH)
    .to_rfc3339()
}

// Accepts a full RFC 3339 datetime or a bare date, in which
// case we take midnight UTC.
pub fn parse_date_string(value: &str) -> Option<i64> {
  if let Ok(d) = DateTime::parse_from_rfc3339(value) {
    return Some(d.timestamp());
  }
  NaiveDate::parse_from_str(value, DATE_FORMAT_COMPACT)
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|d| Utc.from_utc_datetime(&d).timestamp())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamp_formats_as_expected() {
    let timestamp: i64 = 1615150740;
    let result = timestamp_to_rfc3339(timestamp);
    assert_eq!("2021-03-07T20:59:00+00:00", result);
  }

  #[test]
  fn rfc3339_string_parses_back() {
    let sut = "2021-03-07T20:59:00+00:00";
    assert_eq!(Some(1615150740), parse_date_string(sut));
  }

  #[test]
  fn bare_date_parses_to_midnight() {
    assert_eq!(Some(1615075200), parse_date_string("2021-03-07"));
  }

  #[test]
  fn garbage_date_is_none() {
    assert_eq!(None, parse_date_string("marzo de 2021"));
  }
}
