//! String format checks (`format` keyword)

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

/// Base used to resolve relative references for `uri-reference`
const REFERENCE_BASE: &str = "http://reference.invalid/";

/// Named string formats understood by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    DateTime,
    Date,
    Time,
    Uri,
    UriReference,
    Email,
    Hostname,
    Ipv4,
    Ipv6,
    Uuid,
    Regex,
}

impl Format {
    pub const ALL: [Format; 11] = [
        Format::DateTime,
        Format::Date,
        Format::Time,
        Format::Uri,
        Format::UriReference,
        Format::Email,
        Format::Hostname,
        Format::Ipv4,
        Format::Ipv6,
        Format::Uuid,
        Format::Regex,
    ];

    /// Keyword value used in schema documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::DateTime => "date-time",
            Format::Date => "date",
            Format::Time => "time",
            Format::Uri => "uri",
            Format::UriReference => "uri-reference",
            Format::Email => "email",
            Format::Hostname => "hostname",
            Format::Ipv4 => "ipv4",
            Format::Ipv6 => "ipv6",
            Format::Uuid => "uuid",
            Format::Regex => "regex",
        }
    }

    /// Whether `value` parses under this format's grammar
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Format::DateTime => DateTime::parse_from_rfc3339(value).is_ok(),
            Format::Date => is_full_date(value),
            Format::Time => is_full_time(value),
            Format::Uri => !has_whitespace(value) && Url::parse(value).is_ok(),
            Format::UriReference => is_uri_reference(value),
            Format::Email => EMAIL.is_match(value),
            Format::Hostname => is_hostname(value),
            Format::Ipv4 => value.parse::<Ipv4Addr>().is_ok(),
            Format::Ipv6 => value.parse::<Ipv6Addr>().is_ok(),
            Format::Uuid => is_hyphenated_uuid(value),
            Format::Regex => Regex::new(value).is_ok(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a schema names a format this validator does not know
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown format `{}`", self.0)
    }
}

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .iter()
            .copied()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

fn has_whitespace(value: &str) -> bool {
    value.chars().any(char::is_whitespace)
}

fn is_full_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

// RFC 3339 full-time: the offset is mandatory
fn is_full_time(value: &str) -> bool {
    !value.contains(['T', 't', ' '])
        && DateTime::parse_from_rfc3339(&format!("1970-01-01T{}", value)).is_ok()
}

fn is_uri_reference(value: &str) -> bool {
    if has_whitespace(value) {
        return false;
    }
    if Url::parse(value).is_ok() {
        return true;
    }
    Url::parse(REFERENCE_BASE)
        .and_then(|base| base.join(value))
        .is_ok()
}

fn is_hostname(value: &str) -> bool {
    let host = value.strip_suffix('.').unwrap_or(value);
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn is_hyphenated_uuid(value: &str) -> bool {
    let candidate = value.strip_prefix("urn:uuid:").unwrap_or(value);
    candidate.len() == 36 && uuid::Uuid::try_parse(candidate).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Format::DateTime, "2024-05-01T10:20:30Z", true)]
    #[test_case(Format::DateTime, "2024-05-01T10:20:30.123456+02:00", true)]
    #[test_case(Format::DateTime, "2024-05-01", false)]
    #[test_case(Format::DateTime, "2024-13-01T10:20:30Z", false)]
    #[test_case(Format::Date, "2024-02-29", true)]
    #[test_case(Format::Date, "2023-02-29", false)]
    #[test_case(Format::Date, "2024-2-9", false)]
    #[test_case(Format::Time, "10:20:30Z", true)]
    #[test_case(Format::Time, "10:20:30", false)]
    #[test_case(Format::Uri, "https://opensupplyhub.org/api/facilities/?page=2", true)]
    #[test_case(Format::Uri, "/api/facilities/", false)]
    #[test_case(Format::Uri, "https://example.org/a b", false)]
    #[test_case(Format::UriReference, "/api/facilities/?page=2", true)]
    #[test_case(Format::Email, "qa@opensupplyhub.org", true)]
    #[test_case(Format::Email, "not-an-email", false)]
    #[test_case(Format::Hostname, "api.opensupplyhub.org", true)]
    #[test_case(Format::Hostname, "-bad-.example", false)]
    #[test_case(Format::Ipv4, "192.168.0.1", true)]
    #[test_case(Format::Ipv4, "256.0.0.1", false)]
    #[test_case(Format::Ipv6, "::1", true)]
    #[test_case(Format::Uuid, "f47ac10b-58cc-4372-a567-0e02b2c3d479", true)]
    #[test_case(Format::Uuid, "f47ac10b58cc4372a5670e02b2c3d479", false)]
    #[test_case(Format::Regex, "^[A-Z]{2}$", true)]
    #[test_case(Format::Regex, "([", false)]
    fn format_grammar(format: Format, value: &str, expected: bool) {
        assert_eq!(format.matches(value), expected, "{} on {:?}", format, value);
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for format in Format::ALL {
            assert_eq!(format.as_str().parse::<Format>(), Ok(format));
        }
        assert_eq!(
            "phone".parse::<Format>(),
            Err(UnknownFormat("phone".to_string()))
        );
    }
}
