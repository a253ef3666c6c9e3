//! Selectable grant durations.

use core::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error parsing an [`Expiration`] from an option value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported expiration `{0}` (expected one of 1, 6, 12, 24)")]
pub struct ExpirationError(pub String);

/// How long a granted membership lives before it is revoked.
///
/// Serialized as the number of hours in a string (`"6"`), which is both the
/// select option value and the payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Expiration {
    OneHour,
    SixHours,
    TwelveHours,
    OneDay,
}

impl Expiration {
    /// All selectable expirations, in display order.
    pub const ALL: [Self; 4] = [Self::OneHour, Self::SixHours, Self::TwelveHours, Self::OneDay];

    /// Number of whole hours.
    #[must_use]
    pub const fn hours(self) -> u64 {
        match self {
            Self::OneHour => 1,
            Self::SixHours => 6,
            Self::TwelveHours => 12,
            Self::OneDay => 24,
        }
    }

    /// Option value used in select menus and payloads (`"6"`).
    #[must_use]
    pub const fn value(self) -> &'static str {
        match self {
            Self::OneHour => "1",
            Self::SixHours => "6",
            Self::TwelveHours => "12",
            Self::OneDay => "24",
        }
    }

    /// Human label (`"6h"`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::TwelveHours => "12h",
            Self::OneDay => "24h",
        }
    }

    /// The grant lifetime as a duration.
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_secs(self.hours() * 3600)
    }

    /// Parse from an option value.
    ///
    /// # Errors
    ///
    /// Returns an error for anything other than `1`, `6`, `12` or `24`.
    pub fn parse(value: &str) -> Result<Self, ExpirationError> {
        match value.trim() {
            "1" => Ok(Self::OneHour),
            "6" => Ok(Self::SixHours),
            "12" => Ok(Self::TwelveHours),
            "24" => Ok(Self::OneDay),
            other => Err(ExpirationError(other.to_owned())),
        }
    }
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<String> for Expiration {
    type Error = ExpirationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Expiration> for String {
    fn from(expiration: Expiration) -> Self {
        expiration.value().to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_values() {
        assert_eq!(Expiration::parse("1"), Ok(Expiration::OneHour));
        assert_eq!(Expiration::parse("6"), Ok(Expiration::SixHours));
        assert_eq!(Expiration::parse("12"), Ok(Expiration::TwelveHours));
        assert_eq!(Expiration::parse("24"), Ok(Expiration::OneDay));
    }

    #[test]
    fn test_parse_rejects_other_values() {
        assert!(Expiration::parse("0").is_err());
        assert!(Expiration::parse("48").is_err());
        assert!(Expiration::parse("").is_err());
        assert!(Expiration::parse("6h").is_err());
    }

    #[test]
    fn test_duration_matches_hours() {
        assert_eq!(Expiration::SixHours.as_duration(), Duration::from_secs(21_600));
        for expiration in Expiration::ALL {
            assert_eq!(expiration.as_duration().as_secs(), expiration.hours() * 3600);
        }
    }

    #[test]
    fn test_serializes_as_hour_string() {
        let json = serde_json::to_string(&Expiration::TwelveHours).expect("serialize");
        assert_eq!(json, "\"12\"");
        assert_eq!(Expiration::TwelveHours.label(), "12h");
    }
}
