//! Final race times with millisecond precision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A swimmer's final time, stored as whole milliseconds.
///
/// Serialized as an integer number of milliseconds. Deserialization also
/// accepts the text forms shown on timing consoles: `"32.45"` (seconds)
/// and `"1:02.37"` (minutes and seconds).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(try_from = "RaceTimeRepr", into = "u32")]
#[schema(value_type = u32)]
pub struct RaceTime(u32);

impl RaceTime {
    /// Creates a time from whole milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Returns the time in whole milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RaceTime {
    /// Formats as `ss.cc` below one minute and `m:ss.cc` above, truncating
    /// to hundredths like a scoreboard.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hundredths = self.0 / 10;
        let minutes = hundredths / 6_000;
        let seconds = (hundredths / 100) % 60;
        let fraction = hundredths % 100;
        if minutes > 0 {
            write!(f, "{minutes}:{seconds:02}.{fraction:02}")
        } else {
            write!(f, "{seconds}.{fraction:02}")
        }
    }
}

/// Error returned when a textual race time cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid race time: {0:?}")]
pub struct ParseRaceTimeError(String);

impl FromStr for RaceTime {
    type Err = ParseRaceTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRaceTimeError(s.to_string());
        let trimmed = s.trim();
        let (minutes, rest) = match trimmed.split_once(':') {
            Some((m, rest)) => (m.parse::<u32>().map_err(|_| err())?, rest),
            None => (0, trimmed),
        };
        let (whole, fraction) = rest.split_once('.').unwrap_or((rest, ""));
        let seconds: u32 = whole.parse().map_err(|_| err())?;
        if minutes > 0 && seconds >= 60 {
            return Err(err());
        }
        if fraction.len() > 3 || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        // Right-pad to milliseconds: "45" -> 450, "4" -> 400.
        let millis_part = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<3}");
            padded.parse::<u32>().map_err(|_| err())?
        };
        minutes
            .checked_mul(60_000)
            .and_then(|m| seconds.checked_mul(1_000).and_then(|s| m.checked_add(s)))
            .and_then(|total| total.checked_add(millis_part))
            .map(Self)
            .ok_or_else(err)
    }
}

impl From<RaceTime> for u32 {
    fn from(time: RaceTime) -> Self {
        time.0
    }
}

/// Accepted wire representations of a race time.
#[derive(Deserialize)]
#[serde(untagged)]
enum RaceTimeRepr {
    Millis(u32),
    Text(String),
}

impl TryFrom<RaceTimeRepr> for RaceTime {
    type Error = ParseRaceTimeError;

    fn try_from(repr: RaceTimeRepr) -> Result<Self, Self::Error> {
        match repr {
            RaceTimeRepr::Millis(ms) => Ok(Self(ms)),
            RaceTimeRepr::Text(text) => text.parse(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_with_hundredths() {
        assert_eq!("32.45".parse::<RaceTime>(), Ok(RaceTime::from_millis(32_450)));
        assert_eq!("31.9".parse::<RaceTime>(), Ok(RaceTime::from_millis(31_900)));
    }

    #[test]
    fn parses_minutes() {
        assert_eq!("1:02.37".parse::<RaceTime>(), Ok(RaceTime::from_millis(62_370)));
    }

    #[test]
    fn rejects_garbage() {
        assert!("abc".parse::<RaceTime>().is_err());
        assert!("1:75.00".parse::<RaceTime>().is_err());
        assert!("12.3456".parse::<RaceTime>().is_err());
        assert!("12.-5".parse::<RaceTime>().is_err());
    }

    #[test]
    fn displays_like_a_scoreboard() {
        assert_eq!(RaceTime::from_millis(31_980).to_string(), "31.98");
        assert_eq!(RaceTime::from_millis(62_375).to_string(), "1:02.37");
        assert_eq!(RaceTime::from_millis(5_000).to_string(), "5.00");
    }

    #[test]
    fn deserializes_number_and_text() {
        let Ok(a) = serde_json::from_str::<RaceTime>("32450") else {
            panic!("numeric form rejected");
        };
        let Ok(b) = serde_json::from_str::<RaceTime>("\"32.45\"") else {
            panic!("text form rejected");
        };
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).ok().as_deref(), Some("32450"));
    }
}
