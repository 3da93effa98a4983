//! Externally owned meet data read by the engine: events and swimmers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{EventId, SwimmerId};

/// A race distance in metres.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
pub struct Distance(u32);

impl Distance {
    /// Creates a distance from metres.
    #[must_use]
    pub const fn meters(meters: u32) -> Self {
        Self(meters)
    }

    /// Returns the distance in metres.
    #[must_use]
    pub const fn as_meters(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

/// Swimming stroke of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stroke {
    /// Front crawl.
    Freestyle,
    /// Back crawl.
    Backstroke,
    /// Breaststroke.
    Breaststroke,
    /// Butterfly.
    Butterfly,
    /// Individual medley.
    IndividualMedley,
}

impl Stroke {
    /// Returns the stroke as its wire code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Freestyle => "freestyle",
            Self::Backstroke => "backstroke",
            Self::Breaststroke => "breaststroke",
            Self::Butterfly => "butterfly",
            Self::IndividualMedley => "individual_medley",
        }
    }

    /// Parses a wire code produced by [`Stroke::as_str`].
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "freestyle" => Some(Self::Freestyle),
            "backstroke" => Some(Self::Backstroke),
            "breaststroke" => Some(Self::Breaststroke),
            "butterfly" => Some(Self::Butterfly),
            "individual_medley" => Some(Self::IndividualMedley),
            _ => None,
        }
    }
}

/// Event configuration. Immutable for the duration of a meet.
///
/// Category codes are kept as raw strings because they come from an
/// external configuration screen; codes the engine does not recognise are
/// treated as part of the general bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// Display title.
    pub title: String,
    /// Number of lanes in the pool.
    pub lane_count: u8,
    /// Stroke swum in this event.
    pub stroke: Stroke,
    /// Distance for every category without an override.
    pub general_distance: Distance,
    /// Category code to distance overrides.
    #[serde(default)]
    pub category_distance_overrides: BTreeMap<String, Distance>,
    /// Category codes allowed to enter. Empty means unrestricted.
    #[serde(default)]
    pub eligible_categories: BTreeSet<String>,
}

impl Event {
    /// Returns every distance swum in this event, general distance first.
    #[must_use]
    pub fn distances(&self) -> Vec<Distance> {
        let mut out = vec![self.general_distance];
        for distance in self.category_distance_overrides.values() {
            if !out.contains(distance) {
                out.push(*distance);
            }
        }
        out
    }
}

/// A swimmer as returned by the external directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swimmer {
    /// Swimmer identifier.
    pub id: SwimmerId,
    /// Full name.
    pub name: String,
    /// Birth date, used to derive the category.
    pub birth_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances_deduplicates_overrides() {
        let event = Event {
            id: EventId::new(),
            title: "50 free".to_string(),
            lane_count: 4,
            stroke: Stroke::Freestyle,
            general_distance: Distance::meters(200),
            category_distance_overrides: BTreeMap::from([
                ("pre_minima".to_string(), Distance::meters(100)),
                ("minima_1".to_string(), Distance::meters(100)),
                ("senior".to_string(), Distance::meters(200)),
            ]),
            eligible_categories: BTreeSet::new(),
        };
        assert_eq!(
            event.distances(),
            vec![Distance::meters(200), Distance::meters(100)]
        );
    }

    #[test]
    fn stroke_codes_round_trip() {
        for stroke in [Stroke::Freestyle, Stroke::IndividualMedley, Stroke::Butterfly] {
            assert_eq!(Stroke::from_code(stroke.as_str()), Some(stroke));
        }
        assert_eq!(Stroke::from_code("dog_paddle"), None);
    }
}
