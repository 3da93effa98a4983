//! Age categories and the category/distance resolver.
//!
//! A swimmer's [`Category`] is never stored: it is derived from the birth
//! date at resolution time. The resolver maps a swimmer to the distance
//! they swim in an event, and a distance back to the categories that swim
//! it. All functions here are pure.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::meet::{Distance, Event, Swimmer};

/// Age band of a swimmer, derived from the age reached in the competition
/// year.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
pub enum Category {
    /// 8 and under.
    #[serde(rename = "pre_minima")]
    PreMinima,
    /// 9.
    #[serde(rename = "minima_1")]
    Minima1,
    /// 10.
    #[serde(rename = "minima_2")]
    Minima2,
    /// 11.
    #[serde(rename = "infantil_1")]
    Infantil1,
    /// 12.
    #[serde(rename = "infantil_2")]
    Infantil2,
    /// 13.
    #[serde(rename = "juvenil_1")]
    Juvenil1,
    /// 14.
    #[serde(rename = "juvenil_2")]
    Juvenil2,
    /// 15.
    #[serde(rename = "junior_1")]
    Junior1,
    /// 16.
    #[serde(rename = "junior_2")]
    Junior2,
    /// 17 to 24.
    #[serde(rename = "senior")]
    Senior,
    /// 25 and over.
    #[serde(rename = "master")]
    Master,
}

impl Category {
    /// All categories, youngest first.
    pub const ALL: [Self; 11] = [
        Self::PreMinima,
        Self::Minima1,
        Self::Minima2,
        Self::Infantil1,
        Self::Infantil2,
        Self::Juvenil1,
        Self::Juvenil2,
        Self::Junior1,
        Self::Junior2,
        Self::Senior,
        Self::Master,
    ];

    /// Derives the category of someone born on `birth_date`, evaluated on
    /// `on`. Only the years matter: the age is the one reached during the
    /// competition year.
    #[must_use]
    pub fn for_birth_date(birth_date: NaiveDate, on: NaiveDate) -> Self {
        let age = on.year().saturating_sub(birth_date.year());
        match age {
            i32::MIN..=8 => Self::PreMinima,
            9 => Self::Minima1,
            10 => Self::Minima2,
            11 => Self::Infantil1,
            12 => Self::Infantil2,
            13 => Self::Juvenil1,
            14 => Self::Juvenil2,
            15 => Self::Junior1,
            16 => Self::Junior2,
            17..=24 => Self::Senior,
            _ => Self::Master,
        }
    }

    /// Returns the wire code of the category.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PreMinima => "pre_minima",
            Self::Minima1 => "minima_1",
            Self::Minima2 => "minima_2",
            Self::Infantil1 => "infantil_1",
            Self::Infantil2 => "infantil_2",
            Self::Juvenil1 => "juvenil_1",
            Self::Juvenil2 => "juvenil_2",
            Self::Junior1 => "junior_1",
            Self::Junior2 => "junior_2",
            Self::Senior => "senior",
            Self::Master => "master",
        }
    }

    /// Parses a wire code. Unknown codes yield `None`.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Category of `swimmer` on the given date.
#[must_use]
pub fn category_of(swimmer: &Swimmer, on: NaiveDate) -> Category {
    Category::for_birth_date(swimmer.birth_date, on)
}

/// Distance `swimmer` swims in `event`: the category override when there
/// is one, the general distance otherwise.
#[must_use]
pub fn resolve(event: &Event, swimmer: &Swimmer, on: NaiveDate) -> Distance {
    let category = category_of(swimmer, on);
    event
        .category_distance_overrides
        .get(category.code())
        .copied()
        .unwrap_or(event.general_distance)
}

/// Categories that swim `distance` in `event`.
///
/// Override categories mapping to `distance` are always included. When
/// `distance` is the general distance, every category present among
/// `known` swimmers joins too, except those that have an override: an
/// override wins even if it numerically equals the general distance. The
/// result is narrowed to the event's eligible categories when that set is
/// non-empty.
#[must_use]
pub fn eligible_categories_for(
    event: &Event,
    distance: Distance,
    known: &[Swimmer],
    on: NaiveDate,
) -> BTreeSet<Category> {
    let overridden: BTreeSet<Category> = event
        .category_distance_overrides
        .keys()
        .filter_map(|code| Category::from_code(code))
        .collect();

    let mut eligible: BTreeSet<Category> = event
        .category_distance_overrides
        .iter()
        .filter(|(_, d)| **d == distance)
        .filter_map(|(code, _)| Category::from_code(code))
        .collect();

    if distance == event.general_distance {
        eligible.extend(
            known
                .iter()
                .map(|s| category_of(s, on))
                .filter(|c| !overridden.contains(c)),
        );
    }

    if !event.eligible_categories.is_empty() {
        eligible.retain(|c| event.eligible_categories.contains(c.code()));
    }
    eligible
}
