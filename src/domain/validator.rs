//! Lane assignment validation.
//!
//! Decides whether a swimmer may be placed in a lane of a heat. The check is
//! pure: it only reads the heats it is given, so the controller can run it
//! both when an assignment is staged and again, against freshly loaded
//! heats, right before a heat starts.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use super::category::{self, Category};
use super::heat::Heat;
use super::meet::{Distance, Event, Swimmer};
use super::LaneId;

/// Why an assignment was refused. Variants are listed in check order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// The swimmer already holds another lane of the same heat.
    #[error("swimmer already assigned to lane {lane_number} of this heat")]
    AlreadyAssignedThisHeat {
        /// Lane the swimmer already holds.
        lane_id: LaneId,
        /// Its lane number.
        lane_number: u8,
    },
    /// The swimmer has a recorded time in an earlier heat.
    #[error("swimmer already competed in heat {heat}")]
    AlreadyCompeted {
        /// Earlier heat with the recorded time.
        heat: u32,
    },
    /// The swimmer's category does not swim the selected distance.
    #[error("category {category} does not swim {distance}")]
    NotEligibleForDistance {
        /// Swimmer's category.
        category: Category,
        /// Selected distance.
        distance: Distance,
    },
}

/// Outcome of [`LaneAssignmentValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// The assignment may be made.
    Eligible,
    /// The assignment is refused.
    Rejected(Rejection),
}

impl Eligibility {
    /// Converts to a `Result`, for use with `?`.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] when not eligible.
    pub fn into_result(self) -> Result<(), Rejection> {
        match self {
            Self::Eligible => Ok(()),
            Self::Rejected(r) => Err(r),
        }
    }
}

/// Validator bound to an event, its heats and the selected distance.
#[derive(Debug)]
pub struct LaneAssignmentValidator<'a> {
    heats: &'a [Heat],
    distance: Distance,
    eligible: BTreeSet<Category>,
    on: NaiveDate,
}

impl<'a> LaneAssignmentValidator<'a> {
    /// Builds a validator. `known` is the swimmer directory of the event;
    /// it defines which categories make up the general bucket.
    #[must_use]
    pub fn new(
        event: &Event,
        heats: &'a [Heat],
        distance: Distance,
        known: &[Swimmer],
        on: NaiveDate,
    ) -> Self {
        Self {
            heats,
            distance,
            eligible: category::eligible_categories_for(event, distance, known, on),
            on,
        }
    }

    /// Categories that may be placed at the selected distance.
    #[must_use]
    pub fn eligible_categories(&self) -> &BTreeSet<Category> {
        &self.eligible
    }

    /// Checks placing `swimmer` in `lane_id` of `heat`.
    ///
    /// Both persisted and staged occupants of the heat's other lanes count
    /// as "already assigned".
    #[must_use]
    pub fn validate(&self, heat: &Heat, lane_id: LaneId, swimmer: &Swimmer) -> Eligibility {
        if let Some(other) = heat
            .lanes
            .iter()
            .find(|l| l.id != lane_id && l.occupant() == Some(swimmer.id))
        {
            return Eligibility::Rejected(Rejection::AlreadyAssignedThisHeat {
                lane_id: other.id,
                lane_number: other.number,
            });
        }

        if let Some(earlier) = self
            .heats
            .iter()
            .filter(|h| h.number() < heat.number())
            .find(|h| h.timed(swimmer.id))
        {
            return Eligibility::Rejected(Rejection::AlreadyCompeted {
                heat: earlier.number(),
            });
        }

        let category = category::category_of(swimmer, self.on);
        if !self.eligible.contains(&category) {
            return Eligibility::Rejected(Rejection::NotEligibleForDistance {
                category,
                distance: self.distance,
            });
        }

        Eligibility::Eligible
    }
}
