use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, ValidationError};

/// How often a recurring obligation falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Number of calendar months between two consecutive occurrences.
    pub const fn step_months(self) -> u32 {
        match self {
            Frequency::Monthly => 1,
            Frequency::Quarterly => 3,
            Frequency::Yearly => 12,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    /// Accepts the English labels and the French ones stored by older clients.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "monthly" | "mensuel" => Ok(Frequency::Monthly),
            "quarterly" | "trimestriel" => Ok(Frequency::Quarterly),
            "yearly" | "annual" | "annuel" => Ok(Frequency::Yearly),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown frequency '{}'",
                other
            )))),
        }
    }
}

/// A recurring obligation's calendar: frequency, wanted day of month and the
/// date that fixes which months of the cycle are in phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub anchor_day: u32,
    pub phase_anchor: NaiveDate,
}

impl RecurrenceRule {
    /// Builds a rule, rejecting anchor days outside `1..=31`.
    pub fn new(frequency: Frequency, anchor_day: u32, phase_anchor: NaiveDate) -> Result<Self> {
        if !(1..=31).contains(&anchor_day) {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Anchor day must be between 1 and 31, got {}",
                anchor_day
            ))));
        }
        Ok(Self {
            frequency,
            anchor_day,
            phase_anchor,
        })
    }

    /// Same as [`RecurrenceRule::new`] but treats a missing or zero day as the 1st,
    /// which is how unset configuration rows are interpreted.
    pub fn with_optional_day(
        frequency: Frequency,
        anchor_day: Option<i32>,
        phase_anchor: NaiveDate,
    ) -> Result<Self> {
        let day = match anchor_day {
            None | Some(0) => 1,
            Some(d) if d < 0 => {
                return Err(Error::Validation(ValidationError::InvalidInput(format!(
                    "Anchor day must be between 1 and 31, got {}",
                    d
                ))))
            }
            Some(d) => d as u32,
        };
        Self::new(frequency, day, phase_anchor)
    }
}
