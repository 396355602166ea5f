//! Temporal recurrence engine.
//!
//! Pure calendar arithmetic for recurring obligations: which dates inside a
//! closed window are due for a given frequency, anchor day and phase anchor.

mod recurrence_model;
mod recurrence_service;


pub use recurrence_model::{Frequency, RecurrenceRule};
pub use recurrence_service::{clamp_day, days_in_month, due_date_at_offset, month_offset};
