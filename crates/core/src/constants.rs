/// Decimal places kept for cash amounts.
pub const CASH_DECIMAL_PRECISION: u32 = 2;

/// Decimal places kept for unit prices.
pub const PRICE_DECIMAL_PRECISION: u32 = 4;

/// Name recorded in the job-run log for the daily materializer.
pub const MATERIALIZER_JOB_NAME: &str = "auto-events";

/// Maximum length of the summary message persisted on a job run.
pub const JOB_RUN_MESSAGE_MAX_CHARS: usize = 1000;

/// Maximum number of run details embedded in the job-run message.
pub const JOB_RUN_MESSAGE_MAX_DETAILS: usize = 20;
