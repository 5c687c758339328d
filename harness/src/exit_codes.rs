//! Stable exit codes for the suite CLI.

/// Every aggregated record passed (or only warnings were reported).
pub const OK: i32 = 0;
/// Command failed due to invalid config/suite/root or a report write error.
pub const INVALID: i32 = 1;
/// At least one FAIL or ERROR record was aggregated.
pub const FAILED: i32 = 2;
