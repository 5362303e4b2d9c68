/// Run finished: grid or time budget exhausted, or stopped by the operator.
pub const SUCCESS: i32 = 0;
/// Configuration, reader or record store failure.
pub const FAILURE: i32 = 1;
