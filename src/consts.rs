pub const DEFAULT_SOURCE_URL: &str = "http://localhost:27080/";
pub const DEFAULT_DATABASE: &str = "report";

/// Dashboards ask for large pages so that most series arrive in a single round-trip.
pub const DEFAULT_BATCH_SIZE: usize = 15000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub const FIND_COMMAND: &str = "_find";
pub const MORE_COMMAND: &str = "_more";
