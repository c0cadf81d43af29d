//! Default configuration values

/// Upper bound for one conversion run (in seconds)
pub const PACKAGING_TIMEOUT_SECS: u64 = 7200; // 2 hours

/// Timeout for a single page or form request (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Connect timeout for HTTP requests (in seconds)
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maximum attempts for fetching one catalog page
pub const MAX_SCRAPE_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff between page attempts (in milliseconds)
pub const SCRAPE_BASE_DELAY_MS: u64 = 1000;

/// Pause between consecutive catalog pages (in milliseconds)
pub const SCRAPE_PAGE_DELAY_MS: u64 = 500;

/// Default configuration file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "uupforge.toml";

/// Default ledger file name
pub const LEDGER_FILE_NAME: &str = "build_state.json";

/// Catalog hierarchy file written next to the partitions
pub const CATALOG_INDEX_FILE: &str = "index.json";

/// Status file written by the monitor script
pub const MONITOR_STATUS_FILE: &str = "uup_monitor_status.txt";

/// Shell used to run the monitor script
pub const MONITOR_SHELL: &str = "powershell.exe";

/// Head start the monitor gets to stop its own process tree before the
/// packaging timeout fires (in seconds, capped at a quarter of the timeout)
pub const MONITOR_GRACE_SECS: u64 = 60;

/// Extra aria2c arguments added to conversion scripts
pub const ARIA2_RETRY_ARGS: &str = "--retry-wait=5 --max-tries=5";
