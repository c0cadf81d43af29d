//! UUP dump endpoints

/// UUP dump base URL
pub const UUP_DUMP: &str = "https://uupdump.net";

/// Build list for a search query (`q=category:<name>`)
pub const KNOWN_PAGE: &str = "known.php";

/// Language selection for a build
pub const SELECT_LANG_PAGE: &str = "selectlang.php";

/// Edition selection for a build and language
pub const SELECT_EDITION_PAGE: &str = "selectedition.php";

/// Download options (including virtual editions)
pub const DOWNLOAD_PAGE: &str = "download.php";

/// Form target returning the conversion bundle
pub const GET_PAGE: &str = "get.php";

/// Browser-like user agent; the site rejects obvious bots
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
