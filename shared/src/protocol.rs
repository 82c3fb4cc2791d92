/// Domain appended to bare service types, e.g. "_http._tcp" -> "_http._tcp.local."
pub const DEFAULT_DOMAIN: &str = "local.";

/// Status codes reported by sessions
pub const STATUS_SUCCESS: i32 = 0;
pub const STATUS_PENDING: i32 = -1;
pub const STATUS_NOT_SUPPORTED: i32 = -2;
pub const STATUS_POLL_ERROR: i32 = -3;

/// DNS-SD error codes used by backends that have no native numbering
pub const DNSSD_UNKNOWN: i32 = -65537;
pub const DNSSD_BAD_PARAM: i32 = -65540;
pub const DNSSD_NAME_CONFLICT: i32 = -65548;
pub const DNSSD_NO_AUTH: i32 = -65555;
pub const DNSSD_SERVICE_NOT_RUNNING: i32 = -65563;
