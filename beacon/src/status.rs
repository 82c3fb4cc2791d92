use std::borrow::Cow;
use std::fmt;
use shared::protocol::{
    DNSSD_BAD_PARAM, STATUS_NOT_SUPPORTED, STATUS_PENDING, STATUS_POLL_ERROR, STATUS_SUCCESS,
};

/// Outcome of a session operation.
///
/// Two statuses are equal when their codes are equal; the message is only
/// carried for display. Backend failures keep the backend's own code and text.
#[derive(Debug, Clone)]
pub struct Status {
    code: i32,
    message: Cow<'static, str>,
}

impl Status {
    pub const SUCCESS: Status = Status::from_static(STATUS_SUCCESS, "success");
    pub const PENDING: Status = Status::from_static(STATUS_PENDING, "operation pending");
    pub const NOT_SUPPORTED: Status =
        Status::from_static(STATUS_NOT_SUPPORTED, "no zeroconf backend available");
    pub const POLL_ERROR: Status =
        Status::from_static(STATUS_POLL_ERROR, "error polling for events");
    pub const BAD_PARAM: Status = Status::from_static(DNSSD_BAD_PARAM, "bad parameter");

    const fn from_static(code: i32, message: &'static str) -> Self {
        Self {
            code,
            message: Cow::Borrowed(message),
        }
    }

    /// Status carrying a backend-reported failure verbatim
    pub fn backend(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Cow::Owned(message.into()),
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_success(&self) -> bool {
        self.code == STATUS_SUCCESS
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Status {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_sentinel() {
        assert!(Status::SUCCESS.is_success());
        assert_eq!(Status::SUCCESS.code(), 0);
        assert_eq!(Status::SUCCESS.message(), "success");
        assert_eq!(Status::SUCCESS.to_string(), "success (0)");
    }

    #[test]
    fn test_equality_by_code() {
        let a = Status::backend(-65548, "name conflict");
        let b = Status::backend(-65548, "something else entirely");
        assert_eq!(a, b);
        assert_ne!(a, Status::SUCCESS);
        assert_ne!(Status::PENDING, Status::NOT_SUPPORTED);
    }

    #[test]
    fn test_sentinels_are_failures() {
        for status in [Status::PENDING, Status::NOT_SUPPORTED, Status::POLL_ERROR] {
            assert!(!status.is_success(), "{status} should not be success");
            assert!(status.code() < 0);
        }
    }
}
