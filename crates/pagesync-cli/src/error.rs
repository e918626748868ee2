//! Exit status mapping.
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Listing succeeded and every page was attempted, degraded or not |
//! | 1 | Fatal failure: configuration, source unreachable, unwritable output |
//! | 130 | Interrupted |

use std::process::ExitCode;

use pagesync_core::{Error, ErrorClass};

/// Process outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Run completed.
    Success = 0,
    /// Run aborted on a fatal error.
    Failure = 1,
    /// Run stopped by Ctrl-C.
    Interrupted = 130,
}

impl ExitStatus {
    /// Numeric code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Status for an error that escaped a command.
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<Error>() {
            Some(Error::Cancelled) => Self::Interrupted,
            _ => Self::Failure,
        }
    }

    /// Short label for the error class, used in the final diagnostic.
    pub fn describe(err: &anyhow::Error) -> &'static str {
        match err.downcast_ref::<Error>().map(Error::class) {
            Some(ErrorClass::FatalRemote) => "content source unavailable",
            Some(ErrorClass::FatalLocal) => "local failure",
            Some(ErrorClass::Transient) => "remote kept failing",
            Some(ErrorClass::Degraded) | None => "error",
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}
