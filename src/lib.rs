#![deny(unused_must_use)]

mod debug_log;

pub mod fmt_ctx;
pub mod diagnostics;
pub mod value;
pub mod infer;
pub mod trace;

pub use debug_log::{SpewChannel, SpewChannels, UnknownSpewChannel, SPEW_ENV_VAR};

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub struct ErrorsEmitted {
    /// The number of errors that were emitted
    emitted_errors: usize,
}

impl ErrorsEmitted {
    pub fn new(emitted_errors: usize) -> Self {
        Self {emitted_errors}
    }

    pub fn emitted_errors(&self) -> usize {
        self.emitted_errors
    }
}

impl fmt::Display for ErrorsEmitted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.emitted_errors {
            1 => write!(f, "aborting due to 1 previous error"),
            errors => write!(f, "aborting due to {} previous errors", errors),
        }
    }
}
