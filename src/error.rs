use std::fmt::Debug;
use std::io;

use thiserror::Error;

#[derive(Error)]
pub enum OatError {
    #[error("Failed to write {what} to {sink}: {source}")]
    SinkWrite {
        what: &'static str,
        sink: String,
        source: io::Error,
    },

    #[error("Failed to write {what} for {method} to {sink}: {source}")]
    MethodSinkWrite {
        what: &'static str,
        method: String,
        sink: String,
        source: io::Error,
    },

    #[error("Failed to seek in {sink}: {source}")]
    SinkSeekFailed { sink: String, source: io::Error },

    #[error("Seek in {sink} landed at {actual}, expected {expected}")]
    SinkSeek {
        sink: String,
        expected: u64,
        actual: u64,
    },

    #[error("{0}")]
    LayoutAssertion(String),
}

#[macro_export]
macro_rules! oat_err {
    ($name:ident) => {
        Err(OatError::$name)
    };
    ($name:ident, $arg1:literal, $($arg:tt)*) => {
        Err(OatError::$name(format!($arg1, $($arg)*)))
    };
    ($name:ident { $($arg:tt)* }) => {
        Err(OatError::$name { $($arg)* })
    };
    ($name:ident, $($arg:tt)*) => {
        Err(OatError::$name($($arg)*))
    };
}

impl Debug for OatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
