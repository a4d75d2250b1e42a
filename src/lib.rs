use std::result;

pub mod compiler;
pub mod dex;
pub mod error;
pub mod oat;
pub mod sink;

pub type Result<T> = result::Result<T, error::OatError>;
