//! Core definitions shared by all extval-* crates: the error type, the `Result`
//! alias, argument/data verification macros and task spawning helpers.

pub mod async_runtime;
pub mod error;
pub mod result;

pub use result::Result;
