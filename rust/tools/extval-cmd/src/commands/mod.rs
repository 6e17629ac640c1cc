//! Command implementations for extval-cmd

pub mod build;
pub mod inspect;
pub mod lookup;
pub mod parse;
pub mod serve;
