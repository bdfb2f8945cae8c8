//! CLI command implementations.

pub mod check;
pub mod common;
pub mod components;
pub mod run;
