//! Small shared utilities with no home in a single component module.

pub mod duration_serde;
