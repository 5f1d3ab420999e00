//! CLI subcommand modules.

pub(crate) mod analyze;
pub(crate) mod cache;
