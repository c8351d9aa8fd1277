//! Subcommand implementations

pub mod resize;
pub mod scan;
pub mod sizes;
