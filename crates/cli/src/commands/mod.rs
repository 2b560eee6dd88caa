//! Subcommand handlers
//!
//! Each handler runs one engine component, renders its report and returns
//! the process exit code derived from it.

pub mod fix;
pub mod gate;
pub mod inspect;
pub mod monitor;
