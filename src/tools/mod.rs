//! External tool discovery and invocation.

pub mod checker;
pub mod runner;

pub use checker::{check_tools, ToolAvailabilityChecker};
pub use runner::{ToolCommand, ToolOutput};
