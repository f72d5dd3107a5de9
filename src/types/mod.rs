pub mod config;
pub mod options;

pub use config::*;
pub use options::*;
