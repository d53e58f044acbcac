pub use crate::config::ExpansionConfig;
pub use crate::engine::{Engine, ExpandedUnit};
pub use crate::errors::{CmacroError, Result};

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod macros;
pub mod syntax;
