#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![doc = include_str!("../README.md")]

pub use self::errors::Error;

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod errors;
pub mod logger;
pub mod ontology;
#[cfg(any(test, feature = "testing"))]
pub mod tests_cfg;

/// Application results options list
pub type Result<T, E = Error> = std::result::Result<T, E>;
