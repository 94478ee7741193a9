//! datamapper - SQL data mapper
//!
//! This crate maps parameter objects to SQL and result rows back to object
//! graphs through:
//! - Dynamic SQL templates with inline parameters
//! - Parameter and result maps, including group-by and sub-selects
//! - Per-statement result caches
//! - A small driver abstraction with a scripted in-memory implementation

pub mod cache;
pub mod config;
pub mod configuration;
pub mod driver;
pub mod errors;
pub mod mapper;
pub mod parameters;
pub mod results;
pub mod statement;
pub mod template;
pub mod type_handlers;
pub mod types;
pub mod value;

pub use configuration::{Configuration, ConfigurationBuilder, SqlMapDef};
pub use errors::{ConfigurationError, DataMapperError};
pub use mapper::{ExecuteOutcome, SqlMapper};
pub use value::Value;
