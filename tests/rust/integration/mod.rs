//! Integration tests - the mapper end to end against the in-memory driver
//!
//! These tests compile mapping definitions, run statements through
//! `SqlMapper` and inspect both the materialized results and the commands
//! the driver received.

mod common;

mod cache_tests;
mod query_tests;
mod write_tests;
