//! Unit tests - public API checks that need no driver
//!
//! Template expansion, parameter maps and mapping documents, exercised the
//! way an application would use them.

mod settings_tests;
mod sql_map_document_tests;
mod template_properties_tests;
