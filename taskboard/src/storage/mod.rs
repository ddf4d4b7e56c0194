//! Storage module
//!
//! Provides atomic whole-file JSON storage for the document and side files.

pub mod json_file;

pub use json_file::JsonFile;
