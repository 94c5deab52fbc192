//! Data types for documents, extraction results, quotes and profiles.

pub mod config;
pub mod document;
pub mod profile;
pub mod quote;
pub mod result;
