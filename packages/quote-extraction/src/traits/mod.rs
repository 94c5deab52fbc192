//! Core trait abstractions for the quote extraction library.
//!
//! These traits define the interfaces that applications implement
//! to provide storage and document-understanding capabilities.

pub mod provider;
pub mod store;
