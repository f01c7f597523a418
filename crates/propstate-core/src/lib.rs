//! Core types and trait definitions for the property state engine.
//!
//! This crate is deliberately free of HTTP, database and cryptography
//! dependencies. Every other crate in the workspace depends on it.

pub mod error;
pub mod field;
pub mod lifecycle;
pub mod outcome;
pub mod property;
pub mod request;
pub mod source;
pub mod status;
pub mod store;
pub mod trust;

pub use error::{Error, Result};
