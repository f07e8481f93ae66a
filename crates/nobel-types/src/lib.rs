//! Shared domain types for Nobel prize events.
//!
//! This crate is the single source of truth for the payloads that flow
//! through the event log. Publishers encode these types, subscribers and
//! operator tooling decode them.
//!
//! # Modules
//!
//! - [`model`] -- `Prize`, `Laureate` and their value types (wire form)
//! - [`raw`] -- The Nobel API dump shapes and their conversion into the model
//! - [`error`] -- Validation errors raised while building model values

pub mod error;
pub mod model;
pub mod raw;

pub use error::ModelError;
pub use model::{Category, Laureate, NonBlank, Prize, Share};
pub use raw::{NobelResponse, RawLaureate, RawPrize, unique_laureates};
