//! # Repositories
//!
//! - [`entity`] - Generic access to one syncable entity table

pub mod entity;
