//! Ember Core - Foundational types for the Ember particle engine
//!
//! This crate provides the types every other Ember crate depends on:
//! - `SystemId` - Stable particle-system identifiers
//! - `Vec2`, `Vec3`, `Color`, `Transform` - Value types
//! - Interpolation helpers shared by curves and evolvers
//! - Error types and Result alias

mod error;
mod id;
pub mod math;
mod types;

pub use error::{EmberError, Result};
pub use id::SystemId;
pub use types::{Color, Transform, Vec2, Vec3};
