//! Domain layer for Mailcraft.
//!
//! This crate contains:
//! - Domain models (generation requests, sections, compiled and rendered templates)
//! - The template pipeline stages, from markup building to validation
//! - Domain error types

pub mod models;
pub mod services;
