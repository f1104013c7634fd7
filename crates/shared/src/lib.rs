//! Shared utilities and common types for Mailcraft.
//!
//! This crate provides common functionality used across all other crates:
//! - Hashing utilities (request fingerprints, cache keys)
//! - Common validation logic (colors, links)

pub mod crypto;
pub mod validation;
