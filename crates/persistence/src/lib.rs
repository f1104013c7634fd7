//! Persistence layer for Mailcraft.
//!
//! This crate contains:
//! - Cache entry definitions
//! - The template cache store
//! - Cache metrics helpers

pub mod entities;
pub mod metrics;
pub mod repositories;
