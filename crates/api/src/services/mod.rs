//! Generation services and external compiler integrations.

pub mod circuit_breaker;
pub mod generation_controller;
pub mod mjml_compiler;
pub mod template_generation;

#[cfg(test)]
pub(crate) mod fixtures;

pub use generation_controller::{
    ControllerSettings, ControllerStats, GenerationController, GenerationError, GenerationOutcome,
};
pub use mjml_compiler::{build_compiler, HttpMarkupCompiler, ProcessMarkupCompiler};
pub use template_generation::{
    BatchItem, BatchItemResult, CompatibilityReport, GenerationDefaults, ItemError,
    TemplateGenerationService,
};
