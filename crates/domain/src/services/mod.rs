//! Domain services for Mailcraft.
//!
//! Each pipeline stage is a pure function or a small stateless type over the
//! domain models. Orchestration, caching and I/O live in the api crate.

pub mod builtin_compiler;
pub mod client_adapter;
pub mod compiler;
pub mod css_inliner;
pub mod dark_mode;
pub mod markup;
pub mod markup_builder;
pub mod optimizer;
pub mod validator;

pub use builtin_compiler::{BuiltinMarkupCompiler, XHTML_DOCTYPE};
pub use client_adapter::{adapt_html, adapt_markup, adaptation_notes};
pub use compiler::{
    BackendOutput, CompileError, CompileOutput, Compiler, CompilerBackendError, CompilerOptions,
    Diagnostic, MarkupCompiler, ValidationLevel,
};
pub use css_inliner::inline_css;
pub use dark_mode::{inject_dark_mode, DarkModeConfig, DarkModeCoverage};
pub use markup::{Element, MarkupDocument, MarkupNode, ParseError};
pub use markup_builder::{BuildError, BuiltMarkup, MarkupBuilder};
pub use optimizer::{optimize, OptimizeOutcome};
pub use self::validator::{client_compatibility, validate_html, validate_markup, ClientCompatibility};
