//! canonapi compiles OpenAPI 3.x and custom provider schemas into one
//! canonical type/endpoint model and lowers it into client packages for
//! seven languages.
//!
//! Pipeline: [`adapter`] → [`builder`] (through [`registry`]) →
//! [`ir::CanonicalSchema`] → [`validate`] → [`lower`] + [`codegen`] per
//! language, driven by [`orchestrator`].
pub mod adapter;
pub mod builder;
pub mod cli;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod jq_exec;
pub mod lower;
pub mod orchestrator;
pub mod path_de;
pub mod registry;
pub mod validate;

pub use builder::{build, build_from_str, build_from_value, BuildOptions, BuildOutcome};
pub use error::{CanonError, Diagnostic, Result};
pub use ir::CanonicalSchema;
pub use lower::{MapperOptions, TargetLanguage, TypeMapper};
pub use orchestrator::{GenerateOptions, GenerationReport, Orchestrator};
pub use validate::{validate, ValidationReport};
