//! Runs per-language generators over one schema.
//!
//! Each language is its own failure domain: a generator that errors or
//! panics only poisons its own [`GeneratorResult`]. Files are written to
//! disk, if at all, after every generator has finished.
use std::collections::BTreeMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codegen::{self, GeneratedFile, GenerationContext, Generator, PackageCommands};
use crate::error::{CanonError, Diagnostic};
use crate::ir::CanonicalSchema;
use crate::lower::{MapperOptions, TargetLanguage};
use crate::registry::naming::to_snake_case;

// ————————————————————————————————————————————————————————————————————————————
// OPTIONS & RESULTS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateOptions {
    pub languages: Vec<TargetLanguage>,
    pub output_dir: PathBuf,
    /// Defaults to the kebab-cased schema title.
    pub package_name: Option<String>,
    /// Defaults to the schema's version.
    pub package_version: Option<String>,
    pub parallel: bool,
    pub write_files: bool,
    pub mapper: MapperOptions,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            languages: TargetLanguage::ALL.to_vec(),
            output_dir: PathBuf::from("generated"),
            package_name: None,
            package_version: None,
            parallel: true,
            write_files: false,
            mapper: MapperOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorResult {
    pub language: TargetLanguage,
    pub success: bool,
    pub files: Vec<GeneratedFile>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    #[serde(flatten)]
    pub commands: PackageCommands,
}

impl GeneratorResult {
    fn failed(language: TargetLanguage, error: Diagnostic) -> Self {
        Self {
            language,
            success: false,
            files: Vec::new(),
            errors: vec![error],
            warnings: Vec::new(),
            commands: PackageCommands::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub results: BTreeMap<TargetLanguage, GeneratorResult>,
    pub total_files: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub success: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// ORCHESTRATOR
// ————————————————————————————————————————————————————————————————————————————

pub struct Orchestrator {
    generators: BTreeMap<TargetLanguage, Box<dyn Generator>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// All seven built-in generators.
    pub fn new() -> Self {
        let generators = TargetLanguage::ALL.iter().map(|l| (*l, codegen::builtin(*l))).collect();
        Self { generators }
    }

    /// No generators; every requested language fails until one is added.
    pub fn empty() -> Self {
        Self { generators: BTreeMap::new() }
    }

    /// Registers `generator` for its language, replacing any existing one.
    pub fn with_generator(mut self, generator: Box<dyn Generator>) -> Self {
        self.generators.insert(generator.language(), generator);
        self
    }

    pub fn generate(&self, schema: &CanonicalSchema, options: &GenerateOptions) -> GenerationReport {
        let started_at = Utc::now();
        let timer = Instant::now();

        let mut languages = options.languages.clone();
        languages.sort();
        languages.dedup();

        let package_name = options.package_name.clone().unwrap_or_else(|| default_package_name(schema));
        let package_version = options.package_version.clone().unwrap_or_else(|| schema.metadata.version.clone());
        info!(
            languages = languages.len(),
            parallel = options.parallel,
            package = %package_name,
            "generating clients"
        );

        let run = |language: &TargetLanguage| self.run_one(schema, *language, options, &package_name, &package_version);
        let results: Vec<GeneratorResult> = if options.parallel {
            languages.par_iter().map(run).collect()
        } else {
            languages.iter().map(run).collect()
        };
        let mut results: BTreeMap<TargetLanguage, GeneratorResult> =
            results.into_iter().map(|r| (r.language, r)).collect();

        if options.write_files {
            for result in results.values_mut() {
                write_result(&options.output_dir, result);
            }
        }

        let total_files = results.values().map(|r| r.files.len()).sum();
        let total_errors = results.values().map(|r| r.errors.len()).sum();
        let total_warnings = results.values().map(|r| r.warnings.len()).sum();
        let success = results.values().all(|r| r.success);
        let duration = timer.elapsed();
        info!(total_files, total_errors, total_warnings, ?duration, success, "generation finished");

        GenerationReport { results, total_files, total_errors, total_warnings, duration, started_at, success }
    }

    fn run_one(
        &self,
        schema: &CanonicalSchema,
        language: TargetLanguage,
        options: &GenerateOptions,
        package_name: &str,
        package_version: &str,
    ) -> GeneratorResult {
        let Some(generator) = self.generators.get(&language) else {
            let error = CanonError::Generation {
                language: language.to_string(),
                message: "no generator registered".into(),
            };
            return GeneratorResult::failed(language, error.to_diagnostic());
        };

        debug!(%language, "generator started");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let ctx = GenerationContext::new(schema, language, options.mapper.clone(), package_name, package_version);
            let output = generator.generate(&ctx)?;
            Ok::<_, CanonError>((output, generator.commands(&ctx)))
        }));

        match outcome {
            Ok(Ok((output, commands))) => {
                debug!(%language, files = output.files.len(), warnings = output.warnings.len(), "generator finished");
                GeneratorResult {
                    language,
                    success: true,
                    files: output.files,
                    errors: Vec::new(),
                    warnings: output.warnings,
                    commands,
                }
            }
            Ok(Err(error)) => {
                warn!(%language, %error, "generator failed");
                GeneratorResult::failed(language, error.to_diagnostic())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%language, %message, "generator panicked");
                let error = CanonError::Generation { language: language.to_string(), message };
                GeneratorResult::failed(language, error.to_diagnostic())
            }
        }
    }
}

fn default_package_name(schema: &CanonicalSchema) -> String {
    let name = to_snake_case(&schema.metadata.title).replace('_', "-");
    if name.is_empty() { "api-client".into() } else { name }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panicked: {text}")
    } else {
        "panicked".into()
    }
}

/// Writes under `<output_dir>/<language>/`. Failures land in the result.
fn write_result(output_dir: &Path, result: &mut GeneratorResult) {
    let root = output_dir.join(result.language.slug());
    for file in &result.files {
        let target = file.path.split('/').fold(root.clone(), |path, segment| path.join(segment));
        let written = target
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(&target, &file.content));
        if let Err(source) = written {
            let error = CanonError::Io { path: target, source };
            warn!(language = %result.language, %error, "write failed");
            result.errors.push(error.to_diagnostic());
            result.success = false;
        }
    }
    debug!(language = %result.language, root = %root.display(), files = result.files.len(), "wrote files");
}
