//! Runs every `fixtures/*.expect.json` through build → validate → generate
//! and compares the outcome with the expectation.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use canonapi::orchestrator::{GenerateOptions, Orchestrator};
use canonapi::{build_from_str, validate, BuildOptions, TargetLanguage};
use colored::Colorize;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Expectation {
    input: String,
    success: bool,
    #[serde(default)]
    error_codes: Vec<String>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    endpoints: Vec<String>,
    streaming: Option<Vec<String>>,
    #[serde(default)]
    auth_schemes: Vec<String>,
    valid: Option<bool>,
    #[serde(default)]
    generates: Vec<TargetLanguage>,
}

fn load_expectation(path: &Path) -> Result<Expectation> {
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let de = &mut serde_json::Deserializer::from_str(&source);
    serde_path_to_error::deserialize(de).with_context(|| format!("parsing {}", path.display()))
}

/// Returns one line per mismatch.
fn check(dir: &Path, expectation: &Expectation) -> Result<Vec<String>> {
    let input = dir.join(&expectation.input);
    let source = std::fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
    let outcome = build_from_str(&source, None, &BuildOptions::default());
    let mut failures = Vec::new();

    if outcome.success != expectation.success {
        failures.push(format!("success: expected {}, got {} ({:?})", expectation.success, outcome.success, outcome.errors));
    }
    for code in &expectation.error_codes {
        if !outcome.errors.iter().any(|e| &e.code == code) {
            failures.push(format!("missing error code {code}"));
        }
    }
    let Some(schema) = outcome.schema.as_ref() else {
        return Ok(failures);
    };

    for name in &expectation.types {
        if !schema.types.iter().any(|t| &t.name == name) {
            failures.push(format!("missing type {name}"));
        }
    }
    let operations: Vec<&str> = schema.endpoints.iter().map(|e| e.operation_id.as_str()).collect();
    for name in &expectation.endpoints {
        if !operations.contains(&name.as_str()) {
            failures.push(format!("missing endpoint {name} (have {operations:?})"));
        }
    }
    if let Some(streaming) = &expectation.streaming {
        let actual: Vec<&str> =
            schema.endpoints.iter().filter(|e| e.streaming).map(|e| e.operation_id.as_str()).collect();
        if &actual != streaming {
            failures.push(format!("streaming endpoints: expected {streaming:?}, got {actual:?}"));
        }
    }
    for id in &expectation.auth_schemes {
        if !schema.authentication.iter().any(|a| &a.id == id) {
            failures.push(format!("missing auth scheme {id}"));
        }
    }
    if let Some(valid) = expectation.valid {
        let report = validate(schema);
        if report.valid != valid {
            failures.push(format!("valid: expected {valid}, got {} ({:?})", report.valid, report.errors));
        }
    }
    if !expectation.generates.is_empty() {
        let options = GenerateOptions { languages: expectation.generates.clone(), ..GenerateOptions::default() };
        let report = Orchestrator::new().generate(schema, &options);
        for (language, result) in &report.results {
            if !result.success || result.files.is_empty() {
                failures.push(format!("{language} generation failed: {:?}", result.errors));
            }
        }
    }
    Ok(failures)
}

fn main() -> ExitCode {
    let dir = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("fixtures"));
    let mut paths: Vec<PathBuf> = match std::fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.to_string_lossy().ends_with(".expect.json"))
            .collect(),
        Err(error) => {
            eprintln!("{} cannot read {}: {error}", "error:".red().bold(), dir.display());
            return ExitCode::FAILURE;
        }
    };
    paths.sort();

    let mut failed = 0;
    for path in &paths {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let result = load_expectation(path).and_then(|expectation| check(&dir, &expectation));
        match result {
            Ok(failures) if failures.is_empty() => eprintln!("{} {name}", "pass".green().bold()),
            Ok(failures) => {
                failed += 1;
                eprintln!("{} {name}", "fail".red().bold());
                for failure in failures {
                    eprintln!("  {failure}");
                }
            }
            Err(error) => {
                failed += 1;
                eprintln!("{} {name}: {error:#}", "error".red().bold());
            }
        }
    }
    eprintln!("{} fixture(s), {failed} failed", paths.len());
    if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
