//! Thin CLI: parse → (canonical JSON | validation report | client packages)
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use crate::builder::{self, BuildOptions, BuildOutcome, MergePrecedence};
use crate::error::Diagnostic;
use crate::ir::{CanonicalSchema, SourceFormat};
use crate::lower::{MapperOptions, TargetLanguage};
use crate::orchestrator::{GenerateOptions, GenerationReport, Orchestrator};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile OpenAPI or custom API descriptions into a canonical model and client packages
#[derive(Parser, Debug)]
#[command(name = "canonapi", version)]
pub struct CommandLineInterface {
    /// debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// build and print the canonical schema as JSON
    Parse(ParseOut),
    /// build and check graph invariants
    Validate(ValidateOut),
    /// build and emit client packages for one or more languages
    Generate(GenerateOut),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Auto,
    Openapi,
    Custom,
}

impl FormatArg {
    fn source_format(self) -> Option<SourceFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Openapi => Some(SourceFormat::OpenApi),
            FormatArg::Custom => Some(SourceFormat::Custom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AllOfArg {
    First,
    Last,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// input dialect; `auto` looks at top-level keys
    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    format: FormatArg,

    /// JQ pre-process filter for each document; must yield exactly one document
    #[arg(long)]
    jq_expr: Option<String>,

    /// which `allOf` member wins a property conflict
    #[arg(long, value_enum, default_value_t = AllOfArg::Last)]
    all_of: AllOfArg,
}

#[derive(clap::Parser, Debug)]
struct ParseOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// print the full build outcome (schema, errors, warnings) instead of the schema
    #[arg(long)]
    outcome: bool,

    /// output .json file (stdout if omitted); single input only
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ValidateOut {
    #[command(flatten)]
    input_settings: InputSettings,
}

#[derive(clap::Parser, Debug)]
struct GenerateOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// target language; repeatable, all seven if omitted
    #[arg(long = "lang", value_enum)]
    languages: Vec<TargetLanguage>,

    /// packages land in `<out-dir>/<language>/`
    #[arg(long, default_value = "generated")]
    out_dir: PathBuf,

    #[arg(long)]
    package_name: Option<String>,

    #[arg(long)]
    package_version: Option<String>,

    /// run generators one after another instead of in parallel
    #[arg(long)]
    sequential: bool,

    /// generate in memory and report, without writing files
    #[arg(long)]
    dry_run: bool,

    /// lower every union to the target's top type
    #[arg(long)]
    degrade_unions: bool,

    /// JSON object mapping canonical type names to verbatim target expressions
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// write the generation report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

struct LoadedInput {
    path: PathBuf,
    outcome: BuildOutcome,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            all_of_precedence: match self.all_of {
                AllOfArg::First => MergePrecedence::FirstWins,
                AllOfArg::Last => MergePrecedence::LastWins,
            },
        }
    }

    fn load(&self) -> Result<Vec<LoadedInput>> {
        let options = self.build_options();
        let mut loaded = Vec::new();
        for path in resolve_file_path_patterns(&self.input)? {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read source file {}", path.display()))?;
            let mut value = crate::adapter::decode_document(&source, "input")
                .with_context(|| format!("failed to decode {}", path.display()))?;
            if let Some(jq_expr) = self.jq_expr.as_ref() {
                value = crate::jq_exec::apply_single(jq_expr, &value)
                    .with_context(|| format!("failed to apply jq expression to {}", path.display()))?;
            }
            let outcome = builder::build_from_value(value, self.format.source_format(), &options);
            tracing::debug!(path = %path.display(), success = outcome.success, "built input");
            loaded.push(LoadedInput { path, outcome });
        }
        Ok(loaded)
    }
}

impl LoadedInput {
    fn report(&self) {
        let name = self.path.display().to_string();
        print_diagnostics(&name, &self.outcome.warnings, &self.outcome.errors);
    }

    fn schema(&self) -> Result<&CanonicalSchema> {
        match &self.outcome.schema {
            Some(schema) if self.outcome.success => Ok(schema),
            _ => Err(anyhow!("{} did not build", self.path.display())),
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Parse(target) => target.run(),
            Command::Validate(target) => target.run(),
            Command::Generate(target) => target.run(),
        }
    }
}

impl ParseOut {
    fn run(&self) -> Result<()> {
        let inputs = self.input_settings.load()?;
        if self.out.is_some() && inputs.len() > 1 {
            bail!("--out takes a single input, got {}", inputs.len());
        }
        let mut failed = 0;
        for input in &inputs {
            input.report();
            let text = if self.outcome {
                serde_json::to_string_pretty(&input.outcome)?
            } else {
                match input.schema() {
                    Ok(schema) => schema.to_json_pretty()?,
                    Err(_) => {
                        failed += 1;
                        continue;
                    }
                }
            };
            match self.out.as_ref() {
                Some(out) => write_text(out, &text)?,
                None => println!("{text}"),
            }
        }
        if failed > 0 {
            bail!("{failed} of {} input(s) failed to build", inputs.len());
        }
        Ok(())
    }
}

impl ValidateOut {
    fn run(&self) -> Result<()> {
        let inputs = self.input_settings.load()?;
        let mut failed = 0;
        for input in &inputs {
            input.report();
            let name = input.path.display().to_string();
            let Ok(schema) = input.schema() else {
                failed += 1;
                continue;
            };
            let report = crate::validate::validate(schema);
            if report.valid {
                eprintln!("{} {name}", "valid".green().bold());
            } else {
                failed += 1;
                eprintln!("{} {name}", "invalid".red().bold());
                for issue in &report.errors {
                    eprintln!("  {} [{}] {}: {}", "error".red(), issue.code, issue.path, issue.message);
                }
            }
        }
        if failed > 0 {
            bail!("{failed} of {} input(s) are invalid", inputs.len());
        }
        Ok(())
    }
}

impl GenerateOut {
    fn mapper_options(&self) -> Result<MapperOptions> {
        let overrides = match self.overrides.as_ref() {
            None => BTreeMap::new(),
            Some(path) => {
                let source = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read overrides {}", path.display()))?;
                crate::path_de::from_str_with_path::<BTreeMap<String, String>>(&source)
                    .map_err(|message| anyhow!("invalid overrides {}: {message}", path.display()))?
            }
        };
        Ok(MapperOptions { degrade_unions: self.degrade_unions, overrides })
    }

    fn run(&self) -> Result<()> {
        let inputs = self.input_settings.load()?;
        let mapper = self.mapper_options()?;
        let orchestrator = Orchestrator::new();
        let languages = if self.languages.is_empty() { TargetLanguage::ALL.to_vec() } else { self.languages.clone() };

        let mut reports = BTreeMap::new();
        let mut failed = 0;
        for input in &inputs {
            input.report();
            let schema = input.schema()?;
            let validation = crate::validate::validate(schema);
            if !validation.valid {
                for issue in &validation.errors {
                    eprintln!("  {} [{}] {}: {}", "error".red(), issue.code, issue.path, issue.message);
                }
                bail!("{} failed validation", input.path.display());
            }

            // Several inputs each get their own subdirectory.
            let output_dir = if inputs.len() > 1 {
                let stem = input.path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
                self.out_dir.join(stem)
            } else {
                self.out_dir.clone()
            };
            let options = GenerateOptions {
                languages: languages.clone(),
                output_dir: output_dir.clone(),
                package_name: self.package_name.clone(),
                package_version: self.package_version.clone(),
                parallel: !self.sequential,
                write_files: !self.dry_run,
                mapper: mapper.clone(),
            };
            let report = orchestrator.generate(schema, &options);
            print_report(&input.path, &output_dir, &report, self.dry_run);
            if !report.success {
                failed += 1;
            }
            reports.insert(input.path.display().to_string(), report);
        }

        if let Some(path) = self.report.as_ref() {
            let text = if reports.len() == 1 {
                serde_json::to_string_pretty(reports.values().next().context("no report")?)?
            } else {
                serde_json::to_string_pretty(&reports)?
            };
            write_text(path, &text)?;
        }
        if failed > 0 {
            bail!("generation failed for {failed} of {} input(s)", inputs.len());
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn print_diagnostics(source: &str, warnings: &[Diagnostic], errors: &[Diagnostic]) {
    for warning in warnings {
        eprintln!("{} {source}: [{}] {}: {}", "warning".yellow(), warning.code, warning.path, warning.message);
    }
    for error in errors {
        eprintln!("{} {source}: [{}] {}: {}", "error".red(), error.code, error.path, error.message);
    }
}

fn print_report(input: &Path, output_dir: &Path, report: &GenerationReport, dry_run: bool) {
    eprintln!("{} {}", "generated".bold(), input.display());
    for (language, result) in &report.results {
        if result.success {
            eprintln!(
                "  {} {:<10} {} file(s) {}",
                "✓".green(),
                language.slug(),
                result.files.len(),
                if dry_run { String::new() } else { format!("→ {}", output_dir.join(language.slug()).display()) }
            );
        } else {
            eprintln!("  {} {:<10}", "✗".red(), language.slug());
        }
        print_diagnostics(language.slug(), &result.warnings, &result.errors);
    }
    eprintln!(
        "  {} file(s), {} error(s), {} warning(s) in {:.2?}",
        report.total_files, report.total_errors, report.total_warnings, report.duration
    );
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_parse() {
        let cli = CommandLineInterface::try_parse_from([
            "canonapi", "generate", "-i", "api.yaml", "--lang", "rust", "--lang", "ts", "--dry-run", "--all-of",
            "first",
        ])
        .unwrap();
        let Command::Generate(target) = cli.cmd else { panic!("expected generate") };
        assert_eq!(target.languages, vec![TargetLanguage::Rust, TargetLanguage::TypeScript]);
        assert!(target.dry_run);
        assert_eq!(target.input_settings.build_options().all_of_precedence, MergePrecedence::FirstWins);
        assert!(CommandLineInterface::try_parse_from(["canonapi", "parse"]).is_err());
    }

    #[test]
    fn globs_must_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        let pattern = format!("{}/*.json", dir.path().display());
        assert_eq!(resolve_file_path_patterns([pattern.as_str()]).unwrap().len(), 2);

        let none = format!("{}/*.yaml", dir.path().display());
        assert!(resolve_file_path_patterns([none.as_str()]).is_err());
        assert_eq!(resolve_file_path_patterns(["literal.json"]).unwrap(), vec![PathBuf::from("literal.json")]);
    }

    #[test]
    fn generate_writes_packages() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pets.json");
        std::fs::write(&input, crate::codegen::fixtures::PETSTORE).unwrap();
        let out = dir.path().join("out");
        let cli = CommandLineInterface::try_parse_from([
            "canonapi",
            "generate",
            "-i",
            input.to_str().unwrap(),
            "--lang",
            "python",
            "--out-dir",
            out.to_str().unwrap(),
            "--package-name",
            "pets",
        ])
        .unwrap();
        cli.run().unwrap();
        assert!(out.join("python/pyproject.toml").is_file());
        assert!(out.join("python/pets/models.py").is_file());
    }
}
