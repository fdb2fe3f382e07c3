//! Rust: serde models and an async `reqwest` client crate.
use std::collections::BTreeSet;

use super::{
    collect_imports, enum_primitive, identifier, path_parts, quote, AuthApplication, CodeWriter, Declaration,
    GeneratedFile, GenerationContext, Generator, GeneratorOutput, OperationView, PackageCommands, PathPart,
};
use crate::error::Result;
use crate::ir::PrimitiveKind;
use crate::lower::TargetLanguage;
use crate::registry::naming::{to_pascal_case, to_snake_case};

pub struct RustGenerator;

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false", "fn",
    "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "static",
    "struct", "trait", "true", "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do",
    "final", "gen", "macro", "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Keywords that cannot be raw identifiers.
const UNRAWABLE: &[&str] = &["self", "Self", "super", "crate"];

fn ident(raw: &str) -> String {
    let ident = identifier(raw, to_snake_case, KEYWORDS, |s| format!("r#{s}"));
    if UNRAWABLE.contains(&ident.as_str()) { format!("{ident}_") } else { ident }
}

fn doc(w: &mut CodeWriter, text: Option<&str>) {
    w.doc("/// ", text);
}

impl Generator for RustGenerator {
    fn language(&self) -> TargetLanguage {
        TargetLanguage::Rust
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratorOutput> {
        let declarations = ctx.declarations()?;
        let operations = ctx.operations()?;
        let (models, mut imports) = models(ctx, &declarations);
        let client = client(ctx, &operations);
        imports.extend(collect_imports(operations.iter().flat_map(|op| {
            op.params().map(|p| &p.mapped).chain(op.body.iter()).chain(op.response.iter())
        })));

        let mut lib = CodeWriter::spaces(4);
        lib.doc("//! ", Some(&ctx.description()));
        lib.line(format!("//! {}", ctx.banner()));
        lib.blank()
            .line("pub mod client;")
            .line("pub mod models;")
            .blank()
            .line("pub use client::{ApiClient, Error};")
            .line("pub use models::*;");

        let files = vec![
            GeneratedFile::new("Cargo.toml", manifest(ctx, &imports)),
            GeneratedFile::new("src/lib.rs", lib.finish()),
            GeneratedFile::new("src/models.rs", models),
            GeneratedFile::new("src/client.rs", client),
        ];
        Ok(GeneratorOutput { files, warnings: ctx.degraded_union_warnings() })
    }

    fn commands(&self, _ctx: &GenerationContext<'_>) -> PackageCommands {
        PackageCommands {
            build_command: Some("cargo build --release".into()),
            test_command: Some("cargo test".into()),
            publish_command: Some("cargo publish".into()),
            registry_url: Some("https://crates.io".into()),
        }
    }
}

fn manifest(ctx: &GenerationContext<'_>, imports: &BTreeSet<String>) -> String {
    let uses = |krate: &str| imports.iter().any(|i| i.starts_with(&format!("use {krate}::")));
    let mut w = CodeWriter::spaces(4);
    w.line("[package]")
        .line(format!("name = {}", quote(&ctx.package_name)))
        .line(format!("version = {}", quote(&ctx.package_version)))
        .line("edition = \"2021\"")
        .line(format!("description = {}", quote(&ctx.description())))
        .line("license = \"MIT OR Apache-2.0\"")
        .blank()
        .line("[dependencies]")
        .line("reqwest = { version = \"0.12\", default-features = false, features = [\"json\", \"stream\", \"rustls-tls\"] }")
        .line("serde = { version = \"1\", features = [\"derive\"] }")
        .line("serde_json = \"1\"")
        .line("thiserror = \"2\"");
    if uses("chrono") {
        w.line("chrono = { version = \"0.4\", features = [\"serde\"] }");
    }
    if uses("uuid") {
        w.line("uuid = { version = \"1\", features = [\"serde\"] }");
    }
    w.blank().line("[dev-dependencies]").line("tokio = { version = \"1\", features = [\"macros\", \"rt-multi-thread\"] }");
    w.finish()
}

fn models(ctx: &GenerationContext<'_>, declarations: &[Declaration<'_>]) -> (String, BTreeSet<String>) {
    let mut imports: BTreeSet<String> = BTreeSet::new();
    let mut body = CodeWriter::spaces(4);

    for decl in declarations {
        let def = decl.def();
        let name = ctx.type_name(def);
        body.blank();
        doc(&mut body, def.description.as_deref());
        if def.deprecated {
            body.line("#[deprecated]");
        }
        match decl {
            Declaration::Object { fields, additional, .. } => {
                body.line("#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]");
                body.open(format!("pub struct {name} {{"));
                for field in fields {
                    let attr = ident(&field.property.name);
                    let bare = attr.trim_start_matches("r#");
                    imports.extend(field.base.imports.iter().cloned());
                    doc(&mut body, field.property.description.as_deref());
                    let mut serde = Vec::new();
                    if bare != field.property.name {
                        serde.push(format!("rename = {}", quote(&field.property.name)));
                    }
                    let mut ty = field.base.expression.clone();
                    if field.indirect {
                        ty = format!("Box<{ty}>");
                    }
                    if field.optional {
                        ty = format!("Option<{ty}>");
                        serde.push("default".into());
                        serde.push("skip_serializing_if = \"Option::is_none\"".into());
                    }
                    if !serde.is_empty() {
                        body.line(format!("#[serde({})]", serde.join(", ")));
                    }
                    body.line(format!("pub {attr}: {ty},"));
                }
                if let Some(additional) = additional {
                    imports.insert("use std::collections::HashMap;".into());
                    imports.extend(additional.imports.iter().cloned());
                    body.line("#[serde(flatten)]");
                    body.line(format!("pub additional_properties: HashMap<String, {}>,", additional.expression));
                }
                body.close("}");
            }
            Declaration::Enum { values, .. } if super::is_string_enum(values) => {
                body.line("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]");
                body.open(format!("pub enum {name} {{"));
                for value in values.iter() {
                    body.line(format!("#[serde(rename = {})]", quote(&value.value.to_string())));
                    body.line(format!("{},", to_pascal_case(&value.name)));
                }
                body.close("}");
            }
            Declaration::Enum { values, .. } => {
                let scalar = ctx.mapper.rules().scalar(enum_primitive(values));
                let ty = scalar.emit(&mut imports);
                body.line(format!("pub type {name} = {ty};"));
                if enum_primitive(values) == PrimitiveKind::Integer {
                    body.blank();
                    body.open(format!("pub mod {} {{", to_snake_case(&name)));
                    for value in values.iter() {
                        body.line(format!("pub const {}: super::{name} = {};", value.name, value.value));
                    }
                    body.close("}");
                }
            }
            Declaration::Union { variants, .. } => {
                body.line("#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]");
                body.line("#[serde(untagged)]");
                body.open(format!("pub enum {name} {{"));
                for variant in variants {
                    imports.extend(variant.mapped.imports.iter().cloned());
                    body.line(format!("{}(Box<{}>),", variant.label, variant.mapped.expression));
                }
                body.close("}");
            }
        }
    }

    let mut w = CodeWriter::spaces(4);
    w.line(format!("// {}", ctx.banner()));
    w.line("#![allow(clippy::large_enum_variant)]");
    w.blank();
    for import in &imports {
        w.line(import);
    }
    w.line("use serde::{Deserialize, Serialize};");
    let mut out = w.finish();
    let body = body.finish();
    if !body.is_empty() {
        out.push('\n');
        out.push_str(&body);
    }
    (out, imports)
}

fn client(ctx: &GenerationContext<'_>, operations: &[OperationView<'_>]) -> String {
    let imports = collect_imports(operations.iter().flat_map(|op| {
        op.params().map(|p| &p.mapped).chain(op.body.iter()).chain(op.response.iter())
    }));
    let mut w = CodeWriter::spaces(4);
    w.line(format!("// {}", ctx.banner()));
    for import in &imports {
        w.line(import);
    }
    w.line("#[allow(unused_imports)]");
    w.line("use crate::models::*;");
    w.blank();
    w.line(format!("pub const DEFAULT_BASE_URL: &str = {};", quote(ctx.base_url())));
    w.blank();
    w.line("#[derive(Debug, thiserror::Error)]");
    w.open("pub enum Error {")
        .line("#[error(\"transport error: {0}\")]")
        .line("Transport(#[from] reqwest::Error),")
        .line("#[error(\"request failed with status {status}: {body}\")]")
        .line("Status { status: u16, body: String },")
        .line("#[error(\"invalid response body: {0}\")]")
        .line("Decode(#[from] serde_json::Error),")
        .close("}");
    w.blank();
    w.line("#[derive(Debug, Clone, Default)]");
    w.open("pub enum Credentials {")
        .line("#[default]")
        .line("None,")
        .line("Bearer(String),")
        .line("Basic { username: String, password: Option<String> },")
        .line("ApiKey(String),")
        .close("}");
    w.blank();
    w.line("#[derive(Debug, Clone)]");
    w.open("pub struct ApiClient {")
        .line("base_url: String,")
        .line("http: reqwest::Client,")
        .line("credentials: Credentials,")
        .close("}");
    w.blank();
    w.open("impl ApiClient {");
    w.open("pub fn new(base_url: impl Into<String>) -> Self {")
        .line("let base_url: String = base_url.into();")
        .line("Self { base_url: base_url.trim_end_matches('/').to_string(), http: reqwest::Client::new(), credentials: Credentials::None }")
        .close("}");
    w.blank();
    w.open("pub fn with_credentials(mut self, credentials: Credentials) -> Self {")
        .line("self.credentials = credentials;")
        .line("self")
        .close("}");
    w.blank();
    w.open("pub fn with_http_client(mut self, http: reqwest::Client) -> Self {")
        .line("self.http = http;")
        .line("self")
        .close("}");

    for op in operations {
        w.blank();
        operation(&mut w, op);
    }

    w.blank();
    w.open("fn authorize(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {");
    w.open("match &self.credentials {");
    w.line("Credentials::None => {}");
    let applications = ctx.auth();
    for application in &applications {
        match application {
            AuthApplication::Bearer => {
                w.line("Credentials::Bearer(token) => request = request.bearer_auth(token),");
            }
            AuthApplication::Basic => {
                w.line("Credentials::Basic { username, password } => request = request.basic_auth(username, password.as_ref()),");
            }
            AuthApplication::Header(name) => {
                w.line(format!("Credentials::ApiKey(key) => request = request.header({}, key),", quote(name)));
            }
            AuthApplication::Query(name) => {
                w.line(format!("Credentials::ApiKey(key) => request = request.query(&[({}, key)]),", quote(name)));
            }
            AuthApplication::Cookie(name) => {
                w.line(format!(
                    "Credentials::ApiKey(key) => request = request.header(\"Cookie\", format!(\"{}={{key}}\")),",
                    name.replace('"', "")
                ));
            }
        }
    }
    w.line("#[allow(unreachable_patterns)]");
    w.line("_ => {}");
    w.close("}");
    w.line("request");
    w.close("}");

    w.blank();
    w.open("async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {")
        .line("let response = self.authorize(request).send().await?;")
        .line("let status = response.status();")
        .open("if !status.is_success() {")
        .line("let body = response.text().await.unwrap_or_default();")
        .line("return Err(Error::Status { status: status.as_u16(), body });")
        .close("}")
        .line("Ok(response)")
        .close("}");
    w.blank();
    w.open("async fn decode<T: serde::de::DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, Error> {")
        .line("let bytes = self.send(request).await?.bytes().await?;")
        .line("Ok(serde_json::from_slice(&bytes)?)")
        .close("}");
    w.close("}");
    w.finish()
}

fn operation(w: &mut CodeWriter, op: &OperationView<'_>) {
    let endpoint = op.endpoint;
    let method = ident(&endpoint.operation_id);

    let mut args = vec!["&self".to_string()];
    for p in op.params() {
        let ty = &p.mapped.expression;
        let ty = if p.parameter.required || p.mapped.nullable { ty.clone() } else { format!("Option<{ty}>") };
        args.push(format!("{}: {ty}", ident(&p.parameter.name)));
    }
    let required_body = endpoint.request_body.as_ref().is_some_and(|b| b.required);
    if let Some(body) = &op.body {
        let ty = if required_body { format!("&{}", body.expression) } else { format!("Option<&{}>", body.expression) };
        args.push(format!("body: {ty}"));
    }

    let mut format_args = String::new();
    let mut template = String::new();
    for part in path_parts(&endpoint.path) {
        match part {
            PathPart::Literal(text) => template.push_str(&text.replace('{', "{{").replace('}', "}}")),
            PathPart::Param(name) => {
                template.push_str("{}");
                format_args.push_str(&format!(", {}", ident(name)));
            }
        }
    }

    let output = if endpoint.streaming {
        "reqwest::Response".to_string()
    } else {
        op.response.as_ref().map(|r| r.expression.clone()).unwrap_or_else(|| "()".into())
    };

    doc(w, endpoint.summary.as_deref().or(endpoint.description.as_deref()));
    if endpoint.deprecated {
        w.line("#[deprecated]");
    }
    w.open(format!("pub async fn {method}({}) -> Result<{output}, Error> {{", args.join(", ")));
    w.line(format!(
        "let url = format!(\"{{}}{template}\", self.base_url{format_args});"
    ));
    w.line(format!(
        "let mut request = self.http.request(reqwest::Method::{}, url);",
        endpoint.method.as_str()
    ));
    for p in &op.query_params {
        let name = ident(&p.parameter.name);
        if p.parameter.required && !p.mapped.nullable {
            w.line(format!("request = request.query(&[({}, {name}.to_string())]);", quote(&p.parameter.name)));
        } else {
            w.open(format!("if let Some(value) = &{name} {{"))
                .line(format!("request = request.query(&[({}, value.to_string())]);", quote(&p.parameter.name)))
                .close("}");
        }
    }
    for p in &op.header_params {
        let name = ident(&p.parameter.name);
        let header = match p.parameter.location {
            crate::ir::ParameterLocation::Cookie => format!("\"Cookie\", format!(\"{}={{}}\", ", p.parameter.name),
            _ => format!("{}, ", quote(&p.parameter.name)),
        };
        let close = if header.contains("format!") { ")" } else { "" };
        if p.parameter.required && !p.mapped.nullable {
            w.line(format!("request = request.header({header}{name}.to_string(){close});"));
        } else {
            w.open(format!("if let Some(value) = &{name} {{"))
                .line(format!("request = request.header({header}value.to_string(){close});"))
                .close("}");
        }
    }
    if let Some(request) = &endpoint.request_body
        && op.body.is_some()
    {
        let set = if request.content_type.contains("json") {
            "request = request.json(body);".to_string()
        } else {
            format!(
                "request = request.header(\"Content-Type\", {}).body(serde_json::to_vec(body)?);",
                quote(&request.content_type)
            )
        };
        if required_body {
            w.line(set);
        } else {
            w.open("if let Some(body) = body {").line(set).close("}");
        }
    }
    if endpoint.streaming {
        w.line("self.send(request).await");
    } else if op.response.is_some() {
        w.line("self.decode(request).await");
    } else {
        w.line("self.send(request).await?;");
        w.line("Ok(())");
    }
    w.close("}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::fixtures;
    use crate::lower::MapperOptions;

    fn output() -> GeneratorOutput {
        let schema = fixtures::petstore();
        let ctx = GenerationContext::new(&schema, TargetLanguage::Rust, MapperOptions::default(), "petstore-client", "1.0.0");
        RustGenerator.generate(&ctx).unwrap()
    }

    fn file<'o>(out: &'o GeneratorOutput, path: &str) -> &'o str {
        &out.files.iter().find(|f| f.path == path).unwrap().content
    }

    #[test]
    fn crate_layout() {
        let out = output();
        let paths: Vec<&str> = out.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["Cargo.toml", "src/lib.rs", "src/models.rs", "src/client.rs"]);
        let manifest = file(&out, "Cargo.toml");
        assert!(manifest.contains("name = \"petstore-client\""));
        assert!(manifest.contains("chrono = "));
        assert!(manifest.contains("uuid = "));
        assert!(file(&out, "src/lib.rs").contains("pub use client::{ApiClient, Error};"));
    }

    #[test]
    fn models_use_serde() {
        let out = output();
        let models = file(&out, "src/models.rs");
        assert!(models.contains("use chrono::{DateTime, Utc};"));
        assert!(models.contains("pub struct Pet {"));
        assert!(models.contains("    pub id: Uuid,"));
        assert!(models.contains("    pub tags: Option<Vec<String>>,"));
        assert!(models.contains("    pub parent: Option<Box<Pet>>,"));
        assert!(models.contains("    pub attributes: Option<HashMap<String, String>>,"));
        assert!(models.contains("    #[serde(rename = \"in-care\")]\n    InCare,"));
        assert!(models.contains("#[serde(untagged)]\npub enum Owner {\n    Person(Box<Person>),\n    Shelter(Box<Shelter>),\n}"));
        assert!(models.contains("pub type Priority = i64;"));
        assert!(models.contains("    pub r#type: Option<String>,"));
    }

    #[test]
    fn client_methods() {
        let out = output();
        let client = file(&out, "src/client.rs");
        assert!(client.contains("pub async fn list_pets(&self, limit: Option<i64>) -> Result<Vec<Pet>, Error> {"));
        assert!(client.contains("pub async fn get_pet(&self, pet_id: Uuid, x_trace: Option<String>) -> Result<Pet, Error> {"));
        assert!(client.contains("let url = format!(\"{}/pets/{}\", self.base_url, pet_id);"));
        assert!(client.contains("pub async fn create_pet(&self, body: &NewPet) -> Result<Pet, Error> {"));
        assert!(client.contains("pub async fn delete_pet(&self, pet_id: Uuid) -> Result<(), Error> {"));
        assert!(client.contains("pub async fn stream_events(&self) -> Result<reqwest::Response, Error> {"));
        assert!(client.contains("Credentials::Bearer(token) => request = request.bearer_auth(token),"));
    }
}
