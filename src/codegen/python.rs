//! Python: dataclasses, `Enum`s and an `httpx` client.
use std::collections::BTreeSet;

use super::{
    collect_imports, identifier, path_parts, quote, AuthApplication, CodeWriter, Declaration, GeneratedFile,
    GenerationContext, Generator, GeneratorOutput, OperationView, PackageCommands, PathPart,
};
use crate::error::Result;
use crate::ir::EnumLiteral;
use crate::lower::TargetLanguage;
use crate::registry::naming::{to_screaming_snake_case, to_snake_case};

pub struct PythonGenerator;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue", "def",
    "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield", "self",
];

fn ident(raw: &str) -> String {
    identifier(raw, to_snake_case, KEYWORDS, |s| format!("{s}_"))
}

fn module_name(package: &str) -> String {
    ident(package)
}

fn literal(value: &EnumLiteral) -> String {
    match value {
        EnumLiteral::String(s) => quote(s),
        EnumLiteral::Bool(true) => "True".into(),
        EnumLiteral::Bool(false) => "False".into(),
        other => other.to_string(),
    }
}

/// `from x import a` lines merged per module; bare `import x` kept as is.
fn import_block(imports: &BTreeSet<String>) -> Vec<String> {
    let mut merged: std::collections::BTreeMap<&str, BTreeSet<&str>> = Default::default();
    let mut plain = BTreeSet::new();
    for line in imports {
        match line.strip_prefix("from ").and_then(|rest| rest.split_once(" import ")) {
            Some((module, name)) => {
                merged.entry(module).or_default().insert(name);
            }
            None => {
                plain.insert(line.clone());
            }
        }
    }
    let mut out: Vec<String> = plain.into_iter().collect();
    for (module, names) in merged {
        out.push(format!("from {module} import {}", names.into_iter().collect::<Vec<_>>().join(", ")));
    }
    out
}

fn docstring(w: &mut CodeWriter, text: Option<&str>) {
    if let Some(text) = text {
        let text = text.trim().replace("\"\"\"", "\\\"\\\"\\\"");
        if text.contains('\n') {
            w.line("\"\"\"");
            w.doc("", Some(&text));
            w.line("\"\"\"");
        } else {
            w.line(format!("\"\"\"{text}\"\"\""));
        }
    }
}

impl Generator for PythonGenerator {
    fn language(&self) -> TargetLanguage {
        TargetLanguage::Python
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratorOutput> {
        let declarations = ctx.declarations()?;
        let operations = ctx.operations()?;
        let module = module_name(&ctx.package_name);

        let files = vec![
            GeneratedFile::new(
                format!("{module}/__init__.py"),
                format!(
                    "# {}\nfrom .models import *  # noqa: F401,F403\nfrom .client import ApiClient, ApiError  # noqa: F401\n\n__version__ = {}\n",
                    ctx.banner(),
                    quote(&ctx.package_version)
                ),
            ),
            GeneratedFile::new(format!("{module}/models.py"), models(ctx, &declarations)),
            GeneratedFile::new(format!("{module}/client.py"), client(ctx, &operations)),
            GeneratedFile::new("pyproject.toml", pyproject(ctx)),
        ];
        Ok(GeneratorOutput { files, warnings: ctx.degraded_union_warnings() })
    }

    fn commands(&self, _ctx: &GenerationContext<'_>) -> PackageCommands {
        PackageCommands {
            build_command: Some("python -m build".into()),
            test_command: Some("python -m pytest".into()),
            publish_command: Some("python -m twine upload dist/*".into()),
            registry_url: Some("https://upload.pypi.org/legacy/".into()),
        }
    }
}

fn pyproject(ctx: &GenerationContext<'_>) -> String {
    let mut w = CodeWriter::spaces(4);
    w.line("[build-system]")
        .line("requires = [\"setuptools>=68\", \"wheel\"]")
        .line("build-backend = \"setuptools.build_meta\"")
        .blank()
        .line("[project]")
        .line(format!("name = {}", quote(&ctx.package_name)))
        .line(format!("version = {}", quote(&ctx.package_version)))
        .line(format!("description = {}", quote(&ctx.description())))
        .line("requires-python = \">=3.9\"")
        .line("dependencies = [\"httpx>=0.27\"]")
        .blank()
        .line("[project.optional-dependencies]")
        .line("test = [\"pytest>=8\"]");
    w.finish()
}

fn models(ctx: &GenerationContext<'_>, declarations: &[Declaration<'_>]) -> String {
    let mut imports: BTreeSet<String> = BTreeSet::new();
    let mut body = CodeWriter::spaces(4);
    let mut unions = CodeWriter::spaces(4);
    let mut exported = Vec::new();

    for decl in declarations {
        let def = decl.def();
        let name = ctx.type_name(def);
        exported.push(quote(&name));
        match decl {
            Declaration::Object { fields, additional, .. } => {
                imports.insert("from dataclasses import dataclass".into());
                body.blank().blank();
                body.line("@dataclass");
                body.open(format!("class {name}:"));
                docstring(&mut body, def.description.as_deref());
                // Dataclass fields without defaults must come first.
                let (required, optional): (Vec<_>, Vec<_>) = fields.iter().partition(|f| !f.optional);
                for field in required.iter().chain(&optional) {
                    let attr = ident(&field.property.name);
                    let annotation = if field.optional { ctx.optional(&field.base) } else { field.mapped.clone() };
                    imports.extend(annotation.imports.iter().cloned());
                    let mut metadata = Vec::new();
                    if attr != field.property.name {
                        metadata.push(format!("metadata={{\"json\": {}}}", quote(&field.property.name)));
                    }
                    let default = match (field.optional, metadata.is_empty()) {
                        (false, true) => String::new(),
                        (false, false) => {
                            imports.insert("from dataclasses import field".into());
                            format!(" = field({})", metadata.join(", "))
                        }
                        (true, true) => " = None".into(),
                        (true, false) => {
                            imports.insert("from dataclasses import field".into());
                            format!(" = field(default=None, {})", metadata.join(", "))
                        }
                    };
                    body.line(format!("{attr}: {}{default}", annotation.expression));
                }
                if let Some(additional) = additional {
                    imports.insert("from dataclasses import field".into());
                    imports.insert("from typing import Dict".into());
                    imports.extend(additional.imports.iter().cloned());
                    body.line(format!(
                        "additional_properties: Dict[str, {}] = field(default_factory=dict)",
                        additional.expression
                    ));
                }
                if fields.is_empty() && additional.is_none() {
                    body.line("pass");
                }
                body.dedent();
            }
            Declaration::Enum { values, .. } => {
                imports.insert("from enum import Enum".into());
                let bases = if super::is_string_enum(values) { "str, Enum" } else { "Enum" };
                body.blank().blank();
                body.open(format!("class {name}({bases}):"));
                docstring(&mut body, def.description.as_deref());
                for value in values.iter() {
                    body.line(format!("{} = {}", to_screaming_snake_case(&value.name), literal(&value.value)));
                }
                body.dedent();
            }
            Declaration::Union { variants, .. } => {
                imports.insert("from typing import Union".into());
                for variant in variants {
                    imports.extend(variant.mapped.imports.iter().cloned());
                }
                // Quoted so unions may name classes declared later.
                let members: Vec<String> = variants.iter().map(|v| quote(&v.mapped.expression)).collect();
                unions.line(format!("{name} = Union[{}]", members.join(", ")));
            }
        }
    }

    let mut w = CodeWriter::spaces(4);
    w.line(format!("# {}", ctx.banner()));
    w.line("from __future__ import annotations");
    w.blank();
    w.lines(import_block(&imports));
    w.blank();
    w.line(format!("__all__ = [{}]", exported.join(", ")));
    let mut out = w.finish();
    let body = body.finish();
    if !body.is_empty() {
        out.push_str("\n\n");
        out.push_str(&body);
    }
    let unions = unions.finish();
    if !unions.is_empty() {
        out.push_str("\n\n");
        out.push_str(&unions);
    }
    out
}

fn client(ctx: &GenerationContext<'_>, operations: &[OperationView<'_>]) -> String {
    let mut imports = collect_imports(operations.iter().flat_map(|op| {
        op.params().map(|p| &p.mapped).chain(op.body.iter()).chain(op.response.iter())
    }));
    imports.insert("from typing import Any".into());
    imports.insert("from typing import Dict".into());
    imports.insert("from typing import Optional".into());
    if operations.iter().any(|op| op.endpoint.streaming) {
        imports.insert("from typing import Iterator".into());
    }
    let basic = ctx.auth().contains(&AuthApplication::Basic);

    let mut w = CodeWriter::spaces(4);
    w.line(format!("# {}", ctx.banner()));
    w.line("from __future__ import annotations");
    w.blank();
    w.line("import dataclasses");
    w.line("import enum");
    w.lines(import_block(&imports));
    w.blank();
    w.line("import httpx");
    w.blank();
    w.line("from .models import *  # noqa: F401,F403");
    w.blank().blank();
    w.open("def _encode(value: Any) -> Any:")
        .open("if dataclasses.is_dataclass(value):")
        .line("out: Dict[str, Any] = {}")
        .open("for f in dataclasses.fields(value):")
        .line("item = getattr(value, f.name)")
        .open("if f.name == \"additional_properties\":")
        .line("out.update({k: _encode(v) for k, v in item.items()})")
        .close("elif item is not None:")
        .indent()
        .line("out[f.metadata.get(\"json\", f.name)] = _encode(item)")
        .dedent()
        .dedent()
        .line("return out")
        .dedent()
        .open("if isinstance(value, enum.Enum):")
        .line("return value.value")
        .dedent()
        .open("if isinstance(value, (list, tuple)):")
        .line("return [_encode(v) for v in value]")
        .dedent()
        .open("if isinstance(value, dict):")
        .line("return {k: _encode(v) for k, v in value.items()}")
        .dedent()
        .open("if hasattr(value, \"isoformat\"):")
        .line("return value.isoformat()")
        .dedent()
        .line("return value")
        .dedent();
    w.blank().blank();
    w.open("class ApiError(Exception):")
        .open("def __init__(self, status: int, body: str) -> None:")
        .line("super().__init__(f\"request failed with status {status}\")")
        .line("self.status = status")
        .line("self.body = body")
        .dedent()
        .dedent();
    w.blank().blank();
    w.open("class ApiClient:");
    docstring(&mut w, Some(&ctx.description()));
    w.blank();
    w.open("def __init__(")
        .line("self,")
        .line(format!("base_url: str = {},", quote(ctx.base_url())))
        .line("token: Optional[str] = None,")
        .line("api_key: Optional[str] = None,");
    if basic {
        w.line("username: Optional[str] = None,").line("password: Optional[str] = None,");
    }
    w.line("timeout: float = 30.0,").close(") -> None:").indent();
    w.line("self._token = token").line("self._api_key = api_key");
    let auth = if basic { "(username, password or \"\") if username is not None else None" } else { "None" };
    w.line(format!("self._client = httpx.Client(base_url=base_url.rstrip(\"/\"), timeout=timeout, auth={auth})"));
    w.dedent();

    w.blank();
    w.open("def close(self) -> None:").line("self._client.close()").dedent();
    w.blank();
    w.open("def __enter__(self) -> \"ApiClient\":").line("return self").dedent();
    w.blank();
    w.open("def __exit__(self, *exc: Any) -> None:").line("self.close()").dedent();

    for op in operations {
        w.blank();
        operation(&mut w, ctx, op);
    }

    w.blank();
    w.open("def _prepare(self, params: Dict[str, Any], headers: Dict[str, Any]) -> None:");
    w.line("params.update({k: _encode(v) for k, v in list(params.items()) if v is not None})");
    w.line("for k in [k for k, v in params.items() if v is None]:").indent().line("del params[k]").dedent();
    w.line("for k in [k for k, v in headers.items() if v is None]:").indent().line("del headers[k]").dedent();
    for application in ctx.auth() {
        match application {
            AuthApplication::Bearer => {
                w.open("if self._token:").line("headers[\"Authorization\"] = f\"Bearer {self._token}\"").dedent();
            }
            AuthApplication::Basic => {
                w.line("# basic credentials travel through the httpx client");
            }
            AuthApplication::Header(name) => {
                w.open("if self._api_key:").line(format!("headers[{}] = self._api_key", quote(&name))).dedent();
            }
            AuthApplication::Query(name) => {
                w.open("if self._api_key:").line(format!("params[{}] = self._api_key", quote(&name))).dedent();
            }
            AuthApplication::Cookie(name) => {
                w.open("if self._api_key:")
                    .line(format!("headers[\"Cookie\"] = f\"{}={{self._api_key}}\"", name.replace('"', "")))
                    .dedent();
            }
        }
    }
    w.dedent();

    w.blank();
    w.open("def _request(self, method: str, path: str, params: Dict[str, Any], headers: Dict[str, Any], body: Any = None, content_type: Optional[str] = None) -> Any:")
        .line("self._prepare(params, headers)")
        .line("kwargs: Dict[str, Any] = {\"params\": params, \"headers\": {k: str(v) for k, v in headers.items()}}")
        .open("if body is not None:")
        .open("if content_type is None or \"json\" in content_type:")
        .line("kwargs[\"json\"] = _encode(body)")
        .close("else:")
        .indent()
        .line("kwargs[\"content\"] = body")
        .line("kwargs[\"headers\"][\"Content-Type\"] = content_type")
        .dedent()
        .dedent()
        .line("response = self._client.request(method, path, **kwargs)")
        .open("if response.is_error:")
        .line("raise ApiError(response.status_code, response.text)")
        .dedent()
        .open("if not response.content:")
        .line("return None")
        .dedent()
        .line("return response.json()")
        .dedent();

    if operations.iter().any(|op| op.endpoint.streaming) {
        w.blank();
        w.open("def _stream(self, method: str, path: str, params: Dict[str, Any], headers: Dict[str, Any]) -> Iterator[str]:")
            .line("self._prepare(params, headers)")
            .open("with self._client.stream(method, path, params=params, headers={k: str(v) for k, v in headers.items()}) as response:")
            .open("if response.is_error:")
            .line("response.read()")
            .line("raise ApiError(response.status_code, response.text)")
            .dedent()
            .line("yield from response.iter_lines()")
            .dedent()
            .dedent();
    }
    w.dedent();
    w.finish()
}

fn operation(w: &mut CodeWriter, ctx: &GenerationContext<'_>, op: &OperationView<'_>) {
    let endpoint = op.endpoint;
    let method = ident(&endpoint.operation_id);

    let mut args = vec!["self".to_string()];
    for p in &op.path_params {
        args.push(format!("{}: {}", ident(&p.parameter.name), p.mapped.expression));
    }
    let required_body = endpoint.request_body.as_ref().is_some_and(|b| b.required);
    if let Some(body) = &op.body
        && required_body
    {
        args.push(format!("body: {}", body.expression));
    }
    let mut keyword: Vec<String> = Vec::new();
    if let Some(body) = &op.body
        && !required_body
    {
        keyword.push(format!("body: {} = None", ctx.optional(body).expression));
    }
    for p in op.query_params.iter().chain(&op.header_params) {
        let name = ident(&p.parameter.name);
        if p.parameter.required {
            keyword.push(format!("{name}: {}", p.mapped.expression));
        } else {
            keyword.push(format!("{name}: {} = None", ctx.optional(&p.mapped).expression));
        }
    }
    // Required keyword-only arguments may follow defaulted ones.
    if !keyword.is_empty() {
        args.push("*".into());
        args.extend(keyword);
    }

    let mut path = String::from("f\"");
    for part in path_parts(&endpoint.path) {
        match part {
            PathPart::Literal(text) => path.push_str(&text.replace('{', "{{").replace('}', "}}")),
            PathPart::Param(name) => path.push_str(&format!("{{{}}}", ident(name))),
        }
    }
    path.push('"');

    let dict = |params: &[super::ParamView<'_>]| -> String {
        let pairs: Vec<String> =
            params.iter().map(|p| format!("{}: {}", quote(&p.parameter.name), ident(&p.parameter.name))).collect();
        format!("{{{}}}", pairs.join(", "))
    };

    if endpoint.streaming {
        w.open(format!("def {method}({}) -> Iterator[str]:", args.join(", ")));
        docstring(w, endpoint.summary.as_deref().or(endpoint.description.as_deref()));
        w.line(format!(
            "return self._stream({}, {path}, {}, {})",
            quote(endpoint.method.as_str()),
            dict(&op.query_params),
            dict(&op.header_params)
        ));
    } else {
        let output = op.response.as_ref().map(|r| r.expression.clone()).unwrap_or_else(|| "None".into());
        w.open(format!("def {method}({}) -> {output}:", args.join(", ")));
        docstring(w, endpoint.summary.as_deref().or(endpoint.description.as_deref()));
        let body = match (&endpoint.request_body, &op.body) {
            (Some(request), Some(_)) => format!(", body, {}", quote(&request.content_type)),
            _ => String::new(),
        };
        w.line(format!(
            "return self._request({}, {path}, {}, {}{body})",
            quote(endpoint.method.as_str()),
            dict(&op.query_params),
            dict(&op.header_params)
        ));
    }
    w.dedent();
}
