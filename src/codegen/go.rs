//! Go: tagged structs and a `net/http` client. Unions have no native form
//! and always lower to `interface{}`.
use std::collections::BTreeSet;

use super::{
    enum_primitive, identifier, path_parts, quote, AuthApplication, CodeWriter, Declaration, GeneratedFile,
    GenerationContext, Generator, GeneratorOutput, OperationView, PackageCommands, PathPart,
};
use crate::error::Result;
use crate::ir::{EnumLiteral, ParameterLocation};
use crate::lower::TargetLanguage;
use crate::registry::naming::{to_camel_case, to_pascal_case, to_snake_case};

pub struct GoGenerator;

const KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough", "for", "func",
    "go", "goto", "if", "import", "interface", "map", "package", "range", "return", "select", "struct",
    "switch", "type", "var", "ctx", "c", "req", "resp", "err", "query", "headers", "result", "body", "url",
    "fmt", "io", "http", "json",
];

fn local(raw: &str) -> String {
    identifier(raw, to_camel_case, KEYWORDS, |s| format!("{s}Param"))
}

fn exported(raw: &str) -> String {
    let name = to_pascal_case(raw);
    if name.is_empty() { "Value".into() } else { name }
}

fn package_ident(package: &str) -> String {
    let name: String = to_snake_case(package).chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) { format!("api{name}") } else { name }
}

fn literal(value: &EnumLiteral) -> String {
    match value {
        EnumLiteral::String(s) => quote(s),
        other => other.to_string(),
    }
}

fn doc(w: &mut CodeWriter, name: &str, text: Option<&str>) {
    if let Some(text) = text {
        let mut lines = text.trim().lines();
        if let Some(first) = lines.next() {
            w.line(format!("// {name} {}", first.trim_end()));
        }
        for line in lines {
            w.line(format!("// {}", line.trim_end()).trim_end().to_string());
        }
    }
}

fn import_block(w: &mut CodeWriter, imports: &BTreeSet<String>) {
    match imports.len() {
        0 => {}
        1 => {
            w.line(format!("import {}", quote(imports.iter().next().map(String::as_str).unwrap_or_default())));
        }
        _ => {
            w.open("import (");
            for import in imports {
                w.line(quote(import));
            }
            w.close(")");
        }
    }
}

impl Generator for GoGenerator {
    fn language(&self) -> TargetLanguage {
        TargetLanguage::Go
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratorOutput> {
        let declarations = ctx.declarations()?;
        let operations = ctx.operations()?;
        let package = package_ident(&ctx.package_name);

        let files = vec![
            GeneratedFile::new("go.mod", format!("module {}\n\ngo 1.21\n", module_path(ctx))),
            GeneratedFile::new("models.go", models(ctx, &package, &declarations)),
            GeneratedFile::new("client.go", client(ctx, &package, &operations)),
        ];
        Ok(GeneratorOutput { files, warnings: ctx.degraded_union_warnings() })
    }

    fn commands(&self, ctx: &GenerationContext<'_>) -> PackageCommands {
        PackageCommands {
            build_command: Some("go build ./...".into()),
            test_command: Some("go test ./...".into()),
            publish_command: Some(format!(
                "git tag v{0} && git push origin v{0}",
                ctx.package_version.trim_start_matches('v')
            )),
            registry_url: Some("https://proxy.golang.org".into()),
        }
    }
}

fn module_path(ctx: &GenerationContext<'_>) -> String {
    if ctx.package_name.contains('/') {
        ctx.package_name.clone()
    } else {
        format!("example.com/{}", package_ident(&ctx.package_name))
    }
}

fn models(ctx: &GenerationContext<'_>, package: &str, declarations: &[Declaration<'_>]) -> String {
    let mut imports = BTreeSet::new();
    let mut body = CodeWriter::tabs();

    for decl in declarations {
        let def = decl.def();
        let name = ctx.type_name(def);
        body.blank();
        doc(&mut body, &name, def.description.as_deref());
        if def.deprecated {
            body.line(format!("// Deprecated: {name} is deprecated."));
        }
        match decl {
            Declaration::Object { fields, additional, .. } => {
                body.open(format!("type {name} struct {{"));
                for field in fields {
                    imports.extend(field.base.imports.iter().cloned());
                    let mut ty = if field.property.ty.nullable { field.mapped.expression.clone() } else { field.base.expression.clone() };
                    // Self-reference through plain struct fields needs a pointer.
                    if field.indirect && !ty.starts_with('*') {
                        ty = format!("*{ty}");
                    }
                    let omit = if field.optional { ",omitempty" } else { "" };
                    if let Some(text) = field.property.description.as_deref() {
                        body.line(format!("// {}", text.trim().replace('\n', " ")));
                    }
                    body.line(format!(
                        "{} {ty} `json:\"{}{omit}\"`",
                        exported(&field.property.name),
                        field.property.name.replace('"', "")
                    ));
                }
                if let Some(additional) = additional {
                    imports.extend(additional.imports.iter().cloned());
                    body.line(format!("AdditionalProperties map[string]{} `json:\"-\"`", additional.expression));
                }
                body.close("}");
            }
            Declaration::Enum { values, .. } => {
                let scalar = ctx.mapper.rules().scalar(enum_primitive(values));
                let base = scalar.emit(&mut imports);
                body.line(format!("type {name} {base}"));
                body.blank();
                body.open("const (");
                for value in values.iter() {
                    body.line(format!("{name}{} {name} = {}", to_pascal_case(&value.name), literal(&value.value)));
                }
                body.close(")");
            }
            // Go has no sum types; unions never reach here.
            Declaration::Union { .. } => {}
        }
    }

    let mut w = CodeWriter::tabs();
    w.line(format!("// Code generated by canonapi. DO NOT EDIT.\n// Source: {} {}", ctx.schema.metadata.title, ctx.schema.metadata.version));
    w.blank();
    w.line(format!("package {package}"));
    w.blank();
    import_block(&mut w, &imports);
    let mut out = w.finish();
    let body = body.finish();
    if !body.is_empty() {
        out.push('\n');
        out.push_str(&body);
    }
    out
}

fn client(ctx: &GenerationContext<'_>, package: &str, operations: &[OperationView<'_>]) -> String {
    let mut imports: BTreeSet<String> =
        ["bytes", "context", "encoding/json", "fmt", "io", "net/http", "net/url"].iter().map(|s| s.to_string()).collect();
    imports.extend(super::collect_imports(
        operations.iter().flat_map(|op| op.params().map(|p| &p.mapped).chain(op.body.iter()).chain(op.response.iter())),
    ));
    let auth = ctx.auth();
    if auth.contains(&AuthApplication::Basic) {
        imports.insert("encoding/base64".into());
    }

    let mut w = CodeWriter::tabs();
    w.line("// Code generated by canonapi. DO NOT EDIT.");
    w.blank();
    w.line(format!("package {package}"));
    w.blank();
    import_block(&mut w, &imports);
    w.blank();
    w.line(format!("const DefaultBaseURL = {}", quote(ctx.base_url())));
    w.blank();
    w.line("// APIError is returned for non-2xx responses.");
    w.open("type APIError struct {").line("StatusCode int").line("Body       string").close("}");
    w.blank();
    w.open("func (e *APIError) Error() string {")
        .line("return fmt.Sprintf(\"request failed with status %d: %s\", e.StatusCode, e.Body)")
        .close("}");
    w.blank();
    w.line("// Client talks to the API over HTTP.");
    w.open("type Client struct {")
        .line("BaseURL    string")
        .line("HTTPClient *http.Client")
        .line("Token      string")
        .line("APIKey     string")
        .line("Username   string")
        .line("Password   string")
        .close("}");
    w.blank();
    w.open("func NewClient(baseURL string) *Client {")
        .open("if baseURL == \"\" {")
        .line("baseURL = DefaultBaseURL")
        .close("}")
        .line("return &Client{BaseURL: baseURL, HTTPClient: http.DefaultClient}")
        .close("}");

    for op in operations {
        w.blank();
        operation(&mut w, op);
    }

    w.blank();
    w.open("func (c *Client) do(ctx context.Context, method, path string, query url.Values, headers map[string]string, body any, contentType string) (*http.Response, error) {");
    w.line("var reader io.Reader");
    w.open("if body != nil {")
        .open("if raw, ok := body.([]byte); ok {")
        .line("reader = bytes.NewReader(raw)")
        .close("} else {")
        .indent()
        .line("encoded, err := json.Marshal(body)")
        .open("if err != nil {")
        .line("return nil, err")
        .close("}")
        .line("reader = bytes.NewReader(encoded)")
        .close("}")
        .close("}");
    for application in &auth {
        if let AuthApplication::Query(name) = application {
            w.open("if c.APIKey != \"\" {").line(format!("query.Set({}, c.APIKey)", quote(name))).close("}");
        }
    }
    w.line("target := c.BaseURL + path");
    w.open("if encoded := query.Encode(); encoded != \"\" {").line("target += \"?\" + encoded").close("}");
    w.line("req, err := http.NewRequestWithContext(ctx, method, target, reader)");
    w.open("if err != nil {").line("return nil, err").close("}");
    w.open("if body != nil {").line("req.Header.Set(\"Content-Type\", contentType)").close("}");
    w.open("for key, value := range headers {").line("req.Header.Set(key, value)").close("}");
    for application in &auth {
        match application {
            AuthApplication::Bearer => {
                w.open("if c.Token != \"\" {").line("req.Header.Set(\"Authorization\", \"Bearer \"+c.Token)").close("}");
            }
            AuthApplication::Basic => {
                w.open("if c.Username != \"\" {")
                    .line("credentials := base64.StdEncoding.EncodeToString([]byte(c.Username + \":\" + c.Password))")
                    .line("req.Header.Set(\"Authorization\", \"Basic \"+credentials)")
                    .close("}");
            }
            AuthApplication::Header(name) => {
                w.open("if c.APIKey != \"\" {").line(format!("req.Header.Set({}, c.APIKey)", quote(name))).close("}");
            }
            AuthApplication::Cookie(name) => {
                w.open("if c.APIKey != \"\" {")
                    .line(format!("req.AddCookie(&http.Cookie{{Name: {}, Value: c.APIKey}})", quote(name)))
                    .close("}");
            }
            AuthApplication::Query(_) => {}
        }
    }
    w.line("resp, err := c.HTTPClient.Do(req)");
    w.open("if err != nil {").line("return nil, err").close("}");
    w.open("if resp.StatusCode < 200 || resp.StatusCode >= 300 {")
        .line("defer resp.Body.Close()")
        .line("data, _ := io.ReadAll(resp.Body)")
        .line("return nil, &APIError{StatusCode: resp.StatusCode, Body: string(data)}")
        .close("}");
    w.line("return resp, nil");
    w.close("}");
    w.blank();
    w.open("func decode(resp *http.Response, out any) error {")
        .line("defer resp.Body.Close()")
        .line("return json.NewDecoder(resp.Body).Decode(out)")
        .close("}");
    w.finish()
}

fn operation(w: &mut CodeWriter, op: &OperationView<'_>) {
    let endpoint = op.endpoint;
    let method = exported(&endpoint.operation_id);

    let mut args = vec!["ctx context.Context".to_string()];
    for p in op.params() {
        let ty = &p.mapped.expression;
        let ty = if p.parameter.required || ty.starts_with('*') || ty.starts_with("[]") || ty.starts_with("map[") {
            ty.clone()
        } else {
            format!("*{ty}")
        };
        args.push(format!("{} {ty}", local(&p.parameter.name)));
    }
    if let Some(body) = &op.body {
        args.push(format!("body {}", body.expression));
    }

    let output = if endpoint.streaming {
        Some("io.ReadCloser".to_string())
    } else {
        op.response.as_ref().map(|r| r.expression.clone())
    };
    let signature = match &output {
        Some(out) => format!("({out}, error)"),
        None => "error".into(),
    };
    let fail = match &output {
        Some(out) if out.starts_with('*') || out.starts_with("[]") || out.starts_with("map[") || out == "io.ReadCloser" || out == "interface{}" => {
            "return nil, err".to_string()
        }
        Some(out) => format!("var zero {out}\n\t\treturn zero, err"),
        None => "return err".into(),
    };

    let mut path = Vec::new();
    for part in path_parts(&endpoint.path) {
        match part {
            PathPart::Literal(text) => path.push(quote(text)),
            PathPart::Param(name) => path.push(format!("url.PathEscape(fmt.Sprint({}))", local(name))),
        }
    }
    let path = if path.is_empty() { "\"\"".to_string() } else { path.join(" + ") };

    doc(w, &method, endpoint.summary.as_deref().or(endpoint.description.as_deref()));
    if endpoint.deprecated {
        w.line(format!("// Deprecated: {method} is deprecated."));
    }
    w.open(format!("func (c *Client) {method}({}) {signature} {{", args.join(", ")));
    w.line("query := url.Values{}");
    w.line("headers := map[string]string{}");
    for p in op.query_params.iter().chain(&op.header_params) {
        let name = local(&p.parameter.name);
        let wire = quote(&p.parameter.name);
        let set = |value: &str| match p.parameter.location {
            ParameterLocation::Query => format!("query.Set({wire}, fmt.Sprint({value}))"),
            ParameterLocation::Cookie => format!("headers[\"Cookie\"] = {}+\"=\"+fmt.Sprint({value})", wire),
            _ => format!("headers[{wire}] = fmt.Sprint({value})"),
        };
        let ty = &p.mapped.expression;
        if ty.starts_with("[]") || ty.starts_with("map[") {
            w.open(format!("if {name} != nil {{")).line(set(&name)).close("}");
        } else if p.parameter.required && !ty.starts_with('*') {
            w.line(set(&name));
        } else {
            w.open(format!("if {name} != nil {{")).line(set(&format!("*{name}"))).close("}");
        }
    }
    let (body, content_type) = match (&endpoint.request_body, &op.body) {
        (Some(request), Some(_)) => ("body", quote(&request.content_type)),
        _ => ("nil", "\"\"".to_string()),
    };
    w.line(format!(
        "resp, err := c.do(ctx, {}, {path}, query, headers, {body}, {content_type})",
        quote(endpoint.method.as_str())
    ));
    w.open("if err != nil {");
    for line in fail.split('\n') {
        w.line(line.trim_start_matches('\t'));
    }
    w.close("}");
    match &output {
        Some(out) if out == "io.ReadCloser" => {
            w.line("return resp.Body, nil");
        }
        Some(out) => {
            w.line(format!("var result {out}"));
            w.open("if err := decode(resp, &result); err != nil {");
            for line in fail.split('\n') {
                w.line(line.trim_start_matches('\t'));
            }
            w.close("}");
            w.line("return result, nil");
        }
        None => {
            w.line("return resp.Body.Close()");
        }
    }
    w.close("}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::fixtures;
    use crate::error::codes;
    use crate::lower::MapperOptions;

    fn output() -> (GeneratorOutput, PackageCommands) {
        let schema = fixtures::petstore();
        let ctx = GenerationContext::new(&schema, TargetLanguage::Go, MapperOptions::default(), "petstore", "1.2.0");
        (GoGenerator.generate(&ctx).unwrap(), GoGenerator.commands(&ctx))
    }

    fn file<'o>(out: &'o GeneratorOutput, path: &str) -> &'o str {
        &out.files.iter().find(|f| f.path == path).unwrap().content
    }

    #[test]
    fn unions_degrade_with_a_warning() {
        let (out, commands) = output();
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].code, codes::DEGRADED_UNION);
        let models = file(&out, "models.go");
        assert!(models.contains("\tOwner interface{} `json:\"owner,omitempty\"`"));
        assert!(!models.contains("type Owner"));
        assert_eq!(commands.publish_command.as_deref(), Some("git tag v1.2.0 && git push origin v1.2.0"));
    }

    #[test]
    fn structs_and_constants() {
        let (out, _) = output();
        assert_eq!(file(&out, "go.mod"), "module example.com/petstore\n\ngo 1.21\n");
        let models = file(&out, "models.go");
        assert!(models.contains("package petstore"));
        assert!(models.contains("import \"time\""));
        assert!(models.contains("\tID string `json:\"id\"`") || models.contains("\tId string `json:\"id\"`"));
        assert!(models.contains("\tTags *[]string `json:\"tags,omitempty\"`"));
        assert!(models.contains("\tParent *Pet `json:\"parent,omitempty\"`"));
        assert!(models.contains("\tBorn time.Time `json:\"born,omitempty\"`"));
        assert!(models.contains("type Status string"));
        assert!(models.contains("\tStatusInCare Status = \"in-care\""));
        assert!(models.contains("type Priority int64"));
    }

    #[test]
    fn client_methods() {
        let (out, _) = output();
        let client = file(&out, "client.go");
        assert!(client.contains("func (c *Client) ListPets(ctx context.Context, limit *int64) ([]Pet, error) {"));
        assert!(client.contains("func (c *Client) GetPet(ctx context.Context, petId string, xTrace *string) (Pet, error) {"));
        assert!(client.contains("\"/pets/\" + url.PathEscape(fmt.Sprint(petId))"));
        assert!(client.contains("func (c *Client) DeletePet(ctx context.Context, petId string) error {"));
        assert!(client.contains("func (c *Client) StreamEvents(ctx context.Context) (io.ReadCloser, error) {"));
        assert!(client.contains("req.Header.Set(\"Authorization\", \"Bearer \"+c.Token)"));
    }
}
