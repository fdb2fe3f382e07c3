//! C#: `System.Text.Json` models and an `HttpClient` wrapper.
use std::collections::BTreeSet;

use super::{
    enum_primitive, identifier, path_parts, quote, AuthApplication, CodeWriter, Declaration, GeneratedFile,
    GenerationContext, Generator, GeneratorOutput, OperationView, PackageCommands, PathPart,
};
use crate::error::Result;
use crate::ir::{ParameterLocation, PrimitiveKind};
use crate::lower::TargetLanguage;
use crate::registry::naming::{to_camel_case, to_pascal_case};

pub struct CSharpGenerator;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked", "class", "const",
    "continue", "decimal", "default", "delegate", "do", "double", "else", "enum", "event", "explicit", "extern",
    "false", "finally", "fixed", "float", "for", "foreach", "goto", "if", "implicit", "in", "int", "interface",
    "internal", "is", "lock", "long", "namespace", "new", "null", "object", "operator", "out", "override",
    "params", "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true", "try", "typeof",
    "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual", "void", "volatile", "while",
];

/// Locals the generated method bodies declare.
const RESERVED_LOCALS: &[&str] = &["query", "headers", "response", "body", "cancellationToken"];

fn local(raw: &str) -> String {
    let name = identifier(raw, to_camel_case, KEYWORDS, |s| format!("@{s}"));
    if RESERVED_LOCALS.contains(&name.as_str()) { format!("{name}Value") } else { name }
}

fn namespace(package: &str) -> String {
    let name = to_pascal_case(package);
    if name.is_empty() { "Api".into() } else { name }
}

fn summary(w: &mut CodeWriter, text: Option<&str>) {
    if let Some(text) = text {
        let text = text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
        w.line("/// <summary>");
        w.doc("/// ", Some(&text));
        w.line("/// </summary>");
    }
}

fn using_lines(w: &mut CodeWriter, imports: &BTreeSet<String>) {
    for import in imports {
        w.line(format!("using {import};"));
    }
}

impl Generator for CSharpGenerator {
    fn language(&self) -> TargetLanguage {
        TargetLanguage::CSharp
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratorOutput> {
        let ns = namespace(&ctx.package_name);
        let declarations = ctx.declarations()?;
        let operations = ctx.operations()?;
        let (models, aliases) = models(ctx, &ns, &declarations);

        let mut files = vec![
            GeneratedFile::new(format!("{ns}.csproj"), project(ctx, &ns)),
            GeneratedFile::new("Models.cs", models),
            GeneratedFile::new("ApiClient.cs", client(ctx, &ns, &operations)),
        ];
        if !aliases.is_empty() {
            let mut w = CodeWriter::spaces(4);
            w.line(format!("// {}", ctx.banner()));
            w.lines(aliases);
            files.push(GeneratedFile::new("GlobalUsings.cs", w.finish()));
        }
        Ok(GeneratorOutput { files, warnings: ctx.degraded_union_warnings() })
    }

    fn commands(&self, _ctx: &GenerationContext<'_>) -> PackageCommands {
        PackageCommands {
            build_command: Some("dotnet build -c Release".into()),
            test_command: Some("dotnet test".into()),
            publish_command: Some(
                "dotnet pack -c Release && dotnet nuget push bin/Release/*.nupkg --source https://api.nuget.org/v3/index.json"
                    .into(),
            ),
            registry_url: Some("https://api.nuget.org/v3/index.json".into()),
        }
    }
}

fn project(ctx: &GenerationContext<'_>, ns: &str) -> String {
    let escape = |s: &str| s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;");
    let mut w = CodeWriter::spaces(2);
    w.line(format!("<!-- {} -->", ctx.banner()));
    w.open("<Project Sdk=\"Microsoft.NET.Sdk\">")
        .open("<PropertyGroup>")
        .line("<TargetFramework>net9.0</TargetFramework>")
        .line("<Nullable>enable</Nullable>")
        .line("<LangVersion>latest</LangVersion>")
        .line(format!("<RootNamespace>{ns}</RootNamespace>"))
        .line(format!("<PackageId>{}</PackageId>", escape(&ctx.package_name)))
        .line(format!("<Version>{}</Version>", escape(&ctx.package_version)))
        .line(format!("<Description>{}</Description>", escape(&ctx.description())))
        .close("</PropertyGroup>")
        .close("</Project>");
    w.finish()
}

/// Returns the models file and any `global using` aliases for enums the
/// language cannot express natively.
fn models(ctx: &GenerationContext<'_>, ns: &str, declarations: &[Declaration<'_>]) -> (String, Vec<String>) {
    let mut imports: BTreeSet<String> = ["System.Text.Json.Serialization".to_string()].into_iter().collect();
    let mut aliases = Vec::new();
    let mut body = CodeWriter::spaces(4);

    for decl in declarations {
        let def = decl.def();
        let name = ctx.type_name(def);
        match decl {
            Declaration::Object { fields, additional, .. } => {
                body.blank();
                summary(&mut body, def.description.as_deref());
                if def.deprecated {
                    body.line("[Obsolete]");
                }
                body.line(format!("public class {name}"));
                body.open("{");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        body.blank();
                    }
                    let mapped = if field.optional { ctx.optional(&field.base) } else { field.base.clone() };
                    imports.extend(mapped.imports.iter().cloned());
                    let mut member = to_pascal_case(&field.property.name);
                    if member.is_empty() || member == name {
                        member.push_str("Value");
                    }
                    summary(&mut body, field.property.description.as_deref());
                    body.line(format!("[JsonPropertyName({})]", quote(&field.property.name)));
                    body.line(format!("public {} {member} {{ get; set; }}", mapped.expression));
                }
                if additional.is_some() {
                    imports.insert("System.Collections.Generic".into());
                    if !fields.is_empty() {
                        body.blank();
                    }
                    body.line("[JsonExtensionData]");
                    body.line("public Dictionary<string, object>? AdditionalProperties { get; set; }");
                }
                body.close("}");
            }
            Declaration::Enum { values, .. } => match enum_primitive(values) {
                PrimitiveKind::String => {
                    body.blank();
                    summary(&mut body, def.description.as_deref());
                    body.line(format!("[JsonConverter(typeof(JsonStringEnumConverter<{name}>))]"));
                    body.line(format!("public enum {name}"));
                    body.open("{");
                    for value in values.iter() {
                        body.line(format!("[JsonStringEnumMemberName({})]", quote(&value.value.to_string())));
                        body.line(format!("{},", to_pascal_case(&value.name)));
                    }
                    body.close("}");
                }
                PrimitiveKind::Integer => {
                    body.blank();
                    summary(&mut body, def.description.as_deref());
                    body.line(format!("public enum {name} : long"));
                    body.open("{");
                    for value in values.iter() {
                        body.line(format!("{} = {},", to_pascal_case(&value.name), value.value));
                    }
                    body.close("}");
                }
                other => {
                    let scalar = ctx.mapper.rules().scalar(other).name;
                    aliases.push(format!("global using {name} = {scalar};"));
                }
            },
            // C# has no sum types; unions never reach here.
            Declaration::Union { .. } => {}
        }
    }

    let mut w = CodeWriter::spaces(4);
    w.line(format!("// {}", ctx.banner()));
    w.line("#nullable enable");
    using_lines(&mut w, &imports);
    w.blank();
    w.line(format!("namespace {ns}.Models;"));
    let mut out = w.finish();
    let body = body.finish();
    if !body.is_empty() {
        out.push('\n');
        out.push_str(&body);
    }
    (out, aliases)
}

fn client(ctx: &GenerationContext<'_>, ns: &str, operations: &[OperationView<'_>]) -> String {
    let mut imports: BTreeSet<String> = [
        "System",
        "System.Collections.Generic",
        "System.Globalization",
        "System.IO",
        "System.Linq",
        "System.Net.Http",
        "System.Net.Http.Headers",
        "System.Net.Http.Json",
        "System.Text",
        "System.Text.Json",
        "System.Threading",
        "System.Threading.Tasks",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    imports.insert(format!("{ns}.Models"));
    imports.extend(super::collect_imports(
        operations.iter().flat_map(|op| op.params().map(|p| &p.mapped).chain(op.body.iter()).chain(op.response.iter())),
    ));

    let mut w = CodeWriter::spaces(4);
    w.line(format!("// {}", ctx.banner()));
    w.line("#nullable enable");
    using_lines(&mut w, &imports);
    w.blank();
    w.line(format!("namespace {ns};"));
    w.blank();
    w.line("public class ApiException : Exception");
    w.open("{")
        .line("public ApiException(int status, string body) : base($\"request failed with status {status}\")")
        .open("{")
        .line("Status = status;")
        .line("Body = body;")
        .close("}")
        .blank()
        .line("public int Status { get; }")
        .line("public string Body { get; }")
        .close("}");
    w.blank();
    summary(&mut w, Some(&ctx.description()));
    w.line("public class ApiClient");
    w.open("{");
    w.line(format!("public const string DefaultBaseUrl = {};", quote(ctx.base_url())));
    w.line("private static readonly JsonSerializerOptions Json = new(JsonSerializerDefaults.Web);");
    w.line("private readonly HttpClient _http;");
    w.line("private readonly string _baseUrl;");
    w.blank();
    w.line("public ApiClient(HttpClient? http = null, string baseUrl = DefaultBaseUrl)");
    w.open("{").line("_http = http ?? new HttpClient();").line("_baseUrl = baseUrl.TrimEnd('/');").close("}");
    w.blank();
    w.line("public string? Token { get; set; }")
        .line("public string? ApiKey { get; set; }")
        .line("public string? Username { get; set; }")
        .line("public string? Password { get; set; }");

    for op in operations {
        w.blank();
        operation(&mut w, ctx, op);
    }

    w.blank();
    w.line("private static string Escape(object? value) =>");
    w.line("    Uri.EscapeDataString(Convert.ToString(value, CultureInfo.InvariantCulture) ?? string.Empty);");
    w.blank();
    w.line("private async Task<HttpResponseMessage> SendAsync(string method, string path, Dictionary<string, object?> query, Dictionary<string, string?> headers, object? body, string? contentType, HttpCompletionOption completion, CancellationToken cancellationToken)");
    w.open("{");
    let auth = ctx.auth();
    for application in &auth {
        if let AuthApplication::Query(name) = application {
            w.line(format!("if (ApiKey is not null) query[{}] = ApiKey;", quote(name)));
        }
    }
    w.line("var pairs = query.Where(p => p.Value is not null).Select(p => Escape(p.Key) + \"=\" + Escape(p.Value));");
    w.line("var queryString = string.Join(\"&\", pairs);");
    w.line("var request = new HttpRequestMessage(new HttpMethod(method), _baseUrl + path + (queryString.Length > 0 ? \"?\" + queryString : string.Empty));");
    w.line("foreach (var (key, value) in headers)");
    w.open("{").line("if (value is not null) request.Headers.TryAddWithoutValidation(key, value);").close("}");
    w.line("if (body is not null)");
    w.open("{")
        .line("request.Content = body is byte[] raw ? new ByteArrayContent(raw) : JsonContent.Create(body, body.GetType(), options: Json);")
        .line("request.Content.Headers.ContentType = MediaTypeHeaderValue.Parse(contentType ?? \"application/json\");")
        .close("}");
    for application in &auth {
        match application {
            AuthApplication::Bearer => {
                w.line("if (Token is not null) request.Headers.Authorization = new AuthenticationHeaderValue(\"Bearer\", Token);");
            }
            AuthApplication::Basic => {
                w.line("if (Username is not null)");
                w.open("{")
                    .line("var credentials = Convert.ToBase64String(Encoding.UTF8.GetBytes($\"{Username}:{Password}\"));")
                    .line("request.Headers.Authorization = new AuthenticationHeaderValue(\"Basic\", credentials);")
                    .close("}");
            }
            AuthApplication::Header(name) => {
                w.line(format!("if (ApiKey is not null) request.Headers.TryAddWithoutValidation({}, ApiKey);", quote(name)));
            }
            AuthApplication::Cookie(name) => {
                w.line(format!(
                    "if (ApiKey is not null) request.Headers.TryAddWithoutValidation(\"Cookie\", {} + \"=\" + ApiKey);",
                    quote(name)
                ));
            }
            AuthApplication::Query(_) => {}
        }
    }
    w.line("var response = await _http.SendAsync(request, completion, cancellationToken).ConfigureAwait(false);");
    w.line("if (!response.IsSuccessStatusCode)");
    w.open("{")
        .line("var text = await response.Content.ReadAsStringAsync(cancellationToken).ConfigureAwait(false);")
        .line("var status = (int)response.StatusCode;")
        .line("response.Dispose();")
        .line("throw new ApiException(status, text);")
        .close("}");
    w.line("return response;");
    w.close("}");
    w.close("}");
    w.finish()
}

fn operation(w: &mut CodeWriter, ctx: &GenerationContext<'_>, op: &OperationView<'_>) {
    let endpoint = op.endpoint;
    let method = format!("{}Async", to_pascal_case(&endpoint.operation_id));

    let mut required = Vec::new();
    let mut optional = Vec::new();
    for p in op.params() {
        let name = local(&p.parameter.name);
        if p.parameter.required {
            required.push(format!("{} {name}", p.mapped.expression));
        } else {
            optional.push(format!("{} {name} = null", ctx.optional(&p.mapped).expression));
        }
    }
    if let (Some(body), Some(request)) = (&op.body, &endpoint.request_body) {
        if request.required {
            required.push(format!("{} body", body.expression));
        } else {
            optional.push(format!("{} body = null", ctx.optional(body).expression));
        }
    }
    let mut args = required;
    args.extend(optional);
    args.push("CancellationToken cancellationToken = default".into());

    let output = match (&op.response, endpoint.streaming) {
        (_, true) => "Task<Stream>".to_string(),
        (Some(response), false) => format!("Task<{}>", response.expression),
        (None, false) => "Task".to_string(),
    };

    let mut path = Vec::new();
    for part in path_parts(&endpoint.path) {
        match part {
            PathPart::Literal(text) => path.push(quote(text)),
            PathPart::Param(name) => path.push(format!("Escape({})", local(name))),
        }
    }
    let path = if path.is_empty() { "\"\"".to_string() } else { path.join(" + ") };

    summary(w, endpoint.summary.as_deref().or(endpoint.description.as_deref()));
    if endpoint.deprecated {
        w.line("[Obsolete]");
    }
    w.line(format!("public async {output} {method}({})", args.join(", ")));
    w.open("{");
    w.line("var query = new Dictionary<string, object?>();");
    w.line("var headers = new Dictionary<string, string?>();");
    for p in &op.query_params {
        w.line(format!("query[{}] = {};", quote(&p.parameter.name), local(&p.parameter.name)));
    }
    for p in &op.header_params {
        let name = local(&p.parameter.name);
        match p.parameter.location {
            ParameterLocation::Cookie => w.line(format!(
                "if ({name} is not null) headers[\"Cookie\"] = {} + \"=\" + Convert.ToString({name}, CultureInfo.InvariantCulture);",
                quote(&p.parameter.name)
            )),
            _ => w.line(format!(
                "headers[{}] = {name} is null ? null : Convert.ToString({name}, CultureInfo.InvariantCulture);",
                quote(&p.parameter.name)
            )),
        };
    }
    let (body, content_type) = match (&endpoint.request_body, &op.body) {
        (Some(request), Some(_)) => ("body", quote(&request.content_type)),
        _ => ("null", "null".to_string()),
    };
    let verb = quote(endpoint.method.as_str());
    if endpoint.streaming {
        w.line(format!(
            "var response = await SendAsync({verb}, {path}, query, headers, {body}, {content_type}, HttpCompletionOption.ResponseHeadersRead, cancellationToken).ConfigureAwait(false);"
        ));
        w.line("return await response.Content.ReadAsStreamAsync(cancellationToken).ConfigureAwait(false);");
    } else {
        w.line(format!(
            "using var response = await SendAsync({verb}, {path}, query, headers, {body}, {content_type}, HttpCompletionOption.ResponseContentRead, cancellationToken).ConfigureAwait(false);"
        ));
        if let Some(response) = &op.response {
            w.line(format!(
                "return (await response.Content.ReadFromJsonAsync<{}>(Json, cancellationToken).ConfigureAwait(false))!;",
                response.expression
            ));
        }
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
        let ctx = GenerationContext::new(&schema, TargetLanguage::CSharp, MapperOptions::default(), "petstore-client", "1.0.0");
        CSharpGenerator.generate(&ctx).unwrap()
    }

    fn file<'o>(out: &'o GeneratorOutput, path: &str) -> &'o str {
        &out.files.iter().find(|f| f.path == path).unwrap().content
    }

    #[test]
    fn project_layout() {
        let out = output();
        let paths: Vec<&str> = out.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["PetstoreClient.csproj", "Models.cs", "ApiClient.cs"]);
        assert!(file(&out, "PetstoreClient.csproj").contains("<PackageId>petstore-client</PackageId>"));
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn models_and_enums() {
        let out = output();
        let models = file(&out, "Models.cs");
        assert!(models.contains("namespace PetstoreClient.Models;"));
        assert!(models.contains("using System;"));
        assert!(models.contains("    [JsonPropertyName(\"id\")]\n    public Guid Id { get; set; }"));
        assert!(models.contains("    public List<string>? Tags { get; set; }"));
        assert!(models.contains("    public object? Owner { get; set; }"));
        assert!(models.contains("    [JsonStringEnumMemberName(\"in-care\")]\n    InCare,"));
        assert!(models.contains("public enum Priority : long"));
        assert!(models.contains("    Value1 = 1,"));
    }

    #[test]
    fn client_methods() {
        let out = output();
        let client = file(&out, "ApiClient.cs");
        assert!(client.contains(
            "public async Task<List<Pet>> ListPetsAsync(long? limit = null, CancellationToken cancellationToken = default)"
        ));
        assert!(client.contains(
            "public async Task<Pet> GetPetAsync(Guid petId, string? xTrace = null, CancellationToken cancellationToken = default)"
        ));
        assert!(client.contains("\"/pets/\" + Escape(petId)"));
        assert!(client.contains("public async Task DeletePetAsync(Guid petId, CancellationToken cancellationToken = default)"));
        assert!(client.contains("public async Task<Stream> StreamEventsAsync(CancellationToken cancellationToken = default)"));
        assert!(client.contains("new AuthenticationHeaderValue(\"Bearer\", Token)"));
    }
}
