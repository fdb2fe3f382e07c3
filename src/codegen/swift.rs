//! Swift: a SwiftPM package with `Codable` models and a `URLSession` client.
use std::collections::BTreeSet;

use super::{
    collect_imports, enum_primitive, identifier, path_parts, quote, AuthApplication, CodeWriter, Declaration,
    GeneratedFile, GenerationContext, Generator, GeneratorOutput, OperationView, PackageCommands, PathPart,
};
use crate::error::Result;
use crate::ir::{EnumLiteral, ParameterLocation, PrimitiveKind};
use crate::lower::TargetLanguage;
use crate::registry::naming::{to_camel_case, to_pascal_case};

pub struct SwiftGenerator;

const KEYWORDS: &[&str] = &[
    "associatedtype", "class", "deinit", "enum", "extension", "fileprivate", "func", "import", "init", "inout",
    "internal", "let", "open", "operator", "private", "protocol", "public", "rethrows", "static", "struct",
    "subscript", "typealias", "var", "break", "case", "continue", "default", "defer", "do", "else",
    "fallthrough", "for", "guard", "if", "in", "repeat", "return", "switch", "where", "while", "as", "Any",
    "catch", "false", "is", "nil", "super", "self", "Self", "throw", "throws", "true", "try", "Type",
];

/// Locals the generated method bodies declare.
const RESERVED_LOCALS: &[&str] = &["query", "headers", "body", "data", "payload"];

const ANY_CODABLE: &str = "AnyCodable";

fn member(raw: &str) -> String {
    identifier(raw, to_camel_case, KEYWORDS, |s| format!("`{s}`"))
}

fn local(raw: &str) -> String {
    let name = member(raw);
    if RESERVED_LOCALS.contains(&name.as_str()) { format!("{name}Value") } else { name }
}

fn module_name(package: &str) -> String {
    let name = to_pascal_case(package);
    if name.is_empty() { "Api".into() } else { name }
}

fn import_lines(w: &mut CodeWriter, imports: &BTreeSet<String>) {
    for import in imports {
        w.line(format!("import {import}"));
    }
}

impl Generator for SwiftGenerator {
    fn language(&self) -> TargetLanguage {
        TargetLanguage::Swift
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratorOutput> {
        let module = module_name(&ctx.package_name);
        let declarations = ctx.declarations()?;
        let operations = ctx.operations()?;

        let (models, model_imports) = models(ctx, &declarations);
        let (client, client_imports) = client(ctx, &operations);
        let needs_any = model_imports.contains(ANY_CODABLE) || client_imports.contains(ANY_CODABLE);

        Ok(GeneratorOutput {
            files: vec![
                GeneratedFile::new("Package.swift", manifest(ctx, &module, needs_any)),
                GeneratedFile::new(format!("Sources/{module}/Models.swift"), models),
                GeneratedFile::new(format!("Sources/{module}/Client.swift"), client),
            ],
            warnings: ctx.degraded_union_warnings(),
        })
    }

    fn commands(&self, ctx: &GenerationContext<'_>) -> PackageCommands {
        let version = &ctx.package_version;
        PackageCommands {
            build_command: Some("swift build".into()),
            test_command: Some("swift test".into()),
            publish_command: Some(format!("git tag {version} && git push origin {version}")),
            registry_url: Some("https://swiftpackageindex.com".into()),
        }
    }
}

fn manifest(ctx: &GenerationContext<'_>, module: &str, needs_any: bool) -> String {
    let mut w = CodeWriter::spaces(4);
    w.line("// swift-tools-version:5.9");
    w.line(format!("// {}", ctx.banner()));
    w.line("import PackageDescription");
    w.blank();
    w.line("let package = Package(");
    w.indent();
    w.line(format!("name: {},", quote(module)));
    w.line("platforms: [.macOS(.v12), .iOS(.v15)],");
    w.open("products: [")
        .line(format!(".library(name: {}, targets: [{}]),", quote(module), quote(module)))
        .close("],");
    if needs_any {
        w.open("dependencies: [")
            .line(".package(url: \"https://github.com/Flight-School/AnyCodable\", from: \"0.6.0\"),")
            .close("],");
        w.open("targets: [")
            .line(format!(".target(name: {}, dependencies: [\"AnyCodable\"]),", quote(module)))
            .close("]");
    } else {
        w.open("targets: [").line(format!(".target(name: {}),", quote(module))).close("]");
    }
    w.dedent();
    w.line(")");
    w.finish()
}

fn models(ctx: &GenerationContext<'_>, declarations: &[Declaration<'_>]) -> (String, BTreeSet<String>) {
    let mut imports: BTreeSet<String> = ["Foundation".to_string()].into_iter().collect();
    let mut body = CodeWriter::spaces(4);

    for decl in declarations {
        let def = decl.def();
        let name = ctx.type_name(def);
        body.blank();
        body.doc("/// ", def.description.as_deref());
        if def.deprecated {
            body.line("@available(*, deprecated)");
        }
        match decl {
            Declaration::Object { fields, additional, .. } => {
                // Recursive value types are illegal; a class gives the edge a reference.
                let recursive = fields.iter().any(|f| f.indirect);
                let keyword = if recursive { "public final class" } else { "public struct" };
                body.line(format!("{keyword} {name}: Codable {{"));
                body.indent();
                let mut params = Vec::with_capacity(fields.len());
                for field in fields {
                    let mapped = if field.optional { ctx.optional(&field.base) } else { field.base.clone() };
                    imports.extend(mapped.imports.iter().cloned());
                    let ident = member(&field.property.name);
                    body.doc("/// ", field.property.description.as_deref());
                    body.line(format!("public var {ident}: {}", mapped.expression));
                    let default = if field.optional { " = nil" } else { "" };
                    params.push((ident, format!("{}{default}", mapped.expression)));
                }
                if additional.is_some() {
                    body.line("// Keys outside the declared properties are dropped on decode.");
                }
                if !fields.is_empty() {
                    body.blank();
                    body.line("enum CodingKeys: String, CodingKey {");
                    body.indent();
                    for field in fields {
                        let ident = member(&field.property.name);
                        if ident.trim_matches('`') == field.property.name {
                            body.line(format!("case {ident}"));
                        } else {
                            body.line(format!("case {ident} = {}", quote(&field.property.name)));
                        }
                    }
                    body.close("}");
                }
                body.blank();
                let signature: Vec<String> = params.iter().map(|(ident, ty)| format!("{ident}: {ty}")).collect();
                body.line(format!("public init({}) {{", signature.join(", ")));
                body.indent();
                for (ident, _) in &params {
                    body.line(format!("self.{ident} = {ident}"));
                }
                body.close("}");
                body.close("}");
            }
            Declaration::Enum { values, .. } => {
                let raw = match enum_primitive(values) {
                    PrimitiveKind::String => Some("String"),
                    PrimitiveKind::Integer => Some("Int64"),
                    PrimitiveKind::Number => Some("Double"),
                    _ => None,
                };
                let Some(raw) = raw else {
                    let scalar = ctx.mapper.rules().scalar(enum_primitive(values));
                    if let Some(import) = scalar.import {
                        imports.insert(import.to_string());
                    }
                    body.line(format!("public typealias {name} = {}", scalar.name));
                    continue;
                };
                body.line(format!("public enum {name}: {raw}, Codable, CaseIterable {{"));
                body.indent();
                for value in values.iter() {
                    let literal = match &value.value {
                        EnumLiteral::String(s) => quote(s),
                        other => other.to_string(),
                    };
                    body.line(format!("case {} = {literal}", member(&value.name)));
                }
                body.close("}");
            }
            Declaration::Union { variants, .. } => {
                let recursive = decl_is_recursive(ctx, decl);
                let prefix = if recursive { "public indirect enum" } else { "public enum" };
                body.line(format!("{prefix} {name}: Codable {{"));
                body.indent();
                for variant in variants {
                    imports.extend(variant.mapped.imports.iter().cloned());
                    body.line(format!("case {}({})", member(&variant.label), variant.mapped.expression));
                }
                body.blank();
                body.line("public init(from decoder: Decoder) throws {");
                body.indent();
                body.line("let container = try decoder.singleValueContainer()");
                for variant in variants {
                    body.line(format!(
                        "if let value = try? container.decode({}.self) {{ self = .{}(value); return }}",
                        variant.mapped.expression,
                        member(&variant.label)
                    ));
                }
                body.line(format!(
                    "throw DecodingError.typeMismatch({name}.self, DecodingError.Context(codingPath: decoder.codingPath, debugDescription: {}))",
                    quote(&format!("no variant of {name} matched"))
                ));
                body.close("}");
                body.blank();
                body.line("public func encode(to encoder: Encoder) throws {");
                body.indent();
                body.line("var container = encoder.singleValueContainer()");
                body.line("switch self {");
                for variant in variants {
                    body.line(format!("case .{}(let value): try container.encode(value)", member(&variant.label)));
                }
                body.line("}");
                body.close("}");
                body.close("}");
            }
        }
    }

    let mut w = CodeWriter::spaces(4);
    w.line(format!("// {}", ctx.banner()));
    import_lines(&mut w, &imports);
    let mut out = w.finish();
    let body = body.finish();
    if !body.is_empty() {
        out.push('\n');
        out.push_str(&body);
    }
    (out, imports)
}

fn decl_is_recursive(ctx: &GenerationContext<'_>, decl: &Declaration<'_>) -> bool {
    let def = decl.def();
    def.kind.references().into_iter().any(|r| ctx.needs_indirection(def.id, r))
}

fn client(ctx: &GenerationContext<'_>, operations: &[OperationView<'_>]) -> (String, BTreeSet<String>) {
    let mut imports: BTreeSet<String> = ["Foundation".to_string()].into_iter().collect();
    imports.extend(collect_imports(
        operations.iter().flat_map(|op| op.params().map(|p| &p.mapped).chain(op.body.iter()).chain(op.response.iter())),
    ));

    let mut w = CodeWriter::spaces(4);
    w.line(format!("// {}", ctx.banner()));
    import_lines(&mut w, &imports);
    w.line("#if canImport(FoundationNetworking)");
    w.line("import FoundationNetworking");
    w.line("#endif");
    w.blank();
    w.line("public struct APIError: Error {");
    w.indent().line("public let status: Int").line("public let body: Data").close("}");
    w.blank();
    w.doc("/// ", Some(&ctx.description()));
    w.line("public final class APIClient {");
    w.indent();
    w.line(format!("public static let defaultBaseURL = URL(string: {})!", quote(ctx.base_url())));
    w.blank();
    w.line("public let baseURL: URL")
        .line("public let session: URLSession")
        .line("public var token: String?")
        .line("public var apiKey: String?")
        .line("public var username: String?")
        .line("public var password: String?")
        .line("private let encoder = JSONEncoder()")
        .line("private let decoder = JSONDecoder()");
    w.blank();
    w.line("public init(baseURL: URL = APIClient.defaultBaseURL, session: URLSession = .shared) {");
    w.indent()
        .line("self.baseURL = baseURL")
        .line("self.session = session")
        .line("encoder.dateEncodingStrategy = .iso8601")
        .line("decoder.dateDecodingStrategy = .iso8601")
        .close("}");

    for op in operations {
        w.blank();
        operation(&mut w, ctx, op);
    }

    w.blank();
    w.line("private func escape(_ value: String) -> String {");
    w.indent()
        .line("value.addingPercentEncoding(withAllowedCharacters: .urlPathAllowed.subtracting(CharacterSet(charactersIn: \"/\"))) ?? value")
        .close("}");
    w.blank();
    w.line("private func makeRequest(_ method: String, _ path: String, query: [URLQueryItem], headers: [String: String], body: Data?, contentType: String?) throws -> URLRequest {");
    w.indent();
    w.line("var items = query");
    let auth = ctx.auth();
    for application in &auth {
        if let AuthApplication::Query(name) = application {
            w.line(format!("if let apiKey {{ items.append(URLQueryItem(name: {}, value: apiKey)) }}", quote(name)));
        }
    }
    w.line("var base = baseURL.absoluteString");
    w.line("while base.hasSuffix(\"/\") { base.removeLast() }");
    w.line("guard var components = URLComponents(string: base + path) else { throw URLError(.badURL) }");
    w.line("if !items.isEmpty { components.queryItems = items }");
    w.line("guard let url = components.url else { throw URLError(.badURL) }");
    w.line("var request = URLRequest(url: url)");
    w.line("request.httpMethod = method");
    w.line("for (name, value) in headers { request.setValue(value, forHTTPHeaderField: name) }");
    w.line("if let body {");
    w.indent()
        .line("request.httpBody = body")
        .line("request.setValue(contentType ?? \"application/json\", forHTTPHeaderField: \"Content-Type\")")
        .close("}");
    for application in &auth {
        match application {
            AuthApplication::Bearer => {
                w.line("if let token { request.setValue(\"Bearer \\(token)\", forHTTPHeaderField: \"Authorization\") }");
            }
            AuthApplication::Basic => {
                w.line("if let username {");
                w.indent()
                    .line("let raw = \"\\(username):\\(password ?? \"\")\"")
                    .line("request.setValue(\"Basic \\(Data(raw.utf8).base64EncodedString())\", forHTTPHeaderField: \"Authorization\")")
                    .close("}");
            }
            AuthApplication::Header(name) => {
                w.line(format!("if let apiKey {{ request.setValue(apiKey, forHTTPHeaderField: {}) }}", quote(name)));
            }
            AuthApplication::Cookie(name) => {
                w.line(format!(
                    "if let apiKey {{ request.setValue(\"{}=\\(apiKey)\", forHTTPHeaderField: \"Cookie\") }}",
                    name.replace('"', "")
                ));
            }
            AuthApplication::Query(_) => {}
        }
    }
    w.line("return request");
    w.close("}");
    w.blank();
    w.line("private func send(_ method: String, _ path: String, query: [URLQueryItem], headers: [String: String], body: Data?, contentType: String?) async throws -> Data {");
    w.indent()
        .line("let request = try makeRequest(method, path, query: query, headers: headers, body: body, contentType: contentType)")
        .line("let (data, response) = try await session.data(for: request)")
        .line("let status = (response as? HTTPURLResponse)?.statusCode ?? 0")
        .line("guard (200..<300).contains(status) else { throw APIError(status: status, body: data) }")
        .line("return data")
        .close("}");
    w.blank();
    w.line("private func stream(_ method: String, _ path: String, query: [URLQueryItem], headers: [String: String], body: Data?, contentType: String?) async throws -> URLSession.AsyncBytes {");
    w.indent()
        .line("let request = try makeRequest(method, path, query: query, headers: headers, body: body, contentType: contentType)")
        .line("let (bytes, response) = try await session.bytes(for: request)")
        .line("let status = (response as? HTTPURLResponse)?.statusCode ?? 0")
        .line("guard (200..<300).contains(status) else { throw APIError(status: status, body: Data()) }")
        .line("return bytes")
        .close("}");
    w.close("}");
    (w.finish(), imports)
}

fn operation(w: &mut CodeWriter, ctx: &GenerationContext<'_>, op: &OperationView<'_>) {
    let endpoint = op.endpoint;
    let mut args = Vec::new();
    for p in op.params() {
        let name = local(&p.parameter.name);
        if p.parameter.required {
            args.push(format!("{name}: {}", p.mapped.expression));
        } else {
            args.push(format!("{name}: {} = nil", ctx.optional(&p.mapped).expression));
        }
    }
    let body_arg = match (&op.body, &endpoint.request_body) {
        (Some(body), Some(request)) if request.required => {
            args.push(format!("body: {}", body.expression));
            Some(true)
        }
        (Some(body), Some(_)) => {
            args.push(format!("body: {} = nil", ctx.optional(body).expression));
            Some(false)
        }
        _ => None,
    };

    let output = match (&op.response, endpoint.streaming) {
        (_, true) => " -> URLSession.AsyncBytes".to_string(),
        (Some(response), false) => format!(" -> {}", response.expression),
        (None, false) => String::new(),
    };

    let mut path = Vec::new();
    for part in path_parts(&endpoint.path) {
        match part {
            PathPart::Literal(text) => path.push(quote(text)),
            PathPart::Param(name) => path.push(format!("escape(\"\\({})\")", local(name))),
        }
    }
    let path = if path.is_empty() { "\"\"".to_string() } else { path.join(" + ") };

    w.doc("/// ", endpoint.summary.as_deref().or(endpoint.description.as_deref()));
    if endpoint.deprecated {
        w.line("@available(*, deprecated)");
    }
    w.line(format!("public func {}({}) async throws{output} {{", member(&endpoint.operation_id), args.join(", ")));
    w.indent();
    w.line(format!("{} query: [URLQueryItem] = []", if op.query_params.is_empty() { "let" } else { "var" }));
    w.line(format!("{} headers: [String: String] = [:]", if op.header_params.is_empty() { "let" } else { "var" }));
    for p in &op.query_params {
        let name = local(&p.parameter.name);
        let append = format!("query.append(URLQueryItem(name: {}, value: \"\\({name})\"))", quote(&p.parameter.name));
        if p.parameter.required {
            w.line(append);
        } else {
            w.line(format!("if let {name} {{ {append} }}"));
        }
    }
    for p in &op.header_params {
        let name = local(&p.parameter.name);
        let assign = match p.parameter.location {
            ParameterLocation::Cookie => {
                format!("headers[\"Cookie\"] = \"{}=\\({name})\"", p.parameter.name.replace('"', ""))
            }
            _ => format!("headers[{}] = \"\\({name})\"", quote(&p.parameter.name)),
        };
        if p.parameter.required {
            w.line(assign);
        } else {
            w.line(format!("if let {name} {{ {assign} }}"));
        }
    }
    let (payload, content_type) = match (body_arg, &endpoint.request_body) {
        (Some(true), Some(request)) => {
            w.line("let payload = try encoder.encode(body)");
            ("payload", quote(&request.content_type))
        }
        (Some(false), Some(request)) => {
            w.line("let payload = try body.map { try encoder.encode($0) }");
            ("payload", quote(&request.content_type))
        }
        _ => ("nil", "nil".to_string()),
    };
    let verb = quote(endpoint.method.as_str());
    let call = format!("({verb}, {path}, query: query, headers: headers, body: {payload}, contentType: {content_type})");
    match (&op.response, endpoint.streaming) {
        (_, true) => {
            w.line(format!("return try await stream{call}"));
        }
        (Some(response), false) => {
            w.line(format!("let data = try await send{call}"));
            w.line(format!("return try decoder.decode({}.self, from: data)", response.expression));
        }
        (None, false) => {
            w.line(format!("_ = try await send{call}"));
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
        let ctx = GenerationContext::new(&schema, TargetLanguage::Swift, MapperOptions::default(), "petstore-client", "1.0.0");
        SwiftGenerator.generate(&ctx).unwrap()
    }

    fn file<'o>(out: &'o GeneratorOutput, path: &str) -> &'o str {
        &out.files.iter().find(|f| f.path == path).unwrap().content
    }

    #[test]
    fn package_layout() {
        let out = output();
        let paths: Vec<&str> = out.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["Package.swift", "Sources/PetstoreClient/Models.swift", "Sources/PetstoreClient/Client.swift"]
        );
        let manifest = file(&out, "Package.swift");
        assert!(manifest.starts_with("// swift-tools-version:5.9\n"));
        assert!(manifest.contains("name: \"PetstoreClient\","));
        assert!(!manifest.contains("AnyCodable"));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn models_use_codable() {
        let out = output();
        let models = file(&out, "Sources/PetstoreClient/Models.swift");
        assert!(models.contains("public final class Pet: Codable {"));
        assert!(models.contains("    public var id: UUID\n"));
        assert!(models.contains("    public var tags: [String]?\n"));
        assert!(models.contains("    public var parent: Pet?\n"));
        assert!(models.contains("public struct NewPet: Codable {"));
        assert!(models.contains("    case inCare = \"in-care\""));
        assert!(models.contains("public enum Priority: Int64, Codable, CaseIterable {"));
        assert!(models.contains("    case person(Person)"));
        assert!(models.contains("if let value = try? container.decode(Shelter.self) { self = .shelter(value); return }"));
    }

    #[test]
    fn client_methods() {
        let out = output();
        let client = file(&out, "Sources/PetstoreClient/Client.swift");
        assert!(client.contains("public func listPets(limit: Int64? = nil) async throws -> [Pet] {"));
        assert!(client.contains("public func getPet(petId: UUID, xTrace: String? = nil) async throws -> Pet {"));
        assert!(client.contains("\"/pets/\" + escape(\"\\(petId)\")"));
        assert!(client.contains("public func deletePet(petId: UUID) async throws {"));
        assert!(client.contains("public func createPet(body: NewPet) async throws -> Pet {"));
        assert!(client.contains("public func streamEvents() async throws -> URLSession.AsyncBytes {"));
        assert!(client.contains("request.setValue(\"Bearer \\(token)\", forHTTPHeaderField: \"Authorization\")"));
    }
}
