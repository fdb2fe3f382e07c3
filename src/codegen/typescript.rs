//! TypeScript: interfaces, literal unions and a `fetch` client.
use serde_json::json;

use super::{
    identifier, path_parts, quote, AuthApplication, CodeWriter, Declaration, GeneratedFile, GenerationContext,
    Generator, GeneratorOutput, OperationView, PackageCommands, PathPart,
};
use crate::error::Result;
use crate::ir::EnumLiteral;
use crate::lower::TargetLanguage;
use crate::registry::naming::{to_camel_case, to_screaming_snake_case};

pub struct TypeScriptGenerator;

const KEYWORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "implements", "import",
    "in", "instanceof", "interface", "let", "new", "null", "package", "private", "protected", "public",
    "return", "static", "super", "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while",
    "with", "yield",
];

fn ident(raw: &str) -> String {
    identifier(raw, to_camel_case, KEYWORDS, |s| format!("{s}_"))
}

/// Wire names are kept; only non-identifiers get quoted.
fn property_key(name: &str) -> String {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid { name.to_string() } else { quote(name) }
}

fn literal(value: &EnumLiteral) -> String {
    match value {
        EnumLiteral::String(s) => quote(s),
        other => other.to_string(),
    }
}

fn jsdoc(w: &mut CodeWriter, text: Option<&str>, deprecated: bool) {
    if text.is_none() && !deprecated {
        return;
    }
    w.line("/**");
    w.doc(" * ", text);
    if deprecated {
        w.line(" * @deprecated");
    }
    w.line(" */");
}

impl Generator for TypeScriptGenerator {
    fn language(&self) -> TargetLanguage {
        TargetLanguage::TypeScript
    }

    fn generate(&self, ctx: &GenerationContext<'_>) -> Result<GeneratorOutput> {
        let declarations = ctx.declarations()?;
        let operations = ctx.operations()?;
        let names: Vec<String> = declarations.iter().map(|d| ctx.type_name(d.def())).collect();

        let files = vec![
            GeneratedFile::new("src/models.ts", models(ctx, &declarations)),
            GeneratedFile::new("src/client.ts", client(ctx, &operations, &names)),
            GeneratedFile::new("src/index.ts", format!("// {}\nexport * from \"./models\";\nexport * from \"./client\";\n", ctx.banner())),
            ctx.json_file(
                "package.json",
                &json!({
                    "name": ctx.package_name,
                    "version": ctx.package_version,
                    "description": ctx.description(),
                    "main": "dist/index.js",
                    "types": "dist/index.d.ts",
                    "files": ["dist"],
                    "scripts": {"build": "tsc", "test": "node --test dist/"},
                    "devDependencies": {"typescript": "^5.4.0"}
                }),
            )?,
            ctx.json_file(
                "tsconfig.json",
                &json!({
                    "compilerOptions": {
                        "target": "ES2020",
                        "module": "commonjs",
                        "declaration": true,
                        "strict": true,
                        "outDir": "dist",
                        "lib": ["ES2020", "DOM"]
                    },
                    "include": ["src"]
                }),
            )?,
        ];
        Ok(GeneratorOutput { files, warnings: ctx.degraded_union_warnings() })
    }

    fn commands(&self, _ctx: &GenerationContext<'_>) -> PackageCommands {
        PackageCommands {
            build_command: Some("npm install && npm run build".into()),
            test_command: Some("npm test".into()),
            publish_command: Some("npm publish --access public".into()),
            registry_url: Some("https://registry.npmjs.org".into()),
        }
    }
}

fn models(ctx: &GenerationContext<'_>, declarations: &[Declaration<'_>]) -> String {
    let mut w = CodeWriter::spaces(2);
    w.line(format!("// {}", ctx.banner()));
    for decl in declarations {
        let def = decl.def();
        let name = ctx.type_name(def);
        w.blank();
        jsdoc(&mut w, def.description.as_deref(), def.deprecated);
        match decl {
            Declaration::Object { fields, additional, .. } => {
                w.open(format!("export interface {name} {{"));
                for field in fields {
                    jsdoc(&mut w, field.property.description.as_deref(), false);
                    let key = property_key(&field.property.name);
                    if field.optional {
                        w.line(format!("{key}?: {};", field.base.expression));
                    } else {
                        w.line(format!("{key}: {};", field.mapped.expression));
                    }
                }
                if let Some(additional) = additional {
                    w.line(format!("[key: string]: {} | unknown;", additional.expression));
                }
                w.close("}");
            }
            Declaration::Enum { values, .. } => {
                let members: Vec<String> = values.iter().map(|v| literal(&v.value)).collect();
                w.line(format!("export type {name} = {};", members.join(" | ")));
                w.open(format!("export const {name} = {{"));
                for value in values.iter() {
                    w.line(format!("{}: {},", to_screaming_snake_case(&value.name), literal(&value.value)));
                }
                w.close("} as const;");
            }
            Declaration::Union { variants, .. } => {
                let members: Vec<&str> = variants.iter().map(|v| v.mapped.expression.as_str()).collect();
                w.line(format!("export type {name} = {};", members.join(" | ")));
            }
        }
    }
    w.finish()
}

fn client(ctx: &GenerationContext<'_>, operations: &[OperationView<'_>], names: &[String]) -> String {
    let mut w = CodeWriter::spaces(2);
    w.line(format!("// {}", ctx.banner()));
    if !names.is_empty() {
        w.line(format!("import type {{ {} }} from \"./models\";", names.join(", ")));
    }
    w.blank();
    w.open("export interface ClientOptions {")
        .line("baseUrl?: string;")
        .line("token?: string;")
        .line("username?: string;")
        .line("password?: string;")
        .line("apiKey?: string;")
        .line("headers?: Record<string, string>;")
        .line("fetch?: typeof fetch;")
        .close("}");
    w.blank();
    w.open("interface RequestInit_ {")
        .line("query?: Record<string, unknown>;")
        .line("headers?: Record<string, unknown>;")
        .line("body?: unknown;")
        .line("contentType?: string;")
        .close("}");
    w.blank();
    w.open("export class ApiError extends Error {")
        .open("constructor(public readonly status: number, public readonly body: string) {")
        .line("super(`request failed with status ${status}`);")
        .close("}")
        .close("}");
    w.blank();
    w.open("export class ApiClient {");
    w.line("private readonly baseUrl: string;");
    w.blank();
    w.open("constructor(private readonly options: ClientOptions = {}) {");
    w.line(format!("this.baseUrl = (options.baseUrl ?? {}).replace(/\\/$/, \"\");", quote(ctx.base_url())));
    w.close("}");

    for op in operations {
        w.blank();
        operation(&mut w, op);
    }

    w.blank();
    w.open("private async send(method: string, path: string, init: RequestInit_): Promise<Response> {");
    w.line("const url = new URL(this.baseUrl + path);");
    w.open("for (const [key, value] of Object.entries(init.query ?? {})) {")
        .line("if (value !== undefined && value !== null) url.searchParams.set(key, String(value));")
        .close("}");
    w.line("const headers: Record<string, string> = { ...this.options.headers };");
    w.open("for (const [key, value] of Object.entries(init.headers ?? {})) {")
        .line("if (value !== undefined && value !== null) headers[key] = String(value);")
        .close("}");
    for application in ctx.auth() {
        match application {
            AuthApplication::Bearer => {
                w.line("if (this.options.token) headers[\"Authorization\"] = `Bearer ${this.options.token}`;");
            }
            AuthApplication::Basic => {
                w.open("if (this.options.username !== undefined) {")
                    .line("const credentials = btoa(`${this.options.username}:${this.options.password ?? \"\"}`);")
                    .line("headers[\"Authorization\"] = `Basic ${credentials}`;")
                    .close("}");
            }
            AuthApplication::Header(name) => {
                w.line(format!("if (this.options.apiKey) headers[{}] = this.options.apiKey;", quote(&name)));
            }
            AuthApplication::Query(name) => {
                w.line(format!("if (this.options.apiKey) url.searchParams.set({}, this.options.apiKey);", quote(&name)));
            }
            AuthApplication::Cookie(name) => {
                w.line(format!(
                    "if (this.options.apiKey) headers[\"Cookie\"] = `{}=${{this.options.apiKey}}`;",
                    name.replace('`', "")
                ));
            }
        }
    }
    w.line("let body: BodyInit | undefined;");
    w.open("if (init.body !== undefined) {")
        .line("headers[\"Content-Type\"] = init.contentType ?? \"application/json\";")
        .line("body = headers[\"Content-Type\"].includes(\"json\") ? JSON.stringify(init.body) : (init.body as BodyInit);")
        .close("}");
    w.line("const response = await (this.options.fetch ?? fetch)(url, { method, headers, body });");
    w.line("if (!response.ok) throw new ApiError(response.status, await response.text());");
    w.line("return response;");
    w.close("}");
    w.blank();
    w.open("private async request(method: string, path: string, init: RequestInit_): Promise<unknown> {")
        .line("const response = await this.send(method, path, init);")
        .line("const text = await response.text();")
        .line("return text ? JSON.parse(text) : undefined;")
        .close("}");
    w.close("}");
    w.finish()
}

fn operation(w: &mut CodeWriter, op: &OperationView<'_>) {
    let endpoint = op.endpoint;
    let method = ident(&endpoint.operation_id);

    let mut args: Vec<String> = op
        .path_params
        .iter()
        .map(|p| format!("{}: {}", ident(&p.parameter.name), p.mapped.expression))
        .collect();
    if let (Some(body), Some(request)) = (&op.body, &endpoint.request_body) {
        let optional = if request.required { "" } else { "?" };
        args.push(format!("body{optional}: {}", body.expression));
    }
    let extra: Vec<_> = op.query_params.iter().chain(&op.header_params).collect();
    if !extra.is_empty() {
        let fields: Vec<String> = extra
            .iter()
            .map(|p| {
                let optional = if p.parameter.required { "" } else { "?" };
                format!("{}{optional}: {}", property_key(&p.parameter.name), p.mapped.expression)
            })
            .collect();
        let default = if extra.iter().any(|p| p.parameter.required) { "" } else { " = {}" };
        args.push(format!("params: {{ {} }}{default}", fields.join("; ")));
    }

    let mut url = String::from("`");
    for part in path_parts(&endpoint.path) {
        match part {
            PathPart::Literal(text) => url.push_str(&text.replace('`', "\\`")),
            PathPart::Param(name) => url.push_str(&format!("${{encodeURIComponent(String({}))}}", ident(name))),
        }
    }
    url.push('`');

    let mut init = Vec::new();
    if !op.query_params.is_empty() {
        let pairs: Vec<String> = op
            .query_params
            .iter()
            .map(|p| format!("{}: params[{}]", quote(&p.parameter.name), quote(&p.parameter.name)))
            .collect();
        init.push(format!("query: {{ {} }}", pairs.join(", ")));
    }
    if !op.header_params.is_empty() {
        let pairs: Vec<String> = op
            .header_params
            .iter()
            .map(|p| format!("{}: params[{}]", quote(&p.parameter.name), quote(&p.parameter.name)))
            .collect();
        init.push(format!("headers: {{ {} }}", pairs.join(", ")));
    }
    if let Some(request) = &endpoint.request_body
        && op.body.is_some()
    {
        init.push("body".to_string());
        init.push(format!("contentType: {}", quote(&request.content_type)));
    }
    let init = format!("{{ {} }}", init.join(", "));
    let init = if init == "{  }" { "{}".to_string() } else { init };

    jsdoc(w, endpoint.summary.as_deref().or(endpoint.description.as_deref()), endpoint.deprecated);
    let verb = endpoint.method.as_str();
    if endpoint.streaming {
        w.open(format!("async {method}({}): Promise<ReadableStream<Uint8Array> | null> {{", args.join(", ")));
        w.line(format!("const response = await this.send({}, {url}, {init});", quote(verb)));
        w.line("return response.body;");
    } else {
        let output = op.response.as_ref().map(|r| r.expression.clone()).unwrap_or_else(|| "void".into());
        w.open(format!("async {method}({}): Promise<{output}> {{", args.join(", ")));
        w.line(format!("return (await this.request({}, {url}, {init})) as {output};", quote(verb)));
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
        let ctx = GenerationContext::new(&schema, TargetLanguage::TypeScript, MapperOptions::default(), "petstore", "1.0.0");
        TypeScriptGenerator.generate(&ctx).unwrap()
    }

    fn file<'o>(out: &'o GeneratorOutput, path: &str) -> &'o str {
        &out.files.iter().find(|f| f.path == path).unwrap().content
    }

    #[test]
    fn emits_package_layout() {
        let out = output();
        let paths: Vec<&str> = out.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/models.ts", "src/client.ts", "src/index.ts", "package.json", "tsconfig.json"]);
        let package: serde_json::Value = serde_json::from_str(file(&out, "package.json")).unwrap();
        assert_eq!(package["name"], "petstore");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn models_follow_the_schema() {
        let out = output();
        let models = file(&out, "src/models.ts");
        assert!(models.contains("export interface Pet {"));
        assert!(models.contains("  id: string;"));
        assert!(models.contains("  tags?: string[];"));
        assert!(models.contains("  parent?: Pet;"));
        assert!(models.contains("  attributes?: Record<string, string>;"));
        assert!(models.contains("export type Status = \"available\" | \"sold\" | \"in-care\";"));
        assert!(models.contains("  IN_CARE: \"in-care\","));
        assert!(models.contains("export type Owner = Person | Shelter;"));
        assert!(models.contains("export type Priority = 1 | 2 | 3;"));
    }

    #[test]
    fn client_methods() {
        let out = output();
        let client = file(&out, "src/client.ts");
        assert!(client.contains("async listPets(params: { limit?: number } = {}): Promise<Pet[]> {"));
        assert!(client.contains("async getPet(petId: string, params: { \"X-Trace\"?: string } = {}): Promise<Pet> {"));
        assert!(client.contains("`/pets/${encodeURIComponent(String(petId))}`"));
        assert!(client.contains("async deletePet(petId: string): Promise<void> {"));
        assert!(client.contains("async createPet(body: NewPet): Promise<Pet> {"));
        assert!(client.contains("async streamEvents(): Promise<ReadableStream<Uint8Array> | null> {"));
        assert!(client.contains("`Bearer ${this.options.token}`"));
        assert!(client.contains("\"https://pets.example.com/v1\""));
    }
}
