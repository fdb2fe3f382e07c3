//! Per-language generators.
//!
//! Each generator consumes the canonical schema through a private
//! [`TypeMapper`] and returns an in-memory file list. Generators never touch
//! the filesystem; the orchestrator writes files once every language is done.
pub mod csharp;
pub mod go;
pub mod java;
pub mod python;
pub mod rust;
pub mod swift;
pub mod typescript;
mod writer;

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{codes, CanonError, Diagnostic, Result};
use crate::ir::{
    AuthKind, CanonicalSchema, EnumLiteral, EnumValue, Endpoint, Parameter, ParameterLocation,
    PrimitiveKind, Property, TypeDefinition, TypeId, TypeKind, TypeReference,
};
use crate::lower::{MappedType, MapperOptions, TargetLanguage, TypeMapper};

pub use writer::CodeWriter;

// ————————————————————————————————————————————————————————————————————————————
// CONTRACT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Relative, `/`-separated.
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorOutput {
    pub files: Vec<GeneratedFile>,
    pub warnings: Vec<Diagnostic>,
}

/// Advisory commands for the generated package. Nothing runs them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCommands {
    pub build_command: Option<String>,
    pub test_command: Option<String>,
    pub publish_command: Option<String>,
    pub registry_url: Option<String>,
}

pub trait Generator: Send + Sync {
    fn language(&self) -> TargetLanguage;

    fn generate(&self, context: &GenerationContext<'_>) -> Result<GeneratorOutput>;

    fn commands(&self, _context: &GenerationContext<'_>) -> PackageCommands {
        PackageCommands::default()
    }
}

pub fn builtin(language: TargetLanguage) -> Box<dyn Generator> {
    match language {
        TargetLanguage::TypeScript => Box::new(typescript::TypeScriptGenerator),
        TargetLanguage::Python => Box::new(python::PythonGenerator),
        TargetLanguage::Rust => Box::new(rust::RustGenerator),
        TargetLanguage::Go => Box::new(go::GoGenerator),
        TargetLanguage::Java => Box::new(java::JavaGenerator),
        TargetLanguage::CSharp => Box::new(csharp::CSharpGenerator),
        TargetLanguage::Swift => Box::new(swift::SwiftGenerator),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONTEXT & VIEWS
// ————————————————————————————————————————————————————————————————————————————

pub struct GenerationContext<'s> {
    pub schema: &'s CanonicalSchema,
    pub mapper: TypeMapper<'s>,
    pub package_name: String,
    pub package_version: String,
}

pub struct FieldView<'s> {
    pub property: &'s Property,
    /// The edge as declared, nullability included.
    pub mapped: MappedType,
    /// The target without the nullable wrapper.
    pub base: MappedType,
    /// Nullable or not required.
    pub optional: bool,
    /// Field points back at its owner through plain struct edges and needs
    /// a box or pointer in value-typed languages.
    pub indirect: bool,
}

pub struct UnionVariant {
    /// PascalCase label derived from the variant's type name.
    pub label: String,
    pub mapped: MappedType,
}

pub enum Declaration<'s> {
    Object {
        def: &'s TypeDefinition,
        fields: Vec<FieldView<'s>>,
        additional: Option<MappedType>,
    },
    Enum {
        def: &'s TypeDefinition,
        values: &'s [EnumValue],
    },
    Union {
        def: &'s TypeDefinition,
        variants: Vec<UnionVariant>,
    },
}

impl<'s> Declaration<'s> {
    pub fn def(&self) -> &'s TypeDefinition {
        match self {
            Declaration::Object { def, .. } | Declaration::Enum { def, .. } | Declaration::Union { def, .. } => {
                *def
            }
        }
    }
}

pub struct ParamView<'s> {
    pub parameter: &'s Parameter,
    pub mapped: MappedType,
}

pub struct OperationView<'s> {
    pub endpoint: &'s Endpoint,
    pub path_params: Vec<ParamView<'s>>,
    pub query_params: Vec<ParamView<'s>>,
    /// Header and cookie parameters.
    pub header_params: Vec<ParamView<'s>>,
    pub body: Option<MappedType>,
    pub response: Option<MappedType>,
}

impl OperationView<'_> {
    pub fn params(&self) -> impl Iterator<Item = &ParamView<'_>> {
        self.path_params.iter().chain(&self.query_params).chain(&self.header_params)
    }

    pub fn imports(&self) -> BTreeSet<String> {
        let mut imports = BTreeSet::new();
        for p in self.params() {
            imports.extend(p.mapped.imports.iter().cloned());
        }
        for m in self.body.iter().chain(&self.response) {
            imports.extend(m.imports.iter().cloned());
        }
        imports
    }
}

/// How the client attaches one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthApplication {
    Bearer,
    Basic,
    Header(String),
    Query(String),
    Cookie(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPart<'p> {
    Literal(&'p str),
    Param(&'p str),
}

/// Splits `/users/{id}/posts` into literal and parameter runs.
pub fn path_parts(path: &str) -> Vec<PathPart<'_>> {
    let mut parts = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else { break };
        if start > 0 {
            parts.push(PathPart::Literal(&rest[..start]));
        }
        parts.push(PathPart::Param(&rest[start + 1..start + len]));
        rest = &rest[start + len + 1..];
    }
    if !rest.is_empty() {
        parts.push(PathPart::Literal(rest));
    }
    parts
}

/// Non-string enums lower to their literal's scalar type.
pub fn is_string_enum(values: &[EnumValue]) -> bool {
    values.iter().all(|v| matches!(v.value, EnumLiteral::String(_)))
}

/// The single scalar kind an enum's literals share. Mixed enums fall back
/// to `Any`; integers mixed with floats widen to `Number`.
pub fn enum_primitive(values: &[EnumValue]) -> PrimitiveKind {
    let mut kinds = values.iter().map(|v| match v.value {
        EnumLiteral::String(_) => PrimitiveKind::String,
        EnumLiteral::Integer(_) => PrimitiveKind::Integer,
        EnumLiteral::Number(_) => PrimitiveKind::Number,
        EnumLiteral::Bool(_) => PrimitiveKind::Boolean,
    });
    let Some(first) = kinds.next() else { return PrimitiveKind::String };
    kinds.fold(first, |acc, kind| match (acc, kind) {
        (a, b) if a == b => a,
        (PrimitiveKind::Integer | PrimitiveKind::Number, PrimitiveKind::Integer | PrimitiveKind::Number) => {
            PrimitiveKind::Number
        }
        _ => PrimitiveKind::Any,
    })
}

/// Applies `case` and escapes the result against a keyword list. Empty
/// results become `value` in the same case.
pub fn identifier(raw: &str, case: fn(&str) -> String, keywords: &[&str], escape: fn(&str) -> String) -> String {
    let ident = case(raw);
    if ident.is_empty() {
        return case("value");
    }
    if keywords.contains(&ident.as_str()) { escape(&ident) } else { ident }
}

pub fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

impl<'s> GenerationContext<'s> {
    pub fn new(
        schema: &'s CanonicalSchema,
        language: TargetLanguage,
        options: MapperOptions,
        package_name: impl Into<String>,
        package_version: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            mapper: TypeMapper::for_schema(schema, language, options),
            package_name: package_name.into(),
            package_version: package_version.into(),
        }
    }

    pub fn language(&self) -> TargetLanguage {
        self.mapper.language()
    }

    pub fn map(&self, reference: TypeReference) -> Result<MappedType> {
        self.mapper.map(reference)
    }

    pub fn type_name(&self, def: &TypeDefinition) -> String {
        self.mapper.type_name(def)
    }

    /// Wraps in the language's nullable form unless already nullable.
    pub fn optional(&self, mapped: &MappedType) -> MappedType {
        if mapped.nullable {
            return mapped.clone();
        }
        let mut imports = mapped.imports.clone();
        let expression = self.mapper.rules().nullable.wrap(&mapped.expression, &mut imports);
        MappedType { expression, imports, nullable: true }
    }

    /// Header line for generated sources, without comment markers.
    pub fn banner(&self) -> String {
        format!(
            "Generated by canonapi from {} {}. Do not edit.",
            self.schema.metadata.title, self.schema.metadata.version
        )
    }

    pub fn json_file(&self, path: &str, value: &serde_json::Value) -> Result<GeneratedFile> {
        let content = serde_json::to_string_pretty(value).map_err(|e| CanonError::Generation {
            language: self.language().to_string(),
            message: format!("{path}: {e}"),
        })?;
        Ok(GeneratedFile::new(path, content + "\n"))
    }

    pub fn base_url(&self) -> &str {
        self.schema.metadata.base_url.as_deref().unwrap_or("http://localhost")
    }

    pub fn description(&self) -> String {
        self.schema
            .metadata
            .description
            .clone()
            .unwrap_or_else(|| format!("Client for {}", self.schema.metadata.title))
    }

    /// Nominal types that need a declaration, in registry order. Pure maps
    /// and primitives are inlined; degraded unions are skipped.
    pub fn declarations(&self) -> Result<Vec<Declaration<'s>>> {
        let mut out = Vec::new();
        let schema = self.schema;
        for def in &schema.types {
            match &def.kind {
                TypeKind::Object { properties, additional_properties, .. } => {
                    if properties.is_empty() && additional_properties.is_some() {
                        continue;
                    }
                    let mut fields = Vec::with_capacity(properties.len());
                    for property in properties {
                        fields.push(FieldView {
                            property,
                            mapped: self.map(property.ty)?,
                            base: self.map(TypeReference::new(property.ty.type_id))?,
                            optional: property.ty.nullable || !property.required,
                            indirect: self.needs_indirection(def.id, property.ty),
                        });
                    }
                    let additional = additional_properties.map(|r| self.map(r)).transpose()?;
                    out.push(Declaration::Object { def, fields, additional });
                }
                TypeKind::Enum { values } => out.push(Declaration::Enum { def, values }),
                TypeKind::Union { variants, .. } => {
                    if self.mapper.degrades_unions() {
                        continue;
                    }
                    let mut labels = HashSet::new();
                    let mut views = Vec::with_capacity(variants.len());
                    for variant in variants {
                        let target = self.mapper.table().resolve(variant.type_id)?;
                        let stem = crate::registry::naming::to_pascal_case(&target.name);
                        let mut label = stem.clone();
                        let mut n = 2;
                        while !labels.insert(label.clone()) {
                            label = format!("{stem}{n}");
                            n += 1;
                        }
                        views.push(UnionVariant { label, mapped: self.map(*variant)? });
                    }
                    out.push(Declaration::Union { def, variants: views });
                }
                TypeKind::Primitive { .. } | TypeKind::Array { .. } => {}
            }
        }
        Ok(out)
    }

    pub fn operations(&self) -> Result<Vec<OperationView<'s>>> {
        let schema = self.schema;
        let mut out = Vec::with_capacity(schema.endpoints.len());
        for endpoint in &schema.endpoints {
            let mut view = OperationView {
                endpoint,
                path_params: Vec::new(),
                query_params: Vec::new(),
                header_params: Vec::new(),
                body: endpoint.request_body.as_ref().map(|b| self.map(b.ty)).transpose()?,
                response: endpoint.success_response().and_then(|r| r.ty).map(|t| self.map(t)).transpose()?,
            };
            for parameter in &endpoint.parameters {
                let param = ParamView { parameter, mapped: self.map(parameter.ty)? };
                match parameter.location {
                    ParameterLocation::Path => view.path_params.push(param),
                    ParameterLocation::Query => view.query_params.push(param),
                    ParameterLocation::Header | ParameterLocation::Cookie => view.header_params.push(param),
                }
            }
            out.push(view);
        }
        Ok(out)
    }

    /// Credential placements for every auth scheme the endpoints use.
    pub fn auth(&self) -> Vec<AuthApplication> {
        let mut out = Vec::new();
        for scheme in &self.schema.authentication {
            let application = match &scheme.kind {
                AuthKind::ApiKey { name, location } => match location {
                    ParameterLocation::Query => AuthApplication::Query(name.clone()),
                    ParameterLocation::Cookie => AuthApplication::Cookie(name.clone()),
                    _ => AuthApplication::Header(name.clone()),
                },
                AuthKind::Http { scheme, .. } if scheme == "basic" => AuthApplication::Basic,
                AuthKind::Http { .. } | AuthKind::OAuth2 { .. } | AuthKind::OpenIdConnect { .. } => {
                    AuthApplication::Bearer
                }
            };
            if !out.contains(&application) {
                out.push(application);
            }
        }
        out
    }

    pub fn degraded_union_warnings(&self) -> Vec<Diagnostic> {
        if !self.mapper.degrades_unions() {
            return Vec::new();
        }
        self.schema
            .types
            .iter()
            .filter(|t| matches!(t.kind, TypeKind::Union { .. }))
            .map(|t| Diagnostic {
                path: format!("types.{}", t.name),
                code: codes::DEGRADED_UNION.to_string(),
                message: format!(
                    "union {} lowered to `{}` for {}",
                    t.name,
                    self.mapper.rules().top.name,
                    self.language()
                ),
            })
            .collect()
    }

    /// Whether `field` reaches `owner` through object properties alone
    /// (arrays and maps already break the cycle).
    pub fn needs_indirection(&self, owner: TypeId, field: TypeReference) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![field.type_id];
        while let Some(id) = stack.pop() {
            if id == owner {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Ok(def) = self.mapper.table().resolve(id)
                && let TypeKind::Object { properties, .. } = &def.kind
            {
                stack.extend(properties.iter().map(|p| p.ty.type_id));
            }
        }
        false
    }
}

/// Merges import sets from several mapped types.
pub fn collect_imports<'m>(mapped: impl IntoIterator<Item = &'m MappedType>) -> BTreeSet<String> {
    let mut imports = BTreeSet::new();
    for m in mapped {
        imports.extend(m.imports.iter().cloned());
    }
    imports
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::builder::{build_from_str, BuildOptions};
    use crate::ir::CanonicalSchema;

    pub const PETSTORE: &str = r##"{
        "openapi": "3.0.3",
        "info": {"title": "Petstore", "version": "1.0.0", "description": "Pets and owners."},
        "servers": [{"url": "https://pets.example.com/v1"}],
        "security": [{"bearer": []}],
        "paths": {
            "/pets": {
                "get": {"operationId": "listPets",
                    "parameters": [{"name": "limit", "in": "query", "schema": {"type": "integer"}}],
                    "responses": {"200": {"description": "ok", "content": {"application/json":
                        {"schema": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}}}}}},
                "post": {"operationId": "createPet",
                    "requestBody": {"required": true, "content": {"application/json": {"schema": {"$ref": "#/components/schemas/NewPet"}}}},
                    "responses": {"201": {"description": "created", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}},
                                  "400": {"description": "bad", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Problem"}}}}}}
            },
            "/pets/{petId}": {
                "get": {"operationId": "getPet",
                    "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "string", "format": "uuid"}},
                                   {"name": "X-Trace", "in": "header", "schema": {"type": "string"}}],
                    "responses": {"200": {"description": "ok", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}}}},
                "delete": {"operationId": "deletePet",
                    "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "string", "format": "uuid"}}],
                    "responses": {"204": {"description": "gone"}}}
            },
            "/events": {
                "get": {"operationId": "streamEvents",
                    "responses": {"200": {"description": "events", "content": {"text/event-stream": {"schema": {"type": "string"}}}}}}
            }
        },
        "components": {
            "securitySchemes": {"bearer": {"type": "http", "scheme": "bearer"}},
            "schemas": {
                "Pet": {"type": "object", "required": ["id", "name"], "properties": {
                    "id": {"type": "string", "format": "uuid"},
                    "name": {"type": "string", "description": "Display name."},
                    "status": {"$ref": "#/components/schemas/Status"},
                    "tags": {"type": "array", "items": {"type": "string"}, "nullable": true},
                    "born": {"type": "string", "format": "date-time"},
                    "attributes": {"type": "object", "additionalProperties": {"type": "string"}},
                    "parent": {"$ref": "#/components/schemas/Pet"},
                    "owner": {"$ref": "#/components/schemas/Owner"}
                }},
                "NewPet": {"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}},
                "Status": {"type": "string", "enum": ["available", "sold", "in-care"]},
                "Owner": {"oneOf": [
                    {"type": "object", "title": "Person", "properties": {"name": {"type": "string"}}},
                    {"type": "object", "title": "Shelter", "properties": {"address": {"type": "string"}}}
                ]},
                "Priority": {"type": "integer", "enum": [1, 2, 3]},
                "Problem": {"type": "object", "properties": {"type": {"type": "string"}, "detail": {"type": "string"}}}
            }
        }
    }"##;

    pub fn petstore() -> CanonicalSchema {
        let outcome = build_from_str(PETSTORE, None, &BuildOptions::default());
        assert!(outcome.success, "{:?}", outcome.errors);
        outcome.schema.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_templates_split() {
        assert_eq!(
            path_parts("/users/{id}/posts/{postId}"),
            vec![
                PathPart::Literal("/users/"),
                PathPart::Param("id"),
                PathPart::Literal("/posts/"),
                PathPart::Param("postId"),
            ]
        );
        assert_eq!(path_parts("/"), vec![PathPart::Literal("/")]);
    }

    #[test]
    fn enum_kinds() {
        let values = |literals: Vec<EnumLiteral>| -> Vec<EnumValue> {
            literals.into_iter().map(|value| EnumValue { name: "X".into(), value }).collect()
        };
        assert_eq!(enum_primitive(&values(vec![EnumLiteral::Integer(1), EnumLiteral::Integer(2)])), PrimitiveKind::Integer);
        assert_eq!(
            enum_primitive(&values(vec![EnumLiteral::Integer(1), EnumLiteral::Number(ordered_float::OrderedFloat(1.5))])),
            PrimitiveKind::Number
        );
        assert_eq!(enum_primitive(&values(vec![EnumLiteral::Bool(true), EnumLiteral::String("a".into())])), PrimitiveKind::Any);
        assert!(is_string_enum(&values(vec![EnumLiteral::String("a".into())])));
    }

    #[test]
    fn petstore_fixture_keeps_its_references() {
        let schema = fixtures::petstore();
        let pet = schema.types.iter().find(|t| t.name == "Pet").unwrap();
        let list = schema.endpoints.iter().find(|e| e.operation_id == "listPets").unwrap();
        let items = list.success_response().and_then(|r| r.ty).unwrap();
        let TypeKind::Array { items, .. } = &schema.type_by_id(items.type_id).unwrap().kind else {
            panic!("listPets does not return an array");
        };
        assert_eq!(items.type_id, pet.id);
    }

    #[test]
    fn declarations_and_recursion() {
        let schema = fixtures::petstore();
        let ctx = GenerationContext::new(&schema, TargetLanguage::Rust, MapperOptions::default(), "pets", "1.0.0");
        let decls = ctx.declarations().unwrap();
        let names: Vec<&str> = decls.iter().map(|d| d.def().name.as_str()).collect();
        assert!(names.contains(&"Pet"));
        assert!(names.contains(&"Owner"));
        // `attributes` is a pure map and gets no declaration.
        assert!(!names.contains(&"Attributes"));

        let Some(Declaration::Object { fields, .. }) = decls.iter().find(|d| d.def().name == "Pet") else {
            panic!("Pet missing");
        };
        let parent = fields.iter().find(|f| f.property.name == "parent").unwrap();
        let tags = fields.iter().find(|f| f.property.name == "tags").unwrap();
        assert!(parent.indirect);
        assert!(!tags.indirect);
        assert_eq!(tags.mapped.expression, "Option<Vec<String>>");
    }

    #[test]
    fn degraded_unions_are_reported() {
        let schema = fixtures::petstore();
        let go = GenerationContext::new(&schema, TargetLanguage::Go, MapperOptions::default(), "pets", "1.0.0");
        let warnings = go.degraded_union_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, codes::DEGRADED_UNION);
        assert!(go.declarations().unwrap().iter().all(|d| d.def().name != "Owner"));

        let ts = GenerationContext::new(&schema, TargetLanguage::TypeScript, MapperOptions::default(), "pets", "1.0.0");
        assert!(ts.degraded_union_warnings().is_empty());
        assert_eq!(ts.auth(), vec![AuthApplication::Bearer]);
    }
}
