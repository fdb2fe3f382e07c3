//! Canonical Schema Builder.
//!
//! Walks one [`SourceDocument`] and routes every type node through a fresh
//! [`TypeRegistry`], children before parents. Named schemas are registered
//! first, in document order, so they claim their bare names before any
//! inline node does. Endpoints, auth schemes and error shapes follow.
//!
//! Recoverable oddities become warnings with a safe substitute; structural
//! violations abort the build. Either way the caller gets a [`BuildOutcome`].
mod compose;
mod endpoints;
mod security;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapter::{self, SchemaNode, SourceDocument};
use crate::error::{codes, CanonError, Diagnostic, Diagnostics, Result};
use crate::ir::{
    ArrayConstraints, CanonicalSchema, EnumLiteral, EnumValue, PrimitiveKind, Property,
    SchemaMetadata, SourceFormat, TypeKind, TypeReference,
};
use crate::registry::naming::to_screaming_snake_case;
use crate::registry::{NameHint, NodeKey, TypeCandidate, TypeRegistry};

use compose::ObjectShape;
pub use compose::MergePrecedence;

// ————————————————————————————————————————————————————————————————————————————
// PUBLIC API
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    pub all_of_precedence: MergePrecedence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<CanonicalSchema>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl BuildOutcome {
    fn finish(mut diagnostics: Diagnostics, result: Result<CanonicalSchema>) -> Self {
        let schema = match result {
            Ok(schema) => Some(schema),
            Err(error) => {
                diagnostics.error(&error);
                None
            }
        };
        let (errors, warnings) = diagnostics.into_parts();
        Self { success: schema.is_some() && errors.is_empty(), schema, errors, warnings }
    }
}

/// Builds a canonical schema from an already-parsed document.
pub fn build(document: &SourceDocument, options: &BuildOptions) -> BuildOutcome {
    let mut diagnostics = Diagnostics::new();
    let result = build_schema(document, options, &mut diagnostics);
    BuildOutcome::finish(diagnostics, result)
}

/// Parses and builds in one call. Adapter and builder diagnostics share one
/// collector.
pub fn build_from_str(
    source: &str,
    format: Option<SourceFormat>,
    options: &BuildOptions,
) -> BuildOutcome {
    let mut diagnostics = Diagnostics::new();
    let result = adapter::parse_document(source, format, &mut diagnostics)
        .and_then(|document| build_schema(&document, options, &mut diagnostics));
    BuildOutcome::finish(diagnostics, result)
}

/// Builds from an already-decoded document, e.g. the output of a jq
/// pre-filter.
pub fn build_from_value(
    value: serde_json::Value,
    format: Option<SourceFormat>,
    options: &BuildOptions,
) -> BuildOutcome {
    let mut diagnostics = Diagnostics::new();
    let result = adapter::parse_value(value, format, &mut diagnostics)
        .and_then(|document| build_schema(&document, options, &mut diagnostics));
    BuildOutcome::finish(diagnostics, result)
}

/// Lower-level entry point for callers that manage their own diagnostics.
pub fn build_schema(
    document: &SourceDocument,
    options: &BuildOptions,
    diagnostics: &mut Diagnostics,
) -> Result<CanonicalSchema> {
    SchemaBuilder::new(document, options, diagnostics).run()
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDER STATE
// ————————————————————————————————————————————————————————————————————————————

/// Result of looking at a node's shape: either something new to register,
/// or an existing edge (`$ref`, collapsed single-variant union).
enum Lowered {
    Candidate(TypeCandidate),
    Reference(TypeReference),
}

struct SchemaBuilder<'a, 'd> {
    document: &'a SourceDocument,
    options: &'a BuildOptions,
    diagnostics: &'d mut Diagnostics,
    registry: TypeRegistry,
    /// Resolved structural aliases, nullability included.
    aliases: HashMap<String, TypeReference>,
    /// Alias addresses currently being resolved, for cycle detection.
    resolving: Vec<String>,
    operation_ids: HashSet<String>,
}

impl<'a, 'd> SchemaBuilder<'a, 'd> {
    fn new(document: &'a SourceDocument, options: &'a BuildOptions, diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            document,
            options,
            diagnostics,
            registry: TypeRegistry::new(),
            aliases: HashMap::new(),
            resolving: Vec::new(),
            operation_ids: HashSet::new(),
        }
    }

    fn run(mut self) -> Result<CanonicalSchema> {
        let document = self.document;
        debug!(
            format = %document.format,
            schemas = document.schemas.len(),
            operations = document.operations.len(),
            "building canonical schema"
        );

        let authentication = self.auth_schemes();
        let auth_table = security::AuthTable::new(document, &authentication);

        for address in document.schemas.keys() {
            self.resolve_ref(address, address)?;
        }
        debug!(types = self.registry.len(), "registered named schemas");

        let mut endpoints = Vec::with_capacity(document.operations.len());
        for operation in &document.operations {
            endpoints.push(self.endpoint(operation, &auth_table)?);
        }
        let errors = self.error_defs(&endpoints)?;

        let types = std::mem::take(&mut self.registry).into_types()?;
        info!(
            types = types.len(),
            endpoints = endpoints.len(),
            auth_schemes = authentication.len(),
            errors = errors.len(),
            "built canonical schema"
        );

        Ok(CanonicalSchema {
            metadata: SchemaMetadata {
                title: document.info.title.clone(),
                version: document.info.version.clone(),
                description: document.info.description.clone(),
                base_url: document.info.base_url.clone(),
                source_format: document.format,
                source_version: document.info.source_version.clone(),
            },
            types,
            endpoints,
            authentication,
            errors,
        })
    }

    // ————————————————————————————————————————————————————————————————————————
    // TYPE LOWERING
    // ————————————————————————————————————————————————————————————————————————

    /// Registers `node` (and everything below it) and returns its edge.
    fn lower(&mut self, node: &SchemaNode, hint: &NameHint, path: &str) -> Result<TypeReference> {
        let reference = match self.shape(node, hint, path)? {
            Lowered::Candidate(candidate) => self.registry.register(candidate)?,
            Lowered::Reference(reference) => reference,
        };
        Ok(reference.with_nullable(admits_null(node)))
    }

    fn resolve_ref(&mut self, address: &str, path: &str) -> Result<TypeReference> {
        if let Some(reference) = self.aliases.get(address) {
            return Ok(*reference);
        }
        let document = self.document;
        let named = document
            .lookup(address)
            .ok_or_else(|| CanonError::structural(path, format!("unresolvable $ref {address:?}")))?;

        if named.node.is_nominal() && !self.passes_through(&named.node, address)? {
            let nullable = admits_null(&named.node);
            if let Some(id) = self.registry.lookup(&NodeKey::Ref(address.to_string())) {
                return Ok(TypeReference::new(id).with_nullable(nullable));
            }
            let hint = NameHint::new(&named.name);
            let id = self.registry.reserve(address, &hint);
            let reference = match self.shape(&named.node, &hint, address)? {
                Lowered::Candidate(candidate) => self.registry.define(id, candidate)?,
                Lowered::Reference(_) => {
                    return Err(CanonError::structural(address, "named schema does not define a type"));
                }
            };
            return Ok(reference.with_nullable(nullable));
        }

        if self.resolving.iter().any(|a| a == address) {
            let mut chain = self.resolving.clone();
            chain.push(address.to_string());
            return Err(CanonError::structural(address, format!("alias cycle {}", chain.join(" → "))));
        }
        self.resolving.push(address.to_string());
        let result = self.lower(&named.node, &NameHint::new(&named.name), address);
        self.resolving.pop();
        let reference = result?;
        self.registry.alias(address, reference.type_id);
        self.aliases.insert(address.to_string(), reference);
        Ok(reference)
    }

    /// Whether `node` is an `allOf` that lowers to one of its members rather
    /// than to an object of its own.
    fn passes_through(&self, node: &SchemaNode, path: &str) -> Result<bool> {
        if node.all_of.is_empty() || node.kind.as_deref() == Some("object") {
            return Ok(false);
        }
        let precedence = self.options.all_of_precedence;
        let merged = compose::flatten_all_of(self.document, node, precedence, path)?;
        Ok(merged.passthrough(precedence).is_some())
    }

    fn shape(&mut self, node: &SchemaNode, hint: &NameHint, path: &str) -> Result<Lowered> {
        if let Some(address) = node.reference.as_deref() {
            return self.resolve_ref(address, path).map(Lowered::Reference);
        }

        if !node.all_of.is_empty() {
            let document = self.document;
            let precedence = self.options.all_of_precedence;
            let merged = compose::flatten_all_of(document, node, precedence, path)?;
            let member = merged.passthrough(precedence).filter(|_| node.kind.as_deref() != Some("object"));
            for ignored in merged.opaque.iter().filter(|m| member.is_none_or(|kept| !std::ptr::eq(kept, **m))) {
                self.diagnostics.warn(
                    path,
                    codes::IGNORED_ALL_OF_MEMBER,
                    format!("allOf member {} is not an object; ignored", describe_member(ignored)),
                );
            }
            if let Some(member) = member {
                return self.lower(member, hint, path).map(Lowered::Reference);
            }
            return self.object(&merged, node, hint, path).map(Lowered::Candidate);
        }

        if node.is_union() {
            let members: Vec<&SchemaNode> = node.union_members().collect();
            let variants: Vec<&SchemaNode> = members.iter().copied().filter(|v| !v.is_null_type()).collect();
            let collapsible = node.properties.is_empty()
                && node.enum_values.is_empty()
                && node.kind.as_deref() != Some("object");
            match variants.len() {
                0 if members.is_empty() => {
                    return Err(CanonError::structural(path, "union declares no variants"));
                }
                0 => {
                    self.diagnostics.warn(
                        path,
                        codes::NULL_ONLY_UNION,
                        "union only admits null; lowered to nullable any",
                    );
                    return Ok(Lowered::Candidate(TypeCandidate::primitive(PrimitiveKind::Any)));
                }
                1 if collapsible => {
                    return self.lower(variants[0], hint, path).map(Lowered::Reference);
                }
                1 => {}
                _ => {
                    let mut refs = Vec::with_capacity(variants.len());
                    for (i, variant) in variants.into_iter().enumerate() {
                        let variant_hint = match variant.title.as_deref() {
                            Some(title) => NameHint::new(title),
                            None => hint.suffixed(&format!("Variant{}", i + 1)),
                        };
                        refs.push(self.lower(variant, &variant_hint, &format!("{path}.oneOf[{i}]"))?);
                    }
                    let kind = TypeKind::Union { variants: refs, discriminator: node.discriminator.clone() };
                    return Ok(Lowered::Candidate(
                        TypeCandidate::new(kind, hint.clone()).describe(node.description.clone(), node.deprecated),
                    ));
                }
            }
        }

        if !node.enum_values.is_empty() {
            return Ok(Lowered::Candidate(self.enumeration(node, hint, path)));
        }

        let kind = node.kind.as_deref();
        if kind == Some("object")
            || !node.properties.is_empty()
            || (kind.is_none() && node.additional_properties.is_some())
        {
            return self.object(&ObjectShape::of(node), node, hint, path).map(Lowered::Candidate);
        }

        if kind == Some("array") || (kind.is_none() && node.items.is_some()) {
            let items = node
                .items
                .as_deref()
                .ok_or_else(|| CanonError::structural(path, "array schema has no `items`"))?;
            let items = self.lower(items, &hint.suffixed("Item"), &format!("{path}.items"))?;
            let kind = TypeKind::Array {
                items,
                constraints: ArrayConstraints {
                    min_items: node.min_items,
                    max_items: node.max_items,
                    unique_items: node.unique_items,
                },
            };
            return Ok(Lowered::Candidate(
                TypeCandidate::new(kind, hint.clone()).describe(node.description.clone(), node.deprecated),
            ));
        }

        Ok(Lowered::Candidate(TypeCandidate::primitive(self.primitive(node, path))))
    }

    fn primitive(&mut self, node: &SchemaNode, path: &str) -> PrimitiveKind {
        match node.kind.as_deref() {
            None => PrimitiveKind::Any,
            Some("string") => match node.format.as_deref() {
                Some("date-time") => PrimitiveKind::DateTime,
                Some("date") => PrimitiveKind::Date,
                Some("uuid") => PrimitiveKind::Uuid,
                Some("binary" | "byte") => PrimitiveKind::Binary,
                _ => PrimitiveKind::String,
            },
            Some("integer") => PrimitiveKind::Integer,
            Some("number") => PrimitiveKind::Number,
            Some("boolean") => PrimitiveKind::Boolean,
            Some("null") => {
                self.diagnostics.warn(
                    path,
                    codes::NULL_ONLY_UNION,
                    "schema only admits null; lowered to nullable any",
                );
                PrimitiveKind::Any
            }
            Some(other) => {
                self.diagnostics.warn(
                    path,
                    codes::UNKNOWN_PRIMITIVE,
                    format!("unrecognized type {other:?}; lowered to any"),
                );
                PrimitiveKind::Any
            }
        }
    }

    fn object(
        &mut self,
        shape: &ObjectShape<'_>,
        node: &SchemaNode,
        hint: &NameHint,
        path: &str,
    ) -> Result<TypeCandidate> {
        let mut properties = Vec::with_capacity(shape.properties.len());
        for (name, schema) in &shape.properties {
            let ty = self.lower(schema, &NameHint::within(name, hint), &format!("{path}.properties.{name}"))?;
            properties.push(Property {
                name: name.clone(),
                ty,
                required: shape.required.contains(name),
                default: schema.default.clone(),
                description: schema.description.clone(),
            });
        }
        let additional_properties = match shape.additional_properties {
            Some(extra) => Some(self.lower(extra, &hint.suffixed("Value"), &format!("{path}.additionalProperties"))?),
            None => None,
        };
        let kind = TypeKind::Object {
            properties,
            required_names: shape.required_names(),
            additional_properties,
        };
        Ok(TypeCandidate::new(kind, hint.clone()).describe(node.description.clone(), node.deprecated))
    }

    fn enumeration(&mut self, node: &SchemaNode, hint: &NameHint, path: &str) -> TypeCandidate {
        let mut values: Vec<EnumValue> = Vec::with_capacity(node.enum_values.len());
        let mut names = HashSet::new();
        for raw in &node.enum_values {
            let Some(literal) = EnumLiteral::from_json(raw) else {
                self.diagnostics.warn(
                    path,
                    codes::NON_SCALAR_ENUM_VALUE,
                    format!("enum value {raw} is not a scalar; skipped"),
                );
                continue;
            };
            if values.iter().any(|v| v.value == literal) {
                continue;
            }
            let stem = enum_member_name(&literal);
            let mut name = stem.clone();
            let mut n = 2;
            while !names.insert(name.clone()) {
                name = format!("{stem}_{n}");
                n += 1;
            }
            values.push(EnumValue { name, value: literal });
        }
        if values.is_empty() {
            return TypeCandidate::primitive(PrimitiveKind::Any);
        }
        TypeCandidate::new(TypeKind::Enum { values }, hint.clone())
            .describe(node.description.clone(), node.deprecated)
    }
}

/// `nullable: true`, a `null` union member, or a bare `type: null`.
fn admits_null(node: &SchemaNode) -> bool {
    node.nullable || node.is_null_type() || node.union_members().any(SchemaNode::is_null_type)
}

fn describe_member(node: &SchemaNode) -> String {
    match (node.reference.as_deref(), node.kind.as_deref()) {
        (Some(address), _) => format!("{address:?}"),
        (None, Some(kind)) => format!("of type {kind:?}"),
        (None, None) => String::from("without a type"),
    }
}

fn enum_member_name(literal: &EnumLiteral) -> String {
    let name = match literal {
        EnumLiteral::String(s) => to_screaming_snake_case(s),
        EnumLiteral::Bool(true) => String::from("TRUE"),
        EnumLiteral::Bool(false) => String::from("FALSE"),
        EnumLiteral::Integer(i) if *i < 0 => format!("NEG_{}", i.unsigned_abs()),
        EnumLiteral::Integer(i) => format!("VALUE_{i}"),
        EnumLiteral::Number(n) => {
            let text = n.0.abs().to_string().replace('.', "_");
            if n.0 < 0.0 { format!("NEG_{text}") } else { format!("VALUE_{text}") }
        }
    };
    if name.is_empty() { String::from("EMPTY") } else { name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::openapi::OpenApiAdapter;
    use crate::adapter::SpecAdapter;
    use crate::ir::{AuthKind, OAuthFlowKind, StatusCode, TypeDefinition};
    use serde_json::{json, Value};

    fn openapi(components: Value, paths: Value) -> Value {
        json!({
            "openapi": "3.0.3",
            "info": {"title": "Pets", "version": "1.0.0"},
            "paths": paths,
            "components": {"schemas": components}
        })
    }

    fn build_value(document: Value) -> BuildOutcome {
        build_with(document, &BuildOptions::default())
    }

    fn build_with(document: Value, options: &BuildOptions) -> BuildOutcome {
        let mut diagnostics = Diagnostics::new();
        let parsed = OpenApiAdapter.parse_value(document, &mut diagnostics).unwrap();
        build(&parsed, options)
    }

    fn schema(outcome: &BuildOutcome) -> &CanonicalSchema {
        assert!(outcome.success, "build failed: {:?}", outcome.errors);
        outcome.schema.as_ref().unwrap()
    }

    fn named<'s>(schema: &'s CanonicalSchema, name: &str) -> &'s TypeDefinition {
        schema.types.iter().find(|t| t.name == name).unwrap_or_else(|| panic!("no type {name}"))
    }

    fn codes_of(outcome: &BuildOutcome) -> Vec<&str> {
        outcome.warnings.iter().map(|w| w.code.as_str()).collect()
    }

    fn assert_closed(schema: &CanonicalSchema) {
        let mut edges: Vec<TypeReference> = schema.types.iter().flat_map(|t| t.kind.references()).collect();
        for endpoint in &schema.endpoints {
            edges.extend(endpoint.parameters.iter().map(|p| p.ty));
            edges.extend(endpoint.request_body.iter().map(|b| b.ty));
            edges.extend(endpoint.responses.iter().filter_map(|r| r.ty));
        }
        edges.extend(schema.errors.iter().filter_map(|e| e.ty));
        for edge in edges {
            assert!(schema.type_by_id(edge.type_id).is_some(), "dangling {}", edge.type_id);
        }
    }

    #[test]
    fn inline_object_yields_three_entries() {
        let outcome = build_value(openapi(
            json!({"Item": {
                "type": "object",
                "required": ["id"],
                "properties": {
                    "id": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                }
            }}),
            json!({}),
        ));
        let schema = schema(&outcome);
        assert_eq!(schema.types.len(), 3);
        let TypeKind::Object { properties, required_names, .. } = &named(schema, "Item").kind else {
            panic!("Item is not an object");
        };
        assert_eq!(required_names, &vec![String::from("id")]);
        assert!(properties[0].required);
        assert!(!properties[1].required);
        let tags = schema.type_by_id(properties[1].ty.type_id).unwrap();
        assert_eq!(tags.name, "Tags");
        let TypeKind::Array { items, .. } = tags.kind else { panic!("tags is not an array") };
        assert_eq!(items, properties[0].ty);
    }

    #[test]
    fn all_of_merges_properties_and_required_names() {
        let outcome = build_value(openapi(
            json!({"Merged": {"allOf": [
                {"type": "object", "required": ["id"], "properties": {"id": {"type": "string"}}},
                {"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}}
            ]}}),
            json!({}),
        ));
        let schema = schema(&outcome);
        let TypeKind::Object { properties, required_names, .. } = &named(schema, "Merged").kind else {
            panic!("allOf did not produce an object");
        };
        let names: Vec<_> = properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(required_names, &vec![String::from("id"), String::from("name")]);
    }

    #[test]
    fn all_of_precedence_is_configurable() {
        let doc = openapi(
            json!({"Merged": {"allOf": [
                {"properties": {"id": {"type": "string"}}},
                {"properties": {"id": {"type": "integer"}}}
            ]}}),
            json!({}),
        );
        let id_kind = |outcome: &BuildOutcome| {
            let schema = schema(outcome);
            let TypeKind::Object { properties, .. } = &named(schema, "Merged").kind else { panic!() };
            schema.type_by_id(properties[0].ty.type_id).unwrap().kind.clone()
        };
        let last = build_with(doc.clone(), &BuildOptions::default());
        assert_eq!(id_kind(&last), TypeKind::Primitive { primitive: PrimitiveKind::Integer });
        let first = build_with(doc, &BuildOptions { all_of_precedence: MergePrecedence::FirstWins });
        assert_eq!(id_kind(&first), TypeKind::Primitive { primitive: PrimitiveKind::String });
    }

    #[test]
    fn all_of_around_a_value_type_keeps_the_reference() {
        let outcome = build_value(openapi(
            json!({
                "Status": {"type": "string", "enum": ["on", "off"]},
                "Mood": {"allOf": [{"$ref": "#/components/schemas/Status"}]},
                "Base": {"type": "object", "properties": {"id": {"type": "string"}}},
                "Device": {"type": "object", "properties": {
                    "status": {"allOf": [{"$ref": "#/components/schemas/Status"}], "description": "current"},
                    "previous": {"allOf": [{"$ref": "#/components/schemas/Status"}], "nullable": true},
                    "mood": {"$ref": "#/components/schemas/Mood"},
                    "mixed": {"allOf": [{"$ref": "#/components/schemas/Base"}, {"type": "string"}]}
                }}
            }),
            json!({}),
        ));
        let schema = schema(&outcome);
        let status = named(schema, "Status").id;
        let TypeKind::Object { properties, .. } = &named(schema, "Device").kind else { panic!() };
        assert_eq!(properties[0].ty, TypeReference::new(status));
        assert_eq!(properties[1].ty, TypeReference::new(status).with_nullable(true));
        assert_eq!(properties[2].ty.type_id, status);
        assert!(schema.types.iter().all(|t| t.name != "DeviceStatus" && t.name != "Mood"));

        let mixed = schema.type_by_id(properties[3].ty.type_id).unwrap();
        let TypeKind::Object { properties: mixed, .. } = &mixed.kind else { panic!("mixed is not an object") };
        assert_eq!(mixed[0].name, "id");
        assert_eq!(codes_of(&outcome), vec![codes::IGNORED_ALL_OF_MEMBER]);
        assert_closed(schema);
    }

    #[test]
    fn same_ref_yields_same_id_and_schema_is_closed() {
        let outcome = build_value(openapi(
            json!({"Pet": {"type": "object", "properties": {"name": {"type": "string"}}}}),
            json!({"/pets": {
                "get": {"operationId": "listPets", "responses": {"200": {"description": "ok",
                    "content": {"application/json": {"schema": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}}}}}},
                "post": {"operationId": "createPet",
                    "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}},
                    "responses": {"201": {"description": "created",
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}}}}
            }}),
        ));
        let schema = schema(&outcome);
        let pet = named(schema, "Pet").id;
        let create = &schema.endpoints[1];
        assert_eq!(create.request_body.as_ref().unwrap().ty.type_id, pet);
        assert_eq!(create.responses[0].ty.unwrap().type_id, pet);
        let list = schema.type_by_id(schema.endpoints[0].responses[0].ty.unwrap().type_id).unwrap();
        assert_eq!(list.name, "ListPetsResponse");
        assert_closed(schema);
    }

    #[test]
    fn built_schema_round_trips_through_json() {
        let outcome = build_value(openapi(
            json!({
                "Status": {"type": "string", "enum": ["active", "in-progress"]},
                "Shape": {"oneOf": [
                    {"type": "object", "title": "Circle", "properties": {"r": {"type": "number"}}},
                    {"type": "object", "title": "Square", "properties": {"side": {"type": "number"}}}
                ], "discriminator": {"propertyName": "kind"}}
            }),
            json!({"/shapes/{id}": {"get": {
                "parameters": [{"name": "id", "in": "path", "schema": {"type": "string", "format": "uuid"}}],
                "responses": {"default": {"description": "err"}}
            }}}),
        ));
        let schema = schema(&outcome);
        let text = schema.to_json_pretty().unwrap();
        assert_eq!(&CanonicalSchema::from_json(&text).unwrap(), schema);

        let TypeKind::Enum { values } = &named(schema, "Status").kind else { panic!() };
        assert_eq!(values[1].name, "IN_PROGRESS");
        let TypeKind::Union { variants, discriminator } = &named(schema, "Shape").kind else { panic!() };
        assert_eq!(variants.len(), 2);
        assert_eq!(discriminator.as_deref(), Some("kind"));
        assert_eq!(named(schema, "Circle").id, variants[0].type_id);
        assert_eq!(schema.endpoints[0].operation_id, "getShapesById");
        assert_eq!(schema.endpoints[0].responses[0].status_code, StatusCode::Default);
    }

    #[test]
    fn recursive_schemas_point_back_at_themselves() {
        let outcome = build_value(openapi(
            json!({"Node": {"type": "object", "properties": {
                "value": {"type": "integer"},
                "children": {"type": "array", "items": {"$ref": "#/components/schemas/Node"}},
                "parent": {"$ref": "#/components/schemas/Node", "nullable": true}
            }}}),
            json!({}),
        ));
        let schema = schema(&outcome);
        let node = named(schema, "Node");
        let TypeKind::Object { properties, .. } = &node.kind else { panic!() };
        let children = schema.type_by_id(properties[1].ty.type_id).unwrap();
        assert_eq!(children.kind.references()[0].type_id, node.id);
        assert_eq!(properties[2].ty.type_id, node.id);
        assert!(properties[2].ty.nullable);
        assert_closed(schema);
    }

    #[test]
    fn structural_violations_abort() {
        let cases = [
            json!({"A": {"$ref": "#/components/schemas/B"}, "B": {"$ref": "#/components/schemas/A"}}),
            json!({"Broken": {"type": "array"}}),
            json!({"Empty": {"oneOf": []}}),
            json!({"Dangling": {"type": "object", "properties": {"x": {"$ref": "#/components/schemas/Nope"}}}}),
        ];
        for components in cases {
            let outcome = build_value(openapi(components.clone(), json!({})));
            assert!(!outcome.success, "{components} should fail");
            assert!(outcome.schema.is_none());
            assert_eq!(outcome.errors[0].code, "structural_error", "{components}");
        }
    }

    #[test]
    fn aliases_share_structural_entries() {
        let outcome = build_value(openapi(
            json!({
                "UserId": {"type": "string"},
                "MaybeId": {"$ref": "#/components/schemas/UserId", "nullable": true},
                "User": {"type": "object", "properties": {
                    "id": {"$ref": "#/components/schemas/UserId"},
                    "manager": {"$ref": "#/components/schemas/MaybeId"},
                    "note": {"anyOf": [{"type": "string"}, {"type": "null"}]}
                }}
            }),
            json!({}),
        ));
        let schema = schema(&outcome);
        let TypeKind::Object { properties, .. } = &named(schema, "User").kind else { panic!() };
        let string = named(schema, "string").id;
        assert!(properties.iter().all(|p| p.ty.type_id == string));
        assert!(!properties[0].ty.nullable);
        assert!(properties[1].ty.nullable);
        assert!(properties[2].ty.nullable);
        assert_eq!(schema.types.len(), 2);
    }

    #[test]
    fn colliding_inline_names_are_qualified() {
        let address = |extra: &str| {
            json!({"type": "object", "properties": {"street": {"type": "string"}, extra: {"type": "string"}}})
        };
        let outcome = build_value(openapi(
            json!({
                "User": {"type": "object", "properties": {"address": address("zip")}},
                "Company": {"type": "object", "properties": {"address": address("country")}}
            }),
            json!({}),
        ));
        let schema = schema(&outcome);
        named(schema, "Address");
        named(schema, "CompanyAddress");
    }

    #[test]
    fn recoverable_inputs_warn_and_substitute() {
        let outcome = build_value(json!({
            "openapi": "3.0.3",
            "info": {"title": "T", "version": "1"},
            "security": [{"token": []}, {"ghost": []}],
            "paths": {
                "/a": {"post": {
                    "operationId": "same",
                    "requestBody": {"content": {"application/json": {}}},
                    "responses": {"2XX": {"description": "ok", "content": {"application/json": {"schema": {"type": "widget"}}}}}
                }},
                "/b": {"get": {"operationId": "same", "responses": {"teapot": {"description": "?"}}}}
            },
            "components": {"securitySchemes": {
                "token": {"type": "http", "scheme": "bearer"},
                "mtls": {"type": "mutualTLS"},
                "oauth": {"type": "oauth2", "flows": {"deviceCode": {"tokenUrl": "https://t", "scopes": {}}}}
            }}
        }));
        let schema = schema(&outcome);
        let codes = codes_of(&outcome);
        for expected in [
            codes::UNSUPPORTED_AUTH,
            codes::UNKNOWN_OAUTH_FLOW,
            codes::UNKNOWN_SECURITY_REFERENCE,
            codes::MISSING_BODY_SCHEMA,
            codes::STATUS_RANGE,
            codes::UNKNOWN_PRIMITIVE,
            codes::DUPLICATE_OPERATION_ID,
            codes::INVALID_STATUS,
        ] {
            assert!(codes.contains(&expected), "missing {expected} in {codes:?}");
        }

        assert_eq!(schema.authentication.len(), 2);
        let AuthKind::OAuth2 { flows } = &schema.authentication[1].kind else { panic!() };
        assert_eq!(flows[0].kind, OAuthFlowKind::AuthorizationCode);

        let a = &schema.endpoints[0];
        assert!(a.request_body.is_none());
        assert_eq!(a.responses[0].status_code, StatusCode::Code(200));
        let any = schema.type_by_id(a.responses[0].ty.unwrap().type_id).unwrap();
        assert_eq!(any.kind, TypeKind::Primitive { primitive: PrimitiveKind::Any });
        assert_eq!(a.authentication, vec!["token"]);

        assert_eq!(schema.endpoints[1].operation_id, "same2");
        assert!(schema.endpoints[1].responses.is_empty());
    }

    #[test]
    fn content_negotiation_prefers_json() {
        let outcome = build_value(openapi(
            json!({}),
            json!({"/upload": {"put": {
                "operationId": "upload",
                "requestBody": {"required": true, "content": {
                    "text/plain": {"schema": {"type": "string"}},
                    "application/vnd.acme+json": {"schema": {"type": "object", "properties": {"a": {"type": "integer"}}}}
                }},
                "responses": {"204": {"description": "done"}, "404": {"description": "missing",
                    "content": {"application/problem+json": {"schema": {"type": "object", "properties": {"detail": {"type": "string"}}}}}}}
            }}}),
        ));
        let schema = schema(&outcome);
        let endpoint = &schema.endpoints[0];
        let body = endpoint.request_body.as_ref().unwrap();
        assert_eq!(body.content_type, "application/vnd.acme+json");
        assert!(body.required);
        assert!(endpoint.responses[0].ty.is_none());

        assert_eq!(schema.errors.len(), 1);
        assert_eq!(schema.errors[0].status_code, StatusCode::Code(404));
        assert_eq!(schema.errors[0].name, "NotFoundError");
    }

    #[test]
    fn builds_are_independent() {
        let doc = openapi(json!({"Pet": {"type": "object", "properties": {"id": {"type": "integer"}}}}), json!({}));
        let first = build_value(doc.clone());
        let second = build_value(doc);
        assert_eq!(first, second);
    }

    #[test]
    fn custom_documents_build_end_to_end() {
        let source = r#"{
            "name": "Acme", "version": "2.0", "baseUrl": "https://api.acme.dev",
            "auth": {"token": {"type": "bearer"}},
            "security": ["token"],
            "types": {"Role": {"enum": ["admin", "member"]}},
            "models": {"User": {"fields": {"id": "uuid", "role": "Role", "tags": "string[]?", "meta": "widget"}}},
            "endpoints": [{"name": "getUser", "method": "GET", "path": "/users/{id}", "response": "User",
                           "errors": {"404": "User"}}],
            "errors": {"500": "string"}
        }"#;
        let outcome = build_from_str(source, None, &BuildOptions::default());
        let schema = schema(&outcome);
        assert_eq!(schema.metadata.source_format, SourceFormat::Custom);
        assert_eq!(schema.endpoints[0].authentication, vec!["token"]);
        assert_eq!(schema.errors.len(), 2);
        assert!(codes_of(&outcome).contains(&codes::UNKNOWN_PRIMITIVE));
        assert_closed(schema);

        let broken = build_from_str(
            r#"{"name": "A", "version": "1", "models": {"X": {"fields": {"y": "Missing"}}}}"#,
            None,
            &BuildOptions::default(),
        );
        assert!(!broken.success);
        assert_eq!(broken.errors[0].code, "structural_error");
    }

    #[test]
    fn decoded_values_build_or_report() {
        let outcome = build_from_value(openapi(json!({"Id": {"type": "string"}}), json!({})), None, &BuildOptions::default());
        assert!(outcome.success);

        let unknown = build_from_value(json!({"swagger": "2.0"}), None, &BuildOptions::default());
        assert!(!unknown.success);
        assert!(unknown.schema.is_none());
        assert_eq!(unknown.errors[0].code, "parse_error");
    }
}
