//! OpenAPI 3.x front end.
//!
//! Deserializes the subset of OpenAPI 3.0/3.1 the canonical model needs and
//! normalizes it into a [`SourceDocument`]. Schema `$ref`s stay unresolved;
//! parameter, request-body and response `$ref`s are inlined here since they
//! are not type nodes.

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    ContentMap, DocumentInfo, NamedSchema, OAuthFlowNode, OperationNode, ParameterNode,
    RequestBodyNode, ResponseNode, SchemaNode, SecuritySchemeEntry, SecuritySchemeNode,
    SourceDocument, SpecAdapter,
};
use crate::error::{CanonError, Diagnostics, Result};
use crate::ir::{HttpMethod, ParameterLocation, SourceFormat};

pub const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

const STREAMING_MEDIA_TYPES: &[&str] = &["text/event-stream", "application/x-ndjson"];

// ————————————————————————————————————————————————————————————————————————————
// RAW DOCUMENT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Deserialize)]
struct RawDocument {
    openapi: String,
    info: RawInfo,
    #[serde(default)]
    servers: Vec<RawServer>,
    #[serde(default)]
    paths: IndexMap<String, RawPathItem>,
    #[serde(default)]
    components: RawComponents,
    #[serde(default)]
    security: Vec<IndexMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    title: String,
    version: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComponents {
    #[serde(default)]
    schemas: IndexMap<String, RawSchema>,
    #[serde(default)]
    parameters: IndexMap<String, RawParameter>,
    #[serde(default)]
    request_bodies: IndexMap<String, RawRequestBody>,
    #[serde(default)]
    responses: IndexMap<String, RawResponse>,
    #[serde(default)]
    security_schemes: IndexMap<String, RawSecurityScheme>,
}

/// Either an inline object or a `$ref` to `components`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefOr<T> {
    Ref {
        #[serde(rename = "$ref")]
        reference: String,
    },
    Item(T),
}

#[derive(Debug, Default, Deserialize)]
struct RawPathItem {
    #[serde(default)]
    parameters: Vec<RefOr<RawParameter>>,
    get: Option<RawOperation>,
    put: Option<RawOperation>,
    post: Option<RawOperation>,
    delete: Option<RawOperation>,
    options: Option<RawOperation>,
    head: Option<RawOperation>,
    patch: Option<RawOperation>,
    trace: Option<RawOperation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    operation_id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    parameters: Vec<RefOr<RawParameter>>,
    request_body: Option<RefOr<RawRequestBody>>,
    #[serde(default)]
    responses: IndexMap<String, RefOr<RawResponse>>,
    security: Option<Vec<IndexMap<String, Vec<String>>>>,
    #[serde(default)]
    deprecated: bool,
    #[serde(rename = "x-streaming", default)]
    streaming: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "in")]
    location: String,
    #[serde(default)]
    required: bool,
    schema: Option<RawSchema>,
    description: Option<String>,
    #[serde(default)]
    deprecated: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRequestBody {
    #[serde(default)]
    required: bool,
    description: Option<String>,
    #[serde(default)]
    content: IndexMap<String, RawMediaType>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawResponse {
    description: Option<String>,
    #[serde(default)]
    content: IndexMap<String, RawMediaType>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMediaType {
    schema: Option<RawSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawType {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawAdditional {
    Bool(bool),
    Schema(Box<RawSchema>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiscriminator {
    property_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    #[serde(rename = "$ref")]
    reference: Option<String>,
    #[serde(rename = "type")]
    schema_type: Option<RawType>,
    format: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    deprecated: bool,
    nullable: Option<bool>,
    default: Option<Value>,
    #[serde(default)]
    properties: IndexMap<String, RawSchema>,
    #[serde(default)]
    required: Vec<String>,
    additional_properties: Option<RawAdditional>,
    items: Option<Box<RawSchema>>,
    min_items: Option<u64>,
    max_items: Option<u64>,
    #[serde(default)]
    unique_items: bool,
    #[serde(default)]
    all_of: Vec<RawSchema>,
    one_of: Option<Vec<RawSchema>>,
    any_of: Option<Vec<RawSchema>>,
    discriminator: Option<RawDiscriminator>,
    #[serde(rename = "enum", default)]
    enum_values: Vec<Value>,
    #[serde(rename = "const")]
    const_value: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSecurityScheme {
    #[serde(rename = "type")]
    scheme_type: String,
    description: Option<String>,
    name: Option<String>,
    #[serde(rename = "in")]
    location: Option<String>,
    scheme: Option<String>,
    bearer_format: Option<String>,
    #[serde(default)]
    flows: IndexMap<String, RawOAuthFlow>,
    open_id_connect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOAuthFlow {
    authorization_url: Option<String>,
    token_url: Option<String>,
    refresh_url: Option<String>,
    #[serde(default)]
    scopes: IndexMap<String, String>,
}

// ————————————————————————————————————————————————————————————————————————————
// NORMALIZATION
// ————————————————————————————————————————————————————————————————————————————

fn schema_node(raw: RawSchema) -> SchemaNode {
    let mut node = SchemaNode {
        reference: raw.reference,
        format: raw.format,
        nullable: raw.nullable.unwrap_or(false),
        title: raw.title,
        description: raw.description,
        deprecated: raw.deprecated,
        default: raw.default,
        properties: raw.properties.into_iter().map(|(k, v)| (k, schema_node(v))).collect(),
        required: raw.required,
        items: raw.items.map(|i| Box::new(schema_node(*i))),
        min_items: raw.min_items,
        max_items: raw.max_items,
        unique_items: raw.unique_items,
        all_of: raw.all_of.into_iter().map(schema_node).collect(),
        one_of: raw.one_of.map(|members| members.into_iter().map(schema_node).collect()),
        any_of: raw.any_of.map(|members| members.into_iter().map(schema_node).collect()),
        discriminator: raw.discriminator.map(|d| d.property_name),
        enum_values: raw.enum_values,
        ..SchemaNode::default()
    };

    node.additional_properties = match raw.additional_properties {
        Some(RawAdditional::Schema(schema)) => Some(Box::new(schema_node(*schema))),
        // `additionalProperties: true` → map of anything.
        Some(RawAdditional::Bool(true)) => Some(Box::new(SchemaNode::default())),
        Some(RawAdditional::Bool(false)) | None => None,
    };

    if let Some(value) = raw.const_value
        && node.enum_values.is_empty()
    {
        node.enum_values = vec![value];
    }

    // 3.1 type arrays: ["string", "null"] → nullable string; several
    // non-null kinds → a union of primitives.
    match raw.schema_type {
        Some(RawType::Single(kind)) => node.kind = Some(kind),
        Some(RawType::Multiple(kinds)) => {
            let mut non_null: Vec<String> = Vec::new();
            for kind in kinds {
                if kind == "null" {
                    node.nullable = true;
                } else {
                    non_null.push(kind);
                }
            }
            match non_null.len() {
                0 => node.kind = Some(String::from("null")),
                1 => node.kind = non_null.pop(),
                _ => {
                    node.one_of = Some(non_null.iter().map(|k| SchemaNode::typed(k)).collect());
                }
            }
        }
        None => {}
    }

    node.fold_null_literals();
    node
}

fn schema_address(name: &str) -> String {
    format!("{SCHEMA_REF_PREFIX}{name}")
}

fn resolve_component<'a, T>(
    item: &'a RefOr<T>,
    prefix: &str,
    table: &'a IndexMap<String, T>,
) -> Result<&'a T> {
    match item {
        RefOr::Item(inner) => Ok(inner),
        RefOr::Ref { reference } => reference
            .strip_prefix(prefix)
            .and_then(|name| table.get(name))
            .ok_or_else(|| CanonError::parse("openapi", format!("unresolvable $ref {reference:?}"))),
    }
}

fn content_map(content: &IndexMap<String, RawMediaType>) -> ContentMap {
    content
        .iter()
        .map(|(media, m)| (media.clone(), m.schema.clone().map(schema_node)))
        .collect()
}

fn parameter_node(raw: &RawParameter) -> Result<ParameterNode> {
    let location = ParameterLocation::parse(&raw.location).ok_or_else(|| {
        CanonError::parse(
            "openapi",
            format!("parameter {:?} has invalid location {:?}", raw.name, raw.location),
        )
    })?;
    Ok(ParameterNode {
        name: raw.name.clone(),
        location,
        // Path parameters are always required.
        required: raw.required || location == ParameterLocation::Path,
        schema: raw.schema.clone().map(schema_node),
        description: raw.description.clone(),
        deprecated: raw.deprecated,
    })
}

fn requirement_names(requirements: &[IndexMap<String, Vec<String>>]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for requirement in requirements {
        for name in requirement.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

fn security_scheme(id: &str, raw: RawSecurityScheme) -> SecuritySchemeEntry {
    let scheme = match raw.scheme_type.as_str() {
        "apiKey" => {
            let location = raw.location.as_deref().and_then(ParameterLocation::parse);
            match (raw.name, location) {
                (Some(name), Some(location)) if location != ParameterLocation::Path => {
                    SecuritySchemeNode::ApiKey { name, location }
                }
                _ => SecuritySchemeNode::Unsupported {
                    declared: raw.scheme_type.clone(),
                    reason: String::from("apiKey needs `name` and a header/query/cookie `in`"),
                },
            }
        }
        "http" => SecuritySchemeNode::Http {
            scheme: raw.scheme.unwrap_or_else(|| String::from("bearer")).to_ascii_lowercase(),
            bearer_format: raw.bearer_format,
        },
        "oauth2" => SecuritySchemeNode::OAuth2 {
            flows: raw
                .flows
                .into_iter()
                .map(|(name, flow)| OAuthFlowNode {
                    name,
                    authorization_url: flow.authorization_url,
                    token_url: flow.token_url,
                    refresh_url: flow.refresh_url,
                    scopes: flow.scopes,
                })
                .collect(),
        },
        "openIdConnect" => match raw.open_id_connect_url {
            Some(url) => SecuritySchemeNode::OpenIdConnect { url },
            None => SecuritySchemeNode::Unsupported {
                declared: raw.scheme_type.clone(),
                reason: String::from("missing `openIdConnectUrl`"),
            },
        },
        other => SecuritySchemeNode::Unsupported {
            declared: other.to_string(),
            reason: String::from("scheme type has no canonical equivalent"),
        },
    };
    SecuritySchemeEntry { id: id.to_string(), description: raw.description, scheme }
}

fn is_streaming(flagged: bool, responses: &[ResponseNode]) -> bool {
    flagged
        || responses.iter().any(|response| {
            response.content.keys().any(|m| {
                let media = m.split(';').next().unwrap_or(m).trim();
                STREAMING_MEDIA_TYPES.contains(&media)
            })
        })
}

fn deserialize<T: DeserializeOwned>(value: Value) -> Result<T> {
    crate::path_de::from_value_with_path(value).map_err(|message| CanonError::parse("openapi", message))
}

// ————————————————————————————————————————————————————————————————————————————
// ADAPTER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenApiAdapter;

impl SpecAdapter for OpenApiAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::OpenApi
    }

    fn parse_value(&self, document: Value, _diagnostics: &mut Diagnostics) -> Result<SourceDocument> {
        let raw: RawDocument = deserialize(document)?;
        if !raw.openapi.starts_with("3.") {
            return Err(CanonError::parse(
                "openapi",
                format!("unsupported OpenAPI version {:?}, expected 3.x", raw.openapi),
            ));
        }

        let RawDocument { openapi, info, servers, paths, components, security } = raw;
        let RawComponents { schemas, parameters, request_bodies, responses, security_schemes } =
            components;

        let schemas = schemas
            .into_iter()
            .map(|(name, schema)| {
                (schema_address(&name), NamedSchema { name, node: schema_node(schema) })
            })
            .collect();

        let mut operations = Vec::new();
        for (path, item) in &paths {
            let shared: Vec<&RawParameter> = item
                .parameters
                .iter()
                .map(|p| resolve_component(p, "#/components/parameters/", &parameters))
                .collect::<Result<_>>()?;

            let methods = [
                (HttpMethod::Get, &item.get),
                (HttpMethod::Put, &item.put),
                (HttpMethod::Post, &item.post),
                (HttpMethod::Delete, &item.delete),
                (HttpMethod::Options, &item.options),
                (HttpMethod::Head, &item.head),
                (HttpMethod::Patch, &item.patch),
                (HttpMethod::Trace, &item.trace),
            ];
            for (method, operation) in methods {
                let Some(operation) = operation else { continue };

                // Operation-level parameters override path-level ones on (name, in).
                let own: Vec<&RawParameter> = operation
                    .parameters
                    .iter()
                    .map(|p| resolve_component(p, "#/components/parameters/", &parameters))
                    .collect::<Result<_>>()?;
                let mut merged: Vec<ParameterNode> = Vec::new();
                for raw in shared.iter().filter(|s| {
                    !own.iter().any(|o| o.name == s.name && o.location == s.location)
                }) {
                    merged.push(parameter_node(raw)?);
                }
                for raw in &own {
                    merged.push(parameter_node(raw)?);
                }

                let request_body = match &operation.request_body {
                    Some(body) => {
                        let body = resolve_component(body, "#/components/requestBodies/", &request_bodies)?;
                        Some(RequestBodyNode {
                            required: body.required,
                            description: body.description.clone(),
                            content: content_map(&body.content),
                        })
                    }
                    None => None,
                };

                let mut response_nodes = Vec::new();
                for (status, response) in &operation.responses {
                    let response = resolve_component(response, "#/components/responses/", &responses)?;
                    response_nodes.push(ResponseNode {
                        status: status.clone(),
                        description: response.description.clone(),
                        content: content_map(&response.content),
                    });
                }

                let streaming = is_streaming(operation.streaming, &response_nodes);
                operations.push(OperationNode {
                    operation_id: operation.operation_id.clone(),
                    method,
                    path: path.clone(),
                    summary: operation.summary.clone(),
                    description: operation.description.clone(),
                    tags: operation.tags.clone(),
                    parameters: merged,
                    request_body,
                    responses: response_nodes,
                    security: operation.security.as_deref().map(requirement_names),
                    streaming,
                    deprecated: operation.deprecated,
                });
            }
        }

        let security_schemes = security_schemes
            .into_iter()
            .map(|(id, raw)| security_scheme(&id, raw))
            .collect();

        Ok(SourceDocument {
            format: SourceFormat::OpenApi,
            info: DocumentInfo {
                title: info.title,
                version: info.version,
                description: info.description,
                base_url: servers.into_iter().next().map(|s| s.url),
                source_version: Some(openapi),
            },
            schemas,
            operations,
            security_schemes,
            default_security: requirement_names(&security),
            errors: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(doc: Value) -> (SourceDocument, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let parsed = OpenApiAdapter.parse_value(doc, &mut diagnostics).unwrap();
        (parsed, diagnostics)
    }

    #[test]
    fn type_arrays_and_nullable_flags() {
        let (doc, _) = parse(json!({
            "openapi": "3.1.0",
            "info": {"title": "T", "version": "1"},
            "components": {"schemas": {
                "A": {"type": ["string", "null"]},
                "B": {"type": "integer", "nullable": true},
                "C": {"type": ["string", "integer"]},
                "D": {"enum": ["x", null]}
            }}
        }));
        let node = |n: &str| &doc.lookup(&schema_address(n)).unwrap().node;
        assert_eq!(node("A").kind.as_deref(), Some("string"));
        assert!(node("A").nullable);
        assert!(node("B").nullable);
        assert_eq!(node("C").one_of.as_ref().map(Vec::len), Some(2));
        assert!(node("D").nullable);
        assert_eq!(node("D").enum_values, vec![json!("x")]);
    }

    #[test]
    fn operation_parameters_override_path_parameters() {
        let (doc, _) = parse(json!({
            "openapi": "3.0.3",
            "info": {"title": "T", "version": "1"},
            "paths": {"/items/{id}": {
                "parameters": [
                    {"name": "id", "in": "path", "schema": {"type": "string"}},
                    {"$ref": "#/components/parameters/Limit"}
                ],
                "get": {
                    "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}],
                    "responses": {"200": {"$ref": "#/components/responses/Ok"}}
                }
            }},
            "components": {
                "parameters": {"Limit": {"name": "limit", "in": "query", "schema": {"type": "integer"}}},
                "responses": {"Ok": {"description": "ok", "content": {"text/event-stream": {"schema": {"type": "string"}}}}}
            }
        }));
        let op = &doc.operations[0];
        assert_eq!(op.parameters.len(), 2);
        assert_eq!(op.parameters[0].name, "limit");
        assert_eq!(op.parameters[1].schema.as_ref().unwrap().kind.as_deref(), Some("integer"));
        assert!(op.streaming);
    }

    #[test]
    fn streaming_follows_referenced_responses() {
        let (doc, _) = parse(json!({
            "openapi": "3.0.3",
            "info": {"title": "T", "version": "1"},
            "paths": {
                "/feed": {"get": {"operationId": "feed",
                    "responses": {"200": {"$ref": "#/components/responses/Lines"}}}},
                "/plain": {"get": {"operationId": "plain",
                    "responses": {"200": {"$ref": "#/components/responses/Json"}}}}
            },
            "components": {"responses": {
                "Lines": {"description": "lines", "content": {"application/x-ndjson; charset=utf-8": {}}},
                "Json": {"description": "json", "content": {"application/json": {"schema": {"type": "string"}}}}
            }}
        }));
        let streaming = |id: &str| {
            doc.operations.iter().find(|o| o.operation_id.as_deref() == Some(id)).unwrap().streaming
        };
        assert!(streaming("feed"));
        assert!(!streaming("plain"));
    }

    #[test]
    fn rejects_swagger_and_bad_refs() {
        let mut diagnostics = Diagnostics::new();
        let err = OpenApiAdapter
            .parse_value(json!({"openapi": "2.0", "info": {"title": "T", "version": "1"}}), &mut diagnostics)
            .unwrap_err();
        assert!(matches!(err, CanonError::Parse { .. }));

        let err = OpenApiAdapter
            .parse_value(
                json!({
                    "openapi": "3.0.0",
                    "info": {"title": "T", "version": "1"},
                    "paths": {"/a": {"get": {"parameters": [{"$ref": "#/components/parameters/Nope"}], "responses": {}}}}
                }),
                &mut diagnostics,
            )
            .unwrap_err();
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn unknown_security_scheme_types_are_marked_unsupported() {
        let (doc, _) = parse(json!({
            "openapi": "3.1.0",
            "info": {"title": "T", "version": "1"},
            "components": {"securitySchemes": {
                "mtls": {"type": "mutualTLS"},
                "key": {"type": "apiKey", "name": "X-Key", "in": "header"}
            }}
        }));
        assert!(matches!(doc.security_schemes[0].scheme, SecuritySchemeNode::Unsupported { .. }));
        assert!(matches!(doc.security_schemes[1].scheme, SecuritySchemeNode::ApiKey { .. }));
    }
}
