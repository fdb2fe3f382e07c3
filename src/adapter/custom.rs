//! Front end for the flat provider schema format.
//!
//! ```json
//! {
//!   "name": "Acme", "version": "1.0", "baseUrl": "https://api.acme.dev",
//!   "auth": { "token": { "type": "bearer" } },
//!   "types": { "UserId": "string", "Role": { "enum": ["admin", "member"] } },
//!   "models": { "User": { "fields": { "id": "UserId", "tags": "string[]?" } } },
//!   "endpoints": [ { "name": "getUser", "method": "GET", "path": "/users/{id}",
//!                    "response": "User" } ]
//! }
//! ```
//!
//! Type expressions are primitive names, model/type names, `T[]`, `map<T>`
//! and a trailing `?` for optional-and-nullable.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{
    ContentMap, DocumentInfo, ErrorNode, NamedSchema, OAuthFlowNode, OperationNode,
    ParameterNode, RequestBodyNode, ResponseNode, SchemaNode, SecuritySchemeEntry,
    SecuritySchemeNode, SourceDocument, SpecAdapter,
};
use crate::error::{CanonError, Diagnostics, Result};
use crate::ir::{HttpMethod, ParameterLocation, SourceFormat};

pub const MODEL_REF_PREFIX: &str = "#/models/";
pub const TYPE_REF_PREFIX: &str = "#/types/";

const JSON: &str = "application/json";
const EVENT_STREAM: &str = "text/event-stream";

static PATH_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^}/]+)\}").expect("static path regex"));

/// Maps custom primitive spellings onto the OpenAPI vocabulary the builder
/// understands.
const PRIMITIVES: &[(&str, &str, Option<&str>)] = &[
    ("string", "string", None),
    ("str", "string", None),
    ("integer", "integer", None),
    ("int", "integer", None),
    ("number", "number", None),
    ("float", "number", None),
    ("double", "number", None),
    ("boolean", "boolean", None),
    ("bool", "boolean", None),
    ("datetime", "string", Some("date-time")),
    ("date-time", "string", Some("date-time")),
    ("date", "string", Some("date")),
    ("uuid", "string", Some("uuid")),
    ("binary", "string", Some("binary")),
    ("bytes", "string", Some("binary")),
];

// ————————————————————————————————————————————————————————————————————————————
// RAW DOCUMENT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCustomSchema {
    name: String,
    version: String,
    base_url: Option<String>,
    description: Option<String>,
    #[serde(default)]
    auth: IndexMap<String, RawAuth>,
    /// Auth schemes applied to endpoints that do not say otherwise.
    #[serde(default)]
    security: Vec<String>,
    #[serde(default)]
    types: IndexMap<String, RawTypeDef>,
    #[serde(default)]
    models: IndexMap<String, RawModel>,
    #[serde(default)]
    endpoints: Vec<RawEndpoint>,
    #[serde(default)]
    errors: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAuth {
    #[serde(rename = "type")]
    auth_type: String,
    description: Option<String>,
    header: Option<String>,
    query: Option<String>,
    flow: Option<String>,
    authorization_url: Option<String>,
    token_url: Option<String>,
    #[serde(default)]
    scopes: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTypeDef {
    Expr(String),
    Enum {
        #[serde(rename = "enum")]
        values: Vec<Value>,
        description: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    OneOf {
        one_of: Vec<String>,
        discriminator: Option<String>,
        description: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    description: Option<String>,
    #[serde(default)]
    deprecated: bool,
    #[serde(default)]
    extends: Vec<String>,
    #[serde(default)]
    fields: IndexMap<String, RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawField {
    Expr(String),
    Detailed {
        #[serde(rename = "type")]
        expr: String,
        required: Option<bool>,
        #[serde(default)]
        nullable: bool,
        description: Option<String>,
        default: Option<Value>,
        #[serde(default)]
        deprecated: bool,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBody {
    Expr(String),
    Inline(RawModel),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEndpoint {
    name: String,
    method: String,
    path: String,
    summary: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    params: IndexMap<String, RawField>,
    #[serde(default)]
    query: IndexMap<String, RawField>,
    #[serde(default)]
    headers: IndexMap<String, RawField>,
    body: Option<RawBody>,
    content_type: Option<String>,
    response: Option<String>,
    #[serde(default)]
    errors: IndexMap<String, String>,
    #[serde(default)]
    stream: bool,
    auth: Option<Vec<String>>,
    #[serde(default)]
    deprecated: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// TYPE EXPRESSIONS
// ————————————————————————————————————————————————————————————————————————————

struct Names<'a> {
    models: &'a IndexMap<String, RawModel>,
    types: &'a IndexMap<String, RawTypeDef>,
}

impl Names<'_> {
    /// Parses a type expression. The flag reports a trailing `?`.
    fn parse(&self, expr: &str) -> (SchemaNode, bool) {
        let expr = expr.trim();
        if let Some(inner) = expr.strip_suffix('?') {
            let (mut node, _) = self.parse(inner);
            node.nullable = true;
            return (node, true);
        }
        (self.parse_required(expr), false)
    }

    fn parse_required(&self, expr: &str) -> SchemaNode {
        if let Some(inner) = expr.strip_suffix("[]") {
            let (item, _) = self.parse(inner);
            return SchemaNode { items: Some(Box::new(item)), ..SchemaNode::typed("array") };
        }
        if let Some(inner) = expr.strip_prefix("map<").and_then(|e| e.strip_suffix('>')) {
            let (value, _) = self.parse(inner);
            return SchemaNode {
                additional_properties: Some(Box::new(value)),
                ..SchemaNode::typed("object")
            };
        }
        if expr == "any" {
            return SchemaNode::default();
        }
        if let Some((_, kind, format)) = PRIMITIVES.iter().find(|(name, _, _)| *name == expr) {
            return SchemaNode { format: format.map(str::to_string), ..SchemaNode::typed(kind) };
        }
        if self.models.contains_key(expr) {
            return SchemaNode::reference(format!("{MODEL_REF_PREFIX}{expr}"));
        }
        if self.types.contains_key(expr) {
            return SchemaNode::reference(format!("{TYPE_REF_PREFIX}{expr}"));
        }
        if expr.starts_with(|c: char| c.is_ascii_uppercase()) {
            // Left dangling on purpose: the builder reports it as a structural error.
            return SchemaNode::reference(format!("{MODEL_REF_PREFIX}{expr}"));
        }
        // Unknown lowercase spelling; the builder warns and substitutes `any`.
        SchemaNode::typed(expr)
    }

    fn field(&self, raw: &RawField) -> (SchemaNode, bool) {
        match raw {
            RawField::Expr(expr) => {
                let (node, optional) = self.parse(expr);
                (node, !optional)
            }
            RawField::Detailed { expr, required, nullable, description, default, deprecated } => {
                let (mut node, optional) = self.parse(expr);
                node.nullable |= *nullable;
                node.description = description.clone();
                node.default = default.clone();
                node.deprecated = *deprecated;
                (node, required.unwrap_or(!optional))
            }
        }
    }

    fn model(&self, raw: &RawModel) -> SchemaNode {
        let mut node = SchemaNode {
            description: raw.description.clone(),
            deprecated: raw.deprecated,
            ..SchemaNode::typed("object")
        };
        for (name, field) in &raw.fields {
            let (schema, required) = self.field(field);
            if required {
                node.required.push(name.clone());
            }
            node.properties.insert(name.clone(), schema);
        }
        if raw.extends.is_empty() {
            return node;
        }
        let mut all_of: Vec<SchemaNode> = raw.extends.iter().map(|p| self.parse_required(p)).collect();
        let description = node.description.take();
        let deprecated = node.deprecated;
        all_of.push(node);
        SchemaNode { all_of, description, deprecated, ..SchemaNode::default() }
    }

    fn type_def(&self, raw: &RawTypeDef) -> SchemaNode {
        match raw {
            RawTypeDef::Expr(expr) => self.parse(expr).0,
            RawTypeDef::Enum { values, description } => {
                let mut node = SchemaNode {
                    enum_values: values.clone(),
                    description: description.clone(),
                    ..SchemaNode::default()
                };
                node.fold_null_literals();
                node
            }
            RawTypeDef::OneOf { one_of, discriminator, description } => SchemaNode {
                one_of: Some(one_of.iter().map(|v| self.parse(v).0).collect()),
                discriminator: discriminator.clone(),
                description: description.clone(),
                ..SchemaNode::default()
            },
        }
    }

    fn parameters(
        &self,
        fields: &IndexMap<String, RawField>,
        location: ParameterLocation,
    ) -> Vec<ParameterNode> {
        fields
            .iter()
            .map(|(name, field)| {
                let (schema, required) = self.field(field);
                ParameterNode {
                    name: name.clone(),
                    location,
                    required: required || location == ParameterLocation::Path,
                    description: schema.description.clone(),
                    deprecated: schema.deprecated,
                    schema: Some(schema),
                }
            })
            .collect()
    }
}

fn single_content(media: &str, schema: SchemaNode) -> ContentMap {
    let mut content = ContentMap::new();
    content.insert(media.to_string(), Some(schema));
    content
}

fn security_scheme(id: &str, raw: &RawAuth) -> SecuritySchemeEntry {
    let scheme = match raw.auth_type.as_str() {
        "bearer" | "basic" => SecuritySchemeNode::Http { scheme: raw.auth_type.clone(), bearer_format: None },
        "apiKey" => match (&raw.header, &raw.query) {
            (Some(header), _) => SecuritySchemeNode::ApiKey { name: header.clone(), location: ParameterLocation::Header },
            (None, Some(query)) => SecuritySchemeNode::ApiKey { name: query.clone(), location: ParameterLocation::Query },
            (None, None) => SecuritySchemeNode::Unsupported {
                declared: raw.auth_type.clone(),
                reason: String::from("apiKey needs a `header` or `query` name"),
            },
        },
        "oauth2" => SecuritySchemeNode::OAuth2 {
            flows: vec![OAuthFlowNode {
                name: raw.flow.clone().unwrap_or_else(|| String::from("clientCredentials")),
                authorization_url: raw.authorization_url.clone(),
                token_url: raw.token_url.clone(),
                refresh_url: None,
                scopes: raw.scopes.clone(),
            }],
        },
        other => SecuritySchemeNode::Unsupported {
            declared: other.to_string(),
            reason: String::from("expected bearer, basic, apiKey or oauth2"),
        },
    };
    SecuritySchemeEntry { id: id.to_string(), description: raw.description.clone(), scheme }
}

// ————————————————————————————————————————————————————————————————————————————
// ADAPTER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, Default)]
pub struct CustomAdapter;

impl SpecAdapter for CustomAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Custom
    }

    fn parse_value(&self, document: Value, _diagnostics: &mut Diagnostics) -> Result<SourceDocument> {
        let raw: RawCustomSchema = crate::path_de::from_value_with_path(document)
            .map_err(|message| CanonError::parse("custom", message))?;
        let names = Names { models: &raw.models, types: &raw.types };

        let mut schemas = IndexMap::new();
        for (name, def) in &raw.types {
            schemas.insert(
                format!("{TYPE_REF_PREFIX}{name}"),
                NamedSchema { name: name.clone(), node: names.type_def(def) },
            );
        }
        for (name, model) in &raw.models {
            schemas.insert(
                format!("{MODEL_REF_PREFIX}{name}"),
                NamedSchema { name: name.clone(), node: names.model(model) },
            );
        }

        let mut operations = Vec::with_capacity(raw.endpoints.len());
        for endpoint in &raw.endpoints {
            let method = HttpMethod::parse(&endpoint.method).ok_or_else(|| {
                CanonError::parse(
                    "custom",
                    format!("endpoint {:?} has unknown method {:?}", endpoint.name, endpoint.method),
                )
            })?;

            // Path template variables default to strings unless typed in `params`.
            let mut parameters = names.parameters(&endpoint.params, ParameterLocation::Path);
            for capture in PATH_PARAM.captures_iter(&endpoint.path) {
                let name = &capture[1];
                if !parameters.iter().any(|p| p.name == name) {
                    parameters.push(ParameterNode {
                        name: name.to_string(),
                        location: ParameterLocation::Path,
                        required: true,
                        schema: Some(SchemaNode::typed("string")),
                        description: None,
                        deprecated: false,
                    });
                }
            }
            parameters.extend(names.parameters(&endpoint.query, ParameterLocation::Query));
            parameters.extend(names.parameters(&endpoint.headers, ParameterLocation::Header));

            let request_body = endpoint.body.as_ref().map(|body| {
                let schema = match body {
                    RawBody::Expr(expr) => names.parse(expr).0,
                    RawBody::Inline(model) => names.model(model),
                };
                RequestBodyNode {
                    required: true,
                    description: None,
                    content: single_content(endpoint.content_type.as_deref().unwrap_or(JSON), schema),
                }
            });

            let mut responses = Vec::new();
            match &endpoint.response {
                Some(expr) => responses.push(ResponseNode {
                    status: String::from("200"),
                    description: None,
                    content: single_content(
                        if endpoint.stream { EVENT_STREAM } else { JSON },
                        names.parse(expr).0,
                    ),
                }),
                None => responses.push(ResponseNode {
                    status: String::from("204"),
                    description: None,
                    content: ContentMap::new(),
                }),
            }
            for (status, expr) in &endpoint.errors {
                responses.push(ResponseNode {
                    status: status.clone(),
                    description: None,
                    content: single_content(JSON, names.parse(expr).0),
                });
            }

            operations.push(OperationNode {
                operation_id: Some(endpoint.name.clone()),
                method,
                path: endpoint.path.clone(),
                summary: endpoint.summary.clone(),
                description: endpoint.description.clone(),
                tags: endpoint.tags.clone(),
                parameters,
                request_body,
                responses,
                security: endpoint.auth.clone(),
                streaming: endpoint.stream,
                deprecated: endpoint.deprecated,
            });
        }

        let errors = raw
            .errors
            .iter()
            .map(|(status, expr)| ErrorNode {
                status: status.clone(),
                schema: names.parse(expr).0,
                description: None,
            })
            .collect();

        let security_schemes = raw.auth.iter().map(|(id, auth)| security_scheme(id, auth)).collect();

        Ok(SourceDocument {
            format: SourceFormat::Custom,
            info: DocumentInfo {
                title: raw.name.clone(),
                version: raw.version.clone(),
                description: raw.description.clone(),
                base_url: raw.base_url.clone(),
                source_version: None,
            },
            schemas,
            operations,
            security_schemes,
            default_security: raw.security.clone(),
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(doc: Value) -> SourceDocument {
        CustomAdapter.parse_value(doc, &mut Diagnostics::new()).unwrap()
    }

    #[test]
    fn type_expressions() {
        let doc = parse(json!({
            "name": "Acme", "version": "1",
            "models": {"User": {"fields": {
                "id": "uuid",
                "tags": "string[]?",
                "scores": "map<number>",
                "manager": {"type": "User", "nullable": true, "required": false}
            }}}
        }));
        let user = &doc.lookup("#/models/User").unwrap().node;
        assert_eq!(user.required, vec!["id", "scores"]);
        assert_eq!(user.properties["id"].format.as_deref(), Some("uuid"));
        let tags = &user.properties["tags"];
        assert!(tags.nullable);
        assert_eq!(tags.items.as_ref().unwrap().kind.as_deref(), Some("string"));
        assert!(user.properties["scores"].additional_properties.is_some());
        assert_eq!(user.properties["manager"].reference.as_deref(), Some("#/models/User"));
        assert!(user.properties["manager"].nullable);
    }

    #[test]
    fn endpoints_get_path_params_and_responses() {
        let doc = parse(json!({
            "name": "Acme", "version": "1",
            "auth": {"token": {"type": "bearer"}, "weird": {"type": "hmac"}},
            "security": ["token"],
            "models": {"User": {"fields": {"id": "string"}}},
            "endpoints": [
                {"name": "getUser", "method": "get", "path": "/users/{id}", "response": "User",
                 "query": {"expand": "bool?"}, "errors": {"404": "User"}},
                {"name": "streamUsers", "method": "POST", "path": "/users/stream", "response": "User", "stream": true}
            ]
        }));
        let get = &doc.operations[0];
        assert_eq!(get.parameters[0].name, "id");
        assert_eq!(get.parameters[0].location, ParameterLocation::Path);
        assert!(!get.parameters[1].required);
        assert_eq!(get.responses.len(), 2);
        assert!(doc.operations[1].streaming);
        assert!(doc.operations[1].responses[0].content.contains_key(EVENT_STREAM));
        assert_eq!(doc.default_security, vec!["token"]);
        assert!(matches!(doc.security_schemes[1].scheme, SecuritySchemeNode::Unsupported { .. }));
    }

    #[test]
    fn null_enum_members_make_the_type_nullable() {
        let doc = parse(json!({
            "name": "Acme", "version": "1",
            "types": {"Level": {"enum": ["low", null, "high"]}}
        }));
        let level = &doc.lookup("#/types/Level").unwrap().node;
        assert!(level.nullable);
        assert_eq!(level.enum_values, vec![json!("low"), json!("high")]);
    }

    #[test]
    fn extends_becomes_all_of() {
        let doc = parse(json!({
            "name": "Acme", "version": "1",
            "models": {
                "Base": {"fields": {"id": "string"}},
                "Admin": {"extends": ["Base"], "fields": {"level": "int"}}
            }
        }));
        let admin = &doc.lookup("#/models/Admin").unwrap().node;
        assert_eq!(admin.all_of.len(), 2);
        assert_eq!(admin.all_of[0].reference.as_deref(), Some("#/models/Base"));
    }

    #[test]
    fn unknown_method_is_a_parse_error() {
        let err = CustomAdapter
            .parse_value(
                json!({"name": "A", "version": "1", "endpoints": [{"name": "x", "method": "FETCH", "path": "/"}]}),
                &mut Diagnostics::new(),
            )
            .unwrap_err();
        assert!(matches!(err, CanonError::Parse { .. }));
    }
}
