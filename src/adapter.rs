//! Spec adapters: format-specific front ends.
//!
//! Each adapter parses a raw document into a [`SourceDocument`], an
//! adapter-local tree in which `$ref` indirections are still unresolved.
//! The builder is the only consumer; it never looks at raw documents.
pub mod custom;
pub mod openapi;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{CanonError, Diagnostics, Result};
use crate::ir::{HttpMethod, OAuthFlowKind, ParameterLocation, SourceFormat};

// ————————————————————————————————————————————————————————————————————————————
// ADAPTER-LOCAL TREE
// ————————————————————————————————————————————————————————————————————————————

/// One schema node, normalized across input formats but not yet resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaNode {
    /// Unresolved `$ref` address. When set, everything but `nullable` and
    /// `description` is ignored.
    pub reference: Option<String>,
    /// Declared type keyword (`string`, `object`, ...), if any.
    pub kind: Option<String>,
    pub format: Option<String>,
    pub nullable: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub deprecated: bool,
    pub default: Option<Value>,
    pub properties: IndexMap<String, SchemaNode>,
    pub required: Vec<String>,
    pub additional_properties: Option<Box<SchemaNode>>,
    pub items: Option<Box<SchemaNode>>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique_items: bool,
    pub all_of: Vec<SchemaNode>,
    /// `Some(vec![])` is an explicitly empty union, which the builder rejects.
    pub one_of: Option<Vec<SchemaNode>>,
    pub any_of: Option<Vec<SchemaNode>>,
    pub discriminator: Option<String>,
    pub enum_values: Vec<Value>,
}

impl SchemaNode {
    pub fn reference(address: impl Into<String>) -> Self {
        Self { reference: Some(address.into()), ..Self::default() }
    }

    pub fn typed(kind: &str) -> Self {
        Self { kind: Some(kind.to_string()), ..Self::default() }
    }

    pub fn is_union(&self) -> bool {
        self.one_of.is_some() || self.any_of.is_some()
    }

    /// `oneOf` and `anyOf` members together, in declaration order.
    pub fn union_members(&self) -> impl Iterator<Item = &SchemaNode> {
        self.one_of.iter().chain(self.any_of.iter()).flatten()
    }

    /// Moves `null` enum literals into `nullable`.
    pub fn fold_null_literals(&mut self) {
        if self.enum_values.iter().any(Value::is_null) {
            self.nullable = true;
            self.enum_values.retain(|v| !v.is_null());
        }
    }

    pub fn is_null_type(&self) -> bool {
        self.reference.is_none() && self.kind.as_deref() == Some("null")
    }

    /// Whether this node denotes a named, nominal type in generated code
    /// (as opposed to a structural alias of a primitive or array).
    pub fn is_nominal(&self) -> bool {
        if self.reference.is_some() {
            return false;
        }
        !self.properties.is_empty()
            || !self.all_of.is_empty()
            || !self.enum_values.is_empty()
            || self.union_members().filter(|v| !v.is_null_type()).count() > 1
            || self.kind.as_deref() == Some("object")
    }
}

/// A named schema addressable through `$ref`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSchema {
    pub name: String,
    pub node: SchemaNode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub base_url: Option<String>,
    pub source_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterNode {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Option<SchemaNode>,
    pub description: Option<String>,
    pub deprecated: bool,
}

/// Media-type keyed content, in declaration order.
pub type ContentMap = IndexMap<String, Option<SchemaNode>>;

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodyNode {
    pub required: bool,
    pub description: Option<String>,
    pub content: ContentMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseNode {
    /// Raw status key: `"200"`, `"default"`, `"2XX"`.
    pub status: String,
    pub description: Option<String>,
    pub content: ContentMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationNode {
    pub operation_id: Option<String>,
    pub method: HttpMethod,
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<ParameterNode>,
    pub request_body: Option<RequestBodyNode>,
    pub responses: Vec<ResponseNode>,
    /// `None` inherits the document-level requirement.
    pub security: Option<Vec<String>>,
    pub streaming: bool,
    pub deprecated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SecuritySchemeNode {
    ApiKey { name: String, location: ParameterLocation },
    Http { scheme: String, bearer_format: Option<String> },
    OAuth2 { flows: Vec<OAuthFlowNode> },
    OpenIdConnect { url: String },
    /// A scheme the canonical model cannot express.
    Unsupported { declared: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OAuthFlowNode {
    /// Raw flow name as declared in the source.
    pub name: String,
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub refresh_url: Option<String>,
    pub scopes: IndexMap<String, String>,
}

impl OAuthFlowNode {
    pub fn kind(&self) -> Option<OAuthFlowKind> {
        OAuthFlowKind::parse(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecuritySchemeEntry {
    pub id: String,
    pub description: Option<String>,
    pub scheme: SecuritySchemeNode,
}

/// Declared error shapes outside of per-operation responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorNode {
    pub status: String,
    pub schema: SchemaNode,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub format: SourceFormat,
    pub info: DocumentInfo,
    /// Named schemas keyed by their full `$ref` address.
    pub schemas: IndexMap<String, NamedSchema>,
    pub operations: Vec<OperationNode>,
    pub security_schemes: Vec<SecuritySchemeEntry>,
    pub default_security: Vec<String>,
    pub errors: Vec<ErrorNode>,
}

impl SourceDocument {
    pub fn lookup(&self, address: &str) -> Option<&NamedSchema> {
        self.schemas.get(address)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ADAPTER CONTRACT
// ————————————————————————————————————————————————————————————————————————————

pub trait SpecAdapter {
    fn format(&self) -> SourceFormat;

    /// Parses an already-decoded document. Recoverable oddities become
    /// warnings in `diagnostics`; malformed input is a [`CanonError::Parse`].
    fn parse_value(&self, document: Value, diagnostics: &mut Diagnostics) -> Result<SourceDocument>;

    fn parse_str(&self, source: &str, diagnostics: &mut Diagnostics) -> Result<SourceDocument> {
        let value = decode_document(source, &self.format().to_string())?;
        self.parse_value(value, diagnostics)
    }
}

pub fn adapter_for(format: SourceFormat) -> Box<dyn SpecAdapter> {
    match format {
        SourceFormat::OpenApi => Box::new(openapi::OpenApiAdapter),
        SourceFormat::Custom => Box::new(custom::CustomAdapter),
    }
}

/// Guesses the input format from top-level keys.
pub fn detect_format(document: &Value) -> Option<SourceFormat> {
    let object = document.as_object()?;
    if object.contains_key("openapi") {
        Some(SourceFormat::OpenApi)
    } else if object.contains_key("models") || object.contains_key("endpoints") {
        Some(SourceFormat::Custom)
    } else {
        None
    }
}

/// Decodes JSON or YAML text into a JSON value. YAML mapping keys are
/// stringified, so unquoted status codes (`200:`) survive.
pub fn decode_document(source: &str, format: &str) -> Result<Value> {
    let trimmed = source.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(source).map_err(|e| CanonError::parse(format, e));
    }
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(source).map_err(|e| CanonError::parse(format, e))?;
    yaml_to_json(yaml).map_err(|message| CanonError::parse(format, message))
}

fn yaml_to_json(value: serde_yaml::Value) -> std::result::Result<Value, String> {
    use serde_yaml::Value as Y;
    Ok(match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| format!("unrepresentable number {n}"))?
            }
        }
        Y::String(s) => Value::String(s),
        Y::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect::<std::result::Result<_, _>>()?)
        }
        Y::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    Y::String(s) => s,
                    Y::Number(n) => n.to_string(),
                    Y::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported mapping key {other:?}")),
                };
                out.insert(key, yaml_to_json(v)?);
            }
            Value::Object(out)
        }
        Y::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// Parses a document of unknown format.
pub fn parse_document(
    source: &str,
    format: Option<SourceFormat>,
    diagnostics: &mut Diagnostics,
) -> Result<SourceDocument> {
    let value = decode_document(source, "input")?;
    parse_value(value, format, diagnostics)
}

pub fn parse_value(
    value: Value,
    format: Option<SourceFormat>,
    diagnostics: &mut Diagnostics,
) -> Result<SourceDocument> {
    let format = match format.or_else(|| detect_format(&value)) {
        Some(f) => f,
        None => {
            return Err(CanonError::parse(
                "input",
                "cannot detect document format: expected an `openapi` key or `models`/`endpoints`",
            ));
        }
    };
    adapter_for(format).parse_value(value, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_keys_are_stringified() {
        let value = decode_document("responses:\n  200:\n    description: ok\n", "openapi").unwrap();
        assert_eq!(value, json!({"responses": {"200": {"description": "ok"}}}));
    }

    #[test]
    fn format_detection() {
        assert_eq!(detect_format(&json!({"openapi": "3.1.0"})), Some(SourceFormat::OpenApi));
        assert_eq!(detect_format(&json!({"models": {}})), Some(SourceFormat::Custom));
        assert_eq!(detect_format(&json!({"swagger": "2.0"})), None);
        assert!(matches!(
            parse_document("{\"hello\": 1}", None, &mut Diagnostics::new()),
            Err(CanonError::Parse { .. })
        ));
    }

    #[test]
    fn nominal_nodes() {
        assert!(SchemaNode::typed("object").is_nominal());
        assert!(!SchemaNode::typed("string").is_nominal());
        let mut nullable_alias = SchemaNode::default();
        nullable_alias.any_of = Some(vec![SchemaNode::typed("string"), SchemaNode::typed("null")]);
        assert!(!nullable_alias.is_nominal());
    }
}
