// Canonical, language-independent IR. This is the interchange artifact
// between the parse phase and the generate phase; it must survive a JSON
// round-trip unchanged.

use std::fmt;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CanonError, Result};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Opaque registry-issued identifier. Never reused within a parse session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An edge into the registry. Nullability belongs to the edge, not the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    pub type_id: TypeId,
    #[serde(default)]
    pub nullable: bool,
}

impl TypeReference {
    pub fn new(type_id: TypeId) -> Self {
        Self { type_id, nullable: false }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = self.nullable || nullable;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    pub id: TypeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TypeKind {
    Primitive {
        primitive: PrimitiveKind,
    },
    #[serde(rename_all = "camelCase")]
    Object {
        properties: Vec<Property>,
        required_names: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        additional_properties: Option<TypeReference>,
    },
    Array {
        items: TypeReference,
        #[serde(default)]
        constraints: ArrayConstraints,
    },
    Union {
        variants: Vec<TypeReference>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        discriminator: Option<String>,
    },
    Enum {
        values: Vec<EnumValue>,
    },
}

impl TypeKind {
    /// Outgoing edges, in declaration order.
    pub fn references(&self) -> Vec<TypeReference> {
        match self {
            TypeKind::Primitive { .. } | TypeKind::Enum { .. } => Vec::new(),
            TypeKind::Object { properties, additional_properties, .. } => properties
                .iter()
                .map(|p| p.ty)
                .chain(additional_properties.iter().copied())
                .collect(),
            TypeKind::Array { items, .. } => vec![*items],
            TypeKind::Union { variants, .. } => variants.clone(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TypeKind::Primitive { .. } => "primitive",
            TypeKind::Object { .. } => "object",
            TypeKind::Array { .. } => "array",
            TypeKind::Union { .. } => "union",
            TypeKind::Enum { .. } => "enum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrimitiveKind {
    String,
    Integer,
    Number,
    Boolean,
    DateTime,
    Date,
    Uuid,
    Binary,
    Any,
}

impl PrimitiveKind {
    pub const COUNT: usize = 9;

    pub const ALL: [PrimitiveKind; Self::COUNT] = [
        PrimitiveKind::String,
        PrimitiveKind::Integer,
        PrimitiveKind::Number,
        PrimitiveKind::Boolean,
        PrimitiveKind::DateTime,
        PrimitiveKind::Date,
        PrimitiveKind::Uuid,
        PrimitiveKind::Binary,
        PrimitiveKind::Any,
    ];

    /// Position in per-language primitive tables.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::DateTime => "date-time",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Uuid => "uuid",
            PrimitiveKind::Binary => "binary",
            PrimitiveKind::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeReference,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(default)]
    pub unique_items: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub value: EnumLiteral,
}

/// Enum members are hashable so enum shapes can be fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumLiteral {
    Bool(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    String(String),
}

impl EnumLiteral {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(|f| Self::Number(OrderedFloat(f))),
            },
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for EnumLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumLiteral::Bool(b) => write!(f, "{b}"),
            EnumLiteral::Integer(i) => write!(f, "{i}"),
            EnumLiteral::Number(n) => write!(f, "{}", n.0),
            EnumLiteral::String(s) => write!(f, "{s}"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSchema {
    pub metadata: SchemaMetadata,
    pub types: Vec<TypeDefinition>,
    pub endpoints: Vec<Endpoint>,
    pub authentication: Vec<AuthScheme>,
    pub errors: Vec<ErrorDef>,
}

impl CanonicalSchema {
    pub fn type_by_id(&self, id: TypeId) -> Option<&TypeDefinition> {
        // Builder emits types sorted by id with dense ids; fall back to a scan
        // for hand-assembled schemas.
        match self.types.get(id.0 as usize) {
            Some(def) if def.id == id => Some(def),
            _ => self.types.iter().find(|t| t.id == id),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CanonError::parse("canonical", e))
    }

    pub fn from_json(source: &str) -> Result<Self> {
        crate::path_de::from_str_with_path(source)
            .map_err(|message| CanonError::parse("canonical", message))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMetadata {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub source_format: SourceFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceFormat {
    OpenApi,
    Custom,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::OpenApi => f.write_str("openapi"),
            SourceFormat::Custom => f.write_str("custom"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub operation_id: String,
    pub path: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    pub responses: Vec<Response>,
    pub streaming: bool,
    pub authentication: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl Endpoint {
    /// The first 2xx response carrying a body type, falling back to `default`.
    pub fn success_response(&self) -> Option<&Response> {
        self.responses
            .iter()
            .find(|r| r.status_code.is_success() && r.ty.is_some())
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|r| r.status_code == StatusCode::Default && r.ty.is_some())
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "put" => Some(Self::Put),
            "post" => Some(Self::Post),
            "delete" => Some(Self::Delete),
            "options" => Some(Self::Options),
            "head" => Some(Self::Head),
            "patch" => Some(Self::Patch),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
            Self::Trace => "TRACE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    #[serde(rename = "type")]
    pub ty: TypeReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub content_type: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub ty: TypeReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `number | "default"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusCode {
    Code(u16),
    Default,
}

impl StatusCode {
    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::Code(c) if (200..300).contains(&c))
    }

    pub fn is_error(self) -> bool {
        matches!(self, StatusCode::Code(c) if c >= 400)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Code(c) => write!(f, "{c}"),
            StatusCode::Default => f.write_str("default"),
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            StatusCode::Code(c) => serializer.serialize_u16(*c),
            StatusCode::Default => serializer.serialize_str("default"),
        }
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u16),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Code(c) => Ok(StatusCode::Code(c)),
            Raw::Text(s) if s == "default" => Ok(StatusCode::Default),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "expected a status code number or \"default\", found {s:?}"
            ))),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// AUTH & ERRORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthScheme {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: AuthKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthKind {
    ApiKey {
        name: String,
        location: ParameterLocation,
    },
    #[serde(rename_all = "camelCase")]
    Http {
        scheme: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bearer_format: Option<String>,
    },
    #[serde(rename = "oauth2")]
    OAuth2 { flows: Vec<OAuthFlow> },
    OpenIdConnect { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthFlow {
    pub kind: OAuthFlowKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_url: Option<String>,
    #[serde(default)]
    pub scopes: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OAuthFlowKind {
    Implicit,
    Password,
    ClientCredentials,
    AuthorizationCode,
}

impl OAuthFlowKind {
    /// Substitute for unrecognized flow names.
    pub const FALLBACK: OAuthFlowKind = OAuthFlowKind::AuthorizationCode;

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "implicit" => Some(Self::Implicit),
            "password" => Some(Self::Password),
            "clientCredentials" => Some(Self::ClientCredentials),
            "authorizationCode" => Some(Self::AuthorizationCode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDef {
    pub status_code: StatusCode,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_code_wire_format() {
        let codes = vec![StatusCode::Code(201), StatusCode::Default];
        let encoded = serde_json::to_value(&codes).unwrap();
        assert_eq!(encoded, json!([201, "default"]));
        let decoded: Vec<StatusCode> = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, codes);
        assert!(serde_json::from_value::<StatusCode>(json!("teapot")).is_err());
    }

    #[test]
    fn type_kind_is_tagged() {
        let def = TypeDefinition {
            id: TypeId(3),
            name: "Tags".into(),
            description: None,
            deprecated: false,
            kind: TypeKind::Array {
                items: TypeReference::new(TypeId(1)),
                constraints: ArrayConstraints { min_items: Some(1), ..Default::default() },
            },
        };
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["kind"]["type"], "array");
        assert_eq!(value["kind"]["items"]["typeId"], 1);
        assert_eq!(value["kind"]["constraints"]["minItems"], 1);
        let back: TypeDefinition = serde_json::from_value(value).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn enum_literals_keep_their_kind() {
        let values = json!(["a", 2, 2.5, true]);
        let literals: Vec<EnumLiteral> = serde_json::from_value(values).unwrap();
        assert_eq!(
            literals,
            vec![
                EnumLiteral::String("a".into()),
                EnumLiteral::Integer(2),
                EnumLiteral::Number(OrderedFloat(2.5)),
                EnumLiteral::Bool(true),
            ]
        );
    }
}
