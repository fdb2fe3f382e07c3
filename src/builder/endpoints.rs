//! Endpoints, responses and error shapes.

use std::collections::HashSet;

use super::security::AuthTable;
use super::SchemaBuilder;
use crate::adapter::{ContentMap, OperationNode, SchemaNode};
use crate::error::{codes, Result};
use crate::ir::{
    Endpoint, ErrorDef, HttpMethod, Parameter, PrimitiveKind, RequestBody, Response, StatusCode,
    TypeId, TypeReference,
};
use crate::registry::naming::to_camel_case;
use crate::registry::{NameAllocator, NameHint, TypeCandidate};

const JSON: &str = "application/json";

fn media_base(media: &str) -> &str {
    media.split(';').next().unwrap_or(media).trim()
}

fn is_json_media(media: &str) -> bool {
    let base = media_base(media);
    base == JSON || base.ends_with("+json")
}

/// Exact `application/json`, then any JSON-family type, then whatever was
/// declared first.
pub(super) fn negotiate(content: &ContentMap) -> Option<(&String, Option<&SchemaNode>)> {
    content
        .get_key_value(JSON)
        .or_else(|| content.iter().find(|(media, _)| is_json_media(media)))
        .or_else(|| content.iter().next())
        .map(|(media, schema)| (media, schema.as_ref()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StatusKey {
    Exact(StatusCode),
    /// `2XX` style range, collapsed to its `N00` code.
    Range(StatusCode),
    Invalid,
}

pub(super) fn parse_status(raw: &str) -> StatusKey {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("default") {
        return StatusKey::Exact(StatusCode::Default);
    }
    if let Ok(code) = raw.parse::<u16>()
        && (100..=599).contains(&code)
    {
        return StatusKey::Exact(StatusCode::Code(code));
    }
    match raw.as_bytes() {
        [class @ b'1'..=b'5', rest @ ..] if rest.len() == 2 && rest.iter().all(|c| c.eq_ignore_ascii_case(&b'x')) => {
            StatusKey::Range(StatusCode::Code(u16::from(class - b'0') * 100))
        }
        _ => StatusKey::Invalid,
    }
}

/// `GET /users/{id}/posts` → `getUsersByIdPosts`.
pub(super) fn synthesize_operation_id(method: HttpMethod, path: &str) -> String {
    let mut words = vec![method.as_str().to_ascii_lowercase()];
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(param) => {
                words.push(String::from("by"));
                words.push(param.to_string());
            }
            None => words.push(segment.to_string()),
        }
    }
    if words.len() == 1 {
        words.push(String::from("root"));
    }
    to_camel_case(&words.join("_"))
}

fn reason_phrase(status: StatusCode) -> String {
    let phrase = match status {
        StatusCode::Default => "Default",
        StatusCode::Code(400) => "BadRequest",
        StatusCode::Code(401) => "Unauthorized",
        StatusCode::Code(403) => "Forbidden",
        StatusCode::Code(404) => "NotFound",
        StatusCode::Code(405) => "MethodNotAllowed",
        StatusCode::Code(409) => "Conflict",
        StatusCode::Code(410) => "Gone",
        StatusCode::Code(422) => "UnprocessableEntity",
        StatusCode::Code(429) => "TooManyRequests",
        StatusCode::Code(500) => "InternalServerError",
        StatusCode::Code(502) => "BadGateway",
        StatusCode::Code(503) => "ServiceUnavailable",
        StatusCode::Code(504) => "GatewayTimeout",
        StatusCode::Code(code) => return format!("Http{code}"),
    };
    phrase.to_string()
}

impl SchemaBuilder<'_, '_> {
    fn status(&mut self, raw: &str, path: &str) -> Option<StatusCode> {
        match parse_status(raw) {
            StatusKey::Exact(status) => Some(status),
            StatusKey::Range(status) => {
                self.diagnostics.warn(
                    path,
                    codes::STATUS_RANGE,
                    format!("status range {raw:?} mapped to {status}"),
                );
                Some(status)
            }
            StatusKey::Invalid => {
                self.diagnostics.warn(path, codes::INVALID_STATUS, format!("invalid status {raw:?}; response skipped"));
                None
            }
        }
    }

    fn operation_id(&mut self, operation: &OperationNode, path: &str) -> String {
        let base = operation
            .operation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| synthesize_operation_id(operation.method, &operation.path));
        if self.operation_ids.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}{n}");
            if self.operation_ids.insert(candidate.clone()) {
                self.diagnostics.warn(
                    path,
                    codes::DUPLICATE_OPERATION_ID,
                    format!("operationId {base:?} already used; renamed to {candidate:?}"),
                );
                return candidate;
            }
            n += 1;
        }
    }

    pub(super) fn endpoint(&mut self, operation: &OperationNode, auth: &AuthTable) -> Result<Endpoint> {
        let path = format!("paths.{}.{}", operation.path, operation.method.as_str().to_ascii_lowercase());
        let operation_id = self.operation_id(operation, &path);
        let owner = NameHint::new(&operation_id);

        let mut parameters = Vec::with_capacity(operation.parameters.len());
        for param in &operation.parameters {
            let param_path = format!("{path}.parameters.{}", param.name);
            let ty = match &param.schema {
                Some(schema) => {
                    self.lower(schema, &NameHint::within(&param.name, &owner), &param_path)?
                }
                None => self.registry.register(TypeCandidate::primitive(PrimitiveKind::String))?,
            };
            parameters.push(Parameter {
                name: param.name.clone(),
                location: param.location,
                required: param.required,
                ty,
                description: param.description.clone(),
                deprecated: param.deprecated,
                default: param.schema.as_ref().and_then(|s| s.default.clone()),
            });
        }

        let request_body = match &operation.request_body {
            None => None,
            Some(body) => match negotiate(&body.content) {
                Some((media, Some(schema))) => Some(RequestBody {
                    content_type: media.clone(),
                    required: body.required,
                    ty: self.lower(schema, &owner.suffixed("Request"), &format!("{path}.requestBody"))?,
                    description: body.description.clone(),
                }),
                Some((media, None)) => {
                    self.diagnostics.warn(
                        format!("{path}.requestBody"),
                        codes::MISSING_BODY_SCHEMA,
                        format!("request body {media:?} declares no schema; body omitted"),
                    );
                    None
                }
                None => {
                    self.diagnostics.warn(
                        format!("{path}.requestBody"),
                        codes::MISSING_BODY_SCHEMA,
                        "request body declares no content; body omitted",
                    );
                    None
                }
            },
        };

        let mut responses = Vec::with_capacity(operation.responses.len());
        for response in &operation.responses {
            let response_path = format!("{path}.responses.{}", response.status);
            let Some(status_code) = self.status(&response.status, &response_path) else { continue };
            let hint = if status_code.is_success() {
                owner.suffixed("Response")
            } else {
                owner.suffixed(&format!("{status_code}Response"))
            };
            let (content_type, ty) = match negotiate(&response.content) {
                Some((media, Some(schema))) => {
                    (Some(media.clone()), Some(self.lower(schema, &hint, &response_path)?))
                }
                Some((media, None)) => (Some(media.clone()), None),
                None => (None, None),
            };
            responses.push(Response { status_code, content_type, ty, description: response.description.clone() });
        }

        let document = self.document;
        let requested = operation.security.as_deref().unwrap_or(document.default_security.as_slice());
        let authentication = self.requirements(requested, auth, &path);

        Ok(Endpoint {
            id: format!("{} {}", operation.method, operation.path),
            operation_id,
            path: operation.path.clone(),
            method: operation.method,
            summary: operation.summary.clone(),
            description: operation.description.clone(),
            tags: operation.tags.clone(),
            parameters,
            request_body,
            responses,
            streaming: operation.streaming,
            authentication,
            deprecated: operation.deprecated,
        })
    }

    /// Document-level error shapes first, then every non-success response,
    /// deduplicated on (status, type).
    pub(super) fn error_defs(&mut self, endpoints: &[Endpoint]) -> Result<Vec<ErrorDef>> {
        let document = self.document;
        let mut seen: HashSet<(StatusCode, Option<TypeId>)> = HashSet::new();
        let mut names = NameAllocator::default();
        let mut errors = Vec::new();

        let mut declared: Vec<(StatusCode, Option<TypeReference>, Option<String>)> = Vec::new();
        for error in &document.errors {
            let path = format!("errors.{}", error.status);
            let Some(status) = self.status(&error.status, &path) else { continue };
            let hint = NameHint::new(format!("{}Error", reason_phrase(status)));
            let ty = self.lower(&error.schema, &hint, &path)?;
            declared.push((status, Some(ty), error.description.clone()));
        }
        let collected = endpoints.iter().flat_map(|endpoint| {
            endpoint
                .responses
                .iter()
                .filter(|r| !r.status_code.is_success())
                .map(|r| (r.status_code, r.ty, r.description.clone()))
        });

        for (status_code, ty, description) in declared.into_iter().chain(collected) {
            if !seen.insert((status_code, ty.map(|t| t.type_id))) {
                continue;
            }
            let mut hint = NameHint::new(format!("{}Error", reason_phrase(status_code)));
            if let Some(ty) = ty {
                hint = hint.with_context(self.registry.resolve(ty.type_id)?.name.clone());
            }
            errors.push(ErrorDef { status_code, name: names.allocate(&hint), ty, description });
        }
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_keys() {
        assert_eq!(parse_status("201"), StatusKey::Exact(StatusCode::Code(201)));
        assert_eq!(parse_status("default"), StatusKey::Exact(StatusCode::Default));
        assert_eq!(parse_status("4xx"), StatusKey::Range(StatusCode::Code(400)));
        assert_eq!(parse_status("2XX"), StatusKey::Range(StatusCode::Code(200)));
        assert_eq!(parse_status("6XX"), StatusKey::Invalid);
        assert_eq!(parse_status("999"), StatusKey::Invalid);
        assert_eq!(parse_status("ok"), StatusKey::Invalid);
    }

    #[test]
    fn synthesized_operation_ids() {
        assert_eq!(synthesize_operation_id(HttpMethod::Get, "/users/{userId}/posts"), "getUsersByUserIdPosts");
        assert_eq!(synthesize_operation_id(HttpMethod::Delete, "/"), "deleteRoot");
        assert_eq!(synthesize_operation_id(HttpMethod::Post, "/v1/chat-completions"), "postV1ChatCompletions");
    }

    #[test]
    fn negotiation_order() {
        let mut content = ContentMap::new();
        content.insert("text/plain".into(), None);
        content.insert("application/json; charset=utf-8".into(), Some(SchemaNode::typed("string")));
        let (media, schema) = negotiate(&content).unwrap();
        assert_eq!(media, "application/json; charset=utf-8");
        assert!(schema.is_some());

        content.insert(JSON.into(), None);
        assert_eq!(negotiate(&content).unwrap().0, JSON);
        assert!(negotiate(&ContentMap::new()).is_none());
    }
}
