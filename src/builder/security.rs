//! Security schemes and per-endpoint requirements.

use std::collections::HashSet;

use super::SchemaBuilder;
use crate::adapter::{SecuritySchemeNode, SourceDocument};
use crate::error::codes;
use crate::ir::{AuthKind, AuthScheme, OAuthFlow, OAuthFlowKind};

/// Which scheme IDs survived lowering, and which were merely declared.
pub(super) struct AuthTable {
    supported: HashSet<String>,
    declared: HashSet<String>,
}

impl AuthTable {
    pub fn new(document: &SourceDocument, schemes: &[AuthScheme]) -> Self {
        Self {
            supported: schemes.iter().map(|s| s.id.clone()).collect(),
            declared: document.security_schemes.iter().map(|s| s.id.clone()).collect(),
        }
    }
}

impl SchemaBuilder<'_, '_> {
    pub(super) fn auth_schemes(&mut self) -> Vec<AuthScheme> {
        let document = self.document;
        let mut schemes = Vec::with_capacity(document.security_schemes.len());
        for entry in &document.security_schemes {
            let path = format!("securitySchemes.{}", entry.id);
            let kind = match &entry.scheme {
                SecuritySchemeNode::ApiKey { name, location } => {
                    AuthKind::ApiKey { name: name.clone(), location: *location }
                }
                SecuritySchemeNode::Http { scheme, bearer_format } => {
                    AuthKind::Http { scheme: scheme.clone(), bearer_format: bearer_format.clone() }
                }
                SecuritySchemeNode::OAuth2 { flows } => {
                    let flows = flows
                        .iter()
                        .map(|flow| {
                            let kind = flow.kind().unwrap_or_else(|| {
                                self.diagnostics.warn(
                                    &path,
                                    codes::UNKNOWN_OAUTH_FLOW,
                                    format!(
                                        "unrecognized OAuth2 flow {:?}; treated as authorizationCode",
                                        flow.name
                                    ),
                                );
                                OAuthFlowKind::FALLBACK
                            });
                            OAuthFlow {
                                kind,
                                authorization_url: flow.authorization_url.clone(),
                                token_url: flow.token_url.clone(),
                                refresh_url: flow.refresh_url.clone(),
                                scopes: flow.scopes.clone(),
                            }
                        })
                        .collect();
                    AuthKind::OAuth2 { flows }
                }
                SecuritySchemeNode::OpenIdConnect { url } => AuthKind::OpenIdConnect { url: url.clone() },
                SecuritySchemeNode::Unsupported { declared, reason } => {
                    self.diagnostics.warn(
                        &path,
                        codes::UNSUPPORTED_AUTH,
                        format!("auth scheme of type {declared:?} omitted: {reason}"),
                    );
                    continue;
                }
            };
            schemes.push(AuthScheme { id: entry.id.clone(), description: entry.description.clone(), kind });
        }
        schemes
    }

    /// Requirement names for one endpoint. Names of omitted schemes are
    /// dropped quietly; names nobody declared are dropped with a warning.
    pub(super) fn requirements(&mut self, requested: &[String], table: &AuthTable, path: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in requested {
            if table.supported.contains(name) {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            } else if !table.declared.contains(name) {
                self.diagnostics.warn(
                    path,
                    codes::UNKNOWN_SECURITY_REFERENCE,
                    format!("security requirement names undeclared scheme {name:?}; dropped"),
                );
            }
        }
        names
    }
}
