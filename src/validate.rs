//! Post-build graph checks.
//!
//! The builder already guarantees most of these for schemas it returns;
//! the validator exists for schemas loaded from canonical JSON or assembled
//! by hand, and as a second line for the builder's own output.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codegen::{path_parts, PathPart};
use crate::error::{CanonError, ValidationIssue};
use crate::ir::{CanonicalSchema, ParameterLocation, TypeKind, TypeReference};

pub mod checks {
    pub const DANGLING_REFERENCE: &str = "dangling_reference";
    pub const DUPLICATE_TYPE_ID: &str = "duplicate_type_id";
    pub const DUPLICATE_TYPE_NAME: &str = "duplicate_type_name";
    pub const DUPLICATE_OPERATION_ID: &str = "duplicate_operation_id";
    pub const DUPLICATE_ROUTE: &str = "duplicate_route";
    pub const UNKNOWN_AUTH_SCHEME: &str = "unknown_auth_scheme";
    pub const UNDECLARED_PATH_PARAMETER: &str = "undeclared_path_parameter";
    pub const UNUSED_PATH_PARAMETER: &str = "unused_path_parameter";
    pub const OPTIONAL_PATH_PARAMETER: &str = "optional_path_parameter";
    pub const UNKNOWN_REQUIRED_PROPERTY: &str = "unknown_required_property";
    pub const EMPTY_UNION: &str = "empty_union";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn into_result(self) -> Result<(), CanonError> {
        if self.valid { Ok(()) } else { Err(CanonError::Validation(self.errors)) }
    }
}

struct Checker<'s> {
    schema: &'s CanonicalSchema,
    ids: HashSet<u32>,
    errors: Vec<ValidationIssue>,
}

impl Checker<'_> {
    fn report(&mut self, path: impl Into<String>, code: &str, message: impl Into<String>) {
        self.errors.push(ValidationIssue { path: path.into(), code: code.to_string(), message: message.into() });
    }

    fn reference(&mut self, path: impl Into<String>, reference: TypeReference) {
        if !self.ids.contains(&reference.type_id.0) {
            let path = path.into();
            self.report(path, checks::DANGLING_REFERENCE, format!("type {} is not defined", reference.type_id));
        }
    }

    fn types(&mut self) {
        let schema = self.schema;
        let mut seen_ids = HashSet::new();
        let mut seen_names = HashSet::new();
        for (i, def) in schema.types.iter().enumerate() {
            let path = format!("types[{i}]");
            if !seen_ids.insert(def.id) {
                self.report(&path, checks::DUPLICATE_TYPE_ID, format!("type id {} is issued twice", def.id));
            }
            if !seen_names.insert(def.name.as_str()) {
                self.report(&path, checks::DUPLICATE_TYPE_NAME, format!("type name `{}` is not unique", def.name));
            }
            for reference in def.kind.references() {
                self.reference(format!("{path}.kind"), reference);
            }
            match &def.kind {
                TypeKind::Object { properties, required_names, .. } => {
                    for name in required_names {
                        if !properties.iter().any(|p| &p.name == name) {
                            self.report(
                                &path,
                                checks::UNKNOWN_REQUIRED_PROPERTY,
                                format!("`{}` requires `{name}` but declares no such property", def.name),
                            );
                        }
                    }
                }
                TypeKind::Union { variants, .. } if variants.is_empty() => {
                    self.report(&path, checks::EMPTY_UNION, format!("union `{}` has no variants", def.name));
                }
                _ => {}
            }
        }
    }

    fn endpoints(&mut self) {
        let schema = self.schema;
        let schemes: HashSet<&str> = schema.authentication.iter().map(|a| a.id.as_str()).collect();
        let mut operation_ids = HashSet::new();
        let mut routes = HashMap::new();

        for (i, endpoint) in schema.endpoints.iter().enumerate() {
            let path = format!("endpoints[{i}]");
            if !operation_ids.insert(endpoint.operation_id.as_str()) {
                self.report(
                    &path,
                    checks::DUPLICATE_OPERATION_ID,
                    format!("operationId `{}` is not unique", endpoint.operation_id),
                );
            }
            if let Some(first) = routes.insert((endpoint.method, endpoint.path.as_str()), i) {
                self.report(
                    &path,
                    checks::DUPLICATE_ROUTE,
                    format!("{} {} is also declared by endpoints[{first}]", endpoint.method, endpoint.path),
                );
            }
            for scheme in &endpoint.authentication {
                if !schemes.contains(scheme.as_str()) {
                    self.report(
                        format!("{path}.authentication"),
                        checks::UNKNOWN_AUTH_SCHEME,
                        format!("auth scheme `{scheme}` is not declared"),
                    );
                }
            }

            let template: HashSet<&str> = path_parts(&endpoint.path)
                .into_iter()
                .filter_map(|part| match part {
                    PathPart::Param(name) => Some(name),
                    PathPart::Literal(_) => None,
                })
                .collect();
            for name in &template {
                let declared = endpoint
                    .parameters
                    .iter()
                    .any(|p| p.location == ParameterLocation::Path && p.name == *name);
                if !declared {
                    self.report(
                        &path,
                        checks::UNDECLARED_PATH_PARAMETER,
                        format!("`{{{name}}}` in {} has no path parameter", endpoint.path),
                    );
                }
            }

            for (j, parameter) in endpoint.parameters.iter().enumerate() {
                let param_path = format!("{path}.parameters[{j}]");
                self.reference(&param_path, parameter.ty);
                if parameter.location == ParameterLocation::Path {
                    if !template.contains(parameter.name.as_str()) {
                        self.report(
                            &param_path,
                            checks::UNUSED_PATH_PARAMETER,
                            format!("path parameter `{}` does not appear in {}", parameter.name, endpoint.path),
                        );
                    }
                    if !parameter.required {
                        self.report(
                            &param_path,
                            checks::OPTIONAL_PATH_PARAMETER,
                            format!("path parameter `{}` must be required", parameter.name),
                        );
                    }
                }
            }
            if let Some(body) = &endpoint.request_body {
                self.reference(format!("{path}.requestBody"), body.ty);
            }
            for (j, response) in endpoint.responses.iter().enumerate() {
                if let Some(ty) = response.ty {
                    self.reference(format!("{path}.responses[{j}]"), ty);
                }
            }
        }

        for (i, error) in schema.errors.iter().enumerate() {
            if let Some(ty) = error.ty {
                self.reference(format!("errors[{i}]"), ty);
            }
        }
    }
}

/// Checks closure, uniqueness and endpoint consistency. Never fails; the
/// outcome is in the report.
pub fn validate(schema: &CanonicalSchema) -> ValidationReport {
    let mut checker = Checker {
        schema,
        ids: schema.types.iter().map(|t| t.id.0).collect(),
        errors: Vec::new(),
    };
    checker.types();
    checker.endpoints();
    debug!(errors = checker.errors.len(), "validated canonical schema");
    ValidationReport { valid: checker.errors.is_empty(), errors: checker.errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::fixtures;
    use crate::ir::{TypeDefinition, TypeId};

    fn codes(report: &ValidationReport) -> Vec<&str> {
        report.errors.iter().map(|e| e.code.as_str()).collect()
    }

    #[test]
    fn built_schemas_are_valid() {
        let report = validate(&fixtures::petstore());
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn dangling_and_empty_types() {
        let mut schema = fixtures::petstore();
        let next = schema.types.iter().map(|t| t.id.0).max().unwrap() + 1;
        schema.types.push(TypeDefinition {
            id: TypeId(next),
            name: "Broken".into(),
            description: None,
            deprecated: false,
            kind: TypeKind::Union { variants: vec![], discriminator: None },
        });
        schema.types.push(TypeDefinition {
            id: TypeId(next + 1),
            name: "Dangling".into(),
            description: None,
            deprecated: false,
            kind: TypeKind::Array { items: TypeReference::new(TypeId(9999)), constraints: Default::default() },
        });
        let report = validate(&schema);
        assert!(!report.valid);
        let codes = codes(&report);
        assert!(codes.contains(&checks::EMPTY_UNION));
        assert!(codes.contains(&checks::DANGLING_REFERENCE));
        assert!(matches!(report.into_result(), Err(CanonError::Validation(errors)) if errors.len() == 2));
    }

    #[test]
    fn endpoint_consistency() {
        let mut schema = fixtures::petstore();
        let mut copy = schema.endpoints[0].clone();
        copy.authentication.push("missing".into());
        schema.endpoints.push(copy);
        let get_pet = schema.endpoints.iter_mut().find(|e| e.operation_id == "getPet").unwrap();
        get_pet.path = "/pets/{id}".into();

        let report = validate(&schema);
        let codes = codes(&report);
        assert!(codes.contains(&checks::DUPLICATE_OPERATION_ID));
        assert!(codes.contains(&checks::DUPLICATE_ROUTE));
        assert!(codes.contains(&checks::UNKNOWN_AUTH_SCHEME));
        assert!(codes.contains(&checks::UNDECLARED_PATH_PARAMETER));
        assert!(codes.contains(&checks::UNUSED_PATH_PARAMETER));
    }

    #[test]
    fn required_names_must_exist() {
        let mut schema = fixtures::petstore();
        let pet = schema.types.iter_mut().find(|t| t.name == "Pet").unwrap();
        if let TypeKind::Object { required_names, .. } = &mut pet.kind {
            required_names.push("ghost".into());
        }
        let report = validate(&schema);
        assert_eq!(codes(&report), vec![checks::UNKNOWN_REQUIRED_PROPERTY]);
    }
}
