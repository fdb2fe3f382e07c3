//! `allOf` flattening.
//!
//! Members are dereferenced and nested compositions flattened depth-first,
//! so `allOf: [A, {allOf: [B, C]}]` contributes A, B, C in that order. The
//! node's own sibling keywords count as one final member.
//!
//! Members that denote a value type (a primitive, enum, array or union)
//! cannot merge into an object. They are kept aside as `opaque`; when
//! nothing else merges, the composition stands for that member instead.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::adapter::{SchemaNode, SourceDocument};
use crate::error::{CanonError, Result};

/// Which member wins when two `allOf` members declare the same property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergePrecedence {
    #[default]
    LastWins,
    FirstWins,
}

/// Object view of a node before its properties are lowered.
#[derive(Debug, Default)]
pub(super) struct ObjectShape<'a> {
    pub properties: IndexMap<String, &'a SchemaNode>,
    pub required: Vec<String>,
    pub additional_properties: Option<&'a SchemaNode>,
    /// Top-level `allOf` members that contributed no object keywords.
    pub opaque: Vec<&'a SchemaNode>,
}

impl<'a> ObjectShape<'a> {
    pub fn of(node: &'a SchemaNode) -> Self {
        let mut shape = Self::default();
        shape.absorb(node, MergePrecedence::LastWins);
        shape
    }

    fn absorb(&mut self, member: &'a SchemaNode, precedence: MergePrecedence) {
        for (name, schema) in &member.properties {
            match precedence {
                MergePrecedence::LastWins => {
                    self.properties.insert(name.clone(), schema);
                }
                MergePrecedence::FirstWins => {
                    self.properties.entry(name.clone()).or_insert(schema);
                }
            }
        }
        for name in &member.required {
            if !self.required.contains(name) {
                self.required.push(name.clone());
            }
        }
        if let Some(extra) = member.additional_properties.as_deref() {
            match precedence {
                MergePrecedence::LastWins => self.additional_properties = Some(extra),
                MergePrecedence::FirstWins => {
                    self.additional_properties.get_or_insert(extra);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.required.is_empty() && self.additional_properties.is_none()
    }

    /// The single member this composition stands for, if nothing merged.
    pub fn passthrough(&self, precedence: MergePrecedence) -> Option<&'a SchemaNode> {
        if !self.is_empty() {
            return None;
        }
        match precedence {
            MergePrecedence::LastWins => self.opaque.last().copied(),
            MergePrecedence::FirstWins => self.opaque.first().copied(),
        }
    }

    /// Required names that actually name a property.
    pub fn required_names(&self) -> Vec<String> {
        self.required.iter().filter(|r| self.properties.contains_key(*r)).cloned().collect()
    }
}

pub(super) fn flatten_all_of<'a>(
    document: &'a SourceDocument,
    node: &'a SchemaNode,
    precedence: MergePrecedence,
    path: &str,
) -> Result<ObjectShape<'a>> {
    let mut members = Vec::new();
    let mut opaque = Vec::new();
    for member in &node.all_of {
        let before = members.len();
        collect(document, member, &mut members, &mut Vec::new(), path)?;
        if members.len() == before && is_opaque(target(document, member)) {
            opaque.push(member);
        }
    }
    if contributes(node) {
        members.push(node);
    }
    let mut shape = ObjectShape { opaque, ..ObjectShape::default() };
    for member in members {
        shape.absorb(member, precedence);
    }
    Ok(shape)
}

fn contributes(node: &SchemaNode) -> bool {
    !node.properties.is_empty() || !node.required.is_empty() || node.additional_properties.is_some()
}

/// Whether a member denotes a value type rather than object keywords or
/// bare annotations such as `description`.
fn is_opaque(node: &SchemaNode) -> bool {
    node.kind.as_deref().is_some_and(|k| k != "object")
        || !node.enum_values.is_empty()
        || node.is_union()
        || node.items.is_some()
}

/// Follows `$ref` chains. `collect` has already rejected cycles and
/// dangling addresses, so the hop bound only guards against misuse.
fn target<'a>(document: &'a SourceDocument, mut node: &'a SchemaNode) -> &'a SchemaNode {
    for _ in 0..=document.schemas.len() {
        let Some(named) = node.reference.as_deref().and_then(|a| document.lookup(a)) else { break };
        node = &named.node;
    }
    node
}

fn collect<'a>(
    document: &'a SourceDocument,
    node: &'a SchemaNode,
    out: &mut Vec<&'a SchemaNode>,
    visiting: &mut Vec<&'a str>,
    path: &str,
) -> Result<()> {
    if let Some(address) = node.reference.as_deref() {
        if visiting.contains(&address) {
            return Err(CanonError::structural(path, format!("allOf cycle through {address:?}")));
        }
        let target = document
            .lookup(address)
            .ok_or_else(|| CanonError::structural(path, format!("unresolvable $ref {address:?}")))?;
        visiting.push(address);
        collect(document, &target.node, out, visiting, path)?;
        visiting.pop();
        return Ok(());
    }
    for member in &node.all_of {
        collect(document, member, out, visiting, path)?;
    }
    if contributes(node) {
        out.push(node);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::NamedSchema;
    use crate::adapter::DocumentInfo;
    use crate::ir::SourceFormat;

    fn object(props: &[(&str, &str)], required: &[&str]) -> SchemaNode {
        SchemaNode {
            properties: props.iter().map(|(n, k)| (n.to_string(), SchemaNode::typed(k))).collect(),
            required: required.iter().map(|r| r.to_string()).collect(),
            ..SchemaNode::typed("object")
        }
    }

    fn document(schemas: Vec<(&str, SchemaNode)>) -> SourceDocument {
        SourceDocument {
            format: SourceFormat::OpenApi,
            info: DocumentInfo {
                title: "T".into(),
                version: "1".into(),
                description: None,
                base_url: None,
                source_version: None,
            },
            schemas: schemas
                .into_iter()
                .map(|(name, node)| {
                    (format!("#/components/schemas/{name}"), NamedSchema { name: name.into(), node })
                })
                .collect(),
            operations: vec![],
            security_schemes: vec![],
            default_security: vec![],
            errors: vec![],
        }
    }

    #[test]
    fn nested_members_and_refs_are_flattened() {
        let doc = document(vec![("Base", object(&[("id", "string")], &["id"]))]);
        let node = SchemaNode {
            all_of: vec![
                SchemaNode::reference("#/components/schemas/Base"),
                SchemaNode { all_of: vec![object(&[("name", "string")], &["name"])], ..Default::default() },
            ],
            properties: [("age".to_string(), SchemaNode::typed("integer"))].into_iter().collect(),
            ..Default::default()
        };
        let shape = flatten_all_of(&doc, &node, MergePrecedence::LastWins, "#").unwrap();
        let names: Vec<_> = shape.properties.keys().cloned().collect();
        assert_eq!(names, vec!["id", "name", "age"]);
        assert_eq!(shape.required_names(), vec!["id", "name"]);
    }

    #[test]
    fn precedence_decides_conflicts() {
        let doc = document(vec![]);
        let node = SchemaNode {
            all_of: vec![object(&[("id", "string")], &[]), object(&[("id", "integer")], &[])],
            ..Default::default()
        };
        let last = flatten_all_of(&doc, &node, MergePrecedence::LastWins, "#").unwrap();
        assert_eq!(last.properties["id"].kind.as_deref(), Some("integer"));
        let first = flatten_all_of(&doc, &node, MergePrecedence::FirstWins, "#").unwrap();
        assert_eq!(first.properties["id"].kind.as_deref(), Some("string"));
    }

    #[test]
    fn value_members_pass_through() {
        let status = SchemaNode { enum_values: vec![serde_json::json!("on")], ..SchemaNode::typed("string") };
        let doc = document(vec![("Status", status), ("Base", object(&[("id", "string")], &[]))]);

        let wrapped = SchemaNode {
            all_of: vec![SchemaNode::reference("#/components/schemas/Status")],
            description: Some("current".into()),
            ..Default::default()
        };
        let shape = flatten_all_of(&doc, &wrapped, MergePrecedence::LastWins, "#").unwrap();
        assert!(shape.is_empty());
        let member = shape.passthrough(MergePrecedence::LastWins).unwrap();
        assert_eq!(member.reference.as_deref(), Some("#/components/schemas/Status"));

        let mixed = SchemaNode {
            all_of: vec![
                SchemaNode::reference("#/components/schemas/Base"),
                SchemaNode::typed("string"),
                SchemaNode { description: Some("note".into()), ..Default::default() },
            ],
            ..Default::default()
        };
        let shape = flatten_all_of(&doc, &mixed, MergePrecedence::LastWins, "#").unwrap();
        assert_eq!(shape.opaque.len(), 1);
        assert!(shape.passthrough(MergePrecedence::LastWins).is_none());
        assert!(shape.properties.contains_key("id"));
    }

    #[test]
    fn self_including_composition_is_structural() {
        let looping = SchemaNode {
            all_of: vec![SchemaNode::reference("#/components/schemas/Loop")],
            ..Default::default()
        };
        let doc = document(vec![("Loop", looping.clone())]);
        let err = flatten_all_of(&doc, &looping, MergePrecedence::LastWins, "#").unwrap_err();
        assert!(matches!(err, CanonError::Structural { .. }));
    }
}
