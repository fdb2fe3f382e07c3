//! Canonical Type Registry.
//!
//! Issues stable opaque [`TypeId`]s, deduplicates equivalent registrations
//! and resolves IDs back to definitions. One registry lives for exactly one
//! builder call; nothing here is global.
//!
//! Two kinds of keys share one cache:
//! - `Ref(address)` for `$ref` targets, so the same target always yields the
//!   same reference;
//! - `Shape(fingerprint)` for inline nodes, a normalized structural hash
//!   computed from already-registered children.
//!
//! Children are registered before their parent. A candidate whose edges
//! name an ID that was never issued is rejected, so every definition the
//! registry hands out is immediately resolvable. Recursive named schemas go
//! through [`TypeRegistry::reserve`] + [`TypeRegistry::define`].
pub mod fingerprint;
pub mod naming;

use std::collections::HashMap;

use tracing::trace;

use crate::error::{CanonError, Result};
use crate::ir::{PrimitiveKind, TypeDefinition, TypeId, TypeKind, TypeReference};

pub use naming::{NameAllocator, NameHint};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    Ref(String),
    Shape(String),
}

/// A node whose children are already registered, ready to be finalized.
#[derive(Debug, Clone)]
pub struct TypeCandidate {
    pub kind: TypeKind,
    pub hint: NameHint,
    pub description: Option<String>,
    pub deprecated: bool,
}

impl TypeCandidate {
    pub fn new(kind: TypeKind, hint: NameHint) -> Self {
        Self { kind, hint, description: None, deprecated: false }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(TypeKind::Primitive { primitive: kind }, NameHint::new(kind.as_str()))
    }

    pub fn describe(mut self, description: Option<String>, deprecated: bool) -> Self {
        self.description = description;
        self.deprecated = deprecated;
        self
    }
}

#[derive(Debug)]
enum Slot {
    Reserved { name: String, address: String },
    Defined(TypeDefinition),
}

#[derive(Debug, Default)]
pub struct TypeRegistry {
    slots: Vec<Slot>,
    keys: HashMap<NodeKey, TypeId>,
    names: NameAllocator,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn lookup(&self, key: &NodeKey) -> Option<TypeId> {
        self.keys.get(key).copied()
    }

    fn next_id(&self) -> TypeId {
        TypeId(self.slots.len() as u32)
    }

    fn check_edges(&self, kind: &TypeKind) -> Result<()> {
        for r in kind.references() {
            if r.type_id.0 as usize >= self.slots.len() {
                return Err(CanonError::UnresolvedReference(r.type_id));
            }
        }
        Ok(())
    }

    fn allocate_name(&mut self, candidate: &TypeCandidate) -> String {
        match &candidate.kind {
            TypeKind::Primitive { primitive } => self.names.allocate_exact(primitive.as_str()),
            _ => self.names.allocate(&candidate.hint),
        }
    }

    /// Registers an inline node. Returns the existing reference when a node
    /// with the same structural fingerprint was registered before.
    pub fn register(&mut self, candidate: TypeCandidate) -> Result<TypeReference> {
        self.check_edges(&candidate.kind)?;
        let key = NodeKey::Shape(fingerprint::fingerprint(&candidate.kind));
        if let Some(id) = self.keys.get(&key) {
            return Ok(TypeReference::new(*id));
        }
        let id = self.next_id();
        let name = self.allocate_name(&candidate);
        trace!(%id, name = %name, kind = candidate.kind.label(), "registered type");
        self.slots.push(Slot::Defined(TypeDefinition {
            id,
            name,
            description: candidate.description,
            deprecated: candidate.deprecated,
            kind: candidate.kind,
        }));
        self.keys.insert(key, id);
        Ok(TypeReference::new(id))
    }

    /// Reserves an ID and a name for a `$ref` target before its children are
    /// visited, so that back-edges from recursive schemas can point at it.
    pub fn reserve(&mut self, address: &str, hint: &NameHint) -> TypeId {
        let key = NodeKey::Ref(address.to_string());
        if let Some(id) = self.keys.get(&key) {
            return *id;
        }
        let id = self.next_id();
        let name = self.names.allocate(hint);
        self.slots.push(Slot::Reserved { name, address: address.to_string() });
        self.keys.insert(key, id);
        id
    }

    /// Finalizes a reserved slot. The name chosen at reservation time wins.
    pub fn define(&mut self, id: TypeId, candidate: TypeCandidate) -> Result<TypeReference> {
        self.check_edges(&candidate.kind)?;
        let slot = self
            .slots
            .get_mut(id.0 as usize)
            .ok_or(CanonError::UnresolvedReference(id))?;
        let name = match slot {
            Slot::Reserved { name, .. } => std::mem::take(name),
            // IDs are never redefined.
            Slot::Defined(_) => return Ok(TypeReference::new(id)),
        };
        trace!(%id, name = %name, kind = candidate.kind.label(), "defined reserved type");
        *slot = Slot::Defined(TypeDefinition {
            id,
            name,
            description: candidate.description,
            deprecated: candidate.deprecated,
            kind: candidate.kind,
        });
        Ok(TypeReference::new(id))
    }

    /// Binds a `$ref` address to an already-issued ID (structural aliases).
    pub fn alias(&mut self, address: &str, id: TypeId) {
        self.keys.entry(NodeKey::Ref(address.to_string())).or_insert(id);
    }

    pub fn resolve(&self, id: TypeId) -> Result<&TypeDefinition> {
        match self.slots.get(id.0 as usize) {
            Some(Slot::Defined(def)) => Ok(def),
            _ => Err(CanonError::UnresolvedReference(id)),
        }
    }

    /// Consumes the registry. Fails if a reservation was never defined.
    pub fn into_types(self) -> Result<Vec<TypeDefinition>> {
        self.slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| match slot {
                Slot::Defined(def) => Ok(def),
                Slot::Reserved { address, .. } => {
                    tracing::error!(address = %address, "reserved type was never defined");
                    Err(CanonError::UnresolvedReference(TypeId(i as u32)))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArrayConstraints, Property};

    fn string(registry: &mut TypeRegistry) -> TypeReference {
        registry.register(TypeCandidate::primitive(PrimitiveKind::String)).unwrap()
    }

    #[test]
    fn identical_shapes_share_one_id() {
        let mut registry = TypeRegistry::new();
        let a = string(&mut registry);
        let b = string(&mut registry);
        assert_eq!(a, b);

        let list = |items| TypeKind::Array { items, constraints: ArrayConstraints::default() };
        let l1 = registry.register(TypeCandidate::new(list(a), NameHint::new("Tags"))).unwrap();
        let l2 = registry.register(TypeCandidate::new(list(a), NameHint::new("Labels"))).unwrap();
        assert_eq!(l1.type_id, l2.type_id);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve(l1.type_id).unwrap().name, "Tags");
    }

    #[test]
    fn edges_must_point_at_issued_ids() {
        let mut registry = TypeRegistry::new();
        let dangling = TypeKind::Array {
            items: TypeReference::new(TypeId(7)),
            constraints: ArrayConstraints::default(),
        };
        let err = registry.register(TypeCandidate::new(dangling, NameHint::new("Broken"))).unwrap_err();
        assert!(matches!(err, CanonError::UnresolvedReference(TypeId(7))));
        assert!(matches!(registry.resolve(TypeId(0)), Err(CanonError::UnresolvedReference(_))));
    }

    #[test]
    fn reserve_then_define_supports_self_reference() {
        let mut registry = TypeRegistry::new();
        let node = registry.reserve("#/components/schemas/Node", &NameHint::new("Node"));
        assert_eq!(registry.reserve("#/components/schemas/Node", &NameHint::new("Node")), node);

        let children = registry
            .register(TypeCandidate::new(
                TypeKind::Array { items: TypeReference::new(node), constraints: Default::default() },
                NameHint::new("NodeList"),
            ))
            .unwrap();
        let kind = TypeKind::Object {
            properties: vec![Property {
                name: "children".into(),
                ty: children,
                required: false,
                default: None,
                description: None,
            }],
            required_names: vec![],
            additional_properties: None,
        };
        registry.define(node, TypeCandidate::new(kind, NameHint::new("ignored"))).unwrap();

        let types = registry.into_types().unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].name, "Node");
    }

    #[test]
    fn undefined_reservation_is_rejected() {
        let mut registry = TypeRegistry::new();
        registry.reserve("#/x", &NameHint::new("X"));
        assert!(registry.into_types().is_err());
    }
}
