//! Cross-language type lowering.
//!
//! A [`TypeMapper`] is bound to one schema snapshot, one target language and
//! one set of options, and maps [`TypeReference`]s to target type
//! expressions. It is pure: the same input always yields the same
//! [`MappedType`], imports included.
pub mod rules;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CanonError, Result};
use crate::ir::{CanonicalSchema, TypeDefinition, TypeId, TypeKind, TypeReference};
use crate::registry::naming::{to_pascal_case, NameAllocator};

pub use rules::{rules, LoweringRules, Scalar, UnionLowering, Wrapper};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TargetLanguage {
    #[value(name = "typescript", alias = "ts")]
    TypeScript,
    #[value(name = "python", alias = "py")]
    Python,
    #[value(name = "rust", alias = "rs")]
    Rust,
    #[value(name = "go")]
    Go,
    #[value(name = "java")]
    Java,
    #[value(name = "csharp", alias = "cs")]
    CSharp,
    #[value(name = "swift")]
    Swift,
}

impl TargetLanguage {
    pub const ALL: [TargetLanguage; 7] = [
        TargetLanguage::TypeScript,
        TargetLanguage::Python,
        TargetLanguage::Rust,
        TargetLanguage::Go,
        TargetLanguage::Java,
        TargetLanguage::CSharp,
        TargetLanguage::Swift,
    ];

    /// Directory and map-key form.
    pub fn slug(self) -> &'static str {
        match self {
            TargetLanguage::TypeScript => "typescript",
            TargetLanguage::Python => "python",
            TargetLanguage::Rust => "rust",
            TargetLanguage::Go => "go",
            TargetLanguage::Java => "java",
            TargetLanguage::CSharp => "csharp",
            TargetLanguage::Swift => "swift",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetLanguage::TypeScript => "TypeScript",
            TargetLanguage::Python => "Python",
            TargetLanguage::Rust => "Rust",
            TargetLanguage::Go => "Go",
            TargetLanguage::Java => "Java",
            TargetLanguage::CSharp => "C#",
            TargetLanguage::Swift => "Swift",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MapperOptions {
    /// Lower every union to the target's top type.
    pub degrade_unions: bool,
    /// Canonical type name → verbatim target expression.
    pub overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    pub expression: String,
    pub imports: BTreeSet<String>,
    pub nullable: bool,
}

/// Read-only ID → definition index over one schema.
#[derive(Debug, Clone)]
pub struct TypeTable<'s> {
    by_id: HashMap<TypeId, &'s TypeDefinition>,
}

impl<'s> TypeTable<'s> {
    pub fn new(schema: &'s CanonicalSchema) -> Self {
        Self::from_types(&schema.types)
    }

    pub fn from_types(types: &'s [TypeDefinition]) -> Self {
        Self { by_id: types.iter().map(|t| (t.id, t)).collect() }
    }

    pub fn resolve(&self, id: TypeId) -> Result<&'s TypeDefinition> {
        self.by_id.get(&id).copied().ok_or(CanonError::UnresolvedReference(id))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// MAPPER
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct TypeMapper<'s> {
    table: TypeTable<'s>,
    language: TargetLanguage,
    rules: &'static LoweringRules,
    options: MapperOptions,
    /// Declaration name per nominal type, unique after casing and escaping.
    names: HashMap<TypeId, String>,
}

impl<'s> TypeMapper<'s> {
    pub fn new(table: TypeTable<'s>, language: TargetLanguage, options: MapperOptions) -> Self {
        let rules = rules(language);
        let names = declaration_names(&table, rules);
        Self { table, language, rules, options, names }
    }

    pub fn for_schema(schema: &'s CanonicalSchema, language: TargetLanguage, options: MapperOptions) -> Self {
        Self::new(TypeTable::new(schema), language, options)
    }

    pub fn language(&self) -> TargetLanguage {
        self.language
    }

    pub fn rules(&self) -> &'static LoweringRules {
        self.rules
    }

    pub fn table(&self) -> &TypeTable<'s> {
        &self.table
    }

    /// Whether unions lower to the top type for this language.
    pub fn degrades_unions(&self) -> bool {
        self.options.degrade_unions || self.rules.unions == UnionLowering::TopType
    }

    pub fn map(&self, reference: TypeReference) -> Result<MappedType> {
        let mut imports = BTreeSet::new();
        let expression = self.edge(reference, &mut imports)?;
        Ok(MappedType { expression, imports, nullable: reference.nullable })
    }

    /// The declaration name for a nominal type (object, enum, union).
    pub fn type_name(&self, def: &TypeDefinition) -> String {
        match self.names.get(&def.id) {
            Some(name) => name.clone(),
            None => escape_reserved(to_pascal_case(&def.name), self.rules).0,
        }
    }

    fn edge(&self, reference: TypeReference, imports: &mut BTreeSet<String>) -> Result<String> {
        let base = self.expression(reference.type_id, imports)?;
        if reference.nullable {
            Ok(self.rules.nullable.wrap(&base, imports))
        } else {
            Ok(base)
        }
    }

    fn expression(&self, id: TypeId, imports: &mut BTreeSet<String>) -> Result<String> {
        let def = self.table.resolve(id)?;
        if let Some(custom) = self.options.overrides.get(&def.name) {
            return Ok(custom.clone());
        }
        match &def.kind {
            TypeKind::Primitive { primitive } => Ok(self.rules.scalar(*primitive).emit(imports)),
            TypeKind::Object { properties, additional_properties: Some(value), .. } if properties.is_empty() => {
                let value = self.edge(*value, imports)?;
                Ok(self.rules.map.wrap(&value, imports))
            }
            TypeKind::Object { .. } | TypeKind::Enum { .. } => Ok(self.type_name(def)),
            TypeKind::Array { items, .. } => {
                let mut item = self.edge(*items, imports)?;
                if self.rules.parenthesize_compound && item.contains(" | ") {
                    item = format!("({item})");
                }
                Ok(self.rules.sequence.wrap(&item, imports))
            }
            TypeKind::Union { .. } => {
                if self.degrades_unions() {
                    Ok(self.rules.top.emit(imports))
                } else {
                    Ok(self.type_name(def))
                }
            }
        }
    }
}

fn escape_reserved(ident: String, rules: &LoweringRules) -> (String, bool) {
    if rules.reserved.contains(&ident.as_str()) { (format!("{ident}Model"), true) } else { (ident, false) }
}

fn is_declared(def: &TypeDefinition) -> bool {
    match &def.kind {
        TypeKind::Object { properties, additional_properties, .. } => {
            !properties.is_empty() || additional_properties.is_none()
        }
        TypeKind::Enum { .. } | TypeKind::Union { .. } => true,
        TypeKind::Primitive { .. } | TypeKind::Array { .. } => false,
    }
}

/// Cased registry names can collide (`user_id` and `UserId`), and so can an
/// escaped name with a declared one (`Error` and `ErrorModel`). Unescaped
/// names are claimed first, each group in id order; later claimants get a
/// numeric suffix.
fn declaration_names(table: &TypeTable<'_>, rules: &LoweringRules) -> HashMap<TypeId, String> {
    let mut pending: Vec<(bool, TypeId, String)> = table
        .by_id
        .values()
        .filter(|def| is_declared(def))
        .map(|def| {
            let (ident, escaped) = escape_reserved(to_pascal_case(&def.name), rules);
            (escaped, def.id, ident)
        })
        .collect();
    pending.sort();
    let mut allocator = NameAllocator::default();
    pending.into_iter().map(|(_, id, ident)| (id, allocator.allocate_exact(&ident))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArrayConstraints, EnumLiteral, EnumValue, PrimitiveKind, Property};

    fn def(id: u32, name: &str, kind: TypeKind) -> TypeDefinition {
        TypeDefinition { id: TypeId(id), name: name.into(), description: None, deprecated: false, kind }
    }

    fn r(id: u32) -> TypeReference {
        TypeReference::new(TypeId(id))
    }

    /// string, string[], Pet, Status, Pet|string, map<string>, string?[]
    fn sample() -> Vec<TypeDefinition> {
        vec![
            def(0, "string", TypeKind::Primitive { primitive: PrimitiveKind::String }),
            def(1, "Tags", TypeKind::Array { items: r(0), constraints: ArrayConstraints::default() }),
            def(
                2,
                "Pet",
                TypeKind::Object {
                    properties: vec![Property {
                        name: "name".into(),
                        ty: r(0),
                        required: true,
                        default: None,
                        description: None,
                    }],
                    required_names: vec!["name".into()],
                    additional_properties: None,
                },
            ),
            def(
                3,
                "Status",
                TypeKind::Enum {
                    values: vec![EnumValue { name: "ON".into(), value: EnumLiteral::String("on".into()) }],
                },
            ),
            def(4, "PetOrName", TypeKind::Union { variants: vec![r(2), r(0)], discriminator: None }),
            def(
                5,
                "Labels",
                TypeKind::Object { properties: vec![], required_names: vec![], additional_properties: Some(r(0)) },
            ),
            def(
                6,
                "Holes",
                TypeKind::Array { items: r(0).with_nullable(true), constraints: ArrayConstraints::default() },
            ),
        ]
    }

    fn mapper(types: &[TypeDefinition], language: TargetLanguage) -> TypeMapper<'_> {
        TypeMapper::new(TypeTable::from_types(types), language, MapperOptions::default())
    }

    #[test]
    fn nullable_string_list() {
        let types = sample();
        let reference = r(1).with_nullable(true);

        let ts = mapper(&types, TargetLanguage::TypeScript).map(reference).unwrap();
        assert_eq!(ts.expression, "string[] | undefined");
        assert!(ts.imports.is_empty());
        assert!(ts.nullable);

        let py = mapper(&types, TargetLanguage::Python).map(reference).unwrap();
        assert_eq!(py.expression, "Optional[List[str]]");
        let expected: BTreeSet<String> =
            ["from typing import Optional", "from typing import List"].iter().map(|s| s.to_string()).collect();
        assert_eq!(py.imports, expected);

        let expressions: Vec<String> = TargetLanguage::ALL
            .iter()
            .map(|l| mapper(&types, *l).map(reference).unwrap().expression)
            .collect();
        assert_eq!(
            expressions,
            vec![
                "string[] | undefined",
                "Optional[List[str]]",
                "Option<Vec<String>>",
                "*[]string",
                "Optional<List<String>>",
                "List<string>?",
                "[String]?",
            ]
        );
    }

    #[test]
    fn compound_items_are_parenthesized() {
        let types = sample();
        assert_eq!(mapper(&types, TargetLanguage::TypeScript).map(r(6)).unwrap().expression, "(string | undefined)[]");
        assert_eq!(mapper(&types, TargetLanguage::Python).map(r(6)).unwrap().expression, "List[Optional[str]]");
    }

    #[test]
    fn unions_are_named_or_degraded() {
        let types = sample();
        let union = r(4);
        assert_eq!(mapper(&types, TargetLanguage::Rust).map(union).unwrap().expression, "PetOrName");
        assert_eq!(mapper(&types, TargetLanguage::Go).map(union).unwrap().expression, "interface{}");
        assert_eq!(mapper(&types, TargetLanguage::Java).map(union).unwrap().expression, "Object");
        assert_eq!(mapper(&types, TargetLanguage::CSharp).map(union).unwrap().expression, "object");

        let degraded = MapperOptions { degrade_unions: true, ..Default::default() };
        let expect = [
            (TargetLanguage::TypeScript, "any"),
            (TargetLanguage::Python, "Any"),
            (TargetLanguage::Rust, "serde_json::Value"),
            (TargetLanguage::Swift, "AnyCodable"),
        ];
        for (language, top) in expect {
            let m = TypeMapper::new(TypeTable::from_types(&types), language, degraded.clone());
            assert_eq!(m.map(union).unwrap().expression, top, "{language}");
        }
    }

    #[test]
    fn maps_and_overrides() {
        let types = sample();
        let rust = mapper(&types, TargetLanguage::Rust).map(r(5)).unwrap();
        assert_eq!(rust.expression, "HashMap<String, String>");
        assert!(rust.imports.contains("use std::collections::HashMap;"));

        let options = MapperOptions {
            overrides: [("Pet".to_string(), "acme::Pet".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let m = TypeMapper::new(TypeTable::from_types(&types), TargetLanguage::Rust, options);
        assert_eq!(m.map(r(2)).unwrap().expression, "acme::Pet");
    }

    #[test]
    fn mapping_is_total_and_deterministic() {
        let mut types = sample();
        let base = types.len() as u32;
        for (i, primitive) in PrimitiveKind::ALL.iter().enumerate() {
            types.push(def(base + i as u32, primitive.as_str(), TypeKind::Primitive { primitive: *primitive }));
        }
        for language in TargetLanguage::ALL {
            let m = mapper(&types, language);
            for t in &types {
                for nullable in [false, true] {
                    let reference = TypeReference::new(t.id).with_nullable(nullable);
                    let first = m.map(reference).unwrap();
                    assert!(!first.expression.is_empty(), "{language} {}", t.name);
                    assert_eq!(first, m.map(reference).unwrap());
                }
            }
        }
    }

    #[test]
    fn unknown_ids_are_errors() {
        let types = sample();
        let err = mapper(&types, TargetLanguage::Go).map(r(99)).unwrap_err();
        assert!(matches!(err, CanonError::UnresolvedReference(TypeId(99))));
    }

    #[test]
    fn escaped_and_cased_names_stay_unique() {
        let object = || TypeKind::Object { properties: vec![], required_names: vec![], additional_properties: None };
        let types = vec![
            def(0, "Error", object()),
            def(1, "ErrorModel", object()),
            def(2, "user_id", object()),
            def(3, "UserId", object()),
        ];
        let rust = mapper(&types, TargetLanguage::Rust);
        let names: Vec<String> = types.iter().map(|t| rust.type_name(t)).collect();
        assert_eq!(names, vec!["ErrorModel2", "ErrorModel", "UserId", "UserId2"]);
        assert_eq!(rust.map(r(0)).unwrap().expression, "ErrorModel2");

        let python = mapper(&types, TargetLanguage::Python);
        assert_eq!(python.type_name(&types[0]), "Error");
    }
}
