//! Normalized structural fingerprints for the content-addressed cache.
//!
//! A fingerprint is computed once per candidate from its already-registered
//! children, so two inline nodes with the same shape hash to the same key no
//! matter how deeply they were nested in the source document. Names,
//! descriptions and defaults never participate.

use std::fmt::Write;

use crate::ir::{TypeKind, TypeReference};

fn edge(out: &mut String, r: &TypeReference) {
    let _ = write!(out, "{}{}", r.type_id.0, if r.nullable { "?" } else { "" });
}

pub fn fingerprint(kind: &TypeKind) -> String {
    let mut out = String::new();
    match kind {
        TypeKind::Primitive { primitive } => {
            let _ = write!(out, "prim:{}", primitive.as_str());
        }
        TypeKind::Object { properties, additional_properties, .. } => {
            let mut props: Vec<_> = properties.iter().collect();
            props.sort_by(|a, b| a.name.cmp(&b.name));
            out.push_str("obj{");
            for p in props {
                let _ = write!(out, "{:?}{}:", p.name, if p.required { "!" } else { "" });
                edge(&mut out, &p.ty);
                out.push(',');
            }
            out.push('}');
            if let Some(extra) = additional_properties {
                out.push('+');
                edge(&mut out, extra);
            }
        }
        TypeKind::Array { items, constraints } => {
            out.push_str("arr<");
            edge(&mut out, items);
            out.push('>');
            let _ = write!(
                out,
                "[{:?},{:?},{}]",
                constraints.min_items, constraints.max_items, constraints.unique_items
            );
        }
        TypeKind::Union { variants, discriminator } => {
            // Variant order is significant for tagged unions.
            out.push_str("union(");
            for v in variants {
                edge(&mut out, v);
                out.push('|');
            }
            out.push(')');
            if let Some(tag) = discriminator {
                let _ = write!(out, "@{tag:?}");
            }
        }
        TypeKind::Enum { values } => {
            let mut literals: Vec<_> = values.iter().map(|v| &v.value).collect();
            literals.sort();
            out.push_str("enum[");
            for lit in literals {
                let _ = write!(out, "{lit:?},");
            }
            out.push(']');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EnumLiteral, EnumValue, Property, TypeId};

    fn prop(name: &str, id: u32, required: bool) -> Property {
        Property {
            name: name.into(),
            ty: TypeReference::new(TypeId(id)),
            required,
            default: None,
            description: Some(format!("docs for {name}")),
        }
    }

    #[test]
    fn property_order_does_not_matter() {
        let a = TypeKind::Object {
            properties: vec![prop("id", 0, true), prop("tags", 1, false)],
            required_names: vec!["id".into()],
            additional_properties: None,
        };
        let b = TypeKind::Object {
            properties: vec![prop("tags", 1, false), prop("id", 0, true)],
            required_names: vec!["id".into()],
            additional_properties: None,
        };
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn requiredness_and_nullability_matter() {
        let required = TypeKind::Object {
            properties: vec![prop("id", 0, true)],
            required_names: vec!["id".into()],
            additional_properties: None,
        };
        let optional = TypeKind::Object {
            properties: vec![prop("id", 0, false)],
            required_names: vec![],
            additional_properties: None,
        };
        assert_ne!(fingerprint(&required), fingerprint(&optional));

        let plain = TypeKind::Array {
            items: TypeReference::new(TypeId(0)),
            constraints: Default::default(),
        };
        let nullable_items = TypeKind::Array {
            items: TypeReference::new(TypeId(0)).with_nullable(true),
            constraints: Default::default(),
        };
        assert_ne!(fingerprint(&plain), fingerprint(&nullable_items));
    }

    #[test]
    fn punctuation_in_property_names_stays_distinct() {
        let required_a = TypeKind::Object {
            properties: vec![prop("a", 0, true)],
            required_names: vec!["a".into()],
            additional_properties: None,
        };
        let optional_bang = TypeKind::Object {
            properties: vec![prop("a!", 0, false)],
            required_names: vec![],
            additional_properties: None,
        };
        assert_ne!(fingerprint(&required_a), fingerprint(&optional_bang));

        let split = TypeKind::Object {
            properties: vec![prop("x", 0, false), prop("y", 0, false)],
            required_names: vec![],
            additional_properties: None,
        };
        let joined = TypeKind::Object {
            properties: vec![prop("x:0,y", 0, false)],
            required_names: vec![],
            additional_properties: None,
        };
        assert_ne!(fingerprint(&split), fingerprint(&joined));
    }

    #[test]
    fn enum_literal_order_does_not_matter() {
        let v = |s: &str| EnumValue { name: s.to_uppercase(), value: EnumLiteral::String(s.into()) };
        let a = TypeKind::Enum { values: vec![v("on"), v("off")] };
        let b = TypeKind::Enum { values: vec![v("off"), v("on")] };
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }
}
