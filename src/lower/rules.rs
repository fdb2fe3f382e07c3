//! One lowering row per target language.
//!
//! Primitive tables are fixed-size arrays indexed by
//! [`PrimitiveKind::index`], so adding a primitive kind without extending
//! every row is a compile error.

use std::collections::BTreeSet;

use super::TargetLanguage;
use crate::ir::PrimitiveKind;

/// A target type expression with the import it needs, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar {
    pub name: &'static str,
    pub import: Option<&'static str>,
}

const fn plain(name: &'static str) -> Scalar {
    Scalar { name, import: None }
}

const fn imported(name: &'static str, import: &'static str) -> Scalar {
    Scalar { name, import: Some(import) }
}

impl Scalar {
    pub fn emit(&self, imports: &mut BTreeSet<String>) -> String {
        if let Some(import) = self.import {
            imports.insert(import.to_string());
        }
        self.name.to_string()
    }
}

/// A type constructor such as `List[{}]`. The `{}` marks the hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wrapper {
    pub template: &'static str,
    pub import: Option<&'static str>,
}

const fn wrapper(template: &'static str) -> Wrapper {
    Wrapper { template, import: None }
}

const fn imported_wrapper(template: &'static str, import: &'static str) -> Wrapper {
    Wrapper { template, import: Some(import) }
}

impl Wrapper {
    pub fn wrap(&self, inner: &str, imports: &mut BTreeSet<String>) -> String {
        if let Some(import) = self.import {
            imports.insert(import.to_string());
        }
        self.template.replacen("{}", inner, 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionLowering {
    /// Refer to the union by its generated type name.
    Named,
    /// No native sum type; fall back to the top type.
    TopType,
}

#[derive(Debug)]
pub struct LoweringRules {
    pub primitives: [Scalar; PrimitiveKind::COUNT],
    pub sequence: Wrapper,
    pub map: Wrapper,
    pub nullable: Wrapper,
    pub unions: UnionLowering,
    /// Used for degraded unions.
    pub top: Scalar,
    /// Whether `A | B` needs parentheses before a postfix sequence wrapper.
    pub parenthesize_compound: bool,
    /// Type names that would clash with the language itself.
    pub reserved: &'static [&'static str],
}

impl LoweringRules {
    pub fn scalar(&self, primitive: PrimitiveKind) -> &Scalar {
        &self.primitives[primitive.index()]
    }
}

pub fn rules(language: TargetLanguage) -> &'static LoweringRules {
    match language {
        TargetLanguage::TypeScript => &TYPESCRIPT,
        TargetLanguage::Python => &PYTHON,
        TargetLanguage::Rust => &RUST,
        TargetLanguage::Go => &GO,
        TargetLanguage::Java => &JAVA,
        TargetLanguage::CSharp => &CSHARP,
        TargetLanguage::Swift => &SWIFT,
    }
}

// Row order follows `PrimitiveKind`: string, integer, number, boolean,
// date-time, date, uuid, binary, any.

static TYPESCRIPT: LoweringRules = LoweringRules {
    primitives: [
        plain("string"),
        plain("number"),
        plain("number"),
        plain("boolean"),
        plain("string"),
        plain("string"),
        plain("string"),
        plain("Blob"),
        plain("any"),
    ],
    sequence: wrapper("{}[]"),
    map: wrapper("Record<string, {}>"),
    nullable: wrapper("{} | undefined"),
    unions: UnionLowering::Named,
    top: plain("any"),
    parenthesize_compound: true,
    reserved: &["Record", "Partial", "Promise", "Array", "Date", "Error", "Object", "Blob"],
};

static PYTHON: LoweringRules = LoweringRules {
    primitives: [
        plain("str"),
        plain("int"),
        plain("float"),
        plain("bool"),
        imported("datetime", "from datetime import datetime"),
        imported("date", "from datetime import date"),
        imported("UUID", "from uuid import UUID"),
        plain("bytes"),
        imported("Any", "from typing import Any"),
    ],
    sequence: imported_wrapper("List[{}]", "from typing import List"),
    map: imported_wrapper("Dict[str, {}]", "from typing import Dict"),
    nullable: imported_wrapper("Optional[{}]", "from typing import Optional"),
    unions: UnionLowering::Named,
    top: imported("Any", "from typing import Any"),
    parenthesize_compound: false,
    reserved: &["List", "Dict", "Optional", "Any", "Union", "Literal", "Enum", "BaseModel"],
};

static RUST: LoweringRules = LoweringRules {
    primitives: [
        plain("String"),
        plain("i64"),
        plain("f64"),
        plain("bool"),
        imported("DateTime<Utc>", "use chrono::{DateTime, Utc};"),
        imported("NaiveDate", "use chrono::NaiveDate;"),
        imported("Uuid", "use uuid::Uuid;"),
        plain("Vec<u8>"),
        plain("serde_json::Value"),
    ],
    sequence: wrapper("Vec<{}>"),
    map: imported_wrapper("HashMap<String, {}>", "use std::collections::HashMap;"),
    nullable: wrapper("Option<{}>"),
    unions: UnionLowering::Named,
    top: plain("serde_json::Value"),
    parenthesize_compound: false,
    reserved: &["Self", "Option", "Result", "String", "Vec", "Box", "HashMap", "Client", "Error"],
};

static GO: LoweringRules = LoweringRules {
    primitives: [
        plain("string"),
        plain("int64"),
        plain("float64"),
        plain("bool"),
        imported("time.Time", "time"),
        imported("time.Time", "time"),
        plain("string"),
        plain("[]byte"),
        plain("interface{}"),
    ],
    sequence: wrapper("[]{}"),
    map: wrapper("map[string]{}"),
    nullable: wrapper("*{}"),
    unions: UnionLowering::TopType,
    top: plain("interface{}"),
    parenthesize_compound: false,
    reserved: &["Client", "Error"],
};

static JAVA: LoweringRules = LoweringRules {
    primitives: [
        plain("String"),
        plain("Long"),
        plain("Double"),
        plain("Boolean"),
        imported("OffsetDateTime", "java.time.OffsetDateTime"),
        imported("LocalDate", "java.time.LocalDate"),
        imported("UUID", "java.util.UUID"),
        plain("byte[]"),
        plain("Object"),
    ],
    sequence: imported_wrapper("List<{}>", "java.util.List"),
    map: imported_wrapper("Map<String, {}>", "java.util.Map"),
    nullable: imported_wrapper("Optional<{}>", "java.util.Optional"),
    unions: UnionLowering::TopType,
    top: plain("Object"),
    parenthesize_compound: false,
    reserved: &["Object", "String", "List", "Map", "Optional", "Class", "Record"],
};

static CSHARP: LoweringRules = LoweringRules {
    primitives: [
        plain("string"),
        plain("long"),
        plain("double"),
        plain("bool"),
        imported("DateTimeOffset", "System"),
        imported("DateOnly", "System"),
        imported("Guid", "System"),
        plain("byte[]"),
        plain("object"),
    ],
    sequence: imported_wrapper("List<{}>", "System.Collections.Generic"),
    map: imported_wrapper("Dictionary<string, {}>", "System.Collections.Generic"),
    nullable: wrapper("{}?"),
    unions: UnionLowering::TopType,
    top: plain("object"),
    parenthesize_compound: false,
    reserved: &["Object", "String", "Task", "List", "Dictionary", "Exception"],
};

static SWIFT: LoweringRules = LoweringRules {
    primitives: [
        plain("String"),
        plain("Int64"),
        plain("Double"),
        plain("Bool"),
        imported("Date", "Foundation"),
        imported("Date", "Foundation"),
        imported("UUID", "Foundation"),
        imported("Data", "Foundation"),
        imported("AnyCodable", "AnyCodable"),
    ],
    sequence: wrapper("[{}]"),
    map: wrapper("[String: {}]"),
    nullable: wrapper("{}?"),
    unions: UnionLowering::Named,
    top: imported("AnyCodable", "AnyCodable"),
    parenthesize_compound: false,
    reserved: &["Type", "Self", "Protocol", "Error", "Data", "Date"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_follow_each_language() {
        let integer: Vec<&str> = TargetLanguage::ALL
            .iter()
            .map(|l| rules(*l).scalar(PrimitiveKind::Integer).name)
            .collect();
        assert_eq!(integer, vec!["number", "int", "i64", "int64", "Long", "long", "Int64"]);
    }

    #[test]
    fn wrappers_record_imports() {
        let mut imports = BTreeSet::new();
        let out = rules(TargetLanguage::Java).sequence.wrap("String", &mut imports);
        assert_eq!(out, "List<String>");
        assert!(imports.contains("java.util.List"));
    }
}
