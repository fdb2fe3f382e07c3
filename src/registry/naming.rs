//! Identifier casing and collision-free type name allocation.
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Words are runs of: an uppercase letter followed by lowercase letters,
/// a run of uppercase letters not followed by lowercase, lowercase runs,
/// or digit runs. Everything else is a separator.
static WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Z]+(?:[a-z]+)?|[A-Z]?[a-z]+|[0-9]+").expect("static word regex")
});

static ACRONYM_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("static acronym regex"));

pub fn split_words(raw: &str) -> Vec<String> {
    // "HTTPResponse" → "HTTP_Response" so the acronym splits cleanly.
    let spaced = ACRONYM_SPLIT.replace_all(raw, "${1}_${2}");
    WORD.find_iter(&spaced).map(|m| m.as_str().to_string()).collect()
}

fn capitalize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Identifiers may not start with a digit in any target language.
fn guard_leading_digit(ident: String, prefix: &str) -> String {
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{prefix}{ident}")
    } else {
        ident
    }
}

pub fn to_pascal_case(raw: &str) -> String {
    let ident: String = split_words(raw).iter().map(|w| capitalize(w)).collect();
    guard_leading_digit(ident, "T")
}

pub fn to_camel_case(raw: &str) -> String {
    let words = split_words(raw);
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(&word.to_ascii_lowercase());
        } else {
            out.push_str(&capitalize(word));
        }
    }
    guard_leading_digit(out, "_")
}

pub fn to_snake_case(raw: &str) -> String {
    let words: Vec<String> = split_words(raw).iter().map(|w| w.to_ascii_lowercase()).collect();
    guard_leading_digit(words.join("_"), "_")
}

pub fn to_screaming_snake_case(raw: &str) -> String {
    let words: Vec<String> = split_words(raw).iter().map(|w| w.to_ascii_uppercase()).collect();
    guard_leading_digit(words.join("_"), "_")
}

/// Where a type was found, used to propose and qualify its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameHint {
    pub base: String,
    /// Enclosing names, outermost first (e.g. `["CreateUser"]`).
    pub context: Vec<String>,
}

impl NameHint {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into(), context: Vec::new() }
    }

    pub fn within(base: impl Into<String>, parent: &NameHint) -> Self {
        let mut context = parent.context.clone();
        context.push(parent.base.clone());
        Self { base: base.into(), context }
    }

    pub fn with_context(mut self, outer: impl Into<String>) -> Self {
        self.context.push(outer.into());
        self
    }

    /// Same context, base extended (`Pet` → `PetItem`).
    pub fn suffixed(&self, suffix: &str) -> Self {
        Self { base: format!("{}{suffix}", self.base), context: self.context.clone() }
    }

    /// Candidates in preference order: bare, then qualified by the nearest
    /// enclosing names, innermost first.
    fn candidates(&self) -> Vec<String> {
        let base = to_pascal_case(&self.base);
        let mut out = vec![base.clone()];
        let mut prefix = String::new();
        for outer in self.context.iter().rev() {
            let outer = to_pascal_case(outer);
            prefix = format!("{outer}{prefix}");
            if base.starts_with(&prefix) {
                continue;
            }
            out.push(format!("{prefix}{base}"));
        }
        out.retain(|c| !c.is_empty());
        if out.is_empty() {
            out.push(String::from("Anonymous"));
        }
        out
    }
}

/// Hands out names that are unique within one registry.
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
}

impl NameAllocator {
    pub fn allocate(&mut self, hint: &NameHint) -> String {
        let candidates = hint.candidates();
        for candidate in &candidates {
            if self.taken.insert(candidate.clone()) {
                return candidate.clone();
            }
        }
        let stem = candidates.last().cloned().unwrap_or_default();
        let mut n = 2;
        loop {
            let candidate = format!("{stem}{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Claims an exact name (used for primitive names which are not
    /// PascalCased).
    pub fn allocate_exact(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{name}{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casing() {
        assert_eq!(to_pascal_case("create_user"), "CreateUser");
        assert_eq!(to_pascal_case("HTTPResponse"), "HttpResponse");
        assert_eq!(to_pascal_case("urn:ietf:params:User"), "UrnIetfParamsUser");
        assert_eq!(to_pascal_case("2fa"), "T2Fa");
        assert_eq!(to_camel_case("next_cursor"), "nextCursor");
        assert_eq!(to_snake_case("nextCursor"), "next_cursor");
        assert_eq!(to_snake_case("userID"), "user_id");
        assert_eq!(to_screaming_snake_case("in-progress"), "IN_PROGRESS");
    }

    #[test]
    fn collisions_are_qualified_then_numbered() {
        let mut names = NameAllocator::default();
        let first = NameHint::new("address").with_context("User");
        let second = NameHint::new("address").with_context("Company");
        let third = NameHint::new("address").with_context("Company");
        assert_eq!(names.allocate(&first), "Address");
        assert_eq!(names.allocate(&second), "CompanyAddress");
        assert_eq!(names.allocate(&third), "CompanyAddress2");
    }

    #[test]
    fn qualification_skips_redundant_prefix() {
        let mut names = NameAllocator::default();
        names.allocate(&NameHint::new("CreateUserResponse"));
        let hint = NameHint::new("CreateUserResponse").with_context("CreateUser");
        assert_eq!(names.allocate(&hint), "CreateUserResponse2");
    }
}
