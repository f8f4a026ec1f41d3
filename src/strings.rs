//! Source strings and translation keys.
//!
//! A translation key is the join point between extraction, push and cache
//! lookup, so it must be derived the same way everywhere: an MD5 digest over
//! `string + ":" + context`, where a multi-part context is joined with `:`.

use md5::{Digest, Md5};
use serde::Serialize;
use std::collections::BTreeMap;

/// Compute the translation key of a source string and its context.
///
/// Identical `(string, context)` pairs always yield identical keys.
pub fn generate_key<S: AsRef<str>>(string: &str, context: &[S]) -> String {
    let context = context
        .iter()
        .map(|part| part.as_ref())
        .collect::<Vec<_>>()
        .join(":");
    let digest = Md5::digest(format!("{}:{}", string, context).as_bytes());
    format!("{:x}", digest)
}

/// Split a comma-separated list, trimming whitespace around each item.
pub fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|item| item.trim().to_string()).collect()
}

/// Input accepted wherever a list of strings is expected.
///
/// A single string is treated as a comma-separated list.
pub trait IntoStringList {
    fn into_string_list(self) -> Vec<String>;
}

impl IntoStringList for &str {
    fn into_string_list(self) -> Vec<String> {
        split_list(self)
    }
}

impl IntoStringList for String {
    fn into_string_list(self) -> Vec<String> {
        split_list(&self)
    }
}

impl IntoStringList for Vec<String> {
    fn into_string_list(self) -> Vec<String> {
        self
    }
}

impl IntoStringList for Vec<&str> {
    fn into_string_list(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoStringList for &[&str] {
    fn into_string_list(self) -> Vec<String> {
        self.iter().map(|item| item.to_string()).collect()
    }
}

/// A translatable string together with its metadata.
///
/// Tags and occurrences are always kept sorted so that two strings built
/// from the same data in a different order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceString {
    pub string: String,
    pub context: Option<Vec<String>>,
    pub character_limit: Option<u32>,
    pub developer_comment: Option<String>,
    pub tags: Vec<String>,
    pub occurrences: Vec<String>,
}

/// Metadata block sent alongside each string when pushing.
#[derive(Debug, Serialize, PartialEq)]
pub struct SourceStringMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_comment: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub occurrences: Vec<String>,
}

impl SourceString {
    pub fn new(string: impl Into<String>) -> Self {
        Self {
            string: string.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl IntoStringList) -> Self {
        let context = context.into_string_list();
        self.context = if context.iter().all(|part| part.is_empty()) {
            None
        } else {
            Some(context)
        };
        self
    }

    pub fn with_character_limit(mut self, limit: u32) -> Self {
        self.character_limit = Some(limit);
        self
    }

    pub fn with_developer_comment(mut self, comment: impl Into<String>) -> Self {
        self.developer_comment = Some(comment.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoStringList) -> Self {
        self.tags = sorted(tags.into_string_list());
        self
    }

    pub fn with_occurrences(mut self, occurrences: impl IntoStringList) -> Self {
        self.occurrences = sorted(occurrences.into_string_list());
        self
    }

    pub fn key(&self) -> String {
        let context: &[String] = self.context.as_deref().unwrap_or(&[]);
        generate_key(&self.string, context)
    }

    pub fn meta(&self) -> SourceStringMeta {
        SourceStringMeta {
            context: self.context.clone(),
            character_limit: self.character_limit,
            developer_comment: self.developer_comment.clone(),
            tags: self.tags.clone(),
            occurrences: self.occurrences.clone(),
        }
    }

    /// Fold another string with the same key into this one.
    fn merge(&mut self, other: SourceString) {
        if let Some(limit) = other.character_limit {
            if self.character_limit.map_or(true, |current| current > limit) {
                self.character_limit = Some(limit);
            }
        }
        if self.developer_comment.is_none() {
            self.developer_comment = other.developer_comment;
        }
        self.occurrences = union(&self.occurrences, other.occurrences);
        self.tags = union(&self.tags, other.tags);
    }
}

fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items
}

fn union(left: &[String], right: Vec<String>) -> Vec<String> {
    let mut items: Vec<String> = left.iter().cloned().chain(right).collect();
    items.sort();
    items.dedup();
    items
}

/// Collection of source strings, deduplicated by key.
///
/// Adding a string whose key is already present merges the metadata of the
/// two instead of keeping both.
#[derive(Debug, Clone, Default)]
pub struct SourceStringSet {
    strings: BTreeMap<String, SourceString>,
}

impl SourceStringSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, string: SourceString) {
        let key = string.key();
        match self.strings.get_mut(&key) {
            Some(existing) => existing.merge(string),
            None => {
                self.strings.insert(key, string);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&SourceString> {
        self.strings.get(key)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceString> {
        self.strings.values()
    }

    pub fn into_vec(self) -> Vec<SourceString> {
        self.strings.into_values().collect()
    }
}

impl Extend<SourceString> for SourceStringSet {
    fn extend<I: IntoIterator<Item = SourceString>>(&mut self, iter: I) {
        for string in iter {
            self.insert(string);
        }
    }
}

impl FromIterator<SourceString> for SourceStringSet {
    fn from_iter<I: IntoIterator<Item = SourceString>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_without_context() {
        // md5("hello:")
        let key = generate_key::<&str>("hello", &[]);
        assert_eq!(key.len(), 32);
        assert_eq!(key, generate_key::<&str>("hello", &[]));
        assert_ne!(key, generate_key::<&str>("hello ", &[]));
    }

    #[test]
    fn test_generate_key_context_joined_with_colon() {
        assert_eq!(
            generate_key("hello", &["one", "two"]),
            generate_key("hello", &["one:two"])
        );
        assert_ne!(generate_key("hello", &["one"]), generate_key::<&str>("hello", &[]));
    }

    #[test]
    fn test_blank_context_is_no_context() {
        let plain = SourceString::new("hello");
        let blank = SourceString::new("hello").with_context("");
        assert!(blank.context.is_none());
        assert_eq!(blank, plain);
        assert_eq!(blank.key(), plain.key());
        assert_eq!(SourceString::new("hello").with_context(vec![String::new()]), plain);
    }

    #[test]
    fn test_source_string_defaults() {
        let string = SourceString::new("something");
        assert_eq!(string.string, "something");
        assert!(string.context.is_none());
        assert!(string.developer_comment.is_none());
        assert!(string.character_limit.is_none());
        assert!(string.tags.is_empty());
    }

    #[test]
    fn test_source_string_comma_lists_are_normalized() {
        let string = SourceString::new("something")
            .with_context("one,two,three")
            .with_developer_comment("A crucial comment")
            .with_character_limit(33)
            .with_tags(" t3,t2 ,  t1");

        assert_eq!(
            string.context,
            Some(vec!["one".to_string(), "two".to_string(), "three".to_string()])
        );
        assert_eq!(string.tags, vec!["t1", "t2", "t3"]);
        assert_eq!(string.character_limit, Some(33));
    }

    #[test]
    fn test_source_string_list_input() {
        let string = SourceString::new("something").with_tags(vec!["t1", "t2", "t3"]);
        assert_eq!(string.tags, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_key_matches_generate_key() {
        let string = SourceString::new("hello").with_context("menu,button");
        assert_eq!(string.key(), generate_key("hello", &["menu", "button"]));
    }

    #[test]
    fn test_equality_covers_all_fields() {
        let a = SourceString::new("hello").with_occurrences("a.rs:1");
        let b = SourceString::new("hello").with_occurrences("a.rs:2");
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
        assert_eq!(a, SourceString::new("hello").with_occurrences(vec!["a.rs:1"]));
    }

    #[test]
    fn test_set_merges_same_key() {
        let mut set = SourceStringSet::new();
        set.insert(SourceString::new("hello world").with_occurrences("a.rs:1"));
        set.insert(
            SourceString::new("hello world")
                .with_character_limit(5)
                .with_occurrences("b.rs:7")
                .with_tags("a"),
        );
        set.insert(SourceString::new("hello world").with_character_limit(4).with_tags("b,a"));

        assert_eq!(set.len(), 1);
        let merged = set.iter().next().unwrap();
        assert_eq!(merged.character_limit, Some(4));
        assert_eq!(merged.occurrences, vec!["a.rs:1", "b.rs:7"]);
        assert_eq!(merged.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_set_keeps_different_contexts_apart() {
        let set: SourceStringSet = vec![
            SourceString::new("hello world"),
            SourceString::new("hello world").with_context("with_tags"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_set_keeps_first_developer_comment() {
        let mut set = SourceStringSet::new();
        set.insert(SourceString::new("x").with_developer_comment("first"));
        set.insert(SourceString::new("x").with_developer_comment("second"));

        let key = generate_key::<&str>("x", &[]);
        assert_eq!(
            set.get(&key).and_then(|s| s.developer_comment.as_deref()),
            Some("first")
        );
    }

    #[test]
    fn test_meta_serialization_skips_empty_fields() {
        let meta = SourceString::new("x").with_character_limit(10).meta();
        let json = serde_json::to_value(&meta).expect("serialize");
        assert_eq!(json, serde_json::json!({"character_limit": 10}));
    }
}
