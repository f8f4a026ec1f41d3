//! Translation cache.
//!
//! Translations are stored per language as an immutable map behind an `Arc`.
//! A refresh builds the new map first and swaps it in under the write lock,
//! so readers see either the old or the new map, never a mix.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// One entry of a CDS content payload: `{"string": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Translation {
    #[serde(default)]
    pub string: Option<String>,
}

impl Translation {
    pub fn new(string: impl Into<String>) -> Self {
        Self {
            string: Some(string.into()),
        }
    }
}

/// Translations of one language, by translation key.
pub type TranslationMap = HashMap<String, Translation>;

/// Per-language fetch results: `(refreshed, translations)`.
///
/// `refreshed == false` means "not modified" (or failed) and must leave the
/// cached language untouched.
pub type LanguageUpdates = HashMap<String, (bool, TranslationMap)>;

/// Key-value contract between the orchestrator and its translation store.
pub trait TranslationCache: Send + Sync + fmt::Debug {
    /// The translation for `key` in `language_code`, if one is cached.
    fn get(&self, key: &str, language_code: &str) -> Option<String>;

    /// Replace the whole map of every language flagged as refreshed.
    fn update(&self, data: LanguageUpdates);

    /// Whether `language_code` has been fetched at least once.
    fn contains(&self, language_code: &str) -> bool;
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    translations_by_language: RwLock<HashMap<String, Arc<TranslationMap>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TranslationCache for MemoryCache {
    fn get(&self, key: &str, language_code: &str) -> Option<String> {
        let translations = self
            .translations_by_language
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(language_code)
            .cloned()?;
        translations.get(key)?.string.clone()
    }

    fn update(&self, data: LanguageUpdates) {
        let refreshed: Vec<(String, Arc<TranslationMap>)> = data
            .into_iter()
            .filter(|(_, (should_replace, _))| *should_replace)
            .map(|(language, (_, translations))| (language, Arc::new(translations)))
            .collect();
        if refreshed.is_empty() {
            return;
        }

        let mut languages = self
            .translations_by_language
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        languages.extend(refreshed);
    }

    fn contains(&self, language_code: &str) -> bool {
        self.translations_by_language
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(language_code)
    }
}
