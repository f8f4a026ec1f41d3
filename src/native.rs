//! The orchestrator.
//!
//! `Native` owns the translation cache, the CDS handler, the rendering
//! policies and the event dispatcher. It is meant to be shared as
//! `Arc<Native>`: every method takes `&self`, and state lives behind locks
//! that are never held across an `.await`.

use crate::cache::{MemoryCache, TranslationCache};
use crate::cds::{CdsHandler, CdsResponse, CdsSetup, Language, PushOptions};
use crate::error::NativeError;
use crate::events::{Callback, Event, EventDispatcher};
use crate::icu::Params;
use crate::plurals;
use crate::rendering::{self, ErrorContext, ErrorPolicy, EscapeFn, MissingPolicy, SourceStringErrorPolicy};
use crate::retry::RetryConfig;
use crate::strings::{generate_key, SourceString};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

pub const DEFAULT_SOURCE_LANGUAGE: &str = "en";

/// Marker some cached plural translations start with instead of the plural
/// variable name.
const PLURAL_SENTINEL: &str = "{???";

/// Partial configuration. Only fields that are `Some` are applied.
#[derive(Debug, Clone, Default)]
pub struct Setup {
    pub source_language: Option<String>,
    /// Allow-list of language codes; `None` means every remote language
    pub languages: Option<Vec<String>>,
    pub token: Option<String>,
    pub secret: Option<String>,
    pub cds_host: Option<String>,
    pub fetch_all_languages: Option<bool>,
    pub filter_tags: Option<String>,
    pub filter_status: Option<String>,
    pub missing_policy: Option<MissingPolicy>,
    pub error_policy: Option<Arc<dyn ErrorPolicy>>,
    pub retry: Option<RetryConfig>,
}

#[derive(Debug)]
struct NativeState {
    source_language: String,
    current_language: Option<String>,
    configured_languages: Option<Vec<String>>,
    remote_languages: Option<Vec<Language>>,
    missing_policy: Arc<MissingPolicy>,
    error_policy: Arc<dyn ErrorPolicy>,
}

impl Default for NativeState {
    fn default() -> Self {
        Self {
            source_language: DEFAULT_SOURCE_LANGUAGE.to_string(),
            current_language: None,
            configured_languages: None,
            remote_languages: None,
            missing_policy: Arc::new(MissingPolicy::default()),
            error_policy: Arc::new(SourceStringErrorPolicy::default()),
        }
    }
}

#[derive(Debug)]
pub struct Native {
    state: RwLock<NativeState>,
    cache: Arc<dyn TranslationCache>,
    cds: CdsHandler,
    events: EventDispatcher,
}

impl Default for Native {
    fn default() -> Self {
        Self::new(Setup::default())
    }
}

impl Native {
    pub fn new(setup: Setup) -> Self {
        Self::with_cache(Arc::new(MemoryCache::new()), setup)
    }

    /// Build an orchestrator on top of a custom cache.
    pub fn with_cache(cache: Arc<dyn TranslationCache>, setup: Setup) -> Self {
        let native = Self {
            state: RwLock::new(NativeState::default()),
            cache,
            cds: CdsHandler::default(),
            events: EventDispatcher::new(),
        };
        native.setup(setup);
        native
    }

    fn state(&self) -> RwLockReadGuard<'_, NativeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, NativeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reconfigure. Fields left as `None` keep their current value, so this
    /// can be called any number of times.
    pub fn setup(&self, setup: Setup) {
        {
            let mut state = self.state_mut();
            if let Some(source_language) = setup.source_language {
                state.source_language = source_language;
            }
            if let Some(languages) = &setup.languages {
                state.configured_languages = Some(languages.clone());
            }
            if let Some(missing_policy) = setup.missing_policy {
                state.missing_policy = Arc::new(missing_policy);
            }
            if let Some(error_policy) = setup.error_policy {
                state.error_policy = error_policy;
            }
        }

        self.cds.setup(CdsSetup {
            token: setup.token,
            secret: setup.secret,
            host: setup.cds_host,
            configured_languages: setup.languages,
            fetch_all_languages: setup.fetch_all_languages,
            filter_tags: setup.filter_tags,
            filter_status: setup.filter_status,
            retry: setup.retry,
        });
    }

    pub fn source_language(&self) -> String {
        self.state().source_language.clone()
    }

    pub fn current_language(&self) -> Option<String> {
        self.state().current_language.clone()
    }

    /// Languages available to the application: the remote languages,
    /// narrowed to the configured allow-list if there is one.
    ///
    /// Remote languages are fetched once and then reused unless `refetch`
    /// is set. An empty answer is not kept, so a failed first fetch is
    /// retried on the next call.
    pub async fn get_languages(&self, refetch: bool) -> Vec<Language> {
        let cached = self.state().remote_languages.clone();
        let remote = match cached {
            Some(languages) if !refetch => languages,
            _ => {
                self.events.trigger(&Event::FetchingLanguages);
                let languages = self.cds.fetch_languages().await;
                if !languages.is_empty() {
                    self.state_mut().remote_languages = Some(languages.clone());
                }
                self.events.trigger(&Event::LanguagesFetched);
                languages
            }
        };

        match self.state().configured_languages.as_ref() {
            Some(configured) => remote
                .into_iter()
                .filter(|language| configured.contains(&language.code))
                .collect(),
            None => remote,
        }
    }

    async fn require_language(&self, language_code: &str) -> Result<(), NativeError> {
        let supported = self
            .get_languages(false)
            .await
            .iter()
            .any(|language| language.code == language_code);
        if supported {
            Ok(())
        } else {
            Err(NativeError::UnsupportedLanguage(language_code.to_string()))
        }
    }

    /// Make `language_code` the default target of [`translate`](Self::translate),
    /// fetching its translations first if none are cached.
    pub async fn set_current_language(&self, language_code: &str) -> Result<(), NativeError> {
        self.require_language(language_code).await?;
        if !self.cache.contains(language_code) {
            self.fetch_language(language_code).await;
        }

        let previous = self
            .state_mut()
            .current_language
            .replace(language_code.to_string());
        info!("Current language set to {}", language_code);
        self.events.trigger(&Event::CurrentLanguageChanged {
            previous,
            current: language_code.to_string(),
        });
        Ok(())
    }

    /// Refresh cached translations of one language, or of every available
    /// language in turn when `language_code` is `None`.
    pub async fn fetch_translations(&self, language_code: Option<&str>) -> Result<(), NativeError> {
        match language_code {
            Some(code) => {
                self.require_language(code).await?;
                self.fetch_language(code).await;
            }
            None => {
                for language in self.get_languages(false).await {
                    self.fetch_language(&language.code).await;
                }
            }
        }
        Ok(())
    }

    async fn fetch_language(&self, language_code: &str) {
        self.events.trigger(&Event::FetchingTranslations {
            language_code: language_code.to_string(),
        });
        let updates = self.cds.fetch_translations(Some(language_code)).await;
        let refreshed = updates.values().filter(|(refreshed, _)| *refreshed).count();
        self.cache.update(updates);
        debug!("Fetched translations for {} ({} refreshed)", language_code, refreshed);
        self.events.trigger(&Event::TranslationsFetched {
            language_code: language_code.to_string(),
        });
    }

    /// Translate and render `source_string`. Never fails.
    ///
    /// The target is `language_code`, else the current language, else the
    /// source language. The source language is rendered from the source
    /// string directly, without a cache lookup.
    pub fn translate(
        &self,
        source_string: &str,
        language_code: Option<&str>,
        context: &[&str],
        escape: Option<EscapeFn>,
        params: &Params,
    ) -> String {
        let (language, source_language, missing_policy, error_policy) = {
            let state = self.state();
            let language = language_code
                .map(str::to_string)
                .or_else(|| state.current_language.clone())
                .unwrap_or_else(|| state.source_language.clone());
            (
                language,
                state.source_language.clone(),
                Arc::clone(&state.missing_policy),
                Arc::clone(&state.error_policy),
            )
        };

        let translation = if language == source_language {
            Some(source_string.to_string())
        } else {
            self.cached_translation(source_string, &language, context)
        };

        match rendering::render(
            source_string,
            translation.as_deref(),
            &language,
            escape,
            Some(missing_policy.as_ref()),
            params,
        ) {
            Ok(rendered) => rendered,
            Err(_) => error_policy.get(&ErrorContext {
                source_string,
                translation: translation.as_deref(),
                language_code: &language,
                escape,
                params,
            }),
        }
    }

    fn cached_translation(&self, source_string: &str, language_code: &str, context: &[&str]) -> Option<String> {
        let template = self.cache.get(&generate_key(source_string, context), language_code)?;
        if let Some(rest) = template.strip_prefix(PLURAL_SENTINEL) {
            if let Some(variable) = plurals::plural_variable(source_string) {
                return Some(format!("{{{}{}", variable, rest));
            }
        }
        Some(template)
    }

    /// Push source strings to the CDS, returning its status and JSON body.
    pub async fn push_source_strings(
        &self,
        strings: &[SourceString],
        purge: bool,
    ) -> Result<(u16, serde_json::Value), NativeError> {
        self.push_source_strings_with(strings, PushOptions::purge(purge))
            .await
    }

    pub async fn push_source_strings_with(
        &self,
        strings: &[SourceString],
        options: PushOptions,
    ) -> Result<(u16, serde_json::Value), NativeError> {
        let response = self
            .cds
            .push_source_strings(strings, options)
            .await?
            .ok_or(NativeError::NoResponse("pushing source strings"))?;
        decode_response(response)
    }

    /// Refresh the CDS cache, or purge it.
    pub async fn invalidate_cache(&self, purge: bool) -> Result<(u16, serde_json::Value), NativeError> {
        let response = self
            .cds
            .invalidate_cache(purge)
            .await?
            .ok_or(NativeError::NoResponse("invalidating the cache"))?;
        decode_response(response)
    }

    pub fn on(&self, label: &str, callback: Callback) -> Result<(), NativeError> {
        self.events.on(label, callback)
    }

    pub fn off(&self, label: &str, callback: &Callback) -> Result<(), NativeError> {
        self.events.off(label, callback)
    }
}

fn decode_response(response: CdsResponse) -> Result<(u16, serde_json::Value), NativeError> {
    let body = if response.body.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&response.body)?
    };
    Ok((response.status, body))
}
