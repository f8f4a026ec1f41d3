//! Lifecycle events of the orchestrator.
//!
//! Event names form a closed set. Callbacks are notified in registration
//! order, outside of any lock, so a callback may register or remove other
//! callbacks.

use crate::error::NativeError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FetchingTranslations,
    TranslationsFetched,
    FetchingLanguages,
    LanguagesFetched,
    CurrentLanguageChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::FetchingTranslations,
        EventKind::TranslationsFetched,
        EventKind::FetchingLanguages,
        EventKind::LanguagesFetched,
        EventKind::CurrentLanguageChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FetchingTranslations => "FETCHING_TRANSLATIONS",
            EventKind::TranslationsFetched => "TRANSLATIONS_FETCHED",
            EventKind::FetchingLanguages => "FETCHING_LANGUAGES",
            EventKind::LanguagesFetched => "LANGUAGES_FETCHED",
            EventKind::CurrentLanguageChanged => "CURRENT_LANGUAGE_CHANGED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = NativeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| NativeError::UnknownEvent(s.to_string()))
    }
}

/// An event together with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    FetchingTranslations { language_code: String },
    TranslationsFetched { language_code: String },
    FetchingLanguages,
    LanguagesFetched,
    CurrentLanguageChanged {
        previous: Option<String>,
        current: String,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::FetchingTranslations { .. } => EventKind::FetchingTranslations,
            Event::TranslationsFetched { .. } => EventKind::TranslationsFetched,
            Event::FetchingLanguages => EventKind::FetchingLanguages,
            Event::LanguagesFetched => EventKind::LanguagesFetched,
            Event::CurrentLanguageChanged { .. } => EventKind::CurrentLanguageChanged,
        }
    }
}

/// A registered event handler. Identity is the `Arc` allocation, so keep a
/// clone of it to remove the handler later.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
pub struct EventDispatcher {
    callbacks: RwLock<HashMap<EventKind, Vec<Callback>>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks = self.callbacks.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<_, _> = callbacks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventDispatcher")
            .field("callbacks", &counts)
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for the event named `label`.
    ///
    /// Registering the same callback twice for one event is a no-op.
    pub fn on(&self, label: &str, callback: Callback) -> Result<(), NativeError> {
        let kind: EventKind = label.parse()?;
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        let registered = callbacks.entry(kind).or_default();
        if !registered.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
            registered.push(callback);
        }
        Ok(())
    }

    /// Remove a callback previously passed to [`on`](Self::on).
    pub fn off(&self, label: &str, callback: &Callback) -> Result<(), NativeError> {
        let kind: EventKind = label.parse()?;
        let mut callbacks = self.callbacks.write().unwrap_or_else(PoisonError::into_inner);
        let registered = callbacks.entry(kind).or_default();
        let position = registered
            .iter()
            .position(|existing| Arc::ptr_eq(existing, callback))
            .ok_or_else(|| NativeError::CallbackNotFound(kind.to_string()))?;
        registered.remove(position);
        Ok(())
    }

    pub fn trigger(&self, event: &Event) {
        let snapshot: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for callback in snapshot {
            callback(event);
        }
    }
}
