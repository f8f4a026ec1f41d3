//! Client-side localization against the Transifex Content Delivery Service.
//!
//! Translations are fetched from the CDS into an in-memory cache and rendered
//! with ICU MessageFormat. [`Native`] ties the pieces together; a process-wide
//! instance is available through [`init`] and [`instance`].

pub mod cache;
pub mod cds;
pub mod config;
pub mod error;
pub mod events;
pub mod icu;
pub mod native;
pub mod plurals;
pub mod rendering;
pub mod retry;
pub mod scheduler;
pub mod strings;

#[cfg(test)]
mod test_utils;

use std::sync::{Arc, OnceLock};

pub use cache::{MemoryCache, TranslationCache};
pub use cds::{Language, PushOptions};
pub use config::Config;
pub use error::{CdsError, NativeError, RenderError};
pub use events::{Callback, Event, EventKind};
pub use icu::Params;
pub use native::{Native, Setup};
pub use rendering::{html_escape, ErrorPolicy, MissingPolicy, SourceStringErrorPolicy};
pub use scheduler::BackgroundSync;
pub use strings::{generate_key, SourceString, SourceStringSet};

/// Global instance (initialized once by [`init`])
static INSTANCE: OnceLock<Arc<Native>> = OnceLock::new();

/// Build the process-wide orchestrator from `config`.
///
/// Only the first call constructs it; later calls return the existing
/// instance unchanged. Reconfigure it through [`Native::setup`].
pub fn init(config: &Config) -> Arc<Native> {
    Arc::clone(INSTANCE.get_or_init(|| Arc::new(Native::new(config.to_setup()))))
}

/// The process-wide orchestrator, if [`init`] has been called.
pub fn instance() -> Option<Arc<Native>> {
    INSTANCE.get().cloned()
}
