use crate::cds::DEFAULT_CDS_HOST;
use crate::native::{Setup, DEFAULT_SOURCE_LANGUAGE};
use crate::rendering::{MissingPolicy, SourceStringErrorPolicy};
use crate::scheduler::DEFAULT_SYNC_INTERVAL;
use crate::strings::split_list;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // CDS
    pub token: String,
    pub secret: Option<String>,
    pub cds_host: String,

    // Languages
    pub source_language: String,
    pub languages: Option<Vec<String>>,
    pub fetch_all_languages: bool,

    // Content filters
    pub filter_tags: Option<String>,
    pub filter_status: Option<String>,

    // Rendering
    pub missing_policy: MissingPolicy,
    pub error_text: String,

    // Background sync
    pub sync_interval: Duration,
}

/// An environment variable, with empty values treated as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let missing_policy = match optional_var("TRANSIFEX_MISSING_POLICY") {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid TRANSIFEX_MISSING_POLICY `{}`", value))?,
            None => MissingPolicy::default(),
        };

        Ok(Self {
            // CDS
            token: optional_var("TRANSIFEX_TOKEN").context("TRANSIFEX_TOKEN not set")?,
            secret: optional_var("TRANSIFEX_SECRET"),
            cds_host: optional_var("TRANSIFEX_CDS_HOST")
                .unwrap_or_else(|| DEFAULT_CDS_HOST.to_string()),

            // Languages
            source_language: optional_var("TRANSIFEX_SOURCE_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_SOURCE_LANGUAGE.to_string()),
            languages: optional_var("TRANSIFEX_LANGUAGES").map(|value| {
                split_list(&value)
                    .into_iter()
                    .filter(|code| !code.is_empty())
                    .collect()
            }),
            fetch_all_languages: optional_var("TRANSIFEX_FETCH_ALL_LANGUAGES")
                .map(|value| parse_flag(&value))
                .unwrap_or(false),

            // Content filters
            filter_tags: optional_var("TRANSIFEX_FILTER_TAGS"),
            filter_status: optional_var("TRANSIFEX_FILTER_STATUS"),

            // Rendering
            missing_policy,
            error_text: std::env::var("TRANSIFEX_ERROR_TEXT").unwrap_or_else(|_| "ERROR".to_string()),

            // Background sync
            sync_interval: optional_var("TRANSIFEX_SYNC_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SYNC_INTERVAL),
        })
    }

    /// Everything in this config as a full orchestrator setup.
    pub fn to_setup(&self) -> Setup {
        Setup {
            source_language: Some(self.source_language.clone()),
            languages: self.languages.clone(),
            token: Some(self.token.clone()),
            secret: self.secret.clone(),
            cds_host: Some(self.cds_host.clone()),
            fetch_all_languages: Some(self.fetch_all_languages),
            filter_tags: self.filter_tags.clone(),
            filter_status: self.filter_status.clone(),
            missing_policy: Some(self.missing_policy.clone()),
            error_policy: Some(Arc::new(SourceStringErrorPolicy::new(self.error_text.clone()))),
            retry: None,
        }
    }
}
