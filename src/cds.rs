//! Client for the Content Delivery Service.
//!
//! Every network or HTTP failure is logged under a fixed category and turned
//! into an empty result, so a flaky CDS never breaks the host application.
//! The only error returned to callers is a missing secret on the operations
//! that need one.

use crate::cache::{LanguageUpdates, TranslationMap};
use crate::error::CdsError;
use crate::retry::{with_retry_if, RetryConfig};
use crate::strings::{SourceString, SourceStringMeta};
use reqwest::header::{ACCEPT_ENCODING, AUTHORIZATION, ETAG, IF_NONE_MATCH};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, error, info, warn};

pub const DEFAULT_CDS_HOST: &str = "https://cds.svc.transifex.net";

const SDK_HEADER: &str = "X-NATIVE-SDK";
const SDK_NAME: &str = "rust";

const LANGUAGES_ERROR: &str = "Error retrieving languages from CDS";
const TRANSLATIONS_ERROR: &str = "Error retrieving translations from CDS";
const PUSH_ERROR: &str = "Error pushing source strings to CDS";
const INVALIDATE_ERROR: &str = "Error invalidating CDS cache";

/// A language as listed by the CDS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtl: Option<bool>,
}

impl Language {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: None,
            localized_name: None,
            rtl: None,
        }
    }
}

/// Partial configuration of the handler; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct CdsSetup {
    pub token: Option<String>,
    pub secret: Option<String>,
    pub host: Option<String>,
    /// Allow-list applied when fetching translations without a language
    pub configured_languages: Option<Vec<String>>,
    pub fetch_all_languages: Option<bool>,
    pub filter_tags: Option<String>,
    pub filter_status: Option<String>,
    pub retry: Option<RetryConfig>,
}

/// Flags sent in the `meta` block of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PushOptions {
    pub purge: bool,
    pub keep_translations: bool,
    pub override_tags: bool,
    pub override_occurrences: bool,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            purge: false,
            keep_translations: true,
            override_tags: false,
            override_occurrences: false,
        }
    }
}

impl PushOptions {
    pub fn purge(purge: bool) -> Self {
        Self {
            purge,
            ..Default::default()
        }
    }
}

/// Raw answer to a push or invalidate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdsResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
struct CdsSettings {
    token: String,
    secret: Option<String>,
    host: String,
    configured_languages: Option<Vec<String>>,
    fetch_all_languages: bool,
    filter_tags: Option<String>,
    filter_status: Option<String>,
    retry: RetryConfig,
}

impl Default for CdsSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            secret: None,
            host: DEFAULT_CDS_HOST.to_string(),
            configured_languages: None,
            fetch_all_languages: false,
            filter_tags: None,
            filter_status: None,
            retry: RetryConfig::cds(),
        }
    }
}

impl CdsSettings {
    fn apply(&mut self, setup: CdsSetup) {
        if let Some(token) = setup.token {
            self.token = token;
        }
        if let Some(secret) = setup.secret {
            self.secret = Some(secret);
        }
        if let Some(host) = setup.host {
            self.host = host.trim_end_matches('/').to_string();
        }
        if let Some(languages) = setup.configured_languages {
            self.configured_languages = Some(languages);
        }
        if let Some(fetch_all) = setup.fetch_all_languages {
            self.fetch_all_languages = fetch_all;
        }
        if let Some(tags) = setup.filter_tags {
            self.filter_tags = Some(tags);
        }
        if let Some(status) = setup.filter_status {
            self.filter_status = Some(status);
        }
        if let Some(mut retry) = setup.retry {
            if retry.max_attempts == 0 {
                warn!("Retry max_attempts must be at least 1, using 1");
                retry.max_attempts = 1;
            }
            self.retry = retry;
        }
    }

    fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|secret| !secret.is_empty())
    }
}

/// ETag per language code; unknown languages yield an empty tag.
#[derive(Debug, Default)]
struct EtagStore {
    etags: RwLock<HashMap<String, String>>,
}

impl EtagStore {
    fn get(&self, language_code: &str) -> String {
        self.etags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(language_code)
            .cloned()
            .unwrap_or_default()
    }

    fn set(&self, language_code: &str, etag: String) {
        self.etags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(language_code.to_string(), etag);
    }
}

/// Why a request produced no data. Displayed after the category prefix.
#[derive(Debug)]
enum RequestFailure {
    Malformed,
    Connection,
    Unknown(String),
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestFailure::Malformed => write!(f, "Malformed response"),
            RequestFailure::Connection => write!(f, "ConnectionError"),
            RequestFailure::Unknown(detail) => write!(f, "UnknownError (`{}`)", detail),
        }
    }
}

impl From<reqwest::Error> for RequestFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            RequestFailure::Connection
        } else if err.is_decode() {
            RequestFailure::Malformed
        } else {
            RequestFailure::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RequestFailure {
    fn from(_: serde_json::Error) -> Self {
        RequestFailure::Malformed
    }
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Serialize)]
struct PushEntry<'a> {
    string: &'a str,
    meta: SourceStringMeta,
}

#[derive(Serialize)]
struct PushPayload<'a> {
    data: BTreeMap<String, PushEntry<'a>>,
    meta: PushOptions,
}

/// Outcomes worth another attempt: not ready yet, server errors, and
/// requests that never reached the server.
fn is_transient(outcome: &Result<Response, reqwest::Error>) -> bool {
    match outcome {
        Ok(response) => {
            response.status() == StatusCode::ACCEPTED || response.status().is_server_error()
        }
        Err(err) => err.is_connect() || err.is_timeout(),
    }
}

fn ensure_success(response: Response) -> Result<Response, RequestFailure> {
    let status = response.status();
    if status == StatusCode::ACCEPTED {
        return Err(RequestFailure::Unknown(format!(
            "content still processing ({})",
            status
        )));
    }
    if !status.is_success() {
        return Err(RequestFailure::Unknown(format!("HTTP status {}", status)));
    }
    Ok(response)
}

/// Handles all communication with the CDS.
#[derive(Debug)]
pub struct CdsHandler {
    client: reqwest::Client,
    settings: RwLock<CdsSettings>,
    etags: EtagStore,
}

impl Default for CdsHandler {
    fn default() -> Self {
        Self::new(CdsSetup::default())
    }
}

impl CdsHandler {
    pub fn new(setup: CdsSetup) -> Self {
        let handler = Self {
            client: reqwest::Client::new(),
            settings: RwLock::new(CdsSettings::default()),
            etags: EtagStore::default(),
        };
        handler.setup(setup);
        handler
    }

    /// Overwrite the provided fields and keep the rest.
    pub fn setup(&self, setup: CdsSetup) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(setup);
    }

    fn settings(&self) -> CdsSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch the languages of the project. Empty on any failure.
    pub async fn fetch_languages(&self) -> Vec<Language> {
        let settings = self.settings();
        match self.try_fetch_languages(&settings).await {
            Ok(languages) => {
                debug!("Fetched {} languages from CDS", languages.len());
                languages
            }
            Err(failure) => {
                error!("{}: {}", LANGUAGES_ERROR, failure);
                Vec::new()
            }
        }
    }

    async fn try_fetch_languages(
        &self,
        settings: &CdsSettings,
    ) -> Result<Vec<Language>, RequestFailure> {
        let url = format!("{}/languages", settings.host);
        let response = self.retry_get_request(settings, &url, "", &[]).await?;
        let body = ensure_success(response)?.text().await?;
        let payload: DataEnvelope<Vec<Language>> = serde_json::from_str(&body)?;
        Ok(payload.data)
    }

    /// Fetch translations of one language, or of every target language when
    /// `language_code` is `None`.
    ///
    /// Each language is fetched on its own: a failure yields `(false, {})`
    /// for that language and does not affect the others.
    pub async fn fetch_translations(&self, language_code: Option<&str>) -> LanguageUpdates {
        let settings = self.settings();
        let language_codes = match language_code {
            Some(code) => vec![code.to_string()],
            None => self.target_language_codes(&settings).await,
        };

        let mut updates = LanguageUpdates::new();
        for code in language_codes {
            let outcome = match self.try_fetch_content(&settings, &code).await {
                Ok(outcome) => outcome,
                Err(failure) => {
                    error!("{}: {}", TRANSLATIONS_ERROR, failure);
                    (false, TranslationMap::new())
                }
            };
            updates.insert(code, outcome);
        }
        updates
    }

    async fn target_language_codes(&self, settings: &CdsSettings) -> Vec<String> {
        let remote = self.fetch_languages().await.into_iter().map(|l| l.code);
        match &settings.configured_languages {
            Some(configured) if !settings.fetch_all_languages => {
                remote.filter(|code| configured.contains(code)).collect()
            }
            _ => remote.collect(),
        }
    }

    async fn try_fetch_content(
        &self,
        settings: &CdsSettings,
        language_code: &str,
    ) -> Result<(bool, TranslationMap), RequestFailure> {
        let url = format!("{}/content/{}", settings.host, language_code);
        let mut query = Vec::new();
        if let Some(tags) = &settings.filter_tags {
            query.push(("filter[tags]", tags.clone()));
        }
        if let Some(status) = &settings.filter_status {
            query.push(("filter[status]", status.clone()));
        }

        let etag = self.etags.get(language_code);
        let response = self
            .retry_get_request(settings, &url, &etag, &query)
            .await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Translations for {} not modified", language_code);
            return Ok((false, TranslationMap::new()));
        }

        let response = ensure_success(response)?;
        let new_etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;
        let payload: DataEnvelope<TranslationMap> = serde_json::from_str(&body)?;

        self.etags.set(language_code, new_etag);
        debug!(
            "Fetched {} translations for {}",
            payload.data.len(),
            language_code
        );
        Ok((true, payload.data))
    }

    /// Push source strings. Requires a secret.
    ///
    /// Returns `Ok(None)` when the request failed; the failure is logged.
    pub async fn push_source_strings(
        &self,
        strings: &[SourceString],
        options: PushOptions,
    ) -> Result<Option<CdsResponse>, CdsError> {
        let settings = self.settings();
        if settings.secret().is_none() {
            return Err(CdsError::MissingSecret("pushing source content"));
        }

        let payload = PushPayload {
            data: strings
                .iter()
                .map(|string| {
                    let entry = PushEntry {
                        string: &string.string,
                        meta: string.meta(),
                    };
                    (string.key(), entry)
                })
                .collect(),
            meta: options,
        };

        info!("Pushing {} source strings to CDS", payload.data.len());
        let url = format!("{}/content/", settings.host);
        Ok(self.post(&settings, &url, &payload, PUSH_ERROR).await)
    }

    /// Ask the CDS to refresh its cache, or to drop it when `purge` is set.
    /// Requires a secret.
    pub async fn invalidate_cache(&self, purge: bool) -> Result<Option<CdsResponse>, CdsError> {
        let settings = self.settings();
        if settings.secret().is_none() {
            return Err(CdsError::MissingSecret("invalidating the cache"));
        }

        let endpoint = if purge { "purge" } else { "invalidate" };
        let url = format!("{}/{}", settings.host, endpoint);
        Ok(self
            .post(&settings, &url, &serde_json::json!({}), INVALIDATE_ERROR)
            .await)
    }

    async fn post<B: Serialize>(
        &self,
        settings: &CdsSettings,
        url: &str,
        body: &B,
        category: &str,
    ) -> Option<CdsResponse> {
        match self.try_post(settings, url, body).await {
            Ok(response) => Some(response),
            Err(failure) => {
                error!("{}: {}", category, failure);
                None
            }
        }
    }

    async fn try_post<B: Serialize>(
        &self,
        settings: &CdsSettings,
        url: &str,
        body: &B,
    ) -> Result<CdsResponse, RequestFailure> {
        let response = self
            .request(settings, Method::POST, url, true)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RequestFailure::Unknown(format!("HTTP status {}", status)));
        }
        let body = response.text().await?;
        Ok(CdsResponse {
            status: status.as_u16(),
            body,
        })
    }

    async fn retry_get_request(
        &self,
        settings: &CdsSettings,
        url: &str,
        etag: &str,
        query: &[(&str, String)],
    ) -> Result<Response, reqwest::Error> {
        with_retry_if(
            &settings.retry,
            &format!("GET {}", url),
            || {
                let mut request = self
                    .request(settings, Method::GET, url, false)
                    .query(query);
                if !etag.is_empty() {
                    request = request.header(IF_NONE_MATCH, etag);
                }
                request.send()
            },
            is_transient,
        )
        .await
    }

    fn request(
        &self,
        settings: &CdsSettings,
        method: Method,
        url: &str,
        use_secret: bool,
    ) -> RequestBuilder {
        let mut authorization = format!("Bearer {}", settings.token);
        if use_secret {
            if let Some(secret) = settings.secret() {
                authorization.push(':');
                authorization.push_str(secret);
            }
        }

        self.client
            .request(method, url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT_ENCODING, "gzip")
            .header(SDK_HEADER, SDK_NAME)
    }
}
