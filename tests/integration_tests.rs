//! Integration tests for the localization client
//!
//! These tests drive the public API against a mocked CDS and follow a string
//! from configuration through fetching, caching and rendering.

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use tx_native::{
    generate_key, html_escape, BackgroundSync, Callback, Config, Event, MissingPolicy, Native,
    NativeError, Params, SourceString, SourceStringSet,
};

// ==================== Test Helpers ====================

/// Create a test config pointing at the mock CDS
fn create_test_config(cds_url: &str) -> Config {
    Config {
        token: "test-token".to_string(),
        secret: Some("test-secret".to_string()),
        cds_host: cds_url.to_string(),
        source_language: "en".to_string(),
        languages: None,
        fetch_all_languages: false,
        filter_tags: None,
        filter_status: None,
        missing_policy: MissingPolicy::SourceString,
        error_text: "ERROR".to_string(),
        sync_interval: Duration::from_secs(3600),
    }
}

fn params(pairs: &[(&str, serde_json::Value)]) -> Params {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

const TABLES: &str = "{cnt, plural, one {{cnt} table} other {{cnt} tables}}";

/// Mock CDS where only Greek has translations
async fn start_cds() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/languages"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"code": "el"}, {"code": "fr"}, {"code": "en"}]
        })))
        .mount(&server)
        .await;

    let hello = generate_key::<&str>("Hello {name}", &[]);
    let tables = generate_key::<&str>(TABLES, &[]);
    let save = generate_key("Save", &["button"]);
    Mock::given(method("GET"))
        .and(path("/content/el"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "el-v1")
                .set_body_json(json!({
                    "data": {
                        &hello: {"string": "Γεια σου {name}"},
                        &tables: {"string": "{cnt, plural, one {{cnt} τραπέζι} other {{cnt} τραπέζια}}"},
                        &save: {"string": "Αποθήκευση"}
                    },
                    "meta": {}
                })),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/content/fr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/content/en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&server)
        .await;

    server
}

// ==================== Fetch and Render Tests ====================

#[tokio::test]
async fn test_fetch_then_translate() {
    let server = start_cds().await;
    let native = Native::new(create_test_config(&server.uri()).to_setup());

    native.fetch_translations(None).await.unwrap();

    let name = params(&[("name", json!("Μαρία"))]);
    assert_eq!(
        native.translate("Hello {name}", Some("el"), &[], None, &name),
        "Γεια σου Μαρία"
    );
    assert_eq!(
        native.translate(TABLES, Some("el"), &[], None, &params(&[("cnt", json!(1))])),
        "1 τραπέζι"
    );
    assert_eq!(
        native.translate(TABLES, Some("el"), &[], None, &params(&[("cnt", json!(7))])),
        "7 τραπέζια"
    );
    assert_eq!(
        native.translate("Save", Some("el"), &["button"], None, &Params::new()),
        "Αποθήκευση"
    );
    // Missing in French: source string via the default policy
    assert_eq!(
        native.translate(TABLES, Some("fr"), &[], None, &params(&[("cnt", json!(2))])),
        "2 tables"
    );
}

#[tokio::test]
async fn test_current_language_drives_translate() {
    let server = start_cds().await;
    let native = Native::new(create_test_config(&server.uri()).to_setup());

    let name = params(&[("name", json!("Nikos"))]);
    assert_eq!(native.translate("Hello {name}", None, &[], None, &name), "Hello Nikos");

    native.set_current_language("el").await.unwrap();
    assert_eq!(native.translate("Hello {name}", None, &[], None, &name), "Γεια σου Nikos");

    // An explicit language still wins
    assert_eq!(native.translate("Hello {name}", Some("en"), &[], None, &name), "Hello Nikos");
}

#[tokio::test]
async fn test_allow_list_limits_languages() {
    let server = start_cds().await;
    let mut config = create_test_config(&server.uri());
    config.languages = Some(vec!["el".to_string()]);
    let native = Native::new(config.to_setup());

    let codes: Vec<String> = native
        .get_languages(false)
        .await
        .into_iter()
        .map(|language| language.code)
        .collect();
    assert_eq!(codes, vec!["el"]);

    let err = native.set_current_language("fr").await.unwrap_err();
    assert!(matches!(err, NativeError::UnsupportedLanguage(code) if code == "fr"));
}

#[tokio::test]
async fn test_missing_policy_chain_and_escape() {
    let server = start_cds().await;
    let mut config = create_test_config(&server.uri());
    config.missing_policy = "pseudo+wrapped".parse().unwrap();
    let native = Native::new(config.to_setup());
    native.fetch_translations(Some("fr")).await.unwrap();

    let rendered = native.translate("<b>Hi</b>", Some("fr"), &[], Some(html_escape), &Params::new());
    assert!(rendered.starts_with("[&lt;"));
    assert!(rendered.ends_with("&gt;]"));
    assert!(!rendered.contains("Hi"));
}

#[tokio::test]
async fn test_cds_outage_degrades_to_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let native = Native::new(create_test_config(&server.uri()).to_setup());
    native.setup(tx_native::Setup {
        retry: Some(tx_native::retry::RetryConfig::new(2, Duration::from_millis(1))),
        ..Default::default()
    });

    native.fetch_translations(None).await.unwrap();
    assert!(native.get_languages(false).await.is_empty());
    assert_eq!(native.translate("Hello", Some("el"), &[], None, &Params::new()), "Hello");
}

// ==================== Push Tests ====================

#[tokio::test]
async fn test_push_collected_strings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/content/"))
        .and(header("Authorization", "Bearer test-token:test-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "created": 2, "updated": 0, "skipped": 0, "deleted": 0, "failed": 0, "errors": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let native = Native::new(create_test_config(&server.uri()).to_setup());

    let strings: SourceStringSet = vec![
        SourceString::new("Save").with_context("button").with_occurrences("ui.rs:10"),
        SourceString::new("Save").with_context("button").with_occurrences("ui.rs:42"),
        SourceString::new(TABLES).with_tags("checkout"),
    ]
    .into_iter()
    .collect();
    assert_eq!(strings.len(), 2);

    let (status, body) = native
        .push_source_strings(&strings.into_vec(), false)
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["created"], 2);

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = requests[0].body_json().unwrap();
    let save_key = generate_key("Save", &["button"]);
    assert_eq!(
        sent["data"][save_key.as_str()]["meta"]["occurrences"],
        json!(["ui.rs:10", "ui.rs:42"])
    );
}

// ==================== Events and Background Sync Tests ====================

#[tokio::test]
async fn test_background_sync_refreshes_translations() {
    let server = start_cds().await;
    let native = Arc::new(Native::new(create_test_config(&server.uri()).to_setup()));

    let events = Arc::new(Mutex::new(Vec::new()));
    let callback: Callback = {
        let events = Arc::clone(&events);
        Arc::new(move |event: &Event| events.lock().unwrap().push(event.clone()))
    };
    native.on("TRANSLATIONS_FETCHED", callback).unwrap();

    let sync = BackgroundSync::new(&native, Duration::from_millis(20));
    assert!(sync.start());
    tokio::time::sleep(Duration::from_millis(150)).await;
    sync.stop().await;

    let fetched = events.lock().unwrap().clone();
    assert!(fetched.len() >= 6, "expected at least two rounds, got {:?}", fetched);
    assert_eq!(
        fetched[..3],
        [
            Event::TranslationsFetched { language_code: "el".to_string() },
            Event::TranslationsFetched { language_code: "fr".to_string() },
            Event::TranslationsFetched { language_code: "en".to_string() },
        ]
    );
    assert_eq!(
        native.translate("Save", Some("el"), &["button"], None, &Params::new()),
        "Αποθήκευση"
    );
}

#[tokio::test]
async fn test_global_instance() {
    let server = start_cds().await;
    let config = create_test_config(&server.uri());

    let first = tx_native::init(&config);
    let mut other = config.clone();
    other.source_language = "de".to_string();
    let second = tx_native::init(&other);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.source_language(), "en");
    let current = tx_native::instance().expect("initialized");
    assert!(Arc::ptr_eq(&first, &current));
}
