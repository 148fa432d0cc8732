mod common;

use blackshannon::fingerprint::{Confidence, FingerprintEngine};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_nginx_wordpress_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Server", "nginx/1.18.0")
                .set_body_string(r#"<html><link rel="stylesheet" href="/wp-content/themes/x/style.css"></html>"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-login.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<form id=\"loginform\"></form>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());
    let profile = FingerprintEngine::new(common::client(&config))
        .analyze(&format!("{}/", server.uri()))
        .await;

    let server_info = profile.server.as_ref().unwrap();
    assert_eq!(server_info.name, "nginx");
    assert_eq!(server_info.version.as_deref(), Some("1.18.0"));
    let cms = profile.cms.as_ref().unwrap();
    assert_eq!(cms.name, "WordPress");
    assert!(cms.confidence >= Confidence::Medium);
    assert!(profile.paths_found.iter().any(|p| p == "/wp-login.php"));
    assert!(profile.overall_confidence >= Confidence::Medium);
}

#[tokio::test]
async fn test_wordpress_from_baseline_page_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Server", "nginx/1.18.0")
                .set_body_string(r#"<html><link rel="stylesheet" href="/wp-content/themes/x/style.css"></html>"#),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());
    let profile = FingerprintEngine::new(common::client(&config))
        .analyze(&format!("{}/", server.uri()))
        .await;

    let server_info = profile.server.as_ref().unwrap();
    assert_eq!(server_info.name, "nginx");
    assert_eq!(server_info.version.as_deref(), Some("1.18.0"));
    let cms = profile.cms.as_ref().unwrap();
    assert_eq!(cms.name, "WordPress");
    assert!(cms.confidence >= Confidence::Medium);
    assert!(profile.overall_confidence >= Confidence::Medium);
    assert!(profile.paths_found.is_empty());
}

#[tokio::test]
async fn test_database_detected_from_error_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("id", "1'"))
        .respond_with(ResponseTemplate::new(500).set_body_string(common::MYSQL_ERROR))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Item 1</html>"))
        .with_priority(5)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());
    let profile = FingerprintEngine::new(common::client(&config))
        .analyze(&format!("{}/items?id=1", server.uri()))
        .await;

    let db = profile.database.as_ref().unwrap();
    assert_eq!(db.db_type, "mysql");
    assert!(db.confidence >= Confidence::Medium);
    assert_eq!(profile.database_dialect(), Some("mysql"));
}

#[tokio::test]
async fn test_unreachable_target_degrades_to_low_profile() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());
    let profile = FingerprintEngine::new(common::client(&config))
        .analyze("http://127.0.0.1:9/")
        .await;

    assert_eq!(profile.overall_confidence, Confidence::Low);
    assert!(!profile.is_reachable());
    assert!(profile.server.is_none());
    assert!(profile.cms.is_none());
    assert!(profile.database.is_none());
    assert!(profile.waf.is_none());
    assert!(profile.frameworks.is_empty());
    assert!(!profile.degraded.is_empty());
}

#[tokio::test]
async fn test_repeated_analysis_is_stable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Server", "Apache/2.4.41")
                .insert_header("X-Powered-By", "PHP/7.4.3")
                .set_body_string("<html><script src=\"/js/jquery.min.js\"></script></html>"),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = common::fast_config(dir.path());
    let engine = FingerprintEngine::new(common::client(&config));
    let target = format!("{}/", server.uri());
    let first = engine.analyze(&target).await;
    let second = engine.analyze(&target).await;
    assert_eq!(first, second);
}
