mod auth_support;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;
use sharesync::auth::{TokenProvider, TokenResponse};
use sharesync::config::Settings;
use sharesync::sync::{SyncJob, SyncSteps};
use sharesync::upload::{UploadError, UploadFolder, Uploader};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_support::{provider, settings, token_body, InMemoryTokenStore};

const SESSION_PATH: &str =
    "/v1.0/sites/site-1/drives/drive-1/items/root:/Shared/Logs/a.csv:/createUploadSession";

fn folder() -> UploadFolder {
    UploadFolder {
        site_id: "site-1".to_string(),
        list_id: "drive-1".to_string(),
        remote_path: "Shared/Logs".to_string(),
        sub_folder: "plc01".to_string(),
    }
}

/// Provider whose cache already holds a fresh token, so no sign-in happens.
fn signed_in(server: &MockServer) -> Arc<TokenProvider> {
    let (provider, _) = provider(server, InMemoryTokenStore::new());
    let response = TokenResponse::from_payload(token_body("graph-token")).unwrap();
    provider
        .cache()
        .store_response("client-123", &provider.settings().scopes, &response, Utc::now())
        .unwrap();
    Arc::new(provider)
}

fn stage(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

async fn mount_session(server: &MockServer, session_path: &str, upload_path: &str) {
    Mock::given(method("POST"))
        .and(path(session_path))
        .and(header("authorization", "Bearer graph-token"))
        .and(body_partial_json(json!({
            "item": {"@microsoft.graph.conflictBehavior": "replace"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uploadUrl": format!("{}{upload_path}", server.uri()),
            "expirationDateTime": "2030-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn upload_file_creates_session_and_puts_bytes() {
    let server = MockServer::start().await;
    mount_session(&server, SESSION_PATH, "/upload/session-1").await;
    Mock::given(method("PUT"))
        .and(path("/upload/session-1"))
        .and(header("content-range", "bytes 0-4/5"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "item-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    stage(dir.path(), "plc01/a.csv", "hello");
    let uploader = Uploader::new(signed_in(&server));

    let uploaded = uploader
        .upload_file(&dir.path().join("plc01/a.csv"), &folder())
        .await
        .expect("upload");

    assert!(uploaded);
}

#[tokio::test]
async fn zero_size_file_is_skipped_without_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    stage(dir.path(), "plc01/a.csv", "");
    let uploader = Uploader::new(signed_in(&server));

    let uploaded = uploader
        .upload_file(&dir.path().join("plc01/a.csv"), &folder())
        .await
        .expect("skip");

    assert!(!uploaded);
}

#[tokio::test]
async fn bad_request_on_session_is_reported_as_not_uploaded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "invalidRequest", "message": "Invalid request"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    stage(dir.path(), "plc01/a.csv", "hello");
    let uploaded = Uploader::new(signed_in(&server))
        .upload_file(&dir.path().join("plc01/a.csv"), &folder())
        .await
        .expect("handled");

    assert!(!uploaded);
}

#[tokio::test]
async fn session_without_upload_url_is_reported_as_not_uploaded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "expirationDateTime": "2030-01-01T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    stage(dir.path(), "plc01/a.csv", "hello");
    let uploaded = Uploader::new(signed_in(&server))
        .upload_file(&dir.path().join("plc01/a.csv"), &folder())
        .await
        .expect("handled");

    assert!(!uploaded);
}

#[tokio::test]
async fn server_error_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    stage(dir.path(), "plc01/a.csv", "hello");
    let err = Uploader::new(signed_in(&server))
        .upload_file(&dir.path().join("plc01/a.csv"), &folder())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Status { status: 503, .. }));
}

#[tokio::test]
async fn upload_folder_uploads_nested_csv_files_in_order() {
    let server = MockServer::start().await;
    mount_session(&server, SESSION_PATH, "/upload/a").await;
    mount_session(
        &server,
        "/v1.0/sites/site-1/drives/drive-1/items/root:/Shared/Logs/b.csv:/createUploadSession",
        "/upload/b",
    )
    .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    stage(dir.path(), "plc01/2024/a.csv", "a,b,c");
    stage(dir.path(), "plc01/b.csv", "1,2");
    stage(dir.path(), "plc01/readme.txt", "ignored");
    stage(dir.path(), "plc02/c.csv", "other folder");

    let report = Uploader::new(signed_in(&server))
        .upload_folder(dir.path(), &folder())
        .await
        .expect("folder upload");

    assert_eq!(
        report.uploaded,
        vec![dir.path().join("plc01/2024/a.csv"), dir.path().join("plc01/b.csv")]
    );
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn sync_job_upload_step_runs_every_complete_folder() {
    let server = MockServer::start().await;
    mount_session(&server, SESSION_PATH, "/upload/a").await;
    Mock::given(method("PUT"))
        .and(path("/upload/a"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    stage(dir.path(), "plc01/a.csv", "hello");
    stage(dir.path(), "plc09/z.csv", "not routed");
    let incomplete = UploadFolder {
        list_id: String::new(),
        sub_folder: "plc09".to_string(),
        ..folder()
    };
    let settings = Settings {
        auth: settings(&server),
        save_folder: dir.path().to_path_buf(),
        targets: None,
        folders: Some(vec![folder(), incomplete]),
    };

    let report = SyncJob::new(settings)
        .with_tokens(signed_in(&server))
        .run(SyncSteps::UPLOAD_ONLY)
        .await
        .expect("sync");

    assert_eq!(report.uploads.uploaded, vec![dir.path().join("plc01/a.csv")]);
    assert!(report.pulls.is_empty());
}
