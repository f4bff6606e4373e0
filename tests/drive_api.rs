//! `GoogleDrive` against wiremock-served Drive v3 endpoints.

use carsale_harvester::drive::{DriveApi, GoogleDrive};
use carsale_harvester::error::DriveError;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FOLDER_QUERY: &str = "name='2026-10-18' and 'parent-a' in parents and mimeType='application/vnd.google-apps.folder' and trashed=false";
const CHUNK: usize = 256 * 1024;

fn drive(server: &MockServer) -> GoogleDrive {
    GoogleDrive::with_token(
        "test-token",
        &format!("{}/drive/v3", server.uri()),
        &format!("{}/upload/drive/v3", server.uri()),
        CHUNK,
    )
    .expect("client construction should not fail")
}

#[tokio::test]
async fn find_folder_returns_first_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", FOLDER_QUERY))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [ { "id": "folder-1", "name": "2026-10-18" } ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let found = drive(&server).find_folder("2026-10-18", "parent-a").await.unwrap();
    assert_eq!(found.as_deref(), Some("folder-1"));
}

#[tokio::test]
async fn find_folder_returns_none_when_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
        .mount(&server)
        .await;

    assert_eq!(drive(&server).find_folder("2026-10-18", "parent-a").await.unwrap(), None);
}

#[tokio::test]
async fn create_folder_posts_folder_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_partial_json(json!({
            "name": "2026-10-18",
            "mimeType": "application/vnd.google-apps.folder",
            "parents": ["parent-a"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "new-folder" })))
        .expect(1)
        .mount(&server)
        .await;

    let id = drive(&server).create_folder("2026-10-18", "parent-a").await.unwrap();
    assert_eq!(id, "new-folder");
}

#[tokio::test]
async fn missing_parent_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(404).set_body_string("File not found: parent-a"))
        .mount(&server)
        .await;

    let err = drive(&server).find_folder("2026-10-18", "parent-a").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn server_error_is_retriable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backendError"))
        .mount(&server)
        .await;

    let err = drive(&server).create_folder("2026-10-18", "parent-a").await.unwrap_err();
    assert!(matches!(err, DriveError::Status { .. }));
    assert!(err.is_retriable());
}

#[tokio::test]
async fn resumable_upload_sends_fixed_size_chunks() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("Toyota.xlsx");
    let total = CHUNK + 1000;
    std::fs::write(&file, vec![7u8; total]).unwrap();

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "resumable"))
        .and(header("X-Upload-Content-Length", total.to_string().as_str()))
        .and(body_partial_json(json!({ "name": "Toyota.xlsx", "parents": ["folder-1"] })))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Location", format!("{}/session/abc", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("Content-Range", format!("bytes 0-{}/{}", CHUNK - 1, total).as_str()))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", format!("bytes=0-{}", CHUNK - 1).as_str()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/session/abc"))
        .and(header("Content-Range", format!("bytes {}-{}/{}", CHUNK, total - 1, total).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "file-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let id = drive(&server).upload_file(&file, "folder-1").await.unwrap();
    assert_eq!(id, "file-1");
}

#[tokio::test]
async fn upload_rejects_missing_file_and_blank_folder() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let client = drive(&server);

    let ghost = dir.path().join("Ghost.xlsx");
    assert!(matches!(client.upload_file(&ghost, "folder-1").await, Err(DriveError::MissingFile(_))));

    let real = dir.path().join("Real.xlsx");
    std::fs::write(&real, b"data").unwrap();
    assert!(matches!(client.upload_file(&real, " ").await, Err(DriveError::InvalidFolder(_))));

    assert!(server.received_requests().await.unwrap().is_empty());
}
