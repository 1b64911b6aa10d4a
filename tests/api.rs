//! End-to-end tests for the books API

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use base64::Engine;
use serde_json::{json, Value};

use coloring_book_server::config::{Config, StorageProvider};
use coloring_book_server::images::{FetchError, RemoteFetcher, ResolvedImage};
use coloring_book_server::routes;
use coloring_book_server::state::AppState;
use coloring_book_server::storage::{MemoryStore, ObjectLocation};

/// Every URL is unreachable
struct OfflineFetcher;

#[async_trait]
impl RemoteFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> Result<ResolvedImage, FetchError> {
        Err(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn data_uri(width: u32, height: u32) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png(width, height))
    )
}

fn server_with_store(store: MemoryStore) -> TestServer {
    let mut config = Config::default();
    config.storage.provider = StorageProvider::Memory;
    config.storage.endpoint = "http://localhost:9000".to_string();

    let state = AppState::new(config, Arc::new(store), Arc::new(OfflineFetcher));
    TestServer::new(routes::app(state)).unwrap()
}

fn server() -> TestServer {
    server_with_store(MemoryStore::new())
}

async fn wait_finished(server: &TestServer, job_id: &str) -> Value {
    for _ in 0..200 {
        let body: Value = server.get(&format!("/api/v1/books/{}", job_id)).await.json();
        if body["status"] != "processing" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} did not finish", job_id);
}

async fn submit(server: &TestServer, body: Value) -> String {
    let response = server.post("/api/v1/books").json(&body).await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["status"], "processing");
    body["jobId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let server = server();

    for path in ["/health", "/api/v1/health"] {
        let response = server.get(path).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
    }
}

#[tokio::test]
async fn test_generate_and_download() {
    let store = MemoryStore::new();
    store
        .insert(ObjectLocation::new("uploads", "pages/owl.png"), png(30, 20), "image/png")
        .await;
    let server = server_with_store(store);

    let job_id = submit(
        &server,
        json!({
            "imageRefs": [
                data_uri(20, 30),
                "http://localhost:9000/uploads/pages/owl.png",
                data_uri(10, 10)
            ],
            "title": "Forest Friends"
        }),
    )
    .await;

    let status = wait_finished(&server, &job_id).await;
    assert_eq!(status["status"], "completed");
    assert!(status["resultLocator"].is_string());
    assert!(status.get("errorMessage").is_none());

    let response = server.get(&format!("/api/v1/books/{}/download", job_id)).await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "application/pdf");
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"Forest-Friends.pdf\""
    );

    let doc = lopdf::Document::load_mem(response.as_bytes()).unwrap();
    assert_eq!(doc.get_pages().len(), 4);
}

#[tokio::test]
async fn test_unreachable_images_still_complete() {
    let server = server();

    let job_id = submit(
        &server,
        json!({ "imageRefs": ["https://images.example.com/missing.png"] }),
    )
    .await;

    let status = wait_finished(&server, &job_id).await;
    assert_eq!(status["status"], "completed");

    let response = server.get(&format!("/api/v1/books/{}/download", job_id)).await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"My-Coloring-Book.pdf\""
    );
    let doc = lopdf::Document::load_mem(response.as_bytes()).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn test_invalid_submissions_rejected() {
    let server = server();

    let response = server
        .post("/api/v1/books")
        .json(&json!({ "imageRefs": [] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "validation_error");

    let response = server
        .post("/api/v1/books")
        .json(&json!({ "imageRefs": [data_uri(4, 4), "ftp://example.com/a.png"] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("image 2"));
}

#[tokio::test]
async fn test_unknown_job() {
    let server = server();
    let id = uuid::Uuid::new_v4();

    server
        .get(&format!("/api/v1/books/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get(&format!("/api/v1/books/{}/download", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .delete(&format!("/api/v1/books/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_finished_job_conflicts() {
    let server = server();

    let job_id = submit(&server, json!({ "imageRefs": [data_uri(8, 8)] })).await;
    wait_finished(&server, &job_id).await;

    let response = server.delete(&format!("/api/v1/books/{}", job_id)).await;
    response.assert_status(StatusCode::CONFLICT);

    // The finished book is untouched
    server
        .get(&format!("/api/v1/books/{}/download", job_id))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_list_jobs_by_owner() {
    let server = server();

    let first = submit(
        &server,
        json!({ "imageRefs": [data_uri(4, 4)], "ownerId": "ada", "title": "One" }),
    )
    .await;
    let second = submit(
        &server,
        json!({ "imageRefs": [data_uri(4, 4), data_uri(4, 4)], "ownerId": "ada", "title": "Two" }),
    )
    .await;
    submit(&server, json!({ "imageRefs": [data_uri(4, 4)] })).await;

    let jobs: Vec<Value> = server
        .get("/api/v1/books")
        .add_query_param("ownerId", "ada")
        .await
        .json();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["jobId"], first);
    assert_eq!(jobs[1]["jobId"], second);
    assert_eq!(jobs[1]["imageCount"], 2);
    assert_eq!(jobs[1]["title"], "Two");

    let anonymous: Vec<Value> = server.get("/api/v1/books").await.json();
    assert_eq!(anonymous.len(), 1);
}
