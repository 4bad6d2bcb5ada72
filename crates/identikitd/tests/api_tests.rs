//! Router tests for the recognition backend and the proxy routes.
//!
//! The ONNX engine is replaced by an embedder that uses an image's mean
//! colour as its "face embedding", so solid-colour photos act as identities
//! and a black photo has no face.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use identikit_core::{dataurl, Embedding};
use identikitd::config::Config;
use identikitd::engine::{EngineError, FaceEmbedder, FaceSample};
use identikitd::store::PersonStore;
use identikitd::{build_router, AppState};
use image::{Rgb, RgbImage};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::util::ServiceExt;

struct ColorEmbedder;

#[async_trait]
impl FaceEmbedder for ColorEmbedder {
    async fn embed(&self, image: RgbImage) -> Result<FaceSample, EngineError> {
        let n = (image.width() * image.height()).max(1) as f32;
        let mut sums = [0.0f32; 3];
        for px in image.pixels() {
            for c in 0..3 {
                sums[c] += px.0[c] as f32;
            }
        }
        let mean = sums.map(|s| s / n);
        if mean.iter().all(|&m| m < 10.0) {
            return Err(EngineError::NoFaceDetected);
        }
        Ok(FaceSample {
            embedding: Embedding { values: mean.to_vec(), model_version: None },
            confidence: 0.99,
        })
    }

    fn models_loaded(&self) -> bool {
        true
    }
}

fn color_url(r: u8, g: u8, b: u8) -> String {
    dataurl::encode_png(&RgbImage::from_pixel(8, 8, Rgb([r, g, b]))).unwrap()
}

fn color_png(r: u8, g: u8, b: u8) -> Vec<u8> {
    dataurl::decode(&color_url(r, g, b)).unwrap().bytes
}

async fn test_state(data_dir: &Path, backend_url: String) -> AppState {
    let config = Config {
        data_dir: data_dir.to_path_buf(),
        db_path: data_dir.join("persons.db"),
        backend_url,
        ..Config::default()
    };
    let store = PersonStore::open_in_memory().await.unwrap();
    AppState::new(config, Arc::new(ColorEmbedder), store)
}

/// Backend-only app; the proxy's backend URL points nowhere.
async fn backend_app(data_dir: &Path) -> Router {
    build_router(test_state(data_dir, "http://127.0.0.1:9".to_string()).await)
}

/// App whose proxy routes forward to a live copy of itself on a random port.
async fn proxied_app(data_dir: &Path) -> Router {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = test_state(data_dir, format!("http://{addr}")).await;

    let server = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, server).await.unwrap();
    });

    build_router(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const BOUNDARY: &str = "identikit-test-boundary";

/// (field name, optional (filename, content type), payload)
type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

fn post_multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file, payload) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file {
            Some((filename, content_type)) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn enroll(app: &Router, name: &str, photo: String) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/add-person",
            json!({
                "name": name,
                "age": "34",
                "nickname": "",
                "police_station": "Central",
                "crime": "Pickpocketing",
                "sections": "IPC 379",
                "photo": photo,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["result"]["id"].as_str().unwrap().to_string()
}

// --- backend routes ---

#[tokio::test]
async fn test_hello_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let (status, body) = send(&app, get("/hello")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "hello");

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["models_loaded"], true);
    assert_eq!(body["gallery_size"], 0);
}

#[tokio::test]
async fn test_get_image_requires_image() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let (status, body) = send(&app, post_json("/get-image", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "status": "failure", "error": "No image provided" }));
}

#[tokio::test]
async fn test_get_image_rejects_undecodable_photo() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let bogus = dataurl::encode("image/png", b"not really a png");
    let (status, body) = send(&app, post_json("/get-image", json!({ "image": bogus }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failure");
}

#[tokio::test]
async fn test_get_image_without_face() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let (status, body) = send(&app, post_json("/get-image", json!({ "image": color_url(0, 0, 0) }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "No face detected");
}

#[tokio::test]
async fn test_enroll_then_identify() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let id = enroll(&app, "Asha Rao", color_url(220, 20, 20)).await;

    let (status, body) = send(&app, post_json("/get-image", json!({ "image": color_url(220, 20, 20) }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let result = &body["result"];
    assert_eq!(result["id"], id.as_str());
    assert_eq!(result["name"], "Asha Rao");
    assert_eq!(result["age"], 34);
    assert_eq!(result["police_station"], "Central");
    assert!(result.get("nickname").is_none(), "blank form fields are dropped");
    assert!((result["score"].as_f64().unwrap() - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_unknown_face_is_new() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    enroll(&app, "Red", color_url(255, 0, 0)).await;

    let (status, body) = send(&app, post_json("/get-image", json!({ "image": color_url(0, 255, 0) }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["id"], "NEW");
    assert!(body["result"]["confidence"].as_f64().unwrap() < 0.45);
    assert!(body["result"].get("name").is_none());
}

#[tokio::test]
async fn test_add_person_validation() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let (status, body) = send(&app, post_json("/add-person", json!({ "name": " ", "photo": color_url(9, 90, 200) }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "name is required");

    let (status, body) = send(&app, post_json("/add-person", json!({ "name": "No Photo" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image provided");

    let (status, _) = send(&app, post_json("/add-person", json!({ "name": "Dark", "photo": color_url(0, 0, 0) }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, post_json("/add-person", json!({ "name": "Bad Age", "age": "old", "photo": color_url(9, 90, 200) }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_ranks_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    enroll(&app, "Red", color_url(255, 0, 0)).await;
    enroll(&app, "Orange", color_url(255, 128, 0)).await;
    enroll(&app, "Blue", color_url(0, 0, 255)).await;

    let (status, body) = send(&app, post_json("/search", json!({ "image": color_url(255, 10, 0), "limit": 2 }))).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Red", "Orange"]);
}

#[tokio::test]
async fn test_person_management() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let id = enroll(&app, "Asha Rao", color_url(200, 100, 50)).await;

    let (status, body) = send(&app, get(&format!("/get-person/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["name"], "Asha Rao");
    assert!(body["result"]["photo"].as_str().unwrap().starts_with("data:image/png;base64,"));

    let (_, body) = send(&app, get("/persons")).await;
    assert_eq!(body["persons"].as_array().unwrap().len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/persons/{id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&format!("/get-person/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "failure");
}

// --- proxy routes ---

#[tokio::test]
async fn test_proxy_json_upload_flattens_result() {
    let dir = tempfile::tempdir().unwrap();
    let app = proxied_app(dir.path()).await;
    let id = enroll(&app, "Asha Rao", color_url(220, 20, 20)).await;

    let (status, body) = send(&app, post_json("/api/face-detect", json!({ "image": color_url(220, 20, 20) }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["name"], "Asha Rao");
    assert!(body.get("status").is_none());
}

#[tokio::test]
async fn test_proxy_multipart_upload() {
    let dir = tempfile::tempdir().unwrap();
    let app = proxied_app(dir.path()).await;
    enroll(&app, "Asha Rao", color_url(220, 20, 20)).await;

    let png = color_png(220, 20, 20);
    let req = post_multipart("/api/face-detect", &[("file", Some(("probe.png", "image/png")), &png)]);
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["name"], "Asha Rao");
}

#[tokio::test]
async fn test_proxy_unknown_face_returns_new() {
    let dir = tempfile::tempdir().unwrap();
    let app = proxied_app(dir.path()).await;

    let (status, body) = send(&app, post_json("/api/face-detect", json!({ "image": color_url(0, 0, 255) }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "NEW");
}

#[tokio::test]
async fn test_proxy_rejects_bad_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let app = proxied_app(dir.path()).await;

    let req = post_multipart("/api/face-detect", &[("note", None, b"hi")]);
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file provided" }));

    let req = Request::builder()
        .method("POST")
        .uri("/api/face-detect")
        .header("content-type", "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Unsupported content type" }));
}

#[tokio::test]
async fn test_proxy_relays_backend_failure_status() {
    let dir = tempfile::tempdir().unwrap();
    let app = proxied_app(dir.path()).await;

    let (status, body) = send(&app, post_json("/api/face-detect", json!({ "image": color_url(0, 0, 0) }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("No face detected"), "{body}");
}

#[tokio::test]
async fn test_proxy_get_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = proxied_app(dir.path()).await;
    let id = enroll(&app, "Asha Rao", color_url(220, 20, 20)).await;

    let (status, body) = send(&app, get("/api/face-detect")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No id provided");

    let (status, body) = send(&app, get(&format!("/api/face-detect?id={id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["crime"], "Pickpocketing");

    let (status, _) = send(&app, get("/api/face-detect?id=nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_proxy_search_and_add_person() {
    let dir = tempfile::tempdir().unwrap();
    let app = proxied_app(dir.path()).await;

    let (status, body) = send(
        &app,
        post_json("/api/add-person", json!({ "name": "Green", "photo": color_url(0, 200, 0) })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["name"], "Green");
    enroll(&app, "Teal", color_url(0, 200, 200)).await;

    let png = color_png(0, 210, 10);
    let req = post_multipart(
        "/api/face-search",
        &[("file", Some(("probe.png", "image/png")), &png), ("limit", None, b"1")],
    );
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["name"], "Green");
}

#[tokio::test]
async fn test_save_image_url_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let (status, body) = send(&app, post_json("/api/save-image-url", json!({ "url": "https://example.test/p.png" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");

    let saved = std::fs::read_to_string(dir.path().join("captured_image_url.txt")).unwrap();
    assert_eq!(saved, "https://example.test/p.png");
}

fn post_raw(uri: &str, content_type: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_backend_malformed_body_uses_failure_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    for uri in ["/get-image", "/search", "/add-person"] {
        let (status, body) = send(&app, post_raw(uri, "application/json", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["status"], "failure", "{uri}");
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"), "{uri}: {body}");
    }

    let (status, body) = send(&app, post_raw("/get-image", "text/plain", "hello")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "failure");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_proxy_add_person_malformed_body() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let (status, body) = send(&app, post_raw("/api/add-person", "application/json", "{\"name\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"), "{body}");
    assert!(body.get("status").is_none());
}

#[tokio::test]
async fn test_save_image_url_malformed_body() {
    let dir = tempfile::tempdir().unwrap();
    let app = backend_app(dir.path()).await;

    let (status, body) = send(&app, post_raw("/api/save-image-url", "application/json", "{not json")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["error"].is_string());
    assert!(!dir.path().join("captured_image_url.txt").exists());
}

#[tokio::test]
async fn test_save_image_url_write_failure() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"occupied").unwrap();
    let app = backend_app(&blocker).await;

    let (status, body) = send(&app, post_json("/api/save-image-url", json!({ "url": "https://example.test/p.png" }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert!(body["error"].is_string());
}
