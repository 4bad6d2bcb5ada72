//! Same-origin proxy routes.
//!
//! Browser-facing endpoints that reshape an upload (JSON body with a data URL,
//! or a multipart form with a `file` part) into the backend's JSON contract,
//! forward it, and flatten the backend's answer.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    routing::post,
    Json, Router,
};
use identikit_core::dataurl;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ProxyError;
use crate::AppState;

const FALLBACK_MIME: &str = "image/png";
const SAVED_URL_FILE: &str = "captured_image_url.txt";

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveUrlRequest {
    url: String,
}

/// Reshape an incoming upload into the backend's `{"image": ...}` JSON.
///
/// JSON bodies pass through unchanged. Multipart forms must carry a `file`
/// part, which becomes a data URL; a numeric `limit` part is carried along.
async fn normalize_upload(state: &AppState, req: Request) -> Result<Value, ProxyError> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.contains("application/json") {
        let bytes = axum::body::to_bytes(req.into_body(), state.config.max_upload_bytes)
            .await
            .map_err(|e| ProxyError::BadRequest(format!("failed to read body: {e}")))?;
        return serde_json::from_slice(&bytes)
            .map_err(|e| ProxyError::BadRequest(format!("Invalid JSON body: {e}")));
    }

    if content_type.contains("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ProxyError::BadRequest(e.body_text()))?;

        let mut image = None;
        let mut limit = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ProxyError::BadRequest(e.body_text()))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    let mime = field
                        .content_type()
                        .filter(|m| !m.is_empty())
                        .unwrap_or(FALLBACK_MIME)
                        .to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ProxyError::BadRequest(e.body_text()))?;
                    if !bytes.is_empty() {
                        tracing::debug!(mime = %mime, size = bytes.len(), "multipart upload converted");
                        image = Some(dataurl::encode(&mime, &bytes));
                    }
                }
                Some("limit") => {
                    let text = field.text().await.map_err(|e| ProxyError::BadRequest(e.body_text()))?;
                    limit = text.trim().parse::<usize>().ok();
                }
                _ => {}
            }
        }

        let image = image.ok_or_else(|| ProxyError::BadRequest("No file provided".to_string()))?;
        let mut body = json!({ "image": image });
        if let Some(limit) = limit {
            body["limit"] = json!(limit);
        }
        return Ok(body);
    }

    Err(ProxyError::BadRequest("Unsupported content type".to_string()))
}

/// Backend URL for a path, with each segment percent-encoded.
fn backend_url(state: &AppState, segments: &[&str]) -> Result<reqwest::Url, ProxyError> {
    let mut url = reqwest::Url::parse(&state.config.backend_url)
        .map_err(|e| ProxyError::Unavailable(format!("bad backend URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ProxyError::Unavailable("backend URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Relay a backend response: non-success statuses become [`ProxyError::Upstream`].
async fn read_backend(res: reqwest::Response) -> Result<Value, ProxyError> {
    let status = res.status();
    if !status.is_success() {
        let message = res.text().await.unwrap_or_default();
        tracing::debug!(%status, "backend returned an error");
        return Err(ProxyError::Upstream { status, message });
    }
    Ok(res.json().await?)
}

async fn forward_json(state: &AppState, path: &str, body: &Value) -> Result<Value, ProxyError> {
    let url = backend_url(state, &[path])?;
    let res = state.http.post(url).json(body).send().await?;
    read_backend(res).await
}

/// Pull `result` out of a backend envelope, or fail with the backend's error.
fn successful_result(data: Value) -> Result<Value, ProxyError> {
    let ok = data.get("status").and_then(Value::as_str) == Some("success");
    match data.get("result") {
        Some(result) if ok && !result.is_null() => Ok(result.clone()),
        _ => {
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Face not found")
                .to_string();
            Err(ProxyError::NotFound(message))
        }
    }
}

/// `{ "id": result.id, ...result }`
fn flatten_with_id(result: Value) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), result.get("id").cloned().unwrap_or(Value::Null));
    if let Value::Object(fields) = result {
        out.extend(fields);
    }
    Value::Object(out)
}

/// POST /api/face-detect
async fn face_detect(State(state): State<AppState>, req: Request<Body>) -> Result<Json<Value>, ProxyError> {
    let body = normalize_upload(&state, req).await?;
    let data = forward_json(&state, "get-image", &body).await?;
    let result = successful_result(data)?;
    Ok(Json(flatten_with_id(result)))
}

/// GET /api/face-detect?id=...
async fn face_detect_by_id(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Value>, ProxyError> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProxyError::BadRequest("No id provided".to_string()))?;

    let url = backend_url(&state, &["get-person", &id])?;
    let data = read_backend(state.http.get(url).send().await?).await?;
    let result = successful_result(data)?;
    Ok(Json(flatten_with_id(result)))
}

/// POST /api/face-search
async fn face_search(State(state): State<AppState>, req: Request<Body>) -> Result<Json<Value>, ProxyError> {
    let body = normalize_upload(&state, req).await?;
    let data = forward_json(&state, "search", &body).await?;
    let candidates = data
        .get("candidates")
        .filter(|c| c.is_array())
        .cloned()
        .ok_or_else(|| {
            let message = data.get("error").and_then(Value::as_str).unwrap_or("No candidates");
            ProxyError::NotFound(message.to_string())
        })?;
    Ok(Json(json!({ "candidates": candidates })))
}

/// POST /api/add-person
async fn add_person(
    State(state): State<AppState>,
    form: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ProxyError> {
    let Json(form) = form?;
    let data = forward_json(&state, "add-person", &form).await?;
    let result = successful_result(data)?;
    Ok((StatusCode::CREATED, Json(flatten_with_id(result))))
}

/// POST /api/save-image-url
async fn save_image_url(
    State(state): State<AppState>,
    req: Result<Json<SaveUrlRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let path = state.config.data_dir.join(SAVED_URL_FILE);
    let written = match req {
        Ok(Json(req)) => async {
            tokio::fs::create_dir_all(&state.config.data_dir).await?;
            tokio::fs::write(&path, req.url.as_bytes()).await
        }
        .await
        .map_err(|e| e.to_string()),
        Err(rejection) => Err(rejection.body_text()),
    };

    match written {
        Ok(()) => {
            tracing::info!(path = %path.display(), "saved image URL");
            (StatusCode::OK, Json(json!({ "status": "success" })))
        }
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "failed to save image URL");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": e.to_string() })),
            )
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/face-detect", post(face_detect).get(face_detect_by_id))
        .route("/api/face-search", post(face_search))
        .route("/api/add-person", post(add_person))
        .route("/api/save-image-url", post(save_image_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_puts_id_first() {
        let out = flatten_with_id(json!({ "name": "Asha", "id": "p1", "score": 0.9 }));
        let keys: Vec<_> = out.as_object().unwrap().keys().cloned().collect();
        assert_eq!(out["id"], "p1");
        assert_eq!(out["name"], "Asha");
        assert!(keys.contains(&"score".to_string()));
    }

    #[test]
    fn test_successful_result_requires_success_status() {
        let ok = successful_result(json!({ "status": "success", "result": { "id": "NEW" } }));
        assert_eq!(ok.unwrap()["id"], "NEW");

        let err = successful_result(json!({ "status": "failure", "error": "No face detected" }));
        assert!(matches!(err, Err(ProxyError::NotFound(m)) if m == "No face detected"));

        let err = successful_result(json!({ "status": "success", "result": null }));
        assert!(matches!(err, Err(ProxyError::NotFound(m)) if m == "Face not found"));
    }
}
