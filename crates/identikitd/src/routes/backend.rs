//! Recognition backend: identify, search, enroll and manage person records.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use identikit_core::{dataurl, Candidate, CosineMatcher, Matcher, PersonRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::engine::FaceSample;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct ImageRequest {
    image: Option<String>,
    limit: Option<usize>,
}

/// Add-person form. Text fields may arrive empty from a form; those count as absent.
#[derive(Debug, Deserialize)]
struct AddPersonRequest {
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "lenient_age")]
    age: Option<u32>,
    nickname: Option<String>,
    police_station: Option<String>,
    crime: Option<String>,
    sections: Option<String>,
    arrest_datetime: Option<String>,
    photo: Option<String>,
}

/// Outcome of `/get-image`: a known person, or the `NEW` marker.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Identification {
    Match(Candidate),
    Unknown { id: &'static str, confidence: f32 },
}

/// Accept an age as a JSON number or a numeric string; blank means absent.
fn lenient_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid age: {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid age: {s}"))),
        Some(other) => Err(D::Error::custom(format!("invalid age: {other}"))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_body<T: DeserializeOwned>(body: Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

fn require_image(image: Option<String>) -> ApiResult<String> {
    image
        .filter(|i| !i.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))
}

/// Decode a data URL off the async runtime, then embed its best face.
async fn embed_data_url(state: &AppState, data_url: String) -> ApiResult<FaceSample> {
    let image = tokio::task::spawn_blocking(move || dataurl::decode_image(&data_url))
        .await
        .map_err(|e| ApiError::Internal(format!("decode task failed: {e}")))??;
    tracing::debug!(width = image.width(), height = image.height(), "probe decoded");
    Ok(state.embedder.embed(image).await?)
}

/// POST /get-image
async fn get_image(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let req: ImageRequest = parse_body(body)?;
    let image = require_image(req.image)?;
    let sample = embed_data_url(&state, image).await?;

    let gallery = state.store.gallery().await?;
    let threshold = state.config.similarity_threshold;
    let result = CosineMatcher.compare(&sample.embedding, &gallery, threshold);

    tracing::info!(
        matched = result.matched,
        similarity = result.similarity,
        gallery = gallery.len(),
        face_confidence = sample.confidence,
        "identify"
    );

    let identification = match result.person {
        Some(person) if result.matched => Identification::Match(Candidate {
            person,
            score: result.similarity,
        }),
        _ => Identification::Unknown {
            id: "NEW",
            confidence: result.similarity,
        },
    };

    Ok(Json(json!({ "status": "success", "result": identification })))
}

/// POST /search
async fn search(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let req: ImageRequest = parse_body(body)?;
    let image = require_image(req.image)?;
    let limit = req.limit.unwrap_or(state.config.search_limit);
    let sample = embed_data_url(&state, image).await?;

    let gallery = state.store.gallery().await?;
    let candidates = CosineMatcher.rank(&sample.embedding, &gallery, limit, state.config.search_floor);

    tracing::info!(candidates = candidates.len(), gallery = gallery.len(), limit, "search");
    Ok(Json(json!({ "status": "success", "candidates": candidates })))
}

/// GET /get-person/:id
async fn get_person(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let person = state
        .store
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Person not found: {id}")))?;
    Ok(Json(json!({ "status": "success", "result": person })))
}

/// POST /add-person
async fn add_person(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let req: AddPersonRequest = parse_body(body)?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }
    let photo = require_image(req.photo)?;
    let sample = embed_data_url(&state, photo.clone()).await?;

    let person = PersonRecord {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        age: req.age,
        nickname: non_empty(req.nickname),
        police_station: non_empty(req.police_station),
        crime: non_empty(req.crime),
        sections: non_empty(req.sections),
        arrest_datetime: non_empty(req.arrest_datetime),
        photo: Some(photo),
        created_at: Utc::now().to_rfc3339(),
    };

    state.store.insert(person.clone(), sample.embedding).await?;
    tracing::info!(id = %person.id, name = %person.name, face_confidence = sample.confidence, "person enrolled");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "result": person })),
    ))
}

/// GET /persons
async fn list_persons(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let persons = state.store.list().await?;
    Ok(Json(json!({ "status": "success", "persons": persons })))
}

/// DELETE /persons/:id
async fn remove_person(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    if !state.store.remove(&id).await? {
        return Err(ApiError::NotFound(format!("Person not found: {id}")));
    }
    tracing::info!(id = %id, "person removed");
    Ok(Json(json!({ "status": "success", "removed": id })))
}

pub fn recognition_routes() -> Router<AppState> {
    Router::new()
        .route("/get-image", post(get_image))
        .route("/search", post(search))
        .route("/get-person/:id", get(get_person))
        .route("/add-person", post(add_person))
        .route("/persons", get(list_persons))
        .route("/persons/:id", delete(remove_person))
}
