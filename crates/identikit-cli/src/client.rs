//! HTTP client for the identikit daemon.

use anyhow::{anyhow, bail, Context, Result};
use identikit_core::dataurl;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, Url};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// Frames discarded before a camera still is kept.
const CAMERA_WARMUP: usize = 5;
const CAMERA_MAX_ATTEMPTS: usize = 30;
const STILL_SIZE: u32 = 320;

/// Where a probe photo comes from.
pub enum Probe {
    /// Image file, uploaded as a multipart `file` part.
    File(PathBuf),
    /// Camera still already encoded as a data URL.
    Still(String),
}

impl Probe {
    /// Snap a square still from a V4L2 device.
    pub async fn from_camera(device: String) -> Result<Self> {
        let url = capture_data_url(device).await?;
        Ok(Probe::Still(url))
    }
}

/// Capture a still off the async runtime and encode it as a PNG data URL.
pub async fn capture_data_url(device: String) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        let camera = identikit_capture::Camera::open(&device)
            .with_context(|| format!("failed to open camera {device}"))?;
        let frame = camera.capture_still(CAMERA_WARMUP, CAMERA_MAX_ATTEMPTS)?;
        tracing::info!(
            device = %device,
            width = frame.width(),
            height = frame.height(),
            seq = frame.sequence,
            "captured still"
        );
        Ok(frame.to_still_data_url(STILL_SIZE)?)
    })
    .await?
}

pub struct Client {
    http: reqwest::Client,
    base: Url,
}

impl Client {
    pub fn new(server: &str) -> Result<Self> {
        let base = Url::parse(server).with_context(|| format!("invalid server URL: {server}"))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("server URL cannot carry a path: {}", self.base))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn read(res: Response) -> Result<Value> {
        let status = res.status();
        let text = res.text().await?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));
        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            bail!("server returned {status}: {message}");
        }
        Ok(body)
    }

    async fn upload(&self, path: &str, probe: &Probe, limit: Option<usize>) -> Result<Value> {
        let url = self.url(&["api", path])?;
        let request = match probe {
            Probe::File(file) => {
                let mut form = Form::new().part("file", file_part(file).await?);
                if let Some(limit) = limit {
                    form = form.text("limit", limit.to_string());
                }
                self.http.post(url).multipart(form)
            }
            Probe::Still(image) => {
                let mut body = json!({ "image": image });
                if let Some(limit) = limit {
                    body["limit"] = json!(limit);
                }
                self.http.post(url).json(&body)
            }
        };
        tracing::debug!(path, "uploading probe");
        Self::read(request.send().await?).await
    }

    /// Identify the face in a probe; yields a person record or `{"id": "NEW", ...}`.
    pub async fn identify(&self, probe: &Probe) -> Result<Value> {
        self.upload("face-detect", probe, None).await
    }

    /// Closest enrolled persons, best first.
    pub async fn search(&self, probe: &Probe, limit: Option<usize>) -> Result<Vec<Value>> {
        let body = self.upload("face-search", probe, limit).await?;
        match body.get("candidates") {
            Some(Value::Array(candidates)) => Ok(candidates.clone()),
            _ => bail!("malformed search response: {body}"),
        }
    }

    pub async fn person(&self, id: &str) -> Result<Value> {
        let url = self.url(&["api", "face-detect"])?;
        Self::read(self.http.get(url).query(&[("id", id)]).send().await?).await
    }

    /// Enroll a person; `form` carries the record fields plus a `photo` data URL.
    pub async fn add_person(&self, form: &Value) -> Result<Value> {
        let url = self.url(&["api", "add-person"])?;
        Self::read(self.http.post(url).json(form).send().await?).await
    }

    pub async fn list(&self) -> Result<Vec<Value>> {
        let body = Self::read(self.http.get(self.url(&["persons"])?).send().await?).await?;
        match body.get("persons") {
            Some(Value::Array(persons)) => Ok(persons.clone()),
            _ => bail!("malformed list response: {body}"),
        }
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let url = self.url(&["persons", id])?;
        Self::read(self.http.delete(url).send().await?).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<Value> {
        Self::read(self.http.get(self.url(&["health"])?).send().await?).await
    }

    pub async fn save_image_url(&self, image_url: &str) -> Result<()> {
        let url = self.url(&["api", "save-image-url"])?;
        Self::read(self.http.post(url).json(&json!({ "url": image_url })).send().await?).await?;
        Ok(())
    }
}

async fn file_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "probe".to_string());
    let mime = dataurl::mime_for_file(path, &bytes);
    Ok(Part::bytes(bytes).file_name(file_name).mime_str(mime)?)
}
