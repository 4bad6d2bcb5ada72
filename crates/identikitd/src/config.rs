use identikit_core::preprocess::{ToneTarget, PROBE_SIZE};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5000).
    pub bind: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite gallery database.
    pub db_path: PathBuf,
    /// Directory for side files written by the proxy (saved image URLs).
    pub data_dir: PathBuf,
    /// Recognition backend the `/api/*` proxy routes forward to.
    /// Defaults to this daemon's own backend routes.
    pub backend_url: String,
    /// Cosine similarity a probe must exceed to count as a match.
    pub similarity_threshold: f32,
    /// Default number of candidates returned by a search.
    pub search_limit: usize,
    /// Candidates scoring below this are dropped from searches.
    pub search_floor: f32,
    /// Side of the square probe canvas.
    pub probe_size: u32,
    pub tone: ToneTarget,
    /// Request body limit for image uploads, in bytes.
    pub max_upload_bytes: usize,
    /// Pending requests the engine thread will queue.
    pub engine_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        let bind = SocketAddr::from(([0, 0, 0, 0], 5000));
        Self {
            bind,
            model_dir: identikit_core::default_model_dir(),
            db_path: data_dir.join("persons.db"),
            backend_url: loopback_url(bind),
            data_dir,
            similarity_threshold: 0.45,
            search_limit: 5,
            search_floor: 0.0,
            probe_size: PROBE_SIZE,
            tone: ToneTarget::default(),
            max_upload_bytes: 10 * 1024 * 1024,
            engine_queue: 8,
        }
    }
}

impl Config {
    /// Load configuration from `IDENTIKIT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind = std::env::var("IDENTIKIT_BIND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.bind);

        let data_dir = env_path("IDENTIKIT_DATA_DIR").unwrap_or(defaults.data_dir);
        let db_path = env_path("IDENTIKIT_DB_PATH").unwrap_or_else(|| data_dir.join("persons.db"));

        Self {
            bind,
            model_dir: env_path("IDENTIKIT_MODEL_DIR").unwrap_or(defaults.model_dir),
            db_path,
            data_dir,
            backend_url: std::env::var("IDENTIKIT_BACKEND_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| loopback_url(bind)),
            similarity_threshold: env_parse("IDENTIKIT_SIMILARITY_THRESHOLD", defaults.similarity_threshold),
            search_limit: env_parse("IDENTIKIT_SEARCH_LIMIT", defaults.search_limit),
            search_floor: env_parse("IDENTIKIT_SEARCH_FLOOR", defaults.search_floor),
            probe_size: env_parse("IDENTIKIT_PROBE_SIZE", defaults.probe_size).max(1),
            tone: ToneTarget {
                brightness: env_parse("IDENTIKIT_TARGET_BRIGHTNESS", defaults.tone.brightness),
                contrast: env_parse("IDENTIKIT_TARGET_CONTRAST", defaults.tone.contrast),
            },
            max_upload_bytes: env_parse("IDENTIKIT_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            engine_queue: env_parse("IDENTIKIT_ENGINE_QUEUE", defaults.engine_queue).max(1),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir.join("det_10g.onnx").to_string_lossy().into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir.join("w600k_r50.onnx").to_string_lossy().into_owned()
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("identikit")
}

/// Loopback URL for the daemon's own backend routes.
fn loopback_url(bind: SocketAddr) -> String {
    format!("http://127.0.0.1:{}", bind.port())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
