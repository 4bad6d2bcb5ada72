use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Serialize the vector as packed little-endian f32 for blob storage.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Inverse of [`to_le_bytes`](Self::to_le_bytes). Trailing bytes that do
    /// not form a whole f32 are ignored.
    pub fn from_le_bytes(bytes: &[u8], model_version: Option<String>) -> Self {
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self { values, model_version }
    }
}

/// Display fields of a person known to the gallery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub police_station: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrest_datetime: Option<String>,
    /// Photo as a data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

/// A gallery entry: a person record together with its enrolled embedding.
#[derive(Debug, Clone)]
pub struct EnrolledFace {
    pub person: PersonRecord,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best entry [-1, 1], 0.0 for an empty gallery.
    pub similarity: f32,
    /// Matched person (only when `matched`).
    pub person: Option<PersonRecord>,
}

/// One ranked candidate from a gallery search.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub person: PersonRecord,
    pub score: f32,
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    /// Best single match. A match requires a similarity strictly above `threshold`.
    fn compare(&self, probe: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult;

    /// Up to `limit` candidates with similarity >= `floor`, best first.
    fn rank(&self, probe: &Embedding, gallery: &[EnrolledFace], limit: usize, floor: f32)
        -> Vec<Candidate>;
}

/// Cosine similarity matcher.
///
/// `compare` always iterates every gallery entry so response time does not
/// depend on where the match sits in the gallery.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let sim = probe.similarity(&entry.embedding);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim > threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                person: Some(gallery[idx].person.clone()),
            },
            _ => MatchResult {
                matched: false,
                similarity: if best_sim == f32::NEG_INFINITY { 0.0 } else { best_sim },
                person: None,
            },
        }
    }

    fn rank(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledFace],
        limit: usize,
        floor: f32,
    ) -> Vec<Candidate> {
        let mut scored: Vec<(usize, f32)> = gallery
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, probe.similarity(&entry.embedding)))
            .filter(|(_, sim)| *sim >= floor)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(i, score)| Candidate {
                person: gallery[i].person.clone(),
                score,
            })
            .collect()
    }
}
