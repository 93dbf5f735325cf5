use thiserror::Error;

/// Failures surfaced by the rating core. Commands wrap these in `anyhow`
/// with context; the core never returns raw engine errors.
#[derive(Debug, Error)]
pub enum RatingError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("no ratings found for rater {rater_id}")]
    NoData { rater_id: String },

    #[error("manifest entry {image} has no image asset at {expected_path}")]
    MissingAsset {
        image: String,
        expected_path: String,
    },

    #[error("sample {sample_id} exported by rater {rater_id} is missing from the reference ranking")]
    MissingReference { rater_id: String, sample_id: String },

    #[error("rating store failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("i/o failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RatingError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn json(path: &std::path::Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.display().to_string(),
            source,
        }
    }

    /// Short machine-readable kind, used in submission responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NoData { .. } => "no_data",
            Self::MissingAsset { .. } => "missing_asset",
            Self::MissingReference { .. } => "missing_reference",
            Self::Storage(_) => "storage",
            Self::Io { .. } => "io",
            Self::Json { .. } => "json",
        }
    }
}

pub type RatingResult<T> = std::result::Result<T, RatingError>;
