use std::path::PathBuf;

/// Error taxonomy for the HLS variant-playlist download core.
///
/// Kind names are contractual: callers match on variant, not message text.
#[derive(Debug, thiserror::Error)]
pub enum HlsError {
    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("language could not be resolved: {0}")]
    LanguageUnresolved(String),

    #[error("unsupported key system: {method}{}", keyformat.as_deref().map(|k| format!(" ({k})")).unwrap_or_default())]
    UnsupportedKeySystem {
        method: String,
        keyformat: Option<String>,
    },

    #[error("none of the key systems are supported: {0:?}")]
    UnsupportedKeySystems(Vec<String>),

    #[error("licensing failed: {0}")]
    LicenseFailed(String),

    #[error("missing {expected} segment file(s) for range {first}-{last} (found {found})")]
    MissingSegments {
        first: usize,
        last: usize,
        expected: usize,
        found: usize,
    },

    #[error("malformed byterange {0:?}")]
    MalformedRange(String),

    #[error("merge tool not found: {0}")]
    MergeToolMissing(String),

    #[error("transport error fetching {url}: {message}")]
    TransportError { url: String, message: String },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, HlsError>;
