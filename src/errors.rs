//! Error types you might see while resolving or exporting an image

use crate::image::ContentDigest;
use std::path::PathBuf;
use thiserror::Error;

/// Errors during image resolution, download, and export
#[derive(Error, Debug)]
pub enum ImageError {
    /// invalid image reference format
    #[error("invalid image reference format: {0:?}")]
    InvalidReferenceFormat(String),

    /// storage io error
    #[error("storage io error: {0}")]
    Storage(#[from] std::io::Error),

    /// filesystem error at a specific path
    #[error("filesystem error at {path:?}: {source}")]
    Path {
        path: PathBuf,
        source: std::io::Error,
    },

    /// an existing working directory could not be removed
    #[error("working directory {path:?} already exists and can't be removed: {source}")]
    WorkDirExists {
        path: PathBuf,
        source: std::io::Error,
    },

    /// json error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// asynchronous task failed during image export
    #[error("asynchronous task failed during image export")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// network request error
    #[error("network request error: {0}")]
    NetworkRequest(#[from] reqwest::Error),

    /// registry server answered with an unexpected status
    #[error("registry server answered {status} for {url}")]
    RegistryStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// registry server requested an unsupported type of authentication
    #[error("registry server requested an unsupported type of authentication: {0:?}")]
    UnsupportedAuthentication(String),

    /// manifest not found on the registry
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    /// blob not found on the registry
    #[error("blob not found: {0}")]
    BlobNotFound(ContentDigest),

    /// unsupported manifest media type
    #[error("unsupported manifest type: {0:?}")]
    UnsupportedManifestType(String),

    /// no manifest matched the platform filters
    #[error("{reference}: mismatch of os[{os}] or architecture[{architecture}]")]
    NoMatchingManifest {
        reference: String,
        os: String,
        architecture: String,
    },

    /// more than one manifest matched the platform filters
    #[error("{reference}: {count} manifests matched os[{os}] and architecture[{architecture}], expected exactly one")]
    AmbiguousManifest {
        reference: String,
        os: String,
        architecture: String,
        count: usize,
    },

    /// resolved image manifest does not reference a config blob
    #[error("image manifest has no config blob")]
    MissingConfig,

    /// image config blob is not a json object
    #[error("image config blob is not a json object")]
    MalformedConfig,

    /// unexpected content size
    #[error("unexpected content size for {digest}, expected {expected} bytes, found {found}")]
    UnexpectedContentSize {
        digest: ContentDigest,
        expected: u64,
        found: u64,
    },

    /// calculated digest of downloaded content is not what we asked for
    #[error("calculated digest of downloaded content is not what we asked for, expected {expected}, found {found}")]
    ContentDigestMismatch {
        expected: ContentDigest,
        found: ContentDigest,
    },

    /// failed while retrieving one layer
    #[error("layer {digest}: {source}")]
    Layer {
        digest: ContentDigest,
        source: Box<ImageError>,
    },
}

impl ImageError {
    /// Attach a filesystem path to an io error
    pub(crate) fn at_path<P: Into<PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ImageError::Path { path, source }
    }

    /// Attach a layer digest to any error
    pub(crate) fn in_layer(digest: &ContentDigest) -> impl FnOnce(ImageError) -> Self {
        let digest = digest.clone();
        move |source| ImageError::Layer {
            digest,
            source: Box::new(source),
        }
    }
}
