//! Registry sources: where manifests and blobs come from
//!
//! The resolver and exporter only ever talk to a [Source]. The
//! [RegistryClient] implements it over the registry HTTP API, and
//! [MemorySource] implements it from data already in memory.

mod auth;
mod builder;
mod client;
mod memory;

pub use builder::RegistryClientBuilder;
pub use client::RegistryClient;
pub use memory::MemorySource;

use crate::{errors::ImageError, image::ContentDigest, manifest::MediaKind};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream::BoxStream, StreamExt};

/// Most memory [Source::blob_bytes] reserves up front, whatever size the
/// source claims
const PREALLOCATE_LIMIT: u64 = 1 << 20;

/// Environment variable consulted for a password when only a username is
/// given
pub const PASSWORD_ENV: &str = "REGISTRY_PASSWORD";

/// Access to the manifests and blobs of one image repository
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetch a manifest by digest, or the manifest for the opened reference
    /// when `digest` is `None`
    async fn manifest(
        &self,
        digest: Option<&ContentDigest>,
    ) -> Result<(Vec<u8>, MediaKind), ImageError>;

    /// Open a stream of blob content
    ///
    /// `urls` lists alternate locations the blob may be fetched from, and
    /// `expected_size` is the size declared by the referencing manifest, if
    /// known.
    async fn blob(
        &self,
        digest: &ContentDigest,
        urls: &[String],
        expected_size: Option<u64>,
    ) -> Result<Blob, ImageError>;

    /// Fetch an entire blob into memory
    ///
    /// The buffer grows with the content actually received, so a bogus size
    /// from the manifest or the server can't force a huge allocation.
    async fn blob_bytes(
        &self,
        digest: &ContentDigest,
        urls: &[String],
        expected_size: Option<u64>,
    ) -> Result<Vec<u8>, ImageError> {
        let mut blob = self.blob(digest, urls, expected_size).await?;
        let capacity = blob.size.unwrap_or(0).min(PREALLOCATE_LIMIT) as usize;
        let mut buffer = Vec::with_capacity(capacity);
        while let Some(chunk) = blob.stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer)
    }
}

/// A blob being downloaded
pub struct Blob {
    /// Actual size reported by the source, if it knows
    pub size: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes, ImageError>>,
}

/// Optional login for a registry
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    /// Combine a username and password from the command line with a
    /// password from the environment
    ///
    /// The environment value is only used when a username is given without a
    /// password. Returns `None` when there is no username at all.
    pub fn resolve(
        username: Option<&str>,
        password: Option<&str>,
        env_password: Option<String>,
    ) -> Option<Self> {
        let username = username.filter(|u| !u.is_empty())?;
        let password = match password.filter(|p| !p.is_empty()) {
            Some(password) => Some(password.to_owned()),
            None => env_password.filter(|p| !p.is_empty()),
        };
        Some(Credentials {
            username: username.to_owned(),
            password,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
