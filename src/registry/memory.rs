use crate::{
    errors::ImageError,
    image::ContentDigest,
    manifest::MediaKind,
    registry::{Blob, Source},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use std::collections::HashMap;

const CHUNK_SIZE: usize = 16 * 1024;

/// A [Source] backed by manifests and blobs held in memory
///
/// Useful for exporting images that were obtained some other way, and for
/// testing.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    top: Option<(Vec<u8>, MediaKind)>,
    manifests: HashMap<ContentDigest, (Vec<u8>, MediaKind)>,
    blobs: HashMap<ContentDigest, Bytes>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    /// Set the manifest returned for the opened reference
    pub fn with_top_manifest(mut self, bytes: Vec<u8>, kind: MediaKind) -> Self {
        self.top = Some((bytes, kind));
        self
    }

    /// Store a manifest under its content digest, returning the digest
    pub fn insert_manifest(&mut self, bytes: Vec<u8>, kind: MediaKind) -> ContentDigest {
        let digest = ContentDigest::from_content(&bytes);
        self.manifests.insert(digest.clone(), (bytes, kind));
        digest
    }

    /// Store a blob under its content digest, returning the digest
    pub fn insert_blob(&mut self, bytes: Vec<u8>) -> ContentDigest {
        let digest = ContentDigest::from_content(&bytes);
        self.blobs.insert(digest.clone(), Bytes::from(bytes));
        digest
    }

    /// Store a blob under a digest of the caller's choosing
    pub fn insert_blob_as(&mut self, digest: ContentDigest, bytes: Vec<u8>) {
        self.blobs.insert(digest, Bytes::from(bytes));
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn manifest(
        &self,
        digest: Option<&ContentDigest>,
    ) -> Result<(Vec<u8>, MediaKind), ImageError> {
        let found = match digest {
            None => self.top.as_ref(),
            Some(digest) => self.manifests.get(digest),
        };
        found.cloned().ok_or_else(|| {
            ImageError::ManifestNotFound(match digest {
                None => "top-level manifest".to_owned(),
                Some(digest) => digest.to_string(),
            })
        })
    }

    async fn blob(
        &self,
        digest: &ContentDigest,
        _urls: &[String],
        _expected_size: Option<u64>,
    ) -> Result<Blob, ImageError> {
        let data = self
            .blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| ImageError::BlobNotFound(digest.clone()))?;
        let size = data.len() as u64;
        let chunks: Vec<Result<Bytes, ImageError>> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|offset| Ok(data.slice(offset..(offset + CHUNK_SIZE).min(data.len()))))
            .collect();
        Ok(Blob {
            size: Some(size),
            stream: stream::iter(chunks).boxed(),
        })
    }
}
