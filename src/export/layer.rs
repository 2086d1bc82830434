use crate::{
    errors::ImageError,
    image::ContentDigest,
    manifest::Link,
    progress::ProgressTracker,
    registry::Source,
};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};

/// Writes a blob to disk, hashing and counting as it goes
struct LayerWriter {
    file: BufWriter<File>,
    path: PathBuf,
    hasher: Sha256,
    written: u64,
}

impl LayerWriter {
    async fn create(path: &Path) -> Result<Self, ImageError> {
        let file = File::create(path)
            .await
            .map_err(ImageError::at_path(path))?;
        Ok(LayerWriter {
            file: BufWriter::new(file),
            path: path.to_owned(),
            hasher: Sha256::new(),
            written: 0,
        })
    }

    async fn write_all(&mut self, chunk: &[u8]) -> Result<u64, ImageError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(ImageError::at_path(&self.path))?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;
        Ok(self.written)
    }

    /// Flush buffered I/O and return the byte count and content digest
    async fn finalize(mut self) -> Result<(u64, ContentDigest), ImageError> {
        self.file
            .flush()
            .await
            .map_err(ImageError::at_path(&self.path))?;
        Ok((self.written, ContentDigest::from_hasher(self.hasher)))
    }
}

/// Download one layer blob into `destination`
///
/// The file is written as the blob streams in. Once the stream ends, the
/// byte count is checked against the size declared in the manifest and the
/// content is checked against its digest. Any failure is reported with the
/// layer's digest attached.
pub async fn retrieve(
    source: &dyn Source,
    layer: &Link,
    destination: &Path,
    tracker: ProgressTracker,
) -> Result<u64, ImageError> {
    retrieve_inner(source, layer, destination, tracker)
        .await
        .map_err(ImageError::in_layer(&layer.digest))
}

async fn retrieve_inner(
    source: &dyn Source,
    layer: &Link,
    destination: &Path,
    mut tracker: ProgressTracker,
) -> Result<u64, ImageError> {
    let mut blob = source.blob(&layer.digest, &layer.urls, layer.size).await?;
    tracker.begin(layer.size.or(blob.size));
    log::debug!("{} writing to {:?}", layer.digest, destination);

    let mut writer = LayerWriter::create(destination).await?;
    while let Some(chunk) = blob.stream.next().await {
        let written = writer.write_all(&chunk?).await?;
        tracker.progress(written);
    }
    let (written, found) = writer.finalize().await?;

    if let Some(expected) = layer.size {
        if written != expected {
            return Err(ImageError::UnexpectedContentSize {
                digest: layer.digest.clone(),
                expected,
                found: written,
            });
        }
    }
    if layer.digest.is_sha256() && found != layer.digest {
        return Err(ImageError::ContentDigestMismatch {
            expected: layer.digest.clone(),
            found,
        });
    }

    tracker.complete();
    log::info!("{} complete, {} bytes", layer.digest, written);
    Ok(written)
}
