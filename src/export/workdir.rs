use crate::errors::ImageError;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Name of the working directory for an image locator
///
/// Slashes become underscores. A locator with an explicit tag has its colon
/// replaced too, and one without a tag gets `_latest` appended, so that
/// `alpine` and `alpine:latest` share a directory.
pub fn workdir_name(locator: &str) -> String {
    let name = locator.replace('/', "_");
    if name.contains(':') {
        name.replace(':', "_")
    } else {
        format!("{}_latest", name)
    }
}

/// A working directory that removes itself unless kept
///
/// Dropping the guard deletes the directory and everything in it, so a
/// failed export leaves nothing behind.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Create an empty directory at `path`, replacing whatever was there
    pub async fn create(path: &Path) -> Result<Self, ImageError> {
        match fs::remove_dir_all(path).await {
            Ok(()) => log::debug!("removed previous working directory {:?}", path),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ImageError::WorkDirExists {
                    path: path.to_owned(),
                    source,
                })
            }
        }
        fs::create_dir_all(path)
            .await
            .map_err(ImageError::at_path(path))?;
        Ok(WorkDir {
            path: path.to_owned(),
            keep: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the directory on disk and return its path
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }

    /// Remove the directory now, reporting any error
    pub async fn remove(mut self) -> Result<(), ImageError> {
        self.keep = true;
        fs::remove_dir_all(&self.path)
            .await
            .map_err(ImageError::at_path(&self.path))
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(err) = std::fs::remove_dir_all(&self.path) {
                log::warn!("couldn't clean up {:?}, {}", self.path, err);
            }
        }
    }
}
