//! Pack a finished export directory into a gzip-compressed tar file

use crate::errors::ImageError;
use flate2::{write::GzEncoder, Compression};
use std::{
    fs::{self, File},
    io::{BufWriter, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::task;
use walkdir::WalkDir;

/// Write the contents of `source_dir` into a `.tgz` at `destination`
///
/// Entry names are relative to `source_dir`, and the directory itself gets
/// no entry of its own. An existing file at `destination` is replaced.
pub async fn archive(source_dir: &Path, destination: &Path) -> Result<(), ImageError> {
    let source_dir = source_dir.to_owned();
    let destination = destination.to_owned();
    task::spawn_blocking(move || archive_blocking(&source_dir, &destination)).await?
}

fn archive_blocking(source_dir: &Path, destination: &Path) -> Result<(), ImageError> {
    match fs::remove_file(destination) {
        Ok(()) => log::debug!("removed previous archive {:?}", destination),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(ImageError::at_path(destination)(err)),
    }
    log::info!("tar {:?} -> {:?}", source_dir, destination);

    let file = File::create(destination).map_err(ImageError::at_path(destination))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| walk_error(source_dir, err))?;
        let name = entry
            .path()
            .strip_prefix(source_dir)
            .map(Path::to_owned)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
        let appended = if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())
        } else {
            builder.append_path_with_name(entry.path(), &name)
        };
        appended.map_err(ImageError::at_path(entry.path()))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(ImageError::at_path(destination))?;
    let mut writer = encoder.finish().map_err(ImageError::at_path(destination))?;
    std::io::Write::flush(&mut writer).map_err(ImageError::at_path(destination))?;
    Ok(())
}

fn walk_error(source_dir: &Path, err: walkdir::Error) -> ImageError {
    let path = err
        .path()
        .map(Path::to_owned)
        .unwrap_or_else(|| source_dir.to_owned());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::new(ErrorKind::Other, "filesystem loop"));
    ImageError::Path { path, source }
}
