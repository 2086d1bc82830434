//! Lay out a resolved image as a legacy `docker save` directory
//!
//! The directory holds the config blob, one subdirectory per layer keyed by
//! its chain ID, a `manifest.json` describing the whole image, and a
//! `repositories` file mapping the tag to the top layer.

#[cfg(test)] mod tests;

mod layer;
mod workdir;

pub use layer::retrieve;
pub use workdir::{workdir_name, WorkDir};

use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageReference},
    json,
    manifest::Link,
    progress::Progress,
    registry::Source,
    resolver::ResolvedManifest,
};
use futures_util::{stream::FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, path::Path, sync::Arc};
use tokio::{fs, task};

/// Contents of each layer directory's `VERSION` file
pub const LAYER_VERSION: &str = "1.0";

/// Placeholder metadata for every layer except the last
const EMPTY_LAYER_JSON: &str = r#"{"created":"1970-01-01T00:00:00Z","container_config":{"Hostname":"","Domainname":"","User":"","AttachStdin":false,"AttachStdout":false,"AttachStderr":false,"Tty":false,"OpenStdin":false,"StdinOnce":false,"Env":null,"Cmd":null,"Image":"","Volumes":null,"WorkingDir":"","Entrypoint":null,"OnBuild":null,"Labels":null}}"#;

/// One layer's place in the exported directory
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExportLayer {
    pub link: Link,
    /// Position in the layer list, base layer first
    pub ordinal: usize,
    pub chain_id: String,
    /// Chain ID of the layer below, empty for the base layer
    pub parent_chain_id: String,
}

impl ExportLayer {
    /// Archive-relative path of this layer's tar file
    pub fn tar_path(&self) -> String {
        format!("{}/layer.tar", self.chain_id)
    }
}

/// Compute chain IDs for an ordered layer list
///
/// Each ID is the hex sha256 of the parent's ID followed by the layer's
/// digest string, starting from an empty parent. The ID is therefore a
/// deterministic function of the layer and everything below it.
pub fn chain_layers(layers: &[Link]) -> Vec<ExportLayer> {
    let mut parent = String::new();
    layers
        .iter()
        .enumerate()
        .map(|(ordinal, link)| {
            let chain_id = chain_id(&parent, &link.digest);
            ExportLayer {
                link: link.clone(),
                ordinal,
                chain_id: chain_id.clone(),
                parent_chain_id: std::mem::replace(&mut parent, chain_id),
            }
        })
        .collect()
}

pub fn chain_id(parent: &str, digest: &ContentDigest) -> String {
    let mut input = String::with_capacity(parent.len() + digest.as_str().len());
    input.push_str(parent);
    input.push_str(digest.as_str());
    ContentDigest::from_content(input.as_bytes())
        .hex_str()
        .to_owned()
}

/// Metadata written beside each `layer.tar`
///
/// Lower layers get a fixed placeholder, the last layer gets the image
/// config minus its `history` and `rootfs` sections. Both get the layer's
/// own `id` and, above the base layer, its `parent`.
pub fn layer_json(
    config: &Map<String, Value>,
    layer: &ExportLayer,
    is_last: bool,
) -> Result<Vec<u8>, ImageError> {
    let mut object = if is_last {
        let mut object = config.clone();
        object.remove("history");
        object.remove("rootfs");
        object
    } else {
        serde_json::from_str(EMPTY_LAYER_JSON)?
    };
    object.insert("id".to_owned(), Value::String(layer.chain_id.clone()));
    if layer.ordinal > 0 {
        object.insert(
            "parent".to_owned(),
            Value::String(layer.parent_chain_id.clone()),
        );
    }
    Ok(json::to_vec(&object)?)
}

/// Parse a config blob, which must be a json object
pub fn parse_config(config_bytes: &[u8]) -> Result<Map<String, Value>, ImageError> {
    match serde_json::from_slice(config_bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(ImageError::MalformedConfig),
    }
}

/// One entry of `manifest.json`
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExportManifestEntry {
    #[serde(rename = "Config")]
    pub config: String,
    #[serde(rename = "RepoTags")]
    pub repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    pub layers: Vec<String>,
}

/// Tags recorded for the image, in `name:tag` form
pub fn repo_tags(reference: &ImageReference) -> Vec<String> {
    if reference.tag_defaulted() {
        vec![format!("{}:{}", reference.as_str(), reference.tag())]
    } else {
        vec![reference.as_str().to_owned()]
    }
}

/// The `repositories` file, mapping the locator and tag to the top layer's
/// chain ID
pub fn repositories_json(
    reference: &ImageReference,
    top_layer: &str,
) -> Result<Vec<u8>, ImageError> {
    let mut tags = BTreeMap::new();
    tags.insert(reference.tag(), top_layer);
    let mut repositories = BTreeMap::new();
    repositories.insert(reference.as_str(), tags);
    Ok(json::to_vec(&repositories)?)
}

/// A finished export, still on disk
#[derive(Debug)]
pub struct Export {
    pub workdir: WorkDir,
    pub layers: Vec<ExportLayer>,
    pub manifest: ExportManifestEntry,
}

/// Writes a resolved image into a working directory
pub struct LegacyExporter {
    source: Arc<dyn Source>,
    reference: ImageReference,
    show_progress: bool,
}

impl LegacyExporter {
    pub fn new(source: Arc<dyn Source>, reference: ImageReference) -> Self {
        LegacyExporter {
            source,
            reference,
            show_progress: false,
        }
    }

    /// Draw download progress bars on stderr
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Export `resolved` into a fresh directory at `destination`
    ///
    /// Any existing directory there is removed first. Layer blobs download
    /// concurrently while the metadata is written; the first download error
    /// cancels the rest. On failure the directory is removed again.
    pub async fn export(
        &self,
        resolved: &ResolvedManifest,
        config_bytes: &[u8],
        destination: &Path,
    ) -> Result<Export, ImageError> {
        let config_link = resolved.node.config().ok_or(ImageError::MissingConfig)?;
        let config = parse_config(config_bytes)?;
        let workdir = WorkDir::create(destination).await?;
        let config_name = format!("{}.json", config_link.digest.hex_str());
        write_file(&workdir.path().join(&config_name), config_bytes).await?;

        let layers = chain_layers(&resolved.node.layers());
        let mut manifest = ExportManifestEntry {
            config: config_name,
            repo_tags: repo_tags(&self.reference),
            layers: Vec::with_capacity(layers.len()),
        };
        log::info!(
            "{} exporting {} layers to {:?}",
            self.reference,
            layers.len(),
            workdir.path()
        );

        let (mut progress, display) = Progress::start(self.show_progress);
        let mut tasks = FuturesUnordered::new();
        let spawn_result: Result<(), ImageError> = async {
            for layer in &layers {
                let layer_dir = workdir.path().join(&layer.chain_id);
                fs::create_dir_all(&layer_dir)
                    .await
                    .map_err(ImageError::at_path(&layer_dir))?;

                let tracker = progress.tracker(&layer.link.digest);
                let source = self.source.clone();
                let link = layer.link.clone();
                let tar_path = layer_dir.join("layer.tar");
                tasks.push(task::spawn(async move {
                    retrieve(&*source, &link, &tar_path, tracker).await
                }));

                write_file(&layer_dir.join("VERSION"), LAYER_VERSION.as_bytes()).await?;
                let is_last = layer.ordinal + 1 == layers.len();
                write_file(
                    &layer_dir.join("json"),
                    &layer_json(&config, layer, is_last)?,
                )
                .await?;
                manifest.layers.push(layer.tar_path());
            }
            Ok(())
        }
        .await;

        let mut first_error = spawn_result.err();
        if first_error.is_some() {
            tasks.iter().for_each(|task| task.abort());
        }
        while let Some(joined) = tasks.next().await {
            let result = match joined {
                Ok(result) => result.map(|_| ()),
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = result {
                if first_error.is_none() {
                    log::error!("{}", err);
                    tasks.iter().for_each(|task| task.abort());
                    first_error = Some(err);
                }
            }
        }
        display.finish(progress).await?;
        if let Some(err) = first_error {
            return Err(err);
        }

        write_file(
            &workdir.path().join("manifest.json"),
            &json::to_vec(&[&manifest])?,
        )
        .await?;
        let top_layer = layers.last().map(|l| l.chain_id.as_str()).unwrap_or_default();
        write_file(
            &workdir.path().join("repositories"),
            &repositories_json(&self.reference, top_layer)?,
        )
        .await?;

        Ok(Export {
            workdir,
            layers,
            manifest,
        })
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), ImageError> {
    fs::write(path, contents)
        .await
        .map_err(ImageError::at_path(path))
}
