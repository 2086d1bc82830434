//! Save an image from a registry into a legacy `.tgz` archive

use crate::{
    archive::archive,
    errors::ImageError,
    export::{workdir_name, LegacyExporter},
    image::{host_architecture, ContentDigest, ImageReference, PlatformFilter, DEFAULT_MIRROR},
    registry::{Credentials, RegistryClient, Source},
    resolver::{NestedFilterOrder, Resolver},
};
use std::{path::PathBuf, sync::Arc};

/// Everything one save operation needs to know
#[derive(Clone, Debug)]
pub struct SaveOptions {
    locator: String,
    os: Vec<String>,
    architecture: Vec<String>,
    output: Option<PathBuf>,
    work_root: PathBuf,
    mirror: String,
    credentials: Option<Credentials>,
    insecure: bool,
    show_progress: bool,
    nested_order: NestedFilterOrder,
}

impl SaveOptions {
    /// Options for saving `locator`, for the host architecture and any OS
    pub fn new(locator: &str) -> Self {
        SaveOptions {
            locator: locator.to_owned(),
            os: vec![],
            architecture: vec![host_architecture().to_owned()],
            output: None,
            work_root: PathBuf::from("."),
            mirror: DEFAULT_MIRROR.to_owned(),
            credentials: None,
            insecure: false,
            show_progress: false,
            nested_order: NestedFilterOrder::default(),
        }
    }

    /// Accepted OS patterns, in order; empty accepts any OS
    pub fn os<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        self.os = patterns.iter().map(|s| s.as_ref().to_owned()).collect();
        self
    }

    /// Accepted architecture patterns, in order; empty accepts any
    pub fn arch<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        self.architecture = patterns.iter().map(|s| s.as_ref().to_owned()).collect();
        self
    }

    /// Archive path; defaults to the working directory name plus `.tgz`
    pub fn output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Directory the working directory and default output are placed in
    pub fn work_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.work_root = path.into();
        self
    }

    /// Registry host used when the locator doesn't name one
    pub fn mirror(mut self, host: &str) -> Self {
        self.mirror = host.to_owned();
        self
    }

    pub fn credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn nested_order(mut self, order: NestedFilterOrder) -> Self {
        self.nested_order = order;
        self
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn filter(&self) -> PlatformFilter {
        PlatformFilter::new(&self.os[..], &self.architecture[..])
    }

    /// Where the working directory for this locator goes
    pub fn workdir_path(&self) -> PathBuf {
        self.work_root.join(workdir_name(&self.locator))
    }

    /// Where the archive will be written
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => self
                .work_root
                .join(format!("{}.tgz", workdir_name(&self.locator))),
        }
    }

    /// Parse the locator against the configured mirror
    pub fn reference(&self) -> Result<ImageReference, ImageError> {
        ImageReference::parse(&self.locator, &self.mirror)
    }
}

/// Save an image from its registry, returning the archive path
pub async fn save(options: &SaveOptions) -> Result<PathBuf, ImageError> {
    let reference = options.reference()?;
    let mut builder = RegistryClient::builder().insecure(options.insecure);
    if let Some(credentials) = &options.credentials {
        builder = builder.login(reference.registry_host(), credentials.clone());
    }
    let client = builder.build(&reference)?;
    save_from(options, Arc::new(client)).await
}

/// Save an image from any [Source], returning the archive path
///
/// Resolves the top-level manifest to one image, exports it into a working
/// directory, archives that directory, and removes it again.
pub async fn save_from(
    options: &SaveOptions,
    source: Arc<dyn Source>,
) -> Result<PathBuf, ImageError> {
    let reference = options.reference()?;
    let filter = options.filter();
    log::info!(
        "{} saving for os[{}] architecture[{}]",
        reference,
        filter.os_str(),
        filter.architecture_str()
    );

    let (bytes, kind) = source.manifest(None).await?;
    let resolved = Resolver::new(&*source)
        .nested_order(options.nested_order)
        .resolve_one(&reference, bytes, kind, &filter)
        .await?;

    let config = resolved.node.config().ok_or(ImageError::MissingConfig)?;
    let config_bytes = source
        .blob_bytes(&config.digest, &config.urls, config.size)
        .await?;
    let found = ContentDigest::from_content(&config_bytes);
    if config.digest.is_sha256() && found != config.digest {
        return Err(ImageError::ContentDigestMismatch {
            expected: config.digest.clone(),
            found,
        });
    }

    let output = options.output_path();
    let export = LegacyExporter::new(source.clone(), reference)
        .show_progress(options.show_progress)
        .export(&resolved, &config_bytes, &options.workdir_path())
        .await?;
    archive(export.workdir.path(), &output).await?;
    export.workdir.remove().await?;
    Ok(output)
}
