//! Resolve a manifest tree down to the one image manifest for a platform

use crate::{
    errors::ImageError,
    image::{
        platform_matches, ContentDigest, ImageReference, PlatformDescriptor, PlatformFilter,
        PlatformPattern,
    },
    manifest::{ManifestList, ManifestNode, MediaKind, PlatformLink},
    registry::Source,
};
use futures_util::future::{BoxFuture, FutureExt};

/// How the OS and architecture filters are handed to manifest lists nested
/// inside other lists
///
/// The legacy tool this format comes from passes the two axes to nested
/// lists in swapped positions. `Swapped` keeps that behavior and is the
/// default; `Straight` passes them through unchanged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NestedFilterOrder {
    Swapped,
    Straight,
}

impl Default for NestedFilterOrder {
    fn default() -> Self {
        NestedFilterOrder::Swapped
    }
}

/// The single image manifest chosen for export
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedManifest {
    pub node: ManifestNode,
    pub bytes: Vec<u8>,
    pub digest: ContentDigest,
}

/// Outcome of resolving one node of the manifest tree
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolution {
    /// The node itself, with its child list filtered if it is a list
    pub node: ManifestNode,
    /// Serialized node; the original bytes unless filtering removed children
    pub bytes: Vec<u8>,
    /// Every image manifest accepted at or below this node
    pub resolved: Vec<ResolvedManifest>,
}

/// Walks manifest lists, fetching children from a [Source]
pub struct Resolver<'a> {
    source: &'a dyn Source,
    nested_order: NestedFilterOrder,
}

#[derive(Deserialize)]
struct ConfigPlatform {
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    os: String,
}

impl<'a> Resolver<'a> {
    pub fn new(source: &'a dyn Source) -> Self {
        Resolver {
            source,
            nested_order: NestedFilterOrder::default(),
        }
    }

    pub fn nested_order(mut self, order: NestedFilterOrder) -> Self {
        self.nested_order = order;
        self
    }

    /// Resolve a top-level manifest to exactly one image manifest
    ///
    /// Zero or several matches are errors naming the reference and filters.
    pub async fn resolve_one(
        &self,
        reference: &ImageReference,
        bytes: Vec<u8>,
        kind: MediaKind,
        filter: &PlatformFilter,
    ) -> Result<ResolvedManifest, ImageError> {
        let resolution = self
            .resolve(bytes, kind, &filter.os, &filter.architecture, false)
            .await?;
        let mut resolved = resolution.map(|r| r.resolved).unwrap_or_default();
        match resolved.len() {
            0 => Err(ImageError::NoMatchingManifest {
                reference: reference.to_string(),
                os: filter.os_str(),
                architecture: filter.architecture_str(),
            }),
            1 => {
                let manifest = resolved.remove(0);
                log::info!("{} resolved to {}", reference, manifest.digest);
                Ok(manifest)
            }
            count => Err(ImageError::AmbiguousManifest {
                reference: reference.to_string(),
                os: filter.os_str(),
                architecture: filter.architecture_str(),
                count,
            }),
        }
    }

    /// Resolve one node of the manifest tree
    ///
    /// Returns `None` when the node, or every child of a list, was rejected
    /// by the platform filters. `parent_is_list` suppresses the platform
    /// check on single-image manifests, since the list entry that led here
    /// already carried authoritative platform information.
    pub fn resolve<'b>(
        &'b self,
        bytes: Vec<u8>,
        kind: MediaKind,
        os: &'b [PlatformPattern],
        architecture: &'b [PlatformPattern],
        parent_is_list: bool,
    ) -> BoxFuture<'b, Result<Option<Resolution>, ImageError>> {
        async move {
            let accepted = match ManifestNode::parse(&bytes, kind)? {
                ManifestNode::V2List(list) => {
                    return self
                        .resolve_list(list, bytes, MediaKind::V2List, os, architecture)
                        .await
                }
                ManifestNode::CurrentIndex(list) => {
                    return self
                        .resolve_list(list, bytes, MediaKind::CurrentIndex, os, architecture)
                        .await
                }
                node if parent_is_list => node,
                ManifestNode::LegacyV1(m) | ManifestNode::LegacyV1Signed(m)
                    if !platform_matches(
                        os,
                        architecture,
                        &PlatformDescriptor::new("", &m.architecture),
                    ) =>
                {
                    log::debug!("rejecting schema 1 manifest for {:?}", m.architecture);
                    return Ok(None);
                }
                ManifestNode::V2Image(m) => {
                    let platform = self.config_platform(&m.config.digest, &m.config.urls).await?;
                    if !platform_matches(os, architecture, &platform) {
                        log::debug!("rejecting image manifest for {:?}", platform);
                        return Ok(None);
                    }
                    ManifestNode::V2Image(m)
                }
                // OCI image manifests carry no platform information
                node => node,
            };
            Ok(Some(image_resolution(accepted, bytes)))
        }
        .boxed()
    }

    async fn config_platform(
        &self,
        digest: &ContentDigest,
        urls: &[String],
    ) -> Result<PlatformDescriptor, ImageError> {
        let config_bytes = self.source.blob_bytes(digest, urls, None).await?;
        let found: ConfigPlatform = serde_json::from_slice(&config_bytes)?;
        Ok(PlatformDescriptor::new(&found.os, &found.architecture))
    }

    async fn resolve_list(
        &self,
        mut list: ManifestList,
        bytes: Vec<u8>,
        kind: MediaKind,
        os: &[PlatformPattern],
        architecture: &[PlatformPattern],
    ) -> Result<Option<Resolution>, ImageError> {
        let (child_os, child_architecture) = match self.nested_order {
            NestedFilterOrder::Swapped => (architecture, os),
            NestedFilterOrder::Straight => (os, architecture),
        };
        let original_len = list.manifests.len();
        let mut kept = vec![];
        let mut resolved = vec![];

        for link in &list.manifests {
            let platform = list_entry_platform(kind, link);
            if !platform_matches(os, architecture, &platform) {
                log::debug!("skipping {} for {:?}", link.digest, platform);
                continue;
            }
            kept.push(link.clone());

            let (child_bytes, child_kind) = self.source.manifest(Some(&link.digest)).await?;
            let child = self
                .resolve(child_bytes, child_kind, child_os, child_architecture, true)
                .await?;
            if let Some(child) = child {
                let is_image = !child.node.kind().is_list();
                resolved.extend(child.resolved.into_iter().map(|mut manifest| {
                    if is_image {
                        manifest.digest = link.digest.clone();
                    }
                    manifest
                }));
            }
        }

        if kept.is_empty() {
            return Ok(None);
        }
        let filtered = kept.len() != original_len;
        list.manifests = kept;
        let node = match kind {
            MediaKind::CurrentIndex => ManifestNode::CurrentIndex(list),
            _ => ManifestNode::V2List(list),
        };
        let bytes = if filtered { node.to_bytes()? } else { bytes };
        Ok(Some(Resolution {
            node,
            bytes,
            resolved,
        }))
    }
}

/// Platform of one list entry, as seen by the filters
///
/// Index entries only contribute their OS and architecture; variant and OS
/// version are consulted for schema 2 list entries alone.
fn list_entry_platform(kind: MediaKind, link: &PlatformLink) -> PlatformDescriptor {
    let platform = link.platform.clone().unwrap_or_default();
    match kind {
        MediaKind::CurrentIndex => PlatformDescriptor::new(&platform.os, &platform.architecture),
        _ => platform,
    }
}

fn image_resolution(node: ManifestNode, bytes: Vec<u8>) -> Resolution {
    let manifest = ResolvedManifest {
        node: node.clone(),
        digest: ContentDigest::from_content(&bytes),
        bytes: bytes.clone(),
    };
    Resolution {
        node,
        bytes,
        resolved: vec![manifest],
    }
}
