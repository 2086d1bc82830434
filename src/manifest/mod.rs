//! Manifest documents, for every media kind we know how to resolve
//!
//! References:
//! <https://docs.docker.com/registry/spec/manifest-v2-1/>,
//! <https://docs.docker.com/registry/spec/manifest-v2-2/>,
//! <https://github.com/opencontainers/image-spec/blob/main/manifest.md>,
//! <https://github.com/opencontainers/image-spec/blob/main/image-index.md>

#[cfg(test)] mod tests;

use crate::{
    errors::ImageError,
    image::{ContentDigest, PlatformDescriptor},
    json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod media_types {
    pub const LEGACY_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
    pub const LEGACY_V1_SIGNED: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
    pub const V2_IMAGE: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const V2_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const CURRENT_IMAGE: &str = "application/vnd.oci.image.manifest.v1+json";
    pub const CURRENT_INDEX: &str = "application/vnd.oci.image.index.v1+json";
}

/// Which of the manifest formats a document is written in
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MediaKind {
    LegacyV1,
    LegacyV1Signed,
    V2Image,
    CurrentImage,
    V2List,
    CurrentIndex,
}

impl MediaKind {
    pub const ALL: [MediaKind; 6] = [
        MediaKind::CurrentIndex,
        MediaKind::V2List,
        MediaKind::CurrentImage,
        MediaKind::V2Image,
        MediaKind::LegacyV1Signed,
        MediaKind::LegacyV1,
    ];

    /// The registered media type string
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::LegacyV1 => media_types::LEGACY_V1,
            MediaKind::LegacyV1Signed => media_types::LEGACY_V1_SIGNED,
            MediaKind::V2Image => media_types::V2_IMAGE,
            MediaKind::CurrentImage => media_types::CURRENT_IMAGE,
            MediaKind::V2List => media_types::V2_LIST,
            MediaKind::CurrentIndex => media_types::CURRENT_INDEX,
        }
    }

    /// Look up a media type string, ignoring any parameters after `;`
    pub fn from_media_type(media_type: &str) -> Result<Self, ImageError> {
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        MediaKind::ALL
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(essence))
            .copied()
            .ok_or_else(|| ImageError::UnsupportedManifestType(media_type.to_owned()))
    }

    /// Guess the media kind of a manifest from its content
    ///
    /// Used when a server answers with a missing or generic `Content-Type`.
    pub fn guess(bytes: &[u8]) -> Option<Self> {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(rename = "schemaVersion", default)]
            schema_version: u32,
            #[serde(rename = "mediaType", default)]
            media_type: Option<String>,
            #[serde(default)]
            signatures: Option<Value>,
            #[serde(default)]
            manifests: Option<Value>,
            #[serde(default)]
            config: Option<Value>,
            #[serde(default)]
            layers: Option<Value>,
        }

        let probe: Probe = serde_json::from_slice(bytes).ok()?;
        if probe.schema_version == 1 {
            return Some(match probe.signatures {
                Some(_) => MediaKind::LegacyV1Signed,
                None => MediaKind::LegacyV1,
            });
        }
        if let Some(media_type) = &probe.media_type {
            if let Ok(kind) = MediaKind::from_media_type(media_type) {
                return Some(kind);
            }
        }
        if probe.manifests.is_some() {
            Some(MediaKind::CurrentIndex)
        } else if probe.config.is_some() && probe.layers.is_some() {
            Some(MediaKind::CurrentImage)
        } else {
            None
        }
    }

    /// Value for an HTTP `Accept` header that admits every kind we handle
    pub fn accept_header() -> String {
        MediaKind::ALL
            .iter()
            .map(MediaKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Does this kind list other manifests rather than layers?
    pub fn is_list(&self) -> bool {
        matches!(self, MediaKind::V2List | MediaKind::CurrentIndex)
    }
}

/// Descriptor for a config or layer blob
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Link {
    #[serde(rename = "mediaType", default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub digest: ContentDigest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Link {
    pub fn new(digest: ContentDigest, size: Option<u64>) -> Self {
        Link {
            media_type: String::new(),
            size,
            digest,
            urls: vec![],
            extra: Map::new(),
        }
    }
}

/// Descriptor for one child of a manifest list or index
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PlatformLink {
    #[serde(rename = "mediaType", default, skip_serializing_if = "String::is_empty")]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: ContentDigest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Schema 1 manifest, signed or not
///
/// Layers are listed top first, the reverse of every other format.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Schema1Manifest {
    #[serde(default)]
    pub architecture: String,
    #[serde(rename = "fsLayers", default)]
    pub fs_layers: Vec<FsLayer>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: ContentDigest,
}

/// Single-platform manifest with a config blob and an ordered layer list
///
/// Shared by the schema 2 and OCI image manifest formats.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ImageManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Link,
    #[serde(default)]
    pub layers: Vec<Link>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Manifest list or index, referencing per-platform manifests
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ManifestList {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<PlatformLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One parsed manifest document, tagged by its media kind
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ManifestNode {
    LegacyV1(Schema1Manifest),
    LegacyV1Signed(Schema1Manifest),
    V2Image(ImageManifest),
    CurrentImage(ImageManifest),
    V2List(ManifestList),
    CurrentIndex(ManifestList),
}

impl ManifestNode {
    /// Parse manifest bytes as the given media kind
    pub fn parse(bytes: &[u8], kind: MediaKind) -> Result<Self, ImageError> {
        log::trace!("raw json manifest, {}", String::from_utf8_lossy(bytes));
        Ok(match kind {
            MediaKind::LegacyV1 => ManifestNode::LegacyV1(serde_json::from_slice(bytes)?),
            MediaKind::LegacyV1Signed => {
                ManifestNode::LegacyV1Signed(serde_json::from_slice(bytes)?)
            }
            MediaKind::V2Image => ManifestNode::V2Image(serde_json::from_slice(bytes)?),
            MediaKind::CurrentImage => ManifestNode::CurrentImage(serde_json::from_slice(bytes)?),
            MediaKind::V2List => ManifestNode::V2List(serde_json::from_slice(bytes)?),
            MediaKind::CurrentIndex => ManifestNode::CurrentIndex(serde_json::from_slice(bytes)?),
        })
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            ManifestNode::LegacyV1(_) => MediaKind::LegacyV1,
            ManifestNode::LegacyV1Signed(_) => MediaKind::LegacyV1Signed,
            ManifestNode::V2Image(_) => MediaKind::V2Image,
            ManifestNode::CurrentImage(_) => MediaKind::CurrentImage,
            ManifestNode::V2List(_) => MediaKind::V2List,
            ManifestNode::CurrentIndex(_) => MediaKind::CurrentIndex,
        }
    }

    /// Serialize this node back into compact json
    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        Ok(match self {
            ManifestNode::LegacyV1(m) | ManifestNode::LegacyV1Signed(m) => json::to_vec(m)?,
            ManifestNode::V2Image(m) | ManifestNode::CurrentImage(m) => json::to_vec(m)?,
            ManifestNode::V2List(m) | ManifestNode::CurrentIndex(m) => json::to_vec(m)?,
        })
    }

    /// Config blob descriptor, for the image kinds that have one
    pub fn config(&self) -> Option<&Link> {
        match self {
            ManifestNode::V2Image(m) | ManifestNode::CurrentImage(m) => Some(&m.config),
            _ => None,
        }
    }

    /// Layer descriptors, base layer first
    pub fn layers(&self) -> Vec<Link> {
        match self {
            ManifestNode::LegacyV1(m) | ManifestNode::LegacyV1Signed(m) => m
                .fs_layers
                .iter()
                .rev()
                .map(|layer| Link::new(layer.blob_sum.clone(), None))
                .collect(),
            ManifestNode::V2Image(m) | ManifestNode::CurrentImage(m) => m.layers.clone(),
            ManifestNode::V2List(_) | ManifestNode::CurrentIndex(_) => vec![],
        }
    }
}
