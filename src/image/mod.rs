//! Image identity: references, digests, and platforms


mod digest;
mod platform;
mod reference;

pub use digest::ContentDigest;
pub use platform::{
    host_architecture, platform_matches, PlatformDescriptor, PlatformFilter, PlatformPattern,
};
pub use reference::{ImageReference, DEFAULT_MIRROR, DEFAULT_NAMESPACE, DEFAULT_TAG};
