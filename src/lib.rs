//! Save container images from a registry as legacy `docker save` archives,
//! without a daemon
//!
//! ```no_run
//! # async fn example() -> Result<(), imsave::errors::ImageError> {
//! let options = imsave::SaveOptions::new("alpine:3.18").arch(&["arm64"]);
//! let archive = imsave::save(&options).await?;
//! println!("{:?}", archive);
//! # Ok(())
//! # }
//! ```

#[macro_use] extern crate lazy_static;
#[macro_use] extern crate serde;

pub mod archive;
pub mod errors;
pub mod export;
pub mod image;
pub mod manifest;
pub mod progress;
pub mod registry;
pub mod resolver;

mod json;
mod save;

pub use crate::{
    errors::ImageError,
    image::{ContentDigest, ImageReference, PlatformFilter},
    resolver::{NestedFilterOrder, ResolvedManifest, Resolver},
    save::{save, save_from, SaveOptions},
};
