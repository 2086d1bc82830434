use crate::errors::ImageError;
use std::fmt;

/// Registry host used when a locator doesn't name one
pub const DEFAULT_MIRROR: &str = "registry.hub.docker.com";

/// Namespace used for single-segment locators
pub const DEFAULT_NAMESPACE: &str = "library";

/// Tag used when a locator doesn't name one
pub const DEFAULT_TAG: &str = "latest";

/// A human-supplied image locator, split into the parts a registry needs
///
/// Parsing follows a deliberately small grammar. The locator is split on `/`
/// into at most three segments, and the last of those is split on `:` into
/// repository and tag:
///
/// - `app` uses the mirror host and the `library` namespace
/// - `ns/app` uses the mirror host, unless `ns` contains a dot, in which case
///   it names the host and the namespace is empty
/// - `host/ns/app` names everything explicitly
///
/// The original locator is kept verbatim, since it names the export on disk
/// and inside the legacy `repositories` record.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ImageReference {
    registry_host: String,
    namespace: String,
    repository: String,
    tag: String,
    tag_defaulted: bool,
    original: String,
}

impl ImageReference {
    /// Parse a locator, substituting `mirror` when no registry host is given
    ///
    /// ```
    /// # use imsave::ImageReference;
    /// let r = ImageReference::parse("myuser/app:1.2", "mirror.example").unwrap();
    /// assert_eq!(r.registry_host(), "mirror.example");
    /// assert_eq!(r.namespace(), "myuser");
    /// assert_eq!(r.repository(), "app");
    /// assert_eq!(r.tag(), "1.2");
    /// ```
    pub fn parse(locator: &str, mirror: &str) -> Result<Self, ImageError> {
        let segments: Vec<&str> = locator.splitn(3, '/').collect();
        let last = segments[segments.len() - 1];

        let mut tag_parts = last.split(':');
        let repository = tag_parts.next().unwrap_or_default();
        let tag = tag_parts.next();
        if tag_parts.next().is_some() {
            return Err(ImageError::InvalidReferenceFormat(locator.to_owned()));
        }
        let (tag, tag_defaulted) = match tag {
            Some(tag) => (tag.to_owned(), false),
            None => {
                log::info!("using default tag: {}", DEFAULT_TAG);
                (DEFAULT_TAG.to_owned(), true)
            }
        };

        let (registry_host, namespace) = match segments.len() {
            3 => (segments[0], segments[1]),
            2 if segments[0].contains('.') => (segments[0], ""),
            2 => (mirror, segments[0]),
            _ => (mirror, DEFAULT_NAMESPACE),
        };

        Ok(ImageReference {
            registry_host: registry_host.to_owned(),
            namespace: namespace.to_owned(),
            repository: repository.to_owned(),
            tag,
            tag_defaulted,
            original: locator.to_owned(),
        })
    }

    /// Registry server host, possibly with a port
    pub fn registry_host(&self) -> &str {
        &self.registry_host
    }

    /// Namespace segment, empty when the locator named a host and one path
    /// segment
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Repository name without namespace or tag
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag, which is `latest` when the locator had none
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Was the tag filled in by default?
    pub fn tag_defaulted(&self) -> bool {
        self.tag_defaulted
    }

    /// The locator exactly as it was given
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Repository path on the registry server, `namespace/repository`
    pub fn path(&self) -> String {
        if self.namespace.is_empty() {
            self.repository.clone()
        } else {
            format!("{}/{}", self.namespace, self.repository)
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{} ({})",
            self.registry_host,
            self.path(),
            self.tag,
            self.original
        )
    }
}
