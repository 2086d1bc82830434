use serde::{Deserialize, Serialize};
use std::{env::consts, fmt, str::FromStr};

/// The platform an image manifest targets
///
/// Any field may be empty, meaning the platform is unknown along that axis.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct PlatformDescriptor {
    #[serde(default)]
    pub os: String,
    #[serde(rename = "os.version", default, skip_serializing_if = "String::is_empty")]
    pub os_version: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
    /// Fields we don't interpret, such as `os.features`
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PlatformDescriptor {
    /// Only the OS and architecture, with no sub-qualifiers
    pub fn new(os: &str, architecture: &str) -> Self {
        PlatformDescriptor {
            os: os.to_owned(),
            architecture: architecture.to_owned(),
            ..Default::default()
        }
    }
}

/// One filter pattern, either `value` or `value:qualifier`
///
/// A bare `arm` accepts any variant of `arm`, while `arm:v7` only accepts the
/// `v7` variant. The same applies to OS names and OS versions.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PlatformPattern {
    serialized: String,
}

impl PlatformPattern {
    pub fn new(pattern: &str) -> Self {
        PlatformPattern {
            serialized: pattern.to_owned(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Does this pattern accept `value` with sub-qualifier `qualifier`?
    pub fn matches(&self, value: &str, qualifier: &str) -> bool {
        let pat = self.as_str();
        if !pat.starts_with(value) {
            return false;
        }
        let rest = &pat[value.len()..];
        rest.is_empty() || (rest.starts_with(':') && &rest[1..] == qualifier)
    }
}

impl FromStr for PlatformPattern {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PlatformPattern::new(s))
    }
}

impl fmt::Display for PlatformPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for PlatformPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// Evaluate OS and architecture pattern lists against one platform
///
/// Each axis passes if its pattern list is empty, if the platform doesn't
/// say anything about that axis, or if any pattern matches. Both axes must
/// pass.
pub fn platform_matches(
    os: &[PlatformPattern],
    architecture: &[PlatformPattern],
    platform: &PlatformDescriptor,
) -> bool {
    axis_matches(os, &platform.os, &platform.os_version)
        && axis_matches(architecture, &platform.architecture, &platform.variant)
}

fn axis_matches(patterns: &[PlatformPattern], value: &str, qualifier: &str) -> bool {
    patterns.is_empty() || value.is_empty() || patterns.iter().any(|p| p.matches(value, qualifier))
}

/// Ordered OS and architecture pattern lists used to pick one platform
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PlatformFilter {
    pub os: Vec<PlatformPattern>,
    pub architecture: Vec<PlatformPattern>,
}

impl PlatformFilter {
    /// A filter that accepts every platform
    pub fn any() -> Self {
        PlatformFilter::default()
    }

    /// Build a filter from plain strings
    pub fn new<S: AsRef<str>>(os: &[S], architecture: &[S]) -> Self {
        PlatformFilter {
            os: os.iter().map(|s| PlatformPattern::new(s.as_ref())).collect(),
            architecture: architecture
                .iter()
                .map(|s| PlatformPattern::new(s.as_ref()))
                .collect(),
        }
    }

    /// Filter on the architecture this process is running on, any OS
    pub fn host() -> Self {
        PlatformFilter {
            os: vec![],
            architecture: vec![PlatformPattern::new(host_architecture())],
        }
    }

    pub fn matches(&self, platform: &PlatformDescriptor) -> bool {
        platform_matches(&self.os, &self.architecture, platform)
    }

    pub fn os_str(&self) -> String {
        join_patterns(&self.os)
    }

    pub fn architecture_str(&self) -> String {
        join_patterns(&self.architecture)
    }
}

fn join_patterns(patterns: &[PlatformPattern]) -> String {
    patterns
        .iter()
        .map(PlatformPattern::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Name of the host CPU architecture, spelled the way registries spell it
pub fn host_architecture() -> &'static str {
    registry_architecture(consts::ARCH)
}

pub(crate) fn registry_architecture(rust_arch: &'static str) -> &'static str {
    match rust_arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        "mips64" if cfg!(target_endian = "little") => "mips64le",
        "mips" if cfg!(target_endian = "little") => "mipsle",
        other => other,
    }
}
