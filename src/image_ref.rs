use std::fmt;

use stacked_errors::{bail, Result};

pub const DEFAULT_TAG: &str = "latest";

/// An image reference split the way the pull API wants it. The runtime pulls
/// every tag of a repository if the tag is left empty, so a missing tag
/// becomes [DEFAULT_TAG].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Everything before the tag or digest, including any registry host and
    /// port
    pub repository: String,
    /// A tag such as "latest", or a digest such as "sha256:..."
    pub tag: String,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            bail!("ImageReference::parse -> empty image reference")
        }
        let (repository, tag) = if let Some((repository, digest)) = reference.split_once('@') {
            (repository, digest)
        } else {
            // a colon before the last slash belongs to a registry port
            let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
            match reference[name_start..].rfind(':') {
                Some(i) => (
                    &reference[..(name_start + i)],
                    &reference[(name_start + i + 1)..],
                ),
                None => (reference, DEFAULT_TAG),
            }
        };
        if repository.is_empty() || tag.is_empty() {
            bail!("ImageReference::parse -> malformed image reference \"{reference}\"")
        }
        Ok(Self {
            repository: repository.to_owned(),
            tag: tag.to_owned(),
        })
    }

    pub fn is_digest(&self) -> bool {
        self.tag.contains(':')
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_digest() {
            write!(f, "{}@{}", self.repository, self.tag)
        } else {
            write!(f, "{}:{}", self.repository, self.tag)
        }
    }
}
