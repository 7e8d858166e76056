// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::fmt;

use oci_client::Reference;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImageReferenceError>;

#[derive(Error, Debug)]
pub enum ImageReferenceError {
    #[error("failed to parse image reference `{reference}`")]
    Parse {
        reference: String,
        #[source]
        source: oci_client::ParseError,
    },

    #[error("image reference `{0}` is not pinned to a digest")]
    MissingDigest(String),

    #[error("image reference `{reference}` carries a malformed digest `{digest}`")]
    MalformedDigest { reference: String, digest: String },
}

/// A container image addressed by content digest.
///
/// Every piece of evidence gathered for an image refers to the immutable
/// artifact behind the digest, so references that only carry a mutable tag
/// are refused at construction time. A tag given alongside the digest is
/// accepted but dropped from the canonical form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageReference {
    name: String,
    digest: String,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let parsed =
            Reference::try_from(reference).map_err(|source| ImageReferenceError::Parse {
                reference: reference.to_string(),
                source,
            })?;

        let digest = parsed
            .digest()
            .ok_or_else(|| ImageReferenceError::MissingDigest(reference.to_string()))?
            .to_string();

        let encoded = digest.split_once(':').map(|(_, encoded)| encoded);
        if !matches!(encoded, Some(hex_part) if !hex_part.is_empty() && hex::decode(hex_part).is_ok())
        {
            return Err(ImageReferenceError::MalformedDigest {
                reference: reference.to_string(),
                digest,
            });
        }

        Ok(Self {
            name: format!("{}/{}", parsed.registry(), parsed.repository()),
            digest,
        })
    }

    /// Registry host and repository path, e.g. `gcr.io/project/app`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Content digest in `algorithm:encoded` form.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.digest)
    }
}

impl TryFrom<&str> for ImageReference {
    type Error = ImageReferenceError;

    fn try_from(reference: &str) -> Result<Self> {
        Self::parse(reference)
    }
}
