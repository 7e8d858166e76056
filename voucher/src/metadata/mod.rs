// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Metadata store contract
//!
//! The metadata store is the system of record for everything known about an
//! image: vulnerability findings, build provenance and the signed
//! attestations this crate produces. Checks only read from it; the engine
//! is the only writer, and only through [`MetadataClient::add_attestation_to_image`].

pub mod payload;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::{attestation::SignedAttestation, image::ImageReference};

pub use payload::SigningPayload;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    NoMetadata(#[from] NoMetadataError),

    #[error("metadata client is not able to store attestations")]
    CannotAttest,

    #[error("build attestation payload body failed")]
    Payload(#[source] serde_json::Error),

    #[error("metadata provider request failed")]
    Request {
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub fn is_no_metadata(&self) -> bool {
        matches!(self, Error::NoMetadata(_))
    }
}

/// Kinds of metadata the store can be asked for.
#[derive(AsRefStr, Display, EnumString, Clone, Copy, Debug, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum MetadataType {
    Vulnerability,
    BuildDetail,
    Attestation,
}

/// Metadata that should exist for an image was not found.
///
/// Kept apart from transport failures so that "the evidence is absent" can
/// be told from "the store could not be reached".
#[derive(Error, Debug)]
#[error("no metadata of type {kind} returned: {reason}")]
pub struct NoMetadataError {
    pub kind: MetadataType,
    pub reason: String,
}

impl NoMetadataError {
    pub fn new(kind: MetadataType, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub id: String,
    pub checksum: String,
}

/// Build provenance of an image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDetail {
    pub repository_url: String,

    /// Revision of `repository_url` the image was built from.
    pub commit: String,

    #[serde(default)]
    pub project_id: String,

    /// Identity of the builder that produced the image.
    #[serde(default)]
    pub build_creator: String,

    #[serde(default)]
    pub build_url: String,

    #[serde(default)]
    pub artifacts: Vec<BuildArtifact>,
}

impl BuildDetail {
    pub fn commit_url(&self) -> String {
        format!(
            "{}/commit/{}",
            self.repository_url.trim_end_matches('/'),
            self.commit
        )
    }
}

/// Vulnerability severity. An unclassified finding ranks between medium and
/// high so that it is never silently ignored by a medium threshold.
#[derive(
    AsRefStr,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    Negligible,
    Low,
    Medium,
    #[default]
    Unknown,
    High,
    Critical,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub fix_available: bool,

    #[serde(default)]
    pub severity: Severity,
}

/// Access to the metadata store.
///
/// Implementations must tolerate concurrent calls; distinct checks for the
/// same image read from it in parallel, and attestations for different
/// checks may be submitted at the same time.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Whether this client is able to store attestations.
    fn can_attest(&self) -> bool;

    /// Canonical body to be signed for an attestation about `image`.
    /// The same image always yields the same bytes.
    fn new_payload_body(&self, image: &ImageReference) -> Result<String>;

    async fn get_vulnerabilities(&self, image: &ImageReference) -> Result<Vec<Vulnerability>>;

    async fn get_build_detail(&self, image: &ImageReference) -> Result<BuildDetail>;

    /// Store a signed attestation as a new occurrence for `image` and return
    /// the stored record.
    async fn add_attestation_to_image(
        &self,
        image: &ImageReference,
        attestation: SignedAttestation,
    ) -> Result<SignedAttestation>;

    async fn get_attestations(&self, image: &ImageReference) -> Result<Vec<SignedAttestation>>;

    /// Release the underlying connection.
    async fn close(&self);
}
