// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! File-backed evidence providers.
//!
//! Evidence is read once from JSON documents and served from memory.
//! Attestations submitted to [`OfflineMetadataClient`] are kept in memory
//! for the lifetime of the client.

use std::{collections::HashMap, path::Path};

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    attestation::SignedAttestation,
    image::ImageReference,
    metadata::{
        self, BuildDetail, MetadataClient, MetadataType, NoMetadataError, SigningPayload,
        Vulnerability,
    },
    repository::{self, Branch, Commit, RepositoryClient},
    Error, Result,
};

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let load = async {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let document = serde_json::from_slice(&content).context("parse JSON document")?;
        anyhow::Ok(document)
    };

    load.await.map_err(|source| Error::OfflineEvidence {
        path: path.display().to_string(),
        source,
    })
}

/// Recorded evidence for one image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEvidence {
    #[serde(default)]
    pub build_detail: Option<BuildDetail>,

    /// `None` means the image was never scanned, `Some(vec![])` that the
    /// scan found nothing.
    #[serde(default)]
    pub vulnerabilities: Option<Vec<Vulnerability>>,
}

/// Metadata store backed by a JSON document of the form
///
/// ```json
/// {
///     "gcr.io/project/app@sha256:...": {
///         "build_detail": { "repository_url": "...", "commit": "..." },
///         "vulnerabilities": [ { "name": "CVE-...", "severity": "high" } ]
///     }
/// }
/// ```
#[derive(Debug, Default)]
pub struct OfflineMetadataClient {
    evidence: HashMap<ImageReference, ImageEvidence>,
    attestations: RwLock<HashMap<ImageReference, Vec<SignedAttestation>>>,
}

impl OfflineMetadataClient {
    pub fn new(evidence: HashMap<ImageReference, ImageEvidence>) -> Self {
        Self {
            evidence,
            attestations: RwLock::new(HashMap::new()),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document: HashMap<String, ImageEvidence> = load_json(path).await?;
        let evidence = document
            .into_iter()
            .map(|(reference, evidence)| -> Result<_> {
                Ok((ImageReference::parse(&reference)?, evidence))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        debug!(
            "Loaded evidence for {} images from {}",
            evidence.len(),
            path.display()
        );
        Ok(Self::new(evidence))
    }

    /// Replace the stored attestations with the JSON list at `path`.
    pub async fn load_attestations(&self, path: impl AsRef<Path>) -> Result<()> {
        let list: Vec<SignedAttestation> = load_json(path.as_ref()).await?;
        let mut loaded: HashMap<ImageReference, Vec<SignedAttestation>> = HashMap::new();
        for attestation in list {
            let image = ImageReference::parse(&attestation.attestation.image)?;
            loaded.entry(image).or_default().push(attestation);
        }

        *self.attestations.write().await = loaded;
        Ok(())
    }

    /// Write every stored attestation to `path` as a JSON list.
    pub async fn save_attestations(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let save = async {
            let attestations = self.attestations.read().await;
            let mut list: Vec<&SignedAttestation> = attestations.values().flatten().collect();
            list.sort_by(|a, b| {
                (&a.attestation.image, a.check_name()).cmp(&(&b.attestation.image, b.check_name()))
            });
            let content = serde_json::to_vec_pretty(&list)?;
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("write {}", path.display()))
        };

        save.await.map_err(|source| Error::OfflineEvidence {
            path: path.display().to_string(),
            source,
        })
    }

    fn evidence(&self, image: &ImageReference) -> Option<&ImageEvidence> {
        self.evidence.get(image)
    }
}

#[async_trait]
impl MetadataClient for OfflineMetadataClient {
    fn can_attest(&self) -> bool {
        true
    }

    fn new_payload_body(&self, image: &ImageReference) -> metadata::Result<String> {
        SigningPayload::new(image).to_canonical_string()
    }

    async fn get_vulnerabilities(
        &self,
        image: &ImageReference,
    ) -> metadata::Result<Vec<Vulnerability>> {
        self.evidence(image)
            .and_then(|e| e.vulnerabilities.clone())
            .ok_or_else(|| {
                NoMetadataError::new(
                    MetadataType::Vulnerability,
                    format!("no vulnerability scan recorded for {image}"),
                )
                .into()
            })
    }

    async fn get_build_detail(&self, image: &ImageReference) -> metadata::Result<BuildDetail> {
        self.evidence(image)
            .and_then(|e| e.build_detail.clone())
            .ok_or_else(|| {
                NoMetadataError::new(
                    MetadataType::BuildDetail,
                    format!("no build recorded for {image}"),
                )
                .into()
            })
    }

    async fn add_attestation_to_image(
        &self,
        image: &ImageReference,
        attestation: SignedAttestation,
    ) -> metadata::Result<SignedAttestation> {
        let mut attestations = self.attestations.write().await;
        attestations
            .entry(image.clone())
            .or_default()
            .push(attestation.clone());
        debug!(
            "Stored {} attestation for {image}",
            attestation.check_name()
        );
        Ok(attestation)
    }

    async fn get_attestations(
        &self,
        image: &ImageReference,
    ) -> metadata::Result<Vec<SignedAttestation>> {
        let attestations = self.attestations.read().await;
        Ok(attestations.get(image).cloned().unwrap_or_default())
    }

    async fn close(&self) {
        debug!("Offline metadata client closed");
    }
}

/// Source-hosting facts for the offline repository client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEvidence {
    /// Commits indexed by commit URL.
    #[serde(default)]
    pub commits: HashMap<String, Commit>,

    /// Default branches indexed by repository URL.
    #[serde(default)]
    pub default_branches: HashMap<String, Branch>,
}

#[derive(Debug, Default)]
pub struct OfflineRepositoryClient {
    evidence: RepositoryEvidence,
}

impl OfflineRepositoryClient {
    pub fn new(evidence: RepositoryEvidence) -> Self {
        Self { evidence }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let evidence = load_json(path.as_ref()).await?;
        Ok(Self::new(evidence))
    }
}

#[async_trait]
impl RepositoryClient for OfflineRepositoryClient {
    async fn get_commit(&self, build_detail: &BuildDetail) -> repository::Result<Commit> {
        let url = build_detail.commit_url();
        self.evidence
            .commits
            .get(&url)
            .cloned()
            .ok_or(repository::Error::CommitNotFound(url))
    }

    async fn get_default_branch(&self, build_detail: &BuildDetail) -> repository::Result<Branch> {
        let repository_url = build_detail.repository_url.trim_end_matches('/');
        self.evidence
            .default_branches
            .get(repository_url)
            .cloned()
            .ok_or_else(|| repository::Error::BranchNotFound(repository_url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;
    use crate::{
        attestation::AttestationPayload,
        keyring::{tests::generate_signer, KeyRing},
        metadata::Severity,
        repository::CommitRef,
    };

    const IMAGE: &str = "gcr.io/voucher-test-project/apps/staging/voucher-internal@sha256:73d506a23331fce5cb6f49bfb4c27450d2ef4878efce89f03a46b27372a88430";

    fn write_json(value: serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(value.to_string().as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn metadata_from_file() {
        let file = write_json(json!({
            // A tag next to the digest is dropped from the key.
            "gcr.io/voucher-test-project/apps/staging/voucher-internal:v1@sha256:73d506a23331fce5cb6f49bfb4c27450d2ef4878efce89f03a46b27372a88430": {
                "build_detail": {
                    "repository_url": "https://github.com/grafeas/voucher-internal",
                    "commit": "efgh6543"
                },
                "vulnerabilities": [
                    { "name": "CVE-2024-0001", "severity": "critical", "fix_available": true }
                ]
            }
        }));

        let client = OfflineMetadataClient::from_file(file.path()).await.unwrap();
        let image = ImageReference::parse(IMAGE).unwrap();

        let detail = client.get_build_detail(&image).await.unwrap();
        assert_eq!(detail.commit, "efgh6543");
        assert!(detail.artifacts.is_empty());

        let vulnerabilities = client.get_vulnerabilities(&image).await.unwrap();
        assert_eq!(vulnerabilities.len(), 1);
        assert_eq!(vulnerabilities[0].severity, Severity::Critical);
        assert!(vulnerabilities[0].fix_available);
    }

    #[tokio::test]
    async fn metadata_missing_evidence() {
        let image = ImageReference::parse(IMAGE).unwrap();
        let client = OfflineMetadataClient::new(HashMap::from([(
            image.clone(),
            ImageEvidence::default(),
        )]));

        let err = client.get_build_detail(&image).await.unwrap_err();
        assert!(err.is_no_metadata());
        assert_eq!(
            err.to_string(),
            format!("no metadata of type build_detail returned: no build recorded for {IMAGE}")
        );

        let err = client.get_vulnerabilities(&image).await.unwrap_err();
        assert!(err.is_no_metadata());
    }

    #[tokio::test]
    async fn metadata_bad_documents() {
        let file = write_json(json!({ "gcr.io/app:latest": {} }));
        let err = OfflineMetadataClient::from_file(file.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ImageReference(_)));

        let err = OfflineMetadataClient::from_file("/does/not/exist.json")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OfflineEvidence { path, .. } if path == "/does/not/exist.json"));
    }

    #[tokio::test]
    async fn metadata_stores_attestations() {
        let image = ImageReference::parse(IMAGE).unwrap();
        let client = OfflineMetadataClient::default();
        assert!(client.can_attest());
        assert!(client.get_attestations(&image).await.unwrap().is_empty());

        let mut keyring = KeyRing::default();
        keyring.add_signer("diy", generate_signer("diy"));
        let body = client.new_payload_body(&image).unwrap();
        let signed = AttestationPayload::new("diy", body)
            .into_signed(&keyring, &image)
            .unwrap();

        let stored = client
            .add_attestation_to_image(&image, signed.clone())
            .await
            .unwrap();
        assert_eq!(stored, signed);
        assert_eq!(
            client.get_attestations(&image).await.unwrap(),
            vec![signed.clone()]
        );
        client.close().await;

        let file = tempfile::NamedTempFile::new().unwrap();
        client.save_attestations(file.path()).await.unwrap();

        let reopened = OfflineMetadataClient::default();
        reopened.load_attestations(file.path()).await.unwrap();
        assert_eq!(reopened.get_attestations(&image).await.unwrap(), vec![signed]);
    }

    #[tokio::test]
    async fn repository_from_file() {
        let commit_url = "https://github.com/grafeas/voucher-internal/commit/efgh6543";
        let file = write_json(json!({
            "commits": {
                commit_url: {
                    "url": commit_url,
                    "status": "SUCCESS",
                    "is_signed": true,
                    "associated_pull_requests": [{
                        "is_merged": true,
                        "merge_commit": { "url": commit_url },
                        "has_required_approvals": true
                    }]
                }
            },
            "default_branches": {
                "https://github.com/grafeas/voucher-internal": {
                    "name": "production",
                    "commit_refs": [{ "url": commit_url }]
                }
            }
        }));

        let client = OfflineRepositoryClient::from_file(file.path()).await.unwrap();
        let detail = BuildDetail {
            repository_url: "https://github.com/grafeas/voucher-internal/".into(),
            commit: "efgh6543".into(),
            ..Default::default()
        };

        let commit = client.get_commit(&detail).await.unwrap();
        assert!(commit.is_signed && commit.passed_ci());
        assert!(commit.merging_pull_request().is_some());

        let branch = client.get_default_branch(&detail).await.unwrap();
        assert_eq!(branch.name, "production");
        assert_eq!(branch.commit_refs, vec![CommitRef::new(commit_url)]);

        let unknown = BuildDetail {
            repository_url: "https://github.com/grafeas/other".into(),
            commit: "abcd".into(),
            ..Default::default()
        };
        assert!(matches!(
            client.get_commit(&unknown).await.unwrap_err(),
            repository::Error::CommitNotFound(_)
        ));
        assert!(matches!(
            client.get_default_branch(&unknown).await.unwrap_err(),
            repository::Error::BranchNotFound(url) if url == "https://github.com/grafeas/other"
        ));
    }
}
