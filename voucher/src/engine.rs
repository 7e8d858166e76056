// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Check orchestration
//!
//! [`CheckEngine`] runs the registered checks for one image concurrently,
//! waits for every one of them, and signs and submits an attestation for
//! each check that passed. Outcomes are isolated per check: an erroring
//! check, a missing signing key or a failed submission is recorded in that
//! check's [`CheckResult`] and never affects its siblings.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tokio_util::sync::CancellationToken;

use crate::{
    attestation::{AttestationPayload, SignedAttestation},
    checks::{new_check, BoxedCheck, CheckError, CheckName, Providers},
    config::VoucherConfig,
    image::ImageReference,
    keyring::{self, KeyRing},
    metadata::{MetadataClient, SigningPayload},
    Error, Result,
};

/// Why a check did not succeed.
#[derive(AsRefStr, Display, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// The evidence was retrieved and the policy is not met.
    Rejected,

    /// The evidence could not be retrieved.
    Evidence,

    Cancelled,

    /// No verifiable attestation exists for the check.
    Unattested,
}

impl From<&CheckError> for FailureKind {
    fn from(e: &CheckError) -> Self {
        match e {
            CheckError::Rejected(_) => FailureKind::Rejected,
            CheckError::Metadata(_) | CheckError::Repository(_) => FailureKind::Evidence,
            CheckError::Cancelled => FailureKind::Cancelled,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    #[serde(default)]
    pub attested: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<SignedAttestation>,
}

impl CheckResult {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            error: None,
            failure: None,
            attested: false,
            attestation_error: None,
            attestation: None,
        }
    }

    fn fail(&mut self, kind: FailureKind, error: String) {
        self.success = false;
        self.failure = Some(kind);
        self.error = Some(error);
    }
}

/// Aggregate outcome of one engine run for one image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub image: String,

    pub success: bool,

    /// Ordered by check name.
    pub results: Vec<CheckResult>,
}

impl Report {
    // An empty run vouches for nothing. With required checks among the
    // results only those decide; otherwise every result does.
    fn new(image: &ImageReference, results: Vec<CheckResult>, required: &BTreeSet<String>) -> Self {
        let mut decisive = results
            .iter()
            .filter(|r| required.contains(&r.name))
            .peekable();
        let success = if decisive.peek().is_some() {
            decisive.all(|r| r.success)
        } else {
            !results.is_empty() && results.iter().all(|r| r.success)
        };

        Self {
            image: image.to_string(),
            success,
            results,
        }
    }

    pub fn result(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

struct RegisteredCheck {
    check: BoxedCheck,
    attest: bool,
}

/// Runs checks against images and publishes attestations for the ones
/// that pass.
pub struct CheckEngine {
    metadata: Arc<dyn MetadataClient>,
    keyring: Arc<KeyRing>,
    checks: BTreeMap<String, RegisteredCheck>,
    required: BTreeSet<String>,
    dry_run: bool,
}

fn error_chain<E>(e: E) -> String
where
    E: std::error::Error + Send + Sync + 'static,
{
    format!("{:#}", anyhow::Error::from(e))
}

impl CheckEngine {
    pub fn new(metadata: Arc<dyn MetadataClient>, keyring: Arc<KeyRing>) -> Self {
        Self {
            metadata,
            keyring,
            checks: BTreeMap::new(),
            required: BTreeSet::new(),
            dry_run: false,
        }
    }

    /// Build an engine with every check enabled in `config`.
    pub fn from_config(
        config: &VoucherConfig,
        providers: Providers,
        keyring: Arc<KeyRing>,
    ) -> Result<Self> {
        let canonical = |name: &str| {
            CheckName::try_from(name)
                .map(|n| n.to_string())
                .map_err(|_| Error::UnknownCheck(name.to_string()))
        };

        let mut engine =
            Self::new(providers.metadata.clone(), keyring).with_dry_run(config.checks.dry_run);
        for name in &config.checks.enabled {
            let name = canonical(name)?;
            let check = new_check(&name, config, &providers)?;
            engine.register(&name, check);
        }

        for name in &config.checks.required {
            engine.require(&canonical(name)?)?;
        }

        info!(
            "Check engine ready with checks [{}], dry run: {}",
            engine.check_names().collect::<Vec<_>>().join(", "),
            engine.dry_run
        );
        Ok(engine)
    }

    /// Register an attestation-producing check. A check registered under an
    /// existing name replaces it.
    pub fn register(&mut self, name: &str, check: BoxedCheck) {
        self.checks.insert(
            name.to_string(),
            RegisteredCheck {
                check,
                attest: true,
            },
        );
    }

    pub fn register_without_attestation(&mut self, name: &str, check: BoxedCheck) {
        self.checks.insert(
            name.to_string(),
            RegisteredCheck {
                check,
                attest: false,
            },
        );
    }

    /// Make `name` decide the overall verdict.
    pub fn require(&mut self, name: &str) -> Result<()> {
        if !self.checks.contains_key(name) {
            return Err(Error::RequiredCheckNotEnabled(name.to_string()));
        }

        self.required.insert(name.to_string());
        Ok(())
    }

    /// In dry-run mode checks are evaluated but nothing is signed or
    /// submitted.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn check_names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }

    /// Run every registered check against `image`.
    pub async fn run(&self, image: &ImageReference, cancel: &CancellationToken) -> Report {
        let selected = self.checks.iter().collect();
        self.run_selected(image, selected, cancel).await
    }

    /// Run the named subset of the registered checks. Each check runs at
    /// most once even if named repeatedly. Unknown names are refused before
    /// anything runs.
    pub async fn run_checks<S: AsRef<str>>(
        &self,
        image: &ImageReference,
        names: &[S],
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let names: BTreeSet<&str> = names.iter().map(|name| name.as_ref()).collect();
        let selected = names
            .into_iter()
            .map(|name| {
                self.checks
                    .get_key_value(name)
                    .ok_or_else(|| Error::UnknownCheck(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(self.run_selected(image, selected, cancel).await)
    }

    async fn run_selected(
        &self,
        image: &ImageReference,
        selected: Vec<(&String, &RegisteredCheck)>,
        cancel: &CancellationToken,
    ) -> Report {
        let results = join_all(
            selected
                .into_iter()
                .map(|(name, registered)| self.evaluate(name, registered, image, cancel)),
        )
        .await;

        let report = Report::new(image, results, &self.required);
        info!(
            "Verification of {image} finished, success: {}",
            report.success
        );
        report
    }

    async fn evaluate(
        &self,
        name: &str,
        registered: &RegisteredCheck,
        image: &ImageReference,
        cancel: &CancellationToken,
    ) -> CheckResult {
        debug!("Running check {name} on {image}");
        let mut result = CheckResult::new(name);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CheckError::Cancelled),
            res = registered.check.check(image) => res,
        };

        if let Err(e) = outcome {
            info!("{image} failed check {name}: {e}");
            let kind = FailureKind::from(&e);
            result.fail(kind, error_chain(e));
            return result;
        }

        info!("{image} passed check {name}");
        result.success = true;

        if !registered.attest || self.dry_run {
            return result;
        }

        if !self.metadata.can_attest() {
            debug!("Metadata client can not store attestations, skip attesting {name}");
            return result;
        }

        match self.attest(name, image, cancel).await {
            Ok(attestation) => {
                info!(
                    "Submitted attestation for {name} on {image} signed by {}",
                    attestation.key_id
                );
                result.attested = true;
                result.attestation = Some(attestation);
            }
            Err(e) => {
                warn!("Attesting {name} on {image} failed: {e}");
                result.attestation_error = Some(error_chain(e));
            }
        }

        result
    }

    async fn attest(
        &self,
        name: &str,
        image: &ImageReference,
        cancel: &CancellationToken,
    ) -> Result<SignedAttestation> {
        let body = self.metadata.new_payload_body(image)?;
        let signed = AttestationPayload::new(name, body).into_signed(&self.keyring, image)?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = self.metadata.add_attestation_to_image(image, signed) => Ok(res?),
        }
    }

    /// Report, per registered check, whether the metadata store already
    /// holds an attestation for `image` whose signature verifies against
    /// that check's key. Runs no check logic and writes nothing.
    pub async fn verify(
        &self,
        image: &ImageReference,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let attestations = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            res = self.metadata.get_attestations(image) => res?,
        };
        debug!("Found {} attestations for {image}", attestations.len());

        let canonical_image = image.to_string();
        let results = self
            .checks
            .keys()
            .map(|name| {
                let name = name.as_str();
                let mut result = CheckResult::new(name);
                let signer = match self.keyring.get_signer_by_name(name) {
                    Ok(signer) => signer,
                    Err(e) => {
                        result.fail(FailureKind::Unattested, error_chain(e));
                        return result;
                    }
                };

                let cert = signer.public_cert();
                let key_id = signer.key_id();
                let valid = attestations.iter().find(|a| {
                    a.check_name() == name
                        && a.attestation.image == canonical_image
                        && a.key_id == key_id
                        && SigningPayload::from_body(&a.body)
                            .is_ok_and(|payload| payload.refers_to(image))
                        && keyring::verify(&cert, a.body.as_bytes(), &a.signature).is_ok()
                });

                match valid {
                    Some(attestation) => {
                        result.success = true;
                        result.attested = true;
                        result.attestation = Some(attestation.clone());
                    }
                    None => result.fail(
                        FailureKind::Unattested,
                        format!("no valid attestation for check {name}"),
                    ),
                }
                result
            })
            .collect();

        Ok(Report::new(image, results, &self.required))
    }

    /// Release the metadata client.
    pub async fn close(&self) {
        self.metadata.close().await;
    }
}
