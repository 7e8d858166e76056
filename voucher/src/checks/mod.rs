// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Policy checks
//!
//! A check looks at the evidence available for one image and decides
//! whether the image satisfies one policy. `Ok(())` means the image passed;
//! an `Err` says why it did not. A [`CheckError::Rejected`] is a policy
//! verdict, while the other variants mean the evidence could not be
//! obtained, so operators can tell "policy not met" from "infrastructure
//! unreachable".
//!
//! Checks never construct their evidence providers. They receive them
//! through [`Providers`], which lets tests substitute fakes.

pub mod approved;
pub mod diy;
pub mod org;
pub mod provenance;
pub mod snakeoil;

use std::sync::Arc;

use async_trait::async_trait;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

use crate::{
    config::VoucherConfig,
    image::ImageReference,
    metadata::{self, MetadataClient},
    repository::{self, RepositoryClient},
    Error, Result,
};

pub use approved::ApprovedCheck;
pub use diy::DiyCheck;
pub use org::OrgCheck;
pub use provenance::ProvenanceCheck;
pub use snakeoil::SnakeoilCheck;

/// Policy-decision outcomes. Exactly one is reported per failed check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("commit is not on the default branch")]
    NotOnDefaultBranch,

    #[error("commit is not signed")]
    NotSigned,

    #[error("commit is not a merge commit of a pull request")]
    NotMergeCommit,

    #[error("pull request is missing required approvals")]
    MissingRequiredApprovals,

    #[error("commit has not passed CI")]
    NotPassedCi,

    #[error("image is not from a valid repository")]
    NotFromValidRepository,

    #[error("image was not built from a trusted organization")]
    UntrustedOrganization,

    #[error("image has no build detail")]
    NoBuildDetail,

    #[error("image was built by an untrusted builder `{0}`")]
    UntrustedBuilder(String),

    #[error("image was built in an untrusted project `{0}`")]
    UntrustedProject(String),

    #[error("no build artifact matches the image digest")]
    NoMatchingArtifact,

    #[error("image has {count} vulnerabilities at or above the threshold: {}", .names.join(", "))]
    Vulnerable { count: usize, names: Vec<String> },
}

#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Metadata(#[from] metadata::Error),

    #[error(transparent)]
    Repository(#[from] repository::Error),

    #[error("check cancelled")]
    Cancelled,
}

impl CheckError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            CheckError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

/// One policy applied to an image.
///
/// Implementations evaluate their gates strictly in their declared order and
/// stop at the first failing one.
#[async_trait]
pub trait Check: Send + Sync {
    async fn check(&self, image: &ImageReference) -> std::result::Result<(), CheckError>;
}

pub type BoxedCheck = Box<dyn Check>;

/// Evidence provider handles injected into checks.
#[derive(Clone)]
pub struct Providers {
    pub metadata: Arc<dyn MetadataClient>,
    pub repository: Option<Arc<dyn RepositoryClient>>,
}

impl Providers {
    pub fn new(metadata: Arc<dyn MetadataClient>) -> Self {
        Self {
            metadata,
            repository: None,
        }
    }

    pub fn with_repository(mut self, repository: Arc<dyn RepositoryClient>) -> Self {
        self.repository = Some(repository);
        self
    }
}

/// Names of the built-in checks.
#[derive(AsRefStr, Display, EnumString, EnumIter, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CheckName {
    Approved,
    Diy,
    Org,
    Provenance,
    Snakeoil,
}

/// Create a built-in [`Check`] by name, configured from `config` and wired
/// to `providers`.
pub fn new_check(name: &str, config: &VoucherConfig, providers: &Providers) -> Result<BoxedCheck> {
    let check_name =
        CheckName::try_from(name).map_err(|_| Error::UnknownCheck(name.to_string()))?;
    let metadata = providers.metadata.clone();

    let check = match check_name {
        CheckName::Approved => {
            let repository = providers
                .repository
                .clone()
                .ok_or_else(|| Error::MissingRepositoryClient(name.to_string()))?;
            Box::new(ApprovedCheck::new(metadata, repository)) as BoxedCheck
        }
        CheckName::Diy => Box::new(DiyCheck::new(config.diy.valid_repos.clone())) as BoxedCheck,
        CheckName::Org => {
            Box::new(OrgCheck::new(metadata, config.org.urls.clone())) as BoxedCheck
        }
        CheckName::Provenance => Box::new(ProvenanceCheck::new(
            metadata,
            config.provenance.trusted_builder_identities.clone(),
            config.provenance.trusted_projects.clone(),
        )) as BoxedCheck,
        CheckName::Snakeoil => {
            Box::new(SnakeoilCheck::new(metadata, config.snakeoil.fail_on)) as BoxedCheck
        }
    };

    Ok(check)
}
