// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Build provenance and code review policy.
//!
//! The image must have been built from a signed merge commit of an approved
//! pull request that sits on the protected default branch and passed CI.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::{Check, CheckError, Rejection};
use crate::{image::ImageReference, metadata::MetadataClient, repository::RepositoryClient};

pub struct ApprovedCheck {
    metadata: Arc<dyn MetadataClient>,
    repository: Arc<dyn RepositoryClient>,
}

impl ApprovedCheck {
    pub fn new(metadata: Arc<dyn MetadataClient>, repository: Arc<dyn RepositoryClient>) -> Self {
        Self {
            metadata,
            repository,
        }
    }
}

#[async_trait]
impl Check for ApprovedCheck {
    async fn check(&self, image: &ImageReference) -> Result<(), CheckError> {
        let build_detail = self.metadata.get_build_detail(image).await?;
        let commit = self.repository.get_commit(&build_detail).await?;
        let default_branch = self.repository.get_default_branch(&build_detail).await?;
        debug!(
            "{image} was built from {} (default branch {})",
            commit.url, default_branch.name
        );

        if !default_branch.contains(&commit.url) {
            return Err(Rejection::NotOnDefaultBranch.into());
        }

        if !commit.is_signed {
            return Err(Rejection::NotSigned.into());
        }

        let pull_request = commit
            .merging_pull_request()
            .ok_or(Rejection::NotMergeCommit)?;

        if !pull_request.has_required_approvals {
            return Err(Rejection::MissingRequiredApprovals.into());
        }

        if !commit.passed_ci() {
            return Err(Rejection::NotPassedCi.into());
        }

        Ok(())
    }
}
