// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Source repository evidence
//!
//! Models of the source-hosting facts a check reasons over (commits,
//! branches, pull requests) and the [`RepositoryClient`] contract through
//! which they are fetched. Concrete source-hosting clients live outside
//! this crate; [`crate::providers::offline`] ships a file-backed one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::BuildDetail;

/// CI verdict string reported for a commit whose checks all succeeded.
pub const CI_SUCCESS: &str = "SUCCESS";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("commit {0} not found")]
    CommitNotFound(String),

    #[error("default branch of {0} not found")]
    BranchNotFound(String),

    #[error("repository provider request failed")]
    Request {
        #[source]
        source: anyhow::Error,
    },
}

/// A lightweight pointer to a commit, compared by URL.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub url: String,
}

impl CommitRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub is_merged: bool,

    #[serde(default)]
    pub merge_commit: CommitRef,

    #[serde(default)]
    pub has_required_approvals: bool,
}

/// One source revision plus everything needed to judge it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub url: String,

    /// CI verdict, [`CI_SUCCESS`] when every status check passed.
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub is_signed: bool,

    #[serde(default)]
    pub associated_pull_requests: Vec<PullRequest>,
}

impl Commit {
    /// The pull request that produced this commit as its merge commit.
    ///
    /// If several pull requests claim the same merge commit the first one in
    /// list order wins.
    pub fn merging_pull_request(&self) -> Option<&PullRequest> {
        self.associated_pull_requests
            .iter()
            .find(|pr| pr.merge_commit.url == self.url)
    }

    pub fn passed_ci(&self) -> bool {
        self.status == CI_SUCCESS
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,

    #[serde(default)]
    pub commit_refs: Vec<CommitRef>,
}

impl Branch {
    pub fn contains(&self, commit_url: &str) -> bool {
        self.commit_refs.iter().any(|c| c.url == commit_url)
    }
}

/// Read access to a source-hosting service.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Resolve the commit the build was produced from.
    async fn get_commit(&self, build_detail: &BuildDetail) -> Result<Commit>;

    /// Resolve the protected default branch of the build's repository.
    async fn get_default_branch(&self, build_detail: &BuildDetail) -> Result<Branch>;
}
