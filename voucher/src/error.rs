// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

use crate::{image, keyring, metadata, repository};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown check `{0}`")]
    UnknownCheck(String),

    #[error("check `{0}` needs a repository client but none is configured")]
    MissingRepositoryClient(String),

    #[error("required check `{0}` is not enabled")]
    RequiredCheckNotEnabled(String),

    #[error("invalid image reference")]
    ImageReference(#[from] image::ImageReferenceError),

    #[error("keyring failure")]
    KeyRing(#[from] keyring::KeyRingError),

    #[error("metadata provider failure")]
    Metadata(#[from] metadata::Error),

    #[error("repository provider failure")]
    Repository(#[from] repository::Error),

    #[error("load offline evidence from {path} failed")]
    OfflineEvidence {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}
