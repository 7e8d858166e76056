// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Build provenance policy.
//!
//! The image must have been produced by a trusted builder, inside a trusted
//! project, and be one of the artifacts that build recorded.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::{Check, CheckError, Rejection};
use crate::{
    image::ImageReference,
    metadata::{self, MetadataClient},
};

pub struct ProvenanceCheck {
    metadata: Arc<dyn MetadataClient>,
    trusted_builder_identities: Vec<String>,
    trusted_projects: Vec<String>,
}

impl ProvenanceCheck {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        trusted_builder_identities: Vec<String>,
        trusted_projects: Vec<String>,
    ) -> Self {
        Self {
            metadata,
            trusted_builder_identities,
            trusted_projects,
        }
    }
}

#[async_trait]
impl Check for ProvenanceCheck {
    async fn check(&self, image: &ImageReference) -> Result<(), CheckError> {
        let build_detail = match self.metadata.get_build_detail(image).await {
            Ok(detail) => detail,
            Err(metadata::Error::NoMetadata(e)) => {
                debug!("{e}");
                return Err(Rejection::NoBuildDetail.into());
            }
            Err(e) => return Err(e.into()),
        };

        if !self
            .trusted_builder_identities
            .contains(&build_detail.build_creator)
        {
            return Err(Rejection::UntrustedBuilder(build_detail.build_creator).into());
        }

        if !self.trusted_projects.contains(&build_detail.project_id) {
            return Err(Rejection::UntrustedProject(build_detail.project_id).into());
        }

        if !build_detail
            .artifacts
            .iter()
            .any(|artifact| artifact.checksum == image.digest())
        {
            return Err(Rejection::NoMatchingArtifact.into());
        }

        Ok(())
    }
}
