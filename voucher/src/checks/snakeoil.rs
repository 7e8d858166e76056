// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::{Check, CheckError, Rejection};
use crate::{
    image::ImageReference,
    metadata::{MetadataClient, Severity},
};

/// Vulnerability threshold policy: fails when the scanner reported any
/// finding at or above `fail_on`.
pub struct SnakeoilCheck {
    metadata: Arc<dyn MetadataClient>,
    fail_on: Severity,
}

impl SnakeoilCheck {
    pub fn new(metadata: Arc<dyn MetadataClient>, fail_on: Severity) -> Self {
        Self { metadata, fail_on }
    }
}

#[async_trait]
impl Check for SnakeoilCheck {
    async fn check(&self, image: &ImageReference) -> Result<(), CheckError> {
        let vulnerabilities = self.metadata.get_vulnerabilities(image).await?;
        debug!(
            "{image} has {} known vulnerabilities",
            vulnerabilities.len()
        );

        let names: Vec<String> = vulnerabilities
            .into_iter()
            .filter(|v| v.severity >= self.fail_on)
            .map(|v| v.name)
            .collect();

        if !names.is_empty() {
            return Err(Rejection::Vulnerable {
                count: names.len(),
                names,
            }
            .into());
        }

        Ok(())
    }
}
