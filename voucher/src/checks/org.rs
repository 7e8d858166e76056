// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::{Check, CheckError, Rejection};
use crate::{image::ImageReference, metadata::MetadataClient};

/// Passes images whose source repository belongs to a trusted organisation.
pub struct OrgCheck {
    metadata: Arc<dyn MetadataClient>,
    urls: Vec<String>,
}

impl OrgCheck {
    pub fn new(metadata: Arc<dyn MetadataClient>, urls: Vec<String>) -> Self {
        Self { metadata, urls }
    }

    // `https://github.com/grafeas` trusts `https://github.com/grafeas/voucher`
    // but not `https://github.com/grafeas-fork/voucher`.
    fn is_trusted(&self, repository_url: &str) -> bool {
        let repository_url = repository_url.trim_end_matches('/');
        self.urls
            .iter()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .any(|url| {
                repository_url == url
                    || repository_url
                        .strip_prefix(url)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
    }
}

#[async_trait]
impl Check for OrgCheck {
    async fn check(&self, image: &ImageReference) -> Result<(), CheckError> {
        let build_detail = self.metadata.get_build_detail(image).await?;
        debug!("{image} was built from {}", build_detail.repository_url);

        if !self.is_trusted(&build_detail.repository_url) {
            return Err(Rejection::UntrustedOrganization.into());
        }

        Ok(())
    }
}
