// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use async_trait::async_trait;

use super::{Check, CheckError, Rejection};
use crate::image::ImageReference;

/// Passes images pushed to one of the configured repositories, i.e. images
/// that were built in-house.
pub struct DiyCheck {
    valid_repos: Vec<String>,
}

impl DiyCheck {
    pub fn new(valid_repos: Vec<String>) -> Self {
        Self { valid_repos }
    }
}

#[async_trait]
impl Check for DiyCheck {
    async fn check(&self, image: &ImageReference) -> Result<(), CheckError> {
        if self
            .valid_repos
            .iter()
            .any(|repo| !repo.is_empty() && image.name().starts_with(repo.as_str()))
        {
            return Ok(());
        }

        Err(Rejection::NotFromValidRepository.into())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::checks::tests::IMAGE;

    #[rstest]
    #[case(vec!["gcr.io/voucher-test-project/"], true)]
    #[case(vec!["docker.io/library/", "gcr.io/voucher-test-project/apps/"], true)]
    #[case(vec!["gcr.io/other-project/"], false)]
    #[case(vec![""], false)]
    #[case(vec![], false)]
    #[tokio::test]
    async fn diy_check(#[case] valid_repos: Vec<&str>, #[case] should_pass: bool) {
        let image = ImageReference::parse(IMAGE).unwrap();
        let check = DiyCheck::new(valid_repos.into_iter().map(String::from).collect());

        let res = check.check(&image).await;
        if should_pass {
            assert!(res.is_ok());
        } else {
            assert_eq!(
                res.unwrap_err().rejection(),
                Some(&Rejection::NotFromValidRepository)
            );
        }
    }
}
