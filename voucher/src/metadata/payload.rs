// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use serde::{Deserialize, Serialize};

use crate::image::ImageReference;

use super::{Error, Result};

/// Signature type recorded in every payload produced here.
pub const PAYLOAD_TYPE: &str = "Google cloud binauthz container signature";

// The body that gets signed when attesting an image. It follows the
// container signature format of
// https://github.com/containers/image/blob/main/docs/containers-signature.5.md
// restricted to the critical section. Field declaration order is the
// serialization order, which keeps the output byte-stable.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct SigningPayload {
    critical: PayloadCritical,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
struct PayloadCritical {
    identity: PayloadIdentity,
    image: PayloadImage,
    r#type: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
struct PayloadIdentity {
    #[serde(rename = "docker-reference")]
    docker_reference: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
struct PayloadImage {
    #[serde(rename = "docker-manifest-digest")]
    docker_manifest_digest: String,
}

impl SigningPayload {
    pub fn new(image: &ImageReference) -> Self {
        Self {
            critical: PayloadCritical {
                identity: PayloadIdentity {
                    docker_reference: image.name().to_string(),
                },
                image: PayloadImage {
                    docker_manifest_digest: image.digest().to_string(),
                },
                r#type: PAYLOAD_TYPE.to_string(),
            },
        }
    }

    pub fn docker_reference(&self) -> &str {
        &self.critical.identity.docker_reference
    }

    pub fn manifest_digest(&self) -> &str {
        &self.critical.image.docker_manifest_digest
    }

    /// Whether this payload makes its claim about `image`.
    pub fn refers_to(&self, image: &ImageReference) -> bool {
        self.docker_reference() == image.name() && self.manifest_digest() == image.digest()
    }

    pub fn to_canonical_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Payload)
    }

    pub fn from_body(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(Error::Payload)
    }
}
