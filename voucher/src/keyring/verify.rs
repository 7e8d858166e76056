// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use anyhow::anyhow;
use openpgp::{
    parse::{
        stream::{DetachedVerifierBuilder, MessageLayer, MessageStructure, VerificationHelper},
        Parse,
    },
    policy::StandardPolicy,
    Cert, KeyHandle,
};
use sequoia_openpgp as openpgp;

use super::{KeyRingError, Result};

// Only the one certificate handed in is trusted; whatever issuer the
// signature claims, it has to verify against that key.
struct SingleCertHelper<'a> {
    cert: &'a Cert,
}

impl VerificationHelper for SingleCertHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(vec![self.cert.clone()])
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                if results.iter().any(|r| r.is_ok()) {
                    return Ok(());
                }
            }
        }

        Err(anyhow!(
            "no valid signature by {} found",
            self.cert.fingerprint()
        ))
    }
}

/// Verify an ASCII-armored detached `signature` over `body` against `cert`.
pub fn verify(cert: &Cert, body: &[u8], signature: &str) -> Result<()> {
    let policy = StandardPolicy::new();
    let helper = SingleCertHelper { cert };

    let mut verifier = DetachedVerifierBuilder::from_bytes(signature.as_bytes())
        .map_err(KeyRingError::Verify)?
        .with_policy(&policy, None, helper)
        .map_err(KeyRingError::Verify)?;

    verifier.verify_bytes(body).map_err(KeyRingError::Verify)
}
