// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use serde::{Deserialize, Serialize};

use crate::{
    image::ImageReference,
    keyring::{KeyRing, KeyRingError},
};

/// Unsigned claim that an image satisfies the named check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub check_name: String,

    /// Canonical `name@digest` of the attested image.
    pub image: String,
}

impl Attestation {
    pub fn new(check_name: &str, image: &ImageReference) -> Self {
        Self {
            check_name: check_name.to_string(),
            image: image.to_string(),
        }
    }
}

/// An [`Attestation`] bound to the exact bytes that were signed, the
/// detached signature over them and the id of the signing key.
///
/// Never mutated once built; the metadata store owns it after submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAttestation {
    #[serde(flatten)]
    pub attestation: Attestation,

    pub body: String,

    /// ASCII-armored detached OpenPGP signature over `body`.
    pub signature: String,

    pub key_id: String,
}

impl SignedAttestation {
    pub fn check_name(&self) -> &str {
        &self.attestation.check_name
    }
}

/// The bytes to sign for one check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationPayload {
    pub check_name: String,
    pub body: String,
}

impl AttestationPayload {
    pub fn new(check_name: &str, body: String) -> Self {
        Self {
            check_name: check_name.to_string(),
            body,
        }
    }

    /// Sign the body with the key provisioned for the payload's check and
    /// return `(signature, key_id)`. Performs no I/O.
    pub fn sign(&self, keyring: &KeyRing) -> Result<(String, String), KeyRingError> {
        let signer = keyring.get_signer_by_name(&self.check_name)?;
        let key_id = signer.key_id();
        let signature = signer.sign(self.body.as_bytes())?;

        Ok((signature, key_id))
    }

    /// Sign and bind the result to `image`.
    pub fn into_signed(
        self,
        keyring: &KeyRing,
        image: &ImageReference,
    ) -> Result<SignedAttestation, KeyRingError> {
        let (signature, key_id) = self.sign(keyring)?;

        Ok(SignedAttestation {
            attestation: Attestation::new(&self.check_name, image),
            body: self.body,
            signature,
            key_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::keyring::{tests::generate_signer, verify, KeyRing};

    use super::*;

    const IMAGE: &str = "gcr.io/proj/app@sha256:73d506a23331fce5cb6f49bfb4c27450d2ef4878efce89f03a46b27372a88430";

    #[test]
    fn sign_payload() {
        let signer = generate_signer("diy");
        let public = signer.public_cert();
        let expected_key_id = signer.key_id();

        let mut keyring = KeyRing::default();
        keyring.add_signer("diy", signer);

        let payload = AttestationPayload::new("diy", "some body".into());
        let (signature, key_id) = payload.sign(&keyring).unwrap();

        assert_eq!(key_id, expected_key_id);
        assert!(key_id.starts_with("0x"));
        verify(&public, b"some body", &signature).unwrap();
    }

    #[test]
    fn sign_payload_without_signer() {
        let keyring = KeyRing::default();
        let payload = AttestationPayload::new("snakeoil", "some body".into());
        let err = payload.sign(&keyring).unwrap_err();
        assert!(matches!(err, KeyRingError::NoSigner(name) if name == "snakeoil"));
    }

    #[test]
    fn signed_attestation_serialization() {
        let image = ImageReference::parse(IMAGE).unwrap();
        let mut keyring = KeyRing::default();
        keyring.add_signer("approved", generate_signer("approved"));

        let signed = AttestationPayload::new("approved", "body".into())
            .into_signed(&keyring, &image)
            .unwrap();
        assert_eq!(signed.check_name(), "approved");
        assert_eq!(signed.attestation.image, IMAGE);

        let value = serde_json::to_value(&signed).unwrap();
        assert_eq!(value["check_name"], "approved");
        assert_eq!(value["image"], IMAGE);
        assert_eq!(value["body"], "body");

        let parsed: SignedAttestation = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, signed);
    }
}
