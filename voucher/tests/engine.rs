// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{collections::HashMap, io::Write, sync::Arc};

use assert_json_diff::assert_json_include;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use voucher::{
    checks::Providers,
    engine::FailureKind,
    keyring::{self, Secrets},
    metadata::MetadataClient,
    providers::{
        offline::{ImageEvidence, RepositoryEvidence},
        OfflineMetadataClient, OfflineRepositoryClient,
    },
    CheckEngine, ImageReference, KeyRing, VoucherConfig,
};

mod common;

fn config(extra: &str) -> VoucherConfig {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(common::CHECK_SETTINGS.as_bytes()).unwrap();
    file.write_all(extra.as_bytes()).unwrap();
    VoucherConfig::new(Some(file.path().to_str().unwrap().to_string())).unwrap()
}

fn metadata_client() -> Arc<OfflineMetadataClient> {
    let document: HashMap<String, ImageEvidence> =
        serde_json::from_value(common::metadata_document()).unwrap();
    let evidence = document
        .into_iter()
        .map(|(image, evidence)| (ImageReference::parse(&image).unwrap(), evidence))
        .collect();
    Arc::new(OfflineMetadataClient::new(evidence))
}

fn repository_client() -> Arc<OfflineRepositoryClient> {
    let evidence: RepositoryEvidence =
        serde_json::from_value(common::repository_document()).unwrap();
    Arc::new(OfflineRepositoryClient::new(evidence))
}

fn keyring() -> Arc<KeyRing> {
    let secrets: Secrets = serde_json::from_value(common::secrets_document()).unwrap();
    Arc::new(KeyRing::from_secrets(&secrets).unwrap())
}

#[tokio::test]
async fn all_checks_pass_and_attest() {
    let metadata = metadata_client();
    let keyring = keyring();
    let providers = Providers::new(metadata.clone()).with_repository(repository_client());
    let engine = CheckEngine::from_config(&config(""), providers, keyring.clone()).unwrap();

    let image = ImageReference::parse(common::IMAGE).unwrap();
    let cancel = CancellationToken::new();
    let report = engine.run(&image, &cancel).await;

    assert_json_include!(
        actual: serde_json::to_value(&report).unwrap(),
        expected: json!({
            "image": common::IMAGE,
            "success": true,
            "results": [
                { "name": "approved", "success": true, "attested": true },
                { "name": "diy", "success": true, "attested": true },
                { "name": "org", "success": true, "attested": true },
                { "name": "provenance", "success": true, "attested": true },
                { "name": "snakeoil", "success": true, "attested": true },
            ]
        })
    );

    let stored = metadata.get_attestations(&image).await.unwrap();
    assert_eq!(stored.len(), common::CHECKS.len());
    for attestation in &stored {
        let signer = keyring.get_signer_by_name(attestation.check_name()).unwrap();
        assert_eq!(attestation.key_id, signer.key_id());
        keyring::verify(
            &signer.public_cert(),
            attestation.body.as_bytes(),
            &attestation.signature,
        )
        .unwrap();
    }

    let verified = engine.verify(&image, &cancel).await.unwrap();
    assert!(verified.success);
    assert!(verified.results.iter().all(|r| r.attested));
    engine.close().await;
}

#[tokio::test]
async fn one_failing_check_does_not_block_others() {
    let metadata = metadata_client();
    // Without a repository client the approved check can not be built, so
    // leave it out and make snakeoil strict enough to fail.
    let mut config = config(
        r#"
[checks]
enabled = ["diy", "org", "provenance", "snakeoil"]
required = ["diy", "provenance"]
"#,
    );
    config.snakeoil.fail_on = voucher::metadata::Severity::Low;

    let engine =
        CheckEngine::from_config(&config, Providers::new(metadata.clone()), keyring()).unwrap();
    let image = ImageReference::parse(common::IMAGE).unwrap();
    let report = engine.run(&image, &CancellationToken::new()).await;

    // The failing snakeoil check is not required.
    assert!(report.success);
    let snakeoil = report.result("snakeoil").unwrap();
    assert_eq!(snakeoil.failure, Some(FailureKind::Rejected));
    assert_eq!(
        snakeoil.error.as_deref(),
        Some("image has 1 vulnerabilities at or above the threshold: CVE-2024-0001")
    );
    assert!(!snakeoil.attested);

    let stored = metadata.get_attestations(&image).await.unwrap();
    let mut attested: Vec<_> = stored.iter().map(|a| a.check_name().to_string()).collect();
    attested.sort();
    assert_eq!(attested, vec!["diy", "org", "provenance"]);
}

#[tokio::test]
async fn unknown_image_lacks_evidence() {
    let metadata = metadata_client();
    let providers = Providers::new(metadata.clone()).with_repository(repository_client());
    let engine = CheckEngine::from_config(&config(""), providers, keyring()).unwrap();

    let image = ImageReference::parse(common::UNKNOWN_IMAGE).unwrap();
    let report = engine.run(&image, &CancellationToken::new()).await;
    assert!(!report.success);

    for name in ["approved", "org", "snakeoil"] {
        assert_eq!(
            report.result(name).unwrap().failure,
            Some(FailureKind::Evidence),
            "{name}"
        );
    }
    assert_eq!(
        report.result("provenance").unwrap().failure,
        Some(FailureKind::Rejected)
    );

    // The repository prefix alone satisfies diy.
    assert!(report.result("diy").unwrap().attested);
    let stored = metadata.get_attestations(&image).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].check_name(), "diy");
}

#[test]
fn missing_repository_client_is_a_configuration_error() {
    let err = CheckEngine::from_config(
        &VoucherConfig::default(),
        Providers::new(metadata_client()),
        keyring(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, voucher::Error::MissingRepositoryClient(name) if name == "approved"));
}
