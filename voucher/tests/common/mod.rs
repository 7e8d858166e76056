// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

#![allow(dead_code)]

use sequoia_openpgp::{cert::CertBuilder, serialize::SerializeInto};
use serde_json::{json, Value};

pub const IMAGE: &str = "gcr.io/voucher-test-project/apps/staging/voucher-internal@sha256:73d506a23331fce5cb6f49bfb4c27450d2ef4878efce89f03a46b27372a88430";

pub const DIGEST: &str = "sha256:73d506a23331fce5cb6f49bfb4c27450d2ef4878efce89f03a46b27372a88430";

/// An image nothing is known about.
pub const UNKNOWN_IMAGE: &str = "gcr.io/voucher-test-project/apps/staging/unknown@sha256:0000000000000000000000000000000000000000000000000000000000000000";

pub const REPOSITORY_URL: &str = "https://github.com/grafeas/voucher-internal";

pub const COMMIT_URL: &str = "https://github.com/grafeas/voucher-internal/commit/efgh6543";

pub const BUILDER: &str = "builder@voucher-test-project.iam.gserviceaccount.com";

pub const PROJECT: &str = "voucher-test-project";

pub const CHECKS: [&str; 5] = ["approved", "diy", "org", "provenance", "snakeoil"];

/// ASCII-armored secret key usable for signing.
pub fn armored_secret_key(name: &str) -> String {
    let (cert, _) = CertBuilder::new()
        .add_userid(format!("{name}@voucher.test"))
        .add_signing_subkey()
        .generate()
        .expect("generate key");
    let armored = cert.as_tsk().armored().to_vec().expect("armor key");
    String::from_utf8(armored).expect("utf-8")
}

/// Secrets document with a fresh key for every built-in check.
pub fn secrets_document() -> Value {
    let keys: serde_json::Map<String, Value> = CHECKS
        .iter()
        .map(|name| (name.to_string(), Value::String(armored_secret_key(name))))
        .collect();
    json!({ "openpgpkeys": keys })
}

/// Evidence under which every built-in check passes for [`IMAGE`].
pub fn metadata_document() -> Value {
    json!({
        IMAGE: {
            "build_detail": {
                "repository_url": REPOSITORY_URL,
                "commit": "efgh6543",
                "project_id": PROJECT,
                "build_creator": BUILDER,
                "build_url": "https://console.cloud.google.com/cloud-build/builds/1234",
                "artifacts": [{ "id": IMAGE, "checksum": DIGEST }]
            },
            "vulnerabilities": [
                { "name": "CVE-2024-0001", "severity": "low", "fix_available": false }
            ]
        }
    })
}

pub fn repository_document() -> Value {
    json!({
        "commits": {
            COMMIT_URL: {
                "url": COMMIT_URL,
                "status": "SUCCESS",
                "is_signed": true,
                "associated_pull_requests": [{
                    "is_merged": true,
                    "merge_commit": { "url": COMMIT_URL },
                    "has_required_approvals": true
                }]
            }
        },
        "default_branches": {
            REPOSITORY_URL: {
                "name": "production",
                "commit_refs": [{ "url": COMMIT_URL }]
            }
        }
    })
}

/// Check settings under which [`metadata_document`] passes.
pub const CHECK_SETTINGS: &str = r#"
[diy]
valid_repos = ["gcr.io/voucher-test-project/"]

[org]
urls = ["https://github.com/grafeas"]

[provenance]
trusted_builder_identities = ["builder@voucher-test-project.iam.gserviceaccount.com"]
trusted_projects = ["voucher-test-project"]

[snakeoil]
fail_on = "high"
"#;
