// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{env, path::Path};

use anyhow::*;
use config::{Config, Environment, File};
use log::{debug, info};
use serde::Deserialize;
use strum::IntoEnumIterator;

use crate::{checks::CheckName, metadata::Severity};

/// Environment variable naming the configuration file when `--config` is
/// not given.
pub const CONFIG_PATH_ENV: &str = "VOUCHER_CONFIG_PATH";

fn default_enabled_checks() -> Vec<String> {
    CheckName::iter().map(|name| name.to_string()).collect()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ChecksConfig {
    /// Checks the engine registers. Defaults to every built-in check.
    #[serde(default = "default_enabled_checks")]
    pub enabled: Vec<String>,

    /// Checks that decide the overall verdict. Empty means all enabled ones.
    #[serde(default)]
    pub required: Vec<String>,

    /// Evaluate without signing or submitting any attestation.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_checks(),
            required: Vec::new(),
            dry_run: false,
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct DiyConfig {
    /// Image name prefixes that count as built from a trusted repository,
    /// e.g. `gcr.io/my-project/`.
    #[serde(default)]
    pub valid_repos: Vec<String>,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct OrgConfig {
    /// Source organisations trusted to build images, e.g.
    /// `https://github.com/grafeas`.
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct ProvenanceConfig {
    #[serde(default)]
    pub trusted_builder_identities: Vec<String>,

    #[serde(default)]
    pub trusted_projects: Vec<String>,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct SnakeoilConfig {
    /// Lowest severity that fails the check.
    #[serde(default = "SnakeoilConfig::default_fail_on")]
    pub fail_on: Severity,
}

impl SnakeoilConfig {
    fn default_fail_on() -> Severity {
        Severity::High
    }
}

impl Default for SnakeoilConfig {
    fn default() -> Self {
        Self {
            fail_on: Self::default_fail_on(),
        }
    }
}

/// File-backed evidence used by the one-shot binary.
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct OfflineConfig {
    pub metadata_path: Option<String>,

    pub repository_path: Option<String>,

    /// Where submitted attestations are persisted between runs.
    pub attestations_path: Option<String>,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct VoucherConfig {
    #[serde(default)]
    pub checks: ChecksConfig,

    /// JSON secrets document with the per-check signing keys. Without one
    /// no attestation can be signed.
    pub keyring_path: Option<String>,

    #[serde(default)]
    pub diy: DiyConfig,

    #[serde(default)]
    pub org: OrgConfig,

    #[serde(default)]
    pub provenance: ProvenanceConfig,

    #[serde(default)]
    pub snakeoil: SnakeoilConfig,

    #[serde(default)]
    pub offline: OfflineConfig,
}

impl VoucherConfig {
    pub fn new(config_path: Option<String>) -> Result<Self> {
        let config_path = config_path.or_else(|| {
            if let std::result::Result::Ok(env_path) = env::var(CONFIG_PATH_ENV) {
                debug!("Read voucher config path from env: {env_path}");
                return Some(env_path);
            }
            None
        });

        match config_path {
            Some(path) => {
                info!("Use configuration file {path}");
                if !Path::new(&path).exists() {
                    bail!("Config file {path} not found.")
                }

                Self::from_file(&path)
            }
            None => {
                info!("No config path specified, use a default config.");
                Self::build(None)
            }
        }
    }

    /// Load `VoucherConfig` from a configuration file. Supported formats are
    /// all formats supported by the `config` crate.
    fn from_file(config_path: &str) -> Result<Self> {
        Self::build(Some(config_path))
    }

    // Values from `VOUCHER__<SECTION>__<KEY>` environment variables override
    // the file.
    fn build(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("checks.dry_run", false)?
            .set_default("snakeoil.fail_on", "high")?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }

        let c = builder
            .add_source(
                Environment::with_prefix("VOUCHER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("checks.enabled")
                    .with_list_parse_key("checks.required")
                    .with_list_parse_key("diy.valid_repos")
                    .with_list_parse_key("org.urls")
                    .with_list_parse_key("provenance.trusted_builder_identities")
                    .with_list_parse_key("provenance.trusted_projects"),
            )
            .build()?;

        let res = c.try_deserialize().context("invalid config")?;
        Ok(res)
    }
}
