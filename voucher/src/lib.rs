// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Supply-chain policy checks for container images.
//!
//! A [`CheckEngine`] runs a set of [`checks::Check`]s against a digest-pinned
//! [`ImageReference`], using evidence from a [`metadata::MetadataClient`]
//! and a [`repository::RepositoryClient`]. For every check that passes it
//! signs an attestation with that check's key from the [`KeyRing`] and
//! publishes it to the metadata store.

pub mod attestation;
pub mod checks;
pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod keyring;
pub mod metadata;
pub mod providers;
pub mod repository;

pub use attestation::{Attestation, AttestationPayload, SignedAttestation};
pub use config::VoucherConfig;
pub use engine::{CheckEngine, CheckResult, Report};
pub use error::{Error, Result};
pub use image::ImageReference;
pub use keyring::{KeyRing, Signer};
