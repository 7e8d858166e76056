// Copyright (c) 2024 The Voucher Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Evidence provider implementations shipped with the crate.

pub mod offline;

pub use offline::{OfflineMetadataClient, OfflineRepositoryClient};
