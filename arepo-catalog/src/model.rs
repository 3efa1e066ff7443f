// Copyright 2024 The arepo Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Row types for the four catalog tables. Each mirrors one table exactly;
// composing richer views (e.g. joining release + deltas) is the job of
// the query methods on `Catalog`, not of these structs.

use std::collections::HashSet;

use arepo_common::{Base64String, HexString, PackageName, UnixTimestamp, VersionCode};

#[derive(Debug, Clone)]
pub struct App {
    pub package_name: PackageName,
    pub label: Option<String>,
    pub group_tag: Option<String>,
    pub latest_version_code: VersionCode,
    pub last_update_timestamp: UnixTimestamp,
}

#[derive(Debug, Clone)]
pub struct AppRelease {
    pub package_name: PackageName,
    pub version_code: VersionCode,
    pub version_name: String,
    pub min_sdk_version: String,
    pub sha256: Base64String,
    pub signing_cert_fingerprints: HashSet<HexString>,
    pub v4_fingerprint: Option<HexString>,
    pub release_notes_md: Option<String>,
    pub icon_png: Option<Vec<u8>>,
    pub inserted_at: UnixTimestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delta {
    pub package_name: PackageName,
    pub base_version_code: VersionCode,
    pub target_version_code: VersionCode,
    pub file_size: u64,
    pub sha256: Base64String,
}

#[derive(Debug, Clone)]
pub struct AppGroup {
    pub tag: String,
    pub members: Vec<PackageName>,
}
