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

// JSON shape written to `latest.txt` and, one line per app, to
// `latest-bulk-metadata.txt`. Field names are camelCase to match the
// documented on-disk format exactly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeltaInfo {
    #[serde(rename = "versionCode")]
    pub version_code: u64,
    #[serde(rename = "sha256Checksum")]
    pub sha256_checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub package: String,
    #[serde(rename = "groupId")]
    pub group_id: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "latestVersionCode")]
    pub latest_version_code: u64,
    #[serde(rename = "latestVersionName")]
    pub latest_version_name: String,
    #[serde(rename = "lastUpdateTimestamp")]
    pub last_update_timestamp: u64,
    #[serde(rename = "sha256Checksum")]
    pub sha256_checksum: String,
    #[serde(rename = "deltaInfo")]
    pub delta_info: Vec<DeltaInfo>,
    #[serde(rename = "releaseNotes")]
    pub release_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_match_the_documented_schema() {
        let metadata = ReleaseMetadata {
            package: "app.attestation.auditor".into(),
            group_id: None,
            label: Some("Auditor".into()),
            latest_version_code: 27,
            latest_version_name: "27".into(),
            last_update_timestamp: 1622153179,
            sha256_checksum: "abc123".into(),
            delta_info: vec![DeltaInfo { version_code: 26, sha256_checksum: "def456".into() }],
            release_notes: None,
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"latestVersionCode\":27"));
        assert!(json.contains("\"groupId\":null"));
        assert!(json.contains("\"deltaInfo\":[{\"versionCode\":26"));
    }
}
