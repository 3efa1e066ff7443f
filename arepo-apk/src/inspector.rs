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

// Composes native manifest/signature/icon extraction into one
// `ApkDetails` record per APK (C2). Everything runs in-process against
// an already-parsed `apk_info::Apk`; there is no external tool to shell
// out to.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use apk_info::Apk;
use arepo_common::{ArepoError, Base64String, HexString, PackageName, Result, VersionCode};
use sha2::{Digest, Sha256};

use crate::icon::{extract_icon, DEFAULT_MIN_DENSITY};
use crate::manifest::read_manifest;
use crate::signatures::signing_cert_fingerprints;
use crate::v4sig::{idsig_sidecar_path, v4_fingerprint};

#[derive(Debug, Clone)]
pub struct ApkDetails {
    pub package_name: PackageName,
    pub version_code: VersionCode,
    pub version_name: String,
    pub min_sdk_version: String,
    pub label: Option<String>,
    pub sha256: Base64String,
    pub signing_cert_fingerprints: HashSet<HexString>,
    pub v4_fingerprint: Option<HexString>,
    pub icon: Option<Vec<u8>>,
}

pub struct ApkInspector {
    min_icon_density: String,
}

impl Default for ApkInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ApkInspector {
    pub fn new() -> Self {
        ApkInspector { min_icon_density: DEFAULT_MIN_DENSITY.to_string() }
    }

    pub fn with_min_icon_density(mut self, density: impl Into<String>) -> Self {
        self.min_icon_density = density.into();
        self
    }

    pub fn inspect(&self, apk_path: &Path) -> Result<ApkDetails> {
        let apk = Apk::new(apk_path).map_err(|e| ArepoError::ZipParseFailed(e.to_string()))?;

        let manifest = read_manifest(&apk)?;
        let package_name = PackageName::parse(&manifest.package_name)?;
        let version_code = VersionCode::parse(&manifest.version_code)
            .map_err(|_| ArepoError::ApkAmbiguousInteger("versionCode".into()))?;

        let sha256 = hash_file(apk_path)?;
        let signing_cert_fingerprints = signing_cert_fingerprints(&apk)?;

        let idsig_path = idsig_sidecar_path(apk_path);
        let v4_fp = if idsig_path.is_file() { Some(v4_fingerprint(&idsig_path)?) } else { None };

        let icon = match &manifest.icon_res_path {
            Some(icon_res_path) => match extract_icon(&apk, icon_res_path, &self.min_icon_density)? {
                Some(bytes) => Some(bytes),
                None => {
                    log::warn!("{package_name}: no launcher icon found at or above density '{}'", self.min_icon_density);
                    None
                }
            },
            None => {
                log::warn!("{package_name}: manifest has no application icon attribute");
                None
            }
        };

        Ok(ApkDetails {
            package_name,
            version_code,
            version_name: manifest.version_name,
            min_sdk_version: manifest.min_sdk_version,
            label: manifest.label,
            sha256,
            signing_cert_fingerprints,
            v4_fingerprint: v4_fp,
            icon,
        })
    }
}

fn hash_file(path: &Path) -> Result<Base64String> {
    let mut file = File::open(path).map_err(ArepoError::from)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(ArepoError::from)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Base64String::from_bytes(&hasher.finalize()))
}
