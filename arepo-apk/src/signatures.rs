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

// Signing-certificate fingerprint extraction (C2): reads the v1/v2/v3/
// v3.1 signing blocks already parsed out of the APK's zip central
// directory and collects the SHA-256 fingerprint of every certificate
// found, across every scheme present.

use std::collections::HashSet;

use apk_info::Apk;
use apk_info_zip::Signature;
use arepo_common::{ArepoError, HexString, Result};

pub fn signing_cert_fingerprints(apk: &Apk) -> Result<HashSet<HexString>> {
    let signatures = apk.get_signatures().map_err(|e| ArepoError::ApkSignatureParseFailed(e.to_string()))?;

    let mut fingerprints = HashSet::new();
    for signature in signatures {
        let certs = match signature {
            Signature::V1(certs) | Signature::V2(certs) | Signature::V3(certs) | Signature::V31(certs) => certs,
            _ => continue,
        };
        for cert in certs {
            fingerprints.insert(HexString::parse(&cert.sha256_fingerprint)?);
        }
    }

    if fingerprints.is_empty() {
        return Err(ArepoError::ApkSignatureParseFailed("no signing certificates found in APK".into()));
    }
    Ok(fingerprints)
}
