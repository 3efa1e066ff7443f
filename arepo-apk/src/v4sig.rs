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

// APK Signature Scheme v4 fingerprint (C2): no crate in the corpus
// parses the v4 signing block (the pack's own zip crate marks it
// "not yet implemented and will never?"), so the sidecar `.idsig` file
// is fingerprinted directly — a SHA-256 over its whole contents, which
// changes iff the idsig itself changes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use arepo_common::{ArepoError, HexString, Result};
use sha2::{Digest, Sha256};

pub fn idsig_sidecar_path(apk_path: &Path) -> std::path::PathBuf {
    let mut name = apk_path.file_name().unwrap_or_default().to_os_string();
    name.push(".idsig");
    apk_path.with_file_name(name)
}

pub fn v4_fingerprint(idsig_path: &Path) -> Result<HexString> {
    let mut file = File::open(idsig_path).map_err(ArepoError::from)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(ArepoError::from)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(HexString::from_bytes(&hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idsig_sidecar_path_appends_suffix() {
        let apk = Path::new("/repo/apps/com.example/1.apk");
        assert_eq!(idsig_sidecar_path(apk), Path::new("/repo/apps/com.example/1.apk.idsig"));
    }
}
