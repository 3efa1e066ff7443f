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

// Convenience wrapper tying key + header together: `sign` hashes and
// signs a byte buffer, returning the full artifact (header + LF + payload)
// ready to write to disk.

use arepo_common::Result;
use sha2::{Digest, Sha256};

use crate::header::prepend_header;
use crate::key::PrivateKey;

/// Signs `payload` with `key` and returns the complete signed artifact:
/// header, a single LF, then the unmodified payload bytes.
pub fn sign(key: &PrivateKey, payload: &[u8]) -> Result<Vec<u8>> {
    let digest: [u8; 32] = Sha256::digest(payload).into();
    let signature = key.sign_digest(&digest)?;
    Ok(prepend_header(payload, &signature))
}

/// Signs a UTF-8 string payload; a thin convenience over [`sign`] for the
/// metadata files, which are always text.
pub fn sign_string(key: &PrivateKey, payload: &str) -> Result<Vec<u8>> {
    sign(key, payload.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::PrivateKey as Key;
    use crate::reader::SignatureVerifyingReader;
    use rand::rngs::OsRng;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;
    use std::io::{Cursor, Read};

    #[test]
    fn sign_then_verify_round_trips() {
        let rsa = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = rsa.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        let key = Key::from_pkcs8_bytes(pem.as_bytes()).unwrap();

        let artifact = sign(&key, b"{\"package\":\"com.example.app\"}").unwrap();
        let mut reader = SignatureVerifyingReader::new(Cursor::new(artifact), key.derive_public_key());
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"{\"package\":\"com.example.app\"}");
        assert!(reader.verify().unwrap());
    }
}
