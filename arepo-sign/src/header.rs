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

// Signature header encode/decode.
//
// Format: eight bytes of padded URL-safe base64 encoding a little-endian
// u32 *N* (the base64 length of the signature), a single space, then *N*
// base64 characters encoding the signature bytes, then a single LF. The
// bytes covered by the signature are everything after that LF.
//
// The legacy variant (a bare base64 line terminated by LF/CRLF/CR) is
// intentionally not supported: reading it should surface as the same
// malformed-header errors as any other corrupt header.

use arepo_common::{ArepoError, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;

pub const LENGTH_PREFIX_LEN: usize = 8;

/// Encodes the fixed-width length prefix for a base64-encoded signature
/// of `b64_len` characters.
pub fn encode_length_prefix(b64_len: u32) -> [u8; LENGTH_PREFIX_LEN] {
    let encoded = URL_SAFE.encode(b64_len.to_le_bytes());
    debug_assert_eq!(encoded.len(), LENGTH_PREFIX_LEN);
    let mut out = [0u8; LENGTH_PREFIX_LEN];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Decodes the fixed-width length prefix back into the base64 length it
/// carries.
pub fn decode_length_prefix(bytes: &[u8; LENGTH_PREFIX_LEN]) -> Result<u32> {
    let decoded = URL_SAFE
        .decode(bytes)
        .map_err(|e| ArepoError::SignatureHeaderBadBase64(e.to_string()))?;
    let arr: [u8; 4] = decoded
        .try_into()
        .map_err(|_| ArepoError::SignatureHeaderTooShort)?;
    Ok(u32::from_le_bytes(arr))
}

/// Builds the full header (length prefix + space + base64 signature) for
/// `signature_bytes`, without the trailing LF.
pub fn encode_header(signature_bytes: &[u8]) -> Vec<u8> {
    let b64_sig = URL_SAFE.encode(signature_bytes);
    let mut out = encode_length_prefix(b64_sig.len() as u32).to_vec();
    out.push(b' ');
    out.extend_from_slice(b64_sig.as_bytes());
    out
}

/// Prepends a signature header and its terminating LF to `payload`,
/// returning the full signed artifact bytes.
pub fn prepend_header(payload: &[u8], signature_bytes: &[u8]) -> Vec<u8> {
    let mut out = encode_header(signature_bytes);
    out.push(b'\n');
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_round_trips() {
        for n in [0u32, 1, 4, 255, 65535, 1_000_000] {
            let encoded = encode_length_prefix(n);
            assert_eq!(encoded.len(), LENGTH_PREFIX_LEN);
            assert_eq!(decode_length_prefix(&encoded).unwrap(), n);
        }
    }

    #[test]
    fn header_then_lf_then_payload_is_bijective() {
        let signature = b"fake-signature-bytes";
        let payload = b"hello world";
        let artifact = prepend_header(payload, signature);

        let lf_pos = artifact.iter().position(|&b| b == b'\n').unwrap();
        let header = &artifact[..lf_pos];
        let rest = &artifact[lf_pos + 1..];
        assert_eq!(rest, payload);

        let len_prefix: [u8; LENGTH_PREFIX_LEN] = header[..LENGTH_PREFIX_LEN].try_into().unwrap();
        let n = decode_length_prefix(&len_prefix).unwrap() as usize;
        assert_eq!(header[LENGTH_PREFIX_LEN], b' ');
        let b64_sig = &header[LENGTH_PREFIX_LEN + 1..];
        assert_eq!(b64_sig.len(), n);
        let decoded_sig = URL_SAFE.decode(b64_sig).unwrap();
        assert_eq!(decoded_sig, signature);
    }
}
