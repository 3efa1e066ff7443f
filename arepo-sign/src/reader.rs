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

// Streaming signature-verifying reader.
//
// Wraps any `Read` byte source. The first call to `read()` consumes the
// header entirely from the inner reader (it may itself issue several
// small reads against `inner`), then every subsequent byte handed back
// to the caller is also fed into a running SHA-256 digest. `verify()`
// finalizes that digest and checks it against the parsed signature with
// the caller-supplied public key. Header malformation surfaces as an
// `io::Error` on the first `read()` call, matching the "first read
// parses the header" contract.

use std::io::{self, Read};

use arepo_common::ArepoError;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::header::{decode_length_prefix, LENGTH_PREFIX_LEN};
use crate::key::PublicKey;

fn header_err(e: ArepoError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

#[derive(PartialEq, Eq)]
enum State {
    Header,
    Body,
}

pub struct SignatureVerifyingReader<R: Read> {
    inner: R,
    public_key: PublicKey,
    state: State,
    signature: Vec<u8>,
    hasher: Sha256,
}

impl<R: Read> SignatureVerifyingReader<R> {
    pub fn new(inner: R, public_key: PublicKey) -> Self {
        SignatureVerifyingReader {
            inner,
            public_key,
            state: State::Header,
            signature: Vec::new(),
            hasher: Sha256::new(),
        }
    }

    fn parse_header(&mut self) -> io::Result<()> {
        let mut len_prefix = [0u8; LENGTH_PREFIX_LEN];
        self.inner.read_exact(&mut len_prefix).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                header_err(ArepoError::SignatureHeaderTooShort)
            } else {
                e
            }
        })?;
        let b64_len = decode_length_prefix(&len_prefix).map_err(header_err)? as usize;

        let max = self.public_key.max_b64_signature_len();
        if b64_len > max {
            return Err(header_err(ArepoError::SignatureTooLong { max, actual: b64_len }));
        }

        let mut space = [0u8; 1];
        self.inner
            .read_exact(&mut space)
            .map_err(|_| header_err(ArepoError::SignatureHeaderTooShort))?;
        if space[0] != b' ' {
            return Err(header_err(ArepoError::SignatureHeaderBadBase64(
                "expected a single space after the length prefix".into(),
            )));
        }

        let mut sig_b64 = vec![0u8; b64_len];
        self.inner
            .read_exact(&mut sig_b64)
            .map_err(|_| header_err(ArepoError::SignatureHeaderTooShort))?;
        let signature = URL_SAFE
            .decode(&sig_b64)
            .map_err(|e| header_err(ArepoError::SignatureHeaderBadBase64(e.to_string())))?;

        let mut lf = [0u8; 1];
        self.inner
            .read_exact(&mut lf)
            .map_err(|_| header_err(ArepoError::SignatureHeaderMissingLf))?;
        if lf[0] != b'\n' {
            return Err(header_err(ArepoError::SignatureHeaderMissingLf));
        }

        self.signature = signature;
        self.state = State::Body;
        Ok(())
    }

    /// `skip`/`mark` are disallowed on a verifying stream: either would
    /// let a caller read past bytes without feeding them to the digest,
    /// defeating verification.
    pub fn skip(&mut self, _n: u64) -> io::Result<u64> {
        Err(header_err(ArepoError::StreamUnsupportedOperation("skip")))
    }

    pub fn mark(&mut self, _read_limit: usize) -> io::Result<()> {
        Err(header_err(ArepoError::StreamUnsupportedOperation("mark")))
    }

    /// Finalizes the running digest and checks it against the header's
    /// signature. Must be called only after the caller has finished
    /// consuming the stream (or, for an empty payload, at any point —
    /// the header is parsed lazily here if no `read()` call happened).
    pub fn verify(mut self) -> io::Result<bool> {
        if self.state == State::Header {
            self.parse_header()?;
        }
        let digest: [u8; 32] = self.hasher.finalize().into();
        Ok(self.public_key.verify_digest(&digest, &self.signature))
    }
}

impl<R: Read> Read for SignatureVerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state == State::Header {
            self.parse_header()?;
        }
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::prepend_header;
    use crate::key::PrivateKey;
    use rand::rngs::OsRng;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;
    use std::io::Cursor;

    fn test_key() -> PrivateKey {
        let rsa = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = rsa.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        PrivateKey::from_pkcs8_bytes(pem.as_bytes()).unwrap()
    }

    #[test]
    fn verifies_a_well_formed_artifact() {
        let key = test_key();
        let payload = b"the quick brown fox jumps over the lazy dog";
        let digest: [u8; 32] = Sha256::digest(payload).into();
        let signature = key.sign_digest(&digest).unwrap();
        let artifact = prepend_header(payload, &signature);

        let mut reader = SignatureVerifyingReader::new(Cursor::new(artifact), key.derive_public_key());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
        assert!(reader.verify().unwrap());
    }

    #[test]
    fn detects_tampered_payload() {
        let key = test_key();
        let payload = b"original payload";
        let digest: [u8; 32] = Sha256::digest(payload).into();
        let signature = key.sign_digest(&digest).unwrap();
        let mut artifact = prepend_header(payload, &signature);
        *artifact.last_mut().unwrap() ^= 0xFF;

        let mut reader = SignatureVerifyingReader::new(Cursor::new(artifact), key.derive_public_key());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(!reader.verify().unwrap());
    }

    #[test]
    fn missing_lf_is_an_io_error() {
        let key = test_key();
        let mut header = crate::header::encode_header(b"not-a-real-signature");
        header.push(b'x'); // no LF
        let mut reader = SignatureVerifyingReader::new(Cursor::new(header), key.derive_public_key());
        let mut buf = [0u8; 16];
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let key = test_key();
        let huge = crate::header::encode_length_prefix(u32::MAX);
        let mut bytes = huge.to_vec();
        bytes.push(b' ');
        let mut reader = SignatureVerifyingReader::new(Cursor::new(bytes), key.derive_public_key());
        let mut buf = [0u8; 16];
        assert!(reader.read(&mut buf).is_err());
    }
}
