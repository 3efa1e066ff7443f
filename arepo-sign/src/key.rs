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

// PKCS#8 private key parsing and public key derivation, in the teacher's
// style of `crypto_keys.rs`: a small struct holding the decoded key
// material plus thin free functions for algorithm-specific work. Unlike
// the teacher (which only ever signs with RSA PKCS#1v1.5 over an X.509
// certificate it generates itself), the repository engine has to accept
// whatever PKCS#8 key an operator hands it, so key parsing tries RSA
// first and falls back to EC since the wire format carries no explicit
// algorithm tag ahead of parse.

use std::fmt;
use std::path::Path;

use arepo_common::{ArepoError, Result};
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use ecdsa::Signature as EcdsaSignature;
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p256::pkcs8::{DecodePrivateKey as EcDecodePrivateKey, DecodePublicKey as EcDecodePublicKey};
use p256::SecretKey as P256SecretKey;
use pkcs8::EncodePublicKey;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey as RsaDecodePrivateKey, DecodePublicKey as RsaDecodePublicKey};
use rsa::pss::Pss;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    Ec,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa => write!(f, "RSA"),
            KeyAlgorithm::Ec => write!(f, "EC"),
        }
    }
}

#[derive(Clone)]
enum KeyMaterial {
    Rsa(RsaPrivateKey),
    Ec(P256SecretKey),
}

/// A parsed PKCS#8 private key, ready to sign digests.
#[derive(Clone)]
pub struct PrivateKey {
    material: KeyMaterial,
}

/// A derived or loaded public key, ready to verify signatures.
#[derive(Clone)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ec(p256::PublicKey),
}

impl PrivateKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(ArepoError::PrivateKeyParseFailed(
                "key file is empty".into(),
            ));
        }
        Self::from_pkcs8_bytes(&bytes)
    }

    /// Accepts either PEM or raw DER PKCS#8. Tries RSA first, then EC;
    /// a key that is neither yields [`ArepoError::UnsupportedKeyAlgorithm`].
    pub fn from_pkcs8_bytes(bytes: &[u8]) -> Result<Self> {
        let pem_str = std::str::from_utf8(bytes).ok();

        if let Some(pem) = pem_str.filter(|s| s.contains("PRIVATE KEY")) {
            if let Ok(rsa) = RsaPrivateKey::from_pkcs8_pem(pem) {
                return Ok(PrivateKey { material: KeyMaterial::Rsa(rsa) });
            }
            if let Ok(ec) = P256SecretKey::from_pkcs8_pem(pem) {
                return Ok(PrivateKey { material: KeyMaterial::Ec(ec) });
            }
            return Err(ArepoError::UnsupportedKeyAlgorithm);
        }

        if let Ok(rsa) = RsaPrivateKey::from_pkcs8_der(bytes) {
            return Ok(PrivateKey { material: KeyMaterial::Rsa(rsa) });
        }
        if let Ok(ec) = P256SecretKey::from_pkcs8_der(bytes) {
            return Ok(PrivateKey { material: KeyMaterial::Ec(ec) });
        }
        Err(ArepoError::UnsupportedKeyAlgorithm)
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self.material {
            KeyMaterial::Rsa(_) => KeyAlgorithm::Rsa,
            KeyMaterial::Ec(_) => KeyAlgorithm::Ec,
        }
    }

    pub fn derive_public_key(&self) -> PublicKey {
        match &self.material {
            KeyMaterial::Rsa(k) => PublicKey::Rsa(k.to_public_key()),
            KeyMaterial::Ec(k) => PublicKey::Ec(k.public_key()),
        }
    }

    /// Signs a SHA-256 digest. RSA uses PSS/MGF1-SHA-256 with salt length
    /// equal to the digest length; EC uses ECDSA with a DER-encoded (r, s).
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>> {
        match &self.material {
            KeyMaterial::Rsa(k) => {
                let padding = Pss::new::<Sha256>();
                Ok(k.sign_with_rng(&mut OsRng, padding, digest)?)
            }
            KeyMaterial::Ec(k) => {
                let signing_key = P256SigningKey::from(k);
                let sig: EcdsaSignature<p256::NistP256> = signing_key
                    .sign_prehash(digest)
                    .map_err(|e| ArepoError::PrivateKeyParseFailed(e.to_string()))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
        }
    }
}

impl PublicKey {
    pub fn from_pem(pem: &str) -> Result<Self> {
        if let Ok(k) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(PublicKey::Rsa(k));
        }
        if let Ok(k) = p256::PublicKey::from_public_key_pem(pem) {
            return Ok(PublicKey::Ec(k));
        }
        Err(ArepoError::UnsupportedKeyAlgorithm)
    }

    pub fn to_pem(&self) -> Result<String> {
        let pem = match self {
            PublicKey::Rsa(k) => k
                .to_public_key_pem(pkcs8::LineEnding::LF)
                .map_err(|e| ArepoError::PrivateKeyParseFailed(e.to_string()))?,
            PublicKey::Ec(k) => k
                .to_public_key_pem(pkcs8::LineEnding::LF)
                .map_err(|e| ArepoError::PrivateKeyParseFailed(e.to_string()))?,
        };
        Ok(pem)
    }

    pub fn verify_digest(&self, digest: &[u8; 32], signature: &[u8]) -> bool {
        match self {
            PublicKey::Rsa(k) => {
                let padding = Pss::new::<Sha256>();
                k.verify(padding, digest, signature).is_ok()
            }
            PublicKey::Ec(k) => {
                let Ok(sig) = EcdsaSignature::<p256::NistP256>::from_der(signature) else {
                    return false;
                };
                let verifying_key = P256VerifyingKey::from(k);
                verifying_key.verify_prehash(digest, &sig).is_ok()
            }
        }
    }

    /// Upper bound on the raw signature byte length for this key, used
    /// to bound the header parser's read of the base64-encoded signature.
    pub fn max_signature_len(&self) -> usize {
        match self {
            PublicKey::Rsa(k) => k.size(),
            // DER SEQUENCE { INTEGER r, INTEGER s } over a 32-byte field:
            // 2 (header) + 2 * (2 (tag+len) + 1 (possible leading zero) + 32)
            PublicKey::Ec(_) => 2 + 2 * (2 + 1 + 32),
        }
    }

    /// Upper bound on the base64-encoded signature length, the quantity
    /// the header's length prefix actually carries.
    pub fn max_b64_signature_len(&self) -> usize {
        self.max_signature_len().div_ceil(3) * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::EncodePrivateKey;
    use rsa::pkcs8::EncodePrivateKey as _;

    fn rsa_test_key() -> PrivateKey {
        let rsa = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = rsa.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();
        PrivateKey::from_pkcs8_bytes(pem.as_bytes()).unwrap()
    }

    fn ec_test_key() -> PrivateKey {
        let ec = P256SecretKey::random(&mut OsRng);
        let pem = ec.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();
        PrivateKey::from_pkcs8_bytes(pem.as_bytes()).unwrap()
    }

    #[test]
    fn rsa_round_trip_sign_verify() {
        let key = rsa_test_key();
        assert_eq!(key.algorithm(), KeyAlgorithm::Rsa);
        let digest = [7u8; 32];
        let sig = key.sign_digest(&digest).unwrap();
        let public = key.derive_public_key();
        assert!(public.verify_digest(&digest, &sig));
    }

    #[test]
    fn ec_round_trip_sign_verify() {
        let key = ec_test_key();
        assert_eq!(key.algorithm(), KeyAlgorithm::Ec);
        let digest = [9u8; 32];
        let sig = key.sign_digest(&digest).unwrap();
        let public = key.derive_public_key();
        assert!(public.verify_digest(&digest, &sig));
    }

    #[test]
    fn public_key_pem_round_trips() {
        let key = rsa_test_key();
        let public = key.derive_public_key();
        let pem = public.to_pem().unwrap();
        let reloaded = PublicKey::from_pem(&pem).unwrap();
        let digest = [1u8; 32];
        let sig = key.sign_digest(&digest).unwrap();
        assert!(reloaded.verify_digest(&digest, &sig));
    }

    #[test]
    fn empty_key_file_is_rejected() {
        assert!(PrivateKey::from_pkcs8_bytes(&[]).is_err());
    }
}
