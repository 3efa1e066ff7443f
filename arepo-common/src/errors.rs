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

// Error taxonomy shared by every `arepo-*` crate.
//
// Modelled after the teacher's hand-rolled `PackError`: one variant per
// failure mode, a manual `Display`, and `From` impls for every upstream
// error type a caller might bubble up with `?`. `category()` is the part
// that doesn't come from the teacher: it maps each variant onto the
// business-level classes from the error handling design (EditFailed,
// MoreRecentVersionInRepo, ...) so the CLI can print and exit consistently.

use core::fmt;
use std::io;
use std::sync::Arc;
use std::sync::mpsc::{RecvError, SendError};

/// Business-level classification used for operator-facing messaging and
/// exit-code mapping. Several [`ArepoError`] variants share a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    EditFailed,
    MoreRecentVersionInRepo,
    InsertFailed,
    ApkSigningCertMismatch,
    RepoSigningKeyMismatch,
    GroupDoesntExist,
    InvalidRepoState,
    AppDetailParseFailed,
    Other,
}

#[derive(Debug, Clone)]
pub enum ArepoError {
    /// Generic file I/O failure; the path involved should already be in
    /// the message of whatever wraps this.
    Io(Arc<io::Error>),
    /// `arepo-cli` encountered a user-facing argument mistake.
    Cli(String),

    // -- package / version naming --------------------------------------
    InvalidPackageName(String),
    InvalidVersionCode(String),
    InvalidGroupTag(String),
    InvalidTimestamp(String),
    InvalidBase64(String),
    InvalidHex(String),

    // -- signing (C1) -----------------------------------------------------
    UnsupportedKeyAlgorithm,
    PrivateKeyParseFailed(String),
    SignatureTooLong { max: usize, actual: usize },
    SignatureHeaderTooShort,
    SignatureHeaderMissingLf,
    SignatureHeaderBadBase64(String),
    SignatureVerificationFailed(String),
    StreamUnsupportedOperation(&'static str),
    RepoSigningKeyMismatch,

    // -- APK inspection (C2) ----------------------------------------------
    ZipParseFailed(String),
    ApkMissingManifestField(&'static str),
    ApkAmbiguousInteger(String),
    ApkSignatureParseFailed(String),
    ApkManifestParseFailed(String),
    AppDetailParseFailed(String),

    // -- layout (C3) --------------------------------------------------------
    InvalidFilesystemName(String),

    // -- catalog (C4) -------------------------------------------------------
    CatalogReentrant,
    Catalog(String),
    MoreRecentVersionInRepo { package: String, existing: u64, attempted: u64 },
    ApkSigningCertMismatch { package: String },
    GroupDoesntExist(String),

    // -- delta generator (C5) ------------------------------------------------
    DeltaGenerationFailed { package: String, base: u64, target: u64, reason: String },

    // -- insertion pipeline (C6) ----------------------------------------------
    InsertFailed(String),

    // -- static file generator (C7) --------------------------------------------
    RenderFailed(String),

    // -- validator (C8) -------------------------------------------------------
    InvalidRepoState(String),

    // -- edit --------------------------------------------------------------
    EditFailed(String),
}

pub type Result<T> = std::result::Result<T, ArepoError>;

impl ArepoError {
    pub fn category(&self) -> ErrorCategory {
        use ArepoError::*;
        match self {
            EditFailed(_) => ErrorCategory::EditFailed,
            MoreRecentVersionInRepo { .. } => ErrorCategory::MoreRecentVersionInRepo,
            InsertFailed(_)
            | DeltaGenerationFailed { .. }
            | ZipParseFailed(_)
            | Io(_) => ErrorCategory::InsertFailed,
            ApkSigningCertMismatch { .. } => ErrorCategory::ApkSigningCertMismatch,
            RepoSigningKeyMismatch => ErrorCategory::RepoSigningKeyMismatch,
            GroupDoesntExist(_) => ErrorCategory::GroupDoesntExist,
            InvalidRepoState(_) | SignatureVerificationFailed(_) => ErrorCategory::InvalidRepoState,
            AppDetailParseFailed(_) | ApkMissingManifestField(_) | ApkAmbiguousInteger(_) => {
                ErrorCategory::AppDetailParseFailed
            }
            _ => ErrorCategory::Other,
        }
    }
}

impl fmt::Display for ArepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ArepoError::*;
        match self {
            Io(e) => write!(f, "I/O error: {e}"),
            Cli(msg) => write!(f, "{msg}"),
            InvalidPackageName(name) => write!(f, "'{name}' is not a valid package name"),
            InvalidVersionCode(s) => write!(f, "'{s}' is not a valid version code"),
            InvalidGroupTag(s) => write!(f, "'{s}' is not a valid group tag"),
            InvalidTimestamp(s) => write!(f, "'{s}' is not a valid timestamp"),
            InvalidBase64(s) => write!(f, "invalid base64: {s}"),
            InvalidHex(s) => write!(f, "invalid hex string: {s}"),
            UnsupportedKeyAlgorithm => write!(f, "unsupported private key algorithm (expected RSA or EC)"),
            PrivateKeyParseFailed(msg) => write!(f, "failed to parse private key: {msg}"),
            SignatureTooLong { max, actual } => {
                write!(f, "signature length {actual} exceeds maximum {max} for this key")
            }
            SignatureHeaderTooShort => write!(f, "signature header is shorter than the fixed 8-byte length prefix"),
            SignatureHeaderMissingLf => write!(f, "signed artifact is missing its header-terminating line feed"),
            SignatureHeaderBadBase64(msg) => write!(f, "signature header base64 is corrupt: {msg}"),
            SignatureVerificationFailed(what) => write!(f, "signature verification failed for {what}"),
            StreamUnsupportedOperation(op) => write!(f, "{op} is not supported on a signature-verifying stream"),
            RepoSigningKeyMismatch => write!(f, "private key does not correspond to the repository's stored public key"),
            ZipParseFailed(msg) => write!(f, "failed to parse APK as a zip archive: {msg}"),
            ApkMissingManifestField(field) => write!(f, "APK manifest is missing required field '{field}'"),
            ApkAmbiguousInteger(field) => write!(f, "APK manifest field '{field}' did not parse as an unsigned integer"),
            ApkSignatureParseFailed(msg) => write!(f, "failed to parse APK signing certificates: {msg}"),
            ApkManifestParseFailed(msg) => write!(f, "failed to parse APK manifest: {msg}"),
            AppDetailParseFailed(msg) => write!(f, "failed to extract app details from APK: {msg}"),
            InvalidFilesystemName(name) => write!(f, "'{name}' is not a safe filesystem name"),
            CatalogReentrant => write!(f, "re-entrant catalog call from the writer thread itself"),
            Catalog(msg) => write!(f, "catalog error: {msg}"),
            MoreRecentVersionInRepo { package, existing, attempted } => write!(
                f,
                "package '{package}' already has version {existing} in the repo, cannot insert version {attempted}"
            ),
            ApkSigningCertMismatch { package } => {
                write!(f, "signing certificate mismatch for package '{package}'")
            }
            GroupDoesntExist(tag) => write!(f, "group '{tag}' does not exist"),
            DeltaGenerationFailed { package, base, target, reason } => write!(
                f,
                "failed to generate delta {base}->{target} for package '{package}': {reason}"
            ),
            InsertFailed(msg) => write!(f, "insertion failed: {msg}"),
            RenderFailed(msg) => write!(f, "static file generation failed: {msg}"),
            InvalidRepoState(msg) => write!(f, "repository validation failed: {msg}"),
            EditFailed(msg) => write!(f, "edit failed: {msg}"),
        }
    }
}

impl std::error::Error for ArepoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArepoError::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for ArepoError {
    fn from(value: io::Error) -> Self {
        ArepoError::Io(Arc::new(value))
    }
}

impl From<rusqlite::Error> for ArepoError {
    fn from(value: rusqlite::Error) -> Self {
        ArepoError::Catalog(value.to_string())
    }
}

impl<T> From<SendError<T>> for ArepoError {
    fn from(_: SendError<T>) -> Self {
        ArepoError::Catalog("catalog writer thread has shut down".into())
    }
}

impl From<RecvError> for ArepoError {
    fn from(_: RecvError) -> Self {
        ArepoError::Catalog("catalog writer thread dropped its reply channel".into())
    }
}

impl From<base64::DecodeError> for ArepoError {
    fn from(value: base64::DecodeError) -> Self {
        ArepoError::InvalidBase64(value.to_string())
    }
}

impl From<rsa::Error> for ArepoError {
    fn from(value: rsa::Error) -> Self {
        ArepoError::PrivateKeyParseFailed(value.to_string())
    }
}

impl From<serde_json::Error> for ArepoError {
    fn from(value: serde_json::Error) -> Self {
        ArepoError::RenderFailed(format!("JSON error: {value}"))
    }
}
