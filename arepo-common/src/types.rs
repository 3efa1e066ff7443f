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

// Newtypes for the value types that flow through the catalog, the JSON
// metadata, and the on-disk layout. Each has exactly one canonical
// internal form and a validating constructor, and round-trips through
// rusqlite directly so no separate codec layer is needed.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::errors::ArepoError;

fn package_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)+$").unwrap()
    })
}

/// Reverse-DNS package identifier, also required to be a single safe
/// filesystem path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    pub fn parse(s: &str) -> Result<Self, ArepoError> {
        if !package_name_re().is_match(s) {
            return Err(ArepoError::InvalidPackageName(s.to_string()));
        }
        validate_filesystem_segment(s)?;
        Ok(PackageName(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Shared by [`PackageName`] and group tags: no path separators, no NUL,
/// at most 255 UTF-8 bytes, and never `.` or `..`.
pub fn validate_filesystem_segment(s: &str) -> Result<(), ArepoError> {
    if s.is_empty() || s.len() > 255 || s.contains('/') || s.contains('\0') || s == "." || s == ".." {
        return Err(ArepoError::InvalidFilesystemName(s.to_string()));
    }
    Ok(())
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PackageName {
    type Err = ArepoError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageName {
    type Error = ArepoError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PackageName> for String {
    fn from(value: PackageName) -> Self {
        value.0
    }
}

impl ToSql for PackageName {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.clone()))
    }
}

impl FromSql for PackageName {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        PackageName::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Non-negative, monotonic-within-a-package release identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionCode(pub u64);

impl VersionCode {
    pub fn parse(s: &str) -> Result<Self, ArepoError> {
        s.parse::<u64>()
            .map(VersionCode)
            .map_err(|_| ArepoError::InvalidVersionCode(s.to_string()))
    }
}

impl fmt::Display for VersionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for VersionCode {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0 as i64))
    }
}

impl FromSql for VersionCode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(|v| VersionCode(v as u64))
    }
}

/// Seconds since the Unix epoch. Clocks never go backwards within the
/// RepoIndex: callers use [`UnixTimestamp::at_least`] to enforce that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    pub fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        UnixTimestamp(secs)
    }

    /// Returns a timestamp that is never ≤ `previous`: either the wall
    /// clock if it has advanced, or `previous + 1` otherwise.
    pub fn at_least(previous: UnixTimestamp) -> Self {
        let wall = Self::now();
        if wall.0 > previous.0 {
            wall
        } else {
            UnixTimestamp(previous.0 + 1)
        }
    }
}

impl ToSql for UnixTimestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0 as i64))
    }
}

impl FromSql for UnixTimestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(|v| UnixTimestamp(v as u64))
    }
}

/// URL-safe base64 with padding, used for digests and signatures in
/// textual metadata. Stored in its encoded form; decode on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Base64String(String);

impl Base64String {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Base64String(URL_SAFE.encode(bytes))
    }

    pub fn parse(s: &str) -> Result<Self, ArepoError> {
        URL_SAFE.decode(s).map_err(|e| ArepoError::InvalidBase64(e.to_string()))?;
        Ok(Base64String(s.to_string()))
    }

    pub fn decode(&self) -> Vec<u8> {
        URL_SAFE
            .decode(&self.0)
            .expect("Base64String invariant: only ever constructed from valid base64")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Base64String {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for Base64String {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.clone()))
    }
}

impl FromSql for Base64String {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Base64String::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Lowercase hex string, used for certificate/idsig fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexString(String);

impl HexString {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        HexString(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn parse(s: &str) -> Result<Self, ArepoError> {
        let s = s.trim().to_lowercase();
        if s.is_empty() || s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ArepoError::InvalidHex(s));
        }
        Ok(HexString(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HexString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for HexString {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.clone()))
    }
}

impl FromSql for HexString {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        HexString::parse(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_requires_two_segments() {
        assert!(PackageName::parse("com.example.app").is_ok());
        assert!(PackageName::parse("example").is_err());
        assert!(PackageName::parse("com.1example.app").is_err());
    }

    #[test]
    fn package_name_rejects_path_traversal() {
        assert!(PackageName::parse("..").is_err());
        assert!(PackageName::parse("com.example/app").is_err());
    }

    #[test]
    fn timestamp_clock_never_goes_backwards() {
        let prev = UnixTimestamp(u64::MAX - 1);
        let next = UnixTimestamp::at_least(prev);
        assert!(next.0 > prev.0);
    }

    #[test]
    fn base64_round_trips() {
        let original = b"hello signature bytes";
        let encoded = Base64String::from_bytes(original);
        assert_eq!(encoded.decode(), original);
    }

    #[test]
    fn hex_string_normalizes_case() {
        let hex = HexString::parse("DEADBEEF").unwrap();
        assert_eq!(hex.as_str(), "deadbeef");
    }
}
