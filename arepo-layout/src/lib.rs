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

//! Layout manager (C3): owns the repository directory tree and is the
//! only place permitted to synthesize these paths.
//!
//! ```text
//! <root>/apps/<package>/<versionCode>.apk
//! <root>/apps/<package>/<versionCode>.apk.idsig        (optional)
//! <root>/apps/<package>/delta-<base>-to-<target>.gz
//! <root>/apps/<package>/latest.txt
//! <root>/apps/<package>/icon.png                       (optional)
//! <root>/apps/latest-index.txt
//! <root>/apps/latest-bulk-metadata.txt
//! <root>/public-signing-key.pem
//! <root>/database.sqlite
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use arepo_common::types::validate_filesystem_segment;
use arepo_common::{ArepoError, PackageName, Result, VersionCode};
use regex::Regex;

fn delta_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^delta-(\d+)-to-(\d+)\.gz$").unwrap())
}

fn apk_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.apk$").unwrap())
}

#[derive(Debug, Clone)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        RepoLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.root.join("apps")
    }

    pub fn app_dir(&self, package: &PackageName) -> PathBuf {
        self.apps_dir().join(package.as_str())
    }

    pub fn apk_path(&self, package: &PackageName, version: VersionCode) -> PathBuf {
        self.app_dir(package).join(format!("{version}.apk"))
    }

    pub fn idsig_path(&self, package: &PackageName, version: VersionCode) -> PathBuf {
        let mut p = self.apk_path(package, version).into_os_string();
        p.push(".idsig");
        PathBuf::from(p)
    }

    pub fn delta_path(&self, package: &PackageName, base: VersionCode, target: VersionCode) -> PathBuf {
        self.app_dir(package)
            .join(format!("delta-{base}-to-{target}.gz"))
    }

    pub fn latest_txt_path(&self, package: &PackageName) -> PathBuf {
        self.app_dir(package).join("latest.txt")
    }

    pub fn icon_path(&self, package: &PackageName) -> PathBuf {
        self.app_dir(package).join("icon.png")
    }

    pub fn index_path(&self) -> PathBuf {
        self.apps_dir().join("latest-index.txt")
    }

    pub fn bulk_metadata_path(&self) -> PathBuf {
        self.apps_dir().join("latest-bulk-metadata.txt")
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.root.join("public-signing-key.pem")
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("database.sqlite")
    }

    /// Parses a `<vcode>.apk` filename, rejecting anything that merely
    /// looks like one (stray extensions, leading zeros with junk, etc.)
    pub fn parse_apk_filename(name: &str) -> Option<VersionCode> {
        let caps = apk_filename_re().captures(name)?;
        caps[1].parse::<u64>().ok().map(VersionCode)
    }

    /// Parses a `delta-<base>-to-<target>.gz` filename. Filenames that
    /// merely resemble this pattern (wrong extension, non-numeric
    /// versions) are not deltas and yield `None` rather than an error,
    /// so stray files cannot masquerade as deltas but also don't abort
    /// a directory walk.
    pub fn parse_delta_filename(name: &str) -> Option<(VersionCode, VersionCode)> {
        let caps = delta_filename_re().captures(name)?;
        let base = caps[1].parse::<u64>().ok()?;
        let target = caps[2].parse::<u64>().ok()?;
        Some((VersionCode(base), VersionCode(target)))
    }
}

/// Validates a package name against both the Android package grammar
/// (enforced by [`PackageName::parse`]) and the ext4 filename rules.
pub fn validate_package_name(name: &str) -> Result<PackageName> {
    PackageName::parse(name)
}

/// Validates a short, printable group tag as a safe single path segment.
pub fn validate_group_tag(tag: &str) -> Result<String> {
    if tag.chars().any(|c| c.is_control()) {
        return Err(ArepoError::InvalidGroupTag(tag.to_string()));
    }
    validate_filesystem_segment(tag).map_err(|_| ArepoError::InvalidGroupTag(tag.to_string()))?;
    Ok(tag.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_documented_layout() {
        let layout = RepoLayout::new("/srv/repo");
        let pkg = PackageName::parse("com.example.app").unwrap();
        assert_eq!(
            layout.apk_path(&pkg, VersionCode(24)),
            PathBuf::from("/srv/repo/apps/com.example.app/24.apk")
        );
        assert_eq!(
            layout.idsig_path(&pkg, VersionCode(24)),
            PathBuf::from("/srv/repo/apps/com.example.app/24.apk.idsig")
        );
        assert_eq!(
            layout.delta_path(&pkg, VersionCode(24), VersionCode(27)),
            PathBuf::from("/srv/repo/apps/com.example.app/delta-24-to-27.gz")
        );
        assert_eq!(
            layout.index_path(),
            PathBuf::from("/srv/repo/apps/latest-index.txt")
        );
    }

    #[test]
    fn delta_filename_parsing_rejects_look_alikes() {
        assert_eq!(
            RepoLayout::parse_delta_filename("delta-24-to-27.gz"),
            Some((VersionCode(24), VersionCode(27)))
        );
        assert_eq!(RepoLayout::parse_delta_filename("delta-24-to-27.gz.bak"), None);
        assert_eq!(RepoLayout::parse_delta_filename("delta-abc-to-27.gz"), None);
        assert_eq!(RepoLayout::parse_delta_filename("not-a-delta.gz"), None);
    }

    #[test]
    fn apk_filename_parsing() {
        assert_eq!(RepoLayout::parse_apk_filename("27.apk"), Some(VersionCode(27)));
        assert_eq!(RepoLayout::parse_apk_filename("27.apk.idsig"), None);
        assert_eq!(RepoLayout::parse_apk_filename("latest.apk"), None);
    }

    #[test]
    fn group_tag_rejects_path_traversal() {
        assert!(validate_group_tag("chromium").is_ok());
        assert!(validate_group_tag("..").is_err());
        assert!(validate_group_tag("a/b").is_err());
    }
}
