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

// Validator (C8). Walks the on-disk repository and the catalog side by
// side and reports every discrepancy instead of stopping at the first
// one, since an operator running this after a bulk edit wants the full
// list in one pass.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use arepo_catalog::Catalog;
use arepo_common::{Base64String, PackageName, Result, VersionCode};
use arepo_delta::{DeltaCodec, QbsdiffGzCodec};
use arepo_layout::RepoLayout;
use arepo_sign::{PublicKey, SignatureVerifyingReader};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub package: Option<String>,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, package: Option<&str>, message: impl Into<String>) {
        self.issues.push(ValidationIssue { package: package.map(str::to_string), message: message.into() });
    }
}

/// Runs every check from the validator's spec against `layout`/`catalog`,
/// using `codec` to replay deltas. Never itself returns `Err` for a
/// discrepancy — those accumulate in the returned report; `Err` is
/// reserved for failures that make validation itself impossible (an
/// unreadable catalog, a missing public key).
pub fn validate(layout: &RepoLayout, catalog: &Catalog) -> Result<ValidationReport> {
    validate_with_codec(layout, catalog, &QbsdiffGzCodec)
}

pub fn validate_with_codec(layout: &RepoLayout, catalog: &Catalog, codec: &dyn DeltaCodec) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    let public_key = match load_public_key(layout) {
        Ok(k) => k,
        Err(e) => {
            report.push(None, format!("cannot load repository public key: {e}"));
            return Ok(report);
        }
    };

    let apps = catalog.list_apps()?;
    let mut all_json_lines = Vec::with_capacity(apps.len());

    for app in &apps {
        let releases = catalog.releases(&app.package_name)?;
        let json_line = validate_one_app(layout, &public_key, app, &releases, codec, &mut report)?;
        if let Some(line) = json_line {
            all_json_lines.push(line);
        }
    }

    validate_aggregate(layout, &public_key, &apps, &all_json_lines, &mut report)?;

    Ok(report)
}

fn load_public_key(layout: &RepoLayout) -> Result<PublicKey> {
    let pem = std::fs::read_to_string(layout.public_key_path())?;
    PublicKey::from_pem(&pem)
}

fn read_signed_file(path: &Path, public_key: &PublicKey) -> Result<(String, bool)> {
    let file = File::open(path)?;
    let mut reader = SignatureVerifyingReader::new(file, public_key.clone());
    let mut body = String::new();
    reader.read_to_string(&mut body).map_err(arepo_common::ArepoError::from)?;
    let verified = reader.verify().map_err(arepo_common::ArepoError::from)?;
    Ok((body, verified))
}

fn sha256_of_file(path: &Path) -> Result<Base64String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Base64String::from_bytes(&hasher.finalize()))
}

fn highest_apk_on_disk(layout: &RepoLayout, package: &PackageName) -> Result<Option<VersionCode>> {
    let dir = layout.app_dir(package);
    if !dir.is_dir() {
        return Ok(None);
    }
    let mut highest = None;
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if let Some(version) = RepoLayout::parse_apk_filename(name) {
                highest = Some(highest.map_or(version, |h: VersionCode| h.max(version)));
            }
        }
    }
    Ok(highest)
}

fn validate_one_app(
    layout: &RepoLayout,
    public_key: &PublicKey,
    app: &arepo_catalog::App,
    releases: &[arepo_catalog::AppRelease],
    codec: &dyn DeltaCodec,
    report: &mut ValidationReport,
) -> Result<Option<String>> {
    let package = app.package_name.as_str();

    let latest_txt = layout.latest_txt_path(&app.package_name);
    if !latest_txt.is_file() {
        report.push(Some(package), "latest.txt is missing");
        return Ok(None);
    }

    let (body, verified) = read_signed_file(&latest_txt, public_key)?;
    if !verified {
        report.push(Some(package), "latest.txt signature does not verify");
    }

    let metadata: crate::metadata::ReleaseMetadata = match serde_json::from_str(&body) {
        Ok(m) => m,
        Err(e) => {
            report.push(Some(package), format!("latest.txt does not parse as JSON: {e}"));
            return Ok(None);
        }
    };

    match highest_apk_on_disk(layout, &app.package_name)? {
        Some(highest) if highest.0 == metadata.latest_version_code => {}
        Some(highest) => report.push(
            Some(package),
            format!(
                "latest.txt claims version {} but the highest on-disk APK is {highest}",
                metadata.latest_version_code
            ),
        ),
        None => report.push(Some(package), "no APK files found on disk for this package"),
    }

    let apk_path = layout.apk_path(&app.package_name, VersionCode(metadata.latest_version_code));
    if apk_path.is_file() {
        match sha256_of_file(&apk_path) {
            Ok(actual) if actual.as_str() == metadata.sha256_checksum => {}
            Ok(actual) => report.push(
                Some(package),
                format!("latest.txt sha256 '{}' does not match computed '{}'", metadata.sha256_checksum, actual),
            ),
            Err(e) => report.push(Some(package), format!("failed to hash {}: {e}", apk_path.display())),
        }
    } else {
        report.push(Some(package), format!("APK file for version {} is missing", metadata.latest_version_code));
    }

    validate_deltas(layout, &app.package_name, VersionCode(metadata.latest_version_code), codec, report)?;

    let mut prior: Vec<&HashSet<_>> = Vec::new();
    for release in releases {
        if prior.iter().any(|fps| fps.is_disjoint(&release.signing_cert_fingerprints)) {
            report.push(
                Some(package),
                format!("release {} has a signing certificate set disjoint from an earlier release", release.version_code),
            );
        }
        prior.push(&release.signing_cert_fingerprints);
    }

    Ok(Some(body))
}

fn validate_deltas(
    layout: &RepoLayout,
    package: &PackageName,
    target: VersionCode,
    codec: &dyn DeltaCodec,
    report: &mut ValidationReport,
) -> Result<()> {
    let dir = layout.app_dir(package);
    if !dir.is_dir() {
        return Ok(());
    }
    let target_path = layout.apk_path(package, target);
    let target_sha256 = if target_path.is_file() { sha256_of_file(&target_path).ok() } else { None };

    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some((base, file_target)) = RepoLayout::parse_delta_filename(name) else { continue };
        if file_target != target {
            continue;
        }

        let base_path = layout.apk_path(package, base);
        let Some(target_sha256) = &target_sha256 else {
            report.push(Some(package.as_str()), format!("delta {base}->{target} exists but target APK is missing"));
            continue;
        };
        if !base_path.is_file() {
            report.push(Some(package.as_str()), format!("delta {base}->{target} has no corresponding base APK"));
            continue;
        }

        let base_bytes = match std::fs::read(&base_path) {
            Ok(b) => b,
            Err(e) => {
                report.push(Some(package.as_str()), format!("failed to read base APK for delta {base}->{target}: {e}"));
                continue;
            }
        };
        let mut delta_file = match File::open(entry.path()) {
            Ok(f) => f,
            Err(e) => {
                report.push(Some(package.as_str()), format!("failed to open delta {base}->{target}: {e}"));
                continue;
            }
        };
        let mut reconstructed = Vec::new();
        if let Err(e) = codec.apply(&base_bytes, &mut delta_file, &mut reconstructed) {
            report.push(Some(package.as_str()), format!("delta {base}->{target} failed to apply: {e}"));
            continue;
        }
        let reconstructed_sha256 = Base64String::from_bytes(&Sha256::digest(&reconstructed));
        if reconstructed_sha256.as_str() != target_sha256.as_str() {
            report.push(
                Some(package.as_str()),
                format!("delta {base}->{target} applied cleanly but produced the wrong target sha256"),
            );
        }
    }
    Ok(())
}

fn validate_aggregate(
    layout: &RepoLayout,
    public_key: &PublicKey,
    apps: &[arepo_catalog::App],
    per_app_json_lines: &[String],
    report: &mut ValidationReport,
) -> Result<()> {
    let bulk_path = layout.bulk_metadata_path();
    if bulk_path.is_file() {
        let (body, verified) = read_signed_file(&bulk_path, public_key)?;
        if !verified {
            report.push(None, "latest-bulk-metadata.txt signature does not verify");
        }
        let mut lines = body.lines();
        let generation_ts = parse_leading_timestamp(lines.next(), "latest-bulk-metadata.txt", report);
        let bulk_lines: HashSet<&str> = lines.filter(|l| !l.is_empty()).collect();
        let expected: HashSet<&str> = per_app_json_lines.iter().map(String::as_str).collect();
        if bulk_lines != expected {
            report.push(None, "latest-bulk-metadata.txt does not equal the union of per-app JSON records");
        }
        check_generation_timestamp(generation_ts, apps, "latest-bulk-metadata.txt", report);
    } else {
        report.push(None, "latest-bulk-metadata.txt is missing");
    }

    let index_path = layout.index_path();
    if index_path.is_file() {
        let (body, verified) = read_signed_file(&index_path, public_key)?;
        if !verified {
            report.push(None, "latest-index.txt signature does not verify");
        }
        let mut lines = body.lines();
        let generation_ts = parse_leading_timestamp(lines.next(), "latest-index.txt", report);
        for line in lines.filter(|l| !l.is_empty()) {
            let mut parts = line.split(' ');
            let (Some(_), Some(_), Some(ts)) = (parts.next(), parts.next(), parts.next()) else {
                report.push(None, format!("malformed latest-index.txt line: '{line}'"));
                continue;
            };
            if ts.parse::<u64>().is_err() {
                report.push(None, format!("non-numeric timestamp in latest-index.txt line: '{line}'"));
            }
        }
        check_generation_timestamp(generation_ts, apps, "latest-index.txt", report);
    } else {
        report.push(None, "latest-index.txt is missing");
    }

    Ok(())
}

fn parse_leading_timestamp(line: Option<&str>, file: &str, report: &mut ValidationReport) -> Option<u64> {
    match line.map(str::parse::<u64>) {
        Some(Ok(ts)) => Some(ts),
        Some(Err(_)) => {
            report.push(None, format!("{file} has a non-numeric leading generation timestamp"));
            None
        }
        None => {
            report.push(None, format!("{file} is missing its leading generation timestamp line"));
            None
        }
    }
}

/// The aggregate's generation timestamp must be at least as recent as
/// every per-app `lastUpdateTimestamp` it rolls up.
fn check_generation_timestamp(
    generation_ts: Option<u64>,
    apps: &[arepo_catalog::App],
    file: &str,
    report: &mut ValidationReport,
) {
    let Some(generation_ts) = generation_ts else { return };
    if let Some(stale) = apps.iter().find(|a| a.last_update_timestamp.0 > generation_ts) {
        report.push(
            Some(stale.package_name.as_str()),
            format!("{file}'s generation timestamp predates this package's last update"),
        );
    }
}
