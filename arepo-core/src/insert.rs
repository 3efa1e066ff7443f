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

// Insertion pipeline (C6): `insertApks(apkPaths, key, promptNotes)`.
//
// Runs C2 over every APK in parallel, groups the results by package,
// checks monotonicity and signing-cert continuity against the catalog,
// then commits one SQL transaction per package that copies files,
// writes the release rows, and runs that package's delta jobs — a
// failed delta aborts the whole transaction via the catalog's
// deferred-compensation rollback, so no partially-copied APK survives.

use std::collections::{BTreeMap, HashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arepo_apk::{ApkDetails, ApkInspector};
use arepo_catalog::{
    delete_deltas_for_target, insert_app_release, list_version_codes, record_delta, AppRelease, Catalog, Delta,
};
use arepo_common::{ArepoError, Base64String, HexString, PackageName, Result, UnixTimestamp};
use arepo_delta::{select_bases, DeltaJob, DeltaPool, DEFAULT_MAX_BASES};
use arepo_layout::RepoLayout;
use arepo_sign::PrivateKey;
use sha2::{Digest, Sha256};

const RELEASE_NOTES_TERMINATOR: &str = ".";

pub struct InsertOutcome {
    pub package: PackageName,
    pub result: Result<()>,
}

pub struct InsertReport {
    pub outcomes: Vec<InsertOutcome>,
}

impl InsertReport {
    pub fn any_failed(&self) -> bool {
        self.outcomes.iter().any(|o| o.result.is_err())
    }
}

pub fn insert_apks(
    layout: &RepoLayout,
    catalog: &Catalog,
    inspector: &ApkInspector,
    delta_pool: &Arc<DeltaPool>,
    key: &PrivateKey,
    apk_paths: &[PathBuf],
    skip_notes: bool,
) -> Result<InsertReport> {
    ensure_repo_signing_key(layout, key)?;

    let inspected = inspect_all(inspector, apk_paths)?;

    let mut by_package: BTreeMap<PackageName, Vec<(PathBuf, ApkDetails)>> = BTreeMap::new();
    for (path, details) in inspected {
        by_package.entry(details.package_name.clone()).or_default().push((path, details));
    }
    for group in by_package.values_mut() {
        group.sort_by(|a, b| a.1.version_code.cmp(&b.1.version_code));
    }

    let mut outcomes = Vec::with_capacity(by_package.len());
    for (package, releases) in by_package {
        let result = insert_one_package(layout, catalog, delta_pool, &package, releases, skip_notes);
        outcomes.push(InsertOutcome { package, result });
    }

    Ok(InsertReport { outcomes })
}

fn ensure_repo_signing_key(layout: &RepoLayout, key: &PrivateKey) -> Result<()> {
    let path = layout.public_key_path();
    let derived_pem = key.derive_public_key().to_pem()?;
    if path.is_file() {
        let existing = std::fs::read_to_string(&path)?;
        if existing.trim() != derived_pem.trim() {
            return Err(ArepoError::RepoSigningKeyMismatch);
        }
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, derived_pem)?;
    }
    Ok(())
}

fn inspect_all(inspector: &ApkInspector, apk_paths: &[PathBuf]) -> Result<Vec<(PathBuf, ApkDetails)>> {
    let results: Vec<Result<ApkDetails>> = std::thread::scope(|scope| {
        let handles: Vec<_> = apk_paths
            .iter()
            .map(|path| scope.spawn(|| inspector.inspect(path)))
            .collect();
        handles.into_iter().map(|h| h.join().expect("APK inspection thread panicked")).collect()
    });

    let mut ok = Vec::with_capacity(apk_paths.len());
    let mut failures = Vec::new();
    for (path, result) in apk_paths.iter().zip(results) {
        match result {
            Ok(details) => ok.push((path.clone(), details)),
            Err(e) => failures.push(format!("{}: {e}", path.display())),
        }
    }
    if !failures.is_empty() {
        return Err(ArepoError::InsertFailed(failures.join("; ")));
    }
    Ok(ok)
}

fn idsig_sidecar(apk_path: &Path) -> PathBuf {
    let mut name = apk_path.file_name().unwrap_or_default().to_os_string();
    name.push(".idsig");
    apk_path.with_file_name(name)
}

fn prompt_release_notes(package: &PackageName) -> Result<Option<String>> {
    use std::io::{self, Write};
    print!("Release notes for {package} (end with a line containing only '{RELEASE_NOTES_TERMINATOR}'):\n");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut lines = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.map_err(ArepoError::from)?;
        if line.trim_end() == RELEASE_NOTES_TERMINATOR {
            break;
        }
        lines.push(line);
    }
    if lines.is_empty() {
        Ok(None)
    } else {
        Ok(Some(lines.join("\n")))
    }
}

fn check_version_monotonicity(
    catalog: &Catalog,
    package: &PackageName,
    releases: &[(PathBuf, ApkDetails)],
) -> Result<()> {
    if let Some(existing) = catalog.highest_version_code(package)? {
        let attempted = releases[0].1.version_code;
        if attempted <= existing {
            return Err(ArepoError::MoreRecentVersionInRepo {
                package: package.to_string(),
                existing: existing.0,
                attempted: attempted.0,
            });
        }
    }
    for pair in releases.windows(2) {
        if pair[1].1.version_code <= pair[0].1.version_code {
            return Err(ArepoError::MoreRecentVersionInRepo {
                package: package.to_string(),
                existing: pair[0].1.version_code.0,
                attempted: pair[1].1.version_code.0,
            });
        }
    }
    Ok(())
}

/// Every release in a package must share at least one fingerprint with
/// every *other* release in that package, not merely with their union —
/// a running union lets an unrelated chain (A~B, B~C, A!~C) slip through.
fn check_signing_cert_continuity(
    catalog: &Catalog,
    package: &PackageName,
    releases: &[(PathBuf, ApkDetails)],
) -> Result<()> {
    let mut prior: Vec<HashSet<HexString>> =
        catalog.releases(package)?.into_iter().map(|r| r.signing_cert_fingerprints).collect();

    for (_, details) in releases {
        if prior.iter().any(|fps| fps.is_disjoint(&details.signing_cert_fingerprints)) {
            return Err(ArepoError::ApkSigningCertMismatch { package: package.to_string() });
        }
        prior.push(details.signing_cert_fingerprints.clone());
    }
    Ok(())
}

fn insert_one_package(
    layout: &RepoLayout,
    catalog: &Catalog,
    delta_pool: &Arc<DeltaPool>,
    package: &PackageName,
    releases: Vec<(PathBuf, ApkDetails)>,
    skip_notes: bool,
) -> Result<()> {
    check_version_monotonicity(catalog, package, &releases)?;
    check_signing_cert_continuity(catalog, package, &releases)?;

    let release_notes = if skip_notes { None } else { prompt_release_notes(package)? };
    let target = releases.last().expect("grouped package has at least one release").1.version_code;

    let layout = layout.clone();
    let package = package.clone();
    let delta_pool = Arc::clone(delta_pool);

    catalog.with_transaction(move |tx, compensations| {
        for (source_apk, details) in &releases {
            let dest_apk = layout.apk_path(&package, details.version_code);
            if let Some(parent) = dest_apk.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(source_apk, &dest_apk)?;
            compensations.push(dest_apk.clone());

            let source_idsig = idsig_sidecar(source_apk);
            if source_idsig.is_file() {
                let dest_idsig = layout.idsig_path(&package, details.version_code);
                std::fs::copy(&source_idsig, &dest_idsig)?;
                compensations.push(dest_idsig);
            }

            let notes_md = if details.version_code == target { release_notes.clone() } else { None };
            let release = AppRelease {
                package_name: package.clone(),
                version_code: details.version_code,
                version_name: details.version_name.clone(),
                min_sdk_version: details.min_sdk_version.clone(),
                sha256: details.sha256.clone(),
                signing_cert_fingerprints: details.signing_cert_fingerprints.clone(),
                v4_fingerprint: details.v4_fingerprint.clone(),
                release_notes_md: notes_md,
                icon_png: details.icon.clone(),
                inserted_at: UnixTimestamp::now(),
            };
            insert_app_release(tx, &release, details.label.as_deref(), None)?;
        }

        let all_versions = list_version_codes(tx, &package)?;
        let bases = select_bases(&all_versions, target, DEFAULT_MAX_BASES);

        delete_deltas_for_target(tx, &package, target)?;

        let jobs: Vec<DeltaJob> = bases
            .iter()
            .map(|&base| DeltaJob {
                package: package.clone(),
                base_version: base,
                target_version: target,
                base_apk_path: layout.apk_path(&package, base),
                target_apk_path: layout.apk_path(&package, target),
                output_path: layout.delta_path(&package, base, target),
            })
            .collect();

        if !jobs.is_empty() {
            log::debug!("generating {} delta(s) for {package} -> {target}", jobs.len());
            let mut results = delta_pool.run(vec![jobs]);
            results.remove(0)?;
        }

        for base in &bases {
            let delta_path = layout.delta_path(&package, *base, target);
            let (file_size, sha256) = hash_delta_file(&delta_path)?;
            record_delta(
                tx,
                &Delta {
                    package_name: package.clone(),
                    base_version_code: *base,
                    target_version_code: target,
                    file_size,
                    sha256,
                },
            )?;
        }

        Ok(())
    })
}

fn hash_delta_file(path: &Path) -> Result<(u64, Base64String)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut len = 0u64;
    loop {
        let n = std::io::Read::read(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        len += n as u64;
        hasher.update(&buf[..n]);
    }
    Ok((len, Base64String::from_bytes(&hasher.finalize())))
}
