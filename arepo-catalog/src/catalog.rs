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

// Public façade (C4). Every method either runs a single statement on
// the writer thread or hands the caller a `rusqlite::Transaction` plus a
// deferred-compensation list via `with_transaction`, per the catalog's
// transactional-file-move requirement.

use std::path::PathBuf;

use rusqlite::{params, OptionalExtension, Transaction};

use arepo_common::{ArepoError, HexString, PackageName, Result, VersionCode};

use crate::model::{App, AppGroup, AppRelease, Delta};
use crate::writer::Writer;

pub struct Catalog {
    writer: Writer,
}

impl Catalog {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Catalog { writer: Writer::open(db_path.into())? })
    }

    /// Runs `f` inside one SQL transaction on the writer thread. On `Ok`
    /// the transaction commits and any files `f` registered in the
    /// compensation list are left in place. On `Err` the transaction
    /// rolls back and every registered file is unlinked.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction, &mut Vec<PathBuf>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.writer.submit(move |conn| {
            let tx = conn.transaction()?;
            let mut compensations = Vec::new();
            match f(&tx, &mut compensations) {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(e) => {
                    let _ = tx.rollback();
                    for path in compensations {
                        if let Err(io_err) = std::fs::remove_file(&path) {
                            if io_err.kind() != std::io::ErrorKind::NotFound {
                                log::warn!("failed to roll back file {}: {io_err}", path.display());
                            }
                        }
                    }
                    Err(e)
                }
            }
        })
    }

    pub fn highest_version_code(&self, package: &PackageName) -> Result<Option<VersionCode>> {
        let package = package.clone();
        self.writer.submit(move |conn| {
            conn.query_row(
                "SELECT latest_version_code FROM app WHERE package_name = ?1",
                params![package],
                |row| row.get::<_, VersionCode>(0),
            )
            .optional()
            .map_err(ArepoError::from)
        })
    }

    pub fn releases(&self, package: &PackageName) -> Result<Vec<AppRelease>> {
        let package = package.clone();
        self.writer.submit(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT package_name, version_code, version_name, min_sdk_version, sha256,
                        signing_cert_fingerprints, v4_fingerprint, release_notes_md, icon_png, inserted_at
                 FROM app_release WHERE package_name = ?1 ORDER BY version_code ASC",
            )?;
            let rows = stmt.query_map(params![package], row_to_release)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(ArepoError::from)
        })
    }

    pub fn deltas(&self, package: &PackageName, target: VersionCode) -> Result<Vec<Delta>> {
        let package = package.clone();
        self.writer.submit(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT package_name, base_version_code, target_version_code, file_size, sha256
                 FROM delta WHERE package_name = ?1 AND target_version_code = ?2
                 ORDER BY base_version_code DESC",
            )?;
            let rows = stmt.query_map(params![package, target], |row| {
                Ok(Delta {
                    package_name: row.get(0)?,
                    base_version_code: row.get(1)?,
                    target_version_code: row.get(2)?,
                    file_size: row.get::<_, i64>(3)? as u64,
                    sha256: row.get(4)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(ArepoError::from)
        })
    }

    pub fn list_apps(&self) -> Result<Vec<App>> {
        self.writer.submit(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT package_name, label, group_tag, latest_version_code, last_update_timestamp
                 FROM app ORDER BY package_name ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(App {
                    package_name: row.get(0)?,
                    label: row.get(1)?,
                    group_tag: row.get(2)?,
                    latest_version_code: row.get(3)?,
                    last_update_timestamp: row.get(4)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(ArepoError::from)
        })
    }

    pub fn set_release_notes(
        &self,
        package: &PackageName,
        version_code: VersionCode,
        notes_md: Option<String>,
    ) -> Result<()> {
        let package = package.clone();
        self.writer.submit(move |conn| {
            let updated = conn.execute(
                "UPDATE app_release SET release_notes_md = ?1 WHERE package_name = ?2 AND version_code = ?3",
                params![notes_md, package, version_code],
            )?;
            if updated == 0 {
                return Err(ArepoError::EditFailed(format!(
                    "package '{package}' has no release with version code {version_code}"
                )));
            }
            Ok(())
        })
    }

    // -- groups (C9) ------------------------------------------------------

    pub fn create_group(&self, tag: &str, initial_members: &[PackageName]) -> Result<()> {
        let tag = tag.to_string();
        let members = initial_members.to_vec();
        self.writer.submit(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO app_group (tag) VALUES (?1)", params![tag])?;
            assign_members(&tx, &tag, &members)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn add_to_group(&self, tag: &str, packages: &[PackageName]) -> Result<()> {
        let tag = tag.to_string();
        let packages = packages.to_vec();
        self.writer.submit(move |conn| {
            let tx = conn.transaction()?;
            require_group_exists(&tx, &tag)?;
            assign_members(&tx, &tag, &packages)?;
            let total: i64 = tx.query_row(
                "SELECT COUNT(*) FROM app WHERE group_tag = ?1",
                params![tag],
                |row| row.get(0),
            )?;
            if (packages.len() as i64) < total {
                log::warn!(
                    "'group add {tag}' touched {} of {total} current members; the rest are unchanged",
                    packages.len()
                );
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn remove_from_group(&self, tag: &str, packages: &[PackageName]) -> Result<()> {
        let tag = tag.to_string();
        let packages = packages.to_vec();
        self.writer.submit(move |conn| {
            let tx = conn.transaction()?;
            require_group_exists(&tx, &tag)?;
            for pkg in &packages {
                tx.execute(
                    "UPDATE app SET group_tag = NULL WHERE package_name = ?1 AND group_tag = ?2",
                    params![pkg, tag],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn delete_group(&self, tag: &str) -> Result<()> {
        let tag = tag.to_string();
        self.writer.submit(move |conn| {
            let tx = conn.transaction()?;
            require_group_exists(&tx, &tag)?;
            tx.execute("UPDATE app SET group_tag = NULL WHERE group_tag = ?1", params![tag])?;
            tx.execute("DELETE FROM app_group WHERE tag = ?1", params![tag])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_groups(&self) -> Result<Vec<AppGroup>> {
        self.writer.submit(move |conn| {
            let mut stmt = conn.prepare("SELECT tag FROM app_group ORDER BY tag ASC")?;
            let tags = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut groups = Vec::with_capacity(tags.len());
            for tag in tags {
                let mut member_stmt = conn.prepare(
                    "SELECT package_name FROM app WHERE group_tag = ?1 ORDER BY package_name ASC",
                )?;
                let members = member_stmt
                    .query_map(params![tag], |row| row.get::<_, PackageName>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                groups.push(AppGroup { tag, members });
            }
            Ok(groups)
        })
    }
}

fn require_group_exists(tx: &Transaction, tag: &str) -> Result<()> {
    let exists: bool = tx
        .query_row("SELECT 1 FROM app_group WHERE tag = ?1", params![tag], |_| Ok(true))
        .optional()?
        .unwrap_or(false);
    if !exists {
        return Err(ArepoError::GroupDoesntExist(tag.to_string()));
    }
    Ok(())
}

fn assign_members(tx: &Transaction, tag: &str, packages: &[PackageName]) -> Result<()> {
    for pkg in packages {
        let updated = tx.execute(
            "UPDATE app SET group_tag = ?1 WHERE package_name = ?2",
            params![tag, pkg],
        )?;
        if updated == 0 {
            return Err(ArepoError::Cli(format!("package '{pkg}' is not in the repository")));
        }
    }
    Ok(())
}

/// Inserts (or updates, on conflict) the `app` row and inserts the
/// `app_release` row for one release, inside a caller-supplied
/// transaction. Used by the insertion pipeline (C6) from within
/// [`Catalog::with_transaction`].
pub fn insert_app_release(
    tx: &Transaction,
    release: &AppRelease,
    label: Option<&str>,
    group_tag: Option<&str>,
) -> Result<()> {
    let fps: Vec<String> = release
        .signing_cert_fingerprints
        .iter()
        .map(|h| h.as_str().to_string())
        .collect();
    let fps_json = serde_json::to_string(&fps)?;

    tx.execute(
        "INSERT INTO app_release
            (package_name, version_code, version_name, min_sdk_version, sha256,
             signing_cert_fingerprints, v4_fingerprint, release_notes_md, icon_png, inserted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            release.package_name,
            release.version_code,
            release.version_name,
            release.min_sdk_version,
            release.sha256,
            fps_json,
            release.v4_fingerprint,
            release.release_notes_md,
            release.icon_png,
            release.inserted_at,
        ],
    )?;

    tx.execute(
        "INSERT INTO app (package_name, label, group_tag, latest_version_code, last_update_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(package_name) DO UPDATE SET
             label = excluded.label,
             latest_version_code = excluded.latest_version_code,
             last_update_timestamp = excluded.last_update_timestamp",
        params![release.package_name, label, group_tag, release.version_code, release.inserted_at],
    )?;
    Ok(())
}

pub fn record_delta(tx: &Transaction, delta: &Delta) -> Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO delta (package_name, base_version_code, target_version_code, file_size, sha256)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            delta.package_name,
            delta.base_version_code,
            delta.target_version_code,
            delta.file_size as i64,
            delta.sha256,
        ],
    )?;
    Ok(())
}

pub fn delete_deltas_for_target(
    tx: &Transaction,
    package: &PackageName,
    target: VersionCode,
) -> Result<()> {
    tx.execute(
        "DELETE FROM delta WHERE package_name = ?1 AND target_version_code = ?2",
        params![package, target],
    )?;
    Ok(())
}

/// All version codes currently recorded for `package`, ascending. Used
/// from within an open transaction (e.g. by the insertion pipeline to
/// pick delta base versions), so it takes a `Transaction` directly
/// rather than a [`Catalog`] reference, which would deadlock on
/// reentrancy from inside a `with_transaction` closure.
pub fn list_version_codes(tx: &Transaction, package: &PackageName) -> Result<Vec<VersionCode>> {
    let mut stmt = tx.prepare(
        "SELECT version_code FROM app_release WHERE package_name = ?1 ORDER BY version_code ASC",
    )?;
    let rows = stmt.query_map(params![package], |row| row.get::<_, VersionCode>(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(ArepoError::from)
}

fn row_to_release(row: &rusqlite::Row) -> rusqlite::Result<AppRelease> {
    let fps_json: String = row.get(5)?;
    let fps: Vec<String> = serde_json::from_str(&fps_json).unwrap_or_default();
    let signing_cert_fingerprints = fps.into_iter().filter_map(|s| HexString::parse(&s).ok()).collect();
    Ok(AppRelease {
        package_name: row.get(0)?,
        version_code: row.get(1)?,
        version_name: row.get(2)?,
        min_sdk_version: row.get(3)?,
        sha256: row.get(4)?,
        signing_cert_fingerprints,
        v4_fingerprint: row.get(6)?,
        release_notes_md: row.get(7)?,
        icon_png: row.get(8)?,
        inserted_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arepo_common::{Base64String, UnixTimestamp};
    use std::str::FromStr;

    fn open_tmp() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path().join("database.sqlite")).unwrap();
        (dir, catalog)
    }

    fn sample_release(package: &str, version_code: u64) -> AppRelease {
        AppRelease {
            package_name: PackageName::from_str(package).unwrap(),
            version_code: VersionCode(version_code),
            version_name: format!("{version_code}.0"),
            min_sdk_version: "21".into(),
            sha256: Base64String::from_bytes(b"fake apk bytes"),
            signing_cert_fingerprints: [HexString::parse("deadbeef").unwrap()].into_iter().collect(),
            v4_fingerprint: None,
            release_notes_md: None,
            icon_png: None,
            inserted_at: UnixTimestamp::now(),
        }
    }

    #[test]
    fn highest_version_code_is_none_for_unknown_package() {
        let (_dir, catalog) = open_tmp();
        let pkg = PackageName::from_str("com.example.app").unwrap();
        assert!(catalog.highest_version_code(&pkg).unwrap().is_none());
    }

    #[test]
    fn insert_and_read_back_a_release() {
        let (_dir, catalog) = open_tmp();
        let release = sample_release("com.example.app", 1);
        let pkg = release.package_name.clone();

        catalog
            .with_transaction(move |tx, _compensations| insert_app_release(tx, &release, Some("Example"), None))
            .unwrap();

        assert_eq!(catalog.highest_version_code(&pkg).unwrap(), Some(VersionCode(1)));
        let releases = catalog.releases(&pkg).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].version_name, "1.0");
    }

    #[test]
    fn rollback_deletes_compensated_files() {
        let (dir, catalog) = open_tmp();
        let placed = dir.path().join("placed.apk");
        std::fs::write(&placed, b"apk bytes").unwrap();
        let placed_for_closure = placed.clone();

        let result: Result<()> = catalog.with_transaction(move |tx, compensations| {
            compensations.push(placed_for_closure.clone());
            let release = sample_release("com.example.app", 1);
            insert_app_release(tx, &release, None, None)?;
            Err(ArepoError::InsertFailed("simulated failure".into()))
        });

        assert!(result.is_err());
        assert!(!placed.exists());
    }

    #[test]
    fn group_lifecycle() {
        let (_dir, catalog) = open_tmp();
        let pkg = PackageName::from_str("com.example.app").unwrap();
        let release = sample_release("com.example.app", 1);
        catalog
            .with_transaction(move |tx, _| insert_app_release(tx, &release, None, None))
            .unwrap();

        catalog.create_group("chromium", &[pkg.clone()]).unwrap();
        let groups = catalog.list_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members, vec![pkg.clone()]);

        catalog.delete_group("chromium").unwrap();
        assert!(catalog.list_groups().unwrap().is_empty());
    }

    #[test]
    fn adding_to_unknown_group_is_an_error() {
        let (_dir, catalog) = open_tmp();
        let pkg = PackageName::from_str("com.example.app").unwrap();
        let err = catalog.add_to_group("ghost", &[pkg]).unwrap_err();
        assert!(matches!(err, ArepoError::GroupDoesntExist(_)));
    }
}
