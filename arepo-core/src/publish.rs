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

// Static-file generator (C7): three `std::thread::spawn` stages chained
// by `std::sync::mpsc` channels — reader -> per-app writer -> {bulk
// writer, index writer}. The reader is the catalog itself and is
// already serialized, so none of the downstream queues need bounding.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use arepo_catalog::{App, AppRelease, Catalog, Delta};
use arepo_common::{ArepoError, Result, UnixTimestamp};
use arepo_layout::RepoLayout;
use arepo_sign::{sign_string, PrivateKey};

use crate::metadata::{DeltaInfo, ReleaseMetadata};
use crate::notes::ReleaseNotesRenderer;

/// Everything the per-app writer stage needs for one app; assembled by
/// the reader stage from catalog reads so the writer stage never has to
/// call back into the catalog.
struct AppReadout {
    app: App,
    releases: Vec<AppRelease>,
    deltas: Vec<Delta>,
}

/// Regenerates every signed artifact under `layout.apps_dir()` from the
/// current catalog contents: deletes stale output, then re-derives
/// per-app `latest.txt`/`icon.png` plus the two aggregate files.
pub fn publish(
    layout: &RepoLayout,
    catalog: &Catalog,
    key: &PrivateKey,
    renderer: &Arc<dyn ReleaseNotesRenderer>,
) -> Result<()> {
    clean_stale_output(layout)?;

    let apps = catalog.list_apps()?;
    let mut readouts = Vec::with_capacity(apps.len());
    for app in apps {
        let releases = catalog.releases(&app.package_name)?;
        let deltas = catalog.deltas(&app.package_name, app.latest_version_code)?;
        readouts.push(AppReadout { app, releases, deltas });
    }

    let (readout_tx, readout_rx) = channel::<AppReadout>();
    let (bulk_tx, bulk_rx) = channel::<String>();
    let (index_tx, index_rx) = channel::<String>();

    let reader_handle: JoinHandle<()> = std::thread::spawn(move || {
        for readout in readouts {
            if readout_tx.send(readout).is_err() {
                break;
            }
        }
    });

    let writer_layout = layout.clone();
    let writer_key = key.clone();
    let writer_renderer = Arc::clone(renderer);
    let writer_handle: JoinHandle<Result<()>> = std::thread::spawn(move || -> Result<()> {
        for readout in readout_rx {
            let package = readout.app.package_name.clone();
            match write_one_app(&writer_layout, &writer_key, &writer_renderer, &readout) {
                Ok((json_line, index_line)) => {
                    if bulk_tx.send(json_line).is_err() || index_tx.send(index_line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("failed to publish {package}: {e}");
                    return Err(e);
                }
            }
        }
        Ok(())
    });

    let generation_timestamp = UnixTimestamp::now();
    let bulk_handle = spawn_aggregate_writer(bulk_rx, layout.bulk_metadata_path(), key.clone(), generation_timestamp);
    let index_handle = spawn_aggregate_writer(index_rx, layout.index_path(), key.clone(), generation_timestamp);

    reader_handle.join().expect("publish reader thread panicked");
    writer_handle.join().expect("publish writer thread panicked")?;
    bulk_handle.join().expect("bulk writer thread panicked")?;
    index_handle.join().expect("index writer thread panicked")?;

    Ok(())
}

fn write_one_app(
    layout: &RepoLayout,
    key: &PrivateKey,
    renderer: &Arc<dyn ReleaseNotesRenderer>,
    readout: &AppReadout,
) -> Result<(String, String)> {
    let AppReadout { app, releases, deltas } = readout;

    let latest = releases
        .iter()
        .find(|r| r.version_code == app.latest_version_code)
        .ok_or_else(|| ArepoError::RenderFailed(format!("no release row for {}'s latest version", app.package_name)))?;

    std::fs::create_dir_all(layout.app_dir(&app.package_name))?;

    if let Some(icon) = &latest.icon_png {
        std::fs::write(layout.icon_path(&app.package_name), icon)?;
    }

    let release_notes = match &latest.release_notes_md {
        Some(md) => Some(renderer.render(md)?),
        None => None,
    };

    let delta_info: Vec<DeltaInfo> = deltas
        .iter()
        .filter_map(|d| {
            releases
                .iter()
                .find(|r| r.version_code == d.base_version_code)
                .map(|base_release| DeltaInfo {
                    version_code: d.base_version_code.0,
                    sha256_checksum: base_release.sha256.as_str().to_string(),
                })
        })
        .collect();

    let metadata = ReleaseMetadata {
        package: app.package_name.to_string(),
        group_id: app.group_tag.clone(),
        label: app.label.clone(),
        latest_version_code: app.latest_version_code.0,
        latest_version_name: latest.version_name.clone(),
        last_update_timestamp: app.last_update_timestamp.0,
        sha256_checksum: latest.sha256.as_str().to_string(),
        delta_info,
        release_notes,
    };

    let json_line = serde_json::to_string(&metadata)?;

    let signed = sign_string(key, &json_line)?;
    std::fs::write(layout.latest_txt_path(&app.package_name), signed)?;

    let index_line = format!("{} {} {}", app.package_name, app.latest_version_code, app.last_update_timestamp.0);
    Ok((json_line, index_line))
}

/// Writes `{generation_timestamp}\n` followed by one line per message
/// received, then signs and writes the whole body. The leading
/// timestamp line lets the validator confirm the aggregate was
/// generated no earlier than any per-app timestamp it contains.
fn spawn_aggregate_writer(
    rx: Receiver<String>,
    path: PathBuf,
    key: PrivateKey,
    generation_timestamp: UnixTimestamp,
) -> JoinHandle<Result<()>> {
    std::thread::spawn(move || -> Result<()> {
        let mut body = format!("{}\n", generation_timestamp.0);
        for line in rx {
            body.push_str(&line);
            body.push('\n');
        }
        let signed = sign_string(&key, &body)?;
        std::fs::write(&path, signed)?;
        Ok(())
    })
}

/// Deletes every previously generated artifact under `apps/` (per-app
/// `latest.txt`/`icon.png`, plus the two aggregate files) so that a
/// regeneration run never leaves behind output from a package that no
/// longer exists. Walks to depth <= 2 only: `apps/` itself and each
/// immediate `apps/<package>/` child.
fn clean_stale_output(layout: &RepoLayout) -> Result<()> {
    let apps_dir = layout.apps_dir();
    if !apps_dir.is_dir() {
        return Ok(());
    }

    let stale_names: HashSet<&str> = ["latest.txt", "icon.png"].into_iter().collect();

    for entry in std::fs::read_dir(&apps_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            remove_stale_files_in(&path, &stale_names)?;
        }
    }

    remove_if_exists(&layout.bulk_metadata_path())?;
    remove_if_exists(&layout.index_path())?;
    Ok(())
}

fn remove_stale_files_in(dir: &Path, stale_names: &HashSet<&str>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if stale_names.contains(name) {
                remove_if_exists(&path)?;
            }
        }
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arepo_catalog::insert_app_release;
    use arepo_common::{Base64String, PackageName, UnixTimestamp, VersionCode};
    use rand::rngs::OsRng;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;
    use std::str::FromStr;

    fn test_key() -> PrivateKey {
        let rsa = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = rsa.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        PrivateKey::from_pkcs8_bytes(pem.as_bytes()).unwrap()
    }

    #[test]
    fn publishes_latest_txt_and_aggregates_for_one_app() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::new(dir.path());
        let catalog = Catalog::open(layout.database_path()).unwrap();
        let key = test_key();

        let pkg = PackageName::from_str("com.example.app").unwrap();
        let release = AppRelease {
            package_name: pkg.clone(),
            version_code: VersionCode(1),
            version_name: "1.0".into(),
            min_sdk_version: "21".into(),
            sha256: Base64String::from_bytes(b"apk bytes"),
            signing_cert_fingerprints: Default::default(),
            v4_fingerprint: None,
            release_notes_md: Some("# hello".into()),
            icon_png: Some(vec![0x89, 0x50, 0x4e, 0x47]),
            inserted_at: UnixTimestamp::now(),
        };
        catalog
            .with_transaction(move |tx, _| insert_app_release(tx, &release, Some("Example"), None))
            .unwrap();

        let renderer: Arc<dyn ReleaseNotesRenderer> = Arc::new(crate::notes::MinifiedCommonmarkRenderer);
        publish(&layout, &catalog, &key, &renderer).unwrap();

        assert!(layout.latest_txt_path(&pkg).is_file());
        assert!(layout.icon_path(&pkg).is_file());
        assert!(layout.bulk_metadata_path().is_file());
        assert!(layout.index_path().is_file());

        let index_body = std::fs::read_to_string(layout.index_path()).unwrap();
        assert!(index_body.contains("com.example.app 1"));
    }
}
