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

// DDL and migration runner. `schema_version` is a one-row scalar table;
// migrations run with foreign keys off inside one transaction and the
// pragma is restored before the connection is handed back to callers.

use rusqlite::Connection;

use arepo_common::Result;

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);

CREATE TABLE IF NOT EXISTS app (
    package_name TEXT PRIMARY KEY,
    label TEXT,
    group_tag TEXT,
    latest_version_code INTEGER NOT NULL,
    last_update_timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS app_release (
    package_name TEXT NOT NULL REFERENCES app(package_name),
    version_code INTEGER NOT NULL,
    version_name TEXT NOT NULL,
    min_sdk_version TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    signing_cert_fingerprints TEXT NOT NULL,
    v4_fingerprint TEXT,
    release_notes_md TEXT,
    icon_png BLOB,
    inserted_at INTEGER NOT NULL,
    PRIMARY KEY (package_name, version_code)
);

CREATE TABLE IF NOT EXISTS delta (
    package_name TEXT NOT NULL,
    base_version_code INTEGER NOT NULL,
    target_version_code INTEGER NOT NULL,
    file_size INTEGER NOT NULL,
    sha256 TEXT NOT NULL,
    PRIMARY KEY (package_name, base_version_code, target_version_code)
);

CREATE TABLE IF NOT EXISTS app_group (
    tag TEXT PRIMARY KEY
);
"#;

pub fn open_and_migrate(path: &std::path::Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    migrate(&mut conn)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

fn migrate(conn: &mut Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    let tx = conn.transaction()?;
    tx.execute_batch(CREATE_TABLES)?;

    let version: Option<i64> = tx
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .ok();
    match version {
        None => {
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [CURRENT_SCHEMA_VERSION])?;
        }
        Some(v) if v < CURRENT_SCHEMA_VERSION => {
            tx.execute("UPDATE schema_version SET version = ?1", [CURRENT_SCHEMA_VERSION])?;
        }
        _ => {}
    }
    tx.commit()?;
    Ok(())
}

pub fn checkpoint_and_close(conn: Connection) -> Result<()> {
    conn.pragma_update(None, "wal_checkpoint", "TRUNCATE")?;
    Ok(())
}
