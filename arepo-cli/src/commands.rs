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

// Command handlers. Each takes the parsed args plus the shared repo
// handles `main` builds once, and returns an `ArepoError` the top level
// turns into an exit code via `category()`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arepo_apk::ApkInspector;
use arepo_catalog::Catalog;
use arepo_common::{ArepoError, PackageName, Result, VersionCode};
use arepo_core::{ReleaseNotesRenderer, MinifiedCommonmarkRenderer};
use arepo_delta::{DeltaCodec, DeltaPool, QbsdiffGzCodec};
use arepo_layout::RepoLayout;
use arepo_sign::PrivateKey;

use crate::cli::{EditCommand, EditReleaseNotesArgs, GroupCommand, GroupDeleteArgs, GroupMutationArgs, InfoCommand};

pub struct Repo {
    pub layout: RepoLayout,
    pub catalog: Catalog,
    pub renderer: Arc<dyn ReleaseNotesRenderer>,
    pub jobs: Option<usize>,
}

impl Repo {
    pub fn open(dir: &Path, jobs: Option<usize>) -> Result<Self> {
        let layout = RepoLayout::new(dir);
        let catalog = Catalog::open(layout.database_path())?;
        Ok(Repo { layout, catalog, renderer: Arc::new(MinifiedCommonmarkRenderer), jobs })
    }

    fn inspector(&self) -> ApkInspector {
        ApkInspector::new()
    }

    fn delta_pool(&self) -> Result<Arc<DeltaPool>> {
        Ok(Arc::new(DeltaPool::new(self.jobs, Arc::new(QbsdiffGzCodec) as Arc<dyn DeltaCodec>)?))
    }
}

fn load_key(path: &Path) -> Result<PrivateKey> {
    PrivateKey::from_file(path)
}

pub fn add(repo: &Repo, key_path: &Path, skip_notes: bool, apks: &[PathBuf]) -> Result<()> {
    let key = load_key(key_path)?;
    let inspector = repo.inspector();
    let delta_pool = repo.delta_pool()?;

    let report = arepo_core::insert_apks(&repo.layout, &repo.catalog, &inspector, &delta_pool, &key, apks, skip_notes)?;
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(()) => log::info!("inserted {}", outcome.package),
            Err(e) => log::error!("failed to insert {}: {e}", outcome.package),
        }
    }

    arepo_core::publish(&repo.layout, &repo.catalog, &key, &repo.renderer)?;

    if report.any_failed() {
        return Err(ArepoError::InsertFailed(format!(
            "{} of {} package(s) failed to insert; see log for details",
            report.outcomes.iter().filter(|o| o.result.is_err()).count(),
            report.outcomes.len()
        )));
    }
    Ok(())
}

pub fn validate(repo: &Repo, key_path: &Path) -> Result<()> {
    let key = load_key(key_path)?;
    let stored_pem = std::fs::read_to_string(repo.layout.public_key_path())?;
    if key.derive_public_key().to_pem()?.trim() != stored_pem.trim() {
        return Err(ArepoError::RepoSigningKeyMismatch);
    }

    let report = arepo_core::validate(&repo.layout, &repo.catalog)?;
    for issue in &report.issues {
        match &issue.package {
            Some(pkg) => println!("{pkg}: {}", issue.message),
            None => println!("{}", issue.message),
        }
    }
    if report.is_clean() {
        println!("repository is valid");
        Ok(())
    } else {
        Err(ArepoError::InvalidRepoState(format!("{} issue(s) found", report.issues.len())))
    }
}

pub fn edit(repo: &Repo, command: &EditCommand) -> Result<()> {
    let EditCommand::ReleaseNotes(args) = command;
    edit_release_notes(repo, args)
}

fn edit_release_notes(repo: &Repo, args: &EditReleaseNotesArgs) -> Result<()> {
    let key = load_key(&args.key)?;
    let package = PackageName::parse(&args.package)?;

    let version_code = match args.version_code {
        Some(v) => VersionCode(v),
        None => repo
            .catalog
            .highest_version_code(&package)?
            .ok_or_else(|| ArepoError::EditFailed(format!("package '{package}' is not in the repository")))?,
    };

    if args.delete {
        repo.catalog.set_release_notes(&package, version_code, None)?;
    } else {
        let notes = read_notes_from_stdin()?;
        repo.catalog.set_release_notes(&package, version_code, Some(notes))?;
    }

    arepo_core::publish(&repo.layout, &repo.catalog, &key, &repo.renderer)
}

fn read_notes_from_stdin() -> Result<String> {
    use std::io::{BufRead, Write};
    print!("New release notes (end with a line containing only '.'):\n");
    std::io::stdout().flush().ok();

    let mut lines = Vec::new();
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim_end() == "." {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

pub fn group(repo: &Repo, command: &GroupCommand) -> Result<()> {
    match command {
        GroupCommand::Create(args) => group_mutation(repo, args, arepo_core::create_group),
        GroupCommand::Add(args) => group_mutation(repo, args, arepo_core::add_to_group),
        GroupCommand::Remove(args) => group_mutation(repo, args, arepo_core::remove_from_group),
        GroupCommand::Delete(args) => group_delete(repo, args),
        GroupCommand::List => group_list(repo),
    }
}

fn group_mutation(
    repo: &Repo,
    args: &GroupMutationArgs,
    op: impl FnOnce(&RepoLayout, &Catalog, &PrivateKey, &Arc<dyn ReleaseNotesRenderer>, &str, &[PackageName]) -> Result<()>,
) -> Result<()> {
    let key = load_key(&args.key)?;
    let packages = args
        .packages
        .iter()
        .map(|p| PackageName::parse(p))
        .collect::<Result<Vec<_>>>()?;
    op(&repo.layout, &repo.catalog, &key, &repo.renderer, &args.group_id, &packages)
}

fn group_delete(repo: &Repo, args: &GroupDeleteArgs) -> Result<()> {
    let key = load_key(&args.key)?;
    arepo_core::delete_group(&repo.layout, &repo.catalog, &key, &repo.renderer, &args.group_id)
}

fn group_list(repo: &Repo) -> Result<()> {
    for group in arepo_core::list_groups(&repo.catalog)? {
        let members = group.members.iter().map(PackageName::to_string).collect::<Vec<_>>().join(", ");
        println!("{}: {members}", group.tag);
    }
    Ok(())
}

pub fn info(repo: &Repo, command: &InfoCommand) -> Result<()> {
    match command {
        InfoCommand::Groups => group_list(repo),
        InfoCommand::Packages => {
            for app in repo.catalog.list_apps()? {
                println!(
                    "{} {} ({})",
                    app.package_name,
                    app.latest_version_code,
                    app.group_tag.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
    }
}

pub fn generate_delta(old: &Path, new: &Path, out: &Path, gzip: bool) -> Result<()> {
    let base = std::fs::read(old)?;
    let target = std::fs::read(new)?;
    let mut out_file = std::fs::File::create(out)?;
    arepo_delta::generate_to(&base, &target, gzip, &mut out_file)
}

pub fn apply_delta(old: &Path, delta: &Path, out: &Path, gzip: bool) -> Result<()> {
    let base = std::fs::read(old)?;
    let mut delta_file = std::fs::File::open(delta)?;
    let mut out_file = std::fs::File::create(out)?;
    arepo_delta::apply_from(&base, &mut delta_file, gzip, &mut out_file)
}
