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

// Group operations (C9): thin wrappers over the catalog's group methods
// that additionally regenerate static files after a successful commit,
// since every state change the catalog makes must be reflected in the
// published metadata.

use std::sync::Arc;

use arepo_catalog::{AppGroup, Catalog};
use arepo_common::{PackageName, Result};
use arepo_layout::RepoLayout;
use arepo_sign::PrivateKey;

use crate::notes::ReleaseNotesRenderer;
use crate::publish::publish;

pub fn create_group(
    layout: &RepoLayout,
    catalog: &Catalog,
    key: &PrivateKey,
    renderer: &Arc<dyn ReleaseNotesRenderer>,
    tag: &str,
    initial_members: &[PackageName],
) -> Result<()> {
    catalog.create_group(tag, initial_members)?;
    publish(layout, catalog, key, renderer)
}

pub fn add_to_group(
    layout: &RepoLayout,
    catalog: &Catalog,
    key: &PrivateKey,
    renderer: &Arc<dyn ReleaseNotesRenderer>,
    tag: &str,
    packages: &[PackageName],
) -> Result<()> {
    catalog.add_to_group(tag, packages)?;
    publish(layout, catalog, key, renderer)
}

/// Clears the group field on `packages`; per spec this does not delete
/// the group itself even if it ends up with no members.
pub fn remove_from_group(
    layout: &RepoLayout,
    catalog: &Catalog,
    key: &PrivateKey,
    renderer: &Arc<dyn ReleaseNotesRenderer>,
    tag: &str,
    packages: &[PackageName],
) -> Result<()> {
    catalog.remove_from_group(tag, packages)?;
    publish(layout, catalog, key, renderer)
}

/// Detaches every member and removes the group row.
pub fn delete_group(
    layout: &RepoLayout,
    catalog: &Catalog,
    key: &PrivateKey,
    renderer: &Arc<dyn ReleaseNotesRenderer>,
    tag: &str,
) -> Result<()> {
    catalog.delete_group(tag)?;
    publish(layout, catalog, key, renderer)
}

pub fn list_groups(catalog: &Catalog) -> Result<Vec<AppGroup>> {
    catalog.list_groups()
}
