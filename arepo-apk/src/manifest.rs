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

// Manifest extraction (C2): reads `packageName`, `versionCode`,
// `versionName`, `minSdkVersion` and the application label directly out
// of the already-parsed binary manifest, no external badging tool
// involved.

use apk_info::Apk;
use arepo_common::{ArepoError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub package_name: String,
    pub version_code: String,
    pub version_name: String,
    pub min_sdk_version: String,
    pub label: Option<String>,
    pub icon_res_path: Option<String>,
}

pub fn read_manifest(apk: &Apk) -> Result<Manifest> {
    let required = |field: &'static str, value: Option<String>| -> Result<String> {
        value.filter(|v| !v.is_empty()).ok_or(ArepoError::ApkMissingManifestField(field))
    };

    Ok(Manifest {
        package_name: required("packageName", apk.get_package_name())?,
        version_code: required("versionCode", apk.get_version_code())?,
        version_name: required("versionName", apk.get_version_name())?,
        min_sdk_version: required("minSdkVersion", apk.get_min_sdk_version())?,
        label: apk.get_application_label(),
        icon_res_path: apk.get_application_icon(),
    })
}
