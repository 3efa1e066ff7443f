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

// Launcher icon extraction (C2). The resource-table reader proper is
// out of scope (§1); what's in-scope here is the density-fallback rule
// applied to whatever zip entry the manifest points at: if that entry
// is an adaptive-icon XML rather than a raster image, fall back to a
// sibling PNG of matching name in the smallest density directory at or
// above the configured minimum.

use apk_info::Apk;
use arepo_common::Result;

pub const DEFAULT_MIN_DENSITY: &str = "hdpi";

const DENSITY_ORDER: &[&str] = &["ldpi", "mdpi", "tvdpi", "hdpi", "xhdpi", "xxhdpi", "xxxhdpi"];

fn density_rank(density: &str) -> Option<usize> {
    DENSITY_ORDER.iter().position(|d| *d == density)
}

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Extracts the best launcher icon bytes at or above `min_density` from
/// an already-opened APK, given the resource path the manifest reported
/// (e.g. `res/mipmap-xxxhdpi/ic_launcher.png` or an adaptive icon XML
/// under a density-less `res/mipmap-anydpi-v26/` directory).
pub fn extract_icon(apk: &Apk, icon_res_path: &str, min_density: &str) -> Result<Option<Vec<u8>>> {
    if let Ok((bytes, _)) = apk.read(icon_res_path) {
        if bytes.starts_with(PNG_MAGIC) {
            return Ok(Some(bytes));
        }
    }

    // Adaptive-icon XML (or missing entry): fall back to a sibling PNG
    // with the same file stem in the smallest qualifying density dir.
    let stem = match icon_res_path.rsplit('/').next() {
        Some(name) => name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name).to_string(),
        None => return Ok(None),
    };

    let min_rank = density_rank(min_density).unwrap_or(0);
    let mut candidates: Vec<(usize, String)> = Vec::new();

    for name in apk.namelist() {
        let Some(dir) = name.strip_prefix("res/").and_then(|rest| rest.split('/').next()) else {
            continue;
        };
        let Some(density) = dir.split('-').nth(1) else { continue };
        let density = density.split('-').next().unwrap_or(density);
        let Some(rank) = density_rank(density) else { continue };
        if rank < min_rank {
            continue;
        }
        if name.ends_with(&format!("/{stem}.png")) {
            candidates.push((rank, name.to_string()));
        }
    }

    candidates.sort_by_key(|(rank, _)| *rank);
    let Some((_, chosen)) = candidates.into_iter().next() else {
        return Ok(None);
    };

    let (bytes, _) = apk.read(&chosen).map_err(|e| arepo_common::ArepoError::ZipParseFailed(e.to_string()))?;
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_order_is_ascending() {
        assert!(density_rank("ldpi") < density_rank("hdpi"));
        assert!(density_rank("hdpi") < density_rank("xxxhdpi"));
    }
}
