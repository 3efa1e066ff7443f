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

use arepo_common::VersionCode;

pub const DEFAULT_MAX_BASES: usize = 5;

/// Picks up to `k` base versions for `target`: the highest version
/// codes strictly less than `target`, descending. `known_versions` need
/// not be sorted or deduplicated.
pub fn select_bases(known_versions: &[VersionCode], target: VersionCode, k: usize) -> Vec<VersionCode> {
    let mut candidates: Vec<VersionCode> =
        known_versions.iter().copied().filter(|v| *v < target).collect();
    candidates.sort_by(|a, b| b.cmp(a));
    candidates.dedup();
    candidates.truncate(k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_k_highest_bases_below_target() {
        let versions: Vec<VersionCode> = (24..=27).map(VersionCode).collect();
        let bases = select_bases(&versions, VersionCode(27), 5);
        assert_eq!(bases, vec![VersionCode(26), VersionCode(25), VersionCode(24)]);
    }

    #[test]
    fn truncates_to_k() {
        let versions: Vec<VersionCode> = (1..=10).map(VersionCode).collect();
        let bases = select_bases(&versions, VersionCode(10), 3);
        assert_eq!(bases, vec![VersionCode(9), VersionCode(8), VersionCode(7)]);
    }

    #[test]
    fn ignores_duplicates_and_versions_at_or_above_target() {
        let versions = vec![VersionCode(5), VersionCode(5), VersionCode(10), VersionCode(3)];
        let bases = select_bases(&versions, VersionCode(10), 5);
        assert_eq!(bases, vec![VersionCode(5), VersionCode(3)]);
    }
}
