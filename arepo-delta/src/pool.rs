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

// Bounded worker pool (C5). Jobs are grouped by package before being
// submitted: one `rayon::scope` task per package, looping its deltas
// sequentially inside the task. That keeps "serial within a package,
// parallel across packages" true without a separate per-package mutex,
// since a package's jobs never leave the thread that picked them up.

use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use arepo_common::{ArepoError, PackageName, Result, VersionCode};

use crate::codec::DeltaCodec;

#[derive(Debug, Clone)]
pub struct DeltaJob {
    pub package: PackageName,
    pub base_version: VersionCode,
    pub target_version: VersionCode,
    pub base_apk_path: PathBuf,
    pub target_apk_path: PathBuf,
    pub output_path: PathBuf,
}

pub struct DeltaPool {
    pool: rayon::ThreadPool,
    codec: Arc<dyn DeltaCodec>,
}

impl DeltaPool {
    /// `num_jobs` defaults to `cpus + 2`; the pool is never larger than
    /// the machine's available parallelism.
    pub fn new(num_jobs: Option<usize>, codec: Arc<dyn DeltaCodec>) -> Result<Self> {
        let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let requested = num_jobs.unwrap_or(available + 2);
        let size = requested.min(available).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("arepo-delta-{i}"))
            .build()
            .map_err(|e| ArepoError::InsertFailed(format!("failed to build delta worker pool: {e}")))?;
        Ok(DeltaPool { pool, codec })
    }

    /// Runs every package's job list as one scoped task. Returns one
    /// `Result` per package, in the same order as `jobs_by_package`, so
    /// the caller can roll back only the packages that failed.
    pub fn run(&self, jobs_by_package: Vec<Vec<DeltaJob>>) -> Vec<Result<()>> {
        let slots: Vec<Mutex<Option<Result<()>>>> =
            jobs_by_package.iter().map(|_| Mutex::new(None)).collect();

        self.pool.scope(|scope| {
            for (jobs, slot) in jobs_by_package.into_iter().zip(slots.iter()) {
                let codec = Arc::clone(&self.codec);
                scope.spawn(move |_| {
                    let outcome = run_package_jobs(codec.as_ref(), &jobs);
                    *slot.lock().expect("delta pool result slot poisoned") = Some(outcome);
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.into_inner().expect("delta pool result slot poisoned").expect("every slot filled before scope returns"))
            .collect()
    }
}

fn run_package_jobs(codec: &dyn DeltaCodec, jobs: &[DeltaJob]) -> Result<()> {
    for job in jobs {
        generate_one(codec, job).map_err(|e| ArepoError::DeltaGenerationFailed {
            package: job.package.to_string(),
            base: job.base_version.0,
            target: job.target_version.0,
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

fn generate_one(codec: &dyn DeltaCodec, job: &DeltaJob) -> Result<()> {
    let base_bytes = std::fs::read(&job.base_apk_path)?;
    let target_bytes = std::fs::read(&job.target_apk_path)?;
    let mut out = File::create(&job.output_path)?;
    codec.generate(&base_bytes, &target_bytes, &mut out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::QbsdiffGzCodec;
    use std::str::FromStr;

    #[test]
    fn runs_jobs_across_packages_and_reports_per_package_results() {
        let dir = tempfile::tempdir().unwrap();
        let base_path = dir.path().join("24.apk");
        let target_path = dir.path().join("27.apk");
        std::fs::write(&base_path, b"old apk bytes".repeat(4)).unwrap();
        std::fs::write(&target_path, b"new apk bytes".repeat(4)).unwrap();
        let output_path = dir.path().join("delta-24-to-27.gz");

        let job = DeltaJob {
            package: PackageName::from_str("com.example.app").unwrap(),
            base_version: VersionCode(24),
            target_version: VersionCode(27),
            base_apk_path: base_path,
            target_apk_path: target_path,
            output_path: output_path.clone(),
        };

        let pool = DeltaPool::new(Some(2), Arc::new(QbsdiffGzCodec)).unwrap();
        let results = pool.run(vec![vec![job]]);

        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert!(output_path.exists());
    }

    #[test]
    fn missing_base_file_fails_only_its_package() {
        let dir = tempfile::tempdir().unwrap();
        let job = DeltaJob {
            package: PackageName::from_str("com.example.missing").unwrap(),
            base_version: VersionCode(1),
            target_version: VersionCode(2),
            base_apk_path: dir.path().join("does-not-exist.apk"),
            target_apk_path: dir.path().join("does-not-exist2.apk"),
            output_path: dir.path().join("delta-1-to-2.gz"),
        };
        let other_base = dir.path().join("1.apk");
        let other_target = dir.path().join("2.apk");
        std::fs::write(&other_base, b"a".repeat(4)).unwrap();
        std::fs::write(&other_target, b"b".repeat(4)).unwrap();
        let ok_job = DeltaJob {
            package: PackageName::from_str("com.example.ok").unwrap(),
            base_version: VersionCode(1),
            target_version: VersionCode(2),
            base_apk_path: other_base,
            target_apk_path: other_target,
            output_path: dir.path().join("ok-delta.gz"),
        };

        let pool = DeltaPool::new(Some(2), Arc::new(QbsdiffGzCodec)).unwrap();
        let results = pool.run(vec![vec![job], vec![ok_job]]);

        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
