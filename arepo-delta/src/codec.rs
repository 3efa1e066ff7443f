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

// The delta algorithm itself is pluggable; the concrete bsdiff/bspatch
// implementation is out of scope for this engine (it only has to
// produce byte-identical output for identical inputs). The default
// implementation delegates to `qbsdiff`, matching the diff tooling
// other Android update-delivery tools in this pack use, with the
// result gzip-wrapped.

use std::io::{Read, Write};

use arepo_common::{ArepoError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

pub trait DeltaCodec: Send + Sync {
    /// Writes a gzip-wrapped patch transforming `base` into `target`.
    fn generate(&self, base: &[u8], target: &[u8], out: &mut dyn Write) -> Result<()>;

    /// Reads a gzip-wrapped patch from `delta` and applies it to `base`,
    /// writing the reconstructed target bytes to `out`.
    fn apply(&self, base: &[u8], delta: &mut dyn Read, out: &mut dyn Write) -> Result<()>;
}

/// Generates a patch from `base` to `target`, gzip-wrapping it unless
/// `gzip` is false. Used directly by `arepo-cli`'s standalone
/// `generate-delta`/`apply-delta` subcommands, which operate on
/// arbitrary files rather than catalog-managed packages and so bypass
/// [`DeltaCodec`] and its always-gzip contract.
pub fn generate_to(base: &[u8], target: &[u8], gzip: bool, out: &mut dyn Write) -> Result<()> {
    if gzip {
        QbsdiffGzCodec.generate(base, target, out)
    } else {
        qbsdiff::Bsdiff::new(base, target)
            .compare(out)
            .map_err(|e| ArepoError::InsertFailed(format!("bsdiff compare failed: {e}")))?;
        Ok(())
    }
}

/// Inverse of [`generate_to`].
pub fn apply_from(base: &[u8], delta: &mut dyn Read, gzip: bool, out: &mut dyn Write) -> Result<()> {
    if gzip {
        QbsdiffGzCodec.apply(base, delta, out)
    } else {
        let mut patch_bytes = Vec::new();
        delta
            .read_to_end(&mut patch_bytes)
            .map_err(|e| ArepoError::InvalidRepoState(format!("failed to read delta: {e}")))?;
        let patch = qbsdiff::Bspatch::new(&patch_bytes)
            .map_err(|e| ArepoError::InvalidRepoState(format!("delta is not a valid bspatch stream: {e}")))?;
        patch
            .apply(base, out)
            .map_err(|e| ArepoError::InvalidRepoState(format!("bspatch apply failed: {e}")))?;
        Ok(())
    }
}

pub struct QbsdiffGzCodec;

impl DeltaCodec for QbsdiffGzCodec {
    fn generate(&self, base: &[u8], target: &[u8], out: &mut dyn Write) -> Result<()> {
        let mut encoder = GzEncoder::new(out, Compression::default());
        qbsdiff::Bsdiff::new(base, target)
            .compare(&mut encoder)
            .map_err(|e| ArepoError::InsertFailed(format!("bsdiff compare failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| ArepoError::InsertFailed(format!("gzip finish failed: {e}")))?;
        Ok(())
    }

    fn apply(&self, base: &[u8], delta: &mut dyn Read, out: &mut dyn Write) -> Result<()> {
        let mut decoder = GzDecoder::new(delta);
        let mut patch_bytes = Vec::new();
        decoder
            .read_to_end(&mut patch_bytes)
            .map_err(|e| ArepoError::InvalidRepoState(format!("delta is not a valid gzip stream: {e}")))?;
        let patch = qbsdiff::Bspatch::new(&patch_bytes)
            .map_err(|e| ArepoError::InvalidRepoState(format!("delta is not a valid bspatch stream: {e}")))?;
        patch
            .apply(base, out)
            .map_err(|e| ArepoError::InvalidRepoState(format!("bspatch apply failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_generate_and_apply() {
        let base = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let target = b"the quick brown fox leaps over the lazy wolf".repeat(8);

        let codec = QbsdiffGzCodec;
        let mut delta = Vec::new();
        codec.generate(&base, &target, &mut delta).unwrap();

        let mut reconstructed = Vec::new();
        codec.apply(&base, &mut delta.as_slice(), &mut reconstructed).unwrap();

        assert_eq!(reconstructed, target);
    }
}
