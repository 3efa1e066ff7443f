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

//! Orchestration layer tying the lower crates together: insertion (C6),
//! static-file publishing (C7), validation (C8), and group operations
//! (C9), plus the shared metadata JSON shape and release-notes renderer.

pub mod groups;
pub mod insert;
pub mod metadata;
pub mod notes;
pub mod publish;
pub mod validate;

pub use groups::{add_to_group, create_group, delete_group, list_groups, remove_from_group};
pub use insert::{insert_apks, InsertOutcome, InsertReport};
pub use metadata::{DeltaInfo, ReleaseMetadata};
pub use notes::{MinifiedCommonmarkRenderer, ReleaseNotesRenderer};
pub use publish::publish;
pub use validate::{validate, validate_with_codec, ValidationIssue, ValidationReport};
