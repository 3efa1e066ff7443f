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

// Argument surface, matching the documented CLI table exactly: one
// subcommand per repository operation, three global flags shared by
// all of them.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arepo", version, about = "Signed, content-addressed static APK repository engine")]
pub struct Cli {
    /// Repository root directory (default: current directory).
    #[arg(short = 'd', long = "dir", global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Verbose logging and full causal-chain error output.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Worker pool size for delta generation (default: available parallelism).
    #[arg(short = 'j', long = "jobs", global = true)]
    pub jobs: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Insert one or more APKs into the repository.
    Add {
        #[arg(short = 'k', long = "key")]
        key: PathBuf,
        #[arg(long)]
        skip_notes: bool,
        #[arg(required = true)]
        apks: Vec<PathBuf>,
    },
    /// Verify the whole repository against the catalog.
    Validate {
        #[arg(short = 'k', long = "key")]
        key: PathBuf,
    },
    /// Edit metadata for an already-inserted release.
    Edit {
        #[command(subcommand)]
        command: EditCommand,
    },
    /// Manage app groups.
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },
    /// Dump catalog contents.
    Info {
        #[command(subcommand)]
        command: InfoCommand,
    },
    /// Produce a standalone delta file (bypasses the catalog).
    GenerateDelta {
        #[arg(long)]
        no_gzip: bool,
        old: PathBuf,
        new: PathBuf,
        out: PathBuf,
    },
    /// Apply a standalone delta file (bypasses the catalog).
    ApplyDelta {
        #[arg(long)]
        no_gzip: bool,
        old: PathBuf,
        delta: PathBuf,
        out: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum EditCommand {
    ReleaseNotes(EditReleaseNotesArgs),
}

#[derive(Args)]
pub struct EditReleaseNotesArgs {
    #[arg(short = 'k', long = "key")]
    pub key: PathBuf,
    #[arg(long = "version-code")]
    pub version_code: Option<u64>,
    #[arg(long)]
    pub delete: bool,
    pub package: String,
}

#[derive(Subcommand)]
pub enum GroupCommand {
    Create(GroupMutationArgs),
    Add(GroupMutationArgs),
    Remove(GroupMutationArgs),
    Delete(GroupDeleteArgs),
    List,
}

#[derive(Args)]
pub struct GroupMutationArgs {
    #[arg(short = 'k', long = "key")]
    pub key: PathBuf,
    pub group_id: String,
    pub packages: Vec<String>,
}

#[derive(Args)]
pub struct GroupDeleteArgs {
    #[arg(short = 'k', long = "key")]
    pub key: PathBuf,
    pub group_id: String,
}

#[derive(Subcommand)]
pub enum InfoCommand {
    Groups,
    Packages,
}
