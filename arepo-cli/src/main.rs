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

use clap::Parser;

use arepo_common::ArepoError;

mod cli;
mod commands;

use cli::{Cli, Command};
use commands::Repo;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        if cli.verbose {
            let mut source = std::error::Error::source(&e);
            while let Some(s) = source {
                eprintln!("  caused by: {s}");
                source = s.source();
            }
        }
        std::process::exit(exit_code(&e));
    }
}

/// Every [`ArepoError::category`] maps to the same exit code today, per
/// the documented "exit 0 on success, 1 on any failure" contract; the
/// category is what distinguishes failures in the printed message, not
/// the exit status.
fn exit_code(_err: &ArepoError) -> i32 {
    1
}

fn run(cli: &Cli) -> arepo_common::Result<()> {
    match &cli.command {
        Command::GenerateDelta { no_gzip, old, new, out } => {
            return commands::generate_delta(old, new, out, !no_gzip);
        }
        Command::ApplyDelta { no_gzip, old, delta, out } => {
            return commands::apply_delta(old, delta, out, !no_gzip);
        }
        _ => {}
    }

    let repo = Repo::open(&cli.dir, cli.jobs)?;

    match &cli.command {
        Command::Add { key, skip_notes, apks } => commands::add(&repo, key, *skip_notes, apks),
        Command::Validate { key } => commands::validate(&repo, key),
        Command::Edit { command } => commands::edit(&repo, command),
        Command::Group { command } => commands::group(&repo, command),
        Command::Info { command } => commands::info(&repo, command),
        Command::GenerateDelta { .. } | Command::ApplyDelta { .. } => unreachable!("handled above"),
    }
}
