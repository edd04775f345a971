// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The conturb binary.

use clap::{AppSettings, Parser, Subcommand};

use conturb::{setup_logging, GenerateArgs};

#[derive(Parser)]
#[clap(name = "conturb", about, version)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
struct Args {
    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv).
    #[clap(short, long, parse(from_occurrences), global = true)]
    verbosity: u8,

    /// Parse the arguments, then exit without doing any work.
    #[clap(long, global = true)]
    dry_run: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a turbulence box (constrained or unconstrained).
    Generate(GenerateArgs),
}

fn main() {
    let args = Args::parse();
    if setup_logging(args.verbosity).is_err() {
        eprintln!("Couldn't initialise the logger; continuing without one");
    }

    let result = match &args.command {
        Command::Generate(generate_args) => generate_args.run(args.dry_run),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
