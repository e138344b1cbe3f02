use std::path::PathBuf;

use clap::{Parser, Subcommand};
use forms::Mode;

#[derive(Parser)]
#[command(name = "forms_inspect", version, about = "Inspect forms against a schema description")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Mount a form with a value and validate it (exit code 1 when invalid)
    Check {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        value: Option<PathBuf>,
        /// create, update or search (defaults to the configured mode)
        #[arg(long)]
        mode: Option<Mode>,
        /// Edit applied after mounting, e.g. `address.city="Kiel"` (repeatable)
        #[arg(long = "set", value_name = "PATH=VALUE")]
        edits: Vec<String>,
    },
    /// Print what an update form would submit for `value` edited from `original`
    Diff {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        original: PathBuf,
        #[arg(long)]
        value: PathBuf,
    },
    /// Print the resolved widget layout
    Widgets {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        mode: Option<Mode>,
    },
}
