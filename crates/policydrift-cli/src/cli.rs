use clap::{Parser, Subcommand};
use policydrift_kernel::MatchStrategy;

#[derive(Parser)]
#[command(
    name = "policydrift",
    about = "Policydrift: compare live access-control policies against a reference baseline",
    version
)]
pub struct Cli {
    /// Debug logging for every policydrift crate (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare a live snapshot with a reference baseline; exit code is the verdict
    Compare(CompareArgs),

    /// Print the canonical form of one value for a field path
    Normalize {
        /// Dot path of the field (e.g. grantControls.builtInControls)
        #[arg(long)]
        field: String,

        /// Raw value; parsed as JSON when possible, otherwise taken as text
        value: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the normalization tables and the default critical prefixes
    Tables {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct CompareArgs {
    /// Live snapshot file (JSON array, {"value": [...]} envelope, object or JSONL)
    #[arg(long)]
    pub live: String,

    /// Reference baseline file, or a directory of *.json files
    #[arg(long)]
    pub reference: String,

    /// TOML config file (default: ./policydrift.toml when present)
    #[arg(long)]
    pub config: Option<String>,

    /// Matching strategy: by-name, by-id or custom-mapping
    #[arg(long)]
    pub strategy: Option<MatchStrategy>,

    /// Match names case-sensitively
    #[arg(long, conflicts_with = "case_insensitive")]
    pub case_sensitive: bool,

    /// Match names case-insensitively, overriding the config file
    #[arg(long)]
    pub case_insensitive: bool,

    /// Custom mapping file (JSON array or JSONL of {referenceKey, liveKey})
    #[arg(long)]
    pub mapping: Option<String>,

    /// Path prefix whose changes are always critical (repeatable)
    #[arg(long = "fail-on")]
    pub fail_on: Vec<String>,

    /// Path prefix whose changes are dropped (repeatable)
    #[arg(long)]
    pub ignore: Vec<String>,

    /// Differing-policy count above which the run blocks
    #[arg(long)]
    pub max_differences: Option<usize>,

    /// Worker threads for per-policy diffing
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CompareArgs {
    /// Case sensitivity requested on the command line, if any.
    pub fn case_sensitivity(&self) -> Option<bool> {
        match (self.case_sensitive, self.case_insensitive) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }
}
