use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};

use cellshard_core::config::ShapePolicy;

#[derive(Copy, Clone, Eq, PartialEq, ValueEnum, Debug)]
pub enum StoreOpt {
    /// In-process partitioned store
    Memory,
    /// MySQL procedures (requires the `mysql` feature)
    Mysql,
}

#[derive(Copy, Clone, Eq, PartialEq, ValueEnum, Debug)]
pub enum ShapeOpt {
    Pad,
    Reject,
}

impl From<ShapeOpt> for ShapePolicy {
    fn from(opt: ShapeOpt) -> Self {
        match opt {
            ShapeOpt::Pad => ShapePolicy::Pad,
            ShapeOpt::Reject => ShapePolicy::Reject,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "run-batch",
    version,
    about = "Encrypt and distribute a JSON row file across partitioned storage",
    disable_help_subcommand = true
)]
pub struct Args {
    /// JSON array of row objects (or row arrays)
    #[arg(long, value_name = "PATH")]
    pub rows: PathBuf,

    /// Worker budget (env: CELLSHARD_CONCURRENCY; default from CPU and memory)
    #[arg(long, value_name = "N", env = "CELLSHARD_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Encrypt cells before distributing
    #[arg(
        long,
        value_name = "BOOL",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub encrypt: bool,

    /// Exchange directory for chunk artifacts (env: CELLSHARD_EXCHANGE_DIR)
    #[arg(long, value_name = "DIR", env = "CELLSHARD_EXCHANGE_DIR")]
    pub exchange_dir: Option<PathBuf>,

    /// Storage backend
    #[arg(long, value_enum, default_value_t = StoreOpt::Memory)]
    pub store: StoreOpt,

    /// After saving, read everything back and export it (.csv or .json)
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Rows whose keys disagree with the first row
    #[arg(long, value_enum, default_value_t = ShapeOpt::Pad)]
    pub shape: ShapeOpt,
}
