use camino::Utf8PathBuf;
use clap::Parser;
use zolcrypt_config::{Action, UnsupportedActionError};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    /// The state to bring the storage stack to: create, open or close
    #[arg(value_parser = parse_action)]
    pub action: Action,

    /// The path to the zolcrypt.toml config file
    pub config_file: Utf8PathBuf,

    /// When creating, reformat devices and rebuild the pool even if they already exist
    #[arg(short, long)]
    pub force: bool,

    /// Log the operations that would be run, without running them
    #[arg(short, long)]
    pub simulate: bool,

    /// Increase logging verbosity level (0: info; 1: debug; 2: debug, pretty; 3: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_action(value: &str) -> Result<Action, UnsupportedActionError> {
    value.parse()
}
