// CLI definitions using clap

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keepkey")]
#[command(author, version, about = "KeepKey / Trezor One hardware wallet client")]
#[command(propagate_version = true)]
pub struct Cli {
    /// More logging (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Client config file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Give up waiting for the device after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List attached wallets
    #[command(visible_alias = "ls")]
    List,

    /// Wipe the first attached wallet (confirm on the device)
    Wipe,

    /// Print the device features as JSON
    #[command(visible_aliases = ["feat", "f"])]
    Features,

    /// Round-trip a Ping through the device
    Ping {
        /// Text the device echoes back
        #[arg(default_value = "ping")]
        text: String,
    },

    /// Print connect/disconnect notifications and device messages until Ctrl-C
    Watch,

    /// Erase and flash a firmware image (device must be in bootloader mode)
    #[command(visible_alias = "fw")]
    Firmware {
        /// Firmware image file
        file: PathBuf,
        /// Skip the erase step
        #[arg(long)]
        no_erase: bool,
    },
}
