use clap::Parser;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "displayd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Single-seat compositing display server", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/displayd.toml")]
    pub config: PathBuf,

    /// Pointer device path
    #[arg(short = 'm', long)]
    pub mouse: Option<PathBuf>,

    /// Listening socket path
    #[arg(short = 's', long)]
    pub socket: Option<PathBuf>,

    /// Keyboard TTY path
    #[arg(short = 't', long)]
    pub tty: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,

    /// Session command; with none given the displayrc chain runs instead
    #[arg(trailing_var_arg = true)]
    pub session: Vec<String>,
}

impl Args {
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        config::Config::load(&self.config)
    }
}
