//! Command-line overrides for the INI configuration (C12).

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "chordring", about = "A Chord DHT node")]
pub struct Cli {
    /// Local bind hostname, overrides `[DHT] HOSTNAME`.
    #[arg(short = 'I', long = "host")]
    pub host: Option<String>,

    /// Local client-API port, overrides `[DHT] PORT`.
    #[arg(short = 'i', long = "port")]
    pub port: Option<u16>,

    /// Bootstrap peer hostname, overrides `[BOOTSTRAP] OVERLAY_HOSTNAME`.
    #[arg(short = 'B', long = "bootstrap-host")]
    pub bootstrap_host: Option<String>,

    /// Bootstrap peer port, overrides `[BOOTSTRAP] PORT`.
    #[arg(short = 'b', long = "bootstrap-port")]
    pub bootstrap_port: Option<u16>,

    /// Path to a PEM public key whose DER hash becomes this node's id.
    #[arg(short = 'h', long = "hostkey")]
    pub hostkey: Option<String>,

    /// Path to the INI config file.
    #[arg(short = 'c', long = "config", default_value = "config.ini")]
    pub config: String,

    /// Serve the debug dashboard (C13) on `port + 1`.
    #[arg(long = "dev-mode")]
    pub dev_mode: bool,
}
