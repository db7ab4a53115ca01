use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "nfb",
    version,
    about = "Real-time neurofeedback acquisition loop",
    long_about = "Run a real-time neurofeedback session: connect to an amplifier stream,\n\
                  pull fixed-length windows and process them at a bounded rate until\n\
                  stopped or until the session time elapses.\n\
                  The configuration file (JSON or YAML) is prompted for when not given."
)]
pub struct Cli {
    /// Session configuration file (.json, .yaml, .yml)
    #[arg(env = "NFB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Wait for a `start` command on stdin; `stop`, `wait` and `select N` are also accepted
    #[arg(long, default_value_t = false)]
    pub interactive: bool,

    /// Print the session report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Output file for the JSON report (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Discovery scans before giving up when no stream is found
    #[arg(long, default_value_t = 1)]
    pub discovery_retries: u32,

    /// Seconds between discovery scans
    #[arg(long, default_value_t = 1.0)]
    pub retry_delay: f64,

    /// Only load and validate the configuration
    #[arg(long, default_value_t = false)]
    pub validate: bool,

    /// Do not write a session log file into data_path
    #[arg(long, default_value_t = false)]
    pub no_log_file: bool,
}
