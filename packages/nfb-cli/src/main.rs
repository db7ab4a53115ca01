use clap::Parser;
use log::LevelFilter;
use nfb_rs::QueueLogger;

mod cli;
mod console;
mod exit_codes;
mod log_file;
mod output;
mod run;
mod summary;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let console = env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .build();

    // The session log file always gets at least INFO
    let (logger, log_entries) = QueueLogger::new(log_level.max(LevelFilter::Info));
    if let Err(e) = logger.with_inner(Box::new(console)).install() {
        eprintln!("Warning: logging unavailable: {}", e);
    }

    let exit_code = run::execute(cli, log_entries);

    std::process::exit(exit_code);
}
