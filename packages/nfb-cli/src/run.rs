use crate::cli::Cli;
use crate::console;
use crate::exit_codes;
use crate::log_file::SessionLogFile;
use crate::output;
use crate::summary::{ChannelSummary, RmsSummary};
use crossbeam::channel::Receiver;
use nfb_rs::stream::RetryPolicy;
use nfb_rs::{
    create_backend, operator_channel, ControlGate, GateState, LogEntry, Session, SessionConfig,
    SessionOutcome,
};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Serialize)]
struct SessionReport {
    config: String,
    outcome: SessionOutcome,
    channels: ChannelSummary,
    log_file: Option<String>,
}

fn prompt_config_path<R: BufRead>(input: &mut R) -> Result<PathBuf, String> {
    eprint!("Configuration file: ");
    let _ = io::stderr().flush();

    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|e| format!("Failed to read configuration path: {}", e))?;

    let path = line.trim();
    if path.is_empty() {
        return Err("No configuration file given".to_string());
    }
    Ok(PathBuf::from(path))
}

pub fn execute(args: Cli, log_entries: Receiver<LogEntry>) -> i32 {
    let config_path = match args.config.clone() {
        Some(path) => path,
        None => match prompt_config_path(&mut io::stdin().lock()) {
            Ok(path) => path,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return exit_codes::CONFIG_ERROR;
            }
        },
    };

    let config = match SessionConfig::from_path(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    if args.validate {
        return validate(&args, &config_path, &config);
    }

    let retry_delay = match Duration::try_from_secs_f64(args.retry_delay) {
        Ok(delay) => delay,
        Err(_) => {
            eprintln!(
                "Error: --retry-delay must be a non-negative number of seconds, got {}",
                args.retry_delay
            );
            return exit_codes::CONFIG_ERROR;
        }
    };

    let log_file = if args.no_log_file {
        drop(log_entries);
        None
    } else {
        match config
            .ensure_data_path()
            .map_err(|e| e.to_string())
            .and_then(|dir| SessionLogFile::start(dir, log_entries).map_err(|e| e.to_string()))
        {
            Ok(log_file) => {
                log::info!("Writing session log to {}", log_file.path().display());
                Some(log_file)
            }
            Err(e) => {
                log::warn!("Session log file disabled: {}", e);
                None
            }
        }
    };

    let pool = match config.thread_pool() {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };

    let gate = ControlGate::new(if args.interactive {
        GateState::Wait
    } else {
        GateState::Run
    });

    let mut session = Session::new(&config, gate.clone(), create_backend(&config.source))
        .with_retry(RetryPolicy {
            attempts: args.discovery_retries.max(1),
            delay: retry_delay,
        });

    if args.interactive {
        let (link, panel) = operator_channel();
        if let Err(e) = console::spawn(io::BufReader::new(io::stdin()), gate.clone(), panel) {
            eprintln!("Error: cannot start operator console: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
        eprintln!("Type `start` to begin, `wait` to pause, `stop` to end the session");
        session = session.with_operator(link);
    }

    let mut processor = RmsSummary::new(pool);
    let result = session.run(&mut processor);

    let log_path = log_file
        .as_ref()
        .map(|log_file| log_file.path().display().to_string());

    let exit_code = match result {
        Ok(outcome) => {
            let code = outcome.exit_code();
            let report = SessionReport {
                config: config_path.display().to_string(),
                outcome,
                channels: processor.into_summary(),
                log_file: log_path,
            };
            match print_report(&args, &report) {
                Ok(()) => code,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit_codes::EXECUTION_ERROR
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::for_error(&e)
        }
    };

    if let Some(log_file) = log_file {
        if let Err(e) = log_file.finish() {
            eprintln!("Warning: session log is incomplete: {}", e);
        }
    }

    exit_code
}

fn print_report(args: &Cli, report: &SessionReport) -> Result<(), String> {
    if args.json {
        return output::write_json(report, args.compact, args.output.as_deref());
    }

    match &report.outcome {
        SessionOutcome::Completed(loop_report) => println!(
            "Session ended ({:?}) after {:.2}s: {} windows processed, {} stale, {} empty pulls",
            loop_report.termination,
            loop_report.elapsed_seconds,
            loop_report.accepted_windows,
            loop_report.stale_windows,
            loop_report.missing_data
        ),
        SessionOutcome::Aborted { reason } => println!("Session aborted: {}", reason),
    }
    Ok(())
}

fn validate(args: &Cli, path: &std::path::Path, config: &SessionConfig) -> i32 {
    if args.json {
        if let Err(e) = output::write_json(config, args.compact, args.output.as_deref()) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!(
            "Configuration '{}' is valid (window {}s, buffer {}s, interval {}s, session {}s)",
            path.display(),
            config.window_size_seconds,
            config.buffer_size_seconds,
            config.timer_sleep_seconds,
            config.global_time_seconds
        );
    }
    exit_codes::SUCCESS
}
