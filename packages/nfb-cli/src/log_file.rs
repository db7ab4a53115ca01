// Session log file
//
// Drains the `QueueLogger` queue into `<data_path>/nfb-session-<timestamp>.log`
// on a background thread. Records logged before the file is opened stay in
// the queue and are written first.

use crossbeam::channel::{self, Receiver, Sender};
use nfb_rs::LogEntry;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

pub struct SessionLogFile {
    path: PathBuf,
    shutdown: Sender<()>,
    handle: JoinHandle<io::Result<u64>>,
}

impl SessionLogFile {
    /// Create the log file in `dir` and start writing `entries` to it
    pub fn start(dir: &Path, entries: Receiver<LogEntry>) -> io::Result<Self> {
        let path = dir.join(format!(
            "nfb-session-{}.log",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));
        let file = File::create(&path)?;
        let (shutdown, stop) = channel::bounded(1);

        let handle = thread::Builder::new()
            .name("session-log".to_string())
            .spawn(move || write_entries(BufWriter::new(file), entries, stop))?;

        Ok(Self {
            path,
            shutdown,
            handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write whatever is still queued and close the file
    pub fn finish(self) -> io::Result<u64> {
        let _ = self.shutdown.send(());
        self.handle
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("session log writer panicked")))
    }
}

fn write_entries<W: Write>(
    mut out: W,
    entries: Receiver<LogEntry>,
    stop: Receiver<()>,
) -> io::Result<u64> {
    let mut written = 0;
    loop {
        channel::select! {
            recv(entries) -> entry => match entry {
                Ok(entry) => {
                    writeln!(out, "{}", entry)?;
                    written += 1;
                }
                Err(_) => break,
            },
            recv(stop) -> _ => {
                for entry in entries.try_iter() {
                    writeln!(out, "{}", entry)?;
                    written += 1;
                }
                break;
            }
        }
    }
    out.flush()?;
    Ok(written)
}
