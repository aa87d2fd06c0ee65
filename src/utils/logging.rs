use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::http::access_log::ACCESS_TARGET;

/// Installs the global subscriber: everything to stdout, access lines also
/// to `access-YYYY-MM-DD.log` files in `log_dir`, one file per local day.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(DailyFileWriter::new(log_dir, "access"));

    let access_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_filter(Targets::new().with_target(ACCESS_TARGET, Level::INFO));

    let stdout_layer = fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(access_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// Appends to `{prefix}-YYYY-MM-DD.log`, switching files when the date
/// changes.
pub struct DailyFileWriter {
    dir: PathBuf,
    prefix: String,
    current: Option<(NaiveDate, File)>,
}

impl DailyFileWriter {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            current: None,
        }
    }

    pub fn file_name(&self, date: NaiveDate) -> String {
        format!("{}-{}.log", self.prefix, date.format("%Y-%m-%d"))
    }

    fn write_dated(&mut self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        let open_for_date = matches!(&self.current, Some((day, _)) if *day == date);
        if !open_for_date {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(self.file_name(date)))?;
            self.current = Some((date, file));
        }
        match &mut self.current {
            Some((_, file)) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "log file not open")),
        }
    }
}

impl Write for DailyFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_dated(Local::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.current {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}
