//! On-disk persistence for the reading log.
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike, Local, Month};
use clap::ValueEnum;
use thiserror::Error;

use crate::reading::{Reading, ReadingLog};

pub const FILE_STEM: &str = "temps";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error file {0}: {1}")]
    IoError(String, io::Error),

    #[error("JSON error file {0}: {1}")]
    JsonError(String, serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |e| StoreError::IoError(path.to_string_lossy().to_string(), e)
}

fn json_error(path: &Path) -> impl FnOnce(serde_json::Error) -> StoreError + '_ {
    move |e| StoreError::JsonError(path.to_string_lossy().to_string(), e)
}

/// How readings are split across files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Rotation {
    /// One file per calendar month; a new month starts a new log.
    #[default]
    Monthly,
    /// A single file that is never split.
    Continuous,
}

/// Calendar month a reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub year: i32,
    pub month: Month,
}

impl Period {
    pub fn of(date: &DateTime<Local>) -> Period {
        Period {
            year: date.year(),
            month: Month::try_from(date.month() as u8).unwrap_or(Month::January),
        }
    }
}

pub fn file_name(rotation: Rotation, period: Period) -> String {
    match rotation {
        Rotation::Monthly => format!(
            "{FILE_STEM}-{}-{}",
            period.month.name().to_lowercase(),
            period.year
        ),
        Rotation::Continuous => FILE_STEM.to_string(),
    }
}

/// Locates log files. Cheap to clone and shared with the HTTP side.
#[derive(Debug, Clone)]
pub struct LogFiles {
    dir: PathBuf,
    rotation: Rotation,
}

impl LogFiles {
    pub fn new(dir: impl Into<PathBuf>, rotation: Rotation) -> LogFiles {
        LogFiles {
            dir: dir.into(),
            rotation,
        }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn path_for(&self, period: Period) -> PathBuf {
        self.dir.join(file_name(self.rotation, period))
    }

    pub fn current_path(&self) -> PathBuf {
        self.path_for(Period::of(&Local::now()))
    }

    /// Raw contents of the current file, unvalidated.
    pub async fn read_raw(&self) -> Result<Vec<u8>, StoreError> {
        let path = self.current_path();
        tokio::fs::read(&path).await.map_err(io_error(&path))
    }
}

/// The in-memory log owned by the sampling loop.
#[derive(Debug)]
pub struct ReadingStore {
    files: LogFiles,
    period: Period,
    log: ReadingLog,
}

impl ReadingStore {
    /// Load the log for the current period, creating an empty file if there is none.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or created, or if it is not a valid log.
    pub fn load(files: LogFiles) -> Result<ReadingStore, StoreError> {
        let period = Period::of(&Local::now());
        let path = files.path_for(period);

        let log = match fs::read(&path) {
            Ok(data) => ReadingLog::from_slice(&data).map_err(json_error(&path))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No previous file, creating a new file: {}", path.display());
                create_empty(&path)?;
                ReadingLog::default()
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        Ok(ReadingStore { files, period, log })
    }

    pub fn log(&self) -> &ReadingLog {
        &self.log
    }

    pub fn append(&mut self, reading: Reading) {
        let period = Period::of(&reading.time);
        if self.files.rotation() == Rotation::Monthly && period != self.period {
            log::info!(
                "Starting new log for {} {} ({} readings kept in previous file)",
                period.month.name(),
                period.year,
                self.log.len()
            );
            self.log = ReadingLog::default();
            self.period = period;
        }
        self.log.readings.push(reading);
    }

    /// Overwrite the file of the log's period with the whole log.
    ///
    /// # Errors
    ///
    /// Fails if the log cannot be serialized or the file cannot be replaced.
    pub fn save(&self) -> Result<(), StoreError> {
        let path = self.files.path_for(self.period);
        let data = self.log.to_vec().map_err(json_error(&path))?;
        write_atomic(&path, &data)
    }
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.is_dir()
    {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    Ok(())
}

fn create_empty(path: &Path) -> Result<(), StoreError> {
    ensure_parent(path)?;
    fs::File::create(path).map_err(io_error(path))?;
    make_world_writable(path)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    ensure_parent(path)?;

    let tmp_file = path.with_extension("tmp");
    let file = fs::File::create(&tmp_file).map_err(io_error(&tmp_file))?;

    let mut writer = io::BufWriter::new(file);
    writer.write_all(data).map_err(io_error(&tmp_file))?;
    writer.flush().map_err(io_error(&tmp_file))?;
    drop(writer);

    make_world_writable(&tmp_file)?;
    fs::rename(&tmp_file, path).map_err(io_error(path))?;

    Ok(())
}

#[cfg(unix)]
fn make_world_writable(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o666)).map_err(io_error(path))
}

#[cfg(not(unix))]
fn make_world_writable(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}
