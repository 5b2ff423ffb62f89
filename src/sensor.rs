use std::{num::ParseFloatError, process::ExitStatus};

use chrono::Local;
use thiserror::Error;
use tokio::process::Command;

use crate::reading::Reading;

/// Text the sensor command prints before the temperature.
pub const OUTPUT_PREFIX: &str = "temp=";
/// Marks the end of the numeric field, as in `temp=53.2'C`.
pub const UNIT_MARKER: char = '\'';

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Failed to run {0}: {1}")]
    Spawn(String, std::io::Error),

    #[error("{0} exited with {1}: {2}")]
    Status(String, ExitStatus, String),

    #[error("Unexpected sensor output: {0:?}")]
    Format(String),

    #[error("Invalid temperature {0:?}: {1}")]
    Parse(String, ParseFloatError),

    #[error("Invalid temperature {0:?}: not a finite number")]
    NotFinite(String),
}

/// Reads the temperature by running an external command.
#[derive(Debug, Clone)]
pub struct Sensor {
    program: String,
    args: Vec<String>,
}

impl Sensor {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Sensor {
        Sensor {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub async fn read(&self) -> Result<Reading, SensorError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SensorError::Spawn(self.program.clone(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SensorError::Status(self.program.clone(), output.status, stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let degrees = parse_temperature(&stdout)?;

        Ok(Reading {
            degrees,
            time: Local::now(),
        })
    }
}

pub fn parse_temperature(output: &str) -> Result<f64, SensorError> {
    let line = output.trim();
    let field = line
        .strip_prefix(OUTPUT_PREFIX)
        .ok_or_else(|| SensorError::Format(line.to_string()))?;
    let field = field.split(UNIT_MARKER).next().unwrap_or(field).trim();

    let degrees = field
        .parse::<f64>()
        .map_err(|e| SensorError::Parse(field.to_string(), e))?;
    if !degrees.is_finite() {
        return Err(SensorError::NotFinite(field.to_string()));
    }
    Ok(degrees)
}
