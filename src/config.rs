use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use log::LevelFilter;

use crate::store::Rotation;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Samples the board temperature and serves it over HTTP")]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "TEMP_LOGGER_LISTEN", default_value = "127.0.0.1:35000")]
    pub listen: SocketAddr,

    /// Seconds between samples.
    #[arg(long, env = "TEMP_LOGGER_INTERVAL", default_value_t = 15 * 60)]
    pub interval: u64,

    /// Command that prints the temperature, e.g. `temp=53.2'C`.
    #[arg(long, env = "TEMP_LOGGER_SENSOR_COMMAND", default_value = "/opt/vc/bin/vcgencmd")]
    pub sensor_command: String,

    #[arg(long = "sensor-arg", default_values_t = vec!["measure_temp".to_string()])]
    pub sensor_args: Vec<String>,

    /// Directory holding the log files.
    #[arg(long, env = "TEMP_LOGGER_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    #[arg(long, env = "TEMP_LOGGER_ROTATION", value_enum, default_value_t = Rotation::Monthly)]
    pub rotation: Rotation,

    /// Retries after a failed read before the tick counts as failed.
    #[arg(long, env = "TEMP_LOGGER_RETRY_TIMES", default_value_t = 3)]
    pub retry_times: usize,

    #[arg(long, env = "TEMP_LOGGER_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Stop sampling after this many consecutive failed ticks. 0 never stops.
    #[arg(long, env = "TEMP_LOGGER_MAX_FAILED_TICKS", default_value_t = 0)]
    pub max_failed_ticks: u32,

    /// Where `/` redirects to. Without it `/` is not found.
    #[arg(long, env = "TEMP_LOGGER_REDIRECT_URL")]
    pub redirect_url: Option<String>,

    #[arg(long, env = "TEMP_LOGGER_LOG_LEVEL", default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
}

impl Config {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
