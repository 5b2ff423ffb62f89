use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use serde::Serialize;
use tokio::{sync::watch, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{reading::Reading, sensor::Sensor, store::ReadingStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerState {
    Running,
    Stopped,
}

/// Health of the sampling loop as seen by the HTTP side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerStatus {
    pub state: SamplerState,
    pub samples: u64,
    pub consecutive_failures: u32,
    pub last_reading: Option<Reading>,
    pub last_error: Option<String>,
}

impl Default for SamplerStatus {
    fn default() -> Self {
        SamplerStatus {
            state: SamplerState::Running,
            samples: 0,
            consecutive_failures: 0,
            last_reading: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub interval: Duration,
    pub retry_times: usize,
    pub retry_delay: Duration,
    /// 0 keeps sampling forever.
    pub max_failed_ticks: u32,
}

pub fn status_channel() -> (watch::Sender<SamplerStatus>, watch::Receiver<SamplerStatus>) {
    watch::channel(SamplerStatus::default())
}

/// Samples once immediately, then once per interval, until cancelled or
/// until too many ticks in a row have failed.
pub async fn sampling_loop(
    sensor: Sensor,
    mut store: ReadingStore,
    config: SamplerConfig,
    status: watch::Sender<SamplerStatus>,
    cancel_token: CancellationToken,
) {
    let retry_builder = ConstantBuilder::default()
        .with_delay(config.retry_delay)
        .with_max_times(config.retry_times);

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let result = (|| sensor.read())
                    .retry(retry_builder)
                    .sleep(tokio::time::sleep)
                    .notify(|e, dur| {
                        log::error!("{e}");
                        log::info!("Retrying in {:?}", dur);
                    })
                    .await
                    .map_err(|e| e.to_string())
                    .and_then(|reading| {
                        store.append(reading.clone());
                        store.save().map_err(|e| e.to_string())?;
                        Ok(reading)
                    });

                let stop = record(&status, result, config.max_failed_ticks);
                if stop {
                    log::error!("Giving up on sampling after {} failed ticks", config.max_failed_ticks);
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log::info!("Sampling loop shutting down");
                break;
            }
        }
    }

    status.send_modify(|s| s.state = SamplerState::Stopped);
}

/// Publishes the outcome of one tick. Returns true when the loop should stop.
fn record(
    status: &watch::Sender<SamplerStatus>,
    result: Result<Reading, String>,
    max_failed_ticks: u32,
) -> bool {
    let mut stop = false;
    status.send_modify(|s| match result {
        Ok(reading) => {
            log::info!("New reading: {}", reading.degrees);
            s.samples += 1;
            s.consecutive_failures = 0;
            s.last_reading = Some(reading);
            s.last_error = None;
        }
        Err(e) => {
            log::error!("Failed to take sample: {e}");
            s.consecutive_failures += 1;
            s.last_error = Some(e);
            stop = max_failed_ticks > 0 && s.consecutive_failures >= max_failed_ticks;
        }
    });
    stop
}

#[cfg(test)]
mod tests {
    use crate::{
        reading::ReadingLog,
        store::{LogFiles, Rotation},
    };

    use super::*;

    fn config(max_failed_ticks: u32) -> SamplerConfig {
        SamplerConfig {
            interval: Duration::from_millis(20),
            retry_times: 1,
            retry_delay: Duration::from_millis(1),
            max_failed_ticks,
        }
    }

    #[tokio::test]
    async fn test_samples_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), Rotation::Continuous);
        let store = ReadingStore::load(files.clone()).unwrap();
        let (tx, mut rx) = status_channel();
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(sampling_loop(
            Sensor::new("echo", ["temp=53.2'C"]),
            store,
            config(0),
            tx,
            cancel_token.clone(),
        ));

        rx.wait_for(|s| s.samples >= 3).await.unwrap();
        cancel_token.cancel();
        handle.await.unwrap();

        let status = rx.borrow().clone();
        assert_eq!(status.state, SamplerState::Stopped);
        assert_eq!(status.last_reading.map(|r| r.degrees), Some(53.2));

        let log = ReadingLog::from_slice(&files.read_raw().await.unwrap()).unwrap();
        assert!(log.len() >= 3);
        assert!(log.readings.iter().all(|r| r.degrees == 53.2));
    }

    #[tokio::test]
    async fn test_first_sample_is_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReadingStore::load(LogFiles::new(dir.path(), Rotation::Continuous)).unwrap();
        let (tx, mut rx) = status_channel();
        let cancel_token = CancellationToken::new();

        let mut slow = config(0);
        slow.interval = Duration::from_secs(3600);
        let handle = tokio::spawn(sampling_loop(
            Sensor::new("echo", ["temp=41.0'C"]),
            store,
            slow,
            tx,
            cancel_token.clone(),
        ));

        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.samples == 1))
            .await
            .unwrap()
            .unwrap();
        cancel_token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_after_failed_tick() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), Rotation::Continuous);
        let store = ReadingStore::load(files.clone()).unwrap();
        let (tx, rx) = status_channel();

        sampling_loop(
            Sensor::new("false", Vec::<String>::new()),
            store,
            config(1),
            tx,
            CancellationToken::new(),
        )
        .await;

        let status = rx.borrow().clone();
        assert_eq!(status.state, SamplerState::Stopped);
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(status.samples, 0);
        assert!(status.last_error.is_some());
        assert!(files.read_raw().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keeps_running_through_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReadingStore::load(LogFiles::new(dir.path(), Rotation::Continuous)).unwrap();
        let (tx, mut rx) = status_channel();
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(sampling_loop(
            Sensor::new("false", Vec::<String>::new()),
            store,
            config(0),
            tx,
            cancel_token.clone(),
        ));

        rx.wait_for(|s| s.consecutive_failures >= 3).await.unwrap();
        assert_eq!(rx.borrow().state, SamplerState::Running);
        cancel_token.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_record_success_resets_failures() {
        let (tx, rx) = status_channel();

        assert!(!record(&tx, Err("busy".to_string()), 3));
        assert!(!record(&tx, Err("busy".to_string()), 3));
        assert_eq!(rx.borrow().consecutive_failures, 2);

        let reading = Reading {
            degrees: 45.0,
            time: chrono::Local::now(),
        };
        assert!(!record(&tx, Ok(reading), 3));
        assert_eq!(rx.borrow().consecutive_failures, 0);
        assert_eq!(rx.borrow().samples, 1);
        assert!(rx.borrow().last_error.is_none());
    }
}
