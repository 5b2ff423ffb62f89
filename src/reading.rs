use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub degrees: f64,
    pub time: DateTime<Local>,
}

/// Readings for one log period, in the order they were taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingLog {
    #[serde(rename = "Readings", default)]
    pub readings: Vec<Reading>,
}

impl ReadingLog {
    /// Parses a persisted log. A blank file is an empty log.
    pub fn from_slice(data: &[u8]) -> Result<ReadingLog, serde_json::Error> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(ReadingLog::default());
        }
        serde_json::from_slice(data)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn reading(degrees: f64, minute: u32) -> Reading {
        Reading {
            degrees,
            time: Local.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_round_trip_keeps_order() {
        let log = ReadingLog {
            readings: vec![reading(53.2, 0), reading(48.9, 15), reading(61.0, 30)],
        };

        let parsed = ReadingLog::from_slice(&log.to_vec().unwrap()).unwrap();

        assert_eq!(parsed, log);
        assert_eq!(parsed.last().map(|r| r.degrees), Some(61.0));
    }

    #[test]
    fn test_blank_file_is_empty_log() {
        assert_eq!(ReadingLog::from_slice(b"").unwrap(), ReadingLog::default());
        assert_eq!(ReadingLog::from_slice(b" \n").unwrap().len(), 0);
    }

    #[test]
    fn test_field_names() {
        let log = ReadingLog {
            readings: vec![reading(53.2, 0)],
        };
        let value: serde_json::Value = serde_json::from_slice(&log.to_vec().unwrap()).unwrap();

        let entry = &value["Readings"][0];
        assert_eq!(entry["degrees"], 53.2);
        assert!(entry["time"].is_string());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(ReadingLog::from_slice(b"not json").is_err());
        assert!(ReadingLog::from_slice(br#"{"Readings": 3}"#).is_err());
    }
}
