use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a source starts reading when a job starts without restored state.
///
/// Chosen once per job. A job resuming from a checkpoint ignores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StartupOptions {
    /// Snapshot the existing data, then stream changes from the snapshot point.
    #[default]
    Initial,
    /// Stream from the earliest change still retained by the source.
    EarliestOffset,
    /// Stream only changes made after the job starts.
    LatestOffset,
    /// Stream from an explicit position in the change log.
    SpecificOffset {
        file: Option<String>,
        position: Option<u64>,
    },
    /// Stream changes committed at or after the given epoch milliseconds.
    Timestamp { timestamp_ms: u64 },
}

/// Payload-free discriminant of [`StartupOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupMode {
    Initial,
    EarliestOffset,
    LatestOffset,
    SpecificOffset,
    Timestamp,
}

impl StartupOptions {
    pub fn mode(&self) -> StartupMode {
        match self {
            StartupOptions::Initial => StartupMode::Initial,
            StartupOptions::EarliestOffset => StartupMode::EarliestOffset,
            StartupOptions::LatestOffset => StartupMode::LatestOffset,
            StartupOptions::SpecificOffset { .. } => StartupMode::SpecificOffset,
            StartupOptions::Timestamp { .. } => StartupMode::Timestamp,
        }
    }

    /// Returns `true` when no snapshot phase runs before streaming.
    pub fn is_stream_only(&self) -> bool {
        self.mode() != StartupMode::Initial
    }
}

impl fmt::Display for StartupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StartupMode::Initial => "initial",
            StartupMode::EarliestOffset => "earliest_offset",
            StartupMode::LatestOffset => "latest_offset",
            StartupMode::SpecificOffset => "specific_offset",
            StartupMode::Timestamp => "timestamp",
        };

        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_initial_takes_a_snapshot() {
        assert!(!StartupOptions::Initial.is_stream_only());
        assert!(StartupOptions::LatestOffset.is_stream_only());
        assert!(StartupOptions::Timestamp { timestamp_ms: 1 }.is_stream_only());
    }

    #[test]
    fn test_deserialize_tagged() {
        let json = r#"{"mode": "timestamp", "timestamp_ms": 1700000000000}"#;
        let options: StartupOptions = serde_json::from_str(json).unwrap();

        assert_eq!(
            options,
            StartupOptions::Timestamp {
                timestamp_ms: 1_700_000_000_000
            }
        );
        assert_eq!(options.mode().to_string(), "timestamp");
    }
}
