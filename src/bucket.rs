// Bucket clock: maps timestamps to aligned time buckets per resolution.
// All math is in epoch milliseconds; boundaries are multiples of the
// resolution duration from the Unix epoch, so they are deterministic.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported rollup resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "5m")]
    FiveMinute,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

/// One aligned bucket: [start_ms, end_ms) at a given resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub resolution: Resolution,
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [
        Resolution::FiveMinute,
        Resolution::OneHour,
        Resolution::OneDay,
    ];

    pub fn secs(self) -> i64 {
        match self {
            Resolution::FiveMinute => 300,
            Resolution::OneHour => 3_600,
            Resolution::OneDay => 86_400,
        }
    }

    pub fn duration_ms(self) -> i64 {
        self.secs() * 1_000
    }

    /// Inverse of secs(), for rows read back from storage.
    pub fn from_secs(secs: i64) -> Option<Resolution> {
        match secs {
            300 => Some(Resolution::FiveMinute),
            3_600 => Some(Resolution::OneHour),
            86_400 => Some(Resolution::OneDay),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Resolution::FiveMinute => "5m",
            Resolution::OneHour => "1h",
            Resolution::OneDay => "1d",
        }
    }

    /// Floors ts_ms to the bucket boundary at or before it.
    pub fn aligned_start_ms(self, ts_ms: i64) -> i64 {
        ts_ms.div_euclid(self.duration_ms()) * self.duration_ms()
    }

    /// The unique bucket containing ts_ms.
    pub fn bucket_for(self, ts_ms: i64) -> Bucket {
        let start_ms = self.aligned_start_ms(ts_ms);
        Bucket {
            resolution: self,
            start_ms,
            end_ms: start_ms + self.duration_ms(),
        }
    }

    /// The most recent bucket fully in the past at now_ms, i.e. the one a
    /// boundary trigger should aggregate.
    pub fn last_closed_bucket(self, now_ms: i64) -> Bucket {
        self.bucket_for(now_ms - self.duration_ms())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown resolution {0:?}; expected one of 5m, 1h, 1d")]
pub struct ParseResolutionError(String);

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "5m" | "5min" => Ok(Resolution::FiveMinute),
            "1h" | "hour" => Ok(Resolution::OneHour),
            "1d" | "24h" | "day" => Ok(Resolution::OneDay),
            _ => Err(ParseResolutionError(s.to_string())),
        }
    }
}
