//! Call-number allocation.
//!
//! The counter is read once at startup from the [`CounterSource`] (bounded
//! retry, then [`AllocatorUnavailable`]), then incremented in memory. Each
//! [`CallNumberAllocator::next`] consumes a number for good: there is no
//! rollback when the record later fails to be created. A counter already at
//! `u64::MAX` hands out nothing more ([`CounterExhausted`]).
//!
//! After every allocation the last value is written to a side file for humans.
//! That file is never read back.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::contract::CounterSource;
use crate::error::{AllocatorUnavailable, CounterExhausted};

/// Bounded retry for the startup counter fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// `<prefix><separator><n>`, e.g. `ZTK 43`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallNumberFormat {
    pub prefix: String,
    pub separator: String,
}

impl Default for CallNumberFormat {
    fn default() -> Self {
        Self {
            prefix: "ZTK".to_string(),
            separator: " ".to_string(),
        }
    }
}

impl CallNumberFormat {
    pub fn render(&self, value: u64) -> CallNumber {
        CallNumber(format!("{}{}{}", self.prefix, self.separator, value))
    }
}

/// A shelf mark handed out by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallNumber(String);

impl CallNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the last issued value, retrying transient failures with a fixed pause.
pub async fn fetch_last_issued(
    source: &dyn CounterSource,
    retry: &RetryPolicy,
) -> Result<u64, AllocatorUnavailable> {
    let attempts = retry.attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match source.fetch_last_issued().await {
            Ok(value) => {
                info!(value, attempt, "[ALLOCATOR] Fetched last issued call number");
                return Ok(value);
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "[ALLOCATOR] Counter fetch failed");
                last_error = e.to_string();
                if attempt < attempts {
                    tokio::time::sleep(retry.backoff()).await;
                }
            }
        }
    }
    Err(AllocatorUnavailable {
        attempts,
        last_error,
    })
}

/// Owns the in-memory counter for the whole run.
#[derive(Debug)]
pub struct CallNumberAllocator {
    format: CallNumberFormat,
    last_issued: u64,
    issued: u64,
    last_value_file: Option<PathBuf>,
}

impl CallNumberAllocator {
    pub fn new(last_issued: u64, format: CallNumberFormat, last_value_file: Option<PathBuf>) -> Self {
        Self {
            format,
            last_issued,
            issued: 0,
            last_value_file,
        }
    }

    /// Fetch the authoritative counter and build the allocator.
    pub async fn start(
        source: &dyn CounterSource,
        retry: &RetryPolicy,
        format: CallNumberFormat,
        last_value_file: Option<PathBuf>,
    ) -> Result<Self, AllocatorUnavailable> {
        let last = fetch_last_issued(source, retry).await?;
        Ok(Self::new(last, format, last_value_file))
    }

    /// Consume the next call number.
    pub fn next(&mut self) -> Result<CallNumber, CounterExhausted> {
        let Some(value) = self.last_issued.checked_add(1) else {
            error!(last_issued = self.last_issued, "[ALLOCATOR][ERROR] Counter exhausted");
            return Err(CounterExhausted {
                last_issued: self.last_issued,
            });
        };
        self.last_issued = value;
        self.issued += 1;
        let call_number = self.format.render(value);
        info!(call_number = %call_number, "[ALLOCATOR] Allocated call number");
        self.record_last_value();
        Ok(call_number)
    }

    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }

    /// Numbers consumed during this run.
    pub fn issued_count(&self) -> u64 {
        self.issued
    }

    fn record_last_value(&self) {
        let Some(path) = &self.last_value_file else {
            return;
        };
        if let Err(e) = std::fs::write(path, self.last_issued.to_string()) {
            warn!(path = %path.display(), error = %e, "[ALLOCATOR] Could not write last call number file");
        }
    }
}
