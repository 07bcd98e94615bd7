use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// The record of one executed request.
///
/// Built once by an executor (or by the runner when a request cannot even be
/// dispatched) and never changed afterwards; `with_failure` hands back a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub request_name: Arc<str>,
    pub success: bool,
    /// HTTP status or the closest protocol equivalent. `None` when the transport
    /// failed before a status was seen or the protocol has no status concept.
    pub status: Option<u16>,
    pub elapsed: Duration,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl RequestOutcome {
    #[must_use]
    pub fn success(
        request_name: Arc<str>,
        status: Option<u16>,
        elapsed: Duration,
        bytes_received: u64,
    ) -> Self {
        Self {
            request_name,
            success: true,
            status,
            elapsed,
            bytes_received,
            bytes_sent: 0,
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn failure(request_name: Arc<str>, elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            request_name,
            success: false,
            status: None,
            elapsed,
            bytes_received: 0,
            bytes_sent: 0,
            error: Some(error.into()),
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_bytes_sent(mut self, bytes_sent: u64) -> Self {
        self.bytes_sent = bytes_sent;
        self
    }

    /// Mark this outcome unsuccessful. Keeps timing and status so a failed
    /// assertion still reports what the transport saw.
    #[must_use]
    pub fn with_failure(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis().try_into().unwrap_or(u64::MAX)
    }
}
