//! Command completion synchronization.
//!
//! Two device-side schemes are supported behind one blocking contract:
//!
//! * [`SyncMode::CompletionQuery`] appends a completion query (`*OPC?`) to the
//!   command and blocks on the single reply.
//! * [`SyncMode::StatusPolling`] arms the event status enable register,
//!   appends a completion trigger (`*OPC`) and polls the status byte until
//!   the operation-complete summary bit is set, or the timeout passes.
//!
//! The instrument side of the handshake lives in
//! [`Instrument::write_sync`](crate::Instrument::write_sync); this module
//! holds the configuration and the polling loop.

use core::fmt;
use core::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::{InvalidConfigurationSnafu, Result, SynchronizationTimeoutSnafu};

/// How to wait for a command to finish on the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum SyncMode {
    /// Fire and forget.
    #[default]
    None,
    /// Compound the command with a completion query and read the reply.
    CompletionQuery,
    /// Trigger completion reporting and poll the status byte.
    StatusPolling,
}

impl SyncMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncMode::None => "none",
            SyncMode::CompletionQuery => "completion-query",
            SyncMode::StatusPolling => "status-polling",
        }
    }
}

impl FromStr for SyncMode {
    type Err = crate::Error;

    /// Accepts `none`, `completion-query` and `status-polling`, and the older
    /// spellings `opc_query` and `stb_polling`. Anything else is rejected.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(SyncMode::None),
            "completion-query" | "opc_query" => Ok(SyncMode::CompletionQuery),
            "status-polling" | "stb_polling" => Ok(SyncMode::StatusPolling),
            other => InvalidConfigurationSnafu {
                message: format!(
                    "unknown synchronization mode {:?}, expected none, completion-query or status-polling",
                    other
                ),
            }
            .fail(),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default operation-complete summary bit (ESB) of the IEEE 488.2 status byte.
pub const DEFAULT_MASK: u8 = 0b0010_0000;

/// Timing and mask for status polling.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SyncParams {
    /// Total time allowed, measured from the start of the polling loop.
    pub timeout: Duration,
    /// Sleep between status byte reads.
    pub interval: Duration,
    /// Status bits that signal completion.
    pub mask: u8,
    /// Absolute point in time after which polling gives up, regardless of
    /// `timeout`.
    pub deadline: Option<Instant>,
}

impl Default for SyncParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            interval: Duration::from_millis(100),
            mask: DEFAULT_MASK,
            deadline: None,
        }
    }
}

impl SyncParams {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_mask(mut self, mask: u8) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// The device vocabulary of the completion handshakes. Defaults are the
/// IEEE 488.2 common commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCommands {
    /// Appended for [`SyncMode::CompletionQuery`].
    pub query_suffix: String,
    /// Appended for [`SyncMode::StatusPolling`].
    pub trigger_suffix: String,
    /// Enables operation-complete reporting in the event status register.
    pub enable_command: String,
    /// Reads back the enable register.
    pub enable_query: String,
    /// Reads (and clears) the event status register.
    pub event_status_query: String,
    /// Separates the payload from the completion reply.
    pub reply_separator: char,
}

impl Default for SyncCommands {
    fn default() -> Self {
        Self {
            query_suffix: ";*OPC?".to_string(),
            trigger_suffix: ";*OPC".to_string(),
            enable_command: "*ESE 1".to_string(),
            enable_query: "*ESE?".to_string(),
            event_status_query: "*ESR?".to_string(),
            reply_separator: ';',
        }
    }
}

impl SyncCommands {
    /// Payload of a completion query reply: everything before the first
    /// separator, e.g. `"3.14;1"` gives `"3.14"`.
    pub fn strip_completion<'a>(&self, reply: &'a str) -> &'a str {
        match reply.split_once(self.reply_separator) {
            Some((payload, _)) => payload,
            None => reply,
        }
    }
}

/// Poll `read_status` until `status & params.mask != 0`.
///
/// Each iteration reads the status byte, then sleeps `params.interval`
/// (cut short at the deadline), then checks. The loop fails with
/// [`Error::SynchronizationTimeout`](crate::Error::SynchronizationTimeout)
/// once more than `params.timeout` has elapsed since it started, or the
/// deadline has passed. Errors from `read_status` end the loop immediately.
pub fn poll_status<F>(mut read_status: F, params: &SyncParams) -> Result<u8>
where
    F: FnMut() -> Result<u8>,
{
    let start = Instant::now();
    loop {
        let status = read_status()?;
        let nap = match params.deadline {
            Some(deadline) => params
                .interval
                .min(deadline.saturating_duration_since(Instant::now())),
            None => params.interval,
        };
        thread::sleep(nap);
        let elapsed = start.elapsed();
        debug!(
            "Polling STB <timeout:{:?}, interval:{:?}, stb:{:#010b}, mask:{:#010b}, elapsed:{:?}>",
            params.timeout, params.interval, status, params.mask, elapsed
        );
        if status & params.mask != 0 {
            debug!("STB mask condition met");
            return Ok(status);
        }
        let past_deadline = params.deadline.map_or(false, |d| Instant::now() >= d);
        if elapsed > params.timeout || past_deadline {
            warn!("STB polling gave up after {:?}", elapsed);
            return SynchronizationTimeoutSnafu {
                elapsed,
                timeout: params.timeout,
            }
            .fail();
        }
    }
}
