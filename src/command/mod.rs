//! One AT command in flight: transmission, retries and response matching.

pub mod responses;

use embassy_time::{Duration, Instant};
use embedded_io::Write;
use heapless::String;

use crate::error::Error;
use crate::framer::Framer;
use crate::module_timing::send_blocked_timeout;

/// Longest single command line, sized for an inline hex encoded upload.
pub const COMMAND_CAPACITY: usize = 2048;

pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Where the sub-machine that owns the current state stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    SendingCommand,
    WaitingResponse,
    GoodResponse,
    /// Expired without the expected response
    BadResponse,
    /// The wrong-response marker was received
    ErrorResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Failure {
    Timeout,
    WrongResponse,
    Io(Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Payload {
    Text(String<COMMAND_CAPACITY>),
    /// The raw pending upload buffer
    Upload,
    /// Nothing is sent, only the response is awaited
    Nothing,
}

#[derive(Debug, Clone)]
pub(crate) struct Transaction {
    payload: Payload,
    expected: &'static str,
    wrong: Option<&'static str>,
    max_wait: Duration,
    retry_interval: Option<Duration>,
    force: bool,
    tolerate_error: bool,

    attempts: u8,
    queued_at: Instant,
    unsent: bool,
    force_next: bool,
    retry_at: Option<Instant>,
    expires_at: Instant,
}

impl Transaction {
    fn new(payload: Payload) -> Self {
        Self {
            payload,
            expected: "OK",
            wrong: Some("ERROR"),
            max_wait: DEFAULT_MAX_WAIT,
            retry_interval: None,
            force: false,
            tolerate_error: false,
            attempts: 0,
            queued_at: Instant::from_ticks(0),
            unsent: false,
            force_next: false,
            retry_at: None,
            expires_at: Instant::from_ticks(0),
        }
    }

    pub fn text(command: String<COMMAND_CAPACITY>) -> Self {
        Self::new(Payload::Text(command))
    }

    /// A fixed command line, e.g. `"AT+CSQ\r"`.
    pub fn command(command: &str) -> Self {
        let mut text = String::new();
        // Static commands are far below the capacity
        text.push_str(command).ok();
        Self::text(text)
    }

    pub fn upload() -> Self {
        Self::new(Payload::Upload)
    }

    /// Wait for `expected` without transmitting anything.
    pub fn wait_for(expected: &'static str) -> Self {
        Self::new(Payload::Nothing).expecting(expected)
    }

    pub fn expecting(mut self, expected: &'static str) -> Self {
        self.expected = expected;
        self
    }

    pub fn failing_on(mut self, wrong: Option<&'static str>) -> Self {
        self.wrong = wrong;
        self
    }

    pub fn timeout(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn retry_every(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    /// Send even if the previous command was never acknowledged
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// A wrong response is handed to the state instead of failing the session
    pub fn tolerant(mut self) -> Self {
        self.tolerate_error = true;
        self
    }

    pub fn expected(&self) -> &'static str {
        self.expected
    }

    pub fn tolerates_error(&self) -> bool {
        self.tolerate_error
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub(crate) fn expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub(crate) fn start(&mut self, now: Instant) {
        self.attempts = 0;
        self.queued_at = now;
        self.unsent = self.payload != Payload::Nothing;
        self.force_next = self.force;
        self.retry_at = None;
        self.expires_at = now + self.max_wait;
    }

    /// Drive the transaction. `Ok` once the expected response has arrived.
    pub(crate) fn poll<W: Write, const N: usize>(
        &mut self,
        framer: &mut Framer<W, N>,
        upload: &[u8],
        now: Instant,
    ) -> nb::Result<(), Failure> {
        if self.unsent {
            return self.transmit(framer, upload, now);
        }

        if framer.transaction_contains(self.expected) {
            return Ok(());
        }
        if let Some(wrong) = self.wrong {
            if framer.transaction_contains(wrong) {
                return Err(nb::Error::Other(Failure::WrongResponse));
            }
        }
        if now >= self.expires_at {
            return Err(nb::Error::Other(Failure::Timeout));
        }
        if let Some(retry_at) = self.retry_at {
            if now >= retry_at && self.payload != Payload::Nothing {
                debug!("Retrying command, attempt {}", self.attempts + 1);
                self.unsent = true;
                self.force_next = true;
                self.queued_at = now;
                return self.transmit(framer, upload, now);
            }
        }
        Err(nb::Error::WouldBlock)
    }

    fn transmit<W: Write, const N: usize>(
        &mut self,
        framer: &mut Framer<W, N>,
        upload: &[u8],
        now: Instant,
    ) -> nb::Result<(), Failure> {
        let blocked_too_long = now.saturating_duration_since(self.queued_at) >= send_blocked_timeout();
        if blocked_too_long && !self.force_next {
            warn!("No OK seen for the previous command, forcing the next one out");
        }
        let force = self.force_next || blocked_too_long;

        let bytes = match &self.payload {
            Payload::Text(text) => text.as_bytes(),
            Payload::Upload => upload,
            Payload::Nothing => &[],
        };

        match framer.send_command(bytes, force) {
            Ok(()) => {
                self.unsent = false;
                self.attempts = self.attempts.saturating_add(1);
                self.retry_at = self.retry_interval.map(|interval| now + interval);
                Err(nb::Error::WouldBlock)
            }
            Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(e)) => Err(nb::Error::Other(Failure::Io(e))),
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new(Payload::Nothing)
    }
}
