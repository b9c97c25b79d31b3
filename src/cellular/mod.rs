//! The cellular engine: one polled state machine driving power, registration,
//! data session, HTTP transfers, cell scans and GNSS.
//!
//! [`Cellular::spin`] is called from the main loop with the current time. Each
//! call drains the UART receive queue, advances a power sequence if one is
//! running, settles the AT command in flight and then lets the active
//! sub-machine take one step.

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use embedded_io::Write;
use heapless::{String, Vec};

use crate::backoff::{
    Backoff, Schedule, DATA_SESSION_BACKOFF_MAX, DATA_SESSION_BACKOFF_START,
    HTTP_BACKOFF_TABLE, REGISTRATION_BACKOFF_START,
};
use crate::command::{Action, Failure, Transaction, COMMAND_CAPACITY};
use crate::config::{CellularConfig, Events, Policy};
use crate::error::Error;
use crate::fmt::LossyStr;
use crate::framer::{Framer, DEFAULT_BUFFER_SIZE};
use crate::gps::{GpsInfo, NmeaReceiver};
use crate::modules::{Generic, Module, ModuleParams as _, SimcomVersion};
use crate::power::{status_high, PowerControl, PowerEvent, PowerTimings};
use crate::registration::Status;
use crate::uart::RxQueue;
use crate::utilities::{CellsData, RssiData};

fn format_command(args: core::fmt::Arguments<'_>) -> String<COMMAND_CAPACITY> {
    let mut s = String::new();
    if s.write_fmt(args).is_err() {
        error!("Command does not fit in {} bytes", COMMAND_CAPACITY);
    }
    s
}

/// `at!("AT+CGDCONT=1,\"IP\",\"{}\"\r", apn)` builds a [`Transaction`].
macro_rules! at {
    ($($arg:tt)*) => {
        Transaction::text(format_command(format_args!($($arg)*)))
    };
}

mod cells;
mod data_session;
mod failure;
mod http;
mod info;
mod location;
mod warmup;


pub use cells::CellsState;
pub use data_session::DataSessionState;
pub use http::HttpState;
pub use info::InfoState;
pub use location::GpsState;
pub use warmup::WarmupState;

/// Largest payload accepted by [`Cellular::set_data_to_upload`]
pub const TX_BUFFER_SIZE: usize = 512;
/// Largest server answer kept for [`Cellular::read_downloaded_data`]
pub const DOWNLOAD_BUFFER_SIZE: usize = 1024;

const FIRMWARE_VERSION_LEN: usize = 32;

/// Top-level phase selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Idle,
    DataSession,
    Http,
    Cells,
    Gps,
}

/// Per power cycle state. Cleared on every power transition and failure.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub warmup_success: bool,
    pub info_success: bool,

    pub iccid: String<24>,
    pub imsi: String<16>,

    pub reg_status: Status,
    pub data_session_status: u8,
    pub data_session_attached_status: u8,

    pub https_set: bool,
    pub http_init: bool,
    pub http_context_saved: bool,
    pub http_connected: bool,

    pub total_size: usize,
    pub total_read_size: usize,
    pub last_read_size: usize,

    pub nbiot_configured: bool,
    pub hello_sent: bool,
    pub timer_3346_reported: bool,
    pub app_network_active: bool,
    pub session_open_tried: bool,
    pub http_retries: u8,
    pub http_status: u16,
    pub http_woke_for_cells: bool,

    pub registration_deadline: Option<Instant>,
    pub data_session_deadline: Option<Instant>,
    pub state_since: Option<Instant>,
    pub after_data_session: Option<Phase>,
}

/// Policy knobs copied out of the last [`Policy`]
#[derive(Debug)]
struct PolicySnapshot {
    remain_data_session_open: Duration,
    firmware_version: String<FIRMWARE_VERSION_LEN>,
    https: bool,
    gps: bool,
}

pub struct Cellular<
    'd,
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
    const Q: usize,
    const RX: usize = DEFAULT_BUFFER_SIZE,
> {
    config: C,
    events: E,
    rx_queue: &'d RxQueue<M, Q>,
    framer: Framer<W, RX>,

    phase: Phase,
    action: Action,
    transaction: Transaction,
    next_command_at: Option<Instant>,

    warmup: WarmupState,
    info: InfoState,
    data_session: DataSessionState,
    http: HttpState,
    cells: CellsState,
    gps: GpsState,

    power: PowerControl,
    powered_on: bool,
    psm_active: bool,
    session: Session,
    policy: PolicySnapshot,

    module: Option<Module>,
    imei: String<16>,
    rssi: RssiData,

    upload: Vec<u8, TX_BUFFER_SIZE>,
    upload_set_at: Option<Instant>,
    uploaded: bool,
    downloaded: Vec<u8, DOWNLOAD_BUFFER_SIZE>,
    download_available: bool,
    skip_downloaded: bool,

    cells_requested: bool,
    cells_data: CellsData,
    cells_available: bool,

    gps_requested: bool,
    gps_info: GpsInfo,
    gps_started_at: Option<Instant>,
    nmea: NmeaReceiver,

    registration_backoff: Backoff,
    data_session_backoff: Backoff,
    http_backoff: Backoff,

    psm_t3412: u8,
    psm_t3324: u8,
}

impl<'d, M, C, W, E, const Q: usize, const RX: usize> Cellular<'d, M, C, W, E, Q, RX>
where
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
{
    pub fn new(config: C, uart: W, events: E, rx_queue: &'d RxQueue<M, Q>) -> Self {
        Self {
            config,
            events,
            rx_queue,
            framer: Framer::new(uart),
            phase: Phase::Idle,
            action: Action::SendingCommand,
            transaction: Transaction::default(),
            next_command_at: None,
            warmup: WarmupState::Idle,
            info: InfoState::Idle,
            data_session: DataSessionState::Idle,
            http: HttpState::Idle,
            cells: CellsState::Idle,
            gps: GpsState::Idle,
            power: PowerControl::new(),
            powered_on: false,
            psm_active: false,
            session: Session::default(),
            policy: PolicySnapshot {
                remain_data_session_open: Duration::from_secs(60),
                firmware_version: String::new(),
                https: false,
                gps: false,
            },
            module: None,
            imei: String::new(),
            rssi: RssiData::default(),
            upload: Vec::new(),
            upload_set_at: None,
            uploaded: false,
            downloaded: Vec::new(),
            download_available: false,
            skip_downloaded: false,
            cells_requested: false,
            cells_data: CellsData::default(),
            cells_available: false,
            gps_requested: false,
            gps_info: GpsInfo::default(),
            gps_started_at: None,
            nmea: NmeaReceiver::new(),
            registration_backoff: Backoff::new(Schedule::Doubling {
                start: REGISTRATION_BACKOFF_START,
                max: Duration::from_secs(60 * 60),
            }),
            data_session_backoff: Backoff::new(Schedule::Doubling {
                start: DATA_SESSION_BACKOFF_START,
                max: DATA_SESSION_BACKOFF_MAX,
            }),
            http_backoff: Backoff::new(Schedule::Table(&HTTP_BACKOFF_TABLE)),
            psm_t3412: C::PSM_T3412,
            psm_t3324: C::PSM_T3324,
        }
    }

    /// Advance the engine. Call once per main loop iteration.
    ///
    /// Only GPIO and UART access failures are returned; everything the module
    /// does wrong is handled by power cycling it.
    pub fn spin(&mut self, now_ms: u64, policy: &Policy<'_>) -> Result<(), Error> {
        let now = Instant::from_millis(now_ms);
        self.apply_policy(policy);

        while let Some(byte) = self.rx_queue.pop() {
            self.framer.rx_new_char(byte);
        }

        if self.power.is_busy() {
            let timings = self.power_timings();
            if let Some(event) = self.power.step(&mut self.config, timings, now)? {
                self.on_power_event(event);
            }
            return Ok(());
        }

        if self.phase != Phase::Gps {
            self.log_responses();
        }

        if self.powered_on && self.psm_active && self.phase != Phase::Idle {
            if self.action == Action::SendingCommand && !status_high(&mut self.config)? {
                info!("Module asleep in PSM, waking it");
                self.power.start_wake(now);
                return Ok(());
            }
        }

        if self.powered_on
            && !self.psm_active
            && self.action == Action::WaitingResponse
            && !status_high(&mut self.config)?
        {
            warn!("STATUS low while waiting for a response");
            self.action = Action::BadResponse;
        }

        if self.action == Action::WaitingResponse {
            self.poll_transaction(now)?;
        }

        if self.failed() {
            self.handle_failure(now);
            return Ok(());
        }

        if self.action == Action::SendingCommand {
            if let Some(at) = self.next_command_at {
                if now < at {
                    return Ok(());
                }
            }
        }

        self.phase_machine(now);
        Ok(())
    }

    fn apply_policy(&mut self, policy: &Policy<'_>) {
        self.policy.remain_data_session_open = policy.remain_data_session_open;
        self.policy.https = policy.https;
        self.policy.gps = policy.gps;
        if self.policy.firmware_version.as_str() != policy.firmware_version {
            self.policy.firmware_version.clear();
            for c in policy.firmware_version.chars() {
                if self.policy.firmware_version.push(c).is_err() {
                    break;
                }
            }
        }
        self.registration_backoff
            .set_max(policy.registration_failed_next_try);
    }

    fn power_timings(&self) -> PowerTimings {
        match self.module {
            Some(module) => PowerTimings::of(module),
            None => PowerTimings::of(Generic),
        }
    }

    fn on_power_event(&mut self, event: PowerEvent) {
        match event {
            PowerEvent::PoweredOn => {
                self.powered_on = true;
                self.psm_active = false;
                self.framer.reset();
                self.reset_session();
            }
            PowerEvent::Woken => {
                self.powered_on = true;
                self.framer.reset();
                self.action = Action::SendingCommand;
            }
            PowerEvent::PoweredOff => {
                self.powered_on = false;
                self.psm_active = false;
                self.reset_session();
                self.phase = Phase::Idle;
            }
        }
    }

    /// Clear everything tied to one power cycle. Identity, the upload buffer
    /// and downloaded data survive.
    pub(crate) fn reset_session(&mut self) {
        self.session = Session::default();
        self.action = Action::SendingCommand;
        self.transaction = Transaction::default();
        self.next_command_at = None;
        self.warmup = WarmupState::Idle;
        self.info = InfoState::Idle;
        self.data_session = DataSessionState::Idle;
        self.http = HttpState::Idle;
        self.cells = CellsState::Idle;
        self.gps = GpsState::Idle;
    }

    fn log_responses(&mut self) {
        let mut buf = [0u8; 128];
        while self.framer.how_many_new_responses() > 0 {
            let n = self.framer.read_responses(&mut buf);
            if n == 0 {
                break;
            }
            trace!("UART RX: {:?}", LossyStr(&buf[..n]));
        }
    }

    fn poll_transaction(&mut self, now: Instant) -> Result<(), Error> {
        match self
            .transaction
            .poll(&mut self.framer, self.upload.as_slice(), now)
        {
            Ok(()) => self.action = Action::GoodResponse,
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(Failure::WrongResponse)) => {
                debug!("Wrong response to {:?}", self.transaction.expected());
                self.action = Action::ErrorResponse;
            }
            Err(nb::Error::Other(Failure::Timeout)) => {
                warn!(
                    "Timed out waiting for {:?} after {} attempts",
                    self.transaction.expected(),
                    self.transaction.attempts()
                );
                self.action = Action::BadResponse;
            }
            Err(nb::Error::Other(Failure::Io(e))) => return Err(e),
        }
        Ok(())
    }

    fn failed(&self) -> bool {
        match self.action {
            Action::BadResponse => true,
            Action::ErrorResponse => !self.transaction.tolerates_error(),
            _ => false,
        }
    }

    fn phase_machine(&mut self, now: Instant) {
        if !matches!(self.phase, Phase::Idle | Phase::Gps) {
            if !self.session.warmup_success {
                self.warmup_machine(now);
                return;
            }
            if !self.session.info_success {
                self.info_machine(now);
                return;
            }
        }

        match self.phase {
            Phase::Idle => self.idle_phase(now),
            Phase::DataSession => self.data_session_machine(now),
            Phase::Http => self.http_machine(now),
            Phase::Cells => self.cells_machine(now),
            Phase::Gps => self.gps_machine(now),
        }
    }

    fn idle_phase(&mut self, now: Instant) {
        let upload_pending = self.has_data_to_upload() && !self.upload_backoff_running(now);
        let gps_pending = self.gps_requested && self.policy.gps;
        // Cell scans are one-shot requests, registration backoff does not gate them
        let cells_pending = self.cells_requested;

        if !self.powered_on {
            if upload_pending || gps_pending || cells_pending {
                info!(
                    "Powering on for upload: {}, cells: {}, gps: {}",
                    upload_pending, cells_pending, gps_pending
                );
                self.power.start_power_on(now);
            }
            return;
        }

        if gps_pending && self.module.map_or(true, |m| m.has_gps()) {
            self.enter_phase(Phase::Gps);
        } else if cells_pending {
            self.enter_phase(Phase::Cells);
        } else if upload_pending {
            self.enter_phase(Phase::DataSession);
        } else if gps_pending {
            warn!("GPS requested but the module has no GNSS receiver");
            self.gps_requested = false;
        } else if !self.psm_active {
            info!("Nothing left to do, powering off");
            self.power.start_power_off(now);
        }
    }

    pub(crate) fn enter_phase(&mut self, phase: Phase) {
        debug!("Phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.action = Action::SendingCommand;
        self.next_command_at = None;
    }

    fn upload_backoff_running(&self, now: Instant) -> bool {
        self.registration_backoff.is_running(now)
            || self.data_session_backoff.is_running(now)
            || self.http_backoff.is_running(now)
    }

    /// Issue a command; the response is awaited on the following ticks.
    pub(crate) fn send(&mut self, now: Instant, mut transaction: Transaction) {
        transaction.start(now);
        self.transaction = transaction;
        self.action = Action::WaitingResponse;
        self.next_command_at = None;
    }

    /// Let the current state send its command on the next tick, optionally
    /// not before `delay` has passed.
    pub(crate) fn next_command(&mut self, now: Instant, delay: Option<Duration>) {
        self.action = Action::SendingCommand;
        self.next_command_at = delay.map(|d| now + d);
    }

    /// The expected marker arrived but the data behind it is still incomplete.
    pub(crate) fn keep_waiting(&mut self, now: Instant) {
        if self.transaction.expired(now) {
            warn!("Response stayed incomplete");
            self.action = Action::BadResponse;
        } else {
            self.action = Action::WaitingResponse;
        }
    }

    /// Received bytes of the current transaction starting at `from`, or the
    /// whole transaction for an empty `from`.
    pub(crate) fn response(&self, from: &str) -> Vec<u8, RX> {
        self.framer
            .last_completed_transaction(from)
            .unwrap_or_default()
    }

    /// The identified module. Fails the session if `AT+GMR` has not run yet.
    pub(crate) fn require_module(&mut self) -> Option<Module> {
        if self.module.is_none() {
            error!("Module family unknown");
            self.action = Action::BadResponse;
        }
        self.module
    }

    pub(crate) fn home_network(&self) -> Option<(u16, u16)> {
        crate::utilities::apn::mcc_mnc_from_imsi(&self.session.imsi)
    }

    fn complete_upload(&mut self) {
        self.upload.clear();
        self.upload_set_at = None;
        self.uploaded = true;
        self.session.http_retries = 0;
        self.download_available = !self.downloaded.is_empty();
    }

    fn drop_upload(&mut self) {
        warn!("Giving up on the pending upload");
        self.upload.clear();
        self.upload_set_at = None;
        self.downloaded.clear();
        self.session.http_retries = 0;
    }

    // Upstream API

    /// Queue `data` for upload. Only one payload can be pending at a time.
    pub fn set_data_to_upload(&mut self, data: &[u8], now_ms: u64) -> Result<(), Error> {
        if data.len() > TX_BUFFER_SIZE {
            return Err(Error::UploadTooLarge);
        }
        if !self.upload.is_empty() {
            return Err(Error::Busy);
        }
        self.upload = Vec::from_slice(data).map_err(|_| Error::UploadTooLarge)?;
        self.upload_set_at = Some(Instant::from_millis(now_ms));
        self.uploaded = false;
        Ok(())
    }

    pub fn has_data_to_upload(&self) -> bool {
        !self.upload.is_empty()
    }

    /// Whether a new payload would be accepted and could be sent right away
    pub fn is_time_to_set_data_to_upload(&self, now_ms: u64) -> bool {
        self.upload.is_empty() && !self.upload_backoff_running(Instant::from_millis(now_ms))
    }

    /// `true` once after each successful upload.
    pub fn data_successfully_uploaded(&mut self) -> bool {
        core::mem::take(&mut self.uploaded)
    }

    pub fn has_downloaded_data(&self) -> bool {
        self.download_available
    }

    /// Copy the server answer into `out` and release it.
    ///
    /// Fails with [`Error::BufferTooSmall`] if the answer does not fit; it is
    /// kept for another attempt.
    pub fn read_downloaded_data(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        if !self.download_available {
            return Ok(0);
        }
        let n = self.downloaded.len();
        if out.len() < n {
            return Err(Error::BufferTooSmall);
        }
        out[..n].copy_from_slice(&self.downloaded);
        self.downloaded.clear();
        self.download_available = false;
        Ok(n)
    }

    pub fn set_skip_downloaded_data(&mut self, skip: bool) {
        self.skip_downloaded = skip;
    }

    pub fn imei(&self) -> Option<&str> {
        (!self.imei.is_empty()).then_some(self.imei.as_str())
    }

    pub fn is_powered_on(&self) -> bool {
        self.powered_on
    }

    pub fn simcom_version(&self) -> Option<SimcomVersion> {
        self.module.map(|m| m.version())
    }

    pub fn rssi_data(&self) -> &RssiData {
        &self.rssi
    }

    pub fn collect_cells(&mut self) {
        self.cells_requested = true;
    }

    pub fn has_cells_data(&self) -> bool {
        self.cells_available
    }

    pub fn read_cells_data(&mut self) -> Option<CellsData> {
        if !self.cells_available {
            return None;
        }
        self.cells_available = false;
        Some(self.cells_data.clone())
    }

    pub fn start_collecting_gps(&mut self) {
        self.gps_requested = true;
    }

    pub fn stop_collecting_gps(&mut self) {
        self.gps_requested = false;
    }

    pub fn gps_info(&self) -> &GpsInfo {
        &self.gps_info
    }

    /// `false` while any failure class is in a failure streak
    pub fn current_communication_status(&self) -> bool {
        self.registration_backoff.healthy()
            && self.data_session_backoff.healthy()
            && self.http_backoff.healthy()
    }

    pub fn registration_failed_next_try_timeout(&self) -> Duration {
        self.registration_backoff.next_try_timeout()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn warmup_state(&self) -> WarmupState {
        self.warmup
    }

    pub fn psm_active(&self) -> bool {
        self.psm_active
    }

    /// Set the `AT+CPSMS` timer values used by the next warm-up.
    ///
    /// Values are raw 3GPP timer bytes (unit in bits 7..5, value in 4..0).
    pub fn set_psm_parameters(&mut self, t3412: u8, t3324: u8) -> Result<(), Error> {
        // Only zero is rejected, unit bits pass through unchecked. Kept as deployed.
        if t3412 == 0 || t3324 == 0 {
            return Err(Error::Parse);
        }
        self.psm_t3412 = t3412;
        self.psm_t3324 = t3324;
        Ok(())
    }

    pub fn print_current_internal_state(&self) {
        info!(
            "phase: {:?}, action: {:?}, powered: {}, psm: {}",
            self.phase, self.action, self.powered_on, self.psm_active
        );
        info!(
            "warmup: {:?}, info: {:?}, data session: {:?}, http: {:?}, cells: {:?}, gps: {:?}",
            self.warmup, self.info, self.data_session, self.http, self.cells, self.gps
        );
        info!(
            "warmup ok: {}, info ok: {}, reg: {:?}, module: {:?}",
            self.session.warmup_success,
            self.session.info_success,
            self.session.reg_status,
            self.simcom_version()
        );
        info!(
            "backoff failures reg/data/http: {}/{}/{}, upload pending: {}",
            self.registration_backoff.failures(),
            self.data_session_backoff.failures(),
            self.http_backoff.failures(),
            self.has_data_to_upload()
        );
    }
}

/// Longest valid UTF-8 prefix of a response.
pub(crate) fn text(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
    }
}

/// First line of `text` consisting only of `len` alphanumerics, with an
/// optional `+XXX: ` prefix. Used for IMEI, IMSI and ICCID.
pub(crate) fn identifier_line(text: &str, len: core::ops::RangeInclusive<usize>) -> Option<&str> {
    text.split(['\r', '\n']).find_map(|line| {
        let value = match line.split_once(": ") {
            Some((prefix, value)) if prefix.starts_with('+') => value,
            _ => line,
        };
        let value = value.trim().trim_matches('"');
        (len.contains(&value.len())
            && value.starts_with(|c: char| c.is_ascii_digit())
            && value.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(value)
    })
}
