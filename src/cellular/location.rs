//! GNSS fix collection from the NMEA stream of SIM868 / SIM7600.
//!
//! Runs stand-alone: no registration or data session is needed.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use embedded_io::Write;

use super::{text, Cellular, Phase};
use crate::command::{Action, Transaction};
use crate::config::{CellularConfig, Events};
use crate::modules::{Module, ModuleParams as _};

/// Give up on a fix after this long
pub const GPS_TIMEOUT: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpsState {
    Idle,
    Starting,
    /// Identify the module, warm-up is skipped for GNSS sessions
    Identify,
    PowerOn,
    EnableNmea,
    Collecting,
    DisableNmea,
    PowerOff,
    Finished,
}

impl<'d, M, C, W, E, const Q: usize, const RX: usize> Cellular<'d, M, C, W, E, Q, RX>
where
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
{
    fn set_gps(&mut self, now: Instant, state: GpsState) {
        debug!("GPS: {:?} -> {:?}", self.gps, state);
        self.gps = state;
        self.next_command(now, None);
    }

    fn gps_after_identify(&mut self, now: Instant, module: Module) {
        if module.has_gps() {
            self.set_gps(now, GpsState::PowerOn);
        } else {
            warn!("{:?} has no GNSS receiver", module.version());
            self.gps_requested = false;
            self.set_gps(now, GpsState::Finished);
        }
    }

    pub(super) fn gps_machine(&mut self, now: Instant) {
        use GpsState::*;

        match (self.gps, self.action) {
            (Idle, _) => self.set_gps(now, Starting),
            (Starting, Action::SendingCommand) => {
                self.gps_started_at = Some(now);
                self.gps_info.fix_valid = false;
                self.nmea.reset();
                match self.module {
                    Some(module) => self.gps_after_identify(now, module),
                    None => self.set_gps(now, Identify),
                }
            }

            (Identify, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+GMR\r")
                    .retry_every(Duration::from_secs(1))
                    .forced(),
            ),
            (Identify, Action::GoodResponse) => {
                let response = self.response("");
                match Module::from_revision(text(&response)) {
                    Some(module) => {
                        self.module = Some(module);
                        self.gps_after_identify(now, module);
                    }
                    None => self.action = Action::BadResponse,
                }
            }

            (PowerOn, Action::SendingCommand) => {
                match self.module.and_then(|m| m.gps_power(true)) {
                    Some(command) => self.send(
                        now,
                        Transaction::command(command)
                            .retry_every(Duration::from_secs(1))
                            .forced(),
                    ),
                    None => self.set_gps(now, Finished),
                }
            }
            (PowerOn, Action::GoodResponse) => self.set_gps(now, EnableNmea),

            (EnableNmea, Action::SendingCommand) => {
                match self.module.and_then(|m| m.gps_nmea(true)) {
                    Some(command) => self.send(now, Transaction::command(command)),
                    None => self.set_gps(now, Collecting),
                }
            }
            (EnableNmea, Action::GoodResponse) => {
                info!("Collecting NMEA");
                self.set_gps(now, Collecting);
            }

            (Collecting, Action::SendingCommand) => self.collect_nmea(now),

            (DisableNmea, Action::SendingCommand) => {
                match self.module.and_then(|m| m.gps_nmea(false)) {
                    Some(command) => self.send(now, Transaction::command(command).tolerant()),
                    None => self.set_gps(now, PowerOff),
                }
            }
            (DisableNmea, Action::GoodResponse | Action::ErrorResponse) => {
                self.set_gps(now, PowerOff)
            }

            (PowerOff, Action::SendingCommand) => {
                match self.module.and_then(|m| m.gps_power(false)) {
                    Some(command) => self.send(now, Transaction::command(command).tolerant()),
                    None => self.set_gps(now, Finished),
                }
            }
            (PowerOff, Action::GoodResponse | Action::ErrorResponse) => {
                self.set_gps(now, Finished)
            }

            (Finished, _) => {
                self.gps = Idle;
                self.enter_phase(Phase::Idle);
            }

            _ => {}
        }
    }

    fn collect_nmea(&mut self, now: Instant) {
        let mut buf = [0u8; 128];
        while self.framer.how_many_new_responses() > 0 {
            let n = self.framer.read_responses(&mut buf);
            if n == 0 {
                break;
            }
            // Lines come out `\n` terminated, the parser wants `\r\n`
            for &byte in &buf[..n] {
                if byte == b'\n' {
                    self.nmea.feed(b'\r', &mut self.gps_info);
                }
                self.nmea.feed(byte, &mut self.gps_info);
            }
        }

        let timed_out = self
            .gps_started_at
            .map_or(false, |start| now.saturating_duration_since(start) >= GPS_TIMEOUT);
        if self.gps_info.fix_valid {
            info!(
                "GPS fix: {} {}, {} satellites",
                self.gps_info.latitude, self.gps_info.longitude, self.gps_info.satellites
            );
            self.gps_requested = false;
            self.set_gps(now, GpsState::DisableNmea);
        } else if timed_out {
            warn!("No GPS fix within {} s", GPS_TIMEOUT.as_secs());
            self.gps_requested = false;
            self.set_gps(now, GpsState::DisableNmea);
        } else if !self.gps_requested {
            debug!("GPS collection stopped");
            self.set_gps(now, GpsState::DisableNmea);
        }
    }
}
