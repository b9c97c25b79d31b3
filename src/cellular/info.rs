use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use embedded_io::Write;

use super::{identifier_line, text, Cellular};
use crate::command::{Action, Transaction};
use crate::config::{CellularConfig, Events, Identity};
use crate::modules::ModuleParams as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InfoState {
    Idle,
    Starting,
    GetImei,
    GetIccid,
    GetImsi,
    Hello,
    Finished,
}

impl<'d, M, C, W, E, const Q: usize, const RX: usize> Cellular<'d, M, C, W, E, Q, RX>
where
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
{
    fn set_info(&mut self, now: Instant, state: InfoState) {
        debug!("Info: {:?} -> {:?}", self.info, state);
        self.info = state;
        self.next_command(now, None);
    }

    /// Read IMEI, ICCID and IMSI and introduce the device upstream.
    pub(super) fn info_machine(&mut self, now: Instant) {
        use InfoState::*;

        match (self.info, self.action) {
            (Idle, _) => self.set_info(now, Starting),
            (Starting, Action::SendingCommand) => {
                if self.imei.is_empty() {
                    self.set_info(now, GetImei);
                } else {
                    self.set_info(now, GetIccid);
                }
            }

            (GetImei, Action::SendingCommand) => self.send(now, Transaction::command("AT+CGSN\r")),
            (GetImei, Action::GoodResponse) => {
                let response = self.response("");
                match identifier_line(text(&response), 15..=15) {
                    Some(imei) => {
                        self.imei.clear();
                        self.imei.push_str(imei).ok();
                        self.set_info(now, GetIccid);
                    }
                    None => self.action = Action::BadResponse,
                }
            }

            (GetIccid, Action::SendingCommand) => {
                let Some(module) = self.require_module() else {
                    return;
                };
                self.send(now, Transaction::command(module.iccid_query()));
            }
            (GetIccid, Action::GoodResponse) => {
                let response = self.response("");
                match identifier_line(text(&response), 18..=22) {
                    Some(iccid) => {
                        self.session.iccid.clear();
                        self.session.iccid.push_str(iccid).ok();
                        self.set_info(now, GetImsi);
                    }
                    None => self.action = Action::BadResponse,
                }
            }

            (GetImsi, Action::SendingCommand) => {
                if self.session.imsi.is_empty() {
                    self.send(now, Transaction::command("AT+CIMI\r"));
                } else {
                    self.set_info(now, Hello);
                }
            }
            (GetImsi, Action::GoodResponse) => {
                let response = self.response("");
                match identifier_line(text(&response), 6..=15) {
                    Some(imsi) => {
                        self.session.imsi.clear();
                        self.session.imsi.push_str(imsi).ok();
                        self.set_info(now, Hello);
                    }
                    None => self.action = Action::BadResponse,
                }
            }

            (Hello, _) => {
                let complete = !self.imei.is_empty()
                    && !self.session.iccid.is_empty()
                    && !self.session.imsi.is_empty();
                if complete && !self.session.hello_sent {
                    self.session.hello_sent = true;
                    info!(
                        "IMEI {}, ICCID {}, IMSI {}",
                        self.imei.as_str(),
                        self.session.iccid.as_str(),
                        self.session.imsi.as_str()
                    );
                    self.events.hello(&Identity {
                        imei: &self.imei,
                        iccid: &self.session.iccid,
                        imsi: &self.session.imsi,
                    });
                }
                self.set_info(now, Finished);
            }

            (Finished, _) => {
                self.session.info_success = true;
                self.info = Idle;
                self.next_command(now, None);
            }

            _ => {}
        }
    }
}
