//! Opening, holding and closing the IP data context.
//!
//! NB-IoT families attach with `+CGATT`, SIM800/868 use a `+SAPBR` bearer
//! profile and SIM7600 activates a PDP context with `+CGACT`.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use embedded_io::Write;

use super::{format_command, text, Cellular, Phase};
use crate::command::responses::{parse, AttachState, BearerStatus, ContextState};
use crate::command::{Action, Transaction};
use crate::config::{CellularConfig, Events};
use crate::module_timing::status_poll_interval;
use crate::modules::{Module, ModuleParams as _, SessionKind, SimcomVersion};
use crate::utilities::apn::{self, ApnInfo};

/// How long the session may take to come up before it counts as failed
const OPEN_DEADLINE: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataSessionState {
    Idle,
    Starting,
    GetStatus,
    SetContype,
    SetApn,
    SetUser,
    SetPass,
    SetAuth,
    Open,
    ActivateApp,
    RemainOpen,
    Close,
    Finished,
}

/// What the status query reported
enum SessionStatus {
    Open,
    Opening,
    Closed,
}

impl<'d, M, C, W, E, const Q: usize, const RX: usize> Cellular<'d, M, C, W, E, Q, RX>
where
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
{
    fn set_data_session(&mut self, now: Instant, state: DataSessionState, delay: Option<Duration>) {
        debug!("Data session: {:?} -> {:?}", self.data_session, state);
        self.data_session = state;
        if state == DataSessionState::RemainOpen {
            self.session.state_since = Some(now);
        }
        self.next_command(now, delay);
    }

    fn finish_data_session(&mut self, now: Instant, next: Phase) {
        self.session.after_data_session = Some(next);
        self.set_data_session(now, DataSessionState::Finished, None);
    }

    fn apn_info(&self, module: Module) -> ApnInfo {
        match self.home_network() {
            Some((mcc, mnc)) => apn::lookup(mcc, mnc, module.version()),
            None => apn::lookup(0, 0, module.version()),
        }
    }

    pub(super) fn data_session_machine(&mut self, now: Instant) {
        use DataSessionState::*;

        let Some(module) = self.require_module() else {
            return;
        };
        let kind = module.session_kind();

        match (self.data_session, self.action) {
            (Idle, _) => self.set_data_session(now, Starting, None),
            (Starting, Action::SendingCommand) => {
                self.session.data_session_deadline = Some(now + OPEN_DEADLINE);
                self.session.session_open_tried = false;
                self.set_data_session(now, GetStatus, None);
            }

            (GetStatus, Action::SendingCommand) => {
                let transaction = match kind {
                    SessionKind::Attach => {
                        Transaction::command("AT+CGATT?\r").expecting("+CGATT: ")
                    }
                    SessionKind::Bearer => {
                        Transaction::command("AT+SAPBR=2,1\r").expecting("+SAPBR: ")
                    }
                    SessionKind::PdpContext => {
                        Transaction::command("AT+CGACT?\r").expecting("+CGACT: ")
                    }
                };
                self.send(now, transaction);
            }
            (GetStatus, Action::GoodResponse) => {
                let Some(status) = self.session_status(kind) else {
                    self.action = Action::BadResponse;
                    return;
                };
                match status {
                    SessionStatus::Open => {
                        if module.version() == SimcomVersion::Sim7080
                            && !self.session.app_network_active
                        {
                            self.set_data_session(now, ActivateApp, None);
                        } else {
                            self.on_session_open(now);
                        }
                    }
                    SessionStatus::Opening => self.poll_session(now),
                    SessionStatus::Closed if self.session.session_open_tried => {
                        self.poll_session(now)
                    }
                    SessionStatus::Closed => match (kind, module.version()) {
                        (SessionKind::Bearer, _) => self.set_data_session(now, SetContype, None),
                        // The APN was set during warm-up
                        (SessionKind::Attach, SimcomVersion::Sim7020) => {
                            self.set_data_session(now, Open, None)
                        }
                        _ => self.set_data_session(now, SetApn, None),
                    },
                }
            }

            (SetContype, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+SAPBR=3,1,\"Contype\",\"GPRS\"\r"),
            ),
            (SetContype, Action::GoodResponse) => self.set_data_session(now, SetApn, None),

            (SetApn, Action::SendingCommand) => {
                let info = self.apn_info(module);
                let transaction = match kind {
                    SessionKind::Bearer => at!("AT+SAPBR=3,1,\"APN\",\"{}\"\r", info.apn),
                    _ => at!("AT+CGDCONT=1,\"IP\",\"{}\"\r", info.apn),
                };
                self.send(now, transaction);
            }
            (SetApn, Action::GoodResponse) => {
                let info = self.apn_info(module);
                let next = match (info.user.is_empty(), kind) {
                    (true, _) => Open,
                    (false, SessionKind::Bearer) => SetUser,
                    (false, _) => SetAuth,
                };
                self.set_data_session(now, next, None);
            }

            (SetUser, Action::SendingCommand) => {
                let info = self.apn_info(module);
                self.send(now, at!("AT+SAPBR=3,1,\"USER\",\"{}\"\r", info.user));
            }
            (SetUser, Action::GoodResponse) => self.set_data_session(now, SetPass, None),

            (SetPass, Action::SendingCommand) => {
                let info = self.apn_info(module);
                self.send(now, at!("AT+SAPBR=3,1,\"PWD\",\"{}\"\r", info.pass));
            }
            (SetPass, Action::GoodResponse) => self.set_data_session(now, Open, None),

            (SetAuth, Action::SendingCommand) => {
                let info = self.apn_info(module);
                self.send(
                    now,
                    at!("AT+CGAUTH=1,1,\"{}\",\"{}\"\r", info.user, info.pass),
                );
            }
            (SetAuth, Action::GoodResponse) => self.set_data_session(now, Open, None),

            (Open, Action::SendingCommand) => {
                let transaction = match kind {
                    SessionKind::Attach => Transaction::command("AT+CGATT=1\r"),
                    SessionKind::Bearer => Transaction::command("AT+SAPBR=1,1\r"),
                    SessionKind::PdpContext => Transaction::command("AT+CGACT=1,1\r"),
                };
                self.send(now, transaction.timeout(Duration::from_secs(85)));
            }
            (Open, Action::GoodResponse) => {
                self.session.session_open_tried = true;
                self.set_data_session(now, GetStatus, Some(status_poll_interval()));
            }

            // Fails with ERROR when the app network is already up
            (ActivateApp, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+CNACT=0,1\r")
                    .timeout(Duration::from_secs(30))
                    .tolerant(),
            ),
            (ActivateApp, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.app_network_active = true;
                self.on_session_open(now);
            }

            (RemainOpen, Action::SendingCommand) => self.remain_open(now),

            (Close, Action::SendingCommand) => {
                let transaction = match kind {
                    SessionKind::Attach => Transaction::command("AT+CGATT=0\r"),
                    SessionKind::Bearer => Transaction::command("AT+SAPBR=0,1\r"),
                    SessionKind::PdpContext => Transaction::command("AT+CGACT=0,1\r"),
                };
                self.send(now, transaction.timeout(Duration::from_secs(65)).tolerant());
            }
            (Close, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.app_network_active = false;
                self.finish_data_session(now, Phase::Idle);
            }

            (Finished, _) => {
                let next = self.session.after_data_session.take().unwrap_or(Phase::Idle);
                self.data_session = Idle;
                self.enter_phase(next);
            }

            _ => {}
        }
    }

    fn session_status(&mut self, kind: SessionKind) -> Option<SessionStatus> {
        match kind {
            SessionKind::Attach => {
                let response = self.response("+CGATT: ");
                let attach = parse::<AttachState>(text(&response), "+CGATT: ")?;
                self.session.data_session_attached_status = attach.state;
                self.session.data_session_status = attach.state;
                Some(if attach.state == 1 {
                    SessionStatus::Open
                } else {
                    SessionStatus::Closed
                })
            }
            SessionKind::Bearer => {
                let response = self.response("+SAPBR: ");
                let bearer = parse::<BearerStatus>(text(&response), "+SAPBR: ")?;
                self.session.data_session_status = bearer.status;
                debug!("Bearer {} status {}, ip {}", bearer.cid, bearer.status, bearer.ip.as_str());
                Some(match bearer.status {
                    1 => SessionStatus::Open,
                    0 | 2 => SessionStatus::Opening,
                    _ => SessionStatus::Closed,
                })
            }
            SessionKind::PdpContext => {
                let response = self.response("+CGACT: ");
                // One line per context, the first is ours
                let context = parse::<ContextState>(text(&response), "+CGACT: ")?;
                self.session.data_session_status = context.state;
                Some(if context.cid == 1 && context.state == 1 {
                    SessionStatus::Open
                } else {
                    SessionStatus::Closed
                })
            }
        }
    }

    fn poll_session(&mut self, now: Instant) {
        let expired = self
            .session
            .data_session_deadline
            .map_or(false, |deadline| now >= deadline);
        if expired {
            warn!("Data session did not open in time");
            self.action = Action::BadResponse;
        } else {
            self.set_data_session(now, DataSessionState::GetStatus, Some(status_poll_interval()));
        }
    }

    fn on_session_open(&mut self, now: Instant) {
        info!("Data session open");
        self.data_session_backoff.succeed();
        if self.has_data_to_upload() && !self.http_backoff.is_running(now) {
            self.finish_data_session(now, Phase::Http);
        } else {
            self.set_data_session(now, DataSessionState::RemainOpen, None);
        }
    }

    fn remain_open(&mut self, now: Instant) {
        if self.has_data_to_upload() && !self.http_backoff.is_running(now) {
            self.finish_data_session(now, Phase::Http);
            return;
        }
        if self.cells_requested || (self.gps_requested && self.policy.gps) {
            self.finish_data_session(now, Phase::Idle);
            return;
        }

        if self.events.battery_saving_mode() {
            info!("Battery saving, closing data session");
            self.set_data_session(now, DataSessionState::Close, None);
            return;
        }
        if self.psm_active {
            return;
        }
        let since = self.session.state_since.unwrap_or(now);
        if now.saturating_duration_since(since) >= self.policy.remain_data_session_open {
            debug!("Data session idle, closing");
            self.set_data_session(now, DataSessionState::Close, None);
        }
    }
}
