//! Warm-up: make sure the module answers, identify it, wait for network
//! registration and an acceptable signal.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use embedded_io::Write;

use super::{format_command, identifier_line, text, Cellular};
use crate::command::responses::{parse, NetworkRegistration, SignalQuality};
use crate::command::{Action, Transaction};
use crate::config::{CellularConfig, Events};
use crate::module_timing::status_poll_interval;
use crate::modules::{Module, ModuleParams as _, SimcomVersion};
use crate::registration::Status;
use crate::utilities::{apn, RssiData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WarmupState {
    Idle,
    Starting,
    AtTest,
    DisableEcho,
    GetGmr,
    IsRegistered,
    GetImsi,
    SetBand,
    SetApn,
    RadioOff,
    RadioOn,
    GetCsq,
    DisablePsm,
    DisableEdrx,
    SetPsm,
    Finished,
}

impl<'d, M, C, W, E, const Q: usize, const RX: usize> Cellular<'d, M, C, W, E, Q, RX>
where
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
{
    fn set_warmup(&mut self, now: Instant, state: WarmupState, delay: Option<Duration>) {
        debug!("Warm-up: {:?} -> {:?}", self.warmup, state);
        self.warmup = state;
        self.next_command(now, delay);
    }

    pub(super) fn warmup_machine(&mut self, now: Instant) {
        use WarmupState::*;

        match (self.warmup, self.action) {
            (Idle, _) => self.set_warmup(now, Starting, None),
            (Starting, Action::SendingCommand) => {
                self.session.registration_deadline = None;
                self.set_warmup(now, AtTest, None);
            }

            (AtTest, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT\r")
                    .timeout(Duration::from_secs(10))
                    .retry_every(Duration::from_secs(1))
                    .forced(),
            ),
            (AtTest, Action::GoodResponse) => self.set_warmup(now, DisableEcho, None),

            (DisableEcho, Action::SendingCommand) => {
                self.send(now, Transaction::command("ATE0\r").tolerant())
            }
            (DisableEcho, Action::GoodResponse | Action::ErrorResponse) => {
                if self.module.is_none() {
                    self.set_warmup(now, GetGmr, None);
                } else {
                    self.set_warmup(now, IsRegistered, None);
                }
            }

            (GetGmr, Action::SendingCommand) => self.send(now, Transaction::command("AT+GMR\r")),
            (GetGmr, Action::GoodResponse) => {
                let response = self.response("");
                match Module::from_revision(text(&response)) {
                    Some(module) => {
                        info!("Module family {:?}", module.version());
                        self.module = Some(module);
                        self.set_warmup(now, IsRegistered, None);
                    }
                    None => {
                        error!("Unsupported module: {:?}", text(&response));
                        self.action = Action::BadResponse;
                    }
                }
            }

            (IsRegistered, Action::SendingCommand) => {
                let Some(module) = self.require_module() else {
                    return;
                };
                let deadline = *self
                    .session
                    .registration_deadline
                    .get_or_insert(now + module.registration_timeout());
                if now >= deadline {
                    warn!("Registration timed out");
                    self.action = Action::BadResponse;
                    return;
                }
                self.send(
                    now,
                    Transaction::command(module.registration_query())
                        .expecting(module.registration_prefix()),
                );
            }
            (IsRegistered, Action::GoodResponse) => self.on_registration_status(now),

            (GetImsi, Action::SendingCommand) => self.send(now, Transaction::command("AT+CIMI\r")),
            (GetImsi, Action::GoodResponse) => {
                let response = self.response("");
                match identifier_line(text(&response), 6..=15) {
                    Some(imsi) => {
                        self.session.imsi.clear();
                        self.session.imsi.push_str(imsi).ok();
                        self.set_warmup(now, SetBand, None);
                    }
                    None => self.action = Action::BadResponse,
                }
            }

            (SetBand, Action::SendingCommand) => {
                let Some(module) = self.require_module() else {
                    return;
                };
                let band = self
                    .home_network()
                    .and_then(|(mcc, mnc)| apn::get_band(mcc, mnc, module.version()));
                match (band, module.version()) {
                    (Some(band), SimcomVersion::Sim7020) => {
                        self.send(now, at!("AT+CBAND={}\r", band))
                    }
                    (Some(band), SimcomVersion::Sim7080) => {
                        self.send(now, at!("AT+CBANDCFG=\"NB-IOT\",{}\r", band))
                    }
                    _ => self.set_warmup(now, SetApn, None),
                }
            }
            (SetBand, Action::GoodResponse) => self.set_warmup(now, SetApn, None),

            (SetApn, Action::SendingCommand) => {
                let Some(module) = self.require_module() else {
                    return;
                };
                let Some((mcc, mnc)) = self.home_network() else {
                    self.set_warmup(now, RadioOff, None);
                    return;
                };
                let version = module.version();
                let info = apn::lookup(mcc, mnc, version);
                info!("APN {:?} for {}/{}", info.apn, mcc, mnc);
                let transaction = match version {
                    SimcomVersion::Sim7020 if info.user.is_empty() => {
                        at!("AT*MCGDEFCONT=\"IP\",\"{}\"\r", info.apn)
                    }
                    SimcomVersion::Sim7020 => at!(
                        "AT*MCGDEFCONT=\"IP\",\"{}\",\"{}\",\"{}\"\r",
                        info.apn,
                        info.user,
                        info.pass
                    ),
                    _ => at!("AT+CGDCONT=1,\"IP\",\"{}\"\r", info.apn),
                };
                self.send(now, transaction);
            }
            (SetApn, Action::GoodResponse) => self.set_warmup(now, RadioOff, None),

            (RadioOff, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+CFUN=0\r").timeout(Duration::from_secs(15)),
            ),
            (RadioOff, Action::GoodResponse) => self.set_warmup(now, RadioOn, None),

            (RadioOn, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+CFUN=1\r").timeout(Duration::from_secs(15)),
            ),
            (RadioOn, Action::GoodResponse) => {
                self.session.nbiot_configured = true;
                self.set_warmup(now, IsRegistered, Some(status_poll_interval()));
            }

            (GetCsq, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+CSQ\r").expecting("+CSQ: "))
            }
            (GetCsq, Action::GoodResponse) => self.on_signal_quality(now),

            (DisablePsm, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+CPSMS=0\r").tolerant())
            }
            (DisablePsm, Action::GoodResponse | Action::ErrorResponse) => {
                self.set_warmup(now, DisableEdrx, None)
            }

            (DisableEdrx, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+CEDRXS=0\r").tolerant())
            }
            (DisableEdrx, Action::GoodResponse | Action::ErrorResponse) => {
                let psm = match (self.module, self.home_network()) {
                    (Some(module), Some((mcc, mnc))) => {
                        apn::has_psm_mode(mcc, mnc, module.version())
                    }
                    _ => false,
                };
                if psm {
                    self.set_warmup(now, SetPsm, None);
                } else {
                    self.set_warmup(now, Finished, None);
                }
            }

            (SetPsm, Action::SendingCommand) => {
                let (t3412, t3324) = (self.psm_t3412, self.psm_t3324);
                self.send(now, at!("AT+CPSMS=1,,,\"{:08b}\",\"{:08b}\"\r", t3412, t3324));
            }
            (SetPsm, Action::GoodResponse) => {
                info!("PSM requested");
                self.psm_active = true;
                self.set_warmup(now, Finished, None);
            }

            (Finished, _) => {
                info!("Warm-up finished, registered as {:?}", self.session.reg_status);
                self.session.warmup_success = true;
                self.registration_backoff.succeed();
                self.warmup = Idle;
                self.next_command(now, None);
            }

            _ => {}
        }
    }

    fn on_registration_status(&mut self, now: Instant) {
        let Some(module) = self.require_module() else {
            return;
        };
        let response = self.response(module.registration_prefix());
        let Some(registration) =
            parse::<NetworkRegistration>(text(&response), module.registration_prefix())
        else {
            warn!("Unparsable registration status");
            self.action = Action::BadResponse;
            return;
        };

        let status = Status::from(registration.stat);
        if status != self.session.reg_status {
            info!("Registration status {:?}", status);
        }
        self.session.reg_status = status;

        if status.registered() {
            self.set_warmup(now, WarmupState::GetCsq, None);
        } else if status == Status::Denied && module.is_nbiot() {
            if !self.session.timer_3346_reported {
                self.session.timer_3346_reported = true;
                self.events.timer_3346();
            }
            warn!("Registration denied");
            self.action = Action::BadResponse;
        } else if module.is_nbiot() && !self.session.nbiot_configured {
            if self.session.imsi.is_empty() {
                self.set_warmup(now, WarmupState::GetImsi, None);
            } else {
                self.set_warmup(now, WarmupState::SetBand, None);
            }
        } else {
            self.set_warmup(now, WarmupState::IsRegistered, Some(status_poll_interval()));
        }
    }

    fn on_signal_quality(&mut self, now: Instant) {
        let Some(module) = self.require_module() else {
            return;
        };
        let response = self.response("+CSQ: ");
        let Some(csq) = parse::<SignalQuality>(text(&response), "+CSQ: ") else {
            self.action = Action::BadResponse;
            return;
        };
        self.rssi = RssiData::from_csq(csq.rssi, csq.ber);
        debug!("Signal {} dBm (rssi {})", self.rssi.dbm, csq.rssi);

        let min = module.csq_min_signal();
        let good = if self.rssi.available {
            csq.rssi >= min
        } else {
            min == 0
        };

        if good {
            if module.is_nbiot() && C::USE_PSM {
                self.set_warmup(now, WarmupState::DisablePsm, None);
            } else {
                self.set_warmup(now, WarmupState::Finished, None);
            }
        } else if self
            .session
            .registration_deadline
            .map_or(false, |deadline| now >= deadline)
        {
            warn!("Signal stayed below {}", min);
            self.action = Action::BadResponse;
        } else {
            self.set_warmup(now, WarmupState::GetCsq, Some(status_poll_interval()));
        }
    }
}
