use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use embedded_io::Write;

use super::{format_command, text, Cellular, Phase};
use crate::command::{Action, Transaction};
use crate::config::{CellularConfig, Events};
use crate::modules::{HttpCommandSet, Module, ModuleParams as _};
use crate::utilities::cells::{process_cells, MAX_CELLS};

/// Time given to engineering mode to gather neighbour cells
const COLLECT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CellsState {
    Idle,
    Starting,
    /// Open an HTTP context only to get the radio out of PSM
    WakeConfigure,
    WakeConnect,
    SetMode,
    Query,
    WakeDisconnect,
    WakeRelease,
    Finished,
}

impl<'d, M, C, W, E, const Q: usize, const RX: usize> Cellular<'d, M, C, W, E, Q, RX>
where
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
{
    fn set_cells(&mut self, now: Instant, state: CellsState, delay: Option<Duration>) {
        debug!("Cells: {:?} -> {:?}", self.cells, state);
        self.cells = state;
        self.next_command(now, delay);
    }

    /// Scan serving and neighbour cells.
    pub(super) fn cells_machine(&mut self, now: Instant) {
        use CellsState::*;

        let Some(module) = self.require_module() else {
            return;
        };
        let dialect = module.http_commands();

        match (self.cells, self.action) {
            (Idle, _) => self.set_cells(now, Starting, None),
            (Starting, Action::SendingCommand) => {
                let wake = module.is_nbiot() && self.psm_active && dialect != HttpCommandSet::Legacy;
                self.set_cells(now, if wake { WakeConfigure } else { SetMode }, None);
            }

            (WakeConfigure, Action::SendingCommand) => match dialect {
                HttpCommandSet::Chttp if self.session.http_context_saved => {
                    self.set_cells(now, WakeConnect, None)
                }
                HttpCommandSet::Chttp => self.send(
                    now,
                    at!("AT+CHTTPCREATE=\"http://{}:{}/\"\r", C::HOST, C::HTTP_PORT)
                        .expecting("+CHTTPCREATE: "),
                ),
                _ => self.send(
                    now,
                    at!("AT+SHCONF=\"URL\",\"http://{}:{}\"\r", C::HOST, C::HTTP_PORT),
                ),
            },
            (WakeConfigure, Action::GoodResponse) => {
                if dialect == HttpCommandSet::Chttp {
                    self.session.http_context_saved = true;
                }
                self.set_cells(now, WakeConnect, None);
            }

            (WakeConnect, Action::SendingCommand) => {
                let command = match dialect {
                    HttpCommandSet::Chttp => "AT+CHTTPCON=0\r",
                    _ => "AT+SHCONN\r",
                };
                self.send(
                    now,
                    Transaction::command(command)
                        .timeout(Duration::from_secs(60))
                        .tolerant(),
                );
            }
            (WakeConnect, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.http_woke_for_cells = true;
                self.set_cells(now, SetMode, None);
            }

            (SetMode, Action::SendingCommand) => match module.cell_scan_mode() {
                Some(command) => self.send(now, Transaction::command(command).tolerant()),
                None => self.set_cells(now, Query, None),
            },
            (SetMode, Action::GoodResponse | Action::ErrorResponse) => {
                self.set_cells(now, Query, Some(COLLECT_WINDOW))
            }

            (Query, Action::SendingCommand) => self.send(
                now,
                Transaction::command(module.cell_scan_query()).timeout(Duration::from_secs(10)),
            ),
            (Query, Action::GoodResponse) => {
                self.store_cells(module);
                if self.session.http_woke_for_cells {
                    self.set_cells(now, WakeDisconnect, None);
                } else {
                    self.set_cells(now, Finished, None);
                }
            }

            (WakeDisconnect, Action::SendingCommand) => {
                let command = match dialect {
                    HttpCommandSet::Chttp => "AT+CHTTPDISCON=0\r",
                    _ => "AT+SHDISC\r",
                };
                self.send(now, Transaction::command(command).tolerant());
            }
            (WakeDisconnect, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.http_woke_for_cells = false;
                self.session.http_connected = false;
                if dialect == HttpCommandSet::Chttp {
                    self.set_cells(now, WakeRelease, None);
                } else {
                    self.set_cells(now, Finished, None);
                }
            }

            (WakeRelease, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+CHTTPDESTROY=0\r").tolerant())
            }
            (WakeRelease, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.http_context_saved = false;
                self.set_cells(now, Finished, None);
            }

            (Finished, _) => {
                self.cells = Idle;
                self.enter_phase(Phase::Idle);
            }

            _ => {}
        }
    }

    fn store_cells(&mut self, module: Module) {
        let response = self.response(module.cell_scan_prefix());
        let data = process_cells(
            text(&response),
            module.version(),
            MAX_CELLS,
            self.home_network(),
        );
        self.cells_requested = false;
        if data.cells.is_empty() {
            warn!("Cell scan returned no cells");
            return;
        }
        info!(
            "{} cells on {}/{}",
            data.cells.len(),
            data.mcc,
            data.mnc
        );
        self.cells_data = data;
        self.cells_available = true;
    }
}
