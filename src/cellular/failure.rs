use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use embedded_io::Write;

use super::{Cellular, Phase};
use crate::config::{CellularConfig, Events};

/// Which retry gate a failed session is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum FailureClass {
    Registration,
    DataSession,
    /// Cell scans and GNSS sessions have no backoff; their request is dropped
    Request,
}

impl<'d, M, C, W, E, const Q: usize, const RX: usize> Cellular<'d, M, C, W, E, Q, RX>
where
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
{
    pub(super) fn failure_class(&self) -> FailureClass {
        match self.phase {
            Phase::Gps | Phase::Idle | Phase::Cells => FailureClass::Request,
            _ if !self.session.warmup_success || !self.session.info_success => {
                FailureClass::Registration
            }
            Phase::DataSession | Phase::Http => FailureClass::DataSession,
        }
    }

    /// Any unexpected answer aborts the whole session: charge the failure to
    /// its class, then power cycle the module.
    pub(super) fn handle_failure(&mut self, now: Instant) {
        let class = self.failure_class();
        error!(
            "{:?} in {:?} (warm-up {:?}, info {:?}), power cycling",
            self.action, self.phase, self.warmup, self.info
        );

        match class {
            FailureClass::Registration => {
                if self.registration_backoff.fail(now) {
                    self.events.registration_failed();
                }
                debug!(
                    "Registration backoff {} ms",
                    self.registration_backoff.next_try_timeout().as_millis()
                );
            }
            FailureClass::DataSession => {
                if self.data_session_backoff.fail(now) {
                    self.events.data_session_failed();
                }
                debug!(
                    "Data session backoff {} ms",
                    self.data_session_backoff.next_try_timeout().as_millis()
                );
            }
            FailureClass::Request => match self.phase {
                Phase::Cells => self.cells_requested = false,
                Phase::Gps => self.gps_requested = false,
                _ => {}
            },
        }

        self.reset_session();
        self.phase = Phase::Idle;
        self.power.start_power_off(now);
    }
}
