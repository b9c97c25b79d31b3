use super::{HttpCommandSet, ModuleParams, SessionKind};
use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sim7020;

impl ModuleParams for Sim7020 {
    fn power_on_pull_time(&self) -> Duration {
        Duration::from_millis(800)
    }
    fn power_off_pull_time(&self) -> Duration {
        Duration::from_millis(1200)
    }
    fn boot_wait(&self) -> Duration {
        Duration::from_secs(4)
    }
    fn is_nbiot(&self) -> bool {
        true
    }
    fn csq_min_signal(&self) -> u8 {
        0
    }
    fn session_kind(&self) -> SessionKind {
        SessionKind::Attach
    }
    fn http_commands(&self) -> HttpCommandSet {
        HttpCommandSet::Chttp
    }
}
