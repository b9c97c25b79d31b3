use super::{HttpCommandSet, ModuleParams, SessionKind};
use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sim7080;

impl ModuleParams for Sim7080 {
    fn power_on_pull_time(&self) -> Duration {
        Duration::from_millis(1100)
    }
    fn power_off_pull_time(&self) -> Duration {
        Duration::from_millis(1300)
    }
    fn boot_wait(&self) -> Duration {
        Duration::from_secs(5)
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
        HttpCommandSet::Sh
    }
    fn cell_scan_mode(&self) -> Option<&'static str> {
        Some("AT+CENG=1,1\r")
    }
}
