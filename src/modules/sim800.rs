use super::{ModuleParams, SessionKind};
use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sim800;

impl ModuleParams for Sim800 {
    fn power_on_pull_time(&self) -> Duration {
        Duration::from_millis(1100)
    }
    fn power_off_pull_time(&self) -> Duration {
        Duration::from_millis(1500)
    }
    fn gsm_only(&self) -> bool {
        true
    }
    fn csq_min_signal(&self) -> u8 {
        6
    }
    fn registration_query(&self) -> &'static str {
        "AT+CREG?\r"
    }
    fn registration_prefix(&self) -> &'static str {
        "+CREG: "
    }
    fn session_kind(&self) -> SessionKind {
        SessionKind::Bearer
    }
    fn cell_scan_mode(&self) -> Option<&'static str> {
        Some("AT+CENG=3\r")
    }
}
