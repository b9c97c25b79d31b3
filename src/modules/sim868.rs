use super::{ModuleParams, SessionKind};
use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sim868;

impl ModuleParams for Sim868 {
    fn power_on_pull_time(&self) -> Duration {
        Duration::from_millis(1100)
    }
    fn gsm_only(&self) -> bool {
        true
    }
    fn has_gps(&self) -> bool {
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
        Some("AT+CENG=1\r")
    }
    fn gps_power(&self, on: bool) -> Option<&'static str> {
        Some(if on { "AT+CGNSPWR=1\r" } else { "AT+CGNSPWR=0\r" })
    }
    fn gps_nmea(&self, on: bool) -> Option<&'static str> {
        Some(if on { "AT+CGNSTST=1\r" } else { "AT+CGNSTST=0\r" })
    }
}
