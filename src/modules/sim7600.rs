use super::ModuleParams;
use embassy_time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sim7600;

impl ModuleParams for Sim7600 {
    fn power_on_pull_time(&self) -> Duration {
        Duration::from_millis(500)
    }
    fn power_off_pull_time(&self) -> Duration {
        Duration::from_millis(2500)
    }
    fn boot_wait(&self) -> Duration {
        Duration::from_secs(12)
    }
    fn has_gps(&self) -> bool {
        true
    }
    fn iccid_query(&self) -> &'static str {
        "AT+CICCID\r"
    }
    fn cell_scan_query(&self) -> &'static str {
        "AT+CPSI?\r"
    }
    fn cell_scan_prefix(&self) -> &'static str {
        "+CPSI: "
    }
    fn gps_power(&self, on: bool) -> Option<&'static str> {
        Some(if on { "AT+CGPS=1\r" } else { "AT+CGPS=0\r" })
    }
    fn gps_nmea(&self, on: bool) -> Option<&'static str> {
        Some(if on { "AT+CGPSINFOCFG=1,3\r" } else { "AT+CGPSINFOCFG=0,3\r" })
    }
}
