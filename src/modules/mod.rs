pub(crate) mod sim7020;
pub(crate) mod sim7080;
pub(crate) mod sim7600;
pub(crate) mod sim800;
pub(crate) mod sim868;

use embassy_time::Duration;

/// Hardware variants the driver knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SimcomVersion {
    Sim800,
    Sim868,
    Sim7020,
    Sim7080,
    Sim7600,
}

/// How a module opens its IP data context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionKind {
    /// `+CGATT` attach/detach
    Attach,
    /// `+SAPBR` bearer profile
    Bearer,
    /// `+CGACT` PDP context activation
    PdpContext,
}

/// Which HTTP AT dialect a module speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttpCommandSet {
    /// `+HTTPINIT` .. `+HTTPTERM`
    Legacy,
    /// `+CHTTPCREATE` .. `+CHTTPDESTROY`
    Chttp,
    /// `+SHCONF` .. `+SHDISC`
    Sh,
}

pub trait ModuleParams: Copy {
    /// How long `PWRKEY` is held to switch the module on
    fn power_on_pull_time(&self) -> Duration {
        Duration::from_millis(1200)
    }

    /// How long `PWRKEY` is held to switch the module off
    fn power_off_pull_time(&self) -> Duration {
        Duration::from_millis(1500)
    }

    /// How long to wait before the module answers AT commands after boot
    fn boot_wait(&self) -> Duration {
        Duration::from_secs(3)
    }

    fn is_nbiot(&self) -> bool {
        false
    }

    /// 2G only modules register faster, and give up sooner
    fn gsm_only(&self) -> bool {
        false
    }

    fn has_gps(&self) -> bool {
        false
    }

    /// How long registration is polled before it counts as failed
    fn registration_timeout(&self) -> Duration {
        if self.gsm_only() {
            Duration::from_secs(15 * 60)
        } else {
            Duration::from_secs(60 * 60)
        }
    }

    /// Lowest acceptable `+CSQ` rssi. With a minimum of 0 even "unknown" (99)
    /// is accepted.
    fn csq_min_signal(&self) -> u8 {
        5
    }

    fn registration_query(&self) -> &'static str {
        "AT+CEREG?\r"
    }

    fn registration_prefix(&self) -> &'static str {
        "+CEREG: "
    }

    fn session_kind(&self) -> SessionKind {
        SessionKind::PdpContext
    }

    fn http_commands(&self) -> HttpCommandSet {
        HttpCommandSet::Legacy
    }

    fn iccid_query(&self) -> &'static str {
        "AT+CCID\r"
    }

    /// Command enabling engineering mode before a cell scan, if any
    fn cell_scan_mode(&self) -> Option<&'static str> {
        None
    }

    fn cell_scan_query(&self) -> &'static str {
        "AT+CENG?\r"
    }

    fn cell_scan_prefix(&self) -> &'static str {
        "+CENG: "
    }

    /// Command switching the GNSS engine on or off
    fn gps_power(&self, _on: bool) -> Option<&'static str> {
        None
    }

    /// Command starting or stopping the NMEA sentence stream
    fn gps_nmea(&self, _on: bool) -> Option<&'static str> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Module {
    Sim800(sim800::Sim800),
    Sim868(sim868::Sim868),
    Sim7020(sim7020::Sim7020),
    Sim7080(sim7080::Sim7080),
    Sim7600(sim7600::Sim7600),
}

impl Module {
    /// Identify the module from its firmware revision text (`AT+GMR`).
    pub fn from_revision(revision: &str) -> Option<Self> {
        const MODELS: [(&str, SimcomVersion); 5] = [
            ("SIM800", SimcomVersion::Sim800),
            ("SIM868", SimcomVersion::Sim868),
            ("SIM7020", SimcomVersion::Sim7020),
            ("SIM7080", SimcomVersion::Sim7080),
            ("SIM7600", SimcomVersion::Sim7600),
        ];

        MODELS
            .iter()
            .find(|(model, _)| revision.contains(model))
            .map(|&(_, version)| Self::from(version))
    }

    pub fn version(&self) -> SimcomVersion {
        match self {
            Self::Sim800(_) => SimcomVersion::Sim800,
            Self::Sim868(_) => SimcomVersion::Sim868,
            Self::Sim7020(_) => SimcomVersion::Sim7020,
            Self::Sim7080(_) => SimcomVersion::Sim7080,
            Self::Sim7600(_) => SimcomVersion::Sim7600,
        }
    }
}

impl From<SimcomVersion> for Module {
    fn from(version: SimcomVersion) -> Self {
        match version {
            SimcomVersion::Sim800 => Self::Sim800(sim800::Sim800),
            SimcomVersion::Sim868 => Self::Sim868(sim868::Sim868),
            SimcomVersion::Sim7020 => Self::Sim7020(sim7020::Sim7020),
            SimcomVersion::Sim7080 => Self::Sim7080(sim7080::Sim7080),
            SimcomVersion::Sim7600 => Self::Sim7600(sim7600::Sim7600),
        }
    }
}

macro_rules! inner {
    ($self: ident, $fn: ident $(, $arg: expr)*) => {
        match $self {
            Self::Sim800(inner) => inner.$fn($($arg),*),
            Self::Sim868(inner) => inner.$fn($($arg),*),
            Self::Sim7020(inner) => inner.$fn($($arg),*),
            Self::Sim7080(inner) => inner.$fn($($arg),*),
            Self::Sim7600(inner) => inner.$fn($($arg),*),
        }
    };
}

impl ModuleParams for Module {
    fn power_on_pull_time(&self) -> Duration {
        inner!(self, power_on_pull_time)
    }

    fn power_off_pull_time(&self) -> Duration {
        inner!(self, power_off_pull_time)
    }

    fn boot_wait(&self) -> Duration {
        inner!(self, boot_wait)
    }

    fn is_nbiot(&self) -> bool {
        inner!(self, is_nbiot)
    }

    fn gsm_only(&self) -> bool {
        inner!(self, gsm_only)
    }

    fn has_gps(&self) -> bool {
        inner!(self, has_gps)
    }

    fn registration_timeout(&self) -> Duration {
        inner!(self, registration_timeout)
    }

    fn csq_min_signal(&self) -> u8 {
        inner!(self, csq_min_signal)
    }

    fn registration_query(&self) -> &'static str {
        inner!(self, registration_query)
    }

    fn registration_prefix(&self) -> &'static str {
        inner!(self, registration_prefix)
    }

    fn session_kind(&self) -> SessionKind {
        inner!(self, session_kind)
    }

    fn http_commands(&self) -> HttpCommandSet {
        inner!(self, http_commands)
    }

    fn iccid_query(&self) -> &'static str {
        inner!(self, iccid_query)
    }

    fn cell_scan_mode(&self) -> Option<&'static str> {
        inner!(self, cell_scan_mode)
    }

    fn cell_scan_query(&self) -> &'static str {
        inner!(self, cell_scan_query)
    }

    fn cell_scan_prefix(&self) -> &'static str {
        inner!(self, cell_scan_prefix)
    }

    fn gps_power(&self, on: bool) -> Option<&'static str> {
        inner!(self, gps_power, on)
    }

    fn gps_nmea(&self, on: bool) -> Option<&'static str> {
        inner!(self, gps_nmea, on)
    }
}

/// Parameters used before the module has identified itself.
#[derive(Debug, Clone, Copy)]
pub struct Generic;

impl ModuleParams for Generic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_family_from_revision() {
        let cases = [
            ("Revision:1418B05SIM800C24", SimcomVersion::Sim800),
            ("Revision:1418B06SIM868M32", SimcomVersion::Sim868),
            ("Revision:1752B10SIM7020E", SimcomVersion::Sim7020),
            ("Revision:1951B08SIM7080", SimcomVersion::Sim7080),
            ("+CGMR: LE20B04SIM7600M22", SimcomVersion::Sim7600),
        ];
        for (revision, version) in cases {
            assert_eq!(
                Module::from_revision(revision).map(|m| m.version()),
                Some(version)
            );
        }
        assert!(Module::from_revision("Revision:BG96MAR02A07M1G").is_none());
    }

    #[test]
    fn family_properties() {
        let sim800 = Module::from(SimcomVersion::Sim800);
        assert!(sim800.gsm_only());
        assert_eq!(sim800.registration_timeout(), Duration::from_secs(15 * 60));
        assert_eq!(sim800.registration_prefix(), "+CREG: ");
        assert_eq!(sim800.session_kind(), SessionKind::Bearer);

        let sim7080 = Module::from(SimcomVersion::Sim7080);
        assert!(sim7080.is_nbiot());
        assert_eq!(sim7080.csq_min_signal(), 0);
        assert_eq!(sim7080.registration_timeout(), Duration::from_secs(60 * 60));
        assert_eq!(sim7080.http_commands(), HttpCommandSet::Sh);

        let sim7600 = Module::from(SimcomVersion::Sim7600);
        assert!(sim7600.has_gps());
        assert_eq!(sim7600.iccid_query(), "AT+CICCID\r");
        assert_eq!(sim7600.cell_scan_prefix(), "+CPSI: ");
    }
}
