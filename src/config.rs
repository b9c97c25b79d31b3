use embassy_time::Duration;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

pub struct NoPin;

impl ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl InputPin for NoPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Hardware wiring and build-time settings of the cellular module.
///
/// Every pin is optional. A missing `STATUS` pin reads as "on", which makes
/// the power sequences fall back to their timeouts.
pub trait CellularConfig {
    /// Switches the module supply (`VBAT_CTRL`)
    type VbatCtrlPin: OutputPin;
    /// Drives `PWRKEY`, active high on the carrier board
    type PowerKeyPin: OutputPin;
    /// Output enable of the UART level shifter (`LVL_SH_OE`)
    type LevelShifterPin: OutputPin;
    /// Module `STATUS` output
    type StatusPin: InputPin;

    /// Host the HTTP uploads are sent to
    const HOST: &'static str;
    const PATH: &'static str = "/";
    const HTTP_PORT: u16 = 80;
    const HTTPS_PORT: u16 = 443;

    /// Configure power saving mode on NB-IoT modules where the operator allows it
    const USE_PSM: bool = false;
    /// Requested periodic TAU (T3412), as the `AT+CPSMS` bit field
    const PSM_T3412: u8 = 0b0010_0001;
    /// Requested active time (T3324), as the `AT+CPSMS` bit field
    const PSM_T3324: u8 = 0b0000_0101;

    fn vbat_ctrl_pin(&mut self) -> Option<&mut Self::VbatCtrlPin>;
    fn power_key_pin(&mut self) -> Option<&mut Self::PowerKeyPin>;
    fn level_shifter_pin(&mut self) -> Option<&mut Self::LevelShifterPin>;
    fn status_pin(&mut self) -> Option<&mut Self::StatusPin>;

    /// Called right before the module is powered on
    fn uart_init(&mut self) {}

    /// Called once the module is fully powered off
    fn uart_shutdown(&mut self) {}
}

/// Identity of the module and SIM, reported once per power cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Identity<'a> {
    pub imei: &'a str,
    pub iccid: &'a str,
    pub imsi: &'a str,
}

/// Hooks into the application's telemetry and power policy.
///
/// The failure hooks fire once a failure class has persisted for longer than
/// [`crate::backoff::FAILURE_REPORT_THRESHOLD`].
pub trait Events {
    /// Whether the device wants the module off as soon as possible
    fn battery_saving_mode(&mut self) -> bool {
        false
    }

    fn registration_failed(&mut self) {}

    fn data_session_failed(&mut self) {}

    fn http_failed(&mut self, _status: u16) {}

    /// The network rejected an NB-IoT registration and started T3346
    fn timer_3346(&mut self) {}

    fn hello(&mut self, _identity: &Identity<'_>) {}
}

/// Live knobs, re-read on every [`crate::Cellular::spin`].
#[derive(Debug, Clone, Copy)]
pub struct Policy<'a> {
    /// How long an idle data session is kept open after an upload
    pub remain_data_session_open: Duration,
    /// Upper bound of the registration retry backoff
    pub registration_failed_next_try: Duration,
    /// Sent as the `X-Firmware-Version` header
    pub firmware_version: &'a str,
    pub https: bool,
    pub gps: bool,
}

impl Default for Policy<'_> {
    fn default() -> Self {
        Self {
            remain_data_session_open: Duration::from_secs(60),
            registration_failed_next_try: Duration::from_secs(60 * 60),
            firmware_version: "0.0.0",
            https: false,
            gps: false,
        }
    }
}
