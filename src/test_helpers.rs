extern crate std;

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::rc::Rc;
use std::string::{String, ToString};
use std::sync::Once;
use std::vec::Vec;

use crate::config::{CellularConfig, Events, Identity};

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .init();
    });
}

/// UART writer recording everything sent to the module.
#[derive(Debug, Clone, Default)]
pub struct MockUart {
    sent: Rc<RefCell<Vec<u8>>>,
    writes: Rc<Cell<usize>>,
}

impl MockUart {
    pub fn sent(&self) -> Vec<u8> {
        self.sent.borrow().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    /// Commands sent so far, split on `\r`
    pub fn commands(&self) -> Vec<String> {
        std::string::String::from_utf8_lossy(&self.sent.borrow())
            .split('\r')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect()
    }

    pub fn last_command(&self) -> Option<String> {
        self.commands().pop()
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl embedded_io::ErrorType for MockUart {
    type Error = Infallible;
}

impl embedded_io::Write for MockUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.sent.borrow_mut().extend_from_slice(buf);
        self.writes.set(self.writes.get() + 1);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// GPIO whose level is shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MockPin(pub Rc<Cell<bool>>);

impl MockPin {
    pub fn is_set(&self) -> bool {
        self.0.get()
    }
}

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

impl embedded_hal::digital::InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.get())
    }
}

/// Board where `STATUS` follows the module supply.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    pub vbat: MockPin,
    pub power_key: MockPin,
    pub level_shifter: MockPin,
    pub status: MockPin,
    pub uart_enabled: Rc<Cell<bool>>,
}

impl TestConfig {
    pub fn new() -> Self {
        let vbat = MockPin::default();
        Self {
            status: vbat.clone(),
            vbat,
            ..Default::default()
        }
    }
}

impl CellularConfig for TestConfig {
    type VbatCtrlPin = MockPin;
    type PowerKeyPin = MockPin;
    type LevelShifterPin = MockPin;
    type StatusPin = MockPin;

    const HOST: &'static str = "api.example.com";
    const PATH: &'static str = "/v1/measurements";

    fn vbat_ctrl_pin(&mut self) -> Option<&mut Self::VbatCtrlPin> {
        Some(&mut self.vbat)
    }

    fn power_key_pin(&mut self) -> Option<&mut Self::PowerKeyPin> {
        Some(&mut self.power_key)
    }

    fn level_shifter_pin(&mut self) -> Option<&mut Self::LevelShifterPin> {
        Some(&mut self.level_shifter)
    }

    fn status_pin(&mut self) -> Option<&mut Self::StatusPin> {
        Some(&mut self.status)
    }

    fn uart_init(&mut self) {
        self.uart_enabled.set(true);
    }

    fn uart_shutdown(&mut self) {
        self.uart_enabled.set(false);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    RegistrationFailed,
    DataSessionFailed,
    HttpFailed(u16),
    Timer3346,
    Hello {
        imei: String,
        iccid: String,
        imsi: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RecordingEvents {
    pub events: Rc<RefCell<Vec<Event>>>,
    pub battery_saving: Rc<Cell<bool>>,
}

impl RecordingEvents {
    pub fn take(&self) -> Vec<Event> {
        core::mem::take(&mut *self.events.borrow_mut())
    }
}

impl Events for RecordingEvents {
    fn battery_saving_mode(&mut self) -> bool {
        self.battery_saving.get()
    }

    fn registration_failed(&mut self) {
        self.events.borrow_mut().push(Event::RegistrationFailed);
    }

    fn data_session_failed(&mut self) {
        self.events.borrow_mut().push(Event::DataSessionFailed);
    }

    fn http_failed(&mut self, status: u16) {
        self.events.borrow_mut().push(Event::HttpFailed(status));
    }

    fn timer_3346(&mut self) {
        self.events.borrow_mut().push(Event::Timer3346);
    }

    fn hello(&mut self, identity: &Identity<'_>) {
        self.events.borrow_mut().push(Event::Hello {
            imei: identity.imei.to_string(),
            iccid: identity.iccid.to_string(),
            imsi: identity.imsi.to_string(),
        });
    }
}
