//! Timed power-on / power-off pin sequences.
//!
//! Both sequences advance only on elapsed time and the `STATUS` pin, never on
//! AT responses, so they work before the module talks.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{InputPin, OutputPin};

use crate::config::CellularConfig;
use crate::error::Error;
use crate::module_timing::{
    status_off_timeout, status_on_timeout, vbat_off_time, vbat_settle_time,
};
use crate::modules::ModuleParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerOnState {
    Beginning,
    SetVbatCtrl,
    ClearPowerKey,
    WaitForStatus,
    Finishing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerOffState {
    Beginning,
    ClearPowerKey,
    WaitForStatus,
    ClearVbatCtrl,
    ClearLvlShOe,
    Finishing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerEvent {
    PoweredOn,
    /// Woken from PSM by a `PWRKEY` pulse, session state is still valid
    Woken,
    PoweredOff,
}

/// Pulse lengths of the current module family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerTimings {
    pub on_pull: Duration,
    pub off_pull: Duration,
    pub boot_wait: Duration,
}

impl PowerTimings {
    pub fn of<M: ModuleParams>(module: M) -> Self {
        Self {
            on_pull: module.power_on_pull_time(),
            off_pull: module.power_off_pull_time(),
            boot_wait: module.boot_wait(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PowerControl {
    on: Option<PowerOnState>,
    off: Option<PowerOffState>,
    wake_only: bool,
    since: Instant,
}

impl PowerControl {
    pub const fn new() -> Self {
        Self {
            on: None,
            off: None,
            wake_only: false,
            since: Instant::from_ticks(0),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.on.is_some() || self.off.is_some()
    }

    pub fn power_on_state(&self) -> Option<PowerOnState> {
        self.on
    }

    pub fn power_off_state(&self) -> Option<PowerOffState> {
        self.off
    }

    pub fn start_power_on(&mut self, now: Instant) {
        debug!("Power on sequence started");
        self.off = None;
        self.on = Some(PowerOnState::Beginning);
        self.wake_only = false;
        self.since = now;
    }

    /// Pulse `PWRKEY` to bring a module out of PSM, leaving the supply alone.
    pub fn start_wake(&mut self, now: Instant) {
        debug!("PSM wake sequence started");
        self.off = None;
        self.on = Some(PowerOnState::SetVbatCtrl);
        self.wake_only = true;
        self.since = now;
    }

    pub fn start_power_off(&mut self, now: Instant) {
        if self.off.is_some() {
            return;
        }
        debug!("Power off sequence started");
        self.on = None;
        self.off = Some(PowerOffState::Beginning);
        self.since = now;
    }

    fn enter_on(&mut self, state: Option<PowerOnState>, now: Instant) {
        trace!("Power on: {:?} -> {:?}", self.on, state);
        self.on = state;
        self.since = now;
    }

    fn enter_off(&mut self, state: Option<PowerOffState>, now: Instant) {
        trace!("Power off: {:?} -> {:?}", self.off, state);
        self.off = state;
        self.since = now;
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.since)
    }

    /// Advance whichever sequence is active.
    pub fn step<C: CellularConfig>(
        &mut self,
        config: &mut C,
        timings: PowerTimings,
        now: Instant,
    ) -> Result<Option<PowerEvent>, Error> {
        if let Some(state) = self.on {
            return self.step_on(state, config, timings, now);
        }
        if let Some(state) = self.off {
            return self.step_off(state, config, timings, now);
        }
        Ok(None)
    }

    fn step_on<C: CellularConfig>(
        &mut self,
        state: PowerOnState,
        config: &mut C,
        timings: PowerTimings,
        now: Instant,
    ) -> Result<Option<PowerEvent>, Error> {
        match state {
            PowerOnState::Beginning => {
                config.uart_init();
                set_pin(config.level_shifter_pin(), true)?;
                set_pin(config.vbat_ctrl_pin(), true)?;
                self.enter_on(Some(PowerOnState::SetVbatCtrl), now);
            }
            PowerOnState::SetVbatCtrl => {
                if self.wake_only || self.elapsed(now) >= vbat_settle_time() {
                    set_pin(config.power_key_pin(), true)?;
                    self.enter_on(Some(PowerOnState::ClearPowerKey), now);
                }
            }
            PowerOnState::ClearPowerKey => {
                if self.elapsed(now) >= timings.on_pull {
                    set_pin(config.power_key_pin(), false)?;
                    self.enter_on(Some(PowerOnState::WaitForStatus), now);
                }
            }
            PowerOnState::WaitForStatus => {
                if status_high(config)? {
                    self.enter_on(Some(PowerOnState::Finishing), now);
                } else if self.elapsed(now) >= status_on_timeout() {
                    warn!("STATUS did not rise after power on");
                    self.enter_on(Some(PowerOnState::Finishing), now);
                }
            }
            PowerOnState::Finishing => {
                if self.elapsed(now) >= timings.boot_wait {
                    self.enter_on(None, now);
                    return Ok(Some(if self.wake_only {
                        info!("Module woken from PSM");
                        PowerEvent::Woken
                    } else {
                        info!("Module powered on");
                        PowerEvent::PoweredOn
                    }));
                }
            }
        }
        Ok(None)
    }

    fn step_off<C: CellularConfig>(
        &mut self,
        state: PowerOffState,
        config: &mut C,
        timings: PowerTimings,
        now: Instant,
    ) -> Result<Option<PowerEvent>, Error> {
        match state {
            PowerOffState::Beginning => {
                set_pin(config.power_key_pin(), true)?;
                self.enter_off(Some(PowerOffState::ClearPowerKey), now);
            }
            PowerOffState::ClearPowerKey => {
                if self.elapsed(now) >= timings.off_pull {
                    set_pin(config.power_key_pin(), false)?;
                    self.enter_off(Some(PowerOffState::WaitForStatus), now);
                }
            }
            PowerOffState::WaitForStatus => {
                if !status_high(config)? {
                    self.enter_off(Some(PowerOffState::ClearVbatCtrl), now);
                } else if self.elapsed(now) >= status_off_timeout() {
                    warn!("STATUS still high after power off, cutting supply");
                    self.enter_off(Some(PowerOffState::ClearVbatCtrl), now);
                }
            }
            PowerOffState::ClearVbatCtrl => {
                set_pin(config.vbat_ctrl_pin(), false)?;
                self.enter_off(Some(PowerOffState::ClearLvlShOe), now);
            }
            PowerOffState::ClearLvlShOe => {
                if self.elapsed(now) >= vbat_off_time() {
                    set_pin(config.level_shifter_pin(), false)?;
                    config.uart_shutdown();
                    self.enter_off(Some(PowerOffState::Finishing), now);
                }
            }
            PowerOffState::Finishing => {
                info!("Module powered off");
                self.enter_off(None, now);
                return Ok(Some(PowerEvent::PoweredOff));
            }
        }
        Ok(None)
    }
}

fn set_pin<P: OutputPin>(pin: Option<&mut P>, high: bool) -> Result<(), Error> {
    if let Some(pin) = pin {
        if high {
            pin.set_high().map_err(|_| Error::IoPin)?;
        } else {
            pin.set_low().map_err(|_| Error::IoPin)?;
        }
    }
    Ok(())
}

/// A board without a `STATUS` pin reads as powered.
pub(crate) fn status_high<C: CellularConfig>(config: &mut C) -> Result<bool, Error> {
    match config.status_pin() {
        Some(pin) => pin.is_high().map_err(|_| Error::IoPin),
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Generic;
    use crate::test_helpers::TestConfig;

    fn run_until_event(
        power: &mut PowerControl,
        config: &mut TestConfig,
        start_ms: u64,
    ) -> (PowerEvent, u64) {
        let timings = PowerTimings::of(Generic);
        let mut ms = start_ms;
        loop {
            if let Some(event) = power.step(config, timings, Instant::from_millis(ms)).unwrap() {
                return (event, ms);
            }
            ms += 10;
            assert!(ms < start_ms + 60_000, "sequence never finished");
        }
    }

    #[test]
    fn power_on_sequence() {
        let mut config = TestConfig::new();
        let mut power = PowerControl::new();
        power.start_power_on(Instant::from_millis(0));
        assert!(power.is_busy());

        let (event, ms) = run_until_event(&mut power, &mut config, 0);
        assert_eq!(event, PowerEvent::PoweredOn);
        assert!(config.vbat.is_set());
        assert!(config.level_shifter.is_set());
        assert!(!config.power_key.is_set());
        assert!(config.uart_enabled.get());
        // settle + pulse + boot
        assert!(ms >= 100 + 1200 + 3000);
        assert!(!power.is_busy());
    }

    #[test]
    fn power_off_waits_for_status_timeout() {
        let mut config = TestConfig::new();
        let mut power = PowerControl::new();
        power.start_power_on(Instant::from_millis(0));
        let (_, ms) = run_until_event(&mut power, &mut config, 0);

        power.start_power_off(Instant::from_millis(ms));
        let (event, end) = run_until_event(&mut power, &mut config, ms);
        assert_eq!(event, PowerEvent::PoweredOff);
        assert!(!config.vbat.is_set());
        assert!(!config.level_shifter.is_set());
        assert!(!config.uart_enabled.get());
        // STATUS follows VBAT in the test board, so the timeout elapses
        assert!(end - ms >= 1500 + 10_000 + 500);
    }

    #[test]
    fn wake_keeps_supply() {
        let mut config = TestConfig::new();
        let mut power = PowerControl::new();
        power.start_wake(Instant::from_millis(0));
        let (event, _) = run_until_event(&mut power, &mut config, 0);
        assert_eq!(event, PowerEvent::Woken);
        assert!(!config.vbat.is_set());
    }
}
