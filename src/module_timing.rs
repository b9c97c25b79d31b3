use embassy_time::Duration;

/// Time for the supply to settle after `VBAT_CTRL` is switched on
pub fn vbat_settle_time() -> Duration {
    Duration::from_millis(100)
}

/// How long to wait for `STATUS` to go high after the power-on pulse
pub fn status_on_timeout() -> Duration {
    Duration::from_secs(5)
}

/// How long to wait for `STATUS` to go low after the power-off pulse
pub fn status_off_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Time the module needs after `VBAT_CTRL` is cleared before it may be powered again
pub fn vbat_off_time() -> Duration {
    Duration::from_millis(500)
}

/// Minimum pause between two polls of a status query (`+CREG?`, `+SAPBR=2,1`, ...)
pub fn status_poll_interval() -> Duration {
    Duration::from_secs(2)
}

/// A command that could not be sent because no `OK` was seen is forced out after this long
pub fn send_blocked_timeout() -> Duration {
    Duration::from_secs(5)
}
