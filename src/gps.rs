//! NMEA sentences streamed by the GNSS capable modules (`+CGNSTST`, `+CGPSINFOCFG`).
//!
//! Sentence framing, checksums and field parsing are done by [`nmea0183`];
//! this module only folds `GGA` and `RMC` results into a [`GpsInfo`].

use nmea0183::{ParseResult, Parser, GGA, RMC};

/// Latest position, in integer units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpsInfo {
    /// `hhmmss`
    pub utc_time: u32,
    /// Micro-degrees, north positive
    pub latitude: i32,
    /// Micro-degrees, east positive
    pub longitude: i32,
    pub altitude_mm: i32,
    pub speed_mm_per_sec: i32,
    pub satellites: u8,
    pub fix_valid: bool,
}

const MM_PER_SEC_PER_KNOT: f32 = 514.444;

/// Byte-wise NMEA receiver.
pub struct NmeaReceiver {
    parser: Parser,
}

impl Default for NmeaReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaReceiver {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Drop a partially received sentence.
    pub fn reset(&mut self) {
        self.parser = Parser::new();
    }

    /// Feed one received byte, updating `info` whenever a `GGA` or `RMC`
    /// sentence completes. Other sentences are ignored.
    ///
    /// Sentences must end in `\r\n`.
    pub fn feed(&mut self, byte: u8, info: &mut GpsInfo) {
        match self.parser.parse_from_byte(byte) {
            Some(Ok(ParseResult::GGA(Some(gga)))) => apply_gga(&gga, info),
            Some(Ok(ParseResult::RMC(Some(rmc)))) => apply_rmc(&rmc, info),
            Some(Ok(ParseResult::GGA(None) | ParseResult::RMC(None))) => info.fix_valid = false,
            Some(Ok(_)) | None => {}
            Some(Err(e)) => trace!("NMEA: {}", e),
        }
    }
}

fn apply_gga(gga: &GGA, info: &mut GpsInfo) {
    info.utc_time = hhmmss(gga.time.hours, gga.time.minutes, gga.time.seconds);
    info.latitude = micro_degrees(gga.latitude.as_f64());
    info.longitude = micro_degrees(gga.longitude.as_f64());
    info.altitude_mm = round(gga.altitude.meters as f64 * 1000.0);
    info.satellites = gga.sat_in_use;
    info.fix_valid = true;
}

fn apply_rmc(rmc: &RMC, info: &mut GpsInfo) {
    let time = &rmc.datetime.time;
    info.utc_time = hhmmss(time.hours, time.minutes, time.seconds);
    info.latitude = micro_degrees(rmc.latitude.as_f64());
    info.longitude = micro_degrees(rmc.longitude.as_f64());
    info.speed_mm_per_sec = round((rmc.speed.as_knots() * MM_PER_SEC_PER_KNOT) as f64);
    info.fix_valid = true;
}

fn hhmmss(hours: u8, minutes: u8, seconds: f32) -> u32 {
    hours as u32 * 10_000 + minutes as u32 * 100 + seconds as u32
}

fn micro_degrees(degrees: f64) -> i32 {
    round(degrees * 1_000_000.0)
}

/// Round half away from zero; `f64::round` needs `std`.
fn round(value: f64) -> i32 {
    if value < 0.0 {
        (value - 0.5) as i32
    } else {
        (value + 0.5) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(receiver: &mut NmeaReceiver, info: &mut GpsInfo, bytes: &[u8]) {
        for &b in bytes {
            receiver.feed(b, info);
        }
    }

    #[test]
    fn gga_fix() {
        let mut receiver = NmeaReceiver::new();
        let mut info = GpsInfo::default();
        feed_all(
            &mut receiver,
            &mut info,
            b"$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76\r\n",
        );
        assert!(info.fix_valid);
        assert_eq!(info.utc_time, 92750);
        assert_eq!(info.satellites, 8);
        assert_eq!(info.altitude_mm, 61_700);
        assert_eq!(info.latitude, 53_361_337);
        assert_eq!(info.longitude, -6_505_620);
    }

    #[test]
    fn rmc_speed() {
        let mut receiver = NmeaReceiver::new();
        let mut info = GpsInfo::default();
        feed_all(
            &mut receiver,
            &mut info,
            b"$GPRMC,092750.000,A,5321.6802,N,00630.3372,W,0.02,31.66,280511,,,A*43\r\n",
        );
        assert!(info.fix_valid);
        assert_eq!(info.utc_time, 92750);
        assert_eq!(info.speed_mm_per_sec, 10);
    }

    #[test]
    fn rmc_without_fix() {
        let mut receiver = NmeaReceiver::new();
        let mut info = GpsInfo::default();
        feed_all(&mut receiver, &mut info, b"$GNRMC,,V,,,,,,,,,,N*4D\r\n");
        assert!(!info.fix_valid);
        assert_eq!(info.latitude, 0);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let mut receiver = NmeaReceiver::new();
        let mut info = GpsInfo::default();
        feed_all(
            &mut receiver,
            &mut info,
            b"$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*77\r\n",
        );
        assert!(!info.fix_valid);
        assert_eq!(info, GpsInfo::default());
    }

    #[test]
    fn reset_drops_partial_sentence() {
        let mut receiver = NmeaReceiver::new();
        let mut info = GpsInfo::default();
        feed_all(&mut receiver, &mut info, b"$GPGGA,0927");
        receiver.reset();
        feed_all(
            &mut receiver,
            &mut info,
            b"$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76\r\n",
        );
        assert!(info.fix_valid);
        assert_eq!(info.satellites, 8);
    }
}
