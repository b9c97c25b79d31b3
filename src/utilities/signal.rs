//! Conversions between dBm, Rx level and `+CSQ` rssi.
//!
//! Rx level is `dBm + 113` and rssi is half the Rx level. Zero is passed
//! through unchanged in both directions: it marks a missing reading.

const BASE_DBM: i16 = -113;

/// `+CSQ` rssi meaning "not known or not detectable"
pub const RSSI_UNKNOWN: u8 = 99;

pub fn get_rxl_from_dbm(dbm: i16) -> i16 {
    if dbm == 0 {
        return 0;
    }
    dbm - BASE_DBM
}

pub fn get_dbm_from_rxl(rxl: i16) -> i16 {
    if rxl == 0 {
        return 0;
    }
    rxl + BASE_DBM
}

pub fn get_rssi_from_rxl(rxl: i16) -> i16 {
    rxl / 2
}

pub fn get_rxl_from_rssi(rssi: u8) -> i16 {
    if rssi == RSSI_UNKNOWN {
        return 0;
    }
    rssi as i16 * 2
}

pub fn get_rssi_from_dbm(dbm: i16) -> i16 {
    get_rssi_from_rxl(get_rxl_from_dbm(dbm))
}

pub fn get_dbm_from_rssi(rssi: u8) -> i16 {
    get_dbm_from_rxl(get_rxl_from_rssi(rssi))
}

/// Last signal quality reading, as reported by `+CSQ`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RssiData {
    pub available: bool,
    pub rssi: u8,
    pub ber: u8,
    pub rxl: i16,
    pub dbm: i16,
}

impl RssiData {
    pub fn from_csq(rssi: u8, ber: u8) -> Self {
        let rxl = get_rxl_from_rssi(rssi);
        Self {
            available: rssi != RSSI_UNKNOWN,
            rssi,
            ber,
            rxl,
            dbm: get_dbm_from_rxl(rxl),
        }
    }
}
