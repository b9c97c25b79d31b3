//! Side effect free helpers: operator tables, cell scan parsing and signal
//! level conversions.

pub mod apn;
pub mod cells;
pub(crate) mod cursor;
pub mod signal;

pub use apn::{auth_needed, get_apn, get_band, get_pass, get_user, has_psm_mode};
pub use cells::{process_cells, Cell, CellsData, MAX_CELLS};
pub use signal::{
    get_dbm_from_rssi, get_dbm_from_rxl, get_rssi_from_dbm, get_rssi_from_rxl, get_rxl_from_dbm,
    get_rxl_from_rssi, RssiData,
};
