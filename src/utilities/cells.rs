//! Parsing of cell scan results (`+CENG` / `+CPSI`) for every module family.

use heapless::Vec;

use super::cursor::Cursor;
use super::signal::get_rxl_from_dbm;
use crate::modules::{Module, ModuleParams as _, SimcomVersion};

pub const MAX_CELLS: usize = 7;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cell {
    /// LAC on 2G, TAC on LTE
    pub lac: u32,
    pub cell_id: u32,
    pub rxl: i16,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CellsData {
    /// Network of the serving cell
    pub mcc: u16,
    pub mnc: u16,
    pub cells: Vec<Cell, MAX_CELLS>,
}

struct Parsed {
    network: Option<(u16, u16)>,
    cell: Cell,
}

/// Extract up to `max_cells` cells from a scan response.
///
/// `home` is used as the network when the layout does not report one
/// (SIM7020). Parsing stops at the first cell with a zero or all-ones id.
pub fn process_cells(
    text: &str,
    version: SimcomVersion,
    max_cells: usize,
    home: Option<(u16, u16)>,
) -> CellsData {
    let prefix = Module::from(version).cell_scan_prefix();
    let max_cells = max_cells.min(MAX_CELLS);
    let mut data = CellsData::default();
    let mut first = true;

    for line in text.split(['\r', '\n']) {
        if data.cells.len() >= max_cells {
            break;
        }
        let Some(mut cursor) = Cursor::after(line, prefix) else {
            continue;
        };
        // Mode and summary lines of `+CENG` carry no quoted cell record
        if version != SimcomVersion::Sim7600 && !line.contains('"') {
            continue;
        }

        let parsed = match version {
            SimcomVersion::Sim800 => parse_sim800(&mut cursor),
            SimcomVersion::Sim868 => parse_sim868(&mut cursor),
            SimcomVersion::Sim7020 => parse_sim7020(&mut cursor),
            SimcomVersion::Sim7080 => parse_sim7080(&mut cursor),
            SimcomVersion::Sim7600 => parse_sim7600(&mut cursor),
        };
        let Some(parsed) = parsed else {
            trace!("Skipping unparsable cell line");
            continue;
        };

        if matches!(parsed.cell.cell_id, 0 | 0xFFFF | 0xFFFF_FFFF) {
            break;
        }

        if first {
            if let Some((mcc, mnc)) = parsed.network.or(home) {
                data.mcc = mcc;
                data.mnc = mnc;
            }
            first = false;
        }
        // Bounded by `max_cells <= MAX_CELLS`
        data.cells.push(parsed.cell).ok();
    }

    data
}

/// `+CENG: <cell>,"<mcc>,<mnc>,<lac>,<cellid>,<bsic>,<rxl>"`
fn parse_sim800(c: &mut Cursor) -> Option<Parsed> {
    c.skip(1);
    let mcc = c.next_parsed()?;
    let mnc = c.next_parsed()?;
    let lac = c.next_hex()?;
    let cell_id = c.next_hex()?;
    let rxl = c.skip(1).next_parsed()?;
    Some(Parsed {
        network: Some((mcc, mnc)),
        cell: Cell { lac, cell_id, rxl },
    })
}

/// Serving cell:
/// `+CENG: 0,"<arfcn>,<rxl>,<rxq>,<mcc>,<mnc>,<bsic>,<cellid>,<rla>,<txp>,<lac>,<ta>"`
///
/// Neighbours:
/// `+CENG: <n>,"<arfcn>,<rxl>,<bsic>,<cellid>,<mcc>,<mnc>,<lac>"`
fn parse_sim868(c: &mut Cursor) -> Option<Parsed> {
    let index: u8 = c.next_parsed()?;
    let rxl = c.skip(1).next_parsed()?;
    if index == 0 {
        let mcc = c.skip(1).next_parsed()?;
        let mnc = c.next_parsed()?;
        let cell_id = c.skip(1).next_hex()?;
        let lac = c.skip(2).next_hex()?;
        Some(Parsed {
            network: Some((mcc, mnc)),
            cell: Cell { lac, cell_id, rxl },
        })
    } else {
        let cell_id = c.skip(1).next_hex()?;
        let mcc = c.next_parsed()?;
        let mnc = c.next_parsed()?;
        let lac = c.next_hex()?;
        Some(Parsed {
            network: Some((mcc, mnc)),
            cell: Cell { lac, cell_id, rxl },
        })
    }
}

/// `+CENG: <earfcn>,<offset>,<pci>,"<cellid>",<rsrp>,<rsrq>,<rssi>,<snr>,<band>,"<tac>",...`
fn parse_sim7020(c: &mut Cursor) -> Option<Parsed> {
    let cell_id = c.skip(3).next_hex()?;
    let rsrp: i16 = c.next_parsed()?;
    let lac = c.skip(4).next_hex()?;
    Some(Parsed {
        network: None,
        cell: Cell {
            lac,
            cell_id,
            rxl: get_rxl_from_dbm(rsrp),
        },
    })
}

/// `+CENG: <cell>,"<earfcn>,<pci>,<rsrp>,<rssi>,<rsrq>,<sinr>,<tac>,<cellid>,<mcc>,<mnc>,<txpwr>"`
fn parse_sim7080(c: &mut Cursor) -> Option<Parsed> {
    let rsrp: i16 = c.skip(3).next_parsed()?;
    let lac = c.skip(3).next_hex()?;
    let cell_id = c.next_hex()?;
    let mcc = c.next_parsed()?;
    let mnc = c.next_parsed()?;
    Some(Parsed {
        network: Some((mcc, mnc)),
        cell: Cell {
            lac,
            cell_id,
            rxl: get_rxl_from_dbm(rsrp),
        },
    })
}

/// LTE: `+CPSI: LTE,Online,<mcc>-<mnc>,<tac>,<cellid>,<pci>,<band>,<earfcn>,<dlbw>,<ulbw>,<rsrq>,<rsrp>,...`
///
/// GSM: `+CPSI: GSM,Online,<mcc>-<mnc>,<lac>,<cellid>,<arfcn>,<rxlev>,...`
///
/// The cell id is decimal, the rsrp is in tenths of a dBm.
fn parse_sim7600(c: &mut Cursor) -> Option<Parsed> {
    let mode = c.next_field()?;
    if !matches!(mode, "LTE" | "GSM") {
        return None;
    }
    let mut network = Cursor::with_delimiter(c.skip(1).next_field()?, '-');
    let mcc = network.next_parsed()?;
    let mnc = network.next_parsed()?;
    let lac = c.next_hex()?;
    let cell_id = c.next_parsed()?;
    let dbm: i16 = if mode == "LTE" {
        c.skip(6).next_parsed::<i16>()? / 10
    } else {
        c.skip(1).next_parsed()?
    };
    Some(Parsed {
        network: Some((mcc, mnc)),
        cell: Cell {
            lac,
            cell_id,
            rxl: get_rxl_from_dbm(dbm),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim800_stops_at_empty_cell() {
        let text = "AT+CENG?\r\r\n+CENG: 3,1\r\n\r\n\
                    +CENG: 0,\"260,03,1f4e,5a3b,45,32\"\r\n\
                    +CENG: 1,\"260,02,0c21,7d01,12,20\"\r\n\
                    +CENG: 2,\"000,00,0000,0000,00,00\"\r\n\
                    +CENG: 3,\"260,03,1f4e,5a3c,44,18\"\r\n\r\nOK\r\n";
        let data = process_cells(text, SimcomVersion::Sim800, MAX_CELLS, None);
        assert_eq!((data.mcc, data.mnc), (260, 3));
        assert_eq!(
            &data.cells[..],
            &[
                Cell { lac: 0x1f4e, cell_id: 0x5a3b, rxl: 32 },
                Cell { lac: 0x0c21, cell_id: 0x7d01, rxl: 20 },
            ]
        );
    }

    #[test]
    fn sim868_serving_and_neighbours() {
        let text = "+CENG: 1,1\r\n\
                    +CENG: 0,\"0024,38,00,262,01,52,6a2f,05,05,0b3c,0\"\r\n\
                    +CENG: 1,\"0019,25,47,6a30,262,01,0b3c\"\r\n";
        let data = process_cells(text, SimcomVersion::Sim868, MAX_CELLS, None);
        assert_eq!((data.mcc, data.mnc), (262, 1));
        assert_eq!(data.cells.len(), 2);
        assert_eq!(data.cells[0], Cell { lac: 0x0b3c, cell_id: 0x6a2f, rxl: 38 });
        assert_eq!(data.cells[1], Cell { lac: 0x0b3c, cell_id: 0x6a30, rxl: 25 });
    }

    #[test]
    fn sim7020_uses_home_network() {
        let text = "+CENG: 6300,0,441,\"01A2D001\",-90,-10,-60,8,20,\"1F4E\",0,10,2\r\n\
                    +CENG: 6300,442,-95,-12\r\n";
        let data = process_cells(text, SimcomVersion::Sim7020, MAX_CELLS, Some((204, 8)));
        assert_eq!((data.mcc, data.mnc), (204, 8));
        assert_eq!(
            &data.cells[..],
            &[Cell { lac: 0x1F4E, cell_id: 0x01A2D001, rxl: 23 }]
        );
    }

    #[test]
    fn sim7080_respects_max_cells() {
        let text = "+CENG: 1,1,3,NB-IOT\r\n\
                    +CENG: 0,\"6300,441,-85,-60,-9,12,1F4E,01A2D001,262,01,23\"\r\n\
                    +CENG: 1,\"6300,442,-100,-70,-12,3,1F4E,01A2D002,262,01,23\"\r\n\
                    +CENG: 2,\"6300,443,-110,-75,-14,1,1F4E,01A2D003,262,01,23\"\r\n";
        let data = process_cells(text, SimcomVersion::Sim7080, 2, None);
        assert_eq!((data.mcc, data.mnc), (262, 1));
        assert_eq!(data.cells.len(), 2);
        assert_eq!(data.cells[0], Cell { lac: 0x1F4E, cell_id: 0x01A2D001, rxl: 28 });
        assert_eq!(data.cells[1].rxl, 13);
    }

    #[test]
    fn sim7600_cpsi() {
        let lte = "+CPSI: LTE,Online,260-03,0x1F4E,27447553,441,EUTRAN-BAND20,6300,5,5,-110,-1040,-750,13\r\n";
        let data = process_cells(lte, SimcomVersion::Sim7600, MAX_CELLS, None);
        assert_eq!((data.mcc, data.mnc), (260, 3));
        assert_eq!(
            &data.cells[..],
            &[Cell { lac: 0x1F4E, cell_id: 27447553, rxl: 9 }]
        );

        let gsm = "+CPSI: GSM,Online,260-03,0x1f4e,23003,68 EGSM 900,-67,0,42-42\r\n";
        let data = process_cells(gsm, SimcomVersion::Sim7600, MAX_CELLS, None);
        assert_eq!(data.cells[0].rxl, 46);

        let none = "+CPSI: NO SERVICE,Online\r\n";
        assert!(process_cells(none, SimcomVersion::Sim7600, MAX_CELLS, None)
            .cells
            .is_empty());
    }
}
