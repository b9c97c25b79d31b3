//! Operator tables: APN, credentials, NB-IoT band and PSM support per
//! (MCC, MNC, module family).

use crate::modules::{Module, ModuleParams as _, SimcomVersion};

pub const MCC_POLAND: u16 = 260;
pub const MCC_LUXEMBOURG: u16 = 270;
pub const MCC_BRAZIL: u16 = 724;
pub const MCC_PORTUGAL: u16 = 268;
pub const MCC_GERMANY: u16 = 262;
pub const MCC_NETHERLANDS: u16 = 204;
pub const MCC_DENMARK: u16 = 238;
pub const MCC_UK: u16 = 234;
pub const MCC_TURKEY: u16 = 286;
pub const MCC_INTERNATIONAL: u16 = 901;

/// Which module families an entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Families {
    Any,
    NbIot,
    NotNbIot,
}

impl Families {
    fn matches(self, version: SimcomVersion) -> bool {
        let nbiot = Module::from(version).is_nbiot();
        match self {
            Families::Any => true,
            Families::NbIot => nbiot,
            Families::NotNbIot => !nbiot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApnInfo {
    pub apn: &'static str,
    pub user: &'static str,
    pub pass: &'static str,
    /// NB-IoT band to lock to, if the operator needs one
    pub band: Option<u8>,
    pub psm: bool,
}

impl ApnInfo {
    const fn open(apn: &'static str) -> Self {
        Self {
            apn,
            user: "",
            pass: "",
            band: None,
            psm: false,
        }
    }

    const fn auth(apn: &'static str, user: &'static str, pass: &'static str) -> Self {
        Self {
            apn,
            user,
            pass,
            band: None,
            psm: false,
        }
    }

    const fn band(mut self, band: u8) -> Self {
        self.band = Some(band);
        self
    }

    const fn psm(mut self) -> Self {
        self.psm = true;
        self
    }
}

struct Entry {
    mcc: u16,
    /// `None` is the country default
    mnc: Option<u16>,
    families: Families,
    info: ApnInfo,
}

const fn op(mcc: u16, mnc: u16, info: ApnInfo) -> Entry {
    Entry {
        mcc,
        mnc: Some(mnc),
        families: Families::Any,
        info,
    }
}

const fn op_for(mcc: u16, mnc: u16, families: Families, info: ApnInfo) -> Entry {
    Entry {
        mcc,
        mnc: Some(mnc),
        families,
        info,
    }
}

const fn default_for(mcc: u16, info: ApnInfo) -> Entry {
    Entry {
        mcc,
        mnc: None,
        families: Families::Any,
        info,
    }
}

const FALLBACK: ApnInfo = ApnInfo::open("internet");

const POST_LU: ApnInfo = ApnInfo::open("internet.post.lu");
const VIVO_BR: ApnInfo = ApnInfo::auth("zap.vivo.com.br", "vivo", "vivo");
const MEO_PT: ApnInfo = ApnInfo::open("internet").band(20);
const KPN_NL: ApnInfo = ApnInfo::open("internet").band(8).psm();
const TDC_DK: ApnInfo = ApnInfo::open("internet").band(20);
const EE_UK: ApnInfo = ApnInfo::auth("everywhere", "eesecure", "secure");
const TURKCELL_TR: ApnInfo = ApnInfo::open("internet").band(20);
const ONCE_INT: ApnInfo = ApnInfo::open("iot.1nce.net").band(8).psm();

#[rustfmt::skip]
const TABLE: &[Entry] = &[
    // Poland
    op(MCC_POLAND, 1, ApnInfo::open("internet").band(20)),
    op(MCC_POLAND, 2, ApnInfo::open("internet").band(20)),
    op(MCC_POLAND, 3, ApnInfo::open("internet").band(20).psm()),
    op(MCC_POLAND, 6, ApnInfo::open("internet").band(20)),
    default_for(MCC_POLAND, ApnInfo::open("internet").band(20)),
    // Luxembourg
    op(MCC_LUXEMBOURG, 1, POST_LU),
    op(MCC_LUXEMBOURG, 77, ApnInfo::open("hsdpa")),
    op(MCC_LUXEMBOURG, 99, ApnInfo::open("orange.lu")),
    default_for(MCC_LUXEMBOURG, POST_LU),
    // Brazil
    op(MCC_BRAZIL, 2, ApnInfo::auth("timbrasil.br", "tim", "tim")),
    op(MCC_BRAZIL, 3, ApnInfo::auth("timbrasil.br", "tim", "tim")),
    op(MCC_BRAZIL, 4, ApnInfo::auth("timbrasil.br", "tim", "tim")),
    op(MCC_BRAZIL, 5, ApnInfo::auth("claro.com.br", "claro", "claro")),
    op(MCC_BRAZIL, 6, VIVO_BR),
    op(MCC_BRAZIL, 10, VIVO_BR),
    op(MCC_BRAZIL, 11, VIVO_BR),
    default_for(MCC_BRAZIL, VIVO_BR),
    // Portugal
    op_for(MCC_PORTUGAL, 1, Families::NbIot, ApnInfo::open("nbiot.vodafone.pt").band(20).psm()),
    op_for(MCC_PORTUGAL, 1, Families::NotNbIot, ApnInfo::open("net2.vodafone.pt")),
    op(MCC_PORTUGAL, 3, ApnInfo::open("internet.nos.pt").band(20)),
    op(MCC_PORTUGAL, 6, MEO_PT),
    default_for(MCC_PORTUGAL, MEO_PT),
    // Germany
    op_for(MCC_GERMANY, 1, Families::NbIot, ApnInfo::open("internet.nbiot.telekom.de").band(8).psm()),
    op_for(MCC_GERMANY, 1, Families::NotNbIot, ApnInfo::auth("internet.telekom", "telekom", "tm")),
    op(MCC_GERMANY, 2, ApnInfo::open("web.vodafone.de").band(20)),
    op(MCC_GERMANY, 3, ApnInfo::open("internet").band(20)),
    default_for(MCC_GERMANY, ApnInfo::open("internet")),
    // Netherlands
    op(MCC_NETHERLANDS, 4, ApnInfo::open("live.vodafone.com").band(20)),
    op(MCC_NETHERLANDS, 8, KPN_NL),
    op(MCC_NETHERLANDS, 16, ApnInfo::open("internet.t-mobile").band(8)),
    default_for(MCC_NETHERLANDS, KPN_NL),
    // Denmark
    op(MCC_DENMARK, 1, TDC_DK),
    op(MCC_DENMARK, 2, ApnInfo::open("internet").band(20)),
    op(MCC_DENMARK, 20, ApnInfo::open("www.internet.mtelia.dk").band(20).psm()),
    default_for(MCC_DENMARK, TDC_DK),
    // United Kingdom
    op(MCC_UK, 10, ApnInfo::auth("mobile.o2.co.uk", "o2web", "password")),
    op(MCC_UK, 15, ApnInfo::auth("wap.vodafone.co.uk", "wap", "wap").band(20)),
    op(MCC_UK, 30, EE_UK),
    default_for(MCC_UK, EE_UK),
    // Turkey
    op(MCC_TURKEY, 1, TURKCELL_TR),
    op(MCC_TURKEY, 2, ApnInfo::open("internet").band(8)),
    op(MCC_TURKEY, 3, ApnInfo::open("internet").band(20)),
    default_for(MCC_TURKEY, TURKCELL_TR),
    // International
    op(MCC_INTERNATIONAL, 28, ApnInfo::open("iot.vodafone.com").band(20)),
    op(MCC_INTERNATIONAL, 40, ONCE_INT),
    default_for(MCC_INTERNATIONAL, ONCE_INT),
];

/// Every explicitly listed (MCC, MNC) pair.
pub fn operators() -> impl Iterator<Item = (u16, u16)> {
    TABLE
        .iter()
        .filter_map(|entry| entry.mnc.map(|mnc| (entry.mcc, mnc)))
}

/// Resolve the operator entry, falling back to the country default and then
/// to a plain `"internet"` APN.
pub fn lookup(mcc: u16, mnc: u16, version: SimcomVersion) -> ApnInfo {
    let exact = TABLE.iter().find(|entry| {
        entry.mcc == mcc && entry.mnc == Some(mnc) && entry.families.matches(version)
    });
    let default = || {
        TABLE
            .iter()
            .find(|entry| entry.mcc == mcc && entry.mnc.is_none())
    };

    match exact.or_else(default) {
        Some(entry) => entry.info,
        None => {
            debug!("No APN entry for {}/{}, using fallback", mcc, mnc);
            FALLBACK
        }
    }
}

pub fn get_apn(mcc: u16, mnc: u16, version: SimcomVersion) -> &'static str {
    lookup(mcc, mnc, version).apn
}

pub fn auth_needed(mcc: u16, mnc: u16, version: SimcomVersion) -> bool {
    !lookup(mcc, mnc, version).user.is_empty()
}

pub fn get_user(mcc: u16, mnc: u16, version: SimcomVersion) -> &'static str {
    lookup(mcc, mnc, version).user
}

pub fn get_pass(mcc: u16, mnc: u16, version: SimcomVersion) -> &'static str {
    lookup(mcc, mnc, version).pass
}

pub fn get_band(mcc: u16, mnc: u16, version: SimcomVersion) -> Option<u8> {
    lookup(mcc, mnc, version).band
}

pub fn has_psm_mode(mcc: u16, mnc: u16, version: SimcomVersion) -> bool {
    lookup(mcc, mnc, version).psm
}

/// Split the home network out of an IMSI. All supported operators use two
/// digit MNCs.
pub fn mcc_mnc_from_imsi(imsi: &str) -> Option<(u16, u16)> {
    let mcc = imsi.get(0..3)?.parse().ok()?;
    let mnc = imsi.get(3..5)?.parse().ok()?;
    Some((mcc, mnc))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSIONS: [SimcomVersion; 5] = [
        SimcomVersion::Sim800,
        SimcomVersion::Sim868,
        SimcomVersion::Sim7020,
        SimcomVersion::Sim7080,
        SimcomVersion::Sim7600,
    ];

    #[test]
    fn table_is_total() {
        for (mcc, mnc) in operators() {
            for version in VERSIONS {
                let apn = get_apn(mcc, mnc, version);
                let user = get_user(mcc, mnc, version);
                let pass = get_pass(mcc, mnc, version);
                assert!(!apn.is_empty(), "{}/{} {:?}", mcc, mnc, version);
                assert_eq!(auth_needed(mcc, mnc, version), !user.is_empty());
                assert_eq!(user.is_empty(), pass.is_empty());
            }
        }
    }

    #[test]
    fn country_defaults() {
        let v = SimcomVersion::Sim800;
        assert_eq!(get_apn(MCC_LUXEMBOURG, 55, v), "internet.post.lu");
        assert_eq!(get_apn(MCC_BRAZIL, 99, v), "zap.vivo.com.br");
        assert!(auth_needed(MCC_BRAZIL, 99, v));
        assert_eq!(get_apn(MCC_UK, 1, v), "everywhere");
        assert_eq!(get_apn(MCC_INTERNATIONAL, 1, v), "iot.1nce.net");
        assert_eq!(get_apn(310, 260, v), "internet");
        assert_eq!(get_band(310, 260, v), None);
        assert!(!has_psm_mode(310, 260, v));
    }

    #[test]
    fn family_dependent_operators() {
        assert_eq!(
            get_apn(MCC_GERMANY, 1, SimcomVersion::Sim7080),
            "internet.nbiot.telekom.de"
        );
        assert!(!auth_needed(MCC_GERMANY, 1, SimcomVersion::Sim7080));
        assert!(has_psm_mode(MCC_GERMANY, 1, SimcomVersion::Sim7020));

        assert_eq!(get_apn(MCC_GERMANY, 1, SimcomVersion::Sim800), "internet.telekom");
        assert_eq!(get_user(MCC_GERMANY, 1, SimcomVersion::Sim7600), "telekom");
        assert_eq!(get_pass(MCC_GERMANY, 1, SimcomVersion::Sim7600), "tm");

        assert_eq!(
            get_apn(MCC_PORTUGAL, 1, SimcomVersion::Sim7020),
            "nbiot.vodafone.pt"
        );
        assert_eq!(
            get_apn(MCC_PORTUGAL, 1, SimcomVersion::Sim868),
            "net2.vodafone.pt"
        );
    }

    #[test]
    fn imsi_split() {
        assert_eq!(mcc_mnc_from_imsi("260031234567890"), Some((260, 3)));
        assert_eq!(mcc_mnc_from_imsi("26"), None);
        assert_eq!(mcc_mnc_from_imsi("26x03"), None);
    }
}
