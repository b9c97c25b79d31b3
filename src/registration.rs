/// Registration state as reported in the `<stat>` field of `+CREG` / `+CEREG`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    #[default]
    None,
    NotRegistering,
    Home,
    Searching,
    Denied,
    Unknown,
    Roaming,
}

impl From<u8> for Status {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotRegistering,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            4 => Self::Unknown,
            5 => Self::Roaming,
            _ => Self::None,
        }
    }
}

impl Status {
    pub fn registered(&self) -> bool {
        matches!(self, Self::Home | Self::Roaming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_states() {
        assert!(Status::from(1).registered());
        assert!(Status::from(5).registered());
        assert!(!Status::from(2).registered());
        assert_eq!(Status::from(3), Status::Denied);
        assert_eq!(Status::from(42), Status::None);
    }
}
