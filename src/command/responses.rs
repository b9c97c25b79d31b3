//! Typed views of the single-line responses the state machines branch on.
//!
//! Each is parsed from the response line alone (prefix included), e.g.
//! `+CSQ: 20,99`.
use atat::atat_derive::AtatResp;
use heapless::String;

/// `+CSQ: <rssi>,<ber>`
#[derive(Debug, Clone, PartialEq, Eq, AtatResp)]
pub struct SignalQuality {
    #[at_arg(position = 0)]
    pub rssi: u8,
    #[at_arg(position = 1)]
    pub ber: u8,
}

/// `+CREG: <n>,<stat>` / `+CEREG: <n>,<stat>`
#[derive(Debug, Clone, PartialEq, Eq, AtatResp)]
pub struct NetworkRegistration {
    #[at_arg(position = 0)]
    pub n: u8,
    #[at_arg(position = 1)]
    pub stat: u8,
}

/// `+CGATT: <state>`
#[derive(Debug, Clone, PartialEq, Eq, AtatResp)]
pub struct AttachState {
    #[at_arg(position = 0)]
    pub state: u8,
}

/// `+SAPBR: <cid>,<status>,<ip>`
#[derive(Debug, Clone, PartialEq, Eq, AtatResp)]
pub struct BearerStatus {
    #[at_arg(position = 0)]
    pub cid: u8,
    #[at_arg(position = 1)]
    pub status: u8,
    #[at_arg(position = 2)]
    pub ip: String<16>,
}

/// `+CGACT: <cid>,<state>`
#[derive(Debug, Clone, PartialEq, Eq, AtatResp)]
pub struct ContextState {
    #[at_arg(position = 0)]
    pub cid: u8,
    #[at_arg(position = 1)]
    pub state: u8,
}

/// `+HTTPACTION: <method>,<status>,<length>`
#[derive(Debug, Clone, PartialEq, Eq, AtatResp)]
pub struct HttpAction {
    #[at_arg(position = 0)]
    pub method: u8,
    #[at_arg(position = 1)]
    pub status: u16,
    #[at_arg(position = 2)]
    pub length: u32,
}

/// `+SHREQ: "<type>",<status>,<length>`
#[derive(Debug, Clone, PartialEq, Eq, AtatResp)]
pub struct ShRequest {
    #[at_arg(position = 0)]
    pub method: String<8>,
    #[at_arg(position = 1)]
    pub status: u16,
    #[at_arg(position = 2)]
    pub length: u32,
}

/// `+CHTTPNMIH: <host_id>,<status>,<header_length>,<header>`
///
/// Only the leading fields are decoded; the header text may contain commas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChttpHeader {
    pub status: u16,
    pub content_length: Option<u32>,
}

/// Extract the first complete line starting with `prefix` from a transaction.
pub fn line_with<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let start = text.find(prefix)?;
    let line = &text[start..];
    let end = line.find(['\r', '\n'])?;
    Some(&line[..end])
}

/// Decode the line starting with `prefix` into `T`.
pub fn parse<'a, T: serde::Deserialize<'a>>(text: &'a str, prefix: &str) -> Option<T> {
    let line = line_with(text, prefix)?;
    atat::serde_at::de::from_str(line).ok()
}

impl ChttpHeader {
    pub fn parse(text: &str) -> Option<Self> {
        let line = line_with(text, "+CHTTPNMIH: ")?;
        let mut fields = line["+CHTTPNMIH: ".len()..].splitn(4, ',');
        let status = fields.nth(1)?.trim().parse().ok()?;
        let header = fields.nth(1).unwrap_or("");

        let content_length = header
            .split("\\r\\n")
            .chain(header.split('\n'))
            .find_map(|h| {
                let (name, value) = h.split_once(':')?;
                name.trim()
                    .trim_matches('"')
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().trim_matches('"').parse::<u32>().ok())
                    .flatten()
            });

        Some(Self {
            status,
            content_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atat::serde_at::de::from_str;

    #[test]
    fn deserialize_csq() {
        assert_eq!(
            from_str("+CSQ: 20,99"),
            Ok(SignalQuality { rssi: 20, ber: 99 })
        );
    }

    #[test]
    fn deserialize_registration() {
        assert_eq!(
            from_str("+CEREG: 0,1\r\n"),
            Ok(NetworkRegistration { n: 0, stat: 1 })
        );
        let text = "AT+CREG?\r\r\n+CREG: 1,5\r\n\r\nOK\r\n";
        assert_eq!(
            parse::<NetworkRegistration>(text, "+CREG: "),
            Some(NetworkRegistration { n: 1, stat: 5 })
        );
    }

    #[test]
    fn deserialize_http_responses() {
        assert_eq!(
            parse::<HttpAction>("+HTTPACTION: 1,200,46\r\n", "+HTTPACTION: "),
            Some(HttpAction {
                method: 1,
                status: 200,
                length: 46
            })
        );
        assert_eq!(
            parse::<ShRequest>("+SHREQ: \"POST\",404,0\r\n", "+SHREQ: "),
            Some(ShRequest {
                method: String::try_from("POST").unwrap(),
                status: 404,
                length: 0
            })
        );
    }

    #[test]
    fn deserialize_bearer() {
        assert_eq!(
            parse::<BearerStatus>("AT+SAPBR=2,1\r\r\n+SAPBR: 1,3,\"0.0.0.0\"\r\n", "+SAPBR: "),
            Some(BearerStatus {
                cid: 1,
                status: 3,
                ip: String::try_from("0.0.0.0").unwrap()
            })
        );
    }

    #[test]
    fn incomplete_line_is_not_parsed() {
        assert_eq!(parse::<SignalQuality>("+CSQ: 20,9", "+CSQ: "), None);
    }

    #[test]
    fn chttp_header() {
        let text = "\r\n+CHTTPNMIH: 0,200,61,\"Content-Type: application/json\\r\\nContent-Length: 12\\r\\n\"\r\n";
        assert_eq!(
            ChttpHeader::parse(text),
            Some(ChttpHeader {
                status: 200,
                content_length: Some(12)
            })
        );
    }
}
