//! HTTP POST of the pending upload and retrieval of the server answer.
//!
//! Three AT dialects are driven by the same machine:
//!
//! | dialect | families        | setup                                   | read            |
//! |---------|-----------------|-----------------------------------------|-----------------|
//! | Legacy  | SIM800/868/7600 | `+HTTPINIT`, `+HTTPPARA`, `+HTTPDATA`   | `+HTTPREAD`     |
//! | Chttp   | SIM7020         | `+CHTTPCREATE`, `+CHTTPCON`             | `+CHTTPNMIC` URC|
//! | Sh      | SIM7080         | `+SHCONF`, `+SHCONN`, `+SHAHEAD`        | `+SHREAD`       |
//!
//! After a transfer the machine lingers in `WaitForMoreData` so a follow-up
//! upload reuses the open HTTP context.

use core::ops::Range;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant};
use embedded_io::Write;
use heapless::{String, Vec};

use super::{format_command, text, Cellular, Phase, TX_BUFFER_SIZE};
use crate::command::responses::{line_with, parse, ChttpHeader, HttpAction, ShRequest};
use crate::command::{Action, Transaction, COMMAND_CAPACITY};
use crate::config::{CellularConfig, Events};
use crate::framer::find;
use crate::hex::{base64_len, decode_hex, encode_base64, encode_hex};
use crate::modules::{HttpCommandSet, Module, ModuleParams as _, SessionKind, SimcomVersion};
use crate::utilities::cursor::Cursor;

/// Bytes requested per `+HTTPREAD` / `+SHREAD`
pub const HTTP_READ_CHUNK: usize = 512;
/// NOK answers and 4xx codes tolerated before the upload is dropped
pub const MAX_HTTP_RETRIES: u8 = 3;

const WAIT_FOR_MORE_DATA: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONTENT_TYPE: &str = "application/json";

const BASE64_CAPACITY: usize = base64_len(TX_BUFFER_SIZE);
const BODY_HEX_CAPACITY: usize = 2 * BASE64_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HttpState {
    Idle,
    Starting,

    Init,
    SetCid,
    EnableSsl,
    SetUrl,
    SetContentType,
    SetVersionHeader,
    SetBody,
    SendBody,
    Request,
    Terminate,

    Create,
    Connect,
    ChttpSend,
    Disconnect,
    Destroy,

    ShConfUrl,
    ShBodyLen,
    ShHeaderLen,
    ShSslVersion,
    ShSsl,
    ShConnect,
    ShClearHeaders,
    ShContentType,
    ShVersionHeader,
    ShBody,
    ShSendRequest,
    ShDisconnect,

    Read,
    WaitForMoreData,
    Finished,
}

/// Result of looking for a `+HTTPREAD: <len>` / `+SHREAD: <len>` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Chunk {
    Incomplete,
    Invalid,
    Data(Range<usize>),
}

/// Locate the data announced by `prefix` in `bytes`.
///
/// The header line is `<prefix>[DATA,]<len>`, followed by one line terminator
/// and exactly `len` raw bytes.
pub(crate) fn read_payload(bytes: &[u8], prefix: &str) -> Chunk {
    let Some(start) = find(bytes, prefix.as_bytes()) else {
        return Chunk::Incomplete;
    };
    let header_start = start + prefix.len();
    let Some(eol) = bytes[header_start..]
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
    else {
        return Chunk::Incomplete;
    };

    let header = text(&bytes[header_start..header_start + eol]);
    let header = header.strip_prefix("DATA,").unwrap_or(header).trim();
    let Ok(len) = header.parse::<usize>() else {
        return Chunk::Invalid;
    };

    let mut data_start = header_start + eol;
    if bytes.get(data_start) == Some(&b'\r') {
        data_start += 1;
    }
    if bytes.get(data_start) == Some(&b'\n') {
        data_start += 1;
    }
    if bytes.len() < data_start + len {
        return Chunk::Incomplete;
    }
    Chunk::Data(data_start..data_start + len)
}

/// `+CHTTPNMIC: <host_id>,<flag>,<content_len>,<cur_len>,<hex content>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChttpContent {
    pub more: bool,
    pub total: usize,
    pub data: Vec<u8, HTTP_READ_CHUNK>,
}

impl ChttpContent {
    pub fn parse(text: &str) -> Option<Self> {
        let line = line_with(text, "+CHTTPNMIC: ")?;
        let mut cursor = Cursor::after(line, "+CHTTPNMIC: ")?;
        let more = cursor.skip(1).next_parsed::<u8>()? == 1;
        let total = cursor.next_parsed::<usize>()?;
        let len = cursor.next_parsed::<usize>()?;
        let data = decode_hex(cursor.next_field().unwrap_or("")).ok()?;
        if data.len() != len {
            return None;
        }
        Some(Self { more, total, data })
    }
}

impl<'d, M, C, W, E, const Q: usize, const RX: usize> Cellular<'d, M, C, W, E, Q, RX>
where
    M: RawMutex,
    C: CellularConfig,
    W: Write,
    E: Events,
{
    fn set_http(&mut self, now: Instant, state: HttpState) {
        debug!("HTTP: {:?} -> {:?}", self.http, state);
        self.http = state;
        if state == HttpState::WaitForMoreData {
            self.session.state_since = Some(now);
        }
        self.next_command(now, None);
    }

    fn scheme_and_port(&self) -> (&'static str, u16) {
        if self.policy.https {
            ("https", C::HTTPS_PORT)
        } else {
            ("http", C::HTTP_PORT)
        }
    }

    pub(super) fn http_machine(&mut self, now: Instant) {
        let Some(module) = self.require_module() else {
            return;
        };

        match (self.http, self.action) {
            (HttpState::Idle, _) => self.set_http(now, HttpState::Starting),
            (HttpState::Starting, Action::SendingCommand) => {
                self.downloaded.clear();
                self.download_available = false;
                self.session.total_size = 0;
                self.session.total_read_size = 0;
                self.session.last_read_size = 0;
                let first = match module.http_commands() {
                    HttpCommandSet::Legacy if self.session.http_init => self.legacy_after_init(module),
                    HttpCommandSet::Legacy => HttpState::Init,
                    HttpCommandSet::Chttp if self.session.http_connected => HttpState::ChttpSend,
                    HttpCommandSet::Chttp if self.session.http_context_saved => HttpState::Connect,
                    HttpCommandSet::Chttp => HttpState::Create,
                    HttpCommandSet::Sh if self.session.http_connected => HttpState::ShClearHeaders,
                    HttpCommandSet::Sh => HttpState::ShConfUrl,
                };
                info!("Uploading {} bytes", self.upload.len());
                self.set_http(now, first);
            }

            (HttpState::Read, Action::SendingCommand) => self.read_next(now, module),
            (HttpState::Read, Action::GoodResponse) => match module.http_commands() {
                HttpCommandSet::Legacy => self.on_read_chunk(now, module, "+HTTPREAD: "),
                HttpCommandSet::Sh => self.on_read_chunk(now, module, "+SHREAD: "),
                HttpCommandSet::Chttp => self.on_chttp_content(now, module),
            },

            (HttpState::WaitForMoreData, Action::SendingCommand) => {
                if self.has_data_to_upload() && !self.http_backoff.is_running(now) {
                    self.set_http(now, HttpState::Starting);
                    return;
                }
                let since = self.session.state_since.unwrap_or(now);
                if now.saturating_duration_since(since) >= WAIT_FOR_MORE_DATA {
                    let teardown = teardown_state(module);
                    self.set_http(now, teardown);
                }
            }

            (HttpState::Finished, _) => {
                self.http = HttpState::Idle;
                self.enter_phase(Phase::DataSession);
            }

            _ => match module.http_commands() {
                HttpCommandSet::Legacy => self.legacy_machine(now, module),
                HttpCommandSet::Chttp => self.chttp_machine(now, module),
                HttpCommandSet::Sh => self.sh_machine(now, module),
            },
        }
    }

    fn legacy_after_init(&self, module: Module) -> HttpState {
        if module.session_kind() == SessionKind::Bearer {
            HttpState::SetCid
        } else {
            HttpState::SetUrl
        }
    }

    fn legacy_machine(&mut self, now: Instant, module: Module) {
        use HttpState::*;

        match (self.http, self.action) {
            // Fails when a context survived from an earlier transfer
            (Init, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+HTTPINIT\r").tolerant())
            }
            (Init, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.http_init = true;
                let next = self.legacy_after_init(module);
                self.set_http(now, next);
            }

            (SetCid, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+HTTPPARA=\"CID\",1\r"))
            }
            (SetCid, Action::GoodResponse) => {
                let ssl_capable = matches!(
                    module.version(),
                    SimcomVersion::Sim800 | SimcomVersion::Sim868
                );
                if self.policy.https && ssl_capable && !self.session.https_set {
                    self.set_http(now, EnableSsl);
                } else {
                    self.set_http(now, SetUrl);
                }
            }

            (EnableSsl, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+HTTPSSL=1\r"))
            }
            (EnableSsl, Action::GoodResponse) => {
                self.session.https_set = true;
                self.set_http(now, SetUrl);
            }

            (SetUrl, Action::SendingCommand) => {
                let (scheme, port) = self.scheme_and_port();
                self.send(
                    now,
                    at!(
                        "AT+HTTPPARA=\"URL\",\"{}://{}:{}{}\"\r",
                        scheme,
                        C::HOST,
                        port,
                        C::PATH
                    ),
                );
            }
            (SetUrl, Action::GoodResponse) => self.set_http(now, SetContentType),

            (SetContentType, Action::SendingCommand) => {
                self.send(now, at!("AT+HTTPPARA=\"CONTENT\",\"{}\"\r", CONTENT_TYPE))
            }
            (SetContentType, Action::GoodResponse) => self.set_http(now, SetVersionHeader),

            (SetVersionHeader, Action::SendingCommand) => {
                let transaction = at!(
                    "AT+HTTPPARA=\"USERDATA\",\"X-Firmware-Version: {}\"\r",
                    self.policy.firmware_version.as_str()
                );
                self.send(now, transaction);
            }
            (SetVersionHeader, Action::GoodResponse) => self.set_http(now, SetBody),

            (SetBody, Action::SendingCommand) => {
                let transaction =
                    at!("AT+HTTPDATA={},10000\r", self.upload.len()).expecting("DOWNLOAD");
                self.send(now, transaction);
            }
            (SetBody, Action::GoodResponse) => self.set_http(now, SendBody),

            // The DOWNLOAD prompt carries no OK, so the body goes out forced
            (SendBody, Action::SendingCommand) => self.send(
                now,
                Transaction::upload()
                    .forced()
                    .timeout(Duration::from_secs(15)),
            ),
            (SendBody, Action::GoodResponse) => self.set_http(now, Request),

            (Request, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+HTTPACTION=1\r")
                    .expecting("+HTTPACTION: ")
                    .timeout(REQUEST_TIMEOUT),
            ),
            (Request, Action::GoodResponse) => {
                let response = self.response("+HTTPACTION: ");
                match parse::<HttpAction>(text(&response), "+HTTPACTION: ") {
                    Some(action) => {
                        self.on_http_status(now, module, action.status, Some(action.length as usize))
                    }
                    None => self.action = Action::BadResponse,
                }
            }

            (Terminate, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+HTTPTERM\r").tolerant())
            }
            (Terminate, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.http_init = false;
                self.session.https_set = false;
                self.set_http(now, Finished);
            }

            _ => {}
        }
    }

    fn chttp_machine(&mut self, now: Instant, module: Module) {
        use HttpState::*;

        match (self.http, self.action) {
            (Create, Action::SendingCommand) => {
                let (scheme, port) = self.scheme_and_port();
                let transaction = at!("AT+CHTTPCREATE=\"{}://{}:{}/\"\r", scheme, C::HOST, port)
                    .expecting("+CHTTPCREATE: ");
                self.send(now, transaction);
            }
            (Create, Action::GoodResponse) => {
                self.session.http_context_saved = true;
                self.set_http(now, Connect);
            }

            (Connect, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+CHTTPCON=0\r").timeout(Duration::from_secs(30)),
            ),
            (Connect, Action::GoodResponse) => {
                self.session.http_connected = true;
                self.set_http(now, ChttpSend);
            }

            (ChttpSend, Action::SendingCommand) => match self.chttp_send_command() {
                Some(command) => self.send(
                    now,
                    Transaction::text(command)
                        .expecting("+CHTTPNMIH: ")
                        .timeout(REQUEST_TIMEOUT),
                ),
                None => self.action = Action::BadResponse,
            },
            (ChttpSend, Action::GoodResponse) => {
                let response = self.response("+CHTTPNMIH: ");
                match ChttpHeader::parse(text(&response)) {
                    Some(header) => self.on_http_status(
                        now,
                        module,
                        header.status,
                        header.content_length.map(|len| len as usize),
                    ),
                    None => self.action = Action::BadResponse,
                }
            }

            (Disconnect, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+CHTTPDISCON=0\r").tolerant())
            }
            (Disconnect, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.http_connected = false;
                self.set_http(now, Destroy);
            }

            (Destroy, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+CHTTPDESTROY=0\r").tolerant())
            }
            (Destroy, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.http_context_saved = false;
                self.set_http(now, Finished);
            }

            _ => {}
        }
    }

    /// `AT+CHTTPSEND=0,1,"<path>","<hex header>","<type>","<hex(base64(body))>"`
    fn chttp_send_command(&self) -> Option<String<COMMAND_CAPACITY>> {
        let mut header: String<64> = String::new();
        header.push_str("X-Firmware-Version: ").ok()?;
        header.push_str(&self.policy.firmware_version).ok()?;
        header.push_str("\r\n").ok()?;
        let mut header_hex: Vec<u8, 128> = Vec::new();
        encode_hex(header.as_bytes(), &mut header_hex).ok()?;

        let mut body: Vec<u8, BASE64_CAPACITY> = Vec::new();
        encode_base64(&self.upload, &mut body).ok()?;
        let mut body_hex: Vec<u8, BODY_HEX_CAPACITY> = Vec::new();
        encode_hex(&body, &mut body_hex).ok()?;

        let mut command = format_command(format_args!(
            "AT+CHTTPSEND=0,1,\"{}\",\"{}\",\"{}\",\"",
            C::PATH,
            text(&header_hex),
            CONTENT_TYPE
        ));
        command.push_str(text(&body_hex)).ok()?;
        command.push_str("\"\r").ok()?;
        Some(command)
    }

    fn sh_machine(&mut self, now: Instant, module: Module) {
        use HttpState::*;

        match (self.http, self.action) {
            (ShConfUrl, Action::SendingCommand) => {
                let (scheme, port) = self.scheme_and_port();
                self.send(
                    now,
                    at!("AT+SHCONF=\"URL\",\"{}://{}:{}\"\r", scheme, C::HOST, port),
                );
            }
            (ShConfUrl, Action::GoodResponse) => self.set_http(now, ShBodyLen),

            (ShBodyLen, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+SHCONF=\"BODYLEN\",1024\r"))
            }
            (ShBodyLen, Action::GoodResponse) => self.set_http(now, ShHeaderLen),

            (ShHeaderLen, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+SHCONF=\"HEADERLEN\",350\r"))
            }
            (ShHeaderLen, Action::GoodResponse) => {
                if self.policy.https {
                    self.set_http(now, ShSslVersion);
                } else {
                    self.set_http(now, ShConnect);
                }
            }

            (ShSslVersion, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+CSSLCFG=\"sslversion\",1,3\r"),
            ),
            (ShSslVersion, Action::GoodResponse) => self.set_http(now, ShSsl),

            (ShSsl, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+SHSSL=1,\"\"\r"))
            }
            (ShSsl, Action::GoodResponse) => {
                self.session.https_set = true;
                self.set_http(now, ShConnect);
            }

            (ShConnect, Action::SendingCommand) => self.send(
                now,
                Transaction::command("AT+SHCONN\r").timeout(Duration::from_secs(60)),
            ),
            (ShConnect, Action::GoodResponse) => {
                self.session.http_connected = true;
                self.set_http(now, ShClearHeaders);
            }

            (ShClearHeaders, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+SHCHEAD\r"))
            }
            (ShClearHeaders, Action::GoodResponse) => self.set_http(now, ShContentType),

            (ShContentType, Action::SendingCommand) => self.send(
                now,
                at!("AT+SHAHEAD=\"Content-Type\",\"{}\"\r", CONTENT_TYPE),
            ),
            (ShContentType, Action::GoodResponse) => self.set_http(now, ShVersionHeader),

            (ShVersionHeader, Action::SendingCommand) => {
                let transaction = at!(
                    "AT+SHAHEAD=\"X-Firmware-Version\",\"{}\"\r",
                    self.policy.firmware_version.as_str()
                );
                self.send(now, transaction);
            }
            (ShVersionHeader, Action::GoodResponse) => self.set_http(now, ShBody),

            (ShBody, Action::SendingCommand) => match self.sh_body_command() {
                Some(command) => self.send(now, Transaction::text(command)),
                None => {
                    error!("Upload is not text");
                    self.drop_upload();
                    self.set_http(now, WaitForMoreData);
                }
            },
            (ShBody, Action::GoodResponse) => self.set_http(now, ShSendRequest),

            (ShSendRequest, Action::SendingCommand) => self.send(
                now,
                at!("AT+SHREQ=\"{}\",3\r", C::PATH)
                    .expecting("+SHREQ: ")
                    .timeout(REQUEST_TIMEOUT),
            ),
            (ShSendRequest, Action::GoodResponse) => {
                let response = self.response("+SHREQ: ");
                match parse::<ShRequest>(text(&response), "+SHREQ: ") {
                    Some(request) => self.on_http_status(
                        now,
                        module,
                        request.status,
                        Some(request.length as usize),
                    ),
                    None => self.action = Action::BadResponse,
                }
            }

            (ShDisconnect, Action::SendingCommand) => {
                self.send(now, Transaction::command("AT+SHDISC\r").tolerant())
            }
            (ShDisconnect, Action::GoodResponse | Action::ErrorResponse) => {
                self.session.http_connected = false;
                self.session.https_set = false;
                self.set_http(now, Finished);
            }

            _ => {}
        }
    }

    /// `AT+SHBOD="<body>",<len>`, with `"` and `\` escaped.
    fn sh_body_command(&self) -> Option<String<COMMAND_CAPACITY>> {
        let body = core::str::from_utf8(&self.upload).ok()?;
        let mut command: String<COMMAND_CAPACITY> = String::new();
        command.push_str("AT+SHBOD=\"").ok()?;
        for c in body.chars() {
            if c == '"' || c == '\\' {
                command.push('\\').ok()?;
            }
            command.push(c).ok()?;
        }
        command.push('"').ok()?;
        command.push_str(&format_command(format_args!(",{}\r", self.upload.len())))
            .ok()?;
        Some(command)
    }

    fn on_http_status(&mut self, now: Instant, module: Module, status: u16, length: Option<usize>) {
        self.session.http_status = status;
        info!("HTTP status {}, {:?} bytes", status, length);

        match status {
            200..=299 => {
                self.http_backoff.succeed();
                self.session.total_size = length.unwrap_or(usize::MAX);
                self.session.total_read_size = 0;
                if length == Some(0) {
                    self.finish_transfer(now, module);
                } else {
                    self.set_http(now, HttpState::Read);
                }
            }
            400..=499 => {
                warn!("Upload rejected with {}", status);
                self.retry_or_drop(now, module);
            }
            _ => {
                if self.http_backoff.fail(now) {
                    self.events.http_failed(status);
                }
                warn!(
                    "Server error {}, next upload in {} s",
                    status,
                    self.http_backoff.next_try_timeout().as_secs()
                );
                self.set_http(now, teardown_state(module));
            }
        }
    }

    fn read_next(&mut self, now: Instant, module: Module) {
        if self.skip_downloaded {
            debug!("Skipping downloaded data");
            self.downloaded.clear();
            self.complete_upload();
            self.set_http(now, HttpState::WaitForMoreData);
            return;
        }

        let offset = self.session.total_read_size;
        let len = self
            .session
            .total_size
            .saturating_sub(offset)
            .min(HTTP_READ_CHUNK);
        let transaction = match module.http_commands() {
            HttpCommandSet::Legacy => {
                at!("AT+HTTPREAD={},{}\r", offset, len).expecting("+HTTPREAD: ")
            }
            HttpCommandSet::Sh => at!("AT+SHREAD={},{}\r", offset, len).expecting("+SHREAD: "),
            HttpCommandSet::Chttp => {
                Transaction::wait_for("+CHTTPNMIC: ").timeout(Duration::from_secs(30))
            }
        };
        self.send(now, transaction);
    }

    fn on_read_chunk(&mut self, now: Instant, module: Module, prefix: &str) {
        let response = self.response(prefix);
        match read_payload(&response, prefix) {
            Chunk::Incomplete => self.keep_waiting(now),
            Chunk::Invalid => {
                warn!("Malformed read header");
                self.action = Action::BadResponse;
            }
            Chunk::Data(range) => {
                let data = &response[range];
                let done = data.is_empty();
                self.store_download(data);
                if done || self.session.total_read_size >= self.session.total_size {
                    self.finish_transfer(now, module);
                } else {
                    self.set_http(now, HttpState::Read);
                }
            }
        }
    }

    fn on_chttp_content(&mut self, now: Instant, module: Module) {
        let response = self.response("+CHTTPNMIC: ");
        let Some(content) = ChttpContent::parse(text(&response)) else {
            self.action = Action::BadResponse;
            return;
        };
        // The next URC is searched after this one
        self.framer.consume_through("+CHTTPNMIC: ");

        self.session.total_size = content.total;
        self.store_download(&content.data);
        if !content.more || self.session.total_read_size >= self.session.total_size {
            self.finish_transfer(now, module);
        } else {
            self.set_http(now, HttpState::Read);
        }
    }

    fn store_download(&mut self, data: &[u8]) {
        self.session.last_read_size = data.len();
        self.session.total_read_size += data.len();
        let room = self.downloaded.capacity() - self.downloaded.len();
        if data.len() > room {
            warn!("Answer truncated to {} bytes", self.downloaded.capacity());
        }
        self.downloaded
            .extend_from_slice(&data[..data.len().min(room)])
            .ok();
        trace!(
            "Read {} of {} bytes",
            self.session.total_read_size,
            self.session.total_size
        );
    }

    fn finish_transfer(&mut self, now: Instant, module: Module) {
        if self.downloaded.starts_with(b"NOK") {
            warn!("Server answered NOK");
            self.downloaded.clear();
            self.retry_or_drop(now, module);
            return;
        }
        info!("Upload complete, {} bytes answered", self.downloaded.len());
        self.complete_upload();
        self.set_http(now, HttpState::WaitForMoreData);
    }

    fn retry_or_drop(&mut self, now: Instant, module: Module) {
        self.session.http_retries += 1;
        if self.session.http_retries >= MAX_HTTP_RETRIES {
            self.drop_upload();
            self.set_http(now, HttpState::WaitForMoreData);
        } else {
            debug!("Retry {} of the upload", self.session.http_retries);
            self.set_http(now, retry_state(module));
        }
    }
}

/// Where a re-send of the same body starts, with the HTTP context kept
fn retry_state(module: Module) -> HttpState {
    match module.http_commands() {
        HttpCommandSet::Legacy => HttpState::SetBody,
        HttpCommandSet::Chttp => HttpState::ChttpSend,
        HttpCommandSet::Sh => HttpState::ShBody,
    }
}

fn teardown_state(module: Module) -> HttpState {
    match module.http_commands() {
        HttpCommandSet::Legacy => HttpState::Terminate,
        HttpCommandSet::Chttp => HttpState::Disconnect,
        HttpCommandSet::Sh => HttpState::ShDisconnect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_read_block() {
        let bytes = b"+HTTPREAD: 5\r\nhello\r\nOK\r\n";
        assert_eq!(read_payload(bytes, "+HTTPREAD: "), Chunk::Data(14..19));
    }

    #[test]
    fn sim7600_read_block() {
        let bytes = b"OK\r\n\r\n+HTTPREAD: DATA,2\r\nOK\r\n+HTTPREAD: 0\r\n";
        assert_eq!(read_payload(bytes, "+HTTPREAD: "), Chunk::Data(25..27));
        assert_eq!(&bytes[25..27], b"OK");
    }

    #[test]
    fn read_block_waits_for_all_bytes() {
        assert_eq!(
            read_payload(b"+SHREAD: 10\r\n{\"a\"", "+SHREAD: "),
            Chunk::Incomplete
        );
        assert_eq!(read_payload(b"+SHREAD: 1", "+SHREAD: "), Chunk::Incomplete);
        assert_eq!(read_payload(b"+SHREAD: x\r\n", "+SHREAD: "), Chunk::Invalid);
    }

    #[test]
    fn chttp_content_is_hex_decoded() {
        let text = "\r\n+CHTTPNMIC: 0,1,10,5,68656C6C6F\r\n";
        assert_eq!(
            ChttpContent::parse(text),
            Some(ChttpContent {
                more: true,
                total: 10,
                data: Vec::from_slice(b"hello").unwrap(),
            })
        );
        // Length mismatch
        assert_eq!(ChttpContent::parse("+CHTTPNMIC: 0,0,5,4,68656C6C6F\r\n"), None);
    }
}
