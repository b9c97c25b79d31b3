//! Command/response framing on top of the raw UART byte stream.
//!
//! Bytes from the UART ISR are appended to a circular buffer holding the last
//! `N` bytes. Two independent views are kept over that buffer:
//!
//! - the *unread* region, drained line by line with [`Framer::read_responses`]
//!   (used for logging and for streamed NMEA sentences),
//! - the *transaction window*, everything received since the last
//!   [`Framer::send_command`], searched by [`Framer::last_completed_transaction`].
//!
//! On overflow the oldest bytes are overwritten; both views shrink accordingly.

use embedded_io::Write;
use heapless::Vec;

use crate::error::Error;
use crate::fmt::LossyStr;

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

pub struct Framer<W, const N: usize = DEFAULT_BUFFER_SIZE> {
    uart: W,
    buf: [u8; N],
    /// Next write index
    head: usize,
    /// Bytes not yet handed out by `read_responses`
    unread: usize,
    /// `\r` bytes within the unread region
    pending: usize,
    /// Bytes belonging to the current transaction window
    window_len: usize,
    ready: bool,
    last_byte: u8,
}

impl<W: Write, const N: usize> Framer<W, N> {
    pub fn new(uart: W) -> Self {
        Self {
            uart,
            buf: [0; N],
            head: 0,
            unread: 0,
            pending: 0,
            window_len: 0,
            ready: true,
            last_byte: 0,
        }
    }

    /// Feed one received byte.
    pub fn rx_new_char(&mut self, byte: u8) {
        if N == 0 {
            return;
        }

        if self.unread == N {
            // Full: the oldest unread byte is the one about to be overwritten
            if self.buf[self.head] == b'\r' {
                self.pending -= 1;
            }
        } else {
            self.unread += 1;
        }

        self.buf[self.head] = byte;
        self.head = (self.head + 1) % N;
        self.window_len = (self.window_len + 1).min(N);

        if byte == b'\r' {
            self.pending += 1;
        }
        if self.last_byte == b'O' && byte == b'K' {
            self.ready = true;
        }
        self.last_byte = byte;
    }

    /// Transmit `cmd` if the previous command has been answered with `OK`, or
    /// unconditionally when `force` is set.
    ///
    /// Opens a new transaction window on success.
    pub fn send_command(&mut self, cmd: &[u8], force: bool) -> nb::Result<(), Error> {
        if !self.ready && !force {
            return Err(nb::Error::WouldBlock);
        }

        trace!("UART TX: {:?}", LossyStr(cmd));
        self.uart.write_all(cmd).map_err(|_| Error::Uart)?;
        self.uart.flush().map_err(|_| Error::Uart)?;

        self.window_len = 0;
        self.ready = false;
        self.last_byte = 0;
        Ok(())
    }

    pub fn ready_to_rx_new_command(&self) -> bool {
        self.ready
    }

    /// Number of complete (`\r` terminated) lines not yet drained.
    pub fn how_many_new_responses(&self) -> usize {
        self.pending
    }

    /// Drain complete lines into `out`, returning the number of bytes written.
    ///
    /// Line terminators are normalised to a single `\n`.
    pub fn read_responses(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while self.pending > 0 && n < out.len() {
            let tail = (self.head + N - self.unread) % N;
            let byte = self.buf[tail];
            self.unread -= 1;

            let byte = if byte == b'\r' {
                self.pending -= 1;
                b'\n'
            } else {
                byte
            };

            if byte == b'\n' && n > 0 && out[n - 1] == b'\n' {
                continue;
            }
            out[n] = byte;
            n += 1;
        }
        n
    }

    /// Everything received since the last command, starting at the first
    /// occurrence of `expected`. The command echo is not searched.
    pub fn last_completed_transaction(&self, expected: &str) -> Option<Vec<u8, N>> {
        let (_, answer) = self.answer();
        let pos = find(&answer, expected.as_bytes())?;
        Vec::from_slice(&answer[pos..]).ok()
    }

    /// Whether `needle` has been received in the current transaction, followed
    /// by the end of its line.
    pub fn transaction_contains(&self, needle: &str) -> bool {
        let (_, answer) = self.answer();
        match find(&answer, needle.as_bytes()) {
            Some(pos) => answer[pos + needle.len()..]
                .iter()
                .any(|&b| b == b'\r' || b == b'\n'),
            None => false,
        }
    }

    /// Move the start of the transaction window past the first `needle`.
    pub fn consume_through(&mut self, needle: &str) -> bool {
        let (echo, answer) = self.answer();
        match find(&answer, needle.as_bytes()) {
            Some(pos) => {
                self.window_len -= echo + pos + needle.len();
                true
            }
            None => false,
        }
    }

    /// Start a new transaction window without transmitting anything.
    pub fn restart_transaction(&mut self) {
        self.window_len = 0;
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.unread = 0;
        self.pending = 0;
        self.window_len = 0;
        self.ready = true;
        self.last_byte = 0;
    }

    /// The transaction window without a leading command echo, and the length
    /// of the echo. Until the echoed line is complete nothing is visible, so a
    /// body such as `"lvl":"ERROR"` is never taken for a result code.
    fn answer(&self) -> (usize, Vec<u8, N>) {
        let window = self.window();
        if !window.starts_with(b"AT") {
            return (0, window);
        }
        match window.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(eol) => {
                let echo = eol + 1;
                let mut rest = Vec::new();
                rest.extend_from_slice(&window[echo..]).ok();
                (echo, rest)
            }
            None => (window.len(), Vec::new()),
        }
    }

    fn window(&self) -> Vec<u8, N> {
        let mut out = Vec::new();
        let start = (self.head + N - self.window_len) % N;
        for i in 0..self.window_len {
            // `window_len <= N`
            out.push(self.buf[(start + i) % N]).ok();
        }
        out
    }
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockUart;

    fn feed<W: Write, const N: usize>(framer: &mut Framer<W, N>, bytes: &[u8]) {
        for &b in bytes {
            framer.rx_new_char(b);
        }
    }

    #[test]
    fn pending_lines_track_carriage_returns() {
        let mut framer: Framer<_, 64> = Framer::new(MockUart::default());
        feed(&mut framer, b"AT\r\r\nOK\r");
        assert_eq!(framer.how_many_new_responses(), 3);

        let mut out = [0u8; 64];
        let n = framer.read_responses(&mut out);
        assert_eq!(&out[..n], b"AT\nOK\n");
        assert_eq!(framer.how_many_new_responses(), 0);

        feed(&mut framer, b"+CSQ: 20,99\r\r\n");
        assert_eq!(framer.how_many_new_responses(), 2);
    }

    #[test]
    fn partial_drain_keeps_count() {
        let mut framer: Framer<_, 64> = Framer::new(MockUart::default());
        feed(&mut framer, b"ONE\rTWO\r");
        let mut out = [0u8; 4];
        assert_eq!(framer.read_responses(&mut out), 4);
        assert_eq!(&out, b"ONE\n");
        assert_eq!(framer.how_many_new_responses(), 1);
        assert_eq!(framer.read_responses(&mut out), 4);
        assert_eq!(&out, b"TWO\n");
        assert_eq!(framer.how_many_new_responses(), 0);
    }

    #[test]
    fn ready_round_trip() {
        let uart = MockUart::default();
        let mut framer: Framer<_, 64> = Framer::new(uart.clone());
        assert!(framer.ready_to_rx_new_command());

        framer.send_command(b"AT\r", false).unwrap();
        assert!(!framer.ready_to_rx_new_command());

        feed(&mut framer, b"AT\r\r\nO");
        assert!(!framer.ready_to_rx_new_command());
        feed(&mut framer, b"K\r");
        assert!(framer.ready_to_rx_new_command());
        assert_eq!(uart.sent(), b"AT\r");
    }

    #[test]
    fn blocked_send_never_transmits() {
        let uart = MockUart::default();
        let mut framer: Framer<_, 64> = Framer::new(uart.clone());
        framer.send_command(b"AT\r", false).unwrap();
        assert_eq!(uart.writes(), 1);

        assert_eq!(
            framer.send_command(b"AT+CSQ\r", false),
            Err(nb::Error::WouldBlock)
        );
        assert_eq!(uart.writes(), 1);

        framer.send_command(b"AT+CSQ\r", true).unwrap();
        assert_eq!(uart.writes(), 2);
        assert_eq!(uart.sent(), b"AT\rAT+CSQ\r");
    }

    #[test]
    fn lookup_is_relative_to_last_command() {
        let mut framer: Framer<_, 32> = Framer::new(MockUart::default());
        feed(&mut framer, b"+CSQ: 5,0\r\nOK\r\n");
        framer.send_command(b"AT+CSQ\r", false).unwrap();
        assert!(framer.last_completed_transaction("+CSQ: ").is_none());

        // More than a buffer full since the command
        feed(&mut framer, b"AT+CSQ\r\r\n+CSQ: 21,99\r\n\r\nOK\r\n+CSQ: 22,0\r\n");
        let resp = framer.last_completed_transaction("+CSQ: ").unwrap();
        assert!(resp.starts_with(b"+CSQ: "));
        assert!(resp.ends_with(b"+CSQ: 22,0\r\n"));
        assert!(framer.transaction_contains("OK"));
    }

    #[test]
    fn lookup_after_wrap() {
        let mut framer: Framer<_, 16> = Framer::new(MockUart::default());
        feed(&mut framer, b"garbage garbage garbage\r");
        framer.send_command(b"AT+CSQ\r", true).unwrap();
        feed(&mut framer, b"x\r\n+CSQ: 9,0\r");
        let resp = framer.last_completed_transaction("+CSQ: ").unwrap();
        assert_eq!(&resp[..], b"+CSQ: 9,0\r");
    }

    #[test]
    fn overflow_keeps_last_bytes() {
        let mut framer: Framer<_, 8> = Framer::new(MockUart::default());
        feed(&mut framer, b"A\rB\rC\rD\rE\rF\r");
        assert_eq!(framer.how_many_new_responses(), 4);
        let mut out = [0u8; 16];
        let n = framer.read_responses(&mut out);
        assert_eq!(&out[..n], b"C\nD\nE\nF\n");
    }

    #[test]
    fn line_must_be_complete() {
        let mut framer: Framer<_, 64> = Framer::new(MockUart::default());
        framer.send_command(b"AT+CEREG?\r", true).unwrap();
        feed(&mut framer, b"+CEREG: 0,1");
        assert!(!framer.transaction_contains("+CEREG: "));
        feed(&mut framer, b"\r");
        assert!(framer.transaction_contains("+CEREG: "));
    }

    #[test]
    fn consume_moves_window() {
        let mut framer: Framer<_, 64> = Framer::new(MockUart::default());
        framer.restart_transaction();
        feed(&mut framer, b"+N: 1\r\n+N: 2\r\n");
        assert!(framer.consume_through("+N: "));
        let resp = framer.last_completed_transaction("+N: ").unwrap();
        assert_eq!(&resp[..], b"+N: 2\r\n");
        assert!(framer.consume_through("+N: "));
        assert!(!framer.consume_through("+N: "));
    }

    #[test]
    fn echoed_command_is_not_a_response() {
        let mut framer: Framer<_, 128> = Framer::new(MockUart::default());
        framer
            .send_command(b"AT+SHBOD=\"{\\\"lvl\\\":\\\"ERROR\\\"}\",15\r", true)
            .unwrap();

        feed(&mut framer, b"AT+SHBOD=\"{\\\"lvl\\\":\\\"ERR");
        assert!(!framer.transaction_contains("ERROR"));
        feed(&mut framer, b"OR\\\"}\",15\r");
        assert!(!framer.transaction_contains("ERROR"));
        assert!(!framer.transaction_contains("OK"));

        feed(&mut framer, b"\r\nOK\r\n");
        assert!(framer.transaction_contains("OK"));
        assert!(!framer.transaction_contains("ERROR"));
        assert_eq!(&framer.last_completed_transaction("").unwrap()[..], b"\r\nOK\r\n");
    }

    #[test]
    fn consume_skips_echo() {
        let mut framer: Framer<_, 64> = Framer::new(MockUart::default());
        framer.send_command(b"AT+N\r", true).unwrap();
        feed(&mut framer, b"AT+N\r\r\n+N: 1\r\n+N: 2\r\n");
        assert!(framer.consume_through("+N: "));
        let resp = framer.last_completed_transaction("+N: ").unwrap();
        assert_eq!(&resp[..], b"+N: 2\r\n");
    }
}
