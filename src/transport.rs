use crate::protocol::{self, HEADER_LENGTH, MIN_DATA_LENGTH, START_BYTE};
use crate::Error;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// How the transport treats the TCP connection across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStrategy {
    /// Keep the connection open between requests, reconnecting when it has
    /// been open longer than the force-reconnect threshold.
    #[default]
    Persistent,
    /// Open a fresh connection for every request and close it afterwards.
    PerRequest,
}

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_FORCE_RECONNECT_AFTER: Duration = Duration::from_secs(300);
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(100);

/// Consecutive empty reads tolerated before the connection is declared
/// broken rather than slow.
const MAX_EMPTY_READS: u32 = 50;
const EMPTY_READ_DELAY: Duration = Duration::from_millis(10);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Blocking TCP transport to a serial-over-TCP bridge in front of the
/// battery. Owns connection lifecycle, request/response framing at the byte
/// level, and retries for connection-reset-class failures.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    strategy: ConnectionStrategy,
    force_reconnect_after: Duration,
    settle_time: Duration,
    stream: Option<TcpStream>,
    connected_at: Option<Instant>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            strategy: ConnectionStrategy::default(),
            force_reconnect_after: DEFAULT_FORCE_RECONNECT_AFTER,
            settle_time: DEFAULT_SETTLE_TIME,
            stream: None,
            connected_at: None,
        }
    }

    pub fn with_strategy(mut self, strategy: ConnectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_force_reconnect_after(mut self, after: Duration) -> Self {
        self.force_reconnect_after = after;
        self
    }

    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle_time = settle;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn connect(&mut self) -> Result<(), Error> {
        let endpoint = self.endpoint();
        let addr = endpoint
            .to_socket_addrs()
            .map_err(|e| Error::Transport(format!("cannot resolve {endpoint}: {e}")))?
            .next()
            .ok_or_else(|| Error::Transport(format!("no address for {endpoint}")))?;

        log::debug!("Connecting to {endpoint}");
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(EMPTY_READ_DELAY))?;

        self.stream = Some(stream);
        self.connected_at = Some(Instant::now());
        // Let the bridge finish its own serial-side setup before we talk.
        std::thread::sleep(self.settle_time);
        Ok(())
    }

    /// Ensure a usable connection exists, respecting the strategy and the
    /// force-reconnect threshold.
    fn open_if_needed(&mut self) -> Result<(), Error> {
        if self.strategy == ConnectionStrategy::PerRequest {
            self.force_close();
        }
        let alive = match (&self.stream, self.connected_at) {
            (Some(_), Some(at)) => at.elapsed() <= self.force_reconnect_after,
            _ => false,
        };
        if !alive {
            if self.stream.is_some() {
                log::debug!("Connection exceeded reconnect threshold, reopening");
            }
            self.force_close();
            self.connect()?;
        }
        Ok(())
    }

    /// Drop the connection unconditionally. The next request reconnects.
    pub fn force_close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.connected_at = None;
    }

    /// Read and discard anything already buffered, twice with a short pause,
    /// so a stale response cannot be matched against the next request.
    fn drain_input(&mut self) -> Result<(), Error> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Transport("drain on closed connection".into()))?;
        let mut discarded = 0usize;
        for pass in 0..2 {
            if pass == 1 {
                std::thread::sleep(EMPTY_READ_DELAY);
            }
            let mut buf = [0u8; 256];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => discarded += n,
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        break
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if discarded > 0 {
            log::warn!("Discarded {discarded} stale bytes before request");
        }
        Ok(())
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, Error> {
        self.open_if_needed()?;
        self.drain_input()?;

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Transport("write on closed connection".into()))?;
        log::trace!("TX {:02X?}", request);
        stream.write_all(request)?;
        stream.flush()?;

        let frame = read_frame(stream, self.read_timeout)?;
        log::trace!("RX {:02X?}", frame);
        Ok(frame)
    }

    /// Send one framed request and return the raw response frame.
    ///
    /// Connection-reset-class I/O failures get one retry on a fresh
    /// connection. Timeouts are not retried here; under the persistent
    /// strategy they force a reconnect on the next request because the late
    /// reply would otherwise desynchronize the stream.
    pub fn send_request(&mut self, request: &[u8]) -> Result<Vec<u8>, Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.exchange(request) {
                Ok(frame) => {
                    if self.strategy == ConnectionStrategy::PerRequest {
                        self.force_close();
                    }
                    return Ok(frame);
                }
                Err(e) => {
                    let broken = is_io_failure(&e);
                    if e.is_timeout() || broken || self.strategy == ConnectionStrategy::PerRequest
                    {
                        self.force_close();
                    }
                    if broken && attempt < 2 {
                        log::warn!("Connection dropped ({e}), retrying once");
                        std::thread::sleep(RETRY_BACKOFF);
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.force_close();
    }
}

/// Connection-reset/broken-pipe and other OS-level I/O failures warrant one
/// retry on a fresh connection. Timeouts do not: a late reply would
/// desynchronize the stream, so they only force a reconnect.
fn is_io_failure(error: &Error) -> bool {
    matches!(error, Error::Io(_) | Error::ConnectionBroken { .. })
}

/// Read exactly `needed` bytes before the deadline.
///
/// Distinguishes a slow device (the deadline expires, [`Error::Timeout`]
/// carrying the progress made) from a dead connection (a run of consecutive
/// zero-byte reads, [`Error::ConnectionBroken`]). Expired stream read
/// timeouts count toward neither; they just bound each wait.
fn read_exact_deadline<R: Read>(
    reader: &mut R,
    needed: usize,
    timeout: Duration,
) -> Result<Vec<u8>, Error> {
    let deadline = Instant::now() + timeout;
    let mut buf = vec![0u8; needed];
    let mut got = 0usize;
    let mut empty_reads = 0u32;
    while got < needed {
        if Instant::now() >= deadline {
            return Err(Error::Timeout { needed, got });
        }
        match reader.read(&mut buf[got..]) {
            Ok(0) => {
                empty_reads += 1;
                if empty_reads >= MAX_EMPTY_READS {
                    return Err(Error::ConnectionBroken { empty_reads });
                }
                std::thread::sleep(EMPTY_READ_DELAY);
            }
            Ok(n) => {
                got += n;
                empty_reads = 0;
            }
            // An expired stream read timeout is not an empty read: the
            // socket is alive, just silent. Only the deadline may end the
            // wait, and it ends it as a timeout.
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(buf)
}

/// Read one complete frame: the fixed 4-byte header first, then exactly
/// `data_len` more bytes, validating the framing bytes as they arrive.
fn read_frame<R: Read>(reader: &mut R, timeout: Duration) -> Result<Vec<u8>, Error> {
    let header = read_exact_deadline(reader, HEADER_LENGTH, timeout)?;
    if header[0] != START_BYTE {
        return Err(Error::Framing(format!(
            "response does not start with {START_BYTE:#04X}: {:02X?}",
            header
        )));
    }
    let data_len = header[3] as usize;
    if data_len < MIN_DATA_LENGTH as usize {
        return Err(Error::Framing(format!(
            "declared data length {data_len} below minimum"
        )));
    }
    let body = read_exact_deadline(reader, data_len, timeout)?;
    if body[data_len - 1] != protocol::END_BYTE {
        return Err(Error::Framing(format!(
            "response does not end with {:#04X}: got {:#04X}",
            protocol::END_BYTE,
            body[data_len - 1]
        )));
    }
    let mut frame = header;
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Run `operation` until it succeeds or fails with a non-timeout error,
/// retrying timeouts up to `retries` extra attempts with a fixed delay.
///
/// This wrapper is the only place timeouts are retried; the transport itself
/// never re-sends after a timeout.
pub fn retry_on_timeout<T, F>(retries: u32, delay: Duration, mut operation: F) -> Result<T, Error>
where
    F: FnMut() -> Result<T, Error>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Err(e) if e.is_timeout() && attempt < retries => {
                attempt += 1;
                log::warn!("Timed out ({e}), retry {attempt}/{retries}");
                std::thread::sleep(delay);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    /// A reader that yields scripted chunks, then empty reads forever.
    struct ScriptedReader {
        chunks: Vec<Vec<u8>>,
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let mut chunk = self.chunks.remove(0);
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                chunk.drain(..n);
                self.chunks.insert(0, chunk);
            }
            Ok(n)
        }
    }

    #[test]
    fn read_exact_reports_broken_connection_on_persistent_emptiness() {
        let mut reader = ScriptedReader { chunks: vec![] };
        let err = read_exact_deadline(&mut reader, 4, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(
            err,
            Error::ConnectionBroken {
                empty_reads: MAX_EMPTY_READS
            }
        ));
    }

    /// A reader whose every read expires the stream timeout, optionally
    /// after yielding some initial bytes. Models a connected but silent
    /// device.
    struct SilentReader {
        prefix: Vec<u8>,
    }

    impl Read for SilentReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.prefix.is_empty() {
                std::thread::sleep(EMPTY_READ_DELAY);
                return Err(std::io::Error::from(std::io::ErrorKind::TimedOut));
            }
            let n = self.prefix.len().min(buf.len());
            buf[..n].copy_from_slice(&self.prefix[..n]);
            self.prefix.drain(..n);
            Ok(n)
        }
    }

    #[test]
    fn silent_device_waits_out_full_deadline_as_timeout() {
        // Long enough that more than MAX_EMPTY_READS stream timeouts expire
        // before the deadline does; the error must still be a timeout.
        let deadline = EMPTY_READ_DELAY * (MAX_EMPTY_READS + 20);
        let mut reader = SilentReader {
            prefix: vec![0xEA, 0xD1],
        };
        let started = Instant::now();
        let err = read_exact_deadline(&mut reader, 8, deadline).unwrap_err();
        assert!(started.elapsed() >= deadline, "gave up before the deadline");
        match err {
            Error::Timeout { needed, got } => {
                assert_eq!(needed, 8);
                assert_eq!(got, 2);
            }
            other => panic!("expected Timeout after the full deadline, got {other:?}"),
        }
    }

    #[test]
    fn read_exact_timeout_reports_progress() {
        let mut reader = ScriptedReader {
            chunks: vec![vec![0xEA, 0xD1]],
        };
        let err = read_exact_deadline(&mut reader, 4, Duration::from_millis(0)).unwrap_err();
        match err {
            Error::Timeout { needed, got } => {
                assert_eq!(needed, 4);
                assert_eq!(got, 0); // deadline checked before the first read
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn read_frame_reassembles_fragmented_response() {
        let frame = protocol::build_frame(0xD1, 0x01, 0xFF, 0x19, &[]).unwrap();
        let mut reader = ScriptedReader {
            chunks: frame.iter().map(|b| vec![*b]).collect(),
        };
        let got = read_frame(&mut reader, Duration::from_secs(5)).unwrap();
        assert_eq!(got, frame);
    }

    #[test]
    fn read_frame_rejects_bad_start_byte() {
        let mut reader = ScriptedReader {
            chunks: vec![vec![0x00, 0xD1, 0x01, 0x04]],
        };
        assert!(matches!(
            read_frame(&mut reader, Duration::from_secs(1)),
            Err(Error::Framing(_))
        ));
    }

    #[test]
    fn read_frame_rejects_undersized_data_length() {
        let mut reader = ScriptedReader {
            chunks: vec![vec![0xEA, 0xD1, 0x01, 0x02]],
        };
        assert!(matches!(
            read_frame(&mut reader, Duration::from_secs(1)),
            Err(Error::Framing(_))
        ));
    }

    #[test]
    fn read_frame_rejects_bad_end_byte() {
        let mut frame = protocol::build_frame(0xD1, 0x01, 0xFF, 0x02, &[]).unwrap();
        let last = frame.len() - 1;
        frame[last] = 0x00;
        let mut reader = ScriptedReader {
            chunks: vec![frame],
        };
        assert!(matches!(
            read_frame(&mut reader, Duration::from_secs(1)),
            Err(Error::Framing(_))
        ));
    }

    #[test]
    fn retry_wrapper_retries_timeouts_only() {
        let mut calls = 0;
        let result: Result<(), Error> = retry_on_timeout(3, Duration::from_millis(0), || {
            calls += 1;
            Err(Error::Timeout { needed: 8, got: 0 })
        });
        assert!(result.is_err());
        assert_eq!(calls, 4);

        let mut calls = 0;
        let result: Result<(), Error> = retry_on_timeout(3, Duration::from_millis(0), || {
            calls += 1;
            Err(Error::Framing("not a timeout".into()))
        });
        assert!(matches!(result, Err(Error::Framing(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn retry_wrapper_stops_after_first_success() {
        let mut calls = 0;
        let result = retry_on_timeout(3, Duration::from_millis(0), || {
            calls += 1;
            if calls < 3 {
                Err(Error::Timeout { needed: 8, got: 2 })
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }
}
