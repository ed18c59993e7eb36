//! Line-oriented TCP connection for plain-socket services
//!
//! Connection setup failures and dead sockets surface as the offline signal.
//! A socket that connects but answers with the wrong bytes is a broken
//! service, which [`TcpConn::readline_expect`] reports directly.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{CheckerError, CheckerResult};

/// Blocking TCP connection with deadline-bounded reads and writes.
#[derive(Debug)]
pub struct TcpConn {
    stream: TcpStream,
    peer: String,
}

impl TcpConn {
    /// Connect to `host:port`, bounding both the connect and all subsequent
    /// socket operations by `timeout`.
    pub fn open(host: &str, port: u16, timeout: Duration) -> CheckerResult<Self> {
        let peer = format!("{host}:{port}");
        let mut addrs = peer
            .to_socket_addrs()
            .map_err(|e| CheckerError::Offline(format!("could not resolve {peer}: {e}")))?;
        let addr = addrs
            .next()
            .ok_or_else(|| CheckerError::Offline(format!("no address found for {peer}")))?;
        debug!(%peer, "connecting");
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| CheckerError::Offline(format!("could not connect to {peer}: {e}")))?;
        let conn = Self { stream, peer };
        conn.set_timeout(timeout)?;
        Ok(conn)
    }

    /// Rebound the read and write timeouts on the underlying socket.
    pub fn set_timeout(&self, timeout: Duration) -> CheckerResult<()> {
        // A zero Duration would mean "block forever" to the socket layer.
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    pub fn write_all(&mut self, data: impl AsRef<[u8]>) -> CheckerResult<()> {
        self.stream.write_all(data.as_ref()).map_err(|e| {
            CheckerError::Offline(format!("write to {} failed: {e}", self.peer))
        })
    }

    /// Read bytes until `delim` (inclusive), end of stream, or the socket
    /// timeout. Returns what was read so far on timeout; an empty result
    /// therefore means the service said nothing at all.
    pub fn read_until(&mut self, delim: u8) -> CheckerResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    out.push(byte[0]);
                    if byte[0] == delim {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    debug!(peer = %self.peer, read = out.len(), "read timed out");
                    break;
                }
                Err(e) => {
                    return Err(CheckerError::Offline(format!(
                        "read from {} failed: {e}",
                        self.peer
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Read a single `\n`-terminated line.
    pub fn readline(&mut self) -> CheckerResult<Vec<u8>> {
        self.read_until(b'\n')
    }

    /// Read a line and require `expected` to occur in it. An empty read means
    /// the service went silent (offline); a line without the expected bytes
    /// means the service misbehaves (broken). The optional message overrides
    /// the generated one in both cases.
    pub fn readline_expect(
        &mut self,
        expected: impl AsRef<[u8]>,
        message: Option<&str>,
    ) -> CheckerResult<Vec<u8>> {
        let expected = expected.as_ref();
        let line = self.readline()?;
        if line.is_empty() {
            let msg = message.map(str::to_string).unwrap_or_else(|| {
                format!("service at {} sent nothing", self.peer)
            });
            return Err(CheckerError::Offline(msg));
        }
        if !contains_subslice(&line, expected) {
            let msg = message.map(str::to_string).unwrap_or_else(|| {
                format!(
                    "expected {:?} in line {:?}",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&line)
                )
            });
            return Err(CheckerError::Broken(msg));
        }
        Ok(line)
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_contains_subslice() {
        assert!(contains_subslice(b"hello world", b"o wo"));
        assert!(contains_subslice(b"abc", b""));
        assert!(!contains_subslice(b"abc", b"abcd"));
        assert!(!contains_subslice(b"abc", b"x"));
    }

    #[test]
    fn test_readline_expect_against_local_service() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            sock.write_all(b"WELCOME to notes v2\n").unwrap();
            let mut line = String::new();
            BufReader::new(&sock).read_line(&mut line).unwrap();
            line
        });

        let mut conn = TcpConn::open("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        let banner = conn.readline_expect("WELCOME", None).unwrap();
        assert!(banner.ends_with(b"\n"));
        assert!(conn.readline_expect("GOODBYE", None).is_err());
        conn.write_all("LIST\n").unwrap();
        assert_eq!(handle.join().unwrap(), "LIST\n");
    }

    #[test]
    fn test_open_refused_port_is_offline() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = TcpConn::open("127.0.0.1", port, Duration::from_millis(500)).unwrap_err();
        assert!(matches!(err, CheckerError::Offline(_)));
    }
}
