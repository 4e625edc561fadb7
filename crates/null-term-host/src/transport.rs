use std::io::BufRead;
use std::io::BufReader;
use std::os::unix::net::UnixListener;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use null_term_ipc::RpcRequest;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Request exceeds size limit of {max_bytes} bytes")]
    SizeLimit { max_bytes: usize },
    #[error("Connection timeout")]
    Timeout,
    #[error("Connection closed")]
    ConnectionClosed,
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::Timeout
            }
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset => TransportError::ConnectionClosed,
            _ => TransportError::Io(e),
        }
    }
}

/// Line reader that bounds each line and survives read timeouts: bytes of a
/// partially received line are kept until the rest arrives.
struct SizeLimitedReader<R> {
    inner: R,
    max_size: usize,
    partial: Vec<u8>,
}

impl<R> SizeLimitedReader<R> {
    fn new(inner: R, max_size: usize) -> Self {
        Self {
            inner,
            max_size,
            partial: Vec::new(),
        }
    }
}

impl<R: BufRead> SizeLimitedReader<R> {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let (consumed, complete) = {
                let available = match self.inner.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(TransportError::from(e)),
                };
                if available.is_empty() {
                    if self.partial.is_empty() {
                        return Ok(None);
                    }
                    // Final line without a trailing newline.
                    (0, true)
                } else {
                    match available.iter().position(|&b| b == b'\n') {
                        Some(pos) => {
                            self.partial.extend_from_slice(&available[..pos]);
                            (pos + 1, true)
                        }
                        None => {
                            self.partial.extend_from_slice(available);
                            (available.len(), false)
                        }
                    }
                }
            };
            self.inner.consume(consumed);

            if self.partial.len() > self.max_size {
                self.partial.clear();
                return Err(TransportError::SizeLimit {
                    max_bytes: self.max_size,
                });
            }

            if complete {
                let mut line = std::mem::take(&mut self.partial);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return String::from_utf8(line)
                    .map(Some)
                    .map_err(|e| TransportError::Parse(e.to_string()));
            }
        }
    }
}

/// Inbound half of a client connection.
pub struct RequestReader {
    reader: SizeLimitedReader<BufReader<UnixStream>>,
}

impl RequestReader {
    pub fn read_request(&mut self) -> Result<RpcRequest, TransportError> {
        loop {
            match self.reader.read_line()? {
                None => return Err(TransportError::ConnectionClosed),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    return serde_json::from_str(&line)
                        .map_err(|e| TransportError::Parse(e.to_string()));
                }
            }
        }
    }
}

/// Splits an accepted stream into a request reader and a raw writer. The
/// read timeout lets the caller notice shutdown while a client is idle.
pub fn split_connection(
    stream: UnixStream,
    max_request_bytes: usize,
    poll_interval: Duration,
) -> Result<(RequestReader, UnixStream), TransportError> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(poll_interval))?;
    let writer = stream.try_clone()?;
    Ok((
        RequestReader {
            reader: SizeLimitedReader::new(BufReader::new(stream), max_request_bytes),
        },
        writer,
    ))
}

pub struct UnixSocketListener {
    inner: UnixListener,
}

impl UnixSocketListener {
    pub fn bind(path: &Path) -> Result<Self, TransportError> {
        let listener = UnixListener::bind(path)?;
        Ok(Self { inner: listener })
    }

    pub fn accept(&self) -> Result<UnixStream, TransportError> {
        let (stream, _addr) = self.inner.accept()?;
        Ok(stream)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), TransportError> {
        self.inner.set_nonblocking(nonblocking)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Read;
    use std::io::Write;

    #[test]
    fn test_size_limited_reader_within_limit() {
        let mut reader = SizeLimitedReader::new(BufReader::new(Cursor::new("hello\nworld\n")), 100);
        assert_eq!(reader.read_line().unwrap(), Some("hello".to_string()));
        assert_eq!(reader.read_line().unwrap(), Some("world".to_string()));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    #[test]
    fn test_size_limited_reader_limit_is_per_line() {
        let data = "aaaaaaaa\nbbbbbbbb\ncccccccc\n";
        let mut reader = SizeLimitedReader::new(BufReader::new(Cursor::new(data)), 10);
        for _ in 0..3 {
            assert!(reader.read_line().unwrap().is_some());
        }
    }

    #[test]
    fn test_size_limited_reader_exceeds_limit() {
        let data = "this is a long line that exceeds the limit\n";
        let mut reader = SizeLimitedReader::new(BufReader::new(Cursor::new(data)), 10);
        assert!(matches!(
            reader.read_line(),
            Err(TransportError::SizeLimit { .. })
        ));
    }

    #[test]
    fn test_size_limited_reader_strips_crlf_and_reads_unterminated_tail() {
        let mut reader =
            SizeLimitedReader::new(BufReader::new(Cursor::new("line with crlf\r\ntail")), 100);
        assert_eq!(
            reader.read_line().unwrap(),
            Some("line with crlf".to_string())
        );
        assert_eq!(reader.read_line().unwrap(), Some("tail".to_string()));
        assert_eq!(reader.read_line().unwrap(), None);
    }

    /// Yields its input in fixed pieces with a timeout between each.
    struct Stutter {
        pieces: Vec<&'static [u8]>,
        timed_out: bool,
    }

    impl Read for Stutter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.timed_out && !self.pieces.is_empty() {
                self.timed_out = true;
                return Err(std::io::Error::new(std::io::ErrorKind::WouldBlock, "t"));
            }
            self.timed_out = false;
            if self.pieces.is_empty() {
                return Ok(0);
            }
            let piece = self.pieces.remove(0);
            buf[..piece.len()].copy_from_slice(piece);
            Ok(piece.len())
        }
    }

    #[test]
    fn test_partial_line_survives_timeouts() {
        let stutter = Stutter {
            pieces: vec![b"{\"a\":", b"1}\n"],
            timed_out: false,
        };
        let mut reader = SizeLimitedReader::new(BufReader::new(stutter), 100);
        assert!(matches!(reader.read_line(), Err(TransportError::Timeout)));
        assert!(matches!(reader.read_line(), Err(TransportError::Timeout)));
        assert_eq!(reader.read_line().unwrap(), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn test_transport_error_from_io() {
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        assert!(matches!(
            TransportError::from(timeout),
            TransportError::Timeout
        ));

        let broken_pipe = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken");
        assert!(matches!(
            TransportError::from(broken_pipe),
            TransportError::ConnectionClosed
        ));

        let other = std::io::Error::other("other");
        assert!(matches!(TransportError::from(other), TransportError::Io(_)));
    }

    #[test]
    fn test_request_reader_over_socket_pair() {
        let (client, server) = UnixStream::pair().unwrap();
        let (mut reader, _writer) =
            split_connection(server, 1024, Duration::from_millis(50)).unwrap();

        let mut client_writer = client.try_clone().unwrap();
        writeln!(
            client_writer,
            r#"{{"jsonrpc":"2.0","id":3,"method":"ping"}}"#
        )
        .unwrap();
        let request = reader.read_request().unwrap();
        assert_eq!(request.id, 3);
        assert_eq!(request.method, "ping");

        writeln!(client_writer, "not json").unwrap();
        assert!(matches!(
            reader.read_request(),
            Err(TransportError::Parse(_))
        ));

        drop(client_writer);
        drop(client);
        let mut outcome = reader.read_request();
        while matches!(outcome, Err(TransportError::Timeout)) {
            outcome = reader.read_request();
        }
        assert!(matches!(outcome, Err(TransportError::ConnectionClosed)));
    }
}
