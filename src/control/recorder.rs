//! Key recorders: sources of key presses captured from a real remote.
//!
//! Recorder URIs mirror the control URIs:
//! - `vr:HOST[:PORT]` waits for a VirtualRemote client to connect
//! - `lirc:[SOCKET]:NAME` listens to lircd for presses on remote NAME
//! - `file://PATH` reads one key per line

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use tracing::debug;

use super::ControlError;
use super::remotes::{parse_lirc_uri, parse_vr_uri};

/// A stream of recorded key presses
pub type KeyRecorder = Box<dyn Iterator<Item = io::Result<String>> + Send>;

const VR_RECORD_SEPARATOR: &[u8] = b"\n\0";

/// Create a key recorder from its URI
pub fn uri_to_remote_recorder(uri: &str) -> Result<KeyRecorder, ControlError> {
    if let Some((address, port)) = parse_vr_uri(uri) {
        let listener = VirtualRemoteListener::bind(&address, port).map_err(|source| {
            ControlError::Connect {
                target: format!("{}:{}", address, port),
                source,
            }
        })?;
        return Ok(listener.accept_keys()?);
    }
    if let Some((socket, control_name)) = parse_lirc_uri(uri) {
        return listen_lirc(&socket, &control_name);
    }
    if let Some(filename) = uri.strip_prefix("file://") {
        if !filename.is_empty() {
            return Ok(file_remote_recorder(Path::new(filename))?);
        }
    }
    Err(ControlError::InvalidUri(uri.to_string()))
}

#[cfg(unix)]
fn listen_lirc(socket: &str, control_name: &str) -> Result<KeyRecorder, ControlError> {
    lirc_remote_listen(socket, control_name).map_err(|source| ControlError::Connect {
        target: format!("Lirc socket {}", socket),
        source,
    })
}

#[cfg(not(unix))]
fn listen_lirc(_socket: &str, _control_name: &str) -> Result<KeyRecorder, ControlError> {
    Err(ControlError::Configuration(
        "the lirc recorder requires Unix domain sockets".to_string(),
    ))
}

/// Keys read from a file, one per line.
///
/// Reading `/dev/stdin` prints a prompt first so interactive use is obvious.
pub fn file_remote_recorder(filename: &Path) -> io::Result<KeyRecorder> {
    let file = File::open(filename)?;
    if filename == Path::new("/dev/stdin") {
        eprintln!("Waiting for keypresses from standard input...");
    }
    let keys = BufReader::new(file)
        .lines()
        .map(|line| line.map(|l| l.trim_end().to_string()))
        .filter(|line| !matches!(line, Ok(l) if l.is_empty()));
    Ok(Box::new(keys))
}

/// Splits a byte stream into records given a separator.
///
/// A trailing partial record (no separator before end of stream) is dropped.
pub struct RecordReader<R> {
    stream: R,
    separator: Vec<u8>,
    buffer: Vec<u8>,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(stream: R, separator: &[u8]) -> Self {
        Self {
            stream,
            separator: separator.to_vec(),
            buffer: Vec::new(),
            done: false,
        }
    }

    fn take_record(&mut self) -> Option<String> {
        let sep = self.separator.len();
        let end = self
            .buffer
            .windows(sep)
            .position(|window| window == self.separator.as_slice())?;
        let record = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        self.buffer.drain(..end + sep);
        Some(record)
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.take_record() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk) {
                Ok(0) => self.done = true,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Converts virtual remote records into key presses.
///
/// A key is reported when it is released (`U` record), so held keys are
/// reported in release order.
pub fn vr_key_reader<I>(records: I) -> impl Iterator<Item = io::Result<String>> + Send
where
    I: Iterator<Item = io::Result<String>> + Send,
{
    records.filter_map(|record| match record {
        Err(e) => Some(Err(e)),
        Ok(record) => match record.split_once('\t') {
            Some(("U", key)) => Some(Ok(key.to_string())),
            Some(("D", _)) => None,
            _ => Some(Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed VirtualRemote record {:?}", record),
            ))),
        },
    })
}

/// Convert lircd messages into key presses.
///
/// lircd broadcasts `<code> <repeat count> <key> <remote>`; only the first
/// message of a press (repeat count 0) for `control_name` is reported. Other
/// messages (e.g. `BEGIN`/`SIGHUP`/`END` blocks) are ignored.
pub fn lirc_key_reader<I>(
    lines: I,
    control_name: &str,
) -> impl Iterator<Item = io::Result<String>> + Send + use<I>
where
    I: Iterator<Item = io::Result<String>> + Send,
{
    let control_name = control_name.to_string();
    lines.filter_map(move |line| {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        debug!("lirc_key_reader received: {}", line.trim_end());
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [_code, repeat, key, remote, ..] if *remote == control_name => {
                match repeat.parse::<u32>() {
                    Ok(0) => Some(Ok((*key).to_string())),
                    _ => None,
                }
            }
            _ => None,
        }
    })
}

/// Listens for a VirtualRemote client and reports its key presses
#[derive(Debug)]
pub struct VirtualRemoteListener {
    listener: TcpListener,
}

impl VirtualRemoteListener {
    /// Bind the listening socket (port 0 picks a free port)
    pub fn bind(address: &str, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((address, port))?;
        Ok(Self { listener })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for one client to connect; yields its key presses until it
    /// disconnects
    pub fn accept_keys(self) -> io::Result<KeyRecorder> {
        let addr = self.local_addr()?;
        eprintln!(
            "Waiting for connection from virtual remote control on {}...",
            addr
        );
        let (connection, peer) = self.listener.accept()?;
        eprintln!("Accepted connection from {}", peer);
        let records = RecordReader::new(connection, VR_RECORD_SEPARATOR);
        Ok(Box::new(vr_key_reader(records)))
    }
}

/// Connect to lircd and yield key presses for remote `control_name`.
///
/// See <http://www.lirc.org/html/technical.html#applications>
#[cfg(unix)]
pub fn lirc_remote_listen(lircd_socket: &str, control_name: &str) -> io::Result<KeyRecorder> {
    use std::os::unix::net::UnixStream;

    debug!("control-recorder connecting to lirc socket '{}'...", lircd_socket);
    let lircd = UnixStream::connect(lircd_socket)?;
    debug!("control-recorder connected to lirc socket");
    Ok(Box::new(lirc_key_reader(
        BufReader::new(lircd).lines(),
        control_name,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn ok_lines(lines: &[&str]) -> Vec<io::Result<String>> {
        lines.iter().map(|l| Ok(l.to_string())).collect()
    }

    #[test]
    fn test_read_records() {
        let stream = Cursor::new(b"hello\n\0This\n\0is\n\0a\n\0test\n\0".to_vec());
        let records: Vec<String> = RecordReader::new(stream, b"\n\0")
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(records, vec!["hello", "This", "is", "a", "test"]);
    }

    #[test]
    fn test_read_records_drops_partial_tail() {
        let stream = Cursor::new(b"one\n\0tw".to_vec());
        let records: Vec<String> = RecordReader::new(stream, b"\n\0")
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(records, vec!["one"]);
    }

    /// Delivers one byte per read, so separators are split across reads
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(1);
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_read_records_across_reads() {
        let stream = Trickle(Cursor::new(b"D\tOK\n\0U\tOK\n\0".to_vec()));
        let records: Vec<String> = RecordReader::new(stream, b"\n\0")
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(records, vec!["D\tOK", "U\tOK"]);
    }

    #[test]
    fn test_vr_key_reader() {
        let keys: Vec<String> = vr_key_reader(ok_lines(&["D\tHELLO", "U\tHELLO"]).into_iter())
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(keys, vec!["HELLO"]);

        let keys: Vec<String> = vr_key_reader(
            ok_lines(&["D\tCHEESE", "D\tHELLO", "U\tHELLO", "U\tCHEESE"]).into_iter(),
        )
        .collect::<io::Result<_>>()
        .unwrap();
        assert_eq!(keys, vec!["HELLO", "CHEESE"]);
    }

    #[test]
    fn test_vr_key_reader_rejects_garbage() {
        let mut keys = vr_key_reader(ok_lines(&["garbage"]).into_iter());
        let err = keys.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_lirc_key_reader() {
        let lines = ok_lines(&[
            "0000dead 00 MENU My-IR-remote",
            "0000beef 00 OK My-IR-remote",
            "0000f00b 01 OK My-IR-remote",
            "0000f00c 00 OK Other-remote",
            "BEGIN",
            "SIGHUP",
            "END",
        ]);
        let keys: Vec<String> = lirc_key_reader(lines.into_iter(), "My-IR-remote")
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(keys, vec!["MENU", "OK"]);
    }

    #[test]
    fn test_file_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "MENU\nOK  \n\nBACK\n").unwrap();

        let recorder = uri_to_remote_recorder(&format!("file://{}", path.display())).unwrap();
        let keys: Vec<String> = recorder.collect::<io::Result<_>>().unwrap();
        assert_eq!(keys, vec!["MENU", "OK", "BACK"]);
    }

    #[test]
    fn test_invalid_recorder_uri() {
        assert!(matches!(
            uri_to_remote_recorder("test"),
            Err(ControlError::InvalidUri(_))
        ));
        assert!(matches!(
            uri_to_remote_recorder("file://"),
            Err(ControlError::InvalidUri(_))
        ));
    }
}
