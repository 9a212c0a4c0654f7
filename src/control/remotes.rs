use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

use super::ControlError;
use crate::capture::{PATTERN_COUNT, PatternHandle, TestPattern};

/// Default port of the VirtualRemote listener
pub const DEFAULT_VR_PORT: u16 = 2033;

/// Default lircd socket
pub const DEFAULT_LIRCD_SOCKET: &str = "/var/run/lirc/lircd";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Trait for remote controls
pub trait RemoteControl {
    /// Send a single key press
    fn press(&mut self, key: &str) -> Result<(), ControlError>;

    /// Control type identifier (e.g. "vr", "lirc")
    fn control_type(&self) -> &str;

    /// Close the connection to the device. Closing twice is harmless.
    fn close(&mut self) -> Result<(), ControlError> {
        Ok(())
    }
}

/// Create a remote control from its URI.
///
/// `pattern` is the pattern selector of the session's source, required by the
/// `test` control.
pub fn uri_to_remote(
    uri: &str,
    pattern: Option<PatternHandle>,
) -> Result<Box<dyn RemoteControl>, ControlError> {
    if uri.eq_ignore_ascii_case("none") {
        return Ok(Box::new(NullRemote));
    }
    if uri.eq_ignore_ascii_case("test") {
        return Ok(Box::new(TestControl::new(pattern)?));
    }
    if let Some((hostname, port)) = parse_vr_uri(uri) {
        return Ok(Box::new(VirtualRemote::connect(&hostname, port)?));
    }
    if let Some((socket, control_name)) = parse_lirc_uri(uri) {
        return connect_lirc(&socket, &control_name);
    }
    Err(ControlError::InvalidUri(uri.to_string()))
}

#[cfg(unix)]
fn connect_lirc(socket: &str, control_name: &str) -> Result<Box<dyn RemoteControl>, ControlError> {
    Ok(Box::new(LircRemote::connect(socket, control_name)?))
}

#[cfg(not(unix))]
fn connect_lirc(_socket: &str, _control_name: &str) -> Result<Box<dyn RemoteControl>, ControlError> {
    Err(ControlError::Configuration(
        "the lirc control requires Unix domain sockets".to_string(),
    ))
}

/// Parse `vr:HOST[:PORT]` into (host, port)
pub(crate) fn parse_vr_uri(uri: &str) -> Option<(String, u16)> {
    let rest = uri.strip_prefix("vr:")?;
    match rest.split_once(':') {
        None => Some((rest.to_string(), DEFAULT_VR_PORT)),
        Some((host, port)) => {
            let port = port.parse().ok()?;
            Some((host.to_string(), port))
        }
    }
}

/// Parse `lirc:[SOCKET]:NAME` into (socket, control name)
pub(crate) fn parse_lirc_uri(uri: &str) -> Option<(String, String)> {
    let rest = uri.strip_prefix("lirc:")?;
    let (socket, control_name) = rest.split_once(':')?;
    let socket = if socket.is_empty() {
        DEFAULT_LIRCD_SOCKET
    } else {
        socket
    };
    Some((socket.to_string(), control_name.to_string()))
}

/// Ignores key presses
#[derive(Debug, Default)]
pub struct NullRemote;

impl RemoteControl for NullRemote {
    fn press(&mut self, key: &str) -> Result<(), ControlError> {
        debug!("NullRemote: Ignoring request to press \"{}\"", key);
        Ok(())
    }

    fn control_type(&self) -> &str {
        "none"
    }
}

/// Remote control used by selftests.
///
/// Changes the `videotestsrc` image to the specified pattern ("0" to "20").
#[derive(Debug)]
pub struct TestControl {
    pattern: PatternHandle,
}

impl TestControl {
    pub fn new(pattern: Option<PatternHandle>) -> Result<Self, ControlError> {
        let pattern = pattern.ok_or_else(|| {
            ControlError::Configuration(
                "The \"test\" control can only be used with source-pipeline = \"videotestsrc\""
                    .to_string(),
            )
        })?;
        Ok(Self { pattern })
    }
}

impl RemoteControl for TestControl {
    fn press(&mut self, key: &str) -> Result<(), ControlError> {
        let pattern = key
            .parse::<u8>()
            .ok()
            .and_then(TestPattern::from_index)
            .ok_or_else(|| ControlError::InvalidKey {
                key: key.to_string(),
                control: "test".to_string(),
                reason: format!("only \"0\" to \"{}\" allowed", PATTERN_COUNT - 1),
            })?;
        self.pattern.set(pattern);
        debug!("Pressed {} ({})", key, pattern.name());
        Ok(())
    }

    fn control_type(&self) -> &str {
        "test"
    }
}

/// Send a key-press to a set-top box running a VirtualRemote listener.
///
/// Each press is sent as a key-down record followed by a key-up record,
/// each terminated by `"\n\0"`.
#[derive(Debug)]
pub struct VirtualRemote {
    target: String,
    stream: Option<TcpStream>,
}

impl VirtualRemote {
    pub fn connect(hostname: &str, port: u16) -> Result<Self, ControlError> {
        let target = format!("VirtualRemote at {}:{}", hostname, port);
        debug!("VirtualRemote: Connecting to {}:{}", hostname, port);

        match connect_any(hostname, port) {
            Ok(stream) => {
                debug!("VirtualRemote: Connected to {}:{}", hostname, port);
                Ok(Self {
                    target,
                    stream: Some(stream),
                })
            }
            Err(source) => Err(ControlError::Connect { target, source }),
        }
    }
}

/// Connect to the first reachable address `hostname` resolves to
fn connect_any(hostname: &str, port: u16) -> std::io::Result<TcpStream> {
    let mut last_error = std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "hostname resolved to no addresses",
    );
    for addr in (hostname, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

impl RemoteControl for VirtualRemote {
    fn press(&mut self, key: &str) -> Result<(), ControlError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ControlError::Closed(self.target.clone()))?;
        // key Down, then key Up
        stream.write_all(format!("D\t{key}\n\0U\t{key}\n\0").as_bytes())?;
        debug!("Pressed {}", key);
        Ok(())
    }

    fn control_type(&self) -> &str {
        "vr"
    }

    fn close(&mut self) -> Result<(), ControlError> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                // Already disconnected by the peer
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Send a key-press via a LIRC-enabled infrared blaster.
///
/// See <http://www.lirc.org/html/technical.html#applications>
#[cfg(unix)]
#[derive(Debug)]
pub struct LircRemote {
    control_name: String,
    target: String,
    stream: Option<std::os::unix::net::UnixStream>,
}

#[cfg(unix)]
impl LircRemote {
    pub fn connect(lircd_socket: &str, control_name: &str) -> Result<Self, ControlError> {
        use std::os::unix::net::UnixStream;

        let target = format!("Lirc socket {}", lircd_socket);
        debug!("LircRemote: Connecting to {}", lircd_socket);
        let stream = UnixStream::connect(lircd_socket).map_err(|source| ControlError::Connect {
            target: target.clone(),
            source,
        })?;
        stream.set_write_timeout(Some(CONNECT_TIMEOUT))?;
        debug!("LircRemote: Connected to {}", lircd_socket);

        Ok(Self {
            control_name: control_name.to_string(),
            target,
            stream: Some(stream),
        })
    }
}

#[cfg(unix)]
impl RemoteControl for LircRemote {
    fn press(&mut self, key: &str) -> Result<(), ControlError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ControlError::Closed(self.target.clone()))?;
        stream.write_all(format!("SEND_ONCE {} {}\n", self.control_name, key).as_bytes())?;
        debug!("Pressed {}", key);
        Ok(())
    }

    fn control_type(&self) -> &str {
        "lirc"
    }

    fn close(&mut self) -> Result<(), ControlError> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
