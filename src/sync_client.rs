//! Synchronous TCP client for Heatmiser Wi-Fi thermostats.
//!
//! This module provides a high-level API (`HeatmiserWifi` struct) that
//! handles the conversion between the Rust types in [`crate::dcb`] and the
//! raw command/response frames in [`crate::protocol`].
//!
//! The thermostats tolerate only a small number of concurrent connections
//! (their companion mobile app holds one too), so the client connects, runs
//! one exchange and drops the connection again rather than keeping it open.
//!
//! # Examples
//!
//! ```no_run
//! use heatmiser_wifi_lib::{protocol::Pin, sync_client::HeatmiserWifi};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pin = Pin::try_from(1234)?;
//!     let mut client = HeatmiserWifi::new("192.168.1.100", pin);
//!     let status = client.read_status()?;
//!     println!("Room temperature: {:?}", status.temperatures.internal);
//!     Ok(())
//! }
//! ```

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::dcb::Status;
use crate::error::{Error, ProtocolError, TransportError};
use crate::protocol::{self, Pin, WriteItem, DEFAULT_PORT};
use crate::settings::{self, Setting};

/// Default socket timeout for connect, send and receive.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Synchronous client for one thermostat.
///
/// All methods that talk to the device block the current thread and are
/// bounded by the configured timeout.
#[derive(Debug)]
pub struct HeatmiserWifi {
    host: String,
    port: u16,
    pin: Pin,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl HeatmiserWifi {
    /// Creates a client for the device at `host`, using the default port
    /// and timeout.
    pub fn new(host: impl Into<String>, pin: Pin) -> Self {
        HeatmiserWifi {
            host: host.into(),
            port: DEFAULT_PORT,
            pin,
            timeout: DEFAULT_TIMEOUT,
            stream: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Sets the timeout applied to connect, send and receive operations.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Establishes the TCP connection if none exists. Calling this on an
    /// already-open client does nothing.
    pub fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_none() {
            self.stream = Some(self.connect()?);
        }
        Ok(())
    }

    /// Releases the connection. Safe to call when already closed.
    pub fn close(&mut self) {
        self.stream = None;
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Reads the device's whole DCB as raw bytes.
    pub fn read_dcb(&mut self) -> Result<Vec<u8>, Error> {
        let frame = protocol::read_command(self.pin, 0, protocol::READ_ALL);
        let raw = self.transact(&frame)?;
        let reply = protocol::parse_reply(&raw)?;
        Ok(reply.content)
    }

    /// Reads and decodes the device state.
    ///
    /// # Errors
    ///
    /// * [`TransportError`] if the device is unreachable or the socket
    ///   times out.
    /// * [`ProtocolError`] if the response frame or DCB content is invalid,
    ///   including [`ProtocolError::WrongPin`] for a rejected access code.
    pub fn read_status(&mut self) -> Result<Status, Error> {
        let dcb = self.read_dcb()?;
        Ok(Status::decode(&dcb)?)
    }

    /// Sends raw write items to the device.
    pub fn write_items(&mut self, items: &[WriteItem]) -> Result<(), Error> {
        let frame = protocol::write_command(self.pin, items)?;
        let raw = self.transact(&frame)?;
        protocol::parse_reply(&raw)?;
        Ok(())
    }

    /// Encodes `settings` against the given reference status and writes
    /// them to the device.
    pub fn write_settings(&mut self, status: &Status, settings: &[Setting]) -> Result<(), Error> {
        let items = settings::to_write_items(status, settings)?;
        self.write_items(&items)
    }

    /// Reads the current status, then applies `settings` against it.
    /// Returns the status from before the write.
    pub fn update(&mut self, settings: &[Setting]) -> Result<Status, Error> {
        let status = self.read_status()?;
        self.write_settings(&status, settings)?;
        Ok(status)
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let address = format!("{}:{}", self.host, self.port);
        let addrs = address
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                address: address.clone(),
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.timeout))
                        .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
                        .map_err(|source| TransportError::Io {
                            operation: "configure socket",
                            source,
                        })?;
                    return Ok(stream);
                }
                Err(source) => last_error = Some(source),
            }
        }
        Err(TransportError::Connect {
            address,
            source: last_error.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no addresses resolved")
            }),
        })
    }

    /// Sends one command and receives the complete response frame. The
    /// connection is dropped afterwards, successful or not.
    fn transact(&mut self, frame: &[u8]) -> Result<Vec<u8>, Error> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.connect()?,
        };
        exchange(&mut stream, frame, self.timeout)
    }
}

fn io_error(operation: &'static str, source: std::io::Error, timeout: Duration) -> Error {
    use std::io::ErrorKind;
    match source.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => {
            TransportError::Timeout { operation, timeout }.into()
        }
        _ => TransportError::Io { operation, source }.into(),
    }
}

fn exchange(stream: &mut TcpStream, frame: &[u8], timeout: Duration) -> Result<Vec<u8>, Error> {
    stream
        .write_all(frame)
        .map_err(|e| io_error("send command", e, timeout))?;

    let mut first = [0u8; 1];
    let n = stream
        .read(&mut first)
        .map_err(|e| io_error("receive response", e, timeout))?;
    if n == 0 {
        return Err(ProtocolError::EmptyResponse.into());
    }
    let mut rest = [0u8; 2];
    stream
        .read_exact(&mut rest)
        .map_err(|e| io_error("receive response", e, timeout))?;

    let declared = u16::from_le_bytes(rest) as usize;
    if declared < 7 {
        return Err(ProtocolError::Truncated {
            expected: 7,
            actual: declared,
        }
        .into());
    }

    let mut raw = vec![0u8; declared];
    raw[0] = first[0];
    raw[1..3].copy_from_slice(&rest);
    let mut received = 3;
    while received < declared {
        let n = stream
            .read(&mut raw[received..])
            .map_err(|e| io_error("receive response", e, timeout))?;
        if n == 0 {
            return Err(ProtocolError::Truncated {
                expected: declared,
                actual: received,
            }
            .into());
        }
        received += n;
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dcb::tests::{dcb_template, set_comfort_day};
    use crate::dcb::Model;
    use crate::error::ValidationError;
    use crate::protocol::tests::reply_frame;
    use assert_matches::assert_matches;
    use std::net::TcpListener;

    fn pin() -> Pin {
        Pin::try_from(1234).unwrap()
    }

    /// Serves exactly one request with a canned response frame.
    fn one_shot_device(response: Vec<u8>) -> (std::net::SocketAddr, std::thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut header = [0u8; 3];
            sock.read_exact(&mut header).unwrap();
            let declared = u16::from_le_bytes([header[1], header[2]]) as usize;
            let mut command = vec![0u8; declared];
            command[..3].copy_from_slice(&header);
            sock.read_exact(&mut command[3..]).unwrap();
            sock.write_all(&response).unwrap();
            command
        });
        (addr, handle)
    }

    fn client_for(addr: std::net::SocketAddr) -> HeatmiserWifi {
        let mut client = HeatmiserWifi::new(addr.ip().to_string(), pin());
        client.set_port(addr.port());
        client.set_timeout(Duration::from_secs(2));
        client
    }

    #[test]
    fn read_status_end_to_end() {
        let mut dcb = dcb_template(2, false);
        set_comfort_day(&mut dcb, Model::Prt, 0, &[(7, 0, 20)]);
        let (addr, device) = one_shot_device(reply_frame(&dcb));

        let mut client = client_for(addr);
        let status = client.read_status().unwrap();
        assert_eq!(status.product.model, Model::Prt);
        assert_eq!(status.heating.unwrap().target, 20);
        assert!(!client.is_open());

        let command = device.join().unwrap();
        assert_eq!(command[0], protocol::OPCODE_READ);
        assert_eq!(u16::from_le_bytes([command[3], command[4]]), 1234);
    }

    #[test]
    fn wrong_pin_reported_distinctly() {
        // A zero byte count in the reply sub-header means the access code
        // was rejected.
        let mut response = vec![protocol::OPCODE_REPLY];
        response.extend_from_slice(&9u16.to_le_bytes());
        response.extend_from_slice(&0u16.to_le_bytes());
        response.extend_from_slice(&0u16.to_le_bytes());
        let crc = protocol::checksum(&response);
        response.extend_from_slice(&crc.to_le_bytes());

        let (addr, device) = one_shot_device(response);
        let mut client = client_for(addr);
        assert_matches!(
            client.read_status(),
            Err(Error::Protocol(ProtocolError::WrongPin))
        );
        device.join().unwrap();
    }

    #[test]
    fn corrupted_response_is_checksum_mismatch() {
        let mut response = reply_frame(&dcb_template(2, false));
        response[10] ^= 0xFF;
        let (addr, device) = one_shot_device(response);
        let mut client = client_for(addr);
        assert_matches!(
            client.read_status(),
            Err(Error::Protocol(ProtocolError::ChecksumMismatch { .. }))
        );
        device.join().unwrap();
    }

    #[test]
    fn connect_failure_is_transport_error() {
        // A freshly bound then dropped listener leaves a port nobody is
        // listening on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = client_for(addr);
        assert_matches!(
            client.read_status(),
            Err(Error::Transport(TransportError::Connect { .. }))
        );
    }

    #[test]
    fn write_settings_rejects_invalid_input_without_touching_network() {
        let status = Status::decode(&dcb_template(2, false)).unwrap();
        // No listener anywhere: validation must fail before any I/O.
        let mut client = HeatmiserWifi::new("127.0.0.1", pin());
        assert_matches!(
            client.write_settings(&status, &[Setting::HotWater(settings::HotWaterState::On)]),
            Err(Error::Validation(ValidationError::NotApplicable { .. }))
        );
    }

    #[test]
    fn open_and_close_are_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = client_for(addr);
        client.open().unwrap();
        client.open().unwrap();
        assert!(client.is_open());
        client.close();
        client.close();
        assert!(!client.is_open());
    }
}
