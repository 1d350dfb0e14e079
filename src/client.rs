//! Blocking request cycle over a byte transport.
//!
//! One cycle reads one register map: build a "read holding registers"
//! request covering the map, send it, receive exactly one response frame,
//! check that it answers the request and resolve the map against the
//! returned registers. Only one request is ever in flight per transport.
//!
//! # Example
//!
//! ```no_run
//! use sunspec_lib::client::{SunSpecClient, TcpTransport};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = TcpTransport::connect("192.168.1.100:1502", Duration::from_secs(5))?;
//!     let mut client = SunSpecClient::new(transport, 1);
//!
//!     let inverter = client.read_inverter()?;
//!     for (name, value) in inverter.iter() {
//!         println!("{name:16}  {value}");
//!     }
//!     Ok(())
//! }
//! ```
use crate::decoder::EnumMode;
use crate::frame::{self, Frame, MAX_DATA_LEN, MBAP_PREFIX_LEN};
use crate::mapping::{self, Record, RegisterMap};
use crate::models::{AC_POWER_MODEL, COMMON_MODEL, INVERTER_MODEL, SUNSPEC_ID};
use crate::value::Value;
use log::*;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Represents all possible errors of a request cycle.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wraps decoding and framing errors.
    #[error(transparent)]
    Protocol(#[from] crate::Error),

    /// Wraps transport errors, including timeouts.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The MBAP length field announces more than a Modbus TCP frame can hold.
    #[error("Declared frame length {0} exceeds the Modbus TCP maximum of 254")]
    FrameTooLarge(u16),

    /// The common model does not start with the "SunS" marker.
    #[error("Not a SunSpec device: C_SunSpec_ID is {0:?}")]
    NotSunSpec(Option<Value>),
}

/// The result type of a request cycle.
pub type Result<T> = std::result::Result<T, Error>;

/// A byte oriented, request/response transport to one device.
pub trait Transport {
    /// Sends all `octets`.
    fn send(&mut self, octets: &[u8]) -> io::Result<()>;

    /// Receives at most `max` octets. An empty result means the peer closed
    /// the connection.
    fn recv(&mut self, max: usize) -> io::Result<Vec<u8>>;
}

/// Modbus TCP transport over a blocking [`TcpStream`].
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connects to `address`, trying every resolved socket address in turn.
    ///
    /// `timeout` applies to connecting as well as to every later read and write.
    pub fn connect<A: ToSocketAddrs>(address: A, timeout: Duration) -> io::Result<Self> {
        let mut last_error = None;
        for socket_addr in address.to_socket_addrs()? {
            debug!("Connecting to {socket_addr}");
            match TcpStream::connect_timeout(&socket_addr, timeout) {
                Ok(stream) => {
                    let mut transport = Self::from_stream(stream);
                    transport.set_timeout(Some(timeout))?;
                    return Ok(transport);
                }
                Err(error) => last_error = Some(error),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve")
        }))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Sets the read and write timeout. `None` blocks forever.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)
    }

    pub fn timeout(&self) -> io::Result<Option<Duration>> {
        self.stream.read_timeout()
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, octets: &[u8]) -> io::Result<()> {
        self.stream.write_all(octets)?;
        self.stream.flush()
    }

    fn recv(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; max];
        let received = self.stream.read(&mut buffer)?;
        buffer.truncate(received);
        Ok(buffer)
    }
}

/// Receives exactly one Modbus TCP frame, however the transport splits it.
pub fn receive_frame<T: Transport + ?Sized>(transport: &mut T) -> Result<Vec<u8>> {
    let mut octets = Vec::with_capacity(MBAP_PREFIX_LEN + usize::from(MAX_DATA_LEN));
    fill(transport, &mut octets, MBAP_PREFIX_LEN)?;
    let length = u16::from_be_bytes([octets[4], octets[5]]);
    if length > MAX_DATA_LEN {
        return Err(Error::FrameTooLarge(length));
    }
    fill(transport, &mut octets, MBAP_PREFIX_LEN + usize::from(length))?;
    check_length(length)?;
    Ok(octets)
}

/// Rejects MBAP lengths that cannot hold a unit id and a function code.
pub(crate) fn check_length(length: u16) -> Result<()> {
    if length < 2 {
        return Err(crate::Error::DataLengthTooShort {
            declared: length,
            available: usize::from(length),
        }
        .into());
    }
    Ok(())
}

fn fill<T: Transport + ?Sized>(transport: &mut T, octets: &mut Vec<u8>, len: usize) -> Result<()> {
    while octets.len() < len {
        let chunk = transport.recv(len - octets.len())?;
        if chunk.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed after {} of {len} octets", octets.len()),
            )
            .into());
        }
        octets.extend_from_slice(&chunk);
    }
    Ok(())
}

/// Builds the request frame covering `map`.
pub fn request_for(transaction_id: u16, unit_id: u8, map: &RegisterMap) -> Result<Frame> {
    let (start, count) = map.span()?;
    Ok(Frame::read_holding_registers(
        transaction_id,
        unit_id,
        start,
        count,
    ))
}

/// Checks a received frame against its request and resolves `map` against it.
pub fn resolve_response(
    request: &Frame,
    octets: &[u8],
    map: &RegisterMap,
    mode: EnumMode,
) -> Result<Record> {
    let response = frame::parse_response(octets)?;
    response.answers(request)?;
    let (start, _) = map.span()?;
    let regs = response.data_as_registers()?.with_base(u32::from(start));
    trace!(
        "Received {} registers {}..{} for map '{}'",
        regs.len(),
        regs.base(),
        regs.end(),
        map.name
    );
    Ok(mapping::resolve_with(&regs, map, mode)?)
}

/// Runs one complete request cycle for `map` over `transport`.
pub fn decode<T: Transport + ?Sized>(
    transport: &mut T,
    transaction_id: u16,
    unit_id: u8,
    map: &RegisterMap,
    mode: EnumMode,
) -> Result<Record> {
    let request = request_for(transaction_id, unit_id, map)?;
    let octets = request.encode();
    trace!("Sending {octets:02x?}");
    transport.send(&octets)?;
    let response = receive_frame(transport)?;
    trace!("Received {response:02x?}");
    resolve_response(&request, &response, map, mode)
}

/// Fails with [`Error::NotSunSpec`] unless `common` carries the "SunS" marker.
pub fn check_sunspec_id(common: &Record) -> Result<()> {
    match common.get("C_SunSpec_ID") {
        Some(Value::U32(SUNSPEC_ID)) => Ok(()),
        other => Err(Error::NotSunSpec(other.cloned())),
    }
}

/// Stateful client reading register maps from one device.
///
/// Every read uses the next transaction identifier.
#[derive(Debug)]
pub struct SunSpecClient<T> {
    transport: T,
    unit_id: u8,
    transaction_id: u16,
    enum_mode: EnumMode,
}

impl<T: Transport> SunSpecClient<T> {
    /// Creates a client talking to `unit_id` over `transport`.
    pub fn new(transport: T, unit_id: u8) -> Self {
        Self {
            transport,
            unit_id,
            transaction_id: rand::random(),
            enum_mode: EnumMode::default(),
        }
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn set_unit_id(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
    }

    pub fn enum_mode(&self) -> EnumMode {
        self.enum_mode
    }

    /// Selects whether unknown status codes are errors.
    pub fn set_enum_mode(&mut self, mode: EnumMode) {
        self.enum_mode = mode;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Reads and resolves an arbitrary register map.
    pub fn read(&mut self, map: &RegisterMap) -> Result<Record> {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        debug!(
            "Reading map '{}' from unit {} (transaction {})",
            map.name, self.unit_id, self.transaction_id
        );
        decode(
            &mut self.transport,
            self.transaction_id,
            self.unit_id,
            map,
            self.enum_mode,
        )
    }

    /// Reads the common model and checks the SunSpec marker.
    pub fn read_common(&mut self) -> Result<Record> {
        let common = self.read(&COMMON_MODEL)?;
        check_sunspec_id(&common)?;
        Ok(common)
    }

    /// Reads the inverter model.
    pub fn read_inverter(&mut self) -> Result<Record> {
        self.read(&INVERTER_MODEL)
    }

    /// Reads only the AC power of the inverter model.
    pub fn read_ac_power(&mut self) -> Result<Record> {
        self.read(&AC_POWER_MODEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{solaredge_image, FakeDevice};
    use crate::value::{Decimal, Quantity};
    use assert_matches::assert_matches;

    #[test]
    fn reads_inverter_model() {
        let mut client = SunSpecClient::new(FakeDevice::new(solaredge_image()), 1);
        let record = client.read_inverter().unwrap();
        assert_eq!(
            record.get("I_AC_Power"),
            Some(&Value::Quantity(Quantity::new(Decimal::new(19807, -1), Some("W"))))
        );
        assert_eq!(record.get("I_Status").unwrap().to_string(), "I_STATUS_MPPT");

        let requests = &client.transport().requests;
        assert_eq!(requests.len(), 1);
        assert_eq!(&requests[0][2..], [0u8, 0, 0, 6, 1, 3, 0x9c, 0x85, 0x00, 0x34]);
    }

    #[test]
    fn reassembles_fragmented_responses() {
        let device = FakeDevice::new(solaredge_image()).with_chunk(3);
        let mut client = SunSpecClient::new(device, 1);
        let common = client.read_common().unwrap();
        assert_eq!(common.get("C_Manufacturer"), Some(&Value::Text("SolarEdge".into())));
        assert_eq!(common.get("C_Model"), Some(&Value::Text("SE5000H-RW000BNN4".into())));
    }

    #[test]
    fn transaction_ids_advance() {
        let mut client = SunSpecClient::new(FakeDevice::new(solaredge_image()), 1);
        client.read_ac_power().unwrap();
        client.read_ac_power().unwrap();
        let requests = &client.transport().requests;
        let first = u16::from_be_bytes([requests[0][0], requests[0][1]]);
        let second = u16::from_be_bytes([requests[1][0], requests[1][1]]);
        assert_eq!(second, first.wrapping_add(1));
    }

    #[test]
    fn detects_mismatched_transaction() {
        let device = FakeDevice::new(solaredge_image()).with_transaction_offset(0x0100);
        let mut client = SunSpecClient::new(device, 1);
        assert_matches!(
            client.read_ac_power(),
            Err(Error::Protocol(crate::Error::TransactionMismatch { .. }))
        );
    }

    #[test]
    fn rejects_non_sunspec_devices() {
        let mut image = solaredge_image();
        image[..4].copy_from_slice(b"Nope");
        let mut client = SunSpecClient::new(FakeDevice::new(image), 1);
        assert_matches!(
            client.read_common(),
            Err(Error::NotSunSpec(Some(Value::U32(0x4e6f_7065))))
        );
    }

    #[test]
    fn reports_device_exceptions() {
        // The device only holds the common model.
        let image = solaredge_image()[..69 * 2].to_vec();
        let mut client = SunSpecClient::new(FakeDevice::new(image), 1);
        assert_matches!(
            client.read_inverter(),
            Err(Error::Protocol(crate::Error::Exception { function: 3, code: 2 }))
        );
    }

    #[test]
    fn closed_connection_is_an_io_error() {
        let mut device = FakeDevice::new(solaredge_image());
        device.truncate_replies(5);
        let mut client = SunSpecClient::new(device, 1);
        assert_matches!(
            client.read_ac_power(),
            Err(Error::Io(error)) if error.kind() == io::ErrorKind::UnexpectedEof
        );
    }

    struct Scripted(Vec<u8>);

    impl Transport for Scripted {
        fn send(&mut self, _octets: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn recv(&mut self, max: usize) -> io::Result<Vec<u8>> {
            let take = max.min(self.0.len());
            Ok(self.0.drain(..take).collect())
        }
    }

    #[test]
    fn oversized_length_field() {
        let mut transport = Scripted(vec![0, 1, 0, 0, 0x01, 0x00, 1, 3]);
        assert_matches!(receive_frame(&mut transport), Err(Error::FrameTooLarge(256)));
    }

    #[test]
    fn undersized_length_field() {
        for length in [0u8, 1] {
            let mut reply = vec![0, 1, 0, 0, 0, length];
            reply.extend_from_slice(&[1, 3, 0, 0][..usize::from(length)]);
            reply.extend_from_slice(&[0xaa; 4]);
            let mut transport = Scripted(reply);
            assert_matches!(
                decode(&mut transport, 1, 1, &AC_POWER_MODEL, EnumMode::default()),
                Err(Error::Protocol(crate::Error::DataLengthTooShort { declared, available }))
                    if declared == u16::from(length) && available == usize::from(length)
            );
        }
    }

    #[test]
    fn strict_status_codes() {
        let mut image = solaredge_image();
        let status = (40107 - 40000) * 2;
        image[status..status + 2].copy_from_slice(&13u16.to_be_bytes());

        let mut client = SunSpecClient::new(FakeDevice::new(image), 1);
        let record = client.read_inverter().unwrap();
        assert_eq!(record.get("I_Status").unwrap().to_string(), "13");

        client.set_enum_mode(EnumMode::Strict);
        assert_matches!(
            client.read_inverter(),
            Err(Error::Protocol(crate::Error::InvalidEnumValue { value: 13, .. }))
        );
    }
}
