//! Asynchronous request cycle on top of `tokio`.
//!
//! Works over any `AsyncRead + AsyncWrite` stream, a [`TcpStream`] in
//! production. All client methods are `async` and must be `.await`ed.
//!
//! ```no_run
//! use sunspec_lib::tokio_async;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = tokio_async::connect("192.168.1.100:1502", 1).await?;
//!     let power = client.read_ac_power().await?;
//!     println!("{:?}", power.get("I_AC_Power"));
//!     Ok(())
//! }
//! ```
use crate::client::{check_length, check_sunspec_id, request_for, resolve_response, Error, Result};
use crate::decoder::EnumMode;
use crate::frame::{MAX_DATA_LEN, MBAP_PREFIX_LEN};
use crate::mapping::{Record, RegisterMap};
use crate::models::{AC_POWER_MODEL, COMMON_MODEL, INVERTER_MODEL};
use log::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

/// Connects to a Modbus TCP device.
pub async fn connect<A: ToSocketAddrs>(
    address: A,
    unit_id: u8,
) -> std::io::Result<AsyncSunSpecClient<TcpStream>> {
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;
    Ok(AsyncSunSpecClient::new(stream, unit_id))
}

/// Asynchronous SunSpec client owning its stream.
#[derive(Debug)]
pub struct AsyncSunSpecClient<S> {
    stream: S,
    unit_id: u8,
    transaction_id: u16,
    enum_mode: EnumMode,
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncSunSpecClient<S> {
    pub fn new(stream: S, unit_id: u8) -> Self {
        Self {
            stream,
            unit_id,
            transaction_id: rand::random(),
            enum_mode: EnumMode::default(),
        }
    }

    pub fn set_enum_mode(&mut self, mode: EnumMode) {
        self.enum_mode = mode;
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Reads and resolves an arbitrary register map.
    pub async fn read(&mut self, map: &RegisterMap) -> Result<Record> {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        let request = request_for(self.transaction_id, self.unit_id, map)?;
        debug!(
            "Reading map '{}' from unit {} (transaction {})",
            map.name, self.unit_id, self.transaction_id
        );

        let octets = request.encode();
        trace!("Sending {octets:02x?}");
        self.stream.write_all(&octets).await?;
        self.stream.flush().await?;

        let mut response = vec![0u8; MBAP_PREFIX_LEN];
        self.stream.read_exact(&mut response).await?;
        let length = u16::from_be_bytes([response[4], response[5]]);
        if length > MAX_DATA_LEN {
            return Err(Error::FrameTooLarge(length));
        }
        response.resize(MBAP_PREFIX_LEN + usize::from(length), 0);
        self.stream
            .read_exact(&mut response[MBAP_PREFIX_LEN..])
            .await?;
        check_length(length)?;
        trace!("Received {response:02x?}");

        resolve_response(&request, &response, map, self.enum_mode)
    }

    /// Reads the common model and checks the SunSpec marker.
    pub async fn read_common(&mut self) -> Result<Record> {
        let common = self.read(&COMMON_MODEL).await?;
        check_sunspec_id(&common)?;
        Ok(common)
    }

    pub async fn read_inverter(&mut self) -> Result<Record> {
        self.read(&INVERTER_MODEL).await
    }

    pub async fn read_ac_power(&mut self) -> Result<Record> {
        self.read(&AC_POWER_MODEL).await
    }
}
