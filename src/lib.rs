//! A library for reading SunSpec models from solar inverters via Modbus TCP.
//!
//! SunSpec devices expose their data as blocks of 16-bit holding registers.
//! This crate describes such blocks as static [`mapping::RegisterMap`]s,
//! fetches them with a single "read holding registers" request and turns the
//! raw registers into named, scaled and unit-annotated [`value::Value`]s.
//!
//! The crate is layered:
//!
//! 1.  **Pure decoding**: [`registers`], [`decoder`], [`mapping`] and [`frame`]
//!     never touch the network. They can resolve register maps against
//!     captured data.
//!
//! 2.  **Request cycle**: [`client`] sends one request per map over any
//!     [`client::Transport`], with [`client::TcpTransport`] for blocking TCP.
//!     See [`safe_client::SafeClient`] for a client shared between threads and
//!     [`tokio_async`] for `async/await`.
//!
//! ## Features
//!
//! - **Exact Values**: Scale factors are applied as decimal exponents, no floating point rounding.
//! - **Validated Maps**: Register maps are checked for overlaps, dangling scale factors and sizes.
//! - **Strict Framing**: Responses must echo the transaction id, unit id and function code.
//! - **Synchronous and Asynchronous APIs**: Both blocking and `async/await` APIs are available.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sunspec_lib::client::{SunSpecClient, TcpTransport};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = TcpTransport::connect("192.168.1.100:1502", Duration::from_secs(5))?;
//!     let mut client = SunSpecClient::new(transport, 1);
//!
//!     let common = client.read_common()?;
//!     println!("Connected to {:?}", common.get("C_Model"));
//!
//!     let inverter = client.read_inverter()?;
//!     println!("Producing {:?}", inverter.get("I_AC_Power"));
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod client;
pub mod decoder;
pub mod frame;
pub mod mapping;
pub mod models;
pub mod registers;
pub mod value;

#[cfg_attr(docsrs, doc(cfg(feature = "safe-client-sync")))]
#[cfg(feature = "safe-client-sync")]
pub mod safe_client;

#[cfg_attr(docsrs, doc(cfg(feature = "tokio-tcp")))]
#[cfg(feature = "tokio-tcp")]
pub mod tokio_async;

#[cfg(test)]
mod testing;
