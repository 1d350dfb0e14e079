//! Thread-safe wrapper around [`SunSpecClient`].
//!
//! Clones share one transport. A request cycle holds the lock from sending
//! the request until the response is resolved, so cycles from different
//! threads never interleave on the wire.
//!
//! ## Example
//!
//! ```no_run
//! use sunspec_lib::{
//!     client::{SunSpecClient, TcpTransport},
//!     safe_client::SafeClient,
//! };
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = TcpTransport::connect("192.168.1.100:1502", Duration::from_secs(5))?;
//!     let client = SafeClient::new(SunSpecClient::new(transport, 1));
//!
//!     let poller = client.clone();
//!     let handle = std::thread::spawn(move || poller.read_ac_power());
//!
//!     println!("{:?}", client.read_common()?);
//!     println!("{:?}", handle.join().expect("poller panicked")?);
//!     Ok(())
//! }
//! ```
use crate::client::{Result, SunSpecClient, Transport};
use crate::decoder::EnumMode;
use crate::mapping::{Record, RegisterMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared, synchronous SunSpec client.
#[derive(Debug)]
pub struct SafeClient<T> {
    ctx: Arc<Mutex<SunSpecClient<T>>>,
}

impl<T> Clone for SafeClient<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<T: Transport> SafeClient<T> {
    pub fn new(client: SunSpecClient<T>) -> Self {
        Self {
            ctx: Arc::new(Mutex::new(client)),
        }
    }

    /// Creates a `SafeClient` from an already shared client.
    pub fn from_shared(ctx: Arc<Mutex<SunSpecClient<T>>>) -> Self {
        Self { ctx }
    }

    /// Clones the shared client.
    pub fn clone_shared(&self) -> Arc<Mutex<SunSpecClient<T>>> {
        self.ctx.clone()
    }

    // Poisoning is ignored, every cycle starts with a fresh request.
    fn lock(&self) -> MutexGuard<'_, SunSpecClient<T>> {
        self.ctx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_enum_mode(&self, mode: EnumMode) {
        self.lock().set_enum_mode(mode);
    }

    /// See [`SunSpecClient::read`].
    pub fn read(&self, map: &RegisterMap) -> Result<Record> {
        self.lock().read(map)
    }

    /// See [`SunSpecClient::read_common`].
    pub fn read_common(&self) -> Result<Record> {
        self.lock().read_common()
    }

    /// See [`SunSpecClient::read_inverter`].
    pub fn read_inverter(&self) -> Result<Record> {
        self.lock().read_inverter()
    }

    /// See [`SunSpecClient::read_ac_power`].
    pub fn read_ac_power(&self) -> Result<Record> {
        self.lock().read_ac_power()
    }
}
