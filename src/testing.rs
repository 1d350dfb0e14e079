//! In-memory device answering "read holding registers" for unit tests.
use crate::client::Transport;
use crate::frame::{Frame, EXCEPTION_FLAG, READ_HOLDING_REGISTERS};
use std::collections::VecDeque;
use std::io;

/// First register of every test image.
pub const IMAGE_BASE: u16 = 40000;

/// Registers 40000..40121 of a SolarEdge SE5000H: common and inverter model.
pub fn solaredge_image() -> Vec<u8> {
    let mut image = vec![0u8; 121 * 2];
    let mut put = |offset: u16, data: &[u8]| {
        let at = usize::from(offset - IMAGE_BASE) * 2;
        image[at..at + data.len()].copy_from_slice(data);
    };
    put(40000, b"SunS");
    put(40002, &1u16.to_be_bytes());
    put(40003, &65u16.to_be_bytes());
    put(40004, b"SolarEdge ");
    put(40020, b"SE5000H-RW000BNN4");
    put(40044, b"0004.0011.0030");
    put(40052, b"7E0A1B2C");
    put(40068, &1u16.to_be_bytes());

    put(40069, &101u16.to_be_bytes());
    put(40070, &50u16.to_be_bytes());
    put(40083, &19807u16.to_be_bytes());
    put(40084, &(-1i16).to_be_bytes());
    put(40085, &50007u16.to_be_bytes());
    put(40086, &(-3i16).to_be_bytes());
    put(40093, &2826662u32.to_be_bytes());
    put(40095, &0i16.to_be_bytes());
    put(40100, &20108u16.to_be_bytes());
    put(40101, &(-1i16).to_be_bytes());
    put(40103, &5068i16.to_be_bytes());
    put(40106, &(-2i16).to_be_bytes());
    put(40107, &4u16.to_be_bytes());
    put(40108, &0u16.to_be_bytes());
    image
}

/// Answers requests from a register image starting at [`IMAGE_BASE`].
#[derive(Debug)]
pub struct FakeDevice {
    image: Vec<u8>,
    pending: VecDeque<u8>,
    chunk: usize,
    transaction_offset: u16,
    truncate: Option<usize>,
    /// Every request received, as sent on the wire.
    pub requests: Vec<Vec<u8>>,
}

impl FakeDevice {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            pending: VecDeque::new(),
            chunk: usize::MAX,
            transaction_offset: 0,
            truncate: None,
            requests: Vec::new(),
        }
    }

    /// Hands out at most `chunk` octets per `recv`.
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Answers with a transaction identifier off by `offset`.
    pub fn with_transaction_offset(mut self, offset: u16) -> Self {
        self.transaction_offset = offset;
        self
    }

    /// Closes the connection after `len` octets of every reply.
    pub fn truncate_replies(&mut self, len: usize) {
        self.truncate = Some(len);
    }

    /// The complete response to `request`.
    pub fn respond(&self, request: &[u8]) -> Vec<u8> {
        let transaction_id =
            u16::from_be_bytes([request[0], request[1]]).wrapping_add(self.transaction_offset);
        let unit_id = request[6];
        let start = u16::from_be_bytes([request[8], request[9]]);
        let count = u16::from_be_bytes([request[10], request[11]]);

        let from = usize::from(start.wrapping_sub(IMAGE_BASE)) * 2;
        let to = from + usize::from(count) * 2;
        let reply = match self.image.get(from..to) {
            Some(data) if start >= IMAGE_BASE => {
                let mut payload = vec![data.len() as u8];
                payload.extend_from_slice(data);
                Frame {
                    transaction_id,
                    unit_id,
                    function_code: READ_HOLDING_REGISTERS,
                    payload,
                }
            }
            // Illegal data address
            _ => Frame {
                transaction_id,
                unit_id,
                function_code: READ_HOLDING_REGISTERS | EXCEPTION_FLAG,
                payload: vec![0x02],
            },
        };
        reply.encode()
    }
}

impl Transport for FakeDevice {
    fn send(&mut self, octets: &[u8]) -> io::Result<()> {
        let mut reply = self.respond(octets);
        if let Some(len) = self.truncate {
            reply.truncate(len);
        }
        self.requests.push(octets.to_vec());
        self.pending.extend(reply);
        Ok(())
    }

    fn recv(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let take = max.min(self.chunk).min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }
}
