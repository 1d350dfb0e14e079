//! Modbus TCP framing for "read holding registers".
//!
//! ```text
//! request:  [transaction:2][protocol:2 = 0][length:2] {unit:1}{function:1 = 0x03} [start:2][count:2]
//! response: [transaction:2][protocol:2 = 0][length:2] {unit:1}{function:1} [byte count:1]{register octets}
//! ```
//!
//! All multi-octet fields are big-endian. `length` counts the octets after
//! itself (unit id, function code and payload).
//!
//! A transcript of a SolarEdge inverter answering a common model request:
//!
//! ```text
//! >> 0001 0000 0006 0103 9c40 0045        transaction 1, unit 1, 69 registers from 40000
//! << 0001 0000 008d 0103 8a 5375 6e53 ...  138 octets of register data, "SunS" first
//! ```
use crate::error::{Error, Result};
use crate::registers::Registers;

/// Function code of "read holding registers".
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
/// Function code bit flagging an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;
/// Protocol identifier of Modbus in the MBAP header.
pub const PROTOCOL_ID: u16 = 0x0000;
/// Octets before the length field's data: transaction, protocol and length.
pub const MBAP_PREFIX_LEN: usize = 6;
/// Octets of the MBAP header plus the function code.
pub const HEADER_LEN: usize = 8;
/// Largest value of the MBAP length field (unit id plus a 253 octet PDU).
pub const MAX_DATA_LEN: u16 = 254;
/// Most registers one "read holding registers" request may ask for.
pub const MAX_READ_REGISTERS: u16 = 125;

/// A Modbus TCP request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub function_code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// A "read holding registers" request for `count` registers from `start`.
    pub fn read_holding_registers(transaction_id: u16, unit_id: u8, start: u16, count: u16) -> Self {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&start.to_be_bytes());
        payload.extend_from_slice(&count.to_be_bytes());
        Self {
            transaction_id,
            unit_id,
            function_code: READ_HOLDING_REGISTERS,
            payload,
        }
    }

    /// The frame as sent on the wire.
    pub fn encode(&self) -> Vec<u8> {
        // unit id + function code + payload
        let length = (2 + self.payload.len()) as u16;
        let mut octets = Vec::with_capacity(HEADER_LEN + self.payload.len());
        octets.extend_from_slice(&self.transaction_id.to_be_bytes());
        octets.extend_from_slice(&PROTOCOL_ID.to_be_bytes());
        octets.extend_from_slice(&length.to_be_bytes());
        octets.push(self.unit_id);
        octets.push(self.function_code);
        octets.extend_from_slice(&self.payload);
        octets
    }
}

/// Encodes a "read holding registers" request.
pub fn build_read_request(transaction_id: u16, unit_id: u8, start: u16, count: u16) -> Vec<u8> {
    Frame::read_holding_registers(transaction_id, unit_id, start, count).encode()
}

/// A response frame borrowed from the received octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedFrame<'a> {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub function_code: u8,
    pub payload: &'a [u8],
}

/// Validates the header of a response and splits it into its fields.
///
/// # Errors
///
/// * [`Error::FrameTooShort`] below 8 octets.
/// * [`Error::ProtocolMismatch`] for a non-zero protocol identifier.
/// * [`Error::DataLengthTooShort`] if the length field is below 2 or larger
///   than the octets received.
pub fn parse_response(octets: &[u8]) -> Result<ParsedFrame<'_>> {
    if octets.len() < HEADER_LEN {
        return Err(Error::FrameTooShort(octets.len()));
    }
    let transaction_id = u16::from_be_bytes([octets[0], octets[1]]);
    let protocol_id = u16::from_be_bytes([octets[2], octets[3]]);
    if protocol_id != PROTOCOL_ID {
        return Err(Error::ProtocolMismatch(protocol_id));
    }
    let length = u16::from_be_bytes([octets[4], octets[5]]);
    if length < 2 || octets.len() < MBAP_PREFIX_LEN + usize::from(length) {
        return Err(Error::DataLengthTooShort {
            declared: length,
            available: octets.len() - MBAP_PREFIX_LEN,
        });
    }
    Ok(ParsedFrame {
        transaction_id,
        unit_id: octets[6],
        function_code: octets[7],
        payload: &octets[HEADER_LEN..],
    })
}

impl<'a> ParsedFrame<'a> {
    /// Whether the device answered with a Modbus exception.
    pub fn is_exception(&self) -> bool {
        self.function_code & EXCEPTION_FLAG != 0
    }

    /// Checks that this frame answers `request`.
    ///
    /// The full 16-bit transaction identifier must be echoed, as well as the
    /// unit id and function code. Exception responses are reported as
    /// [`Error::Exception`].
    pub fn answers(&self, request: &Frame) -> Result<()> {
        if self.transaction_id != request.transaction_id {
            return Err(Error::TransactionMismatch {
                expected: request.transaction_id,
                actual: self.transaction_id,
            });
        }
        if self.unit_id != request.unit_id {
            return Err(Error::UnitMismatch {
                expected: request.unit_id,
                actual: self.unit_id,
            });
        }
        if self.function_code == request.function_code | EXCEPTION_FLAG {
            return Err(Error::Exception {
                function: request.function_code,
                code: self.payload.first().copied().unwrap_or_default(),
            });
        }
        if self.function_code != request.function_code {
            return Err(Error::UnexpectedFunction {
                expected: request.function_code,
                actual: self.function_code,
            });
        }
        Ok(())
    }

    /// The register data of a "read holding registers" response, based at register 0.
    ///
    /// Octets beyond the declared byte count are ignored.
    ///
    /// # Errors
    ///
    /// * [`Error::EmptyPayload`] without a byte count.
    /// * [`Error::OddByteCount`] if the byte count is odd.
    /// * [`Error::TruncatedPayload`] if fewer octets follow than declared.
    pub fn data_as_registers(&self) -> Result<Registers<'a>> {
        let (&byte_count, data) = self.payload.split_first().ok_or(Error::EmptyPayload)?;
        let byte_count = usize::from(byte_count);
        if byte_count % 2 != 0 {
            return Err(Error::OddByteCount(byte_count));
        }
        let data = data.get(..byte_count).ok_or(Error::TruncatedPayload {
            declared: byte_count,
            available: data.len(),
        })?;
        Registers::new(0, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// Builds a response carrying `words` as register data.
    fn response(transaction_id: u16, unit_id: u8, words: &[u16]) -> Vec<u8> {
        let mut payload = vec![(words.len() * 2) as u8];
        for word in words {
            payload.extend_from_slice(&word.to_be_bytes());
        }
        Frame {
            transaction_id,
            unit_id,
            function_code: READ_HOLDING_REGISTERS,
            payload,
        }
        .encode()
    }

    #[test]
    fn common_model_request_matches_transcript() {
        assert_eq!(
            build_read_request(1, 1, 40000, 69),
            [0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x9c, 0x40, 0x00, 0x45]
        );
    }

    #[test]
    fn inverter_model_request() {
        // 40069 = 0x9c85, 52 = 0x34
        assert_eq!(
            build_read_request(0x1234, 1, 40069, 52),
            [0x12, 0x34, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x9c, 0x85, 0x00, 0x34]
        );
    }

    #[test]
    fn response_transcript() {
        let mut octets = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x8d, 0x01, 0x03, 0x8a];
        octets.extend_from_slice(b"SunS");
        octets.resize(6 + 0x8d, 0x00);
        let frame = parse_response(&octets).unwrap();
        assert_eq!(frame.transaction_id, 1);
        assert_eq!(frame.unit_id, 1);
        assert_eq!(frame.function_code, READ_HOLDING_REGISTERS);
        let regs = frame.data_as_registers().unwrap();
        assert_eq!(regs.len(), 69);
        assert_eq!(regs.words(..2).unwrap(), vec![0x5375, 0x6e53]);
    }

    #[test]
    fn registers_survive_framing() {
        for count in [1u16, 2, 52, 69, MAX_READ_REGISTERS] {
            let words: Vec<u16> = (0..count).map(|i| i.wrapping_mul(0x0101) ^ 0xa5a5).collect();
            let octets = response(7, 1, &words);
            let frame = parse_response(&octets).unwrap();
            let regs = frame.data_as_registers().unwrap().with_base(40000);
            assert_eq!(regs.len(), usize::from(count));
            assert_eq!(regs.words(..).unwrap(), words);
        }
    }

    #[test]
    fn header_validation() {
        assert_matches!(parse_response(&[0; 7]), Err(Error::FrameTooShort(7)));
        assert_matches!(
            parse_response(&[0, 1, 0, 1, 0, 2, 1, 3]),
            Err(Error::ProtocolMismatch(1))
        );
        assert_matches!(
            parse_response(&[0, 1, 0, 0, 0, 1, 1, 3]),
            Err(Error::DataLengthTooShort { declared: 1, .. })
        );
        assert_matches!(
            parse_response(&[0, 1, 0, 0, 0, 5, 1, 3, 2]),
            Err(Error::DataLengthTooShort { declared: 5, available: 3 })
        );
    }

    #[test]
    fn payload_validation() {
        let empty = [0, 1, 0, 0, 0, 2, 1, 3];
        assert_matches!(
            parse_response(&empty).unwrap().data_as_registers(),
            Err(Error::EmptyPayload)
        );
        let odd = [0, 1, 0, 0, 0, 4, 1, 3, 1, 0xff];
        assert_matches!(
            parse_response(&odd).unwrap().data_as_registers(),
            Err(Error::OddByteCount(1))
        );
        let truncated = [0, 1, 0, 0, 0, 5, 1, 3, 4, 0, 1];
        assert_matches!(
            parse_response(&truncated).unwrap().data_as_registers(),
            Err(Error::TruncatedPayload { declared: 4, available: 2 })
        );
    }

    #[test]
    fn trailing_octets_are_ignored() {
        let octets = [0, 1, 0, 0, 0, 7, 1, 3, 2, 0x12, 0x34, 0x56, 0x78];
        let regs = parse_response(&octets).unwrap().data_as_registers().unwrap();
        assert_eq!(regs.words(..).unwrap(), vec![0x1234]);
    }

    #[test]
    fn response_must_answer_request() {
        let request = Frame::read_holding_registers(0x0102, 1, 40000, 1);
        let ok = response(0x0102, 1, &[0]);
        assert!(parse_response(&ok).unwrap().answers(&request).is_ok());

        // Only the high octet differs.
        let other = response(0x0202, 1, &[0]);
        assert_matches!(
            parse_response(&other).unwrap().answers(&request),
            Err(Error::TransactionMismatch { expected: 0x0102, actual: 0x0202 })
        );

        let wrong_unit = response(0x0102, 2, &[0]);
        assert_matches!(
            parse_response(&wrong_unit).unwrap().answers(&request),
            Err(Error::UnitMismatch { expected: 1, actual: 2 })
        );

        let exception = [0x01, 0x02, 0, 0, 0, 3, 1, 0x83, 0x02];
        let frame = parse_response(&exception).unwrap();
        assert!(frame.is_exception());
        assert_matches!(
            frame.answers(&request),
            Err(Error::Exception { function: 0x03, code: 0x02 })
        );

        let wrong_function = [0x01, 0x02, 0, 0, 0, 3, 1, 0x04, 0x00];
        assert_matches!(
            parse_response(&wrong_function).unwrap().answers(&request),
            Err(Error::UnexpectedFunction { expected: 0x03, actual: 0x04 })
        );
    }
}
