//! Conversions from raw register octets to [`Value`]s.
//!
//! Every register map field names one [`DecoderKind`]. All integers are
//! big-endian, 32-bit values occupy two consecutive registers with the high
//! word first.
use crate::error::{Error, Result};
use crate::registers::Registers;
use crate::value::{EnumTable, Value};

/// How status registers treat codes missing from their table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnumMode {
    /// Unknown codes are passed through without a name.
    #[default]
    Permissive,
    /// Unknown codes fail with [`Error::InvalidEnumValue`].
    Strict,
}

/// The data type of a register map field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    I16,
    U16,
    I32,
    U32,
    /// UTF-8 text of the given octet length, trailing NULs and spaces removed.
    Str(u32),
    /// Raw octets of the given length.
    Bstr(u32),
    /// An unsigned 16-bit status code.
    Enum(&'static EnumTable),
}

impl DecoderKind {
    /// Number of octets read from the registers.
    pub const fn octets(&self) -> u32 {
        match self {
            DecoderKind::I16 | DecoderKind::U16 | DecoderKind::Enum(_) => 2,
            DecoderKind::I32 | DecoderKind::U32 => 4,
            DecoderKind::Str(len) | DecoderKind::Bstr(len) => *len,
        }
    }

    /// Number of registers spanned, rounding partial registers up.
    pub const fn registers(&self) -> u32 {
        self.octets().div_ceil(2)
    }

    /// Whether decoded values are integers and may carry a unit or scale factor.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            DecoderKind::I16 | DecoderKind::U16 | DecoderKind::I32 | DecoderKind::U32
        )
    }

    /// Decodes the field at the absolute register `offset`.
    pub fn decode(&self, regs: &Registers<'_>, offset: u32, mode: EnumMode) -> Result<Value> {
        let octets = regs.read(offset, self.octets())?;
        Ok(match *self {
            DecoderKind::I16 => Value::I16(i16::from_be_bytes(array(octets))),
            DecoderKind::U16 => Value::U16(u16::from_be_bytes(array(octets))),
            DecoderKind::I32 => Value::I32(i32::from_be_bytes(array(octets))),
            DecoderKind::U32 => Value::U32(u32::from_be_bytes(array(octets))),
            DecoderKind::Str(_) => Value::Text(
                std::str::from_utf8(trim_padding(octets))
                    .map_err(|source| Error::InvalidEncoding { offset, source })?
                    .to_owned(),
            ),
            DecoderKind::Bstr(_) => Value::Bytes(octets.to_vec()),
            DecoderKind::Enum(table) => {
                let code = table.code(u16::from_be_bytes(array(octets)));
                if mode == EnumMode::Strict && !code.is_known() {
                    return Err(Error::InvalidEnumValue {
                        offset,
                        value: code.code,
                        table: table.name,
                    });
                }
                Value::Status(code)
            }
        })
    }
}

/// Copies exactly `N` octets; `Registers::read` already guarantees the length.
fn array<const N: usize>(octets: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&octets[..N]);
    out
}

fn trim_padding(octets: &[u8]) -> &[u8] {
    let end = octets
        .iter()
        .rposition(|octet| !matches!(octet, 0x00 | 0x20))
        .map_or(0, |last| last + 1);
    &octets[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    static STATUS: EnumTable = EnumTable {
        name: "status",
        codes: &[(4, "MPPT")],
    };

    fn decode(kind: DecoderKind, octets: &[u8], offset: u32) -> Result<Value> {
        let regs = Registers::new(40000, octets).unwrap();
        kind.decode(&regs, offset, EnumMode::Permissive)
    }

    #[test]
    fn integers() {
        let aap = b"\x41\x61\x70\x00";
        assert_eq!(decode(DecoderKind::U32, aap, 40000).unwrap(), Value::U32(0x41617000));
        assert_eq!(decode(DecoderKind::U16, aap, 40001).unwrap(), Value::U16(0x7000));
        assert_eq!(decode(DecoderKind::I16, b"\xff\xfd", 40000).unwrap(), Value::I16(-3));
        assert_eq!(
            decode(DecoderKind::I32, b"\xff\xff\xff\xfe", 40000).unwrap(),
            Value::I32(-2)
        );
        assert_matches!(
            decode(DecoderKind::U32, aap, 40001),
            Err(Error::OutOfRange { .. })
        );
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(
            decode(DecoderKind::Str(4), b"Aap\x00", 40000).unwrap(),
            Value::Text("Aap".into())
        );
        assert_eq!(
            decode(DecoderKind::Str(8), b"Aap \x00 \x00\x00", 40000).unwrap(),
            Value::Text("Aap".into())
        );
        assert_eq!(
            decode(DecoderKind::Str(4), b"A ap", 40000).unwrap(),
            Value::Text("A ap".into())
        );
        assert_eq!(
            decode(DecoderKind::Str(4), b"\x00\x00\x00\x00", 40000).unwrap(),
            Value::Text(String::new())
        );
    }

    #[test]
    fn text_trimming_is_idempotent() {
        let once = decode(DecoderKind::Str(4), b"Aap\x00", 40000).unwrap();
        let Value::Text(text) = &once else {
            panic!("expected text, got {once:?}");
        };
        let again = decode(DecoderKind::Str(4), &[text.as_bytes(), &b"\x20"[..]].concat(), 40000);
        assert_eq!(again.unwrap(), once);
    }

    #[test]
    fn text_must_be_utf8() {
        assert_matches!(
            decode(DecoderKind::Str(2), b"\xc3\x28", 40000),
            Err(Error::InvalidEncoding { offset: 40000, .. })
        );
    }

    #[test]
    fn raw_bytes_keep_padding() {
        assert_eq!(
            decode(DecoderKind::Bstr(4), b"Aap\x00", 40000).unwrap(),
            Value::Bytes(b"Aap\x00".to_vec())
        );
    }

    #[test]
    fn status_codes() {
        let mppt = decode(DecoderKind::Enum(&STATUS), b"\x00\x04", 40000).unwrap();
        assert_eq!(mppt, Value::Status(STATUS.code(4)));
        assert_eq!(mppt.to_string(), "MPPT");

        let vendor = decode(DecoderKind::Enum(&STATUS), b"\x00\x0d", 40000).unwrap();
        assert_eq!(vendor.to_string(), "13");

        let regs = Registers::new(40000, b"\x00\x0d").unwrap();
        assert_matches!(
            DecoderKind::Enum(&STATUS).decode(&regs, 40000, EnumMode::Strict),
            Err(Error::InvalidEnumValue { value: 13, .. })
        );
    }

    #[test]
    fn widths() {
        assert_eq!(DecoderKind::Str(32).registers(), 16);
        assert_eq!(DecoderKind::Bstr(3).registers(), 2);
        assert_eq!(DecoderKind::U32.registers(), 2);
        assert!(DecoderKind::I16.is_numeric());
        assert!(!DecoderKind::Enum(&STATUS).is_numeric());
        assert!(!DecoderKind::Str(2).is_numeric());
    }
}
