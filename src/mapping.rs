//! Register maps and the resolver that turns register data into [`Record`]s.
//!
//! A [`RegisterMap`] lists the fields of one SunSpec model at their absolute
//! device register addresses and ends with a sentinel holding only the
//! exclusive end address:
//!
//! ```
//! use sunspec_lib::decoder::DecoderKind;
//! use sunspec_lib::mapping::{resolve, Entry, RegisterMap};
//! use sunspec_lib::registers::Registers;
//!
//! static AC_POWER: RegisterMap = RegisterMap::new(
//!     "ac_power",
//!     &[
//!         Entry::with_unit(40083, "I_AC_Power", DecoderKind::U16, "W"),
//!         Entry::field(40084, "I_AC_Power_SF", DecoderKind::I16),
//!         Entry::end(40085),
//!     ],
//! );
//!
//! // 19807 * 10^-1 W
//! let regs = Registers::new(40083, b"\x4d\x5f\xff\xff").unwrap();
//! let record = resolve(&regs, &AC_POWER).unwrap();
//! assert_eq!(record.len(), 1);
//! assert_eq!(record.get("I_AC_Power").unwrap().to_string(), "1980.7 W");
//! ```
//!
//! Fields named `X_SF` are scale factors: the resolver multiplies `X` by
//! `10^X_SF` and never exposes the `X_SF` field itself.
use crate::decoder::{DecoderKind, EnumMode};
use crate::error::{Error, Result};
use crate::frame::MAX_READ_REGISTERS;
use crate::registers::Registers;
use crate::value::{Quantity, Value};

/// Name suffix of scale factor fields.
pub const SCALE_FACTOR_SUFFIX: &str = "_SF";

/// A named, typed field of a register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub decoder: DecoderKind,
    pub unit: Option<&'static str>,
}

/// One row of a register map. The final row is a sentinel without a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub offset: u32,
    pub field: Option<Field>,
}

impl Entry {
    pub const fn field(offset: u32, name: &'static str, decoder: DecoderKind) -> Self {
        Self {
            offset,
            field: Some(Field {
                name,
                decoder,
                unit: None,
            }),
        }
    }

    pub const fn with_unit(
        offset: u32,
        name: &'static str,
        decoder: DecoderKind,
        unit: &'static str,
    ) -> Self {
        Self {
            offset,
            field: Some(Field {
                name,
                decoder,
                unit: Some(unit),
            }),
        }
    }

    /// The sentinel: one past the last register of the map.
    pub const fn end(offset: u32) -> Self {
        Self {
            offset,
            field: None,
        }
    }
}

/// An ordered table of fields describing one logical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    pub name: &'static str,
    pub entries: &'static [Entry],
}

impl RegisterMap {
    pub const fn new(name: &'static str, entries: &'static [Entry]) -> Self {
        Self { name, entries }
    }

    fn malformed(&self, reason: impl Into<String>) -> Error {
        Error::MalformedMap {
            map: self.name,
            reason: reason.into(),
        }
    }

    /// The field rows, after checking that the map ends with its sentinel.
    pub fn fields(&self) -> Result<impl Iterator<Item = (u32, &'static Field)>> {
        let (last, fields) = self
            .entries
            .split_last()
            .ok_or_else(|| self.malformed("map is empty"))?;
        if last.field.is_some() {
            return Err(self.malformed("map does not end with a sentinel entry"));
        }
        let fields = fields
            .iter()
            .map(|entry| {
                entry
                    .field
                    .as_ref()
                    .map(|field| (entry.offset, field))
                    .ok_or_else(|| {
                        self.malformed(format!("sentinel at {} before the end", entry.offset))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(fields.into_iter())
    }

    /// First register of the map.
    pub fn start(&self) -> Result<u32> {
        self.entries
            .first()
            .map(|entry| entry.offset)
            .ok_or_else(|| self.malformed("map is empty"))
    }

    /// One past the last register of the map, taken from the sentinel.
    pub fn end(&self) -> Result<u32> {
        match self.entries.last() {
            Some(Entry {
                offset,
                field: None,
            }) => Ok(*offset),
            Some(_) => Err(self.malformed("map does not end with a sentinel entry")),
            None => Err(self.malformed("map is empty")),
        }
    }

    /// Start register and register count of the read request covering the map.
    pub fn span(&self) -> Result<(u16, u16)> {
        let (start, end) = (self.start()?, self.end()?);
        let count = end
            .checked_sub(start)
            .ok_or_else(|| self.malformed("sentinel precedes the first field"))?;
        let start = u16::try_from(start)
            .map_err(|_| self.malformed(format!("start register {start} exceeds 16 bits")))?;
        let count = u16::try_from(count)
            .ok()
            .filter(|count| (1..=MAX_READ_REGISTERS).contains(count))
            .ok_or_else(|| {
                self.malformed(format!(
                    "span of {count} registers does not fit one read (1..={MAX_READ_REGISTERS})"
                ))
            })?;
        if u32::from(start) + u32::from(count) > u32::from(u16::MAX) + 1 {
            return Err(self.malformed("span runs past register 65535"));
        }
        Ok((start, count))
    }

    /// Checks every authoring rule the resolver relies on.
    ///
    /// Fields must be in strictly increasing order and must not overlap their
    /// successor, units are only allowed on integer fields, and every `X_SF`
    /// field needs an integer sibling `X`.
    pub fn validate(&self) -> Result<()> {
        let fields: Vec<_> = self.fields()?.collect();
        self.span()?;

        for pair in self.entries.windows(2) {
            let (entry, next) = (&pair[0], &pair[1]);
            if next.offset <= entry.offset {
                return Err(self.malformed(format!(
                    "offsets not strictly increasing at {}",
                    next.offset
                )));
            }
            if let Some(field) = &entry.field {
                if entry.offset + field.decoder.registers() > next.offset {
                    return Err(self.malformed(format!(
                        "field '{}' overlaps register {}",
                        field.name, next.offset
                    )));
                }
            }
        }

        for (index, (_, field)) in fields.iter().enumerate() {
            if fields[..index].iter().any(|(_, other)| other.name == field.name) {
                return Err(self.malformed(format!("duplicate field '{}'", field.name)));
            }
            if field.unit.is_some() && !field.decoder.is_numeric() {
                return Err(Error::InvalidUnitTarget(field.name));
            }
            if let Some(target) = field.name.strip_suffix(SCALE_FACTOR_SUFFIX) {
                let (_, target) = fields
                    .iter()
                    .find(|(_, other)| other.name == target)
                    .ok_or(Error::DanglingScaleFactor(field.name))?;
                if !field.decoder.is_numeric() || !target.decoder.is_numeric() {
                    return Err(Error::InvalidScaleFactor(field.name));
                }
            }
        }
        Ok(())
    }
}

/// Decoded fields in map order. Scale factor fields are never included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl IntoIterator for Record {
    type Item = (&'static str, Value);
    type IntoIter = std::vec::IntoIter<(&'static str, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Record {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

/// Destination for resolved records, e.g. a console printer or an MQTT publisher.
pub trait RecordSink {
    type Error;

    fn publish(&mut self, record: &Record) -> std::result::Result<(), Self::Error>;
}

/// Resolves `map` against `regs`, passing unknown status codes through.
pub fn resolve(regs: &Registers<'_>, map: &RegisterMap) -> Result<Record> {
    resolve_with(regs, map, EnumMode::default())
}

/// Resolves `map` against `regs`.
///
/// The first pass decodes every field at its absolute register and attaches
/// declared units. The second pass builds the record from the non scale
/// factor fields, each multiplied by `10^X_SF` when a scale factor exists.
pub fn resolve_with(regs: &Registers<'_>, map: &RegisterMap, mode: EnumMode) -> Result<Record> {
    let mut values = Vec::with_capacity(map.entries.len());
    let mut factors = Vec::new();
    for (offset, field) in map.fields()? {
        let value = field.decoder.decode(regs, offset, mode)?;
        let value = match field.unit {
            Some(unit) => {
                let number = value
                    .as_decimal()
                    .ok_or(Error::InvalidUnitTarget(field.name))?;
                Value::Quantity(Quantity::new(number, Some(unit)))
            }
            None => value,
        };
        match field.name.strip_suffix(SCALE_FACTOR_SUFFIX) {
            Some(target) => factors.push((target, field.name, value)),
            None => values.push((field.name, value)),
        }
    }

    for (target, factor, _) in &factors {
        if !values.iter().any(|(name, _)| name == target) {
            return Err(Error::DanglingScaleFactor(*factor));
        }
    }

    let fields = values
        .into_iter()
        .map(|(name, value)| {
            let Some((_, factor, exponent)) = factors.iter().find(|(target, ..)| *target == name)
            else {
                return Ok((name, value));
            };
            let exponent = exponent
                .as_integer()
                .and_then(|exponent| i32::try_from(exponent).ok())
                .ok_or(Error::InvalidScaleFactor(*factor))?;
            let number = value
                .as_decimal()
                .ok_or(Error::InvalidScaleFactor(*factor))?;
            let scaled = Quantity::new(number.scale(exponent), value.unit());
            Ok((name, Value::Quantity(scaled)))
        })
        .collect::<Result<Vec<_>>>()?;

    log::trace!("Resolved {} fields of map '{}'", fields.len(), map.name);
    Ok(Record { fields })
}
