//! Typed values decoded from registers.
//!
//! Scaled measurements are kept exact: a [`Decimal`] stores the raw register
//! integer as its mantissa and the scale factor register as its power-of-ten
//! exponent, so `50007` with scale factor `-3` is `50.007` without any binary
//! floating point in between.
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An exact decimal number `mantissa * 10^exponent`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i64,
    exponent: i32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal::new(0, 0);

    pub const fn new(mantissa: i64, exponent: i32) -> Self {
        Self { mantissa, exponent }
    }

    pub const fn from_int(value: i64) -> Self {
        Self::new(value, 0)
    }

    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    pub fn exponent(&self) -> i32 {
        self.exponent
    }

    /// Multiplies by `10^exponent`. Only the exponent changes.
    pub fn scale(self, exponent: i32) -> Self {
        Self::new(self.mantissa, self.exponent.saturating_add(exponent))
    }

    /// Same value with trailing zeros moved from the mantissa into the exponent.
    pub fn normalize(self) -> Self {
        if self.mantissa == 0 {
            return Self::ZERO;
        }
        let (mut mantissa, mut exponent) = (self.mantissa, self.exponent);
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent = exponent.saturating_add(1);
        }
        Self::new(mantissa, exponent)
    }

    /// Integer part, truncated toward zero. Saturates on overflow.
    pub fn trunc(&self) -> i64 {
        let Decimal { mantissa, exponent } = self.normalize();
        if exponent >= 0 {
            10i64
                .checked_pow(exponent as u32)
                .and_then(|factor| mantissa.checked_mul(factor))
                .unwrap_or(if mantissa < 0 { i64::MIN } else { i64::MAX })
        } else {
            match 10i64.checked_pow(exponent.unsigned_abs()) {
                Some(divisor) => mantissa / divisor,
                None => 0,
            }
        }
    }

    /// Nearest `f64`, for consumers that do not need exact values.
    pub fn to_f64(&self) -> f64 {
        let magnitude = 10f64.powi(self.exponent.unsigned_abs().min(400) as i32);
        if self.exponent < 0 {
            self.mantissa as f64 / magnitude
        } else {
            self.mantissa as f64 * magnitude
        }
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::from_int(value)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.normalize(), other.normalize());
        a.mantissa == b.mantissa && a.exponent == b.exponent
    }
}

impl Eq for Decimal {}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let Decimal { mantissa, exponent } = self.normalize();
        mantissa.hash(state);
        exponent.hash(state);
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            return Ordering::Equal;
        }
        // Bring both to the smaller exponent; fall back to f64 if that overflows.
        let exponent = self.exponent.min(other.exponent);
        let widen = |d: &Decimal| -> Option<i128> {
            let shift = u32::try_from(d.exponent as i64 - exponent as i64).ok()?;
            10i128.checked_pow(shift)?.checked_mul(d.mantissa as i128)
        };
        match (widen(self), widen(other)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => self
                .to_f64()
                .partial_cmp(&other.to_f64())
                .unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        let text = if self.exponent >= 0 {
            format!("{sign}{digits}{}", "0".repeat(self.exponent as usize))
        } else {
            let fraction = self.exponent.unsigned_abs() as usize;
            let padded = if digits.len() <= fraction {
                format!("{}{digits}", "0".repeat(fraction - digits.len() + 1))
            } else {
                digits
            };
            let (int, frac) = padded.split_at(padded.len() - fraction);
            format!("{sign}{int}.{frac}")
        };
        f.pad(&text)
    }
}

/// A decimal measurement with an optional physical unit, e.g. `1980.7 W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: Option<&'static str>,
}

impl Quantity {
    pub fn new(value: Decimal, unit: Option<&'static str>) -> Self {
        Self { value, unit }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Some(unit) => f.pad(&format!("{} {unit}", self.value)),
            None => fmt::Display::fmt(&self.value, f),
        }
    }
}

/// A fixed table of named codes for a status register.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EnumTable {
    pub name: &'static str,
    pub codes: &'static [(u16, &'static str)],
}

impl EnumTable {
    /// Looks up the name of `code`.
    pub fn name_of(&self, code: u16) -> Option<&'static str> {
        self.codes
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, name)| *name)
    }

    /// Wraps `code`, naming it when it is part of the table.
    pub fn code(&self, code: u16) -> StatusCode {
        StatusCode {
            code,
            name: self.name_of(code),
        }
    }
}

/// A decoded status register. Vendor specific codes keep `name == None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode {
    pub code: u16,
    pub name: Option<&'static str>,
}

impl StatusCode {
    pub fn is_known(&self) -> bool {
        self.name.is_some()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(name) => f.pad(name),
            None => f.pad(&self.code.to_string()),
        }
    }
}

/// One decoded register field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    /// Text with trailing NUL and space padding removed.
    Text(String),
    /// Raw octets, padding included.
    Bytes(Vec<u8>),
    Status(StatusCode),
    Quantity(Quantity),
}

impl Value {
    /// The integer held by an integer variant.
    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::I16(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            _ => None,
        }
    }

    /// The numeric value of an integer or quantity variant.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Quantity(quantity) => Some(quantity.value),
            other => other.as_integer().map(Decimal::from_int),
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Value::Quantity(quantity) => quantity.unit,
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_decimal().is_some()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I16(v) => fmt::Display::fmt(v, f),
            Value::U16(v) => fmt::Display::fmt(v, f),
            Value::I32(v) => fmt::Display::fmt(v, f),
            Value::U32(v) => fmt::Display::fmt(v, f),
            Value::Text(text) => f.pad(text),
            Value::Bytes(octets) => {
                let hex: String = octets.iter().map(|octet| format!("{octet:02x}")).collect();
                f.pad(&hex)
            }
            Value::Status(status) => fmt::Display::fmt(status, f),
            Value::Quantity(quantity) => fmt::Display::fmt(quantity, f),
        }
    }
}

#[cfg(feature = "serde")]
mod serialize {
    use super::*;
    use serde::ser::{Serialize, SerializeMap, Serializer};

    impl Serialize for Decimal {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl Serialize for Quantity {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("value", &self.value)?;
            map.serialize_entry("unit", &self.unit)?;
            map.end()
        }
    }

    impl Serialize for StatusCode {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("code", &self.code)?;
            map.serialize_entry("name", &self.name)?;
            map.end()
        }
    }

    impl Serialize for Value {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self {
                Value::I16(v) => serializer.serialize_i16(*v),
                Value::U16(v) => serializer.serialize_u16(*v),
                Value::I32(v) => serializer.serialize_i32(*v),
                Value::U32(v) => serializer.serialize_u32(*v),
                Value::Text(text) => serializer.serialize_str(text),
                Value::Bytes(octets) => serializer.serialize_bytes(octets),
                Value::Status(status) => status.serialize(serializer),
                Value::Quantity(quantity) => quantity.serialize(serializer),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_display() {
        assert_eq!(Decimal::new(19807, -1).to_string(), "1980.7");
        assert_eq!(Decimal::new(50007, -3).to_string(), "50.007");
        assert_eq!(Decimal::new(5, -3).to_string(), "0.005");
        assert_eq!(Decimal::new(-5, -3).to_string(), "-0.005");
        assert_eq!(Decimal::new(-12345, -2).to_string(), "-123.45");
        assert_eq!(Decimal::new(500, -2).to_string(), "5.00");
        assert_eq!(Decimal::new(2826662, 0).to_string(), "2826662");
        assert_eq!(Decimal::new(5, 2).to_string(), "500");
        assert_eq!(Decimal::ZERO.to_string(), "0");
        assert_eq!(format!("{:>8}", Decimal::new(15, -1)), "     1.5");
    }

    #[test]
    fn decimal_compares_numerically() {
        assert_eq!(Decimal::new(19807, -1), Decimal::new(198070, -2));
        assert_eq!(Decimal::new(500, -2), Decimal::from_int(5));
        assert_eq!(Decimal::new(0, 7), Decimal::ZERO);
        assert_ne!(Decimal::new(19807, -1), Decimal::new(19807, -2));
        assert!(Decimal::new(5, -1) < Decimal::new(6, -1));
        assert!(Decimal::new(-1, 3) < Decimal::new(1, -3));
        assert!(Decimal::new(1, 1) > Decimal::new(9, 0));
    }

    #[test]
    fn decimal_scaling_is_exact() {
        for exponent in -10..=10 {
            let scaled = Decimal::from_int(2826662).scale(exponent);
            assert_eq!(scaled.mantissa(), 2826662);
            assert_eq!(scaled.exponent(), exponent);
        }
        assert_eq!(
            Decimal::from_int(28266620).scale(-1),
            Decimal::from_int(2826662)
        );
    }

    #[test]
    fn decimal_truncates_toward_zero() {
        assert_eq!(Decimal::new(19807, -1).trunc(), 1980);
        assert_eq!(Decimal::new(-19807, -1).trunc(), -1980);
        assert_eq!(Decimal::new(5, -3).trunc(), 0);
        assert_eq!(Decimal::new(5, 2).trunc(), 500);
        assert_eq!(Decimal::new(1, 30).trunc(), i64::MAX);
        assert_eq!(Decimal::new(1, -30).trunc(), 0);
    }

    #[test]
    fn decimal_to_f64() {
        assert_eq!(Decimal::new(5068, -2).to_f64(), 50.68);
        assert_eq!(Decimal::new(5, 2).to_f64(), 500.0);
    }

    #[test]
    fn quantity_display() {
        let power = Quantity::new(Decimal::new(19807, -1), Some("W"));
        assert_eq!(power.to_string(), "1980.7 W");
        assert_eq!(Quantity::new(Decimal::from_int(3), None).to_string(), "3");
    }

    static TABLE: EnumTable = EnumTable {
        name: "test",
        codes: &[(1, "ONE"), (2, "TWO")],
    };

    #[test]
    fn status_codes() {
        assert_eq!(TABLE.code(2).to_string(), "TWO");
        assert!(TABLE.code(1).is_known());
        let vendor = TABLE.code(13);
        assert!(!vendor.is_known());
        assert_eq!(vendor.to_string(), "13");
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::I16(-3).as_integer(), Some(-3));
        assert_eq!(Value::U32(u32::MAX).as_integer(), Some(u32::MAX as i64));
        assert_eq!(Value::Text("x".into()).as_decimal(), None);
        assert!(!Value::Status(TABLE.code(1)).is_numeric());
        let quantity = Value::Quantity(Quantity::new(Decimal::new(15, -1), Some("Hz")));
        assert_eq!(quantity.as_decimal(), Some(Decimal::new(15, -1)));
        assert_eq!(quantity.unit(), Some("Hz"));
        assert_eq!(Value::Bytes(vec![0x41, 0x00]).to_string(), "4100");
    }
}
