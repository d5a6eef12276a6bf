use core::fmt;

use bytecode::Kind;

use crate::{Address, Reference};

/// A tagged datum of one [`Kind`].
///
/// `F16` keeps the raw IEEE-754 binary16 bits; use [`Value::as_f64`] or the
/// [`f16_bits_to_f32`] helper to read it as a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Usize(u64),
    Size(i64),
    F16(u16),
    F32(f32),
    F64(f64),
    Bool(bool),
    Ref(Reference),
}

impl Value {
    pub const fn kind(&self) -> Kind {
        match self {
            Value::U8(_) => Kind::U8,
            Value::U16(_) => Kind::U16,
            Value::U32(_) => Kind::U32,
            Value::U64(_) => Kind::U64,
            Value::I8(_) => Kind::I8,
            Value::I16(_) => Kind::I16,
            Value::I32(_) => Kind::I32,
            Value::I64(_) => Kind::I64,
            Value::Usize(_) => Kind::Usize,
            Value::Size(_) => Kind::Size,
            Value::F16(_) => Kind::F16,
            Value::F32(_) => Kind::F32,
            Value::F64(_) => Kind::F64,
            Value::Bool(_) => Kind::Bool,
            Value::Ref(_) => Kind::Ref,
        }
    }

    /// The zero value of `kind`. References have none.
    pub const fn zero(kind: Kind) -> Option<Value> {
        let value = match kind {
            Kind::U8 => Value::U8(0),
            Kind::U16 => Value::U16(0),
            Kind::U32 => Value::U32(0),
            Kind::U64 => Value::U64(0),
            Kind::I8 => Value::I8(0),
            Kind::I16 => Value::I16(0),
            Kind::I32 => Value::I32(0),
            Kind::I64 => Value::I64(0),
            Kind::Usize => Value::Usize(0),
            Kind::Size => Value::Size(0),
            Kind::F16 => Value::F16(0),
            Kind::F32 => Value::F32(0.0),
            Kind::F64 => Value::F64(0.0),
            Kind::Bool => Value::Bool(false),
            Kind::Ref => return None,
        };
        Some(value)
    }

    #[inline]
    pub const fn reference(address: Address, element: Kind) -> Value {
        Value::Ref(Reference::new(address, element))
    }

    #[inline]
    pub fn f16(value: f32) -> Value {
        Value::F16(f32_to_f16_bits(value))
    }

    /// Integer payload widened to `i128`, for integer kinds only.
    pub const fn as_integer(&self) -> Option<i128> {
        let n = match *self {
            Value::U8(v) => v as i128,
            Value::U16(v) => v as i128,
            Value::U32(v) => v as i128,
            Value::U64(v) | Value::Usize(v) => v as i128,
            Value::I8(v) => v as i128,
            Value::I16(v) => v as i128,
            Value::I32(v) => v as i128,
            Value::I64(v) | Value::Size(v) => v as i128,
            _ => return None,
        };
        Some(n)
    }

    /// Float payload widened to `f64`, for float kinds only.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F16(bits) => Some(f16_bits_to_f32(bits) as f64),
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_reference(&self) -> Option<Reference> {
        match *self {
            Value::Ref(reference) => Some(reference),
            _ => None,
        }
    }

    /// Build an integer value of `kind` if `n` lies in its range.
    pub fn from_integer(kind: Kind, n: i128) -> Option<Value> {
        let (min, max) = kind.integer_range()?;
        if n < min || n > max {
            return None;
        }
        Self::wrap_integer(kind, n)
    }

    /// Build an integer value of `kind` from the low bits of `n`
    /// (two's complement truncation). `None` for non-integer kinds.
    pub fn wrap_integer(kind: Kind, n: i128) -> Option<Value> {
        let value = match kind {
            Kind::U8 => Value::U8(n as u8),
            Kind::U16 => Value::U16(n as u16),
            Kind::U32 => Value::U32(n as u32),
            Kind::U64 => Value::U64(n as u64),
            Kind::I8 => Value::I8(n as i8),
            Kind::I16 => Value::I16(n as i16),
            Kind::I32 => Value::I32(n as i32),
            Kind::I64 => Value::I64(n as i64),
            Kind::Usize => Value::Usize(n as u64),
            Kind::Size => Value::Size(n as i64),
            _ => return None,
        };
        Some(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            Value::F16(bits) => write!(f, "{kind} {}", f16_bits_to_f32(*bits)),
            Value::F32(v) => write!(f, "{kind} {v}"),
            Value::F64(v) => write!(f, "{kind} {v}"),
            Value::Bool(b) => write!(f, "{kind} {b}"),
            Value::Ref(reference) => write!(f, "{reference}"),
            _ => match self.as_integer() {
                Some(n) => write!(f, "{kind} {n}"),
                None => write!(f, "{kind} ?"),
            },
        }
    }
}

// ── binary16 ─────────────────────────────────────────────────────

/// Maximum finite binary16 value.
pub const F16_MAX: f32 = 65504.0;

/// Round an `f32` to the nearest binary16 (ties to even). Values beyond the
/// binary16 range become infinities.
#[inline]
pub fn f32_to_f16_bits(value: f32) -> u16 {
    f64_to_f16_bits(value as f64)
}

/// Round an `f64` to the nearest binary16 in a single step (ties to even).
pub fn f64_to_f16_bits(value: f64) -> u16 {
    let x = value.to_bits();
    let sign = ((x >> 48) & 0x8000) as u16;
    let exp = ((x >> 52) & 0x7ff) as i32;
    let man = x & 0x000f_ffff_ffff_ffff;

    if exp == 0x7ff {
        // Keep NaNs quiet and non-zero.
        let nan = if man != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan | (man >> 42) as u16;
    }

    let half_exp = exp - 1023 + 15;
    if half_exp >= 0x1f {
        return sign | 0x7c00;
    }

    if half_exp <= 0 {
        let shift = (43 - half_exp) as u32;
        if shift > 53 {
            return sign;
        }
        let man = man | 0x0010_0000_0000_0000;
        let mut half_man = man >> shift;
        let round_bit = 1u64 << (shift - 1);
        if man & round_bit != 0 && man & (3 * round_bit - 1) != 0 {
            half_man += 1;
        }
        return sign | half_man as u16;
    }

    let half = ((half_exp as u64) << 10) | (man >> 42);
    let round_bit = 1u64 << 41;
    // A carry out of the mantissa correctly bumps the exponent.
    if man & round_bit != 0 && man & (3 * round_bit - 1) != 0 {
        sign | (half + 1) as u16
    } else {
        sign | half as u16
    }
}

pub fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = ((bits & 0x8000) as u32) << 16;
    let exp = ((bits >> 10) & 0x1f) as u32;
    let man = (bits & 0x03ff) as u32;

    match exp {
        0 if man == 0 => f32::from_bits(sign),
        0 => {
            let magnitude = man as f32 / 16_777_216.0;
            if sign != 0 { -magnitude } else { magnitude }
        }
        0x1f => f32::from_bits(sign | 0x7f80_0000 | (man << 13)),
        _ => f32::from_bits(sign | ((exp + 127 - 15) << 23) | (man << 13)),
    }
}
