//! Kind conversions for `cconv` and `uconv`.
//!
//! Both directions are pure: they either produce a value of the target kind
//! or report why not, and leave trapping to the dispatcher.

use bytecode::Kind;
use object::{Value, f64_to_f16_bits};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConvertError {
    #[error("{value} is not representable as {target}")]
    Overflow { value: Value, target: Kind },
    #[error("cannot convert {from} to {to}")]
    NotNumeric { from: Kind, to: Kind },
}

/// Numeric view of a non-reference value.
#[derive(Debug, Clone, Copy)]
enum Scalar {
    Int(i128),
    Float(f64),
    Bool(bool),
}

fn scalar(value: Value, target: Kind) -> Result<Scalar, ConvertError> {
    let not_numeric = ConvertError::NotNumeric {
        from: value.kind(),
        to: target,
    };
    if target == Kind::Ref {
        return Err(not_numeric);
    }
    match value {
        Value::Bool(b) => Ok(Scalar::Bool(b)),
        Value::Ref(_) => Err(not_numeric),
        _ => value
            .as_integer()
            .map(Scalar::Int)
            .or_else(|| value.as_f64().map(Scalar::Float))
            .ok_or(not_numeric),
    }
}

fn float_value(kind: Kind, x: f64) -> Option<Value> {
    match kind {
        Kind::F16 => Some(Value::F16(f64_to_f16_bits(x))),
        Kind::F32 => Some(Value::F32(x as f32)),
        Kind::F64 => Some(Value::F64(x)),
        _ => None,
    }
}

/// The integer `x` holds exactly, if any.
fn integral(x: f64) -> Option<i128> {
    (x.is_finite() && x.fract() == 0.0).then_some(x as i128)
}

/// Converts `value` to `target`, failing unless the result converts back to
/// exactly the same value. Widening never fails.
///
/// Integers must fall in the target's range and floats must hold a whole
/// number to become integers. A conversion into a float kind fails if it
/// rounds, overflows to infinity or loses low integer bits, while NaN and
/// infinities pass between float kinds unchanged. `bool` accepts only 0
/// and 1.
pub fn checked_convert(value: Value, target: Kind) -> Result<Value, ConvertError> {
    let overflow = ConvertError::Overflow { value, target };
    let scalar = scalar(value, target)?;
    if value.kind() == target {
        return Ok(value);
    }

    let converted = match scalar {
        Scalar::Int(n) => match target {
            Kind::Bool => match n {
                0 => Some(Value::Bool(false)),
                1 => Some(Value::Bool(true)),
                _ => None,
            },
            _ if target.is_float() => float_value(target, n as f64)
                .filter(|v| v.as_f64().and_then(integral) == Some(n)),
            _ => Value::from_integer(target, n),
        },
        Scalar::Float(x) => match target {
            Kind::Bool if x == 0.0 => Some(Value::Bool(false)),
            Kind::Bool if x == 1.0 => Some(Value::Bool(true)),
            Kind::Bool => None,
            _ if target.is_float() => {
                float_value(target, x).filter(|v| x.is_nan() || v.as_f64() == Some(x))
            }
            _ => integral(x).and_then(|n| Value::from_integer(target, n)),
        },
        Scalar::Bool(b) => {
            if target.is_float() {
                float_value(target, if b { 1.0 } else { 0.0 })
            } else {
                Value::from_integer(target, b as i128)
            }
        }
    };
    converted.ok_or(overflow)
}

/// Converts `value` to `target` without range checks: integers wrap
/// (two's complement), floats saturate into integer ranges with NaN going to
/// zero, and anything nonzero becomes `true`.
pub fn unchecked_convert(value: Value, target: Kind) -> Result<Value, ConvertError> {
    let scalar = scalar(value, target)?;

    let converted = match (scalar, target) {
        (Scalar::Int(n), Kind::Bool) => Some(Value::Bool(n != 0)),
        (Scalar::Float(x), Kind::Bool) => Some(Value::Bool(x != 0.0)),
        (Scalar::Bool(b), Kind::Bool) => Some(Value::Bool(b)),
        (Scalar::Int(n), _) if target.is_float() => float_value(target, n as f64),
        (Scalar::Float(x), _) if target.is_float() => float_value(target, x),
        (Scalar::Bool(b), _) if target.is_float() => float_value(target, if b { 1.0 } else { 0.0 }),
        (Scalar::Int(n), _) => Value::wrap_integer(target, n),
        (Scalar::Bool(b), _) => Value::wrap_integer(target, b as i128),
        (Scalar::Float(x), _) => target
            .integer_range()
            .and_then(|(min, max)| Value::from_integer(target, (x as i128).clamp(min, max))),
    };
    converted.ok_or(ConvertError::NotNumeric {
        from: value.kind(),
        to: target,
    })
}
