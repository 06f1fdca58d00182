//! Typed extraction of handler arguments from decoded [`Value`]s.
//!
//! Coercions are deliberately narrow: integers widen to floats, and floats
//! with no fractional part narrow to integers. Everything else must match.

use crate::codec::Value;

/// Convert one argument value into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {}, got {}", expected, value.type_name())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Float(f)
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Ok(*f as i64)
            }
            other => Err(mismatch("int", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| format!("{} does not fit in i32", wide))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let wide = i64::from_value(value)?;
        u32::try_from(wide).map_err(|_| format!("{} does not fit in u32", wide))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_f64().ok_or_else(|| mismatch("float", value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("string", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        let items = value.as_list().ok_or_else(|| mismatch("list", value))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| T::from_value(item).map_err(|e| format!("element {}: {}", i, e)))
            .collect()
    }
}

/// Convert a whole argument list into a handler's parameter type.
///
/// Implemented for `()`, tuples of up to four [`FromValue`] types, and
/// `Vec<Value>` (accepts any arity).
pub trait FromArgs: Sized {
    fn from_args(args: &[Value]) -> Result<Self, String>;
}

impl FromArgs for () {
    fn from_args(args: &[Value]) -> Result<Self, String> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(format!("expected no arguments, got {}", args.len()))
        }
    }
}

impl FromArgs for Vec<Value> {
    fn from_args(args: &[Value]) -> Result<Self, String> {
        Ok(args.to_vec())
    }
}

macro_rules! tuple_from_args {
    ($len:expr; $($ty:ident : $idx:tt),+) => {
        impl<$($ty: FromValue),+> FromArgs for ($($ty,)+) {
            fn from_args(args: &[Value]) -> Result<Self, String> {
                if args.len() != $len {
                    return Err(format!("expected {} arguments, got {}", $len, args.len()));
                }
                Ok(($(
                    $ty::from_value(&args[$idx])
                        .map_err(|e| format!("argument {}: {}", $idx, e))?,
                )+))
            }
        }
    };
}

tuple_from_args!(1; A: 0);
tuple_from_args!(2; A: 0, B: 1);
tuple_from_args!(3; A: 0, B: 1, C: 2);
tuple_from_args!(4; A: 0, B: 1, C: 2, D: 3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn test_tuple_extraction() {
        let (a, b) = <(i64, String)>::from_args(&args![2, "two"]).unwrap();
        assert_eq!(a, 2);
        assert_eq!(b, "two");
    }

    #[test]
    fn test_arity_mismatch() {
        let err = <(i64, i64)>::from_args(&args![1]).unwrap_err();
        assert_eq!(err, "expected 2 arguments, got 1");
        assert!(<()>::from_args(&args![1]).is_err());
    }

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(i64::from_value(&Value::Float(4.0)), Ok(4));
        assert!(i64::from_value(&Value::Float(4.5)).is_err());
        assert_eq!(f64::from_value(&Value::Int(3)), Ok(3.0));
        assert!(i32::from_value(&Value::Int(i64::MAX)).is_err());
        assert!(u32::from_value(&Value::Int(-1)).is_err());
    }

    #[test]
    fn test_option_and_list() {
        assert_eq!(Option::<i64>::from_value(&Value::Null), Ok(None));
        assert_eq!(Option::<i64>::from_value(&Value::Int(1)), Ok(Some(1)));
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(Vec::<i32>::from_value(&list), Ok(vec![1, 2]));
        let bad = Value::List(vec![Value::Int(1), Value::Str("x".into())]);
        assert_eq!(
            Vec::<i32>::from_value(&bad).unwrap_err(),
            "element 1: expected int, got string"
        );
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = <(bool,)>::from_args(&args!["yes"]).unwrap_err();
        assert_eq!(err, "argument 0: expected bool, got string");
    }
}
