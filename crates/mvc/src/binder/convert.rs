//! Value conversion rules used by the binder.

use crate::handler::{ScalarKind, ScalarType};
use crate::value::Value;
use thiserror::Error;

/// A value could not be converted to a nullable target type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert '{value}' to {target}")]
pub struct ConversionError {
    pub value: String,
    pub target: ScalarType,
}

impl ConversionError {
    fn new(value: impl Into<String>, target: ScalarType) -> Self {
        Self { value: value.into(), target }
    }
}

/// Converts a bound value to the target type.
///
/// - `Null` and empty lists become the target's zero value (`Null` if nullable)
/// - lists collapse to their first element
/// - values already of the target kind pass through
/// - everything else is parsed from its text form
///
/// A failed parse yields the zero value for primitive targets and a
/// [`ConversionError`] for nullable ones. Files never convert to scalars.
pub fn convert(value: &Value, target: ScalarType) -> Result<Value, ConversionError> {
    match (value, target.kind()) {
        (Value::Null, _) => Ok(target.zero_value()),
        (other, ScalarKind::Any) => Ok(other.clone()),
        (Value::List(list), _) => match list.first() {
            Some(first) => convert_text(first, target),
            None => Ok(target.zero_value()),
        },
        (Value::File(_) | Value::Files(_), _) => fallback(value.to_string(), target),
        (Value::Int(_), ScalarKind::Int)
        | (Value::Long(_), ScalarKind::Long)
        | (Value::Float(_), ScalarKind::Float)
        | (Value::Double(_), ScalarKind::Double)
        | (Value::Bool(_), ScalarKind::Bool)
        | (Value::Char(_), ScalarKind::Char)
        | (Value::Str(_), ScalarKind::Str) => Ok(value.clone()),
        (other, _) => match other.text() {
            Some(text) => convert_text(&text, target),
            None => fallback(other.to_string(), target),
        },
    }
}

fn convert_text(text: &str, target: ScalarType) -> Result<Value, ConversionError> {
    let parsed = match target.kind() {
        ScalarKind::Int => text.parse::<i32>().ok().map(Value::Int),
        ScalarKind::Long => text.parse::<i64>().ok().map(Value::Long),
        ScalarKind::Float => text.parse::<f32>().ok().map(Value::Float),
        ScalarKind::Double => text.parse::<f64>().ok().map(Value::Double),
        ScalarKind::Bool => Some(Value::Bool(text.eq_ignore_ascii_case("true"))),
        ScalarKind::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Value::Char(c)),
                _ => None,
            }
        }
        ScalarKind::Str | ScalarKind::Any => Some(Value::Str(text.to_owned())),
    };

    match parsed {
        Some(value) => Ok(value),
        None => fallback(text, target),
    }
}

fn fallback(value: impl Into<String>, target: ScalarType) -> Result<Value, ConversionError> {
    if target.is_primitive() {
        Ok(target.zero_value())
    } else {
        Err(ConversionError::new(value, target))
    }
}

/// Guesses the type of a submitted text value: `i32`, then `f64`, then a
/// `true`/`false` literal, otherwise the text itself.
pub fn smart_convert(text: &str) -> Value {
    if let Ok(int) = text.parse::<i32>() {
        return Value::Int(int);
    }
    if let Ok(double) = text.parse::<f64>()
        && double.is_finite()
    {
        return Value::Double(double);
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::Str(text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::UploadedFile;

    #[test]
    fn parses_text_to_target() {
        assert_eq!(convert(&Value::from("42"), ScalarType::INT), Ok(Value::Int(42)));
        assert_eq!(convert(&Value::from("42"), ScalarType::LONG), Ok(Value::Long(42)));
        assert_eq!(convert(&Value::from("2.5"), ScalarType::DOUBLE), Ok(Value::Double(2.5)));
        assert_eq!(convert(&Value::from("TRUE"), ScalarType::BOOL), Ok(Value::Bool(true)));
        assert_eq!(convert(&Value::from("x"), ScalarType::CHAR), Ok(Value::Char('x')));
        assert_eq!(convert(&Value::Int(7), ScalarType::STRING), Ok(Value::from("7")));
    }

    #[test]
    fn primitive_parse_failure_is_zero() {
        assert_eq!(convert(&Value::from("abc"), ScalarType::INT), Ok(Value::Int(0)));
        assert_eq!(convert(&Value::from("abc"), ScalarType::DOUBLE), Ok(Value::Double(0.0)));
        assert_eq!(convert(&Value::from("xy"), ScalarType::CHAR), Ok(Value::Char('\0')));
        assert_eq!(convert(&Value::from("yes"), ScalarType::BOOL), Ok(Value::Bool(false)));
    }

    #[test]
    fn nullable_parse_failure_is_an_error() {
        let err = convert(&Value::from("abc"), ScalarType::INT.optional()).unwrap_err();
        assert_eq!(err.value, "abc");
        assert_eq!(err.target, ScalarType::INT.optional());
        assert!(convert(&Value::from(""), ScalarType::LONG.optional()).is_err());
    }

    #[test]
    fn null_becomes_zero_or_null() {
        assert_eq!(convert(&Value::Null, ScalarType::INT), Ok(Value::Int(0)));
        assert_eq!(convert(&Value::Null, ScalarType::INT.optional()), Ok(Value::Null));
        assert_eq!(convert(&Value::Null, ScalarType::STRING), Ok(Value::Null));
    }

    #[test]
    fn lists_collapse_to_first_element() {
        let list = Value::List(vec!["5".into(), "6".into()]);
        assert_eq!(convert(&list, ScalarType::INT), Ok(Value::Int(5)));
        assert_eq!(convert(&Value::List(vec![]), ScalarType::INT), Ok(Value::Int(0)));
        assert_eq!(convert(&list, ScalarType::ANY), Ok(list.clone()));
    }

    #[test]
    fn files_do_not_convert() {
        let file = Value::File(UploadedFile::from_bytes("f", "a.txt", None, &b"x"[..]));
        assert_eq!(convert(&file, ScalarType::INT), Ok(Value::Int(0)));
        assert!(convert(&file, ScalarType::STRING).is_err());
    }

    #[test]
    fn smart_convert_order() {
        assert_eq!(smart_convert("12"), Value::Int(12));
        assert_eq!(smart_convert("99999999999"), Value::Double(99_999_999_999.0));
        assert_eq!(smart_convert("1.5"), Value::Double(1.5));
        assert_eq!(smart_convert("False"), Value::Bool(false));
        assert_eq!(smart_convert("Ann"), Value::from("Ann"));
        assert_eq!(smart_convert(""), Value::from(""));
        assert_eq!(smart_convert("   "), Value::from("   "));
        assert_eq!(smart_convert("NaN"), Value::from("NaN"));
    }
}
