//! Scalar SQL functions over vector values.
//!
//! These three functions are how ordinary SQL manipulates vectors
//! outside the index: `vector(text)` parses the bracketed text form into
//! the canonical blob, `vector_extract(blob_or_text)` renders the
//! canonical text form, and `vector_distance_cos(a, b)` computes exact
//! cosine distance. The host registers them once at database start via
//! [`scalar_functions`]; no other global state exists.

use crate::error::{AnnexError, Result};
use crate::vector::Vector;

/// A SQL value as the host hands it to a scalar function.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// Parse a vector from either of its SQL-visible forms.
fn parse_vector(value: &SqlValue) -> Result<Vector> {
    match value {
        SqlValue::Text(s) => Vector::parse_text(s),
        SqlValue::Blob(b) => Vector::parse_blob(b),
        _ => Err(AnnexError::InvalidText(
            "not a text or blob type".to_string(),
        )),
    }
}

fn arg(args: &[SqlValue], index: usize) -> Result<&SqlValue> {
    args.get(index)
        .ok_or_else(|| AnnexError::InvalidParameter(format!("missing argument {}", index + 1)))
}

/// `vector(X)`: canonical blob form of a vector.
pub fn vector(args: &[SqlValue]) -> Result<SqlValue> {
    let v = parse_vector(arg(args, 0)?)?;
    Ok(SqlValue::Blob(v.to_blob()))
}

/// `vector_extract(X)`: canonical text form of a vector.
pub fn vector_extract(args: &[SqlValue]) -> Result<SqlValue> {
    let v = parse_vector(arg(args, 0)?)?;
    Ok(SqlValue::Text(v.to_text()))
}

/// `vector_distance_cos(X, Y)`: exact cosine distance as a double.
pub fn vector_distance_cos(args: &[SqlValue]) -> Result<SqlValue> {
    let a = parse_vector(arg(args, 0)?)?;
    let b = parse_vector(arg(args, 1)?)?;
    Ok(SqlValue::Real(a.cosine_distance(&b)?))
}

/// Signature of a registered scalar function.
pub type ScalarFn = fn(&[SqlValue]) -> Result<SqlValue>;

/// One registration table entry.
pub struct ScalarFunction {
    pub name: &'static str,
    pub num_args: u8,
    pub func: ScalarFn,
}

/// The functions the host registers at database start.
pub fn scalar_functions() -> &'static [ScalarFunction] {
    &[
        ScalarFunction {
            name: "vector",
            num_args: 1,
            func: vector,
        },
        ScalarFunction {
            name: "vector_extract",
            num_args: 1,
            func: vector_extract,
        },
        ScalarFunction {
            name: "vector_distance_cos",
            num_args: 2,
            func: vector_distance_cos,
        },
    ]
}
