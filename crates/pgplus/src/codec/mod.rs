//! Column decoding: Postgres wire values into [`Value`]s.
//!
//! A [`ValueCodecs`] table maps type OIDs to decoder functions. Each driver
//! owns its own table, so two connections in one process can decode
//! `numeric` differently.

mod numeric;

pub use numeric::NumericText;
pub(crate) use numeric::write_numeric;

use crate::error::{PgError, PgResult};
use crate::value::{Record, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::error::Error;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// Decode column `idx` of `row`.
pub type DecodeFn = fn(&Row, usize) -> Result<Value, BoxError>;

/// How `numeric` columns decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericMode {
    /// [`Value::Decimal`]. Fails on `NaN`, the infinities and values
    /// beyond 28 significant digits.
    #[default]
    Decimal,
    /// The exact server text, as [`Value::Text`]. Never loses digits.
    Text,
    /// Nearest [`Value::Float`], parsed from the exact text. `NaN` and the
    /// infinities map to their float counterparts.
    Float,
}

/// Per-driver decode table keyed by type OID.
#[derive(Clone)]
pub struct ValueCodecs {
    decoders: HashMap<u32, DecodeFn>,
    numeric: NumericMode,
}

impl std::fmt::Debug for ValueCodecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCodecs")
            .field("types", &self.decoders.len())
            .field("numeric", &self.numeric)
            .finish()
    }
}

impl Default for ValueCodecs {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueCodecs {
    /// The built-in table: scalars, text-like types, temporal types, uuid,
    /// json/jsonb and one-dimensional arrays of the common scalars.
    pub fn new() -> Self {
        let mut codecs = Self {
            decoders: HashMap::new(),
            numeric: NumericMode::Decimal,
        };

        codecs.register(&Type::BOOL, |row, i| scalar::<bool>(row, i));
        codecs.register(&Type::INT2, |row, i| scalar::<i16>(row, i));
        codecs.register(&Type::INT4, |row, i| scalar::<i32>(row, i));
        codecs.register(&Type::INT8, |row, i| scalar::<i64>(row, i));
        codecs.register(&Type::OID, |row, i| scalar::<u32>(row, i));
        codecs.register(&Type::FLOAT4, |row, i| scalar::<f32>(row, i));
        codecs.register(&Type::FLOAT8, |row, i| scalar::<f64>(row, i));
        for ty in [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN] {
            codecs.register(&ty, |row, i| scalar::<String>(row, i));
        }
        codecs.register(&Type::BYTEA, |row, i| scalar::<&[u8]>(row, i));
        codecs.register(&Type::DATE, |row, i| scalar::<NaiveDate>(row, i));
        codecs.register(&Type::TIMESTAMP, |row, i| scalar::<NaiveDateTime>(row, i));
        codecs.register(&Type::TIMESTAMPTZ, |row, i| scalar::<DateTime<Utc>>(row, i));
        codecs.register(&Type::UUID, |row, i| scalar::<Uuid>(row, i));
        codecs.register(&Type::JSON, decode_json);
        codecs.register(&Type::JSONB, decode_json);

        codecs.register(&Type::BOOL_ARRAY, |row, i| array::<bool>(row, i));
        codecs.register(&Type::INT2_ARRAY, |row, i| array::<i16>(row, i));
        codecs.register(&Type::INT4_ARRAY, |row, i| array::<i32>(row, i));
        codecs.register(&Type::INT8_ARRAY, |row, i| array::<i64>(row, i));
        codecs.register(&Type::FLOAT4_ARRAY, |row, i| array::<f32>(row, i));
        codecs.register(&Type::FLOAT8_ARRAY, |row, i| array::<f64>(row, i));
        codecs.register(&Type::TEXT_ARRAY, |row, i| array::<String>(row, i));
        codecs.register(&Type::VARCHAR_ARRAY, |row, i| array::<String>(row, i));
        codecs.register(&Type::UUID_ARRAY, |row, i| array::<Uuid>(row, i));
        codecs.register(&Type::DATE_ARRAY, |row, i| array::<NaiveDate>(row, i));
        codecs.register(&Type::TIMESTAMPTZ_ARRAY, |row, i| {
            array::<DateTime<Utc>>(row, i)
        });
        codecs.register(&Type::JSONB_ARRAY, |row, i| {
            let items: Option<Vec<Option<serde_json::Value>>> = row.try_get(i)?;
            Ok(items.map_or(Value::Null, |items| {
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| item.map_or(Value::Null, Value::from_json))
                        .collect(),
                )
            }))
        });

        codecs.set_numeric(NumericMode::Decimal);
        codecs
    }

    /// Register (or replace) the decoder for `ty`.
    pub fn register(&mut self, ty: &Type, decode: DecodeFn) -> &mut Self {
        self.decoders.insert(ty.oid(), decode);
        self
    }

    /// Builder-style [`ValueCodecs::register`].
    pub fn with(mut self, ty: &Type, decode: DecodeFn) -> Self {
        self.register(ty, decode);
        self
    }

    /// Choose how `numeric` and `numeric[]` decode.
    pub fn set_numeric(&mut self, mode: NumericMode) -> &mut Self {
        self.numeric = mode;
        let (scalar_fn, array_fn): (DecodeFn, DecodeFn) = match mode {
            NumericMode::Decimal => (
                |row, i| scalar::<Decimal>(row, i),
                |row, i| array::<Decimal>(row, i),
            ),
            NumericMode::Text => (
                |row, i| numeric_scalar(row, i, |n| Ok(Value::Text(n.into_inner()))),
                |row, i| numeric_array(row, i, |n| Ok(Value::Text(n.into_inner()))),
            ),
            NumericMode::Float => (
                |row, i| numeric_scalar(row, i, numeric_to_float),
                |row, i| numeric_array(row, i, numeric_to_float),
            ),
        };
        self.register(&Type::NUMERIC, scalar_fn);
        self.register(&Type::NUMERIC_ARRAY, array_fn);
        self
    }

    /// Builder-style [`ValueCodecs::set_numeric`].
    pub fn with_numeric(mut self, mode: NumericMode) -> Self {
        self.set_numeric(mode);
        self
    }

    pub fn numeric(&self) -> NumericMode {
        self.numeric
    }

    pub fn supports(&self, ty: &Type) -> bool {
        self.decoders.contains_key(&ty.oid()) || matches!(ty.kind(), Kind::Enum(_))
    }

    /// Decode one column.
    pub fn decode_column(&self, row: &Row, idx: usize) -> PgResult<Value> {
        let column = &row.columns()[idx];
        let ty = column.type_();

        let result = match self.decoders.get(&ty.oid()) {
            Some(decode) => decode(row, idx),
            None if matches!(ty.kind(), Kind::Enum(_)) => row
                .try_get::<_, Option<EnumLabel>>(idx)
                .map(|label| label.map_or(Value::Null, |l| Value::Text(l.0)))
                .map_err(Into::into),
            None => {
                return Err(PgError::decode(
                    column.name(),
                    format!("no decoder for type {} (oid {})", ty.name(), ty.oid()),
                ));
            }
        };

        result.map_err(|e| PgError::decode(column.name(), e.to_string()))
    }

    /// Decode a whole row, keeping column order.
    pub fn decode_row(&self, row: &Row) -> PgResult<Record> {
        let mut record = Record::with_capacity(row.len());
        for (idx, column) in row.columns().iter().enumerate() {
            record.insert(column.name(), self.decode_column(row, idx)?);
        }
        Ok(record)
    }
}

fn scalar<'a, T>(row: &'a Row, idx: usize) -> Result<Value, BoxError>
where
    T: FromSql<'a> + Into<Value>,
{
    let value: Option<T> = row.try_get(idx)?;
    Ok(value.into())
}

fn array<'a, T>(row: &'a Row, idx: usize) -> Result<Value, BoxError>
where
    T: FromSql<'a> + Into<Value>,
{
    let items: Option<Vec<Option<T>>> = row.try_get(idx)?;
    Ok(items.map_or(Value::Null, |items| {
        Value::Array(items.into_iter().map(Value::from).collect())
    }))
}

fn decode_json(row: &Row, idx: usize) -> Result<Value, BoxError> {
    let json: Option<serde_json::Value> = row.try_get(idx)?;
    Ok(json.map_or(Value::Null, Value::from_json))
}

fn numeric_scalar(
    row: &Row,
    idx: usize,
    convert: fn(NumericText) -> Result<Value, BoxError>,
) -> Result<Value, BoxError> {
    let value: Option<NumericText> = row.try_get(idx)?;
    value.map_or(Ok(Value::Null), convert)
}

fn numeric_array(
    row: &Row,
    idx: usize,
    convert: fn(NumericText) -> Result<Value, BoxError>,
) -> Result<Value, BoxError> {
    let items: Option<Vec<Option<NumericText>>> = row.try_get(idx)?;
    let Some(items) = items else {
        return Ok(Value::Null);
    };
    items
        .into_iter()
        .map(|item| item.map_or(Ok(Value::Null), convert))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn numeric_to_float(n: NumericText) -> Result<Value, BoxError> {
    n.as_str()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|e| format!("numeric {n} is not a float: {e}").into())
}

/// Text label of a Postgres enum value.
struct EnumLabel(String);

impl<'a> FromSql<'a> for EnumLabel {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(EnumLabel(std::str::from_utf8(raw)?.to_owned()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio_postgres::types::ToSql;

    #[test]
    fn default_table_covers_common_types() {
        let codecs = ValueCodecs::new();
        for ty in [
            Type::BOOL,
            Type::INT4,
            Type::INT8,
            Type::NUMERIC,
            Type::TEXT,
            Type::TIMESTAMPTZ,
            Type::UUID,
            Type::JSONB,
            Type::INT4_ARRAY,
            Type::NUMERIC_ARRAY,
        ] {
            assert!(codecs.supports(&ty), "{ty} should be supported");
        }
        assert!(!codecs.supports(&Type::POINT));
        assert_eq!(codecs.numeric(), NumericMode::Decimal);
    }

    #[test]
    fn tables_are_independent() {
        let text = ValueCodecs::new().with_numeric(NumericMode::Text);
        let decimal = ValueCodecs::new();
        assert_eq!(text.numeric(), NumericMode::Text);
        assert_eq!(decimal.numeric(), NumericMode::Decimal);
    }

    #[test]
    fn custom_decoders_can_be_registered() {
        let codecs = ValueCodecs::new().with(&Type::POINT, |_, _| Ok(Value::Null));
        assert!(codecs.supports(&Type::POINT));
    }

    #[test]
    fn float_mode_conversion() {
        let float = |s: &str| numeric_to_float(NumericText(s.into())).unwrap();
        assert_eq!(float("12.50"), Value::Float(12.5));
        assert_eq!(float("1e40"), Value::Float(1e40));
        assert_eq!(float("-Infinity"), Value::Float(f64::NEG_INFINITY));
        assert!(matches!(float("NaN"), Value::Float(x) if x.is_nan()));
    }

    #[test]
    fn text_mode_keeps_values_decimal_cannot_hold() {
        let mut buf = BytesMut::new();
        for text in [
            "NaN",
            "100000000000000000000000000000000000000000",
            "0.1234567890123456789012345678901234",
        ] {
            buf.clear();
            NumericText(text.into()).to_sql(&Type::NUMERIC, &mut buf).unwrap();
            let decoded = NumericText::from_sql(&Type::NUMERIC, &buf).unwrap();
            assert_eq!(decoded.as_str(), text);
            // The fixed-precision decimal rejects or rounds the same bytes.
            let as_decimal = Decimal::from_sql(&Type::NUMERIC, &buf);
            assert!(as_decimal.map_or(true, |d| d.to_string() != text));
        }
    }
}
