//! Dynamic row values.
//!
//! Rows travel through pgplus as [`Record`]s: insertion-ordered mappings from
//! column name to [`Value`]. The value set is closed; only [`Value::Map`] and
//! [`Value::Array`] are containers; every other variant is opaque.

use crate::codec;
use crate::error::{PgError, PgResult};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, to_sql_checked};
use uuid::Uuid;

/// A single column (or nested) value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Bytes),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Uuid(Uuid),
    Array(Vec<Value>),
    Map(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            Value::Int(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Record> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Convert to a JSON value.
    ///
    /// Decimals are rendered as strings to keep their precision; timestamps use
    /// RFC 3339; bytes use the Postgres `\x` hex text form.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::Decimal(d) => Json::String(d.to_string()),
            Value::Text(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(hex_bytes(b)),
            Value::Timestamp(ts) => Json::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Date(d) => Json::String(d.to_string()),
            Value::Uuid(u) => Json::String(u.to_string()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(record) => record.to_json(),
        }
    }

    /// Build a value from JSON. Objects become [`Value::Map`], so JSON columns
    /// are plain mappings as far as casing is concerned.
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&hex_bytes(b)),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Date(d) => write!(f, "{d}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Array(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(record) => record.serialize(serializer),
            other => other.to_json().serialize(serializer),
        }
    }
}

// ==================== Conversions ====================

macro_rules! impl_from_scalar {
    ($($ty:ty => |$v:ident| $conv:expr;)*) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $conv
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => |v| Value::Bool(v);
    i16 => |v| Value::Int(i64::from(v));
    i32 => |v| Value::Int(i64::from(v));
    i64 => |v| Value::Int(v);
    u32 => |v| Value::Int(i64::from(v));
    f32 => |v| Value::Float(f64::from(v));
    f64 => |v| Value::Float(v);
    Decimal => |v| Value::Decimal(v);
    String => |v| Value::Text(v);
    &str => |v| Value::Text(v.to_string());
    &String => |v| Value::Text(v.clone());
    Bytes => |v| Value::Bytes(v);
    &[u8] => |v| Value::Bytes(Bytes::copy_from_slice(v));
    DateTime<Utc> => |v| Value::Timestamp(v);
    NaiveDateTime => |v| Value::Timestamp(v.and_utc());
    NaiveDate => |v| Value::Date(v);
    Uuid => |v| Value::Uuid(v);
    Record => |v| Value::Map(v);
    serde_json::Value => |v| Value::from_json(v);
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

// ==================== Parameter encoding ====================

type BoxError = Box<dyn Error + Sync + Send>;

fn is_json(ty: &Type) -> bool {
    matches!(*ty, Type::JSON | Type::JSONB)
}

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

fn mismatch(what: &str, ty: &Type) -> BoxError {
    format!("cannot encode {what} as {ty}").into()
}

/// Encode with `T`'s own codec, refusing server types it does not accept.
fn encode_as<T: ToSql>(value: T, what: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if !T::accepts(ty) {
        return Err(mismatch(what, ty));
    }
    value.to_sql(ty, out)
}

/// A float that is a whole number inside `i64`.
fn integral(x: f64, ty: &Type) -> Result<i64, BoxError> {
    const BOUND: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if x.is_finite() && x.fract() == 0.0 && (-BOUND..BOUND).contains(&x) {
        Ok(x as i64)
    } else {
        Err(format!("float {x} is not an integer that fits in {ty}").into())
    }
}

/// Parameters are encoded by the server type the statement was prepared
/// with. Lossless or checked conversions are applied across variants (an
/// integral float into `int8`, text into `uuid`); every other pairing is an
/// error rather than a reinterpretation of the bytes.
impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if is_json(ty) && !matches!(self, Value::Null | Value::Text(_)) {
            return self.to_json().to_sql(ty, out);
        }

        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) if is_text(ty) => b.to_string().to_sql(ty, out),
            Value::Bool(b) => encode_as(*b, "a bool", ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::INT8 => i.to_sql(ty, out),
                Type::OID => u32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                _ if is_text(ty) => i.to_string().to_sql(ty, out),
                _ => Err(mismatch("an integer", ty)),
            },
            Value::Float(x) => match *ty {
                Type::FLOAT4 => (*x as f32).to_sql(ty, out),
                Type::FLOAT8 => x.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => Value::Int(integral(*x, ty)?).to_sql(ty, out),
                Type::NUMERIC if x.is_finite() => Decimal::try_from(*x)?.to_sql(ty, out),
                Type::NUMERIC => codec::write_numeric(&x.to_string(), out).map(|()| IsNull::No),
                _ if is_text(ty) => x.to_string().to_sql(ty, out),
                _ => Err(mismatch("a float", ty)),
            },
            Value::Decimal(d) => match *ty {
                Type::FLOAT4 | Type::FLOAT8 => Value::Float(
                    d.to_f64()
                        .ok_or_else(|| format!("decimal {d} does not fit in {ty}"))?,
                )
                .to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => {
                    if !d.fract().is_zero() {
                        return Err(format!("decimal {d} is not an integer").into());
                    }
                    let i = d
                        .to_i64()
                        .ok_or_else(|| format!("decimal {d} does not fit in {ty}"))?;
                    Value::Int(i).to_sql(ty, out)
                }
                _ if is_text(ty) => d.to_string().to_sql(ty, out),
                _ => encode_as(*d, "a decimal", ty, out),
            },
            Value::Text(s) => match *ty {
                Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
                Type::NUMERIC => codec::write_numeric(s, out).map(|()| IsNull::No),
                Type::INT2 | Type::INT4 | Type::INT8 => Value::Int(s.trim().parse()?).to_sql(ty, out),
                Type::FLOAT4 | Type::FLOAT8 => Value::Float(s.trim().parse()?).to_sql(ty, out),
                Type::BOOL => s.parse::<bool>()?.to_sql(ty, out),
                Type::TIMESTAMPTZ | Type::TIMESTAMP => {
                    let ts = DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc);
                    Value::Timestamp(ts).to_sql(ty, out)
                }
                Type::DATE => s.parse::<NaiveDate>()?.to_sql(ty, out),
                Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)
                    .unwrap_or_else(|_| serde_json::Value::String(s.clone()))
                    .to_sql(ty, out),
                _ if matches!(ty.kind(), Kind::Enum(_)) => {
                    out.extend_from_slice(s.as_bytes());
                    Ok(IsNull::No)
                }
                _ => encode_as(s.as_str(), "text", ty, out),
            },
            Value::Bytes(b) => encode_as(&b[..], "bytes", ty, out),
            Value::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.naive_utc().to_sql(ty, out),
                Type::DATE => ts.date_naive().to_sql(ty, out),
                _ if is_text(ty) => ts.to_rfc3339().to_sql(ty, out),
                _ => encode_as(*ts, "a timestamp", ty, out),
            },
            Value::Date(d) => match *ty {
                Type::TIMESTAMP => d.and_time(chrono::NaiveTime::MIN).to_sql(ty, out),
                Type::TIMESTAMPTZ => d.and_time(chrono::NaiveTime::MIN).and_utc().to_sql(ty, out),
                _ if is_text(ty) => d.to_string().to_sql(ty, out),
                _ => encode_as(*d, "a date", ty, out),
            },
            Value::Uuid(u) if is_text(ty) => u.to_string().to_sql(ty, out),
            Value::Uuid(u) => encode_as(*u, "a uuid", ty, out),
            Value::Array(items) => match ty.kind() {
                Kind::Array(_) => items.to_sql(ty, out),
                _ => Err(mismatch("an array", ty)),
            },
            Value::Map(record) if is_text(ty) => record.to_json().to_string().to_sql(ty, out),
            Value::Map(_) => Err(mismatch("a mapping", ty)),
        }
    }

    /// Every type is accepted here; mismatches are reported per value by
    /// [`ToSql::to_sql`], where the variant is known.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

// ==================== Record ====================

/// An insertion-ordered mapping from column name to [`Value`].
///
/// Rows returned by the database and rows handed to the bulk insert builder
/// are both `Record`s. Rows in one batch may have different key sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(IndexMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(IndexMap::with_capacity(capacity))
    }

    /// Insert a column value, returning the previous value for that key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    /// Remove a key, preserving the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Build a record from a JSON object. Non-object JSON yields `None`.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match Value::from_json(json) {
            Value::Map(record) => Some(record),
            _ => None,
        }
    }

    /// Decode this record into a typed value via serde.
    pub fn decode<T: DeserializeOwned>(&self) -> PgResult<T> {
        serde_json::from_value(self.to_json()).map_err(|e| PgError::Serialization(e.to_string()))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build a [`Record`] from `key => value` pairs.
///
/// ```ignore
/// let row = pgplus::record! { "name" => "Dan", "age" => 25 };
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut __pgplus_record = $crate::Record::new();
        $( __pgplus_record.insert($key, $value); )+
        __pgplus_record
    }};
}
