//! Key casing between the database and application code.
//!
//! The database side uses `snake_case` column names ("storage case"); rows handed
//! to callers use `camelCase` keys ("application case"). Conversion walks
//! [`Value::Array`] element-wise and [`Value::Map`] key-wise. Every other value is
//! opaque and passes through untouched.

use crate::value::{Record, Value};
use heck::{ToLowerCamelCase, ToSnakeCase};

/// How rows cross the database boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowCasing {
    /// Returned rows get `camelCase` keys; bulk-insert rows are converted to
    /// `snake_case` before building the statement.
    #[default]
    Camel,
    /// Keys are passed through unchanged in both directions.
    Preserve,
}

/// Convert a single key to storage case (`snake_case`).
pub fn storage_key(key: &str) -> String {
    key.to_snake_case()
}

/// Convert a single key to application case (`camelCase`).
pub fn application_key(key: &str) -> String {
    key.to_lower_camel_case()
}

/// Deep-convert mapping keys to storage case.
pub fn to_storage_case(value: Value) -> Value {
    rename_keys(value, &storage_key)
}

/// Deep-convert mapping keys to application case.
pub fn to_application_case(value: Value) -> Value {
    rename_keys(value, &application_key)
}

/// Deep-convert a record's keys to storage case.
pub fn record_to_storage_case(record: Record) -> Record {
    rename_record(record, &storage_key)
}

/// Deep-convert a record's keys to application case.
pub fn record_to_application_case(record: Record) -> Record {
    rename_record(record, &application_key)
}

fn rename_keys(value: Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| rename_keys(item, rename))
                .collect(),
        ),
        Value::Map(record) => Value::Map(rename_record(record, rename)),
        opaque => opaque,
    }
}

fn rename_record(record: Record, rename: &dyn Fn(&str) -> String) -> Record {
    let mut out = Record::with_capacity(record.len());
    for (key, value) in record {
        out.insert(rename(&key), rename_keys(value, rename));
    }
    out
}

impl RowCasing {
    /// Apply the inbound (database → caller) conversion to a row.
    pub fn inbound(self, record: Record) -> Record {
        match self {
            RowCasing::Camel => record_to_application_case(record),
            RowCasing::Preserve => record,
        }
    }

    /// Apply the outbound (caller → database) conversion to a row.
    pub fn outbound(self, record: Record) -> Record {
        match self {
            RowCasing::Camel => record_to_storage_case(record),
            RowCasing::Preserve => record,
        }
    }

    /// Apply the inbound conversion to a single column name.
    pub fn inbound_key(self, key: &str) -> String {
        match self {
            RowCasing::Camel => application_key(key),
            RowCasing::Preserve => key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    #[test]
    fn converts_single_keys() {
        assert_eq!(storage_key("createdAt"), "created_at");
        assert_eq!(storage_key("userId"), "user_id");
        assert_eq!(application_key("created_at"), "createdAt");
        assert_eq!(application_key("id"), "id");
    }

    #[test]
    fn conversion_is_idempotent() {
        assert_eq!(storage_key(&storage_key("firstName")), "first_name");
        assert_eq!(application_key(&application_key("first_name")), "firstName");
    }

    #[test]
    fn round_trip_restores_keys() {
        let row = record! { "firstName" => "Dan", "lastLoginAt" => 1, "id" => 2 };
        let back = record_to_application_case(record_to_storage_case(row.clone()));
        assert_eq!(back, row);
    }

    #[test]
    fn recurses_into_arrays_and_maps() {
        let nested = record! { "inner_key" => 1 };
        let row = record! {
            "outer_key" => nested.clone(),
            "list_of_maps" => Value::Array(vec![Value::Map(nested)]),
        };

        let converted = record_to_application_case(row);
        let outer = converted.get("outerKey").and_then(Value::as_map).unwrap();
        assert!(outer.contains_key("innerKey"));

        let list = converted.get("listOfMaps").and_then(Value::as_array).unwrap();
        assert!(list[0].as_map().unwrap().contains_key("innerKey"));
    }

    #[test]
    fn opaque_values_and_string_elements_are_untouched() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let row = record! {
            "created_at" => ts,
            "amount" => Decimal::new(1050, 2),
            "tags" => vec!["snake_case_tag", "camelTag"],
            "note_text" => "some_value",
        };

        let converted = record_to_application_case(row);
        assert_eq!(converted.get("createdAt"), Some(&Value::Timestamp(ts)));
        assert_eq!(
            converted.get("amount"),
            Some(&Value::Decimal(Decimal::new(1050, 2)))
        );
        assert_eq!(
            converted.get("tags"),
            Some(&Value::from(vec!["snake_case_tag", "camelTag"]))
        );
        assert_eq!(converted.get_str("noteText"), Some("some_value"));
    }

    #[test]
    fn preserve_mode_is_identity() {
        let row = record! { "created_at" => 1 };
        assert_eq!(RowCasing::Preserve.inbound(row.clone()), row);
        assert_eq!(RowCasing::Preserve.outbound(row.clone()), row);
    }
}
