//! Deterministic sample data for prototypes.
//!
//! Fixtures are rendered as a TypeScript module the prototype can import:
//!
//! ```text
//! export const fixtures = {
//!   "Task": [
//!     { "done": false, "id": 1, "title": "title 1" },
//!     ...
//!   ]
//! };
//! ```
//!
//! The same UI contract always yields the same text.

use pipeline::{Entity, FieldKind, UiContract};
use serde_json::{Map, Value};

/// Fixtures module used when the contract declares no entities.
pub const EMPTY_FIXTURES: &str = "export const fixtures = {};";

/// Rows generated per entity.
pub const ROWS_PER_ENTITY: usize = 3;

/// Renders the fixtures module for `contract`.
pub fn generate_fixtures(contract: &UiContract) -> String {
    if contract.entities.is_empty() {
        return EMPTY_FIXTURES.to_string();
    }

    let mut root = Map::new();
    for entity in &contract.entities {
        let rows = (1..=ROWS_PER_ENTITY).map(|n| sample_row(entity, n)).collect();
        root.insert(entity.name.clone(), Value::Array(rows));
    }
    // A map of strings, numbers and bools always serialises.
    let body = serde_json::to_string_pretty(&Value::Object(root)).unwrap_or_else(|_| "{}".into());
    format!("export const fixtures = {body};")
}

fn sample_row(entity: &Entity, n: usize) -> Value {
    let mut row = Map::new();
    row.insert("id".into(), Value::from(n));
    for field in &entity.fields {
        if field.name == "id" {
            continue;
        }
        row.insert(field.name.clone(), sample_value(&field.name, field.kind, n));
    }
    Value::Object(row)
}

fn sample_value(name: &str, kind: FieldKind, n: usize) -> Value {
    match kind {
        FieldKind::String => Value::from(format!("{name} {n}")),
        FieldKind::Number => Value::from(n * 10),
        FieldKind::Boolean => Value::from(n % 2 == 1),
        FieldKind::Date => Value::from(format!("2024-01-{n:02}T09:00:00Z")),
    }
}
