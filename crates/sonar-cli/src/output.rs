//! JSON-lines rendering of listed objects.

use std::io::Write;

use serde::Serialize;
use serde_json::{Map, Number, Value as Json};
use sonar_client::{TIME_FORMAT, Value};

use crate::errors::AppError;
use crate::session::ObjectRecord;

#[derive(Debug, Serialize)]
struct ObjectLine<'a> {
    name: &'a str,
    attributes: Map<String, Json>,
}

/// Writes one JSON object per line.
pub(crate) fn write_records<W: Write>(out: &mut W, records: &[ObjectRecord]) -> Result<(), AppError> {
    for record in records {
        let line = ObjectLine {
            name: &record.name,
            attributes: record
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), to_json(value)))
                .collect(),
        };
        serde_json::to_writer(&mut *out, &line).map_err(AppError::Serialise)?;
        writeln!(out).map_err(AppError::Output)?;
    }
    out.flush().map_err(AppError::Output)
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(flag) => Json::Bool(*flag),
        Value::Short(number) => Json::from(*number),
        Value::Int(number) => Json::from(*number),
        Value::Long(number) => Json::from(*number),
        Value::Float(number) => float(f64::from(*number)),
        Value::Double(number) => float(*number),
        Value::Text(text) | Value::Ref(text) => Json::String(text.clone()),
        Value::Time(at) => at
            .format(TIME_FORMAT)
            .map_or_else(|_| Json::String(at.to_string()), Json::String),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
    }
}

/// Non-finite floats have no JSON form.
fn float(number: f64) -> Json {
    Number::from_f64(number).map_or(Json::Null, Json::Number)
}
