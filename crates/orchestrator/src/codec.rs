//! Text <-> structured data conversion for imports and exports.

use serde_json::{Map, Value};
use shared::domain::{ExportFormat, FileFormat};

use crate::{error::CodecError, store::StateSnapshot};

pub fn parse_file(content: &str, format: FileFormat) -> Result<Value, CodecError> {
    match format {
        FileFormat::Json => serde_json::from_str(content).map_err(CodecError::Json),
        FileFormat::Yaml => parse_yaml(content),
        FileFormat::Csv => Ok(parse_csv(content)),
    }
}

fn parse_yaml(content: &str) -> Result<Value, CodecError> {
    if content.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_saphyr::from_str(content).map_err(|err| CodecError::Yaml(err.to_string()))
}

/// Header row plus positional rows. Fields are split on every comma (no quoting), and
/// values missing at the end of a row become empty strings.
fn parse_csv(content: &str) -> Value {
    let mut lines = content.split('\n');
    let headers: Vec<String> = lines
        .next()
        .unwrap_or_default()
        .split(',')
        .map(|header| header.trim().to_string())
        .collect();

    let rows = lines
        .map(|line| {
            let values: Vec<&str> = line.split(',').collect();
            let record: Map<String, Value> = headers
                .iter()
                .enumerate()
                .map(|(index, header)| {
                    let value = values.get(index).map_or("", |value| value.trim());
                    (header.clone(), Value::String(value.to_string()))
                })
                .collect();
            Value::Object(record)
        })
        .collect();

    Value::Array(rows)
}

pub fn serialize_state(snapshot: &StateSnapshot, format: ExportFormat) -> Result<String, CodecError> {
    let serialized = match format {
        ExportFormat::Json => serde_json::to_string_pretty(snapshot).map_err(|err| err.to_string()),
        ExportFormat::Yaml => serde_saphyr::to_string(snapshot).map_err(|err| err.to_string()),
    };
    serialized.map_err(|reason| CodecError::Serialize {
        format: format.as_str(),
        reason,
    })
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
