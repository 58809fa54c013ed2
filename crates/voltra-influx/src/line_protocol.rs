//! InfluxDB Line Protocol writer.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ms
//! ```
//!
//! Timestamps are written with millisecond precision; the write request
//! declares `precision=ms` to match.

use std::fmt;

/// A value that can be stored in an InfluxDB field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// 64-bit floating point.
    Float(f64),
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Float: written as-is (e.g., `3.14`)
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - String: quoted with double quotes, inner quotes escaped (e.g., `"hello"`)
    /// - Boolean: `true` or `false`
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
            FieldValue::Boolean(v) => {
                if *v {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// Map a decoded telemetry value onto an InfluxDB field value.
///
/// JSON numbers always map to `Float` so a field keeps one type across
/// writes even when a device alternates between `8` and `8.8`. Values that
/// are not scalars map to `None`.
pub fn field_value(value: &serde_json::Value) -> Option<FieldValue> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Float),
        serde_json::Value::String(s) => Some(FieldValue::String(s.clone())),
        serde_json::Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        _ => None,
    }
}

/// InfluxDB Line Protocol writer.
///
/// Accumulates points in an internal buffer and produces Line Protocol
/// strings when flushed.
pub struct LineProtocolWriter {
    buffer: Vec<String>,
}

impl LineProtocolWriter {
    /// Create a new empty writer.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Write a single point in Line Protocol format.
    ///
    /// # Arguments
    /// - `measurement` - The measurement name
    /// - `tags` - Tag key-value pairs (indexed, for filtering)
    /// - `fields` - Field key-value pairs (actual data)
    /// - `timestamp_ms` - Timestamp in milliseconds since Unix epoch
    ///
    /// # Panics
    /// Panics if `fields` is empty (InfluxDB requires at least one field).
    pub fn write_point(
        &mut self,
        measurement: &str,
        tags: &[(&str, &str)],
        fields: &[(&str, FieldValue)],
        timestamp_ms: i64,
    ) {
        assert!(!fields.is_empty(), "InfluxDB requires at least one field");

        let mut line = escape_measurement(measurement);

        // Append tags (sorted by key for canonical form)
        let mut sorted_tags: Vec<_> = tags.iter().collect();
        sorted_tags.sort_by_key(|(k, _)| *k);
        for (key, value) in &sorted_tags {
            line.push(',');
            line.push_str(&escape_tag_key(key));
            line.push('=');
            line.push_str(&escape_tag_value(value));
        }

        // Space separator before fields
        line.push(' ');

        // Append fields
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_field_key(key));
            line.push('=');
            line.push_str(&value.to_line_protocol());
        }

        // Space separator before timestamp
        line.push(' ');
        line.push_str(&timestamp_ms.to_string());

        self.buffer.push(line);
    }

    /// Flush the buffer, returning all accumulated lines.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.buffer)
    }

    /// Get the current number of buffered lines.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for LineProtocolWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape measurement name per Line Protocol spec.
/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag key per Line Protocol spec.
/// Commas, equals signs, and spaces must be escaped.
fn escape_tag_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Escape tag value per Line Protocol spec.
/// Commas, equals signs, and spaces must be escaped.
fn escape_tag_value(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Escape field key per Line Protocol spec.
/// Commas, equals signs, and spaces must be escaped.
fn escape_field_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
