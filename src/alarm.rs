use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alarm notification as posted by the Salto platform. No schema is
/// enforced; anything missing renders as a placeholder.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlarmPayload {
    #[serde(rename = "type", default)]
    pub kind: Option<Value>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

/// Render a field the way a loose JSON consumer would: strings as-is, other
/// scalars via their JSON text, and null/empty/false/zero as absent.
fn field(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn format_alarm_message<Tz: TimeZone>(alarm: &AlarmPayload, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "*Salto Alarm Triggered*\n\n\
         Time: {}\n\
         Type: {}\n\
         Location: {}\n\
         Details: {}",
        now.format("%Y-%m-%d %H:%M:%S"),
        field(&alarm.kind).unwrap_or_else(|| "Unknown".to_string()),
        field(&alarm.location).unwrap_or_else(|| "Unknown".to_string()),
        field(&alarm.message).unwrap_or_else(|| "No details provided".to_string()),
    )
}

/// Format using the local wall clock.
pub fn format_alarm_now(alarm: &AlarmPayload) -> String {
    format_alarm_message(alarm, &Local::now())
}
