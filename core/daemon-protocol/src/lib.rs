//! IPC protocol types and validation for nudge-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests.
//!
//! Malformed activity payloads are normalized rather than rejected. Only
//! enumerated values (the tone) are strict.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    DeclareTask,
    ReportActivity,
    ReportTabSwitch,
    Continue,
    AcceptPrompt,
    SetTone,
    GetState,
    GetMetrics,
    ExportEvents,
    ResetEventLog,
    Subscribe,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: None,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Wording register for intervention prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Gentle,
    Firm,
}

impl Tone {
    pub const ALL: [Tone; 2] = [Tone::Gentle, Tone::Firm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Gentle => "gentle",
            Tone::Firm => "firm",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gentle" => Some(Tone::Gentle),
            "firm" => Some(Tone::Firm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclareTaskParams {
    pub task_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityParams {
    pub typing: bool,
    pub scroll_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetToneParams {
    pub tone: Tone,
}

pub fn parse_declare_task(params: Option<Value>) -> Result<DeclareTaskParams, ErrorInfo> {
    let task_name = match params {
        Some(params) => {
            require_object(&params)?;
            params
                .get("task_name")
                .and_then(|value| value.as_str())
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        }
        None => String::new(),
    };
    Ok(DeclareTaskParams { task_name })
}

pub fn parse_activity(params: Option<Value>) -> Result<ActivityParams, ErrorInfo> {
    let mut typing = false;
    let mut scroll_distance = 0.0;

    if let Some(params) = params {
        require_object(&params)?;
        typing = params
            .get("typing")
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        scroll_distance = params
            .get("scroll_distance")
            .map(normalize_distance)
            .unwrap_or(0.0);
    }

    Ok(ActivityParams {
        typing,
        scroll_distance,
    })
}

pub fn parse_set_tone(params: Option<Value>) -> Result<SetToneParams, ErrorInfo> {
    let params = params.ok_or_else(|| ErrorInfo::new("invalid_params", "tone is required"))?;
    require_object(&params)?;
    let raw = params
        .get("tone")
        .and_then(|value| value.as_str())
        .ok_or_else(|| ErrorInfo::new("missing_field", "tone is required"))?;
    let tone = Tone::parse(raw).ok_or_else(|| {
        ErrorInfo::new(
            "invalid_params",
            format!("tone must be \"gentle\" or \"firm\", got {:?}", raw),
        )
    })?;
    Ok(SetToneParams { tone })
}

/// Coerces a scroll distance to a finite, non-negative number.
///
/// Numeric strings are accepted because some observation points stringify
/// everything they send.
pub fn normalize_distance(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(distance) if distance.is_finite() => distance.abs(),
        _ => 0.0,
    }
}

fn require_object(params: &Value) -> Result<(), ErrorInfo> {
    if params.is_object() {
        Ok(())
    } else {
        Err(ErrorInfo::new("invalid_params", "params must be an object"))
    }
}
