//! Provenance headers stamped onto records before they leave the process.
//!
//! `x-origin` names the first process that produced a record and is never
//! overwritten. `x-trace` is a JSON object mapping the nanosecond timestamp
//! of every hop to the `{service}-{serial}` identity that handled it.

use crate::error::TraceError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const ORIGIN_HEADER: &str = "x-origin";
pub const TRACE_HEADER: &str = "x-trace";

/// Who this process is, for trace stamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceIdentity {
    pub service: String,
    pub serial_number: String,
}

impl Default for TraceIdentity {
    fn default() -> Self {
        Self::from_env()
    }
}

impl TraceIdentity {
    pub fn new(service: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            serial_number: serial_number.into(),
        }
    }

    /// Reads `MICROSERVICE_NAME` and `SERIAL_NUMBER`; missing variables become empty strings.
    pub fn from_env() -> Self {
        Self {
            service: std::env::var("MICROSERVICE_NAME").unwrap_or_default(),
            serial_number: std::env::var("SERIAL_NUMBER").unwrap_or_default(),
        }
    }

    fn hop(&self) -> String {
        format!("{}-{}", self.service, self.serial_number)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceValue {
    #[serde(rename = "trace", default)]
    pub traces: BTreeMap<i64, String>,
}

/// Stamps `headers` for one hop at the current wall-clock time.
pub fn stamp(
    headers: &mut HashMap<String, String>,
    identity: &TraceIdentity,
) -> Result<(), TraceError> {
    let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    stamp_at(headers, identity, now)
}

/// Like [`stamp`] with an explicit hop timestamp.
///
/// On error the headers are left exactly as they were.
pub fn stamp_at(
    headers: &mut HashMap<String, String>,
    identity: &TraceIdentity,
    nanos: i64,
) -> Result<(), TraceError> {
    let key = find_key(headers, TRACE_HEADER).unwrap_or_else(|| TRACE_HEADER.to_string());
    let mut trace = match headers.get(&key) {
        Some(raw) => parse(&key, raw)?,
        None => TraceValue::default(),
    };
    if trace.traces.contains_key(&nanos) {
        return Err(TraceError::Collision(nanos));
    }
    trace.traces.insert(nanos, identity.hop());

    let encoded = serde_json::to_string(&trace).map_err(TraceError::Encode)?;
    headers.insert(key, encoded);
    if find_key(headers, ORIGIN_HEADER).is_none() {
        headers.insert(ORIGIN_HEADER.to_string(), identity.serial_number.clone());
    }
    Ok(())
}

/// Decodes the `x-trace` header, if present.
pub fn read_trace(headers: &HashMap<String, String>) -> Result<Option<TraceValue>, TraceError> {
    match find_key(headers, TRACE_HEADER) {
        Some(key) => parse(&key, &headers[&key]).map(Some),
        None => Ok(None),
    }
}

fn parse(header: &str, raw: &str) -> Result<TraceValue, TraceError> {
    serde_json::from_str(raw).map_err(|source| TraceError::Malformed {
        header: header.to_string(),
        source,
    })
}

// header names compare case-insensitively
fn find_key(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .keys()
        .find(|k| k.eq_ignore_ascii_case(name))
        .cloned()
}
