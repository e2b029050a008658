//! JSON documents sent back to clients.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    ServerError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResponse {
    pub status: ResponseStatus,
    pub body: String,
}

#[derive(Serialize)]
struct AskDocument<'a> {
    bindings: &'a BTreeMap<String, String>,
    proof: &'a [String],
    time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

#[derive(Serialize)]
struct ErrorDocument<'a> {
    error: &'a str,
}

fn to_json<T: Serialize>(doc: &T) -> String {
    serde_json::to_string(doc)
        .unwrap_or_else(|_| r#"{"error":"failed to encode response"}"#.to_string())
}

/// `{"error": message}`
pub fn error_body(message: &str) -> String {
    to_json(&ErrorDocument { error: message })
}

pub fn encode(outcome: &Outcome) -> EncodedResponse {
    match outcome {
        Outcome::Success {
            bindings,
            proof,
            elapsed,
        } => EncodedResponse {
            status: ResponseStatus::Ok,
            body: to_json(&AskDocument {
                bindings,
                proof,
                time: elapsed.as_secs_f64(),
                error: None,
            }),
        },
        Outcome::Timeout { elapsed } => EncodedResponse {
            status: ResponseStatus::ServerError,
            body: to_json(&AskDocument {
                bindings: &BTreeMap::new(),
                proof: &[],
                time: elapsed.as_secs_f64(),
                error: Some("timeout"),
            }),
        },
        Outcome::Error(err) => EncodedResponse {
            status: ResponseStatus::ServerError,
            body: error_body(&err.to_string()),
        },
    }
}
