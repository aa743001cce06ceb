// SPDX-License-Identifier: MIT

//! Credential resolution
//!
//! Nodes ask for secrets by reference string; the injected resolver decides
//! where the value comes from. Resolved values are handed straight to the
//! node and never written to the pack or put on the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::CredentialError;

/// Type a node expects the resolved secret to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretKind {
    String,
    Number,
    Boolean,
    Json,
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecretKind::String => "string",
            SecretKind::Number => "number",
            SecretKind::Boolean => "boolean",
            SecretKind::Json => "json",
        };
        f.write_str(name)
    }
}

/// Resolves secret references for nodes
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, reference: &str, expected: SecretKind) -> Result<Value, CredentialError>;
}

/// Resolver for `env:NAME` (process environment, `.env` included once
/// loaded) and `literal:VALUE` references
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialResolver;

impl EnvCredentialResolver {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, reference: &str, expected: SecretKind) -> Result<Value, CredentialError> {
        let raw = match reference.split_once(':') {
            Some(("env", name)) => {
                std::env::var(name).map_err(|_| CredentialError::NotFound(reference.to_string()))?
            }
            Some(("literal", value)) => value.to_string(),
            _ => return Err(CredentialError::UnsupportedScheme(reference.to_string())),
        };
        coerce(reference, raw, expected)
    }
}

fn coerce(reference: &str, raw: String, expected: SecretKind) -> Result<Value, CredentialError> {
    let mismatch = || CredentialError::TypeMismatch {
        reference: reference.to_string(),
        expected: expected.to_string(),
    };

    match expected {
        SecretKind::String => Ok(Value::String(raw)),
        SecretKind::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(mismatch),
        SecretKind::Boolean => match raw.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        SecretKind::Json => serde_json::from_str(&raw).map_err(|_| mismatch()),
    }
}
