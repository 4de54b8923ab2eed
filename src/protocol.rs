//! Protocol Module
//!
//! Wire types for the registration and enrollment endpoints. Requests are sent
//! form-encoded; responses are JSON documents carrying a `result` flag where
//! `1` means success.

use std::fmt;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::EnrollError;

/// Ordered, form-encodable list of `name=value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value submitted under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Parse a `NAME=VALUE` argument. The value may itself contain `=`.
    pub fn parse_pair(pair: &str) -> Result<(String, String)> {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected NAME=VALUE, got '{}'", pair))?;
        if name.is_empty() {
            return Err(anyhow!("Field name must not be empty in '{}'", pair));
        }
        Ok((name.to_string(), value.to_string()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for FormFields {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }
}

/// The `result` flag, compared loosely: `1`, `1.0`, `"1"` and `true` all mean success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultFlag(pub i64);

impl ResultFlag {
    pub fn is_success(&self) -> bool {
        self.0 == 1
    }
}

impl fmt::Display for ResultFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for ResultFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Bool(bool),
            Text(String),
            Null(()),
        }

        let flag = match Raw::deserialize(deserializer)? {
            Raw::Int(n) => n,
            Raw::Float(f) if f.fract() == 0.0 => f as i64,
            Raw::Float(_) => 0,
            Raw::Bool(b) => i64::from(b),
            Raw::Text(s) => s.trim().parse().unwrap_or(0),
            Raw::Null(()) => 0,
        };
        Ok(ResultFlag(flag))
    }
}

/// Response of the registration form action.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrationResponse {
    #[serde(default)]
    pub result: ResultFlag,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /certs/enroll`.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollRequest {
    pub csr: String,
    pub token: String,
    pub comment: String,
    pub validity: String,
}

impl EnrollRequest {
    pub fn to_form_fields(&self) -> FormFields {
        [
            ("csr", self.csr.as_str()),
            ("token", self.token.as_str()),
            ("comment", self.comment.as_str()),
            ("validity", self.validity.as_str()),
        ]
        .into_iter()
        .collect()
    }
}

/// Response of `POST /certs/enroll`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrollResponse {
    #[serde(default)]
    pub result: ResultFlag,
    #[serde(default)]
    pub cert: Option<String>,
}

/// Decode a JSON body into one of the response types.
pub fn decode_response<T: DeserializeOwned>(body: &serde_json::Value) -> crate::error::Result<T> {
    T::deserialize(body).map_err(|e| EnrollError::Malformed(e.to_string()))
}
