//! JSON test vector loader shared by frame tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FrameVector {
    pub description: String,
    /// Raw stream text, delivered to the parser one chunk at a time.
    pub chunks: Vec<String>,
    #[serde(default)]
    pub expect: Vec<serde_json::Value>,
    #[serde(default)]
    pub expect_error: Option<ExpectError>,
}

#[derive(Debug, Deserialize)]
pub struct ExpectError {
    pub code: String,
}

pub fn load(name: &str) -> FrameVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}
