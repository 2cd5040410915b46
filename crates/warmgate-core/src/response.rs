// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Responses produced by the dispatch collaborator (or by the worker itself
//! when a request never reaches it).

use bytes::Bytes;
use serde_json::json;

/// Response written back to the transport.
///
/// `content` is written verbatim; the core never rewrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Extra response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub content: Bytes,
}

impl Response {
    /// Response with `status` and `content`.
    pub fn new(status: u16, content: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            content: content.into(),
        }
    }

    /// `200 OK` with `content`.
    pub fn ok(content: impl Into<Bytes>) -> Self {
        Self::new(200, content)
    }

    /// JSON response.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string()).with_header("content-type", "application/json")
    }

    /// GraphQL-style error body generated by the worker.
    pub fn error(status: u16, code: &str, message: impl std::fmt::Display) -> Self {
        Self::json(
            status,
            &json!({
                "errors": [{
                    "message": message.to_string(),
                    "extensions": { "code": code },
                }]
            }),
        )
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8, if valid.
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let response = Response::error(400, "MISSING_FIELD", "missing required request field");

        assert_eq!(response.status, 400);
        assert_eq!(response.header("Content-Type"), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&response.content).unwrap();
        assert_eq!(body["errors"][0]["extensions"]["code"], "MISSING_FIELD");
        assert_eq!(
            body["errors"][0]["message"],
            "missing required request field"
        );
    }

    #[test]
    fn test_ok_keeps_content_verbatim() {
        let response = Response::ok("{\"data\":null}");
        assert_eq!(response.status, 200);
        assert!(response.headers.is_empty());
        assert_eq!(response.content_str(), Some("{\"data\":null}"));
    }
}
