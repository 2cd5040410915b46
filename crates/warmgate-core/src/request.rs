// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport envelopes and their normalization for the dispatch collaborator.
//!
//! The envelope mirrors what the listener hands over: lowercase header names,
//! a server map carrying `path_info` and friends, and the raw body. The
//! adapter turns it into a [`NormalizedRequest`] without any side effects.

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

/// Server map key holding the logical route.
pub const PATH_INFO: &str = "path_info";

/// Server map key holding the HTTP method.
pub const REQUEST_METHOD: &str = "request_method";

/// Method assumed when the server map does not name one.
const DEFAULT_METHOD: &str = "GET";

/// Transport-level request as received by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Header name to value, as sent by the transport.
    pub header: BTreeMap<String, String>,
    /// Server and environment parameters (`path_info`, `request_method`, ...).
    pub server: BTreeMap<String, String>,
    /// Raw request body.
    pub raw_content: Bytes,
}

impl RequestEnvelope {
    /// Envelope with `raw_content` as body and no headers or server params.
    pub fn new(raw_content: impl Into<Bytes>) -> Self {
        Self {
            raw_content: raw_content.into(),
            ..Self::default()
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(name.into(), value.into());
        self
    }

    /// Add a server parameter.
    pub fn with_server(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.server.insert(key.into(), value.into());
        self
    }

    /// Shorthand for `with_server(PATH_INFO, path)`.
    pub fn with_path_info(self, path: impl Into<String>) -> Self {
        self.with_server(PATH_INFO, path)
    }

    /// The logical route, if present.
    pub fn path_info(&self) -> Option<&str> {
        self.server.get(PATH_INFO).map(String::as_str)
    }
}

/// Request in the shape the dispatch collaborator consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    method: String,
    path_info: String,
    headers: BTreeMap<String, String>,
    content: Bytes,
    server: BTreeMap<String, String>,
}

impl NormalizedRequest {
    /// Uppercase HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Logical route, always starting with `/`.
    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    /// Header value by case-insensitive name (`_` and `-` are equivalent).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&normalize_header_name(name))
            .map(String::as_str)
    }

    /// All headers with normalized names.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Raw body.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Body as UTF-8, if it is valid UTF-8.
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    /// Server parameters, passed through from the envelope unchanged.
    pub fn server(&self) -> &BTreeMap<String, String> {
        &self.server
    }

    /// Single server parameter.
    pub fn server_param(&self, key: &str) -> Option<&str> {
        self.server.get(key).map(String::as_str)
    }
}

/// Malformed envelopes. These are client errors and never a worker fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AdaptError {
    /// A required server parameter is absent.
    #[error("missing required request field '{0}'")]
    MissingField(&'static str),

    /// `path_info` is empty or not absolute.
    #[error("invalid path_info '{0}': must start with '/'")]
    InvalidPathInfo(String),

    /// A header name is empty or contains non-token characters.
    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),

    /// A header value contains a line break.
    #[error("invalid value for header '{0}'")]
    InvalidHeaderValue(String),
}

impl AdaptError {
    /// Stable error code for client-facing error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidPathInfo(_) => "INVALID_PATH_INFO",
            Self::InvalidHeaderName(_) => "INVALID_HEADER_NAME",
            Self::InvalidHeaderValue(_) => "INVALID_HEADER_VALUE",
        }
    }
}

/// Stateless envelope normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestAdapter;

impl RequestAdapter {
    /// Convert `envelope` into a [`NormalizedRequest`].
    pub fn adapt(envelope: RequestEnvelope) -> Result<NormalizedRequest, AdaptError> {
        let RequestEnvelope {
            header,
            server,
            raw_content,
        } = envelope;

        let path_info = server
            .get(PATH_INFO)
            .ok_or(AdaptError::MissingField(PATH_INFO))?
            .clone();
        if !path_info.starts_with('/') {
            return Err(AdaptError::InvalidPathInfo(path_info));
        }

        let method = server
            .get(REQUEST_METHOD)
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_METHOD.to_string());

        let mut headers = BTreeMap::new();
        for (name, value) in header {
            let normalized = normalize_header_name(&name);
            if normalized.is_empty() || !normalized.bytes().all(is_token_byte) {
                return Err(AdaptError::InvalidHeaderName(name));
            }
            if value.contains(['\r', '\n']) {
                return Err(AdaptError::InvalidHeaderValue(name));
            }
            headers.insert(normalized, value.trim().to_string());
        }

        Ok(NormalizedRequest {
            method,
            path_info,
            headers,
            content: raw_content,
            server,
        })
    }
}

fn normalize_header_name(name: &str) -> String {
    name.trim().replace('_', "-").to_ascii_lowercase()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
