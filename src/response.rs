//! HTTP response handling.

use bytes::Bytes;

use crate::error::{Error, Result};

/// A fully-received HTTP response.
///
/// The wire codec collaborator produces these; the dispatcher interprets
/// status and headers to decide completion, redirect, or auth replay.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// The Location header of a redirect response.
    pub fn redirect_location(&self) -> Option<&str> {
        self.get_header("Location")
    }

    /// First header value by case-insensitive name.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All header values by case-insensitive name.
    pub fn get_headers(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether the server allows this connection to be reused.
    pub fn is_keep_alive(&self) -> bool {
        match self.get_header("Connection") {
            Some(v) => !v.to_ascii_lowercase().contains("close"),
            None => true,
        }
    }

    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| Error::http_protocol(format!("UTF-8 decode error: {e}")))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }
}
