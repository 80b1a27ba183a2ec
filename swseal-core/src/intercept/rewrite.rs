//! Response rewriting for delegated responses
//!
//! HTML responses get the watchdog snippet appended, after any raw-text
//! element the page left open has been closed, and their CSP is widened by
//! exactly the snippet's hash. Every response gets `nosniff`: the rewrite
//! trusts the declared content type, so the browser must too.
//!
//! A content-encoded HTML body cannot have the snippet appended, so such a
//! response is refused rather than passed through unguarded.

use crate::intercept::response::Response;
use bytes::Bytes;
use http::header::{
    HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_SECURITY_POLICY, X_CONTENT_TYPE_OPTIONS,
};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::trace;

/// Elements whose content is raw text or otherwise able to swallow a
/// trailing `<script>` tag
static RAW_TEXT_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(noscript|script|textarea|style|title|canvas|picture)\b")
        .expect("raw text element pattern is valid")
});

/// `default-src` and `script-src` directives, with their leading separator
static SCRIPT_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|;)(\s*(?:default|script)-src[^;]*)")
        .expect("CSP directive pattern is valid")
});

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("rewritten content-security-policy is not a valid header value")]
    InvalidCsp(#[from] http::header::InvalidHeaderValue),

    #[error("cannot rewrite an HTML body with content-encoding '{0}'")]
    EncodedBody(String),
}

/// Applies the rewrite rules to delegated responses
#[derive(Debug, Clone)]
pub struct ResponseRewriter {
    snippet: String,
    csp_source: String,
}

impl ResponseRewriter {
    /// `snippet` is appended to HTML bodies, `csp_source` is the
    /// `'sha256-…'` expression that allows it
    pub fn new(snippet: impl Into<String>, csp_source: impl Into<String>) -> Self {
        Self {
            snippet: snippet.into(),
            csp_source: csp_source.into(),
        }
    }

    /// Rewrite a response, preserving status and status text
    pub fn rewrite(&self, mut response: Response) -> Result<Response, RewriteError> {
        response
            .headers
            .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

        if !response.is_html() {
            return Ok(response);
        }

        if let Some(encoding) = response.headers.get(CONTENT_ENCODING) {
            let encoding = String::from_utf8_lossy(encoding.as_bytes())
                .trim()
                .to_string();
            if !encoding.eq_ignore_ascii_case("identity") {
                return Err(RewriteError::EncodedBody(encoding));
            }
        }

        let policies: Vec<HeaderValue> = response
            .headers
            .get_all(CONTENT_SECURITY_POLICY)
            .iter()
            .cloned()
            .collect();
        if !policies.is_empty() {
            response.headers.remove(CONTENT_SECURITY_POLICY);
            for policy in policies {
                let policy = String::from_utf8_lossy(policy.as_bytes());
                let extended = extend_csp(&policy, &self.csp_source);
                response
                    .headers
                    .append(CONTENT_SECURITY_POLICY, HeaderValue::from_str(&extended)?);
            }
        }

        let mut html = close_unterminated(&response.text());
        html.push_str(&self.snippet);
        response.body = Bytes::from(html);
        if response.headers.contains_key(CONTENT_LENGTH) {
            response
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(response.body.len()));
        }

        Ok(response)
    }
}

/// Add `source` to every `default-src` and `script-src` directive
pub fn extend_csp(policy: &str, source: &str) -> String {
    SCRIPT_DIRECTIVE
        .replace_all(policy, |caps: &regex::Captures<'_>| {
            format!("{}{} {}", &caps[1], &caps[2], source)
        })
        .into_owned()
}

/// Close raw-text elements left open at the end of the document.
///
/// An element is open when no matching closing tag follows it anywhere in
/// the rest of the document. Each pass closes the first open element found,
/// keeping the tag name as the page spelled it, until none is left.
pub fn close_unterminated(html: &str) -> String {
    let mut html = html.to_string();

    while let Some(name) = first_unterminated(&html) {
        trace!("Closing unterminated <{}> before snippet", name);
        html.push_str(&format!("</{name}>"));
    }

    html
}

fn first_unterminated(html: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with the original
    let lower = html.to_ascii_lowercase();

    RAW_TEXT_OPEN.captures_iter(html).find_map(|caps| {
        let whole = caps.get(0)?;
        let name = caps.get(1)?;
        let closing = format!("</{}>", name.as_str().to_ascii_lowercase());
        if lower[whole.end()..].contains(&closing) {
            None
        } else {
            Some(name.as_str().to_string())
        }
    })
}
