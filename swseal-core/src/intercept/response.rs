//! Request and response model shared by the interceptor and delivered
//! handlers

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::StatusCode;

/// Intercepted request
pub type Request = http::Request<Bytes>;

/// A response as the interceptor hands it back to the host.
///
/// Unlike `http::Response` the status text is carried explicitly, so a
/// rebuilt response keeps whatever reason phrase the handler chose.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// HTML document with an explicit status text
    pub fn html(status: StatusCode, status_text: &str, body: impl Into<Bytes>) -> Self {
        let mut response = Self::new(status, body);
        response.status_text = status_text.to_string();
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=UTF-8"),
        );
        response
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Declared content type mentions `text/html`
    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
            .unwrap_or(false)
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl From<http::Response<Bytes>> for Response {
    fn from(response: http::Response<Bytes>) -> Self {
        let (parts, body) = response.into_parts();
        Self {
            status: parts.status,
            status_text: parts.status.canonical_reason().unwrap_or_default().to_string(),
            headers: parts.headers,
            body,
        }
    }
}

/// Whatever a delivered handler answers with.
///
/// Handlers are not required to build a full response; bare text or bytes
/// are wrapped the way a browser's `new Response(body)` would.
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    Response(Response),
    Http(http::Response<Bytes>),
    Text(String),
    Bytes(Bytes),
}

impl HandlerOutput {
    pub fn into_response(self) -> Response {
        match self {
            HandlerOutput::Response(response) => response,
            HandlerOutput::Http(response) => response.into(),
            HandlerOutput::Text(text) => {
                let mut response = Response::new(StatusCode::OK, text);
                response.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain;charset=UTF-8"),
                );
                response
            }
            HandlerOutput::Bytes(bytes) => Response::new(StatusCode::OK, bytes),
        }
    }
}

impl From<Response> for HandlerOutput {
    fn from(response: Response) -> Self {
        HandlerOutput::Response(response)
    }
}

impl From<http::Response<Bytes>> for HandlerOutput {
    fn from(response: http::Response<Bytes>) -> Self {
        HandlerOutput::Http(response)
    }
}

impl From<String> for HandlerOutput {
    fn from(text: String) -> Self {
        HandlerOutput::Text(text)
    }
}

impl From<&str> for HandlerOutput {
    fn from(text: &str) -> Self {
        HandlerOutput::Text(text.to_string())
    }
}
