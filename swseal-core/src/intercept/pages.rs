//! Fixed error pages
//!
//! Standalone documents with inline styling only, so they render with no
//! network and no other asset. Every page carries the watchdog snippet and
//! is served with status 503.

use crate::intercept::response::Response;
use crate::watchdog;
use chrono::{DateTime, Utc};
use http::StatusCode;

const ERROR_STYLES: &str = "<style>
  *{margin:0;padding:0}
  html{font:15px/22px sans-serif;background:#FF9800;color:#222;padding:15px}
  body{background:#FFF;margin:7% auto;max-width:600px;padding:30px;border-radius:3px}
  p{margin:11px 0 22px}
  strong{color:#111}
</style>";

const HARD_FAIL_STYLES: &str = "<style>html{background:#8B0920}</style>";

/// Which fixed page to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// The delivered script failed to run or to answer a request
    ScriptError,
    /// Transient failure, typically offline during the first load
    SoftFail,
    /// Verification failed or the script is missing
    HardFail,
    /// No resolution arrived before the request deadline
    Timeout,
}

impl PageKind {
    pub fn status_text(self) -> &'static str {
        match self {
            PageKind::ScriptError | PageKind::Timeout => "Internal Server Error",
            PageKind::SoftFail | PageKind::HardFail => "Service Unavailable",
        }
    }
}

/// Hashtag users can search for when the site is in trouble.
///
/// Changes roughly every nineteen hours, which makes it awkward to censor.
pub fn hashtag(now: DateTime<Utc>) -> String {
    let period = now.timestamp_millis().max(0) / 70_000_000;
    format!("#sw{}", to_base36(period as u64))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// The three page documents, rendered once
#[derive(Debug, Clone)]
pub struct ErrorPages {
    script_error: String,
    soft_fail: String,
    hard_fail: String,
}

impl ErrorPages {
    pub fn new(site_name: &str, now: DateTime<Utc>) -> Self {
        let header = format!(
            "<!DOCTYPE html>\n<html lang=en>\n<meta charset=utf-8>\n\
             <meta name=viewport content=\"initial-scale=1, minimum-scale=1, width=device-width\">\n\
             <title>{}</title>\n{}",
            escape_html(site_name),
            watchdog::bootstrap_markup()
        );

        let how_to_fix = format!(
            " make sure your computer, browser and connection are working properly and that no proxy \
             is in the way. If this application has to be used behind a proxy, use its offline \
             version instead.<p>Also consider that the site itself may be in trouble: open it in a \
             private window, and if it has been compromised look for instructions on social \
             networks.<p>Search for the site name, its official accounts or this hashtag: {}",
            hashtag(now)
        );

        Self {
            script_error: format!(
                "{header}{ERROR_STYLES}<h1>Script error :(</h1><p>This error should never happen. \
                 Look for help, and if the problem persists force a reload or clear the cache."
            ),
            soft_fail: format!(
                "{header}{ERROR_STYLES}<h1>Error loading the page</h1><p>This <strong>may have been \
                 caused</strong> by cookies and site data being cleared.<p>If you suspect another \
                 cause,{how_to_fix}"
            ),
            hard_fail: format!(
                "{header}{ERROR_STYLES}{HARD_FAIL_STYLES}<h1>Security error</h1><p>Maybe <strong>an \
                 extension or a proxy</strong> tried to change this website.<p>It is recommended \
                 to{how_to_fix}"
            ),
        }
    }

    pub fn body(&self, kind: PageKind) -> &str {
        match kind {
            PageKind::ScriptError | PageKind::Timeout => &self.script_error,
            PageKind::SoftFail => &self.soft_fail,
            PageKind::HardFail => &self.hard_fail,
        }
    }

    pub fn response(&self, kind: PageKind) -> Response {
        Response::html(
            StatusCode::SERVICE_UNAVAILABLE,
            kind.status_text(),
            self.body(kind).to_string(),
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
