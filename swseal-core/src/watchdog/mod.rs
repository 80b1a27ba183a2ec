//! Watchdog snippet injected into every rewritten HTML page
//!
//! Once running in the page it listens for service worker update activity.
//! Any update the loader did not drive itself means the loader was bypassed,
//! so the page is blanked and a tamper warning shown, re-applied every few
//! seconds.
//!
//! The snippet is allowed through Content-Security-Policy by hash. The hash
//! covers the exact script text and is computed once per process.

use crate::trust::hasher::csp_hash_source;
use once_cell::sync::Lazy;

/// Script text placed between `<script>` and `</script>`
pub const WATCHDOG_SCRIPT: &str = include_str!("watchdog.js");

/// The leading comment's `-->` also closes any comment the page left open,
/// so the script tag is never swallowed by one.
static BOOTSTRAP_MARKUP: Lazy<String> = Lazy::new(|| {
    format!(
        "<!-- Alert the user when the control script updates without signature verification -->\n<script>{WATCHDOG_SCRIPT}</script>"
    )
});

static CSP_SOURCE: Lazy<String> = Lazy::new(|| csp_hash_source(WATCHDOG_SCRIPT));

/// Markup appended to HTML responses
pub fn bootstrap_markup() -> &'static str {
    &BOOTSTRAP_MARKUP
}

/// `'sha256-…'` source expression allowing the snippet under CSP
pub fn csp_source() -> &'static str {
    &CSP_SOURCE
}
