//! Request interception
//!
//! Turns a [`Resolution`] into the response the host serves. Delegated
//! requests run through the captured fetch handler and then the rewriter;
//! any failure along that path becomes the script error page.

pub mod pages;
pub mod pending;
pub mod response;
pub mod rewrite;

pub use pages::{ErrorPages, PageKind};
pub use pending::{PendingRequest, RequestHandle, Resolution};
pub use response::{HandlerOutput, Request, Response};
pub use rewrite::{ResponseRewriter, RewriteError};

use crate::delivery::{FetchHandler, ScriptFault};
use crate::watchdog;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

pub struct Interceptor {
    pages: ErrorPages,
    rewriter: ResponseRewriter,
}

impl Interceptor {
    /// Pages are rendered now, with the current hashtag
    pub fn new(site_name: &str) -> Self {
        Self {
            pages: ErrorPages::new(site_name, Utc::now()),
            rewriter: ResponseRewriter::new(watchdog::bootstrap_markup(), watchdog::csp_source()),
        }
    }

    pub fn page(&self, kind: PageKind) -> Response {
        self.pages.response(kind)
    }

    pub async fn respond(&self, resolution: Resolution, request: Request) -> Response {
        match resolution {
            Resolution::Page(kind) => self.page(kind),
            Resolution::Delegate(handler) => self.delegate(handler, request).await,
        }
    }

    /// Run the captured handler and rewrite its answer
    pub async fn delegate(
        &self,
        handler: Option<Arc<dyn FetchHandler>>,
        request: Request,
    ) -> Response {
        let uri = request.uri().to_string();

        match self.try_delegate(handler, request).await {
            Ok(response) => response,
            Err(fault) => {
                error!(uri = %uri, "Delegated request failed: {}", fault);
                self.page(PageKind::ScriptError)
            }
        }
    }

    async fn try_delegate(
        &self,
        handler: Option<Arc<dyn FetchHandler>>,
        request: Request,
    ) -> Result<Response, ScriptFault> {
        let handler = handler.ok_or(ScriptFault::NoHandler)?;

        let output = AssertUnwindSafe(handler.handle(request))
            .catch_unwind()
            .await
            .map_err(|_| ScriptFault::Panicked)??;

        self.rewriter
            .rewrite(output.into_response())
            .map_err(|e| ScriptFault::Handler(e.to_string()))
    }
}
