//! Test helpers shared by the integration tests
//!
//! - a fixed signing key and payload signing
//! - `ScriptedSource`: replies from a queue, optionally held behind a gate
//! - `CommandRuntime`: runs bodies made of `command:argument` lines

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_SECURITY_POLICY};
use http::StatusCode;
use p384::SecretKey;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use swseal_core::delivery::{
    FetchHandler, HandlerRegistry, Listener, ScriptFault, ScriptRuntime,
};
use swseal_core::fetch::{ScriptSource, SourceError};
use swseal_core::intercept::{HandlerOutput, Request, Response};
use swseal_core::store::{MemoryStore, RecordStore};
use swseal_core::trust::PayloadSigner;
use swseal_core::{Loader, LoaderConfig};
use tokio::sync::Semaphore;

pub const SCRIPT_NAME: &str = "sw.js";

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub fn signer() -> PayloadSigner {
    PayloadSigner::new(SecretKey::from_slice(&[0x17; 48]).unwrap())
}

pub fn other_signer() -> PayloadSigner {
    PayloadSigner::new(SecretKey::from_slice(&[0x29; 48]).unwrap())
}

/// Signed payload for `sw.js`
pub fn signed(modified_time: i64, body: &str) -> String {
    signer().sign(SCRIPT_NAME, modified_time, &[], body).unwrap()
}

pub fn request(path: &str) -> Request {
    http::Request::builder()
        .uri(format!("https://app.example{path}"))
        .body(Bytes::new())
        .unwrap()
}

/// One scripted answer of [`ScriptedSource`]
#[derive(Debug, Clone)]
pub enum Reply {
    Payload(String),
    NotFound,
    Offline,
}

/// Answers fetches from a queue; the last reply repeats once the queue
/// runs dry
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(Reply::NotFound),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every fetch waits for one permit on `gate`
    pub fn gated(replies: Vec<Reply>, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(replies)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            *last = reply;
        }
        last.clone()
    }
}

#[async_trait]
impl ScriptSource for ScriptedSource {
    async fn fetch(&self, name: &str) -> Result<String, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        match self.next_reply() {
            Reply::Payload(payload) => Ok(payload),
            Reply::NotFound => Err(SourceError::NotFound {
                name: name.to_string(),
                status: 404,
            }),
            Reply::Offline => Err(SourceError::Network {
                name: name.to_string(),
                message: "offline".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Fetch handler answering with fixed HTML
pub struct HtmlHandler {
    markup: String,
    csp: Option<String>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FetchHandler for HtmlHandler {
    async fn handle(&self, _request: Request) -> Result<HandlerOutput, ScriptFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut response = Response::html(StatusCode::OK, "OK", self.markup.clone());
        if let Some(csp) = &self.csp {
            let value =
                HeaderValue::from_str(csp).map_err(|e| ScriptFault::Handler(e.to_string()))?;
            response.headers.insert(CONTENT_SECURITY_POLICY, value);
        }
        Ok(response.into())
    }
}

struct TextHandler(String);

#[async_trait]
impl FetchHandler for TextHandler {
    async fn handle(&self, _request: Request) -> Result<HandlerOutput, ScriptFault> {
        Ok(HandlerOutput::Text(self.0.clone()))
    }
}

struct FailingHandler;

#[async_trait]
impl FetchHandler for FailingHandler {
    async fn handle(&self, _request: Request) -> Result<HandlerOutput, ScriptFault> {
        Err(ScriptFault::Handler("handler threw".to_string()))
    }
}

/// Runs bodies made of one `command:argument` per line:
///
/// - `csp:<policy>` - CSP header for the next `html` handler
/// - `html:<markup>` - register an HTML fetch handler
/// - `text:<text>` - register a plain text fetch handler
/// - `fail-handler` - register a handler that always fails
/// - `listen:<event>` - register a counting listener for `event`
/// - `throw:<message>` - fault while running
/// - `panic` - panic while running
#[derive(Default)]
pub struct CommandRuntime {
    runs: Mutex<Vec<String>>,
    pub handler_calls: Arc<AtomicUsize>,
    pub listener_calls: Arc<AtomicUsize>,
}

impl CommandRuntime {
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

impl ScriptRuntime for CommandRuntime {
    fn run(&self, body: &str, registry: &HandlerRegistry) -> Result<(), ScriptFault> {
        self.runs.lock().unwrap().push(body.to_string());

        let mut csp = None;
        for line in body.lines() {
            let (command, argument) = line.split_once(':').unwrap_or((line, ""));
            match command {
                "csp" => csp = Some(argument.to_string()),
                "html" => registry.add_event_listener(
                    "fetch",
                    Listener::fetch(HtmlHandler {
                        markup: argument.to_string(),
                        csp: csp.take(),
                        calls: self.handler_calls.clone(),
                    }),
                )?,
                "text" => registry.add_event_listener(
                    "fetch",
                    Listener::fetch(TextHandler(argument.to_string())),
                )?,
                "fail-handler" => {
                    registry.add_event_listener("fetch", Listener::fetch(FailingHandler))?
                }
                "listen" => {
                    let calls = self.listener_calls.clone();
                    registry.add_event_listener(
                        argument,
                        Listener::callback(move |_| {
                            calls.fetch_add(1, Ordering::SeqCst);
                        }),
                    )?
                }
                "throw" => return Err(ScriptFault::Runtime(argument.to_string())),
                "panic" => panic!("script panicked"),
                _ => {}
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// A loader wired to scripted parts
pub struct Harness {
    pub loader: Loader,
    pub source: Arc<ScriptedSource>,
    pub runtime: Arc<CommandRuntime>,
    pub store: Arc<dyn RecordStore>,
}

impl Harness {
    pub fn new(config: LoaderConfig, source: ScriptedSource) -> Self {
        Self::with_store(config, source, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(
        config: LoaderConfig,
        source: ScriptedSource,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        init_test_logging();

        let source = Arc::new(source);
        let runtime = Arc::new(CommandRuntime::default());
        let loader = Loader::builder(config)
            .key(signer().trust_key())
            .source(source.clone())
            .store(store.clone())
            .runtime(runtime.clone())
            .build()
            .unwrap();

        Self {
            loader,
            source,
            runtime,
            store,
        }
    }
}
