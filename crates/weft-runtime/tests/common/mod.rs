//! Shared helpers for runtime integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use weft_proto::{ForwardMsg, PageInfo};
use weft_runtime::{
    ClientDisconnected, CompileError, Script, ScriptSource, SessionClient,
};

/// Records every delivered message; can simulate a vanished client.
#[derive(Default)]
pub struct RecordingClient {
    messages: Mutex<Vec<ForwardMsg>>,
    fail_after: AtomicUsize,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        init_logging();
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            fail_after: AtomicUsize::new(usize::MAX),
        })
    }

    /// Start failing after `count` successful writes.
    pub fn disconnect_after(&self, count: usize) {
        self.fail_after.store(count, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ForwardMsg> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count<F: Fn(&ForwardMsg) -> bool>(&self, pred: F) -> usize {
        self.messages().iter().filter(|msg| pred(msg)).count()
    }
}

impl SessionClient for RecordingClient {
    fn write_forward_msg(&self, msg: &ForwardMsg) -> Result<(), ClientDisconnected> {
        let mut messages = self.messages.lock().unwrap();
        if messages.len() >= self.fail_after.load(Ordering::SeqCst) {
            return Err(ClientDisconnected);
        }
        messages.push(msg.clone());
        Ok(())
    }
}

/// A source serving one script under one page.
pub struct StaticSource {
    script: Arc<dyn Script>,
    page: PageInfo,
}

impl StaticSource {
    pub fn new(script: Arc<dyn Script>) -> Arc<Self> {
        Arc::new(Self {
            script,
            page: PageInfo::new("main", "Main"),
        })
    }
}

impl ScriptSource for StaticSource {
    fn load(&self, page_id: &str) -> Result<Arc<dyn Script>, CompileError> {
        if page_id.is_empty() || page_id == self.page.page_id {
            Ok(self.script.clone())
        } else {
            Err(CompileError::PageNotFound(page_id.into()))
        }
    }

    fn pages(&self) -> Vec<PageInfo> {
        vec![self.page.clone()]
    }

    fn main_page(&self) -> PageInfo {
        self.page.clone()
    }
}

/// A source whose script never loads.
pub struct BrokenSource;

impl ScriptSource for BrokenSource {
    fn load(&self, _page_id: &str) -> Result<Arc<dyn Script>, CompileError> {
        Err(CompileError::Failed("syntax error at line 3".to_string()))
    }

    fn pages(&self) -> Vec<PageInfo> {
        vec![PageInfo::new("main", "Main")]
    }

    fn main_page(&self) -> PageInfo {
        PageInfo::new("main", "Main")
    }
}

/// Poll until `pred` holds, failing after five seconds.
pub fn wait_until(mut pred: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if pred() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached within five seconds");
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
