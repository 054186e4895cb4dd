// Test mocks for the pool's two trait boundaries:
// - MockSession (RenderSession) — canned HTML, scriptable disconnect
// - MockFactory (SessionFactory) — counts creations, scriptable failures and delay

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PoolError, Result};
use crate::session::{RenderSession, SessionFactory};

/// Control and observation handle for a `MockSession` after it has been
/// boxed into the pool.
#[derive(Clone)]
pub struct SessionHandle {
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    renders: Arc<AtomicUsize>,
}

impl SessionHandle {
    /// Make the session report disconnected, as a crashed browser would.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

/// In-memory session returning canned HTML.
pub struct MockSession {
    connected: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    renders: Arc<AtomicUsize>,
    fail_renders: Arc<AtomicBool>,
    html: String,
}

impl MockSession {
    pub fn new(html: &str) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(AtomicBool::new(false)),
            renders: Arc::new(AtomicUsize::new(0)),
            fail_renders: Arc::new(AtomicBool::new(false)),
            html: html.to_string(),
        }
    }

    /// Make every subsequent `render` fail with a network error.
    pub fn failing_renders(self) -> Self {
        self.fail_renders.store(true, Ordering::SeqCst);
        self
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            connected: self.connected.clone(),
            closed: self.closed.clone(),
            renders: self.renders.clone(),
        }
    }
}

#[async_trait]
impl RenderSession for MockSession {
    async fn render(&self, url: &str) -> Result<String> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if self.fail_renders.load(Ordering::SeqCst) {
            return Err(PoolError::Network(format!(
                "MockSession: forced render failure for {url}"
            )));
        }
        Ok(self.html.clone())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory producing `MockSession`s. Tracks every created session so tests
/// can reach into the pool and disconnect or inspect them.
pub struct MockFactory {
    created: AtomicUsize,
    fail_remaining: AtomicUsize,
    delay: Option<Duration>,
    html: String,
    handles: Mutex<Vec<SessionHandle>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            delay: None,
            html: "<html></html>".to_string(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Canned HTML for every session this factory creates.
    pub fn with_html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    /// Fail the next `n` create calls.
    pub fn fail_next(self, n: usize) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep this long inside every create call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sessions successfully created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Handles for every created session, in creation order.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.handles.lock().unwrap().clone()
    }
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn create(&self) -> Result<Box<dyn RenderSession>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let should_fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(PoolError::SessionCreation(
                "MockFactory: forced create failure".to_string(),
            ));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let session = MockSession::new(&self.html);
        self.handles.lock().unwrap().push(session.handle());
        Ok(Box::new(session))
    }
}
