//! In-memory capability implementations
//!
//! Used by tests and by non-browser hosts that want the toolkit without a
//! real storage/navigation bridge. `FailingStore` simulates disabled
//! session storage (private browsing), `ScriptedFrameHost` replays a fixed
//! sequence of frame events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{
    FrameError, FrameEvent, FrameHost, HiddenFrame, KeyValueStore, Navigator, StorageError,
};

/// In-memory session storage
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, for test assertions
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let data = self
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned".into()))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned".into()))?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| StorageError::Unavailable("poisoned".into()))?;
        data.remove(key);
        Ok(())
    }
}

/// Storage that always fails, simulating a host with storage disabled
#[derive(Debug, Clone, Default)]
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".into()))
    }
}

/// Navigator with a fixed origin/path that records redirects
#[derive(Debug, Clone)]
pub struct StaticNavigator {
    origin: String,
    path: Arc<Mutex<String>>,
    user_agent: String,
    redirects: Arc<Mutex<Vec<String>>>,
}

impl StaticNavigator {
    #[must_use]
    pub fn new(origin: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: Arc::new(Mutex::new(path.into())),
            user_agent: String::new(),
            redirects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// All URLs passed to `redirect`, in order
    #[must_use]
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// The most recent redirect target, if any
    #[must_use]
    pub fn last_redirect(&self) -> Option<String> {
        self.redirects().last().cloned()
    }
}

impl Navigator for StaticNavigator {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn current_path(&self) -> String {
        self.path.lock().map(|p| p.clone()).unwrap_or_else(|_| "/".into())
    }

    fn redirect(&self, url: &str) {
        if let Ok(mut redirects) = self.redirects.lock() {
            redirects.push(url.to_string());
        }
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }
}

/// Frame host that delivers a scripted sequence of events
///
/// Each `open` call produces a frame fed by the configured events. The host
/// records every URL it was asked to open and how many frames are still
/// attached, so tests can assert on cleanup.
#[derive(Clone, Default)]
pub struct ScriptedFrameHost {
    events: Arc<Mutex<Vec<FrameEvent>>>,
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<FrameEvent>>>>,
    opened_urls: Arc<Mutex<Vec<String>>>,
    open_frames: Arc<Mutex<usize>>,
    fail_open: Arc<Mutex<bool>>,
}

impl ScriptedFrameHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the next opened frame
    pub fn push_event(&self, event: FrameEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Deliver an event to every frame opened so far
    ///
    /// Lets tests react to the URL a negotiator opened (e.g. echo back its
    /// `state` parameter) the way a real silent-callback page would.
    pub fn send(&self, event: FrameEvent) {
        if let Ok(senders) = self.senders.lock() {
            for sender in senders.iter() {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Make subsequent `open` calls fail
    pub fn fail_next_open(&self) {
        if let Ok(mut fail) = self.fail_open.lock() {
            *fail = true;
        }
    }

    /// URLs of all frames opened so far
    #[must_use]
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened_urls.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Number of frames opened but not yet closed
    #[must_use]
    pub fn open_frame_count(&self) -> usize {
        self.open_frames.lock().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl FrameHost for ScriptedFrameHost {
    async fn open(&self, url: &str) -> Result<Box<dyn HiddenFrame>, FrameError> {
        if self.fail_open.lock().map(|f| *f).unwrap_or(false) {
            return Err(FrameError::OpenFailed("scripted failure".into()));
        }

        if let Ok(mut urls) = self.opened_urls.lock() {
            urls.push(url.to_string());
        }
        if let Ok(mut count) = self.open_frames.lock() {
            *count += 1;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut events) = self.events.lock() {
            for event in events.drain(..) {
                let _ = tx.send(event);
            }
        }
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }

        Ok(Box::new(ScriptedFrame {
            events: rx,
            open_frames: self.open_frames.clone(),
            closed: false,
        }))
    }
}

struct ScriptedFrame {
    events: mpsc::UnboundedReceiver<FrameEvent>,
    open_frames: Arc<Mutex<usize>>,
    closed: bool,
}

#[async_trait]
impl HiddenFrame for ScriptedFrame {
    async fn next_event(&mut self) -> Option<FrameEvent> {
        self.events.recv().await
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Ok(mut count) = self.open_frames.lock() {
            *count = count.saturating_sub(1);
        }
    }
}

impl Drop for ScriptedFrame {
    fn drop(&mut self) {
        self.close();
    }
}
