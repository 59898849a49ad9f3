//! Capability interfaces over ambient host objects
//!
//! The toolkit never touches window, document, or session storage directly.
//! Everything the core needs from the host environment is expressed as a
//! small trait (key/value storage, navigation, hidden frames) so the logic
//! runs unchanged against a real browser bridge, a desktop webview, or the
//! in-memory fakes used in tests.

pub mod memory;
pub mod traits;

pub use memory::{FailingStore, MemoryStore, ScriptedFrameHost, StaticNavigator};
pub use traits::{
    FrameError, FrameEvent, FrameHost, HiddenFrame, KeyValueStore, Navigator, StorageError,
};
