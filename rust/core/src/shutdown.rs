//! Cooperative shutdown signaling for blocking loops

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation token checked by blocking accept/serve loops.
///
/// A listener loop receives a clone of the token and polls it between
/// blocking calls; any thread holding another clone can request shutdown
/// with [`trigger`](ShutdownToken::trigger). The accept timeout on the
/// listening socket bounds how long a trigger can go unnoticed.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// Create a new, untriggered token
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request shutdown. Visible to all clones of this token.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
