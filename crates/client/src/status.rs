use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared connectivity flag consulted before every network stage.
#[derive(Debug, Clone)]
pub struct NetworkStatus(Arc<AtomicBool>);

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.0.swap(online, Ordering::AcqRel)
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}
