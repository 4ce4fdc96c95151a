use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::core::Time;

/// Live timeline position shared with the UI.
///
/// Abortable user-interaction renders are cancelled as soon as the playhead leaves the time they
/// were started for.
#[derive(Debug, Default)]
pub struct Timeline {
    current: AtomicU64,
}

impl Timeline {
    pub fn new(time: Time) -> Self {
        Self {
            current: AtomicU64::new(time.to_bits()),
        }
    }

    pub fn current_frame(&self) -> Time {
        f64::from_bits(self.current.load(Ordering::Acquire))
    }

    pub fn seek(&self, time: Time) {
        self.current.store(time.to_bits(), Ordering::Release);
    }
}
