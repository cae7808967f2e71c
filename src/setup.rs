use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Whether first-run setup is still outstanding.
///
/// Starts out required. Once [`SetupState::complete`] has been called it stays
/// complete for the lifetime of the value; there is no way back.
#[derive(Debug)]
pub struct SetupState {
    complete: AtomicBool,
}

impl Default for SetupState {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            complete: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Marks setup as done. Returns `true` for the call that flipped the flag.
    pub fn complete(&self) -> bool {
        let flipped = !self.complete.swap(true, Ordering::AcqRel);
        if flipped {
            info!("setup complete");
        }
        flipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_monotonic() {
        let state = SetupState::new();
        assert!(!state.is_complete());
        assert!(state.complete());
        assert!(state.is_complete());
        assert!(!state.complete());
        assert!(state.is_complete());
    }

    #[test]
    fn test_single_flip_across_threads() {
        let state = Arc::new(SetupState::default());
        let flips: usize = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.complete())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(flips, 1);
    }
}
