//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Shared stop flag checked by the producer before every block pull.
///
/// Cancelling never discards work: blocks already pulled are still estimated
/// and reported.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Handler run on SIGINT: cancels this token.
    pub fn interrupt_handler(&self) -> impl FnMut() + Send + 'static {
        let token = self.clone();
        move || {
            if !token.is_cancelled() {
                warn!("interrupt received, finishing blocks already pulled");
            }
            token.cancel();
        }
    }

    /// Cancel this token on Ctrl-C. Only one handler can be installed per process.
    pub fn cancel_on_interrupt(&self) -> Result<(), ctrlc::Error> {
        ctrlc::set_handler(self.interrupt_handler())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_interrupt_handler_cancels() {
        let token = CancelToken::new();
        let mut handler = token.interrupt_handler();
        assert!(!token.is_cancelled());
        handler();
        assert!(token.is_cancelled());
        // Repeated interrupts are harmless
        handler();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_interrupt_handler_installs() {
        let token = CancelToken::new();
        token.cancel_on_interrupt().unwrap();
        assert!(matches!(
            token.cancel_on_interrupt(),
            Err(ctrlc::Error::MultipleHandlers)
        ));
        assert!(!token.is_cancelled());
    }
}
