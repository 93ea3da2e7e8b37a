//! Generation-based cancellation for superseding in-flight submissions.
//!
//! A [`TokenSource`] hands out at most one live [`CancellationToken`] at a
//! time. Issuing a new token, cancelling, or releasing the current one moves
//! the shared generation forward, which wakes every pending
//! [`CancellationToken::cancelled`] future whose generation no longer matches.

use std::future::Future;

use shared::domain::Generation;
use tokio::sync::watch;

pub struct TokenSource {
    active: watch::Sender<Generation>,
    issued: Option<Generation>,
    next: u64,
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource {
    pub fn new() -> Self {
        let (active, _) = watch::channel(Generation(0));
        Self {
            active,
            issued: None,
            next: 1,
        }
    }

    /// Issues a fresh token, invalidating the previous one.
    pub fn issue(&mut self) -> CancellationToken {
        let generation = self.bump();
        self.issued = Some(generation);
        CancellationToken {
            generation,
            active: self.active.subscribe(),
        }
    }

    /// Invalidates the live token, if any, and returns its generation.
    pub fn cancel(&mut self) -> Option<Generation> {
        let cancelled = self.issued.take()?;
        self.bump();
        Some(cancelled)
    }

    /// Retires `generation` after its work finished. No-op for stale generations.
    pub fn release(&mut self, generation: Generation) -> bool {
        if self.issued != Some(generation) {
            return false;
        }
        self.issued = None;
        self.bump();
        true
    }

    pub fn active(&self) -> Option<Generation> {
        self.issued
    }

    pub fn is_active(&self, generation: Generation) -> bool {
        self.issued == Some(generation)
    }

    fn bump(&mut self) -> Generation {
        let generation = Generation(self.next);
        self.next += 1;
        self.active.send_replace(generation);
        generation
    }
}

pub struct CancellationToken {
    generation: Generation,
    active: watch::Receiver<Generation>,
}

impl CancellationToken {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        *self.active.borrow() != self.generation
    }

    /// Resolves once this token is superseded or its source is dropped.
    pub async fn cancelled(&mut self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            if self.active.changed().await.is_err() {
                return;
            }
        }
    }

    /// Drives `work` unless the token is cancelled first, in which case `work`
    /// is dropped and `None` is returned.
    pub async fn run_until_cancelled<F>(&mut self, work: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = work => Some(output),
        }
    }
}

#[cfg(test)]
#[path = "tests/cancellation_tests.rs"]
mod tests;
