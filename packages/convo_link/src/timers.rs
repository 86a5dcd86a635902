//! Timer scheduling.
//!
//! The state machines only ever ask for "fire this token after that long" and
//! "forget this token". Firing is reported back as the token itself; the
//! owner of the token decides whether it is still current.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::effect::{TimerKind, TimerToken};

pub trait TimerScheduler {
    fn schedule(&mut self, token: TimerToken, after: Duration);
    fn cancel(&mut self, token: TimerToken);
}

/// Tokio-backed scheduler. At most one pending timer per kind; scheduling a
/// new token of the same kind aborts the previous one.
pub struct TokioTimers {
    fired: mpsc::UnboundedSender<TimerToken>,
    pending: HashMap<TimerKind, (u64, JoinHandle<()>)>,
}

impl TokioTimers {
    pub fn new(fired: mpsc::UnboundedSender<TimerToken>) -> Self {
        Self {
            fired,
            pending: HashMap::new(),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending
            .values()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }
}

impl TimerScheduler for TokioTimers {
    fn schedule(&mut self, token: TimerToken, after: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, dropping timer {:?}", token);
            return;
        };
        let fired = self.fired.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let _ = fired.send(token);
        });
        if let Some((_, previous)) = self.pending.insert(token.kind, (token.generation, handle)) {
            previous.abort();
        }
    }

    fn cancel(&mut self, token: TimerToken) {
        let armed = matches!(self.pending.get(&token.kind), Some((generation, _)) if *generation == token.generation);
        if armed {
            if let Some((_, handle)) = self.pending.remove(&token.kind) {
                handle.abort();
            }
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.pending.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: TimerKind, generation: u64) -> TimerToken {
        TimerToken { kind, generation }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        timers.schedule(token(TimerKind::Poll, 1), Duration::from_secs(3));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, token(TimerKind::Poll, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        timers.schedule(token(TimerKind::Reconnect, 1), Duration::from_secs(1));
        timers.cancel(token(TimerKind::Reconnect, 1));
        timers.schedule(token(TimerKind::Poll, 2), Duration::from_secs(5));

        assert_eq!(rx.recv().await.unwrap(), token(TimerKind::Poll, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_same_kind_replaces() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        timers.schedule(token(TimerKind::Poll, 1), Duration::from_secs(1));
        timers.schedule(token(TimerKind::Poll, 2), Duration::from_secs(2));

        assert_eq!(rx.recv().await.unwrap(), token(TimerKind::Poll, 2));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_of_stale_token_keeps_current() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        timers.schedule(token(TimerKind::Poll, 2), Duration::from_secs(1));
        timers.cancel(token(TimerKind::Poll, 1));

        assert_eq!(rx.recv().await.unwrap(), token(TimerKind::Poll, 2));
    }
}
