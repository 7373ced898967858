//! Server lifecycle: in-flight session tracking and graceful shutdown

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use tokio::sync::Notify;
use tracing::{info, warn};

/// Counts sessions in flight so shutdown can stop intake and wait for them to finish.
#[derive(Debug)]
pub struct SessionTracker {
    accepting: AtomicBool,
    active: AtomicUsize,
    idle: Notify,
}

impl SessionTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accepting: AtomicBool::new(true),
            active: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    /// Registers a new session, or `None` once shutdown has begun.
    pub fn try_begin(self: &Arc<Self>) -> Option<SessionPermit> {
        if !self.is_accepting() {
            return None;
        }

        self.active.fetch_add(1, Ordering::SeqCst);
        let permit = SessionPermit(Arc::clone(self));

        // Lost the race with stop_accepting; dropping the permit undoes the count.
        if !self.is_accepting() {
            return None;
        }
        Some(permit)
    }

    pub fn stop_accepting(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!(active = self.active(), "no longer accepting sessions");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Resolves once no sessions are in flight.
    pub async fn drained(&self) {
        loop {
            let idle = self.idle.notified();
            if self.active() == 0 {
                return;
            }
            idle.await;
        }
    }
}

#[derive(Debug)]
pub struct SessionPermit(Arc<SessionTracker>);

impl Drop for SessionPermit {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Waits for Ctrl+C or SIGTERM, then stops the tracker from accepting new sessions.
pub async fn shutdown_signal(sessions: Arc<SessionTracker>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, initiating shutdown"),
        _ = terminate => info!("SIGTERM received, initiating shutdown"),
    }

    sessions.stop_accepting();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn permits_track_active_sessions() {
        let tracker = SessionTracker::new();

        let first = tracker.try_begin().expect("accepting");
        let second = tracker.try_begin().expect("accepting");
        assert_eq!(tracker.active(), 2);

        drop(first);
        assert_eq!(tracker.active(), 1);
        drop(second);
        assert_eq!(tracker.active(), 0);
    }

    #[test]
    fn refuses_sessions_after_stop() {
        let tracker = SessionTracker::new();
        tracker.stop_accepting();

        assert!(tracker.try_begin().is_none());
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test]
    async fn drained_resolves_immediately_when_idle() {
        let tracker = SessionTracker::new();
        tokio::time::timeout(Duration::from_secs(1), tracker.drained())
            .await
            .expect("idle tracker is drained");
    }

    #[tokio::test]
    async fn drained_waits_for_in_flight_sessions() {
        let tracker = SessionTracker::new();
        let permit = tracker.try_begin().expect("accepting");
        tracker.stop_accepting();

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.drained().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drained after last permit")
            .expect("waiter task");
    }
}
