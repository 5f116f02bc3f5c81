use crate::state::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::info;

#[derive(Deserialize)]
pub struct StopRequest {
    pub session_id: String,
}

/// Running relay streams that can be stopped by session id.
///
/// A session id registered again belongs to the newest stream; each entry
/// carries a generation so an older guard never removes a newer entry.
#[derive(Clone, Default)]
pub struct StopRegistry {
    sessions: Arc<Mutex<HashMap<String, (u64, watch::Sender<bool>)>>>,
    generation: Arc<AtomicU64>,
}

impl StopRegistry {
    /// Register a stream. The entry is removed when the guard drops.
    pub fn register(&self, session_id: &str) -> StopGuard {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_string(), (generation, cancel_tx));
        StopGuard {
            registry: self.clone(),
            session_id: session_id.to_string(),
            generation,
            cancel_rx,
        }
    }

    /// Signal the stream for `session_id`. False if none is running.
    pub fn stop(&self, session_id: &str) -> bool {
        match self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
        {
            Some((_, cancel_tx)) => {
                let _ = cancel_tx.send(true);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }
}

pub struct StopGuard {
    registry: StopRegistry,
    session_id: String,
    generation: u64,
    cancel_rx: watch::Receiver<bool>,
}

impl StopGuard {
    /// Resolves once a stop was requested for this session.
    pub async fn stopped(&mut self) {
        if self.cancel_rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        let mut sessions = self
            .registry
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sessions
            .get(&self.session_id)
            .is_some_and(|(generation, _)| *generation == self.generation)
        {
            sessions.remove(&self.session_id);
        }
    }
}

/// Waits on an optional guard; without one it never resolves.
pub async fn stopped(guard: &mut Option<StopGuard>) {
    match guard {
        Some(guard) => guard.stopped().await,
        None => std::future::pending().await,
    }
}

pub async fn stop_handler(
    State(state): State<AppState>,
    Json(req): Json<StopRequest>,
) -> impl IntoResponse {
    info!("Received stop signal!");
    if state.streams.stop(&req.session_id) {
        info!("Chat stream {} stopped by user", req.session_id);
        (StatusCode::OK, "stopped")
    } else {
        (StatusCode::NOT_FOUND, "session not found")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn stop_wakes_the_registered_stream() {
        let registry = StopRegistry::default();
        let mut guard = Some(registry.register("s1"));
        assert!(registry.is_running("s1"));
        assert!(registry.stop("s1"));
        tokio::time::timeout(Duration::from_secs(1), stopped(&mut guard))
            .await
            .expect("stop should resolve");
    }

    #[tokio::test]
    async fn dropping_the_guard_unregisters() {
        let registry = StopRegistry::default();
        let guard = registry.register("s2");
        drop(guard);
        assert!(!registry.is_running("s2"));
        assert!(!registry.stop("s2"));
    }

    #[tokio::test]
    async fn older_guard_keeps_a_newer_registration() {
        let registry = StopRegistry::default();
        let first = registry.register("s3");
        let mut second = Some(registry.register("s3"));
        drop(first);
        assert!(registry.is_running("s3"));
        assert!(registry.stop("s3"));
        tokio::time::timeout(Duration::from_secs(1), stopped(&mut second))
            .await
            .expect("newest stream should stop");
        drop(second);
        assert!(!registry.is_running("s3"));
    }

    #[tokio::test]
    async fn no_guard_never_resolves() {
        let mut guard = None;
        let res = tokio::time::timeout(Duration::from_millis(20), stopped(&mut guard)).await;
        assert!(res.is_err());
    }
}
