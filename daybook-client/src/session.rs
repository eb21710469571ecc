//! Access token shared by every request of one client.

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    access_token: Option<String>,
    generation: u64,
}

/// Token plus a generation counter that advances on every login, refresh
/// or logout. A request remembers the generation it was sent with; after a
/// 401 it only refreshes if nobody else has advanced the generation since.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<State>,
    refresh_gate: Mutex<()>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token and generation.
    pub fn snapshot(&self) -> (Option<String>, u64) {
        let state = self.state.read();
        (state.access_token.clone(), state.generation)
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.read().access_token.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().access_token.is_some()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let mut state = self.state.write();
        state.access_token = Some(token.into());
        state.generation += 1;
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.access_token = None;
        state.generation += 1;
    }

    /// Serializes refresh attempts. Holders re-check the generation first.
    pub(crate) async fn refresh_gate(&self) -> MutexGuard<'_, ()> {
        self.refresh_gate.lock().await
    }
}
