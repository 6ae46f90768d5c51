use std::sync::Arc;
use tokio::sync::Mutex;
use toolchat::agent::Agent;

/// Shared application state
///
/// The server holds a single conversation. Requests take the lock for the whole turn, so
/// concurrent chats are answered one after another.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Mutex<Agent>>,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent: Arc::new(Mutex::new(agent)),
        }
    }
}
