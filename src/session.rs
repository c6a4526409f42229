use tokio::sync::watch;
use tracing::{error, info, warn};

/// Connection events reported by the messaging client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A pairing code is waiting to be scanned.
    Qr(String),
    Authenticated,
    AuthFailure,
    Ready,
    Disconnected(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub ready: bool,
    /// Last pairing code seen; cleared once the client is ready.
    pub pairing_code: Option<String>,
}

impl SessionState {
    pub fn needs_pairing(&self) -> bool {
        self.pairing_code.is_some()
    }
}

/// Holds the client's session state and notifies subscribers on change.
pub struct SessionMonitor {
    tx: watch::Sender<SessionState>,
}

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMonitor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx }
    }

    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().ready
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Apply a client event. Subscribers are only woken when the state
    /// actually changes, so repeated polls of the same state are quiet.
    pub fn apply(&self, event: ClientEvent) {
        self.tx.send_if_modified(|state| {
            let before = state.clone();
            match event {
                ClientEvent::Qr(code) => {
                    if state.pairing_code.as_deref() != Some(code.as_str()) {
                        info!("Pairing code received, waiting for scan");
                    }
                    state.pairing_code = Some(code);
                }
                ClientEvent::Authenticated => {
                    if !state.ready {
                        info!("WhatsApp authenticated successfully");
                    }
                }
                ClientEvent::AuthFailure => {
                    if state.ready || before.pairing_code.is_some() {
                        error!("WhatsApp authentication failed");
                    }
                    state.ready = false;
                }
                ClientEvent::Ready => {
                    if !state.ready {
                        info!("WhatsApp client is ready");
                    }
                    state.ready = true;
                    state.pairing_code = None;
                }
                ClientEvent::Disconnected(reason) => {
                    if state.ready {
                        warn!("WhatsApp client disconnected: {}", reason);
                    }
                    state.ready = false;
                }
            }
            *state != before
        });
    }
}
