use tracing::{info, warn};

/// A redacted login event. Carries no tokens, codes or nonces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    /// A login attempt was bound to a session and the browser redirected.
    Started,
    /// The callback validated an ID token for `subject`.
    Succeeded { subject: String },
    /// The callback failed; `kind` is [`AuthError::kind`](crate::AuthError::kind).
    Failed { kind: &'static str },
}

/// Telemetry hook invoked by the handshake controller.
pub trait LoginObserver: Send + Sync + 'static {
    fn observe(&self, event: &LoginEvent);
}

/// Default observer: one `tracing` event per login step.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoginObserver for TracingObserver {
    fn observe(&self, event: &LoginEvent) {
        match event {
            LoginEvent::Started => info!("Login started"),
            LoginEvent::Succeeded { subject } => info!(%subject, "Login succeeded"),
            LoginEvent::Failed { kind } if *kind == "missing_nonce" => {
                warn!(kind, security = true, "Login failed: callback without a pending attempt")
            }
            LoginEvent::Failed { kind } => warn!(kind, "Login failed"),
        }
    }
}
