use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Concrete target descriptor built from one locator candidate after
/// template resolution. Mirrors the strategies automation surfaces
/// commonly expose.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Id(String),
    Css(String),
    XPath(String),
    Name(String),
    ClassName(String),
    Tag(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Id(v) => write!(f, "id={v}"),
            Target::Css(v) => write!(f, "css={v}"),
            Target::XPath(v) => write!(f, "xpath={v}"),
            Target::Name(v) => write!(f, "name={v}"),
            Target::ClassName(v) => write!(f, "class={v}"),
            Target::Tag(v) => write!(f, "tag={v}"),
        }
    }
}

/// Opaque reference to one resolved element on the live surface.
/// Handles go stale when the page reloads; the runner rebuilds its
/// per-page handle table instead of holding on to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        ElementHandle(id.into())
    }
}

/// Opaque capture of session-identifying state (cookies and the like),
/// saved and restored by the saveState/loadState operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub cookies: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The session behind the surface is gone (crashed browser, dropped
    /// remote connection). The retry wrapper treats this as recoverable.
    #[error("surface unreachable: {0}")]
    Unreachable(String),

    /// Anything else: stale handle, script error, protocol failure.
    #[error("{0}")]
    Failure(String),
}

/// Seam to the live automation surface. Implementations own the real
/// session; all methods take `&self` so probes can run inside bounded
/// polling loops without exclusive access.
#[async_trait]
pub trait Surface: Send + Sync {
    /// Load a URL in the current session.
    async fn goto(&self, url: &str) -> Result<(), SurfaceError>;

    async fn current_url(&self) -> Result<String, SurfaceError>;

    /// Reload the current location so the surface re-evaluates against
    /// whatever session state it now carries.
    async fn refresh(&self) -> Result<(), SurfaceError>;

    /// All elements matching the descriptor, in surface order. An empty
    /// vec is "no match yet", not an error.
    async fn find(&self, target: &Target) -> Result<Vec<ElementHandle>, SurfaceError>;

    async fn click(&self, handle: &ElementHandle) -> Result<(), SurfaceError>;
    async fn double_click(&self, handle: &ElementHandle) -> Result<(), SurfaceError>;
    async fn hover(&self, handle: &ElementHandle) -> Result<(), SurfaceError>;
    async fn submit(&self, handle: &ElementHandle) -> Result<(), SurfaceError>;
    async fn clear(&self, handle: &ElementHandle) -> Result<(), SurfaceError>;
    async fn enter_text(&self, handle: &ElementHandle, text: &str) -> Result<(), SurfaceError>;

    /// Select a dropdown option by its visible label.
    async fn select_option(&self, handle: &ElementHandle, label: &str)
        -> Result<(), SurfaceError>;

    /// Visible label of the currently selected option.
    async fn selected_option(&self, handle: &ElementHandle) -> Result<String, SurfaceError>;

    /// Send a local file path to an upload-capable element.
    async fn upload(&self, handle: &ElementHandle, path: &Path) -> Result<(), SurfaceError>;

    async fn text(&self, handle: &ElementHandle) -> Result<String, SurfaceError>;
    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SurfaceError>;
    async fn is_displayed(&self, handle: &ElementHandle) -> Result<bool, SurfaceError>;
    async fn is_enabled(&self, handle: &ElementHandle) -> Result<bool, SurfaceError>;

    /// Whether the handle no longer refers to a live element.
    async fn is_stale(&self, handle: &ElementHandle) -> Result<bool, SurfaceError>;

    /// Escape hatch: evaluate an opaque boolean-valued script against
    /// the live surface.
    async fn eval_probe(&self, script: &str) -> Result<bool, SurfaceError>;

    async fn session_state(&self) -> Result<SessionState, SurfaceError>;
    async fn restore_session_state(&self, state: &SessionState) -> Result<(), SurfaceError>;

    /// Tear down and recreate the underlying session. Called by the
    /// retry wrapper after a session loss.
    async fn reset(&self) -> Result<(), SurfaceError>;

    /// Opaque visual capture of the live surface, attached to reports
    /// by the scenario runner on failure.
    async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError>;
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker failure: {0}")]
    Failure(String),
}

/// One message observed on the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub key: String,
    pub value: String,
}

/// Seam to the message broker. One client per scenario; the runner
/// subscribes to a topic the first time it is asked to consume from it.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&mut self, topic: &str, key: &str, value: &str) -> Result<(), BrokerError>;

    /// Block until previously published messages are durably handed off.
    async fn flush(&mut self) -> Result<(), BrokerError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    /// Messages that arrived on subscribed topics, waiting at most
    /// `within` for new ones.
    async fn poll(&mut self, within: Duration) -> Result<Vec<BrokerMessage>, BrokerError>;
}
