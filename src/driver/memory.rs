//! In-memory surface and broker.
//!
//! These back the crate's own tests and double as a dry-run target for
//! suite authors: pages, elements and topics live in plain maps, and
//! fault injection knobs simulate the failure modes a real session
//! exhibits (slow elements, resolution errors, session loss).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{
    BrokerError, BrokerMessage, ElementHandle, MessageBroker, SessionState, Surface,
    SurfaceError, Target,
};

/// One scripted element on a memory page.
#[derive(Debug, Clone)]
pub struct MemoryElement {
    pub id: String,
    pub targets: Vec<Target>,
    pub text: String,
    pub value: String,
    pub attributes: HashMap<String, String>,
    pub displayed: bool,
    pub enabled: bool,
    /// Number of `find` calls against this element's targets that come
    /// up empty before it starts matching. Simulates late rendering.
    pub appears_after_finds: u32,
    /// Path to switch the surface to when this element is clicked.
    pub on_click_goto: Option<String>,
    pub clicks: u32,
    pub submitted: bool,
    pub uploads: Vec<PathBuf>,
}

impl MemoryElement {
    pub fn new(id: impl Into<String>) -> Self {
        MemoryElement {
            id: id.into(),
            targets: Vec::new(),
            text: String::new(),
            value: String::new(),
            attributes: HashMap::new(),
            displayed: true,
            enabled: true,
            appears_after_finds: 0,
            on_click_goto: None,
            clicks: 0,
            submitted: false,
            uploads: Vec::new(),
        }
    }

    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn appears_after_finds(mut self, polls: u32) -> Self {
        self.appears_after_finds = polls;
        self
    }

    pub fn on_click_goto(mut self, path: impl Into<String>) -> Self {
        self.on_click_goto = Some(path.into());
        self
    }
}

#[derive(Debug, Default)]
struct SurfaceInner {
    /// Pages keyed by path. The current page is the one whose path the
    /// current URL contains.
    pages: HashMap<String, Vec<MemoryElement>>,
    url: String,
    current: Option<String>,
    cookies: HashMap<String, String>,
    /// Scripted results for `eval_probe`; unknown scripts read false.
    probes: HashMap<String, bool>,
    /// Descriptors that error out on `find` instead of matching nothing.
    failing_targets: HashSet<Target>,
    /// Next N surface calls fail with `Unreachable`. Cleared by reset.
    unreachable_for: u32,
    resets: u32,
    stale_handles: HashSet<String>,
    /// How many `find` calls each descriptor has seen.
    find_counts: HashMap<Target, u32>,
}

impl SurfaceInner {
    fn check_reachable(&mut self) -> Result<(), SurfaceError> {
        if self.unreachable_for > 0 {
            self.unreachable_for -= 1;
            return Err(SurfaceError::Unreachable("memory session dropped".into()));
        }
        Ok(())
    }

    fn element(&self, handle: &ElementHandle) -> Result<&MemoryElement, SurfaceError> {
        self.current
            .as_ref()
            .and_then(|page| self.pages.get(page))
            .and_then(|els| els.iter().find(|e| e.id == handle.0))
            .ok_or_else(|| SurfaceError::Failure(format!("no element behind handle {}", handle.0)))
    }

    fn element_mut(&mut self, handle: &ElementHandle) -> Result<&mut MemoryElement, SurfaceError> {
        let page = self
            .current
            .clone()
            .ok_or_else(|| SurfaceError::Failure("no page loaded".into()))?;
        self.pages
            .get_mut(&page)
            .and_then(|els| els.iter_mut().find(|e| e.id == handle.0))
            .ok_or_else(|| SurfaceError::Failure(format!("no element behind handle {}", handle.0)))
    }

    fn switch_to(&mut self, url: &str) {
        self.url = url.to_string();
        self.current = self
            .pages
            .keys()
            .filter(|path| url.contains(path.as_str()))
            // Longest matching path wins so "/account/settings" beats "/".
            .max_by_key(|path| path.len())
            .cloned();
    }
}

/// Scriptable in-memory automation surface. Clones share state, so a
/// test can keep one handle for observation after moving another into
/// a scenario.
#[derive(Debug, Default, Clone)]
pub struct MemorySurface {
    inner: Arc<Mutex<SurfaceInner>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, path: impl Into<String>, elements: Vec<MemoryElement>) {
        self.inner.lock().unwrap().pages.insert(path.into(), elements);
    }

    pub fn set_probe(&self, script: impl Into<String>, result: bool) {
        self.inner.lock().unwrap().probes.insert(script.into(), result);
    }

    /// Make `find` on this descriptor error out instead of matching
    /// nothing, exercising the advance-to-next-candidate path.
    pub fn fail_target(&self, target: Target) {
        self.inner.lock().unwrap().failing_targets.insert(target);
    }

    /// Drop the session for the next `calls` surface calls.
    pub fn drop_session_for(&self, calls: u32) {
        self.inner.lock().unwrap().unreachable_for = calls;
    }

    pub fn mark_stale(&self, handle_id: impl Into<String>) {
        self.inner.lock().unwrap().stale_handles.insert(handle_id.into());
    }

    pub fn set_displayed(&self, page: &str, element_id: &str, displayed: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(els) = inner.pages.get_mut(page) {
            if let Some(el) = els.iter_mut().find(|e| e.id == element_id) {
                el.displayed = displayed;
            }
        }
    }

    pub fn resets(&self) -> u32 {
        self.inner.lock().unwrap().resets
    }

    pub fn find_count(&self, target: &Target) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .find_counts
            .get(target)
            .copied()
            .unwrap_or(0)
    }

    pub fn clicks(&self, page: &str, element_id: &str) -> u32 {
        self.snapshot_element(page, element_id).map(|e| e.clicks).unwrap_or(0)
    }

    pub fn value_of(&self, page: &str, element_id: &str) -> Option<String> {
        self.snapshot_element(page, element_id).map(|e| e.value)
    }

    pub fn submitted(&self, page: &str, element_id: &str) -> bool {
        self.snapshot_element(page, element_id)
            .map(|e| e.submitted)
            .unwrap_or(false)
    }

    pub fn uploads(&self, page: &str, element_id: &str) -> Vec<PathBuf> {
        self.snapshot_element(page, element_id)
            .map(|e| e.uploads)
            .unwrap_or_default()
    }

    pub fn cookies(&self) -> HashMap<String, String> {
        self.inner.lock().unwrap().cookies.clone()
    }

    pub fn set_cookie(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().unwrap().cookies.insert(name.into(), value.into());
    }

    fn snapshot_element(&self, page: &str, element_id: &str) -> Option<MemoryElement> {
        self.inner
            .lock()
            .unwrap()
            .pages
            .get(page)
            .and_then(|els| els.iter().find(|e| e.id == element_id))
            .cloned()
    }
}

#[async_trait]
impl Surface for MemorySurface {
    async fn goto(&self, url: &str) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        inner.switch_to(url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(inner.url.clone())
    }

    async fn refresh(&self) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        let url = inner.url.clone();
        inner.switch_to(&url);
        Ok(())
    }

    async fn find(&self, target: &Target) -> Result<Vec<ElementHandle>, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        *inner.find_counts.entry(target.clone()).or_insert(0) += 1;
        if inner.failing_targets.contains(target) {
            return Err(SurfaceError::Failure(format!(
                "descriptor {target} rejected by surface"
            )));
        }
        let page = match inner.current.clone() {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };
        let mut handles = Vec::new();
        if let Some(els) = inner.pages.get_mut(&page) {
            for el in els.iter_mut().filter(|e| e.targets.contains(target)) {
                if el.appears_after_finds > 0 {
                    el.appears_after_finds -= 1;
                    continue;
                }
                handles.push(ElementHandle::new(el.id.clone()));
            }
        }
        Ok(handles)
    }

    async fn click(&self, handle: &ElementHandle) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        let el = inner.element_mut(handle)?;
        el.clicks += 1;
        if let Some(path) = el.on_click_goto.clone() {
            inner.switch_to(&path);
        }
        Ok(())
    }

    async fn double_click(&self, handle: &ElementHandle) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        inner.element_mut(handle)?.clicks += 2;
        Ok(())
    }

    async fn hover(&self, handle: &ElementHandle) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        inner.element(handle)?;
        Ok(())
    }

    async fn submit(&self, handle: &ElementHandle) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        inner.element_mut(handle)?.submitted = true;
        Ok(())
    }

    async fn clear(&self, handle: &ElementHandle) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        inner.element_mut(handle)?.value.clear();
        Ok(())
    }

    async fn enter_text(&self, handle: &ElementHandle, text: &str) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        let el = inner.element_mut(handle)?;
        el.value.push_str(text);
        Ok(())
    }

    async fn select_option(
        &self,
        handle: &ElementHandle,
        label: &str,
    ) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        inner.element_mut(handle)?.value = label.to_string();
        Ok(())
    }

    async fn selected_option(&self, handle: &ElementHandle) -> Result<String, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(inner.element(handle)?.value.clone())
    }

    async fn upload(&self, handle: &ElementHandle, path: &Path) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        inner.element_mut(handle)?.uploads.push(path.to_path_buf());
        Ok(())
    }

    async fn text(&self, handle: &ElementHandle) -> Result<String, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(inner.element(handle)?.text.clone())
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        let el = inner.element(handle)?;
        if name == "value" {
            return Ok(Some(el.value.clone()));
        }
        Ok(el.attributes.get(name).cloned())
    }

    async fn is_displayed(&self, handle: &ElementHandle) -> Result<bool, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(inner.element(handle)?.displayed)
    }

    async fn is_enabled(&self, handle: &ElementHandle) -> Result<bool, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(inner.element(handle)?.enabled)
    }

    async fn is_stale(&self, handle: &ElementHandle) -> Result<bool, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(inner.stale_handles.contains(&handle.0))
    }

    async fn eval_probe(&self, script: &str) -> Result<bool, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(inner.probes.get(script).copied().unwrap_or(false))
    }

    async fn session_state(&self) -> Result<SessionState, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(SessionState {
            cookies: inner.cookies.clone(),
        })
    }

    async fn restore_session_state(&self, state: &SessionState) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        inner.cookies = state.cookies.clone();
        Ok(())
    }

    async fn reset(&self) -> Result<(), SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        // The recreated session lands on the same location the old one
        // had loaded, with session state wiped.
        inner.unreachable_for = 0;
        inner.cookies.clear();
        inner.stale_handles.clear();
        inner.resets += 1;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SurfaceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_reachable()?;
        Ok(format!("capture of {}", inner.url).into_bytes())
    }
}

/// In-memory broker with subscribe-from-beginning semantics.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: HashMap<String, Vec<BrokerMessage>>,
    /// Topic -> read cursor for subscribed topics.
    subscriptions: HashMap<String, usize>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a message before the scenario starts consuming.
    pub fn seed(&mut self, topic: &str, key: &str, value: &str) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(BrokerMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
    }

    pub fn published(&self, topic: &str) -> Vec<BrokerMessage> {
        self.topics.get(topic).cloned().unwrap_or_default()
    }

    fn drain_new(&mut self) -> Vec<BrokerMessage> {
        let mut out = Vec::new();
        for (topic, cursor) in self.subscriptions.iter_mut() {
            if let Some(messages) = self.topics.get(topic) {
                for msg in &messages[*cursor..] {
                    out.push(msg.clone());
                }
                *cursor = messages.len();
            }
        }
        out
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(&mut self, topic: &str, key: &str, value: &str) -> Result<(), BrokerError> {
        self.seed(topic, key, value);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.subscriptions.entry(topic.to_string()).or_insert(0);
        Ok(())
    }

    async fn poll(&mut self, within: Duration) -> Result<Vec<BrokerMessage>, BrokerError> {
        let ready = self.drain_new();
        if !ready.is_empty() {
            return Ok(ready);
        }
        tokio::time::sleep(within).await;
        Ok(self.drain_new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_matches_only_current_page() {
        let surface = MemorySurface::new();
        surface.add_page(
            "/login",
            vec![MemoryElement::new("user").target(Target::Id("username".into()))],
        );
        surface.add_page(
            "/home",
            vec![MemoryElement::new("banner").target(Target::Id("banner".into()))],
        );

        surface.goto("http://app.local/login").await.unwrap();
        let found = surface.find(&Target::Id("username".into())).await.unwrap();
        assert_eq!(found, vec![ElementHandle::new("user")]);
        assert!(surface.find(&Target::Id("banner".into())).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_click_navigates_when_scripted() {
        let surface = MemorySurface::new();
        surface.add_page(
            "/login",
            vec![MemoryElement::new("go").target(Target::Id("go".into())).on_click_goto("/home")],
        );
        surface.add_page("/home", vec![]);

        surface.goto("http://app.local/login").await.unwrap();
        let handle = surface.find(&Target::Id("go".into())).await.unwrap().remove(0);
        surface.click(&handle).await.unwrap();
        assert!(surface.current_url().await.unwrap().contains("/home"));
    }

    #[tokio::test]
    async fn test_session_drop_clears_on_reset() {
        let surface = MemorySurface::new();
        surface.add_page("/login", vec![]);
        surface.goto("http://app.local/login").await.unwrap();

        surface.drop_session_for(1);
        assert!(matches!(
            surface.current_url().await,
            Err(SurfaceError::Unreachable(_))
        ));
        surface.reset().await.unwrap();
        assert!(surface.current_url().await.is_ok());
        assert_eq!(surface.resets(), 1);
    }

    #[tokio::test]
    async fn test_element_appears_after_polls() {
        let surface = MemorySurface::new();
        surface.add_page(
            "/login",
            vec![MemoryElement::new("slow")
                .target(Target::Id("slow".into()))
                .appears_after_finds(2)],
        );
        surface.goto("http://app.local/login").await.unwrap();

        let target = Target::Id("slow".into());
        assert!(surface.find(&target).await.unwrap().is_empty());
        assert!(surface.find(&target).await.unwrap().is_empty());
        assert_eq!(surface.find(&target).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broker_subscribe_then_poll() {
        let mut broker = MemoryBroker::new();
        broker.seed("orders", "k1", "v1");
        broker.subscribe("orders").await.unwrap();

        let batch = broker.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].key, "k1");

        // Cursor advanced; nothing new on the next poll.
        let batch = broker.poll(Duration::from_millis(10)).await.unwrap();
        assert!(batch.is_empty());
    }
}
