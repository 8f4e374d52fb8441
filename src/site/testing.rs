//! In-memory page used to exercise the site adapter without a browser

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::driver::{self, AutomationDriver, ElementRef, SharedDriver};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub(crate) struct PageElement {
    text: String,
    attrs: HashMap<String, String>,
    selected: bool,
    toggles: bool,
    navigates_to: Option<String>,
}

impl PageElement {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Checkbox-like: clicking flips the selected state
    pub fn checkbox(mut self, selected: bool) -> Self {
        self.selected = selected;
        self.toggles = true;
        self
    }

    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_string());
        self
    }
}

/// Browser-visible actions, in the order the driver performed them
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PageEvent {
    Navigate(String),
    Click(String),
}

#[derive(Default)]
struct PageState {
    url: String,
    by_selector: HashMap<String, Vec<String>>,
    elements: HashMap<String, PageElement>,
    typed: HashMap<String, String>,
    clicks: Vec<String>,
    events: Vec<PageEvent>,
    /// Delay added to every driver call
    latency: Option<Duration>,
    closed: bool,
}

/// Handle to a fake page; clones share state with the driver built from it
#[derive(Clone, Default)]
pub(crate) struct FakePage {
    state: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> SharedDriver {
        driver::shared(FakeDriver {
            state: self.state.clone(),
        })
    }

    pub fn add(&self, selector: &str, element: PageElement) {
        let mut state = self.state.lock().unwrap();
        let id = format!("e-{}", state.elements.len() + 1);
        state
            .by_selector
            .entry(selector.to_string())
            .or_default()
            .push(id.clone());
        state.elements.insert(id, element);
    }

    pub fn set_text(&self, selector: &str, index: usize, text: &str) {
        let mut state = self.state.lock().unwrap();
        let id = state.by_selector[selector][index].clone();
        if let Some(el) = state.elements.get_mut(&id) {
            el.text = text.to_string();
        }
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    /// Text typed into the first element of `selector`
    pub fn typed(&self, selector: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let id = state.by_selector.get(selector)?.first()?;
        state.typed.get(id).cloned()
    }

    pub fn clicked(&self, selector: &str, index: usize) -> bool {
        let state = self.state.lock().unwrap();
        state
            .by_selector
            .get(selector)
            .and_then(|ids| ids.get(index))
            .is_some_and(|id| state.clicks.contains(id))
    }

    pub fn click_count(&self) -> usize {
        self.state.lock().unwrap().clicks.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = Some(latency);
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Click event for element `index` of `selector`
    pub fn click_event(&self, selector: &str, index: usize) -> PageEvent {
        let state = self.state.lock().unwrap();
        PageEvent::Click(state.by_selector[selector][index].clone())
    }
}

struct FakeDriver {
    state: Arc<Mutex<PageState>>,
}

impl FakeDriver {
    async fn settle(&self) {
        let latency = self.state.lock().unwrap().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn with_element<T>(&self, element: &ElementRef, f: impl FnOnce(&mut PageElement) -> T) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        state
            .elements
            .get_mut(element.id())
            .map(f)
            .ok_or_else(|| Error::StaleElement(element.id().to_string()))
    }
}

#[async_trait]
impl AutomationDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.settle().await;
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.events.push(PageEvent::Navigate(url.to_string()));
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        self.settle().await;
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn find(&mut self, selector: &str) -> Result<ElementRef> {
        self.settle().await;
        let state = self.state.lock().unwrap();
        state
            .by_selector
            .get(selector)
            .and_then(|ids| ids.first())
            .map(|id| ElementRef::new(id.clone()))
            .ok_or_else(|| Error::ElementNotFound(selector.to_string()))
    }

    async fn list_elements(&mut self, selector: &str) -> Result<Vec<ElementRef>> {
        self.settle().await;
        let state = self.state.lock().unwrap();
        Ok(state
            .by_selector
            .get(selector)
            .map(|ids| ids.iter().cloned().map(ElementRef).collect())
            .unwrap_or_default())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        self.settle().await;
        let target = self.with_element(element, |el| {
            if el.toggles {
                el.selected = !el.selected;
            }
            el.navigates_to.clone()
        })?;

        let mut state = self.state.lock().unwrap();
        state.clicks.push(element.id().to_string());
        state.events.push(PageEvent::Click(element.id().to_string()));
        if let Some(url) = target {
            state.url = url;
        }
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<()> {
        self.settle().await;
        self.with_element(element, |_| ())?;
        self.state
            .lock()
            .unwrap()
            .typed
            .insert(element.id().to_string(), text.to_string());
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementRef) -> Result<String> {
        self.settle().await;
        self.with_element(element, |el| el.text.clone())
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        self.settle().await;
        self.with_element(element, |el| el.attrs.get(name).cloned())
    }

    async fn is_selected(&mut self, element: &ElementRef) -> Result<bool> {
        self.settle().await;
        self.with_element(element, |el| el.selected)
    }

    async fn close_session(&mut self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}
