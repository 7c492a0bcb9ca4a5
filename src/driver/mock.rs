//! Scripted in-memory session for exercising the flow executors

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{
    BrowserSession, DriverError, DriverResult, ElementRef, Locator, SessionFactory, SessionOptions,
};

/// Result of one scripted engine action
#[derive(Debug, Clone)]
pub enum Behavior {
    Ok,
    Fail(String),
    Panic,
}

/// Result of a scripted lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(ElementRef),
    NotFound,
    Timeout,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct MockElement {
    pub href: Option<String>,
    pub native_click: Behavior,
    pub script_click: Behavior,
}

impl MockElement {
    pub fn ok() -> Self {
        Self {
            href: None,
            native_click: Behavior::Ok,
            script_click: Behavior::Ok,
        }
    }

    pub fn link(href: &str) -> Self {
        Self {
            href: Some(href.to_string()),
            ..Self::ok()
        }
    }

    pub fn native_click(mut self, behavior: Behavior) -> Self {
        self.native_click = behavior;
        self
    }

    pub fn script_click(mut self, behavior: Behavior) -> Self {
        self.script_click = behavior;
        self
    }
}

#[derive(Default)]
struct MockState {
    elements: Vec<MockElement>,
    finds: HashMap<Locator, Lookup>,
    find_alls: HashMap<Locator, VecDeque<Vec<ElementRef>>>,
    find_all_errors: HashMap<Locator, String>,
    waits: HashMap<Locator, Lookup>,
    navigate_failure: Option<String>,
    url: String,
    calls: Vec<String>,
}

/// Cloneable handle to a shared scripted session
#[derive(Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(&self, element: MockElement) -> ElementRef {
        let mut state = self.state.lock().unwrap();
        state.elements.push(element);
        ElementRef(state.elements.len() - 1)
    }

    pub fn on_find(&self, locator: &Locator, lookup: Lookup) {
        self.state
            .lock()
            .unwrap()
            .finds
            .insert(locator.clone(), lookup);
    }

    /// Queue successive `find_elements` results; the last one repeats
    pub fn on_find_all(&self, locator: &Locator, results: Vec<Vec<ElementRef>>) {
        self.state
            .lock()
            .unwrap()
            .find_alls
            .insert(locator.clone(), results.into());
    }

    pub fn fail_find_all(&self, locator: &Locator, message: &str) {
        self.state
            .lock()
            .unwrap()
            .find_all_errors
            .insert(locator.clone(), message.to_string());
    }

    pub fn on_wait(&self, locator: &Locator, lookup: Lookup) {
        self.state
            .lock()
            .unwrap()
            .waits
            .insert(locator.clone(), lookup);
    }

    pub fn fail_navigation(&self, message: &str) {
        self.state.lock().unwrap().navigate_failure = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn element(&self, element: &ElementRef) -> DriverResult<MockElement> {
        self.state
            .lock()
            .unwrap()
            .elements
            .get(element.0)
            .cloned()
            .ok_or_else(|| DriverError::Engine(format!("stale element handle #{}", element.0)))
    }

    fn resolve(locator: &Locator, lookup: Option<Lookup>) -> DriverResult<ElementRef> {
        match lookup.unwrap_or(Lookup::NotFound) {
            Lookup::Found(el) => Ok(el),
            Lookup::NotFound => Err(DriverError::not_found(locator)),
            Lookup::Timeout => Err(DriverError::Timeout {
                locator: locator.to_string(),
                waited: Duration::from_secs(10),
            }),
            Lookup::Error(msg) => Err(DriverError::Engine(msg)),
        }
    }

    fn act(behavior: Behavior) -> DriverResult<()> {
        match behavior {
            Behavior::Ok => Ok(()),
            Behavior::Fail(msg) => Err(DriverError::Engine(msg)),
            Behavior::Panic => panic!("engine connection dropped"),
        }
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.log(format!("navigate {}", url));
        let mut state = self.state.lock().unwrap();
        if let Some(msg) = state.navigate_failure.clone() {
            return Err(DriverError::Engine(msg));
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn find_element(&self, locator: &Locator) -> DriverResult<ElementRef> {
        self.log(format!("find {}", locator));
        let lookup = self.state.lock().unwrap().finds.get(locator).cloned();
        Self::resolve(locator, lookup)
    }

    async fn find_elements(&self, locator: &Locator) -> DriverResult<Vec<ElementRef>> {
        self.log(format!("find_all {}", locator));
        let mut state = self.state.lock().unwrap();
        if let Some(msg) = state.find_all_errors.get(locator) {
            return Err(DriverError::Engine(msg.clone()));
        }
        let Some(queue) = state.find_alls.get_mut(locator) else {
            return Ok(Vec::new());
        };
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> DriverResult<Option<String>> {
        let el = self.element(element)?;
        Ok(match name {
            "href" => el.href,
            _ => None,
        })
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> DriverResult<()> {
        self.log(format!("scroll #{}", element.0));
        self.element(element).map(|_| ())
    }

    async fn click(&self, element: &ElementRef) -> DriverResult<()> {
        self.log(format!("click #{}", element.0));
        Self::act(self.element(element)?.native_click)
    }

    async fn script_click(&self, element: &ElementRef) -> DriverResult<()> {
        self.log(format!("script_click #{}", element.0));
        Self::act(self.element(element)?.script_click)
    }

    async fn wait_until_clickable(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> DriverResult<ElementRef> {
        self.log(format!("wait {}", locator));
        let lookup = self.state.lock().unwrap().waits.get(locator).cloned();
        Self::resolve(locator, lookup)
    }

    async fn quit(&self) -> DriverResult<()> {
        self.log("quit".to_string());
        Ok(())
    }
}

/// Factory handing out clones of one scripted session
#[derive(Clone, Default)]
pub struct MockFactory {
    pub session: MockSession,
    pub failure: Option<String>,
    pub opened: Arc<Mutex<Vec<SessionOptions>>>,
}

impl MockFactory {
    pub fn new(session: MockSession) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn open(&self, options: &SessionOptions) -> anyhow::Result<Box<dyn BrowserSession>> {
        self.opened.lock().unwrap().push(options.clone());
        if let Some(ref msg) = self.failure {
            anyhow::bail!("{}", msg);
        }
        Ok(Box::new(self.session.clone()))
    }
}
