//! Scripted page used by the unit tests in this crate.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, AdapterErrorKind, Anchor, Cdp, CookieParam, KeyPress, Rect};
use parking_lot::Mutex;
use serde_json::Value;

use crate::session::BrowserPage;

#[derive(Default)]
struct State {
    url: String,
    title: String,
    body: String,
    dom: HashMap<String, Vec<Anchor>>,
    pages: Vec<(String, String, String)>,
    scripts: Vec<(String, Value)>,
    events: Vec<String>,
    cookies: Vec<CookieParam>,
    fail_navigation: bool,
    fail_screenshot: bool,
}

#[derive(Default)]
pub struct FakePage {
    state: Mutex<State>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor(index: usize, text: &str) -> Anchor {
        Anchor {
            index,
            rect: Rect {
                x: 100.0,
                y: 100.0 + 40.0 * index as f64,
                width: 120.0,
                height: 32.0,
            },
            visible: true,
            text: text.to_string(),
            href: None,
        }
    }

    pub fn link(index: usize, href: &str) -> Anchor {
        Anchor {
            href: Some(href.to_string()),
            ..Self::anchor(index, "")
        }
    }

    pub fn hidden(index: usize) -> Anchor {
        Anchor {
            visible: false,
            ..Self::anchor(index, "")
        }
    }

    pub fn put(&self, selector: &str, anchors: Vec<Anchor>) {
        self.state.lock().dom.insert(selector.to_string(), anchors);
    }

    /// Navigating to a url containing `needle` shows `title` and `body`.
    pub fn on_page(&self, needle: &str, title: &str, body: &str) {
        self.state
            .lock()
            .pages
            .push((needle.to_string(), title.to_string(), body.to_string()));
    }

    /// `evaluate` returns `value` for expressions containing `needle`.
    pub fn on_script(&self, needle: &str, value: Value) {
        self.state
            .lock()
            .scripts
            .push((needle.to_string(), value));
    }

    pub fn fail_navigation(&self) {
        self.state.lock().fail_navigation = true;
    }

    pub fn fail_screenshot(&self) {
        self.state.lock().fail_screenshot = true;
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    pub fn cookie_names(&self) -> Vec<String> {
        self.state
            .lock()
            .cookies
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    fn record(&self, event: String) {
        self.state.lock().events.push(event);
    }
}

#[async_trait]
impl Cdp for FakePage {
    async fn navigate(&self, url: &str, _deadline: Duration) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        if state.fail_navigation {
            return Err(AdapterError::new(AdapterErrorKind::NavTimeout).with_hint(url.to_string()));
        }
        state.events.push(format!("navigate:{url}"));
        state.url = url.to_string();
        let page = state
            .pages
            .iter()
            .find(|(needle, _, _)| url.contains(needle.as_str()))
            .map(|(_, title, body)| (title.clone(), body.clone()));
        let (title, body) = page.unwrap_or_else(|| ("Shop".into(), String::new()));
        state.title = title;
        state.body = body;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> Result<String, AdapterError> {
        Ok(self.state.lock().title.clone())
    }

    async fn body_text(&self, limit: usize) -> Result<String, AdapterError> {
        Ok(self.state.lock().body.chars().take(limit).collect())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        let state = self.state.lock();
        Ok(state
            .scripts
            .iter()
            .find(|(needle, _)| expression.contains(needle.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    async fn query(&self, selector: &str) -> Result<Vec<Anchor>, AdapterError> {
        Ok(self
            .state
            .lock()
            .dom
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn scroll_into_view(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<Rect>, AdapterError> {
        Ok(self
            .state
            .lock()
            .dom
            .get(selector)
            .and_then(|anchors| anchors.iter().find(|a| a.index == index))
            .map(|a| a.rect))
    }

    async fn focus(&self, selector: &str, index: usize) -> Result<bool, AdapterError> {
        self.record(format!("focus:{selector}#{index}"));
        Ok(true)
    }

    async fn set_value(
        &self,
        selector: &str,
        index: usize,
        value: &str,
    ) -> Result<bool, AdapterError> {
        self.record(format!("value:{selector}#{index}={value}"));
        Ok(true)
    }

    async fn mouse_move(&self, _x: f64, _y: f64) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64, _hold: Duration) -> Result<(), AdapterError> {
        self.record(format!("click:{},{}", x.round(), y.round()));
        Ok(())
    }

    async fn mouse_wheel(&self, _x: f64, _y: f64, delta_y: f64) -> Result<(), AdapterError> {
        self.record(format!("wheel:{}", delta_y.round()));
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<(), AdapterError> {
        self.record(format!("text:{text}"));
        Ok(())
    }

    async fn press_key(&self, key: KeyPress) -> Result<(), AdapterError> {
        self.record(format!("key:{key:?}"));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        if self.state.lock().fail_screenshot {
            return Err(AdapterError::new(AdapterErrorKind::CdpIo).with_hint("page crashed"));
        }
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn set_cookies(&self, cookies: &[CookieParam]) -> Result<(), AdapterError> {
        self.state.lock().cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieParam>, AdapterError> {
        Ok(self.state.lock().cookies.clone())
    }

    async fn add_init_script(&self, _source: &str) -> Result<(), AdapterError> {
        self.record("init_script".into());
        Ok(())
    }

    async fn set_user_agent(
        &self,
        _user_agent: &str,
        _accept_language: Option<&str>,
        _platform: Option<&str>,
        _locale: Option<&str>,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn set_timezone(&self, _timezone: &str) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn set_device_metrics(
        &self,
        _width: u32,
        _height: u32,
        _scale: f64,
        _mobile: bool,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn set_extra_headers(&self, _headers: &[(String, String)]) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    fn cdp(&self) -> &dyn Cdp {
        self
    }

    async fn release(&self) {
        self.record("release".into());
    }
}
