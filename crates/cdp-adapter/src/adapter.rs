use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::RwLock;
use serde_json::{json, Number, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::commands::{Anchor, CookieParam, KeyPress, Rect};
use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget};

const READY_POLL: Duration = Duration::from_millis(120);

/// Page-scoped browser primitives. One implementor drives exactly one tab.
#[async_trait]
pub trait Cdp: Send + Sync {
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError>;
    async fn current_url(&self) -> Result<String, AdapterError>;
    async fn title(&self) -> Result<String, AdapterError>;
    /// Visible body text, truncated to `limit` characters.
    async fn body_text(&self, limit: usize) -> Result<String, AdapterError>;
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError>;
    async fn query(&self, selector: &str) -> Result<Vec<Anchor>, AdapterError>;
    /// Scrolls the `index`-th match into view and returns its fresh box.
    async fn scroll_into_view(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<Rect>, AdapterError>;
    async fn focus(&self, selector: &str, index: usize) -> Result<bool, AdapterError>;
    /// Sets an input's value and fires input/change events.
    async fn set_value(
        &self,
        selector: &str,
        index: usize,
        value: &str,
    ) -> Result<bool, AdapterError>;
    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), AdapterError>;
    async fn mouse_click(&self, x: f64, y: f64, hold: Duration) -> Result<(), AdapterError>;
    async fn mouse_wheel(&self, x: f64, y: f64, delta_y: f64) -> Result<(), AdapterError>;
    async fn insert_text(&self, text: &str) -> Result<(), AdapterError>;
    async fn press_key(&self, key: KeyPress) -> Result<(), AdapterError>;
    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError>;
    async fn set_cookies(&self, cookies: &[CookieParam]) -> Result<(), AdapterError>;
    async fn cookies(&self) -> Result<Vec<CookieParam>, AdapterError>;
    /// Registers a script evaluated before any page script on every navigation.
    async fn add_init_script(&self, source: &str) -> Result<(), AdapterError>;
    async fn set_user_agent(
        &self,
        user_agent: &str,
        accept_language: Option<&str>,
        platform: Option<&str>,
        locale: Option<&str>,
    ) -> Result<(), AdapterError>;
    async fn set_timezone(&self, timezone: &str) -> Result<(), AdapterError>;
    async fn set_device_metrics(
        &self,
        width: u32,
        height: u32,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Result<(), AdapterError>;
    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<(), AdapterError>;
}

pub struct CdpAdapter {
    cfg: CdpConfig,
    transport: Arc<dyn CdpTransport>,
    session: RwLock<Option<String>>,
}

impl CdpAdapter {
    pub fn new(cfg: CdpConfig) -> Self {
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg.clone()));
        Self::with_transport(cfg, transport)
    }

    pub fn with_transport(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            cfg,
            transport,
            session: RwLock::new(None),
        }
    }

    /// Launches (or connects to) a browser and attaches to a fresh page.
    pub async fn launch(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let adapter = Self::new(cfg);
        adapter.start().await?;
        Ok(adapter)
    }

    pub fn config(&self) -> &CdpConfig {
        &self.cfg
    }

    pub async fn start(&self) -> Result<(), AdapterError> {
        self.transport.start().await?;
        self.open_page().await
    }

    pub async fn shutdown(&self) {
        self.session.write().take();
        self.transport.shutdown().await;
        info!(target: "cdp-adapter", "browser released");
    }

    async fn open_page(&self) -> Result<(), AdapterError> {
        let created = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("createTarget missing targetId")
            })?
            .to_string();

        let attached = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = attached
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("attachToTarget missing sessionId")
            })?
            .to_string();
        *self.session.write() = Some(session);

        for domain in ["Page.enable", "Runtime.enable", "Network.enable"] {
            self.send_page_command(domain, json!({})).await?;
        }
        debug!(target: "cdp-adapter", %target_id, "page attached");
        Ok(())
    }

    async fn send_page_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let session = self.session.read().clone().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint("no page session attached")
        })?;
        self.transport
            .send_command(CommandTarget::Session(session), method, params)
            .await
    }

    async fn dispatch_mouse_event(&self, payload: Value) -> Result<(), AdapterError> {
        self.send_page_command("Input.dispatchMouseEvent", payload)
            .await
            .map(|_| ())
    }

    async fn wait_for_dom_ready(&self, deadline_at: Instant) -> Result<(), AdapterError> {
        loop {
            let state = self.evaluate("document.readyState").await.ok();
            if matches!(
                state.as_ref().and_then(|v| v.as_str()),
                Some("interactive") | Some("complete")
            ) {
                return Ok(());
            }
            if Instant::now() >= deadline_at {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint("document never became ready")
                    .retriable(true));
            }
            sleep(READY_POLL).await;
        }
    }

    /// Runs `body` against the `index`-th element matching `selector`.
    /// The snippet sees the element as `el` and must return a value.
    async fn with_element(
        &self,
        selector: &str,
        index: usize,
        body: &str,
    ) -> Result<Value, AdapterError> {
        let selector_literal = js_string(selector)?;
        let expression = format!(
            "(() => {{\n  let list;\n  try {{ list = document.querySelectorAll({selector_literal}); }} catch (e) {{ return null; }}\n  const el = list[{index}];\n  if (!el) {{ return null; }}\n  {body}\n}})()"
        );
        self.evaluate(&expression).await
    }
}

fn js_string(raw: &str) -> Result<String, AdapterError> {
    serde_json::to_string(raw)
        .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
}

fn parse_rect(value: &Value) -> Option<Rect> {
    Some(Rect {
        x: value.get("x")?.as_f64()?,
        y: value.get("y")?.as_f64()?,
        width: value.get("width")?.as_f64()?,
        height: value.get("height")?.as_f64()?,
    })
}

const QUERY_TEMPLATE: &str = r#"(() => {
  let list;
  try { list = document.querySelectorAll(__SELECTOR__); } catch (e) { return []; }
  return Array.from(list, (el, index) => {
    const r = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const visible = r.width > 0 && r.height > 0 &&
      style.visibility !== 'hidden' && style.display !== 'none' && style.opacity !== '0';
    return {
      index,
      x: r.left, y: r.top, width: r.width, height: r.height,
      visible,
      text: (el.innerText || el.value || el.getAttribute('aria-label') || '').trim().slice(0, 200),
      href: el.href || el.getAttribute('href') || null
    };
  });
})()"#;

#[async_trait]
impl Cdp for CdpAdapter {
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<(), AdapterError> {
        let started = Instant::now();
        let response = self
            .send_page_command("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = response.get("errorText").and_then(|v| v.as_str()) {
            if !error_text.is_empty() {
                return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint(format!("navigation to {url} failed: {error_text}"))
                    .retriable(true));
            }
        }
        self.wait_for_dom_ready(started + deadline).await?;
        debug!(target: "cdp-adapter", %url, elapsed_ms = started.elapsed().as_millis() as u64, "navigated");
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        let value = self.evaluate("location.href").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn title(&self) -> Result<String, AdapterError> {
        let value = self.evaluate("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn body_text(&self, limit: usize) -> Result<String, AdapterError> {
        let expression =
            format!("(document.body ? document.body.innerText : '').slice(0, {limit})");
        let value = self.evaluate(&expression).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send_page_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            return Err(AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("evaluate raised exception")
                .with_data(details.clone()));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn query(&self, selector: &str) -> Result<Vec<Anchor>, AdapterError> {
        let expression = QUERY_TEMPLATE.replace("__SELECTOR__", &js_string(selector)?);
        let value = self.evaluate(&expression).await?;
        let entries = value.as_array().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal)
                .with_hint("query did not return an array value")
        })?;

        let mut anchors = Vec::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let rect = parse_rect(entry).ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("query entry missing geometry")
            })?;
            anchors.push(Anchor {
                index: entry
                    .get("index")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as usize)
                    .unwrap_or(position),
                rect,
                visible: entry.get("visible").and_then(|v| v.as_bool()).unwrap_or(false),
                text: entry
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                href: entry
                    .get("href")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            });
        }
        Ok(anchors)
    }

    async fn scroll_into_view(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<Rect>, AdapterError> {
        let value = self
            .with_element(
                selector,
                index,
                "el.scrollIntoView({block: 'center', inline: 'center'});\n  const r = el.getBoundingClientRect();\n  return { x: r.left, y: r.top, width: r.width, height: r.height };",
            )
            .await?;
        Ok(parse_rect(&value))
    }

    async fn focus(&self, selector: &str, index: usize) -> Result<bool, AdapterError> {
        let value = self
            .with_element(selector, index, "el.focus(); return document.activeElement === el;")
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn set_value(
        &self,
        selector: &str,
        index: usize,
        value: &str,
    ) -> Result<bool, AdapterError> {
        let literal = js_string(value)?;
        let body = format!(
            "el.focus();\n  const proto = Object.getPrototypeOf(el);\n  const desc = Object.getOwnPropertyDescriptor(proto, 'value');\n  if (desc && desc.set) {{ desc.set.call(el, {literal}); }} else {{ el.value = {literal}; }}\n  el.dispatchEvent(new Event('input', {{ bubbles: true }}));\n  el.dispatchEvent(new Event('change', {{ bubbles: true }}));\n  el.blur();\n  return true;"
        );
        let result = self.with_element(selector, index, &body).await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<(), AdapterError> {
        self.dispatch_mouse_event(json!({ "type": "mouseMoved", "x": x, "y": y }))
            .await
    }

    async fn mouse_click(&self, x: f64, y: f64, hold: Duration) -> Result<(), AdapterError> {
        self.dispatch_mouse_event(json!({
            "type": "mousePressed",
            "x": x,
            "y": y,
            "button": "left",
            "clickCount": 1,
        }))
        .await?;
        sleep(hold).await;
        self.dispatch_mouse_event(json!({
            "type": "mouseReleased",
            "x": x,
            "y": y,
            "button": "left",
            "clickCount": 1,
        }))
        .await
    }

    async fn mouse_wheel(&self, x: f64, y: f64, delta_y: f64) -> Result<(), AdapterError> {
        self.dispatch_mouse_event(json!({
            "type": "mouseWheel",
            "x": x,
            "y": y,
            "deltaX": 0,
            "deltaY": delta_y,
        }))
        .await
    }

    async fn insert_text(&self, text: &str) -> Result<(), AdapterError> {
        self.send_page_command("Input.insertText", json!({ "text": text }))
            .await
            .map(|_| ())
    }

    async fn press_key(&self, key: KeyPress) -> Result<(), AdapterError> {
        let (name, code, vk, text) = key.descriptor();
        let modifiers = if key == KeyPress::SelectAll { 2 } else { 0 };
        let mut down = json!({
            "type": "keyDown",
            "key": name,
            "code": code,
            "windowsVirtualKeyCode": vk,
            "modifiers": modifiers,
        });
        if let Some(text) = text {
            down["text"] = Value::String(text.to_string());
        }
        self.send_page_command("Input.dispatchKeyEvent", down).await?;
        self.send_page_command(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": name,
                "code": code,
                "windowsVirtualKeyCode": vk,
                "modifiers": modifiers,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AdapterError> {
        let response = self
            .send_page_command("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        let data = response
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("missing screenshot data")
            })?;
        STANDARD
            .decode(data)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }

    async fn set_cookies(&self, cookies: &[CookieParam]) -> Result<(), AdapterError> {
        if cookies.is_empty() {
            return Ok(());
        }

        let payload: Vec<Value> = cookies
            .iter()
            .map(|cookie| {
                let mut map = serde_json::Map::new();
                map.insert("name".into(), Value::String(cookie.name.clone()));
                map.insert("value".into(), Value::String(cookie.value.clone()));
                if let Some(domain) = cookie.domain.as_ref() {
                    map.insert("domain".into(), Value::String(domain.clone()));
                }
                if let Some(path) = cookie.path.as_ref() {
                    map.insert("path".into(), Value::String(path.clone()));
                }
                if let Some(url) = cookie.url.as_ref() {
                    map.insert("url".into(), Value::String(url.clone()));
                }
                // Negative expiry marks a session cookie in the state file.
                if let Some(expires) = cookie.expires.filter(|e| *e > 0.0) {
                    if let Some(number) = Number::from_f64(expires) {
                        map.insert("expires".into(), Value::Number(number));
                    }
                }
                if let Some(flag) = cookie.http_only {
                    map.insert("httpOnly".into(), Value::Bool(flag));
                }
                if let Some(flag) = cookie.secure {
                    map.insert("secure".into(), Value::Bool(flag));
                }
                if let Some(site) = cookie.same_site.as_ref() {
                    map.insert("sameSite".into(), Value::String(site.clone()));
                }
                Value::Object(map)
            })
            .collect();

        self.send_page_command("Network.setCookies", json!({ "cookies": payload }))
            .await?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieParam>, AdapterError> {
        let response = self
            .transport
            .send_command(CommandTarget::Browser, "Storage.getCookies", json!({}))
            .await?;
        let raw = response.get("cookies").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(raw)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }

    async fn add_init_script(&self, source: &str) -> Result<(), AdapterError> {
        self.send_page_command(
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": source }),
        )
        .await
        .map(|_| ())
    }

    async fn set_user_agent(
        &self,
        user_agent: &str,
        accept_language: Option<&str>,
        platform: Option<&str>,
        locale: Option<&str>,
    ) -> Result<(), AdapterError> {
        let mut params = serde_json::Map::new();
        params.insert("userAgent".into(), Value::String(user_agent.to_string()));
        if let Some(lang) = accept_language {
            params.insert("acceptLanguage".into(), Value::String(lang.to_string()));
        }
        if let Some(platform) = platform {
            params.insert("platform".into(), Value::String(platform.to_string()));
        }
        self.send_page_command("Emulation.setUserAgentOverride", Value::Object(params))
            .await?;

        if let Some(locale) = locale {
            self.send_page_command("Emulation.setLocaleOverride", json!({ "locale": locale }))
                .await?;
        }
        Ok(())
    }

    async fn set_timezone(&self, timezone: &str) -> Result<(), AdapterError> {
        self.send_page_command(
            "Emulation.setTimezoneOverride",
            json!({ "timezoneId": timezone }),
        )
        .await
        .map(|_| ())
    }

    async fn set_device_metrics(
        &self,
        width: u32,
        height: u32,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Result<(), AdapterError> {
        self.send_page_command(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": device_scale_factor,
                "mobile": mobile,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<(), AdapterError> {
        if headers.is_empty() {
            return Ok(());
        }
        let map: serde_json::Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.send_page_command(
            "Network.setExtraHTTPHeaders",
            json!({ "headers": Value::Object(map) }),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MockTransport {
        commands: Mutex<Vec<(CommandTarget, String, Value)>>,
        responses: Mutex<HashMap<String, VecDeque<Value>>>,
    }

    impl MockTransport {
        async fn respond(&self, method: &str, value: Value) {
            self.responses
                .lock()
                .await
                .entry(method.to_string())
                .or_default()
                .push_back(value);
        }

        async fn commands(&self) -> Vec<(CommandTarget, String, Value)> {
            self.commands.lock().await.clone()
        }

        async fn sent(&self, method: &str) -> Vec<Value> {
            self.commands()
                .await
                .into_iter()
                .filter(|(_, m, _)| m == method)
                .map(|(_, _, p)| p)
                .collect()
        }
    }

    #[async_trait]
    impl CdpTransport for MockTransport {
        async fn start(&self) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn send_command(
            &self,
            target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            self.commands
                .lock()
                .await
                .push((target, method.to_string(), params));
            Ok(self
                .responses
                .lock()
                .await
                .get_mut(method)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(Value::Null))
        }

        async fn shutdown(&self) {}
    }

    async fn attached() -> (CdpAdapter, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::default());
        transport
            .respond("Target.createTarget", json!({ "targetId": "T1" }))
            .await;
        transport
            .respond("Target.attachToTarget", json!({ "sessionId": "S1" }))
            .await;
        let adapter = CdpAdapter::with_transport(
            CdpConfig::default(),
            transport.clone() as Arc<dyn CdpTransport>,
        );
        adapter.start().await.expect("start adapter");
        (adapter, transport)
    }

    #[tokio::test]
    async fn start_attaches_flattened_session() {
        let (_adapter, transport) = attached().await;
        let attach = transport.sent("Target.attachToTarget").await;
        assert_eq!(attach[0]["flatten"], true);
        assert_eq!(attach[0]["targetId"], "T1");

        let commands = transport.commands().await;
        let page_enable = commands
            .iter()
            .find(|(_, m, _)| m == "Page.enable")
            .expect("Page.enable sent");
        assert_eq!(page_enable.0, CommandTarget::Session("S1".into()));
    }

    #[tokio::test]
    async fn navigate_waits_for_ready_state() {
        let (adapter, transport) = attached().await;
        transport
            .respond("Page.navigate", json!({ "frameId": "F" }))
            .await;
        transport
            .respond("Runtime.evaluate", json!({ "result": { "value": "loading" } }))
            .await;
        transport
            .respond("Runtime.evaluate", json!({ "result": { "value": "complete" } }))
            .await;

        adapter
            .navigate("https://shop.test/", Duration::from_secs(5))
            .await
            .expect("navigate");
        assert_eq!(transport.sent("Runtime.evaluate").await.len(), 2);
    }

    #[tokio::test]
    async fn navigate_surfaces_error_text() {
        let (adapter, transport) = attached().await;
        transport
            .respond(
                "Page.navigate",
                json!({ "frameId": "F", "errorText": "net::ERR_NAME_NOT_RESOLVED" }),
            )
            .await;
        let err = adapter
            .navigate("https://nowhere.test/", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(err.retriable);
    }

    #[tokio::test]
    async fn query_parses_anchor_geometry() {
        let (adapter, transport) = attached().await;
        transport
            .respond(
                "Runtime.evaluate",
                json!({ "result": { "value": [
                    { "index": 0, "x": 10.0, "y": 20.0, "width": 100.0, "height": 30.0,
                      "visible": true, "text": "Add to cart", "href": null },
                    { "index": 1, "x": 0.0, "y": 0.0, "width": 0.0, "height": 0.0,
                      "visible": false, "text": "", "href": "https://shop.test/ip/1" }
                ] } }),
            )
            .await;

        let anchors = adapter.query("button").await.expect("query");
        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].rect.center(), (60.0, 35.0));
        assert!(anchors[0].visible);
        assert_eq!(anchors[0].text, "Add to cart");
        assert_eq!(anchors[1].href.as_deref(), Some("https://shop.test/ip/1"));
    }

    #[tokio::test]
    async fn evaluate_reports_exceptions() {
        let (adapter, transport) = attached().await;
        transport
            .respond(
                "Runtime.evaluate",
                json!({ "exceptionDetails": { "text": "ReferenceError" } }),
            )
            .await;
        let err = adapter.evaluate("nope()").await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Internal);
        assert!(err.data.is_some());
    }

    #[tokio::test]
    async fn click_dispatches_press_and_release() {
        let (adapter, transport) = attached().await;
        adapter
            .mouse_click(42.0, 24.0, Duration::from_millis(1))
            .await
            .expect("click");
        let events = transport.sent("Input.dispatchMouseEvent").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "mousePressed");
        assert_eq!(events[0]["x"], 42.0);
        assert_eq!(events[1]["type"], "mouseReleased");
    }

    #[tokio::test]
    async fn set_cookies_omits_session_expiry() {
        let (adapter, transport) = attached().await;
        let mut session_cookie = CookieParam::new("auth", "1");
        session_cookie.expires = Some(-1.0);
        session_cookie.domain = Some(".shop.test".into());
        let mut persistent = CookieParam::new("pref", "en");
        persistent.expires = Some(1_900_000_000.0);

        adapter
            .set_cookies(&[session_cookie, persistent])
            .await
            .expect("set cookies");
        let sent = transport.sent("Network.setCookies").await;
        let cookies = sent[0]["cookies"].as_array().unwrap();
        assert!(cookies[0].get("expires").is_none());
        assert_eq!(cookies[0]["domain"], ".shop.test");
        assert_eq!(cookies[1]["expires"], 1_900_000_000.0);
    }

    #[tokio::test]
    async fn cookies_are_read_from_browser_storage() {
        let (adapter, transport) = attached().await;
        transport
            .respond(
                "Storage.getCookies",
                json!({ "cookies": [
                    { "name": "auth", "value": "x", "domain": ".shop.test", "path": "/",
                      "expires": -1, "size": 5, "httpOnly": true, "secure": true,
                      "session": true, "sameSite": "Lax", "priority": "Medium" }
                ] }),
            )
            .await;
        let cookies = adapter.cookies().await.expect("cookies");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].http_only, Some(true));
        let (target, _, _) = transport
            .commands()
            .await
            .into_iter()
            .find(|(_, m, _)| m == "Storage.getCookies")
            .unwrap();
        assert_eq!(target, CommandTarget::Browser);
    }

    #[tokio::test]
    async fn user_agent_override_sets_locale() {
        let (adapter, transport) = attached().await;
        adapter
            .set_user_agent("UA/1.0", Some("en-CA,en"), Some("MacIntel"), Some("en-CA"))
            .await
            .expect("ua");
        let ua = transport.sent("Emulation.setUserAgentOverride").await;
        assert_eq!(ua[0]["userAgent"], "UA/1.0");
        assert_eq!(ua[0]["platform"], "MacIntel");
        let locale = transport.sent("Emulation.setLocaleOverride").await;
        assert_eq!(locale[0]["locale"], "en-CA");
    }

    #[tokio::test]
    async fn enter_key_carries_carriage_return() {
        let (adapter, transport) = attached().await;
        adapter.press_key(KeyPress::Enter).await.expect("enter");
        let keys = transport.sent("Input.dispatchKeyEvent").await;
        assert_eq!(keys[0]["type"], "keyDown");
        assert_eq!(keys[0]["text"], "\r");
        assert_eq!(keys[1]["type"], "keyUp");
    }

    #[tokio::test]
    async fn commands_without_session_fail() {
        let adapter = CdpAdapter::with_transport(
            CdpConfig::default(),
            Arc::new(MockTransport::default()) as Arc<dyn CdpTransport>,
        );
        let err = adapter.title().await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Internal);
    }
}
