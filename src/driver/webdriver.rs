//! W3C WebDriver client
//!
//! Speaks the WebDriver wire protocol over HTTP to chromedriver or an Appium
//! server. Only the handful of endpoints the site adapter needs are covered.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{capabilities, AutomationDriver, ElementRef};
use crate::config::{DriverConfig, RiskControlConfig};
use crate::error::{Error, Result};

/// Key under which W3C servers return element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Pre-W3C (JSON Wire) element key, still sent by some Appium setups
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

const JS_CLICK: &str = "arguments[0].click();";

/// An open WebDriver session
pub struct WebDriverSession {
    client: Client,
    base: Url,
    session_id: String,
    closed: bool,
}

impl WebDriverSession {
    /// Open a session (single attempt)
    pub async fn open(driver: &DriverConfig, risk: &RiskControlConfig) -> Result<Self> {
        let base = base_url(&driver.endpoint)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(driver.request_timeout_ms))
            .build()
            .map_err(|e| Error::Session(format!("Failed to create HTTP client: {}", e)))?;

        let url = base
            .join("session")
            .map_err(|e| Error::Config(format!("Invalid driver endpoint: {}", e)))?;
        let body = capabilities::build(driver, risk);

        debug!("Requesting {:?} session from {}", driver.backend, base);

        let response = client.post(url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let value = parse_response(status, &text)?;

        // W3C puts the id inside `value`, JSON Wire next to it
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .or_else(|| legacy_session_id(&text))
            .ok_or_else(|| Error::Session(format!("No session id in response: {}", text)))?;

        info!("WebDriver session {} opened at {}", session_id, base);

        Ok(Self {
            client,
            base,
            session_id,
            closed: false,
        })
    }

    /// Open a session, retrying transport failures with exponential backoff
    /// for up to `driver.session_retry_ms`
    pub async fn open_with_retry(driver: &DriverConfig, risk: &RiskControlConfig) -> Result<Self> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(4),
            max_elapsed_time: Some(Duration::from_millis(driver.session_retry_ms)),
            ..Default::default()
        };

        retry(backoff, || async move {
            match Self::open(driver, risk).await {
                Ok(session) => Ok(session),
                Err(e) if e.is_transient_transport() => {
                    warn!("Opening driver session failed, retrying: {}", e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
        .map_err(|e| match e {
            Error::Session(_) | Error::Config(_) => e,
            other => Error::Session(other.to_string()),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let path = if path.is_empty() {
            format!("session/{}", self.session_id)
        } else {
            format!("session/{}/{}", self.session_id, path)
        };
        self.base
            .join(&path)
            .map_err(|e| Error::Internal(format!("Bad WebDriver path '{}': {}", path, e)))
    }

    /// Send one command and return its `value`
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = self.endpoint(path)?;
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        parse_response(status, &text)
    }

    async fn element_command(
        &self,
        method: Method,
        element: &ElementRef,
        action: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let path = format!("element/{}/{}", element.id(), action);
        self.command(method, &path, body)
            .await
            .map_err(|e| match e {
                Error::StaleElement(_) => Error::StaleElement(element.id().to_string()),
                other => other,
            })
    }

    async fn js_click(&self, element: &ElementRef) -> Result<()> {
        let body = json!({
            "script": JS_CLICK,
            "args": [{ ELEMENT_KEY: element.id() }],
        });
        self.command(Method::POST, "execute/sync", Some(body)).await?;
        Ok(())
    }
}

#[async_trait]
impl AutomationDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        let value = self.command(Method::GET, "url", None).await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| Error::Driver(format!("Unexpected url value: {}", value)))
    }

    async fn find(&mut self, selector: &str) -> Result<ElementRef> {
        let body = json!({ "using": "css selector", "value": selector });
        let value = self
            .command(Method::POST, "element", Some(body))
            .await
            .map_err(|e| match e {
                Error::ElementNotFound(_) => Error::ElementNotFound(selector.to_string()),
                other => other,
            })?;

        element_id(&value)
            .map(ElementRef)
            .ok_or_else(|| Error::Driver(format!("Malformed element for '{}': {}", selector, value)))
    }

    async fn list_elements(&mut self, selector: &str) -> Result<Vec<ElementRef>> {
        let body = json!({ "using": "css selector", "value": selector });
        let value = self.command(Method::POST, "elements", Some(body)).await?;

        let items = value
            .as_array()
            .ok_or_else(|| Error::Driver(format!("Expected element list, got {}", value)))?;
        Ok(items.iter().filter_map(element_id).map(ElementRef).collect())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        match self
            .element_command(Method::POST, element, "click", Some(json!({})))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_click_blocked(&e) => {
                // Overlays on the mobile layout swallow native clicks
                debug!("Native click blocked ({}), falling back to script click", e);
                self.js_click(element).await
            }
            Err(e) => Err(e),
        }
    }

    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<()> {
        self.element_command(Method::POST, element, "clear", Some(json!({})))
            .await?;
        self.element_command(Method::POST, element, "value", Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementRef) -> Result<String> {
        let value = self
            .element_command(Method::GET, element, "text", None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        let value = self
            .element_command(Method::GET, element, &format!("attribute/{}", name), None)
            .await?;
        Ok(value.as_str().map(String::from))
    }

    async fn is_selected(&mut self, element: &ElementRef) -> Result<bool> {
        let value = self
            .element_command(Method::GET, element, "selected", None)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn close_session(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.command(Method::DELETE, "", None).await?;
        self.closed = true;
        info!("WebDriver session {} closed", self.session_id);
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "WebDriver session {} dropped without being closed",
                self.session_id
            );
        }
    }
}

/// Endpoint as a base URL that relative paths can be joined onto
fn base_url(endpoint: &str) -> Result<Url> {
    let trimmed = endpoint.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    Url::parse(&with_slash)
        .map_err(|e| Error::Config(format!("Invalid driver endpoint '{}': {}", endpoint, e)))
}

/// Decode a response body, turning wire-level errors into [`Error`] kinds
fn parse_response(status: StatusCode, body: &str) -> Result<Value> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) if status.is_success() => return Ok(Value::Null),
        Err(_) => {
            return Err(Error::Driver(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )))
        }
    };

    let value = parsed.get("value").cloned().unwrap_or(Value::Null);

    if let Some(code) = value.get("error").and_then(Value::as_str) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(map_wire_error(code, message));
    }

    // JSON Wire signals failure with a non-zero numeric status
    if let Some(legacy) = parsed.get("status").and_then(Value::as_i64) {
        if legacy != 0 {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(map_wire_error(legacy_code(legacy), message));
        }
    }

    if !status.is_success() {
        return Err(Error::Driver(format!("HTTP {}: {}", status, value)));
    }

    Ok(value)
}

/// Map a W3C error code onto the crate's error kinds
pub fn map_wire_error(code: &str, message: &str) -> Error {
    let first_line = message.lines().next().unwrap_or_default().to_string();
    match code {
        "no such element" => Error::ElementNotFound(first_line),
        "stale element reference" => Error::StaleElement(first_line),
        "timeout" | "script timeout" => Error::Timeout(first_line),
        "invalid session id" | "session not created" => {
            Error::Session(format!("{}: {}", code, first_line))
        }
        _ => Error::Driver(format!("{}: {}", code, first_line)),
    }
}

fn legacy_code(status: i64) -> &'static str {
    match status {
        6 => "invalid session id",
        7 => "no such element",
        10 => "stale element reference",
        21 => "timeout",
        28 => "script timeout",
        33 => "session not created",
        _ => "unknown error",
    }
}

fn legacy_session_id(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("sessionId")?
        .as_str()
        .filter(|id| !id.is_empty())
        .map(String::from)
}

fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(String::from)
}

fn is_click_blocked(error: &Error) -> bool {
    matches!(
        error,
        Error::Driver(msg)
            if msg.starts_with("element click intercepted")
                || msg.starts_with("element not interactable")
    )
}
