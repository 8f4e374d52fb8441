//! Automation driver abstraction
//!
//! The orchestrator never talks to a browser directly. Everything goes
//! through [`AutomationDriver`]: navigate, locate, interact, wait. Backends:
//! - `webdriver`: W3C WebDriver wire protocol, used for both desktop Chrome
//!   (chromedriver) and mobile Chrome (Appium), picked by configuration.

pub mod capabilities;
pub mod webdriver;

pub use webdriver::WebDriverSession;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Delay between lookups while waiting for an element or URL
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Opaque reference to an element in the current page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// One open automation session.
///
/// Methods take `&mut self`: a session is used by exactly one caller at a
/// time. Share it through [`SharedDriver`].
#[async_trait]
pub trait AutomationDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    /// Single lookup, fails with [`Error::ElementNotFound`]
    async fn find(&mut self, selector: &str) -> Result<ElementRef>;

    /// All matches in document order, possibly none
    async fn list_elements(&mut self, selector: &str) -> Result<Vec<ElementRef>>;

    async fn click(&mut self, element: &ElementRef) -> Result<()>;

    /// Replace the content of an input field
    async fn send_keys(&mut self, element: &ElementRef, text: &str) -> Result<()>;

    async fn read_text(&mut self, element: &ElementRef) -> Result<String>;

    async fn attribute(&mut self, element: &ElementRef, name: &str) -> Result<Option<String>>;

    async fn is_selected(&mut self, element: &ElementRef) -> Result<bool>;

    async fn close_session(&mut self) -> Result<()>;

    /// Poll until `selector` matches, failing with [`Error::ElementTimeout`]
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<ElementRef> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.find(selector).await {
                Ok(element) => return Ok(element),
                Err(Error::ElementNotFound(_)) | Err(Error::StaleElement(_)) => {}
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::ElementTimeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Poll until the current URL contains `fragment`
    async fn wait_for_url(&mut self, fragment: &str, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;

        loop {
            let url = self.current_url().await?;
            if url.contains(fragment) {
                return Ok(url);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout(format!(
                    "URL still '{}' after {}ms, expected '{}'",
                    url,
                    timeout.as_millis(),
                    fragment
                )));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// Session shared between the acquisition loop and the availability monitor.
/// The lock serializes single driver calls; use an [`AttemptLease`] to keep
/// the page for a sequence of them.
pub type SharedDriver = Arc<Mutex<Box<dyn AutomationDriver>>>;

/// Exclusive use of a shared session across several operations.
///
/// A purchase attempt holds it from the item page to submission, so the
/// monitor cannot navigate the browser away in between. Take it before
/// the driver lock.
pub type AttemptLease = Arc<Mutex<()>>;

pub fn shared<D: AutomationDriver + 'static>(driver: D) -> SharedDriver {
    Arc::new(Mutex::new(Box::new(driver)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    /// Element appears after a number of lookups
    struct SlowPage {
        lookups: usize,
        appears_after: usize,
        url: String,
    }

    #[async_trait]
    impl AutomationDriver for SlowPage {
        async fn navigate(&mut self, url: &str) -> Result<()> {
            self.url = url.to_string();
            Ok(())
        }

        async fn current_url(&mut self) -> Result<String> {
            self.lookups += 1;
            if self.lookups >= self.appears_after {
                Ok("https://pay.example.com/checkout".into())
            } else {
                Ok(self.url.clone())
            }
        }

        async fn find(&mut self, selector: &str) -> Result<ElementRef> {
            self.lookups += 1;
            if self.lookups >= self.appears_after {
                Ok(ElementRef::new("e-1"))
            } else {
                Err(Error::ElementNotFound(selector.into()))
            }
        }

        async fn list_elements(&mut self, _selector: &str) -> Result<Vec<ElementRef>> {
            Ok(vec![])
        }

        async fn click(&mut self, _element: &ElementRef) -> Result<()> {
            Ok(())
        }

        async fn send_keys(&mut self, _element: &ElementRef, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn read_text(&mut self, _element: &ElementRef) -> Result<String> {
            Ok(String::new())
        }

        async fn attribute(&mut self, _e: &ElementRef, _name: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn is_selected(&mut self, _element: &ElementRef) -> Result<bool> {
            Ok(false)
        }

        async fn close_session(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn page(appears_after: usize) -> SlowPage {
        SlowPage {
            lookups: 0,
            appears_after,
            url: "https://example.com/item".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_polls_until_found() {
        let mut driver = page(3);
        let element = assert_ok!(driver.wait_for(".buybtn", Duration::from_secs(2)).await);
        assert_eq!(element.id(), "e-1");
        assert_eq!(driver.lookups, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out() {
        let mut driver = page(usize::MAX);
        let err = assert_err!(driver.wait_for(".buybtn", Duration::from_secs(1)).await);
        assert!(matches!(err, Error::ElementTimeout { timeout_ms: 1000, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_url() {
        let mut driver = page(4);
        let url = assert_ok!(
            driver
                .wait_for_url("pay.example.com", Duration::from_secs(5))
                .await
        );
        assert!(url.contains("checkout"));

        let mut driver = page(usize::MAX);
        let err = driver
            .wait_for_url("pay.example.com", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
