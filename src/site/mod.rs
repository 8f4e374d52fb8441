//! Ticketing site adapter
//!
//! Maps the domain steps (login, search, status check, tier and recipient
//! choice, submission) onto driver calls using the selectors and status
//! vocabulary from `[site]`. Clones share one session: a purchase attempt
//! holds the attempt lease from start to finish, and the monitor's search
//! and status checks wait for it before touching the browser.

mod flow;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{AccountConfig, Config, SiteConfig};
use crate::driver::{AttemptLease, AutomationDriver, ElementRef, SharedDriver};
use crate::error::{Error, Result};
use crate::monitor::{AvailabilitySource, Candidate, RawCandidate, StatusKeywords, TicketStatus};

/// How long to wait for the browser to leave the login page
const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct TicketSite {
    driver: SharedDriver,
    lease: AttemptLease,
    site: Arc<SiteConfig>,
    keywords: StatusKeywords,
    element_timeout: Duration,
    search_keyword: Option<String>,
    /// Allow prompting on the terminal (manual login)
    interactive: bool,
}

impl TicketSite {
    pub fn new(driver: SharedDriver, config: &Config, interactive: bool) -> Self {
        Self {
            driver,
            lease: AttemptLease::default(),
            site: Arc::new(config.site.clone()),
            keywords: StatusKeywords::from_site(&config.site),
            element_timeout: config.driver.element_timeout(),
            search_keyword: config
                .target
                .keyword
                .as_ref()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            interactive,
        }
    }

    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Log in with the configured account, falling back to a manual login
    /// in the browser window when allowed.
    pub async fn login(&self, account: &AccountConfig) -> Result<()> {
        let login_url = self.site.login_url.clone();
        {
            let mut driver = self.driver.lock().await;
            driver
                .navigate(&login_url)
                .await
                .map_err(|e| Error::Navigation(format!("login page: {}", e)))?;
        }

        if !account.username.is_empty() && !account.password.is_empty() {
            match self.login_with_password(account).await {
                Ok(()) => {
                    info!("Logged in as {}", account.username);
                    return Ok(());
                }
                Err(e) => warn!("Password login failed: {}", e),
            }
        } else {
            info!("No credentials configured");
        }

        if !self.interactive {
            return Err(Error::Session(
                "login failed and manual login is not available".to_string(),
            ));
        }

        if !prompt_manual_login().await? {
            return Err(Error::Session("login aborted by user".to_string()));
        }

        let mut driver = self.driver.lock().await;
        let url = driver.current_url().await?;
        if url.starts_with(&login_url) {
            return Err(Error::Session("still on the login page".to_string()));
        }
        info!("Manual login confirmed");
        Ok(())
    }

    async fn login_with_password(&self, account: &AccountConfig) -> Result<()> {
        let selectors = &self.site.selectors;
        let mut driver = self.driver.lock().await;

        driver
            .wait_for(&selectors.login_form, self.element_timeout)
            .await?;

        // Some layouts default to QR login
        if let Ok(tab) = driver.find(&selectors.login_tab).await {
            if let Err(e) = driver.click(&tab).await {
                debug!("Login tab click failed: {}", e);
            }
        }

        let username = driver.find(&selectors.username_input).await?;
        driver.send_keys(&username, &account.username).await?;
        let password = driver.find(&selectors.password_input).await?;
        driver.send_keys(&password, &account.password).await?;
        let button = driver.find(&selectors.login_button).await?;
        driver.click(&button).await?;

        wait_to_leave(&mut **driver, &self.site.login_url, LOGIN_TIMEOUT).await
    }

    /// Search page URL for the configured keyword
    pub fn search_url(&self) -> Result<String> {
        let keyword = self
            .search_keyword
            .as_deref()
            .ok_or_else(|| Error::Config("target.keyword is required for monitoring".into()))?;
        let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
        Ok(self.site.search_url_template.replace("{keyword}", &encoded))
    }

    pub fn keywords(&self) -> &StatusKeywords {
        &self.keywords
    }
}

#[async_trait]
impl AvailabilitySource for TicketSite {
    async fn search(&self) -> Result<Vec<RawCandidate>> {
        let url = self.search_url()?;
        let selectors = &self.site.selectors;
        let _lease = self.lease.lock().await;
        let mut driver = self.driver.lock().await;

        driver.navigate(&url).await?;
        driver
            .wait_for(&selectors.search_list, self.element_timeout)
            .await?;

        let titles = read_all(&mut **driver, &selectors.item_title).await?;
        let venues = read_all(&mut **driver, &selectors.item_venue).await?;
        let times = read_all(&mut **driver, &selectors.item_time).await?;
        let prices = read_all(&mut **driver, &selectors.item_price).await?;

        let mut links = Vec::new();
        for element in driver.list_elements(&selectors.item_link).await? {
            links.push(driver.attribute(&element, "href").await?.unwrap_or_default());
        }

        let count = titles.len();
        if venues.len() != count || times.len() != count || prices.len() != count {
            debug!(
                "Search result fields differ in length: {} titles, {} venues, {} times, {} prices",
                count,
                venues.len(),
                times.len(),
                prices.len()
            );
        }

        let candidates: Vec<RawCandidate> = titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| RawCandidate {
                title,
                venue: venues.get(i).cloned().unwrap_or_default(),
                time_text: times.get(i).cloned().unwrap_or_default(),
                price_text: prices.get(i).cloned().unwrap_or_default(),
                link: links.get(i).cloned().unwrap_or_default(),
            })
            .collect();

        info!("Search found {} result(s)", candidates.len());
        Ok(candidates)
    }

    async fn check_status(&self, candidate: &Candidate) -> Result<TicketStatus> {
        let _lease = self.lease.lock().await;
        let mut driver = self.driver.lock().await;

        driver.navigate(&candidate.link).await?;
        let button = driver
            .wait_for(&self.site.selectors.buy_button, self.element_timeout)
            .await?;
        let text = driver.read_text(&button).await?.trim().to_string();

        Ok(TicketStatus {
            candidate: candidate.clone(),
            can_buy: self.keywords.can_buy(&text),
            status_text: text,
        })
    }
}

/// Text of every element matching `selector`
async fn read_all(driver: &mut dyn AutomationDriver, selector: &str) -> Result<Vec<String>> {
    let mut texts = Vec::new();
    for element in driver.list_elements(selector).await? {
        texts.push(driver.read_text(&element).await?.trim().to_string());
    }
    Ok(texts)
}

/// Element `index` among the matches of `selector`
async fn nth_element(
    driver: &mut dyn AutomationDriver,
    selector: &str,
    index: usize,
) -> Result<ElementRef> {
    driver
        .list_elements(selector)
        .await?
        .into_iter()
        .nth(index)
        .ok_or_else(|| Error::ElementNotFound(format!("{} #{}", selector, index)))
}

/// Poll until the current URL no longer starts with `url`
async fn wait_to_leave(
    driver: &mut dyn AutomationDriver,
    url: &str,
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !driver.current_url().await?.starts_with(url) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "still on {} after {}s",
                url,
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(crate::driver::POLL_INTERVAL).await;
    }
}

async fn prompt_manual_login() -> Result<bool> {
    tokio::task::spawn_blocking(|| {
        dialoguer::Confirm::new()
            .with_prompt("Log in using the browser window, then confirm here. Continue?")
            .default(true)
            .interact()
    })
    .await
    .map_err(|e| Error::Internal(format!("prompt task failed: {}", e)))?
    .map_err(|e| Error::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::testing::{FakePage, PageElement};
    use super::*;
    use crate::config::Config;

    fn site_for(page: &FakePage, keyword: Option<&str>) -> TicketSite {
        let mut config = Config::default();
        config.target.keyword = keyword.map(String::from);
        config.driver.element_timeout_ms = 1000;
        TicketSite::new(page.shared(), &config, false)
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        let page = FakePage::new();
        let site = site_for(&page, Some("周杰伦 演唱会"));
        let url = site.search_url().unwrap();
        assert!(url.starts_with("https://search.damai.cn/search.html?keyword="));
        assert!(!url.contains(' '));

        let site = site_for(&page, None);
        assert!(matches!(site.search_url(), Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_zips_fields() {
        let page = FakePage::new();
        let s = SiteConfig::default().selectors;
        page.add(&s.search_list, PageElement::text(""));
        page.add(&s.item_title, PageElement::text(" Concert A "));
        page.add(&s.item_title, PageElement::text("Concert B"));
        page.add(&s.item_venue, PageElement::text("Arena"));
        page.add(&s.item_venue, PageElement::text("Stadium"));
        page.add(&s.item_time, PageElement::text("2030.05.01 19:30"));
        page.add(&s.item_time, PageElement::text("2030.05.02 19:30"));
        page.add(&s.item_price, PageElement::text("¥380"));
        page.add(&s.item_price, PageElement::text("¥180-880"));
        page.add(&s.item_link, PageElement::text("").attr("href", "https://detail.example.com/a"));
        page.add(&s.item_link, PageElement::text("").attr("href", "https://detail.example.com/b"));

        let site = site_for(&page, Some("concert"));
        let found = site.search().await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].title, "Concert A");
        assert_eq!(found[1].venue, "Stadium");
        assert_eq!(found[1].price_text, "¥180-880");
        assert_eq!(found[1].link, "https://detail.example.com/b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_status_classifies_button() {
        let page = FakePage::new();
        let s = SiteConfig::default().selectors;
        page.add(&s.buy_button, PageElement::text("即将开抢"));

        let site = site_for(&page, None);
        let candidate = Candidate::from_raw(RawCandidate {
            title: "Concert".into(),
            venue: "Arena".into(),
            time_text: "2030.05.01".into(),
            price_text: "¥380".into(),
            link: "https://detail.example.com/a".into(),
        })
        .unwrap();

        let status = site.check_status(&candidate).await.unwrap();
        assert!(!status.can_buy);
        assert_eq!(status.status_text, "即将开抢");
        assert!(site.keywords().is_imminent(&status.status_text));
        assert_eq!(page.url(), "https://detail.example.com/a");

        page.set_text(&s.buy_button, 0, "立即购买");
        assert!(site.check_status(&candidate).await.unwrap().can_buy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_with_password() {
        let page = FakePage::new();
        let s = SiteConfig::default().selectors;
        page.add(&s.login_form, PageElement::text(""));
        page.add(&s.username_input, PageElement::text(""));
        page.add(&s.password_input, PageElement::text(""));
        page.add(
            &s.login_button,
            PageElement::text("登录").navigates_to("https://www.damai.cn/"),
        );

        let site = site_for(&page, None);
        let account = AccountConfig {
            username: "fan".into(),
            password: "secret".into(),
        };
        site.login(&account).await.unwrap();

        assert_eq!(page.typed(&s.username_input), Some("fan".to_string()));
        assert_eq!(page.typed(&s.password_input), Some("secret".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_without_credentials_needs_terminal() {
        let page = FakePage::new();
        let site = site_for(&page, None);

        let err = site.login(&AccountConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }
}
