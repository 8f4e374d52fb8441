//! Configuration loading and validation

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::schedule::parse_start_time;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub recipients: Vec<RecipientConfig>,
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Price tier priority table, scanned in order
    #[serde(default)]
    pub priority: Vec<PriorityEntry>,
    #[serde(default)]
    pub risk_control: RiskControlConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

/// Account credentials. Opaque to the orchestrator, only the site login reads them.
#[derive(Clone, Default, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetConfig {
    /// Full item page URL
    #[serde(default)]
    pub url: Option<String>,
    /// Item identifier, expanded through `site.item_url_template`
    #[serde(default)]
    pub item_id: Option<String>,
    /// Sale start, `%Y-%m-%d %H:%M:%S` local time or RFC 3339
    #[serde(default)]
    pub start_time: Option<String>,
    /// Search keyword for the availability monitor
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub price_range: PriceRange,
}

impl TargetConfig {
    /// Resolve the item page URL from either the explicit URL or the item id
    pub fn resolve_url(&self, site: &SiteConfig) -> Option<String> {
        if let Some(url) = self.url.as_ref().filter(|u| !u.trim().is_empty()) {
            return Some(url.trim().to_string());
        }

        self.item_id
            .as_ref()
            .filter(|id| !id.trim().is_empty())
            .map(|id| site.item_url_template.replace("{id}", id.trim()))
    }

    /// Non-empty start time, if one is configured
    pub fn start_time(&self) -> Option<&str> {
        self.start_time
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateRange {
    /// Inclusive, `%Y-%m-%d`
    pub start: String,
    /// Inclusive, `%Y-%m-%d`
    pub end: String,
}

impl DateRange {
    pub fn bounds(&self) -> Result<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::parse_from_str(self.start.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date_range.start: {}", self.start))?;
        let end = NaiveDate::parse_from_str(self.end.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date_range.end: {}", self.end))?;
        Ok((start, end))
    }
}

/// Inclusive price window
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PriceRange {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_price_max")]
    pub max: f64,
}

impl PriceRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for PriceRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: default_price_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecipientConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Maximum acquisition attempts (0 = unbounded)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts; every 10th attempt waits twice as long
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Extra random delay added on top of the backoff
    #[serde(default)]
    pub jitter: Option<JitterRange>,
    /// Click the final submit button instead of handing the order page to the user
    #[serde(default)]
    pub auto_submit: bool,
    /// How the availability monitor reports a standing buyable candidate
    #[serde(default)]
    pub notify_mode: NotifyMode,
}

impl StrategyConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            jitter: None,
            auto_submit: false,
            notify_mode: NotifyMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct JitterRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Notify on every pass while a candidate stays buyable
    #[default]
    Every,
    /// Notify only when a candidate turns buyable
    Transition,
}

/// One priority table row: tiers whose text contains `name` get `rank` (lower wins)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PriorityEntry {
    pub name: String,
    #[serde(alias = "priority")]
    pub rank: u32,
}

impl PriorityEntry {
    pub fn new(name: impl Into<String>, rank: u32) -> Self {
        Self {
            name: name.into(),
            rank,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskControlConfig {
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    /// Random pause between consecutive status checks
    #[serde(default)]
    pub request_delay: DelayRange,
}

impl Default for RiskControlConfig {
    fn default() -> Self {
        Self {
            use_proxy: false,
            proxy: None,
            request_delay: DelayRange::default(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: ProxyKind,
}

impl ProxyConfig {
    /// `scheme://host:port`, credentials left out
    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.kind.scheme(), self.host, self.port)
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    #[default]
    Http,
    Https,
    Socks5,
}

impl ProxyKind {
    pub fn scheme(&self) -> &'static str {
        match self {
            ProxyKind::Http => "http",
            ProxyKind::Https => "https",
            ProxyKind::Socks5 => "socks5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DelayRange {
    #[serde(default = "default_request_delay_min")]
    pub min_ms: u64,
    #[serde(default = "default_request_delay_max")]
    pub max_ms: u64,
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_ms: default_request_delay_min(),
            max_ms: default_request_delay_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_normal_interval_ms")]
    pub normal_interval_ms: u64,
    /// Used while a candidate shows an imminent-sale status
    #[serde(default = "default_rush_interval_ms")]
    pub rush_interval_ms: u64,
    /// Maximum scan passes (0 = unbounded)
    #[serde(default)]
    pub max_passes: u32,
    /// How long `stop()` waits for the scan task before giving up on it
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

impl MonitorConfig {
    pub fn normal_interval(&self) -> Duration {
        Duration::from_millis(self.normal_interval_ms)
    }

    pub fn rush_interval(&self) -> Duration {
        Duration::from_millis(self.rush_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            normal_interval_ms: default_normal_interval_ms(),
            rush_interval_ms: default_rush_interval_ms(),
            max_passes: 0,
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverBackend {
    /// Desktop Chrome through chromedriver
    #[default]
    Chrome,
    /// Mobile Chrome on a device through an Appium server
    Appium,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub backend: DriverBackend,
    /// WebDriver server base URL
    #[serde(default = "default_driver_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub window: WindowSize,
    /// Default wait for page elements
    #[serde(default = "default_element_timeout_ms")]
    pub element_timeout_ms: u64,
    /// Timeout for a single WebDriver HTTP request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Total time spent retrying session creation
    #[serde(default = "default_session_retry_ms")]
    pub session_retry_ms: u64,
    #[serde(default)]
    pub appium: AppiumConfig,
}

impl DriverConfig {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            backend: DriverBackend::default(),
            endpoint: default_driver_endpoint(),
            headless: false,
            user_agent: None,
            window: WindowSize::default(),
            element_timeout_ms: default_element_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            session_retry_ms: default_session_retry_ms(),
            appium: AppiumConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppiumConfig {
    #[serde(default = "default_platform_name")]
    pub platform_name: String,
    #[serde(default)]
    pub platform_version: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub chromedriver_path: Option<String>,
    #[serde(default = "default_new_command_timeout")]
    pub new_command_timeout_secs: u64,
}

impl Default for AppiumConfig {
    fn default() -> Self {
        Self {
            platform_name: default_platform_name(),
            platform_version: String::new(),
            device_name: String::new(),
            chromedriver_path: None,
            new_command_timeout_secs: default_new_command_timeout(),
        }
    }
}

/// Page layout of the ticketing site: URLs, CSS selectors and status vocabulary
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// `{keyword}` is replaced with the URL-encoded search keyword
    #[serde(default = "default_search_url_template")]
    pub search_url_template: String,
    /// `{id}` is replaced with `target.item_id`
    #[serde(default = "default_item_url_template")]
    pub item_url_template: String,
    /// URL fragment present once the order confirmation page is shown
    #[serde(default = "default_order_url_marker")]
    pub order_url_marker: String,
    /// URL fragment present once the order was accepted and payment is pending
    #[serde(default = "default_payment_url_marker")]
    pub payment_url_marker: String,
    #[serde(default)]
    pub selectors: SiteSelectors,
    /// Status texts meaning tickets can be bought now
    #[serde(default = "default_buy_keywords")]
    pub buy_keywords: Vec<String>,
    /// Status texts meaning the sale opens imminently
    #[serde(default = "default_rush_keywords")]
    pub rush_keywords: Vec<String>,
    #[serde(default = "default_sold_out_keywords")]
    pub sold_out_keywords: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            search_url_template: default_search_url_template(),
            item_url_template: default_item_url_template(),
            order_url_marker: default_order_url_marker(),
            payment_url_marker: default_payment_url_marker(),
            selectors: SiteSelectors::default(),
            buy_keywords: default_buy_keywords(),
            rush_keywords: default_rush_keywords(),
            sold_out_keywords: default_sold_out_keywords(),
        }
    }
}

/// CSS selectors, one per page element the site adapter touches
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    pub login_form: String,
    pub login_tab: String,
    pub username_input: String,
    pub password_input: String,
    pub login_button: String,
    pub search_list: String,
    pub item_title: String,
    pub item_venue: String,
    pub item_time: String,
    pub item_price: String,
    pub item_link: String,
    pub detail_ready: String,
    pub price_item: String,
    pub price_value: String,
    pub session_item: String,
    pub session_disabled_class: String,
    pub buy_button: String,
    pub buyer_list: String,
    pub buyer_name: String,
    pub buyer_checkbox: String,
    pub agreement: String,
    pub submit_button: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            login_form: ".login-box".into(),
            login_tab: ".login-method-tab".into(),
            username_input: "#fm-login-id".into(),
            password_input: "#fm-login-password".into(),
            login_button: ".fm-button".into(),
            search_list: ".search__itemlist".into(),
            item_title: ".search__item .search__item__name".into(),
            item_venue: ".search__item .search__item__venue".into(),
            item_time: ".search__item .search__item__time".into(),
            item_price: ".search__item .search__item__price".into(),
            item_link: ".search__item a".into(),
            detail_ready: ".perform__order__select".into(),
            price_item: ".perform__price__item".into(),
            price_value: ".perform__price__item .price__value".into(),
            session_item: ".perform__order__select .select_right_list .select_right_list_item"
                .into(),
            session_disabled_class: "select_right_list_item_disabled".into(),
            buy_button: ".buybtn".into(),
            buyer_list: ".buyer-list".into(),
            buyer_name: ".buyer-list .buyer-item .buyer-name".into(),
            buyer_checkbox: ".buyer-list .buyer-item input".into(),
            agreement: ".service-agreement".into(),
            submit_button: ".submit-wrapper".into(),
        }
    }
}

// Default value functions
fn default_price_max() -> f64 {
    100_000.0
}

fn default_max_attempts() -> u32 {
    100
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_request_delay_min() -> u64 {
    500
}

fn default_request_delay_max() -> u64 {
    1500
}

fn default_normal_interval_ms() -> u64 {
    5000
}

fn default_rush_interval_ms() -> u64 {
    1000
}

fn default_join_timeout_ms() -> u64 {
    2000
}

fn default_driver_endpoint() -> String {
    std::env::var("WEBDRIVER_URL").unwrap_or_else(|_| "http://localhost:9515".into())
}

fn default_element_timeout_ms() -> u64 {
    10000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_session_retry_ms() -> u64 {
    10000
}

fn default_platform_name() -> String {
    "Android".to_string()
}

fn default_new_command_timeout() -> u64 {
    600
}

fn default_login_url() -> String {
    "https://passport.damai.cn/login".to_string()
}

fn default_search_url_template() -> String {
    "https://search.damai.cn/search.html?keyword={keyword}".to_string()
}

fn default_item_url_template() -> String {
    "https://detail.damai.cn/item.htm?id={id}".to_string()
}

fn default_order_url_marker() -> String {
    "buy.damai.cn/orderConfirm".to_string()
}

fn default_payment_url_marker() -> String {
    "pay.damai.cn".to_string()
}

fn default_buy_keywords() -> Vec<String> {
    vec!["立即购买".into(), "立即预订".into(), "选座购买".into()]
}

fn default_rush_keywords() -> Vec<String> {
    vec!["即将开抢".into()]
}

fn default_sold_out_keywords() -> Vec<String> {
    vec!["已售完".into(), "暂时缺货".into()]
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix TICKET_)
            .add_source(
                config::Environment::with_prefix("TICKET")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        // Validated by the caller once command-line overrides are applied
        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Apply command-line overrides on top of the loaded file
    pub fn apply_overrides(&mut self, target_override: Option<&str>, auto: bool) {
        if let Some(target) = target_override.map(str::trim).filter(|t| !t.is_empty()) {
            if target.starts_with("http://") || target.starts_with("https://") {
                self.target.url = Some(target.to_string());
                self.target.item_id = None;
            } else {
                self.target.url = None;
                self.target.item_id = Some(target.to_string());
            }
            tracing::info!("Target overridden from command line: {}", target);
        }

        if auto {
            self.strategy.auto_submit = true;
            tracing::info!("Auto mode enabled: orders will be submitted without confirmation");
        }
    }

    /// Number of recipients the order needs (configured list length, at least 1)
    pub fn required_recipients(&self) -> usize {
        self.recipients.len().max(1)
    }

    /// Configured recipient names, trimmed, in configured order
    pub fn recipient_names(&self) -> Vec<String> {
        self.recipients
            .iter()
            .map(|r| r.name.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Item page URL for the acquisition loop
    pub fn target_url(&self) -> Option<String> {
        self.target.resolve_url(&self.site)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // A run needs something to aim at
        let has_keyword = self
            .target
            .keyword
            .as_ref()
            .is_some_and(|k| !k.trim().is_empty());
        if self.target_url().is_none() && !has_keyword {
            anyhow::bail!("target.url, target.item_id or target.keyword must be set");
        }

        if let Some(url) = &self.target.url {
            if !url.trim().is_empty() {
                url::Url::parse(url.trim())
                    .with_context(|| format!("Invalid target.url: {}", url))?;
            }
        }

        if let Some(start) = self.target.start_time() {
            parse_start_time(start).map_err(|e| anyhow::anyhow!("{}", e))?;
        }

        if let Some(range) = &self.target.date_range {
            let (start, end) = range.bounds()?;
            if start > end {
                anyhow::bail!("date_range.start must not be after date_range.end");
            }
        }

        // Validate price window
        let price = self.target.price_range;
        if price.min < 0.0 || price.min > price.max {
            anyhow::bail!(
                "price_range must satisfy 0 <= min <= max, got [{}, {}]",
                price.min,
                price.max
            );
        }

        for entry in &self.priority {
            if entry.name.trim().is_empty() {
                anyhow::bail!("priority entries must have a non-empty name");
            }
        }

        for recipient in &self.recipients {
            if recipient.name.trim().is_empty() {
                anyhow::bail!("recipient names must not be empty");
            }
        }
        let names = self.recipient_names();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                tracing::warn!("Recipient '{}' is listed more than once", name);
            }
        }

        // Validate timing
        if let Some(jitter) = self.strategy.jitter {
            if jitter.min_ms > jitter.max_ms {
                anyhow::bail!("strategy.jitter.min_ms cannot exceed max_ms");
            }
        }

        let delay = self.risk_control.request_delay;
        if delay.min_ms > delay.max_ms {
            anyhow::bail!("risk_control.request_delay.min_ms cannot exceed max_ms");
        }

        if self.monitor.normal_interval_ms == 0 || self.monitor.rush_interval_ms == 0 {
            anyhow::bail!("monitor intervals must be positive");
        }

        if self.risk_control.use_proxy {
            match &self.risk_control.proxy {
                Some(proxy) if !proxy.host.trim().is_empty() && proxy.port != 0 => {}
                _ => anyhow::bail!("risk_control.use_proxy requires proxy.host and proxy.port"),
            }
        }

        url::Url::parse(&self.driver.endpoint)
            .with_context(|| format!("Invalid driver.endpoint: {}", self.driver.endpoint))?;

        if self.account.username.is_empty() {
            tracing::warn!("No account username configured - login will need to be done by hand");
        }

        if self.strategy.max_attempts == 0 {
            tracing::warn!("strategy.max_attempts is 0 - retrying until success or Ctrl-C");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let priority = self
            .priority
            .iter()
            .map(|p| format!("{}={}", p.name, p.rank))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"Configuration:
  Account:
    username: {}
    password: {}
  Target:
    url: {}
    start_time: {}
    keyword: {}
    price_range: [{}, {}]
  Recipients: {:?}
  Strategy:
    max_attempts: {}
    base_delay: {}ms
    jitter: {}
    auto_submit: {}
    notify_mode: {:?}
  Priority: {}
  Risk control:
    proxy: {}
    request_delay: {}-{}ms
  Monitor:
    normal_interval: {}ms
    rush_interval: {}ms
  Driver:
    backend: {:?}
    endpoint: {}
    headless: {}
"#,
            if self.account.username.is_empty() {
                "(not set)"
            } else {
                self.account.username.as_str()
            },
            if self.account.password.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.target_url()
                .map(|u| mask_url(&u))
                .unwrap_or_else(|| "(not set)".into()),
            self.target.start_time().unwrap_or("(immediately)"),
            self.target.keyword.as_deref().unwrap_or("(not set)"),
            self.target.price_range.min,
            self.target.price_range.max,
            self.recipient_names(),
            self.strategy.max_attempts,
            self.strategy.base_delay_ms,
            self.strategy
                .jitter
                .map(|j| format!("{}-{}ms", j.min_ms, j.max_ms))
                .unwrap_or_else(|| "off".into()),
            self.strategy.auto_submit,
            self.strategy.notify_mode,
            if priority.is_empty() { "(none)".into() } else { priority },
            match (&self.risk_control.proxy, self.risk_control.use_proxy) {
                (Some(p), true) => p.server(),
                _ => "off".into(),
            },
            self.risk_control.request_delay.min_ms,
            self.risk_control.request_delay.max_ms,
            self.monitor.normal_interval_ms,
            self.monitor.rush_interval_ms,
            self.driver.backend,
            mask_url(&self.driver.endpoint),
            self.driver.headless,
        )
    }
}

/// Mask URL for display (hide tokens in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: AccountConfig::default(),
            target: TargetConfig::default(),
            recipients: vec![],
            strategy: StrategyConfig::default(),
            priority: vec![],
            risk_control: RiskControlConfig::default(),
            monitor: MonitorConfig::default(),
            driver: DriverConfig::default(),
            site: SiteConfig::default(),
        }
    }
}
