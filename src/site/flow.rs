//! Purchase steps on the item, order and payment pages

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{nth_element, read_all, TicketSite};
use crate::acquisition::{PurchaseFlow, SubmitOutcome};
use crate::driver::AttemptLease;
use crate::error::{Error, Result};
use crate::selection::{parse_tiers, PriceTier, RawTier, RecipientCandidate, RecipientToggle};

#[async_trait]
impl RecipientToggle for TicketSite {
    async fn toggle(&mut self, candidate: &RecipientCandidate) -> Result<()> {
        let element = candidate
            .element
            .as_ref()
            .ok_or_else(|| Error::ElementNotFound(format!("checkbox of {}", candidate.name)))?;
        self.driver.lock().await.click(element).await
    }

    async fn is_selected(&mut self, candidate: &RecipientCandidate) -> Result<bool> {
        let element = candidate
            .element
            .as_ref()
            .ok_or_else(|| Error::ElementNotFound(format!("checkbox of {}", candidate.name)))?;
        self.driver.lock().await.is_selected(element).await
    }
}

#[async_trait]
impl PurchaseFlow for TicketSite {
    async fn open_target(&mut self, url: &str) -> Result<()> {
        let selectors = &self.site.selectors;
        let mut driver = self.driver.lock().await;

        driver
            .navigate(url)
            .await
            .map_err(|e| Error::Navigation(format!("{}: {}", url, e)))?;
        driver
            .wait_for(&selectors.detail_ready, self.element_timeout)
            .await?;

        // Performance date: first one that is not greyed out
        let sessions = driver.list_elements(&selectors.session_item).await?;
        if sessions.is_empty() {
            debug!("Item has no session choice");
            return Ok(());
        }

        for (i, session) in sessions.iter().enumerate() {
            let class = driver.attribute(session, "class").await?.unwrap_or_default();
            if class
                .split_whitespace()
                .any(|c| c == selectors.session_disabled_class)
            {
                continue;
            }
            driver.click(session).await?;
            debug!("Chose session #{}", i);
            return Ok(());
        }

        Err(Error::SoldOut(format!(
            "all {} session(s) unavailable",
            sessions.len()
        )))
    }

    async fn price_tiers(&mut self) -> Result<Vec<PriceTier>> {
        let selectors = &self.site.selectors;
        let mut driver = self.driver.lock().await;

        let texts = read_all(&mut **driver, &selectors.price_item).await?;
        let values = read_all(&mut **driver, &selectors.price_value).await?;

        let raw: Vec<RawTier> = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| RawTier {
                // Tiers without a separate price label carry the price in their text
                value_text: values.get(i).cloned().unwrap_or_else(|| text.clone()),
                text,
            })
            .collect();

        let tiers = parse_tiers(&raw);
        debug!("{} price tier(s) on the page", tiers.len());
        Ok(tiers)
    }

    async fn choose_tier(&mut self, tier: &PriceTier) -> Result<()> {
        let mut driver = self.driver.lock().await;
        let element = nth_element(&mut **driver, &self.site.selectors.price_item, tier.index).await?;
        driver.click(&element).await
    }

    async fn proceed_to_checkout(&mut self) -> Result<()> {
        let selectors = &self.site.selectors;
        let mut driver = self.driver.lock().await;

        let button = driver
            .wait_for(&selectors.buy_button, self.element_timeout)
            .await?;
        let text = driver.read_text(&button).await?.trim().to_string();

        if self.keywords.is_sold_out(&text) {
            return Err(Error::SoldOut(text));
        }
        if !self.keywords.can_buy(&text) {
            return Err(Error::Navigation(format!("sale not open yet: {}", text)));
        }

        driver.click(&button).await?;
        driver
            .wait_for_url(&self.site.order_url_marker, self.element_timeout)
            .await?;
        driver
            .wait_for(&selectors.buyer_list, self.element_timeout)
            .await?;

        info!("Order confirmation page reached");
        Ok(())
    }

    async fn recipients(&mut self) -> Result<Vec<RecipientCandidate>> {
        let selectors = &self.site.selectors;
        let mut driver = self.driver.lock().await;

        let names = read_all(&mut **driver, &selectors.buyer_name).await?;
        let checkboxes = driver.list_elements(&selectors.buyer_checkbox).await?;
        if names.len() != checkboxes.len() {
            warn!(
                "{} recipient names but {} checkboxes",
                names.len(),
                checkboxes.len()
            );
        }

        let mut candidates = Vec::with_capacity(names.len());
        for (name, checkbox) in names.into_iter().zip(checkboxes) {
            let selected = driver.is_selected(&checkbox).await?;
            candidates.push(RecipientCandidate::new(name, selected).with_element(checkbox));
        }
        Ok(candidates)
    }

    async fn submit(&mut self, auto_submit: bool) -> Result<SubmitOutcome> {
        let selectors = &self.site.selectors;
        let mut driver = self.driver.lock().await;

        match driver.find(&selectors.agreement).await {
            Ok(agreement) => driver.click(&agreement).await?,
            Err(Error::ElementNotFound(_)) => debug!("No service agreement to accept"),
            Err(e) => return Err(e),
        }

        if !auto_submit {
            info!("Order is ready, submit it in the browser window");
            return Ok(SubmitOutcome::AwaitingManual);
        }

        let button = driver.find(&selectors.submit_button).await?;
        driver.click(&button).await?;
        driver
            .wait_for_url(&self.site.payment_url_marker, self.element_timeout)
            .await
            .map_err(|e| Error::Submission(format!("no payment page after submit: {}", e)))?;

        info!("Order submitted, complete the payment in the browser window");
        Ok(SubmitOutcome::Submitted)
    }

    fn attempt_lease(&self) -> Option<AttemptLease> {
        Some(self.lease.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{FakePage, PageElement, PageEvent};
    use super::*;
    use crate::acquisition::{AcquisitionLoop, AcquisitionSettings, BackoffPolicy, FinalOutcome};
    use crate::config::{Config, DelayRange, PriceRange, SiteConfig};
    use crate::monitor::{AvailabilityMonitor, MonitorSettings, TicketStatus};
    use crate::selection::select_recipients;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const ITEM: &str = "https://detail.damai.cn/item.htm?id=1";
    const OTHER_ITEM: &str = "https://detail.damai.cn/item.htm?id=2";

    fn site_for(page: &FakePage) -> TicketSite {
        let mut config = Config::default();
        config.driver.element_timeout_ms = 1000;
        TicketSite::new(page.shared(), &config, false)
    }

    fn item_page(page: &FakePage, buy_text: &str) {
        let s = SiteConfig::default().selectors;
        page.add(&s.detail_ready, PageElement::text(""));
        page.add(
            &s.session_item,
            PageElement::text("05.01").attr("class", "select_right_list_item select_right_list_item_disabled"),
        );
        page.add(
            &s.session_item,
            PageElement::text("05.02").attr("class", "select_right_list_item"),
        );
        page.add(&s.price_item, PageElement::text("VIP 内场"));
        page.add(&s.price_item, PageElement::text("看台"));
        page.add(&s.price_value, PageElement::text("¥880"));
        page.add(&s.price_value, PageElement::text("¥280"));
        page.add(
            &s.buy_button,
            PageElement::text(buy_text)
                .navigates_to("https://buy.damai.cn/orderConfirm?itemId=1"),
        );
        page.add(&s.buyer_list, PageElement::text(""));
        page.add(&s.buyer_name, PageElement::text("Alice"));
        page.add(&s.buyer_name, PageElement::text("Bob"));
        page.add(&s.buyer_checkbox, PageElement::text("").checkbox(false));
        page.add(&s.buyer_checkbox, PageElement::text("").checkbox(false));
        page.add(&s.agreement, PageElement::text(""));
        page.add(
            &s.submit_button,
            PageElement::text("提交订单").navigates_to("https://pay.damai.cn/pay?id=9"),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_flow_submits() {
        let page = FakePage::new();
        item_page(&page, "立即购买");
        let s = SiteConfig::default().selectors;
        let mut site = site_for(&page);

        site.open_target(ITEM).await.unwrap();
        assert!(!page.clicked(&s.session_item, 0));
        assert!(page.clicked(&s.session_item, 1));

        let tiers = site.price_tiers().await.unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[1].value, 280.0);
        site.choose_tier(&tiers[1]).await.unwrap();
        assert!(page.clicked(&s.price_item, 1));

        site.proceed_to_checkout().await.unwrap();
        assert!(page.url().contains("orderConfirm"));

        let mut candidates = site.recipients().await.unwrap();
        assert_eq!(candidates.len(), 2);
        let outcome =
            select_recipients(&mut site, &mut candidates, &["Bob".to_string()], 1).await;
        assert!(outcome.success());
        assert!(page.clicked(&s.buyer_checkbox, 1));
        assert!(!page.clicked(&s.buyer_checkbox, 0));

        let submitted = site.submit(true).await.unwrap();
        assert_eq!(submitted, SubmitOutcome::Submitted);
        assert!(page.clicked(&s.agreement, 0));
        assert!(page.url().starts_with("https://pay.damai.cn"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_submit_leaves_order_page() {
        let page = FakePage::new();
        item_page(&page, "立即购买");
        let s = SiteConfig::default().selectors;
        let mut site = site_for(&page);

        let outcome = site.submit(false).await.unwrap();

        assert_eq!(outcome, SubmitOutcome::AwaitingManual);
        assert!(!page.clicked(&s.submit_button, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sold_out_checkout() {
        let page = FakePage::new();
        item_page(&page, "已售完");
        let mut site = site_for(&page);

        let err = site.proceed_to_checkout().await.unwrap_err();
        assert!(matches!(err, Error::SoldOut(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_before_sale_opens() {
        let page = FakePage::new();
        item_page(&page, "即将开抢");
        let mut site = site_for(&page);

        let err = site.proceed_to_checkout().await.unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
        assert_eq!(page.click_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_without_payment_redirect_fails() {
        let page = FakePage::new();
        let s = SiteConfig::default().selectors;
        page.add(&s.submit_button, PageElement::text("提交订单"));
        let mut site = site_for(&page);

        let err = site.submit(true).await.unwrap_err();
        assert!(matches!(err, Error::Submission(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_sessions_disabled() {
        let page = FakePage::new();
        let s = SiteConfig::default().selectors;
        page.add(&s.detail_ready, PageElement::text(""));
        page.add(
            &s.session_item,
            PageElement::text("05.01").attr("class", "select_right_list_item_disabled"),
        );
        let mut site = site_for(&page);

        let err = site.open_target(ITEM).await.unwrap_err();
        assert!(matches!(err, Error::SoldOut(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_waits_for_attempt_in_progress() {
        let page = FakePage::new();
        item_page(&page, "立即购买");
        let s = SiteConfig::default().selectors;
        page.add(&s.search_list, PageElement::text(""));
        page.add(&s.item_title, PageElement::text("Concert"));
        page.add(&s.item_venue, PageElement::text("Arena"));
        page.add(&s.item_time, PageElement::text("2030.05.01 19:30"));
        page.add(&s.item_price, PageElement::text("¥380"));
        page.add(&s.item_link, PageElement::text("").attr("href", OTHER_ITEM));
        page.set_latency(Duration::from_millis(50));

        let mut config = Config::default();
        config.target.keyword = Some("concert".into());
        config.driver.element_timeout_ms = 1000;
        let site = TicketSite::new(page.shared(), &config, false);
        let cancel = CancellationToken::new();

        let mut settings = MonitorSettings::from_config(&config).unwrap();
        settings.normal_interval = Duration::from_millis(100);
        settings.rush_interval = Duration::from_millis(100);
        settings.request_delay = DelayRange { min_ms: 0, max_ms: 0 };
        settings.seed = Some(1);
        let mut monitor =
            AvailabilityMonitor::new(Arc::new(site.clone()), settings, cancel.child_token());

        let (tx, rx) = mpsc::channel::<TicketStatus>(1);
        monitor.register(
            "trigger",
            Arc::new(move |status: &TicketStatus| -> Result<()> {
                let _ = tx.try_send(status.clone());
                Ok(())
            }),
        );
        monitor.start();

        let mut acquisition = AcquisitionLoop::new(
            site,
            AcquisitionSettings {
                target_url: Some(ITEM.into()),
                start_time: None,
                max_attempts: 1,
                price_window: PriceRange::new(200.0, 500.0),
                priority: vec![],
                recipients: vec!["Bob".into()],
                required_recipients: 1,
                auto_submit: true,
            },
            BackoffPolicy::new(Duration::from_millis(500), None, Some(1)),
            cancel.child_token(),
        );
        let summary = acquisition.run_triggered(rx).await;
        monitor.stop().await;

        assert_eq!(summary.outcome, FinalOutcome::Success);
        assert!(monitor.last_report().unwrap().passes >= 2);

        // Nothing navigated the browser between choosing the session and submitting
        let events = page.events();
        let position = |event: PageEvent| events.iter().position(|e| *e == event).unwrap();
        let session = position(page.click_event(&s.session_item, 1));
        let checkout = position(page.click_event(&s.buy_button, 0));
        let submit = position(page.click_event(&s.submit_button, 0));
        assert!(session < checkout && checkout < submit);
        assert!(events[session..submit]
            .iter()
            .all(|e| !matches!(e, PageEvent::Navigate(_))));
    }
}
