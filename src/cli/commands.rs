//! CLI command implementations

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::acquisition::{AcquisitionLoop, AcquisitionSettings, BackoffPolicy, RunSummary};
use crate::config::Config;
use crate::driver::{self, AutomationDriver, SharedDriver, WebDriverSession};
use crate::error::Error;
use crate::monitor::{AvailabilityMonitor, MonitorSettings, StopOutcome, TicketStatus};
use crate::schedule::WaitProgress;
use crate::site::TicketSite;

/// Wait for the sale start, then attempt the configured target until done
pub async fn run(config: &Config, interactive: bool) -> Result<RunSummary> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    info!(
        "Target: {} (start {})",
        config.target_url().unwrap_or_default(),
        config.target.start_time().unwrap_or("now")
    );

    let site = open_site(config, interactive).await?;
    let driver = site.driver().clone();

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(log_progress(progress_rx));

    let mut acquisition = AcquisitionLoop::new(
        site,
        AcquisitionSettings::from_config(config),
        BackoffPolicy::from_strategy(&config.strategy),
        cancel.clone(),
    )
    .with_progress(progress_tx);

    let summary = acquisition.run().await;
    progress.abort();

    finish(&driver, &summary, &cancel).await;
    Ok(summary)
}

/// Watch search results and attempt a purchase whenever a candidate turns buyable
pub async fn monitor(config: &Config, interactive: bool) -> Result<RunSummary> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let settings = MonitorSettings::from_config(config)?;
    let site = open_site(config, interactive).await?;
    let driver = site.driver().clone();

    let mut monitor = AvailabilityMonitor::new(Arc::new(site.clone()), settings, cancel.child_token());

    // One pending trigger at most; further sightings while an attempt runs are dropped
    let (trigger_tx, trigger_rx) = mpsc::channel::<TicketStatus>(1);
    monitor.register(
        "acquisition-trigger",
        Arc::new(move |status: &TicketStatus| -> crate::Result<()> {
            match trigger_tx.try_send(status.clone()) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    debug!("Attempt already pending, dropping trigger for {}", status.candidate.title);
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => {
                    Err(Error::Internal("acquisition loop has stopped".to_string()))
                }
            }
        }),
    );

    let acquisition_cancel = cancel.child_token();
    monitor.start();

    // The loop has nothing left to wait for once the monitor ends on its own
    let watcher = monitor.finished().map(|finished| {
        let acquisition_cancel = acquisition_cancel.clone();
        tokio::spawn(async move {
            finished.cancelled().await;
            acquisition_cancel.cancel();
        })
    });

    let mut acquisition = AcquisitionLoop::new(
        site,
        AcquisitionSettings::from_config(config),
        BackoffPolicy::from_strategy(&config.strategy),
        acquisition_cancel,
    );
    let summary = acquisition.run_triggered(trigger_rx).await;

    if let Some(watcher) = watcher {
        watcher.abort();
    }
    if monitor.stop().await == StopOutcome::TimedOut {
        warn!("Monitor task was aborted during shutdown");
    }
    if let Some(report) = monitor.last_report() {
        info!(
            "Monitor ran {} pass(es), {} notification(s)",
            report.passes, report.notifications
        );
    }

    finish(&driver, &summary, &cancel).await;
    Ok(summary)
}

/// Show configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check that a browser session can be opened
pub async fn check(config: &Config) -> Result<()> {
    println!("\n=== DRIVER CHECK ===\n");

    print!("Automation endpoint {}... ", config.driver.endpoint);
    let started = Instant::now();
    let mut session = match WebDriverSession::open(&config.driver, &config.risk_control).await {
        Ok(session) => {
            println!("OK ({}ms)", started.elapsed().as_millis());
            session
        }
        Err(e) => {
            println!("FAILED: {}", e);
            anyhow::bail!("driver check failed");
        }
    };

    print!("Login page {}... ", config.site.login_url);
    let navigated = session.navigate(&config.site.login_url).await;
    match &navigated {
        Ok(()) => println!("OK"),
        Err(e) => println!("FAILED: {}", e),
    }

    if let Err(e) = session.close_session().await {
        warn!("Failed to close check session: {}", e);
    }

    match config.target_url() {
        Some(url) => println!("Target URL... {}", url),
        None => println!("Target URL... NOT SET"),
    }

    navigated?;
    println!("\nAll checks passed");
    Ok(())
}

/// Open a browser session and log in
async fn open_site(config: &Config, interactive: bool) -> Result<TicketSite> {
    info!("Opening {:?} session at {}", config.driver.backend, config.driver.endpoint);
    let session = WebDriverSession::open_with_retry(&config.driver, &config.risk_control).await?;
    info!("Session {} ready", session.session_id());

    let site = TicketSite::new(driver::shared(session), config, interactive);
    if let Err(e) = site.login(&config.account).await {
        error!("Login failed: {}", e);
        close(site.driver()).await;
        return Err(e.into());
    }
    Ok(site)
}

/// Leave the browser open for payment after a success, then close the session
async fn finish(driver: &SharedDriver, summary: &RunSummary, cancel: &CancellationToken) {
    if summary.is_success() && !cancel.is_cancelled() {
        info!("Complete the payment in the browser window, press Ctrl-C when done");
        cancel.cancelled().await;
    }
    close(driver).await;
}

async fn close(driver: &SharedDriver) {
    if let Err(e) = driver.lock().await.close_session().await {
        warn!("Failed to close browser session: {}", e);
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            cancel.cancel();
        }
    });
}

async fn log_progress(mut rx: mpsc::UnboundedReceiver<WaitProgress>) {
    while let Some(progress) = rx.recv().await {
        info!("Sale opens in {}", format_remaining(progress.remaining));
    }
}

fn format_remaining(remaining: std::time::Duration) -> String {
    let secs = remaining.as_secs();
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60),
    }
}
