//! WebDriver capability profiles
//!
//! Desktop Chrome goes through chromedriver with `goog:chromeOptions`; mobile
//! Chrome goes through Appium with `appium:`-prefixed vendor capabilities.

use serde_json::{json, Map, Value};

use crate::config::{DriverBackend, DriverConfig, RiskControlConfig};

/// Build the `capabilities` object for a new-session request
pub fn build(driver: &DriverConfig, risk: &RiskControlConfig) -> Value {
    let always_match = match driver.backend {
        DriverBackend::Chrome => chrome(driver, risk),
        DriverBackend::Appium => appium(driver),
    };

    json!({ "capabilities": { "alwaysMatch": always_match } })
}

fn chrome(driver: &DriverConfig, risk: &RiskControlConfig) -> Value {
    let mut args = vec![
        format!(
            "--window-size={},{}",
            driver.window.width, driver.window.height
        ),
        // Hides navigator.webdriver
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
    ];

    if driver.headless {
        args.push("--headless=new".to_string());
    }

    if let Some(ua) = driver.user_agent.as_deref().filter(|ua| !ua.is_empty()) {
        args.push(format!("--user-agent={}", ua));
    }

    if let Some(proxy) = proxy_server(risk) {
        args.push(format!("--proxy-server={}", proxy));
    }

    json!({
        "browserName": "chrome",
        "goog:chromeOptions": {
            "args": args,
            "excludeSwitches": ["enable-automation"],
            "useAutomationExtension": false,
        }
    })
}

fn appium(driver: &DriverConfig) -> Value {
    let appium = &driver.appium;
    let mut caps = Map::new();

    caps.insert("platformName".into(), json!(appium.platform_name));
    caps.insert("browserName".into(), json!("Chrome"));
    caps.insert("appium:automationName".into(), json!("UiAutomator2"));
    caps.insert("appium:noReset".into(), json!(true));
    caps.insert(
        "appium:newCommandTimeout".into(),
        json!(appium.new_command_timeout_secs),
    );

    if !appium.platform_version.is_empty() {
        caps.insert(
            "appium:platformVersion".into(),
            json!(appium.platform_version),
        );
    }
    if !appium.device_name.is_empty() {
        caps.insert("appium:deviceName".into(), json!(appium.device_name));
    }
    if let Some(path) = appium.chromedriver_path.as_deref().filter(|p| !p.is_empty()) {
        caps.insert("appium:chromedriverExecutable".into(), json!(path));
    }

    Value::Object(caps)
}

/// `--proxy-server` value. Chrome ignores credentials in this flag, so they are left out.
fn proxy_server(risk: &RiskControlConfig) -> Option<String> {
    if !risk.use_proxy {
        return None;
    }
    risk.proxy.as_ref().map(|p| p.server())
}
