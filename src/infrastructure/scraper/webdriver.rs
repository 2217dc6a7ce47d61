use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::core::errors::GateError;
use crate::infrastructure::scraper::{QrImage, QrSource};

const PROFILE_BASE: &str = "https://saweria.co";

const AMOUNT_SELECTORS: &[&str] = &[
    "input[placeholder*=\"Ketik jumlah\" i]",
    "input[aria-label*=\"Nominal\" i]",
    "input[name=\"amount\"]",
    "input[type=\"number\"]",
];

const MESSAGE_SELECTORS: &[&str] = &[
    "input[name=\"message\"]",
    "input[data-testid=\"message-input\"]",
    "#message",
    "input[placeholder*=\"pesan\" i]",
    "textarea[name=\"message\"]",
    "textarea",
];

const DONATE_SELECTORS: &[&str] = &["button[data-testid=\"donate-button\"]", "button[type=\"submit\"]"];

const QR_SELECTORS: &[&str] = &[
    "img.qr-image",
    "img.qr-image--with-wrapper",
    "img[alt*=\"qr-code\" i]",
    "img[src*=\"/qr-code\"]",
    "[data-testid=\"qrcode\"] img",
    "[class*=\"qrcode\" i] img",
    "img[alt*=\"QRIS\" i]",
    "img[alt*=\"QR\" i]",
    "img[src^=\"data:image\"]",
    "canvas",
];

const PANEL_SELECTORS: &[&str] = &[
    "[data-testid=\"qrcode\"]",
    "[data-testid*=\"checkout\" i]",
    "[class*=\"checkout\" i]",
    "[class*=\"qrcode\" i]",
];

const FIELD_WAIT: Duration = Duration::from_millis(2000);
const QR_WAIT: Duration = Duration::from_millis(3200);
const RETRY_STEP: Duration = Duration::from_millis(1500);

fn scraper_error(e: impl std::fmt::Display) -> GateError {
    GateError::Scraper(e.to_string())
}

/// Drives a remote browser through the donation form on the provider's page.
pub struct WebDriverScraper {
    webdriver_url: String,
    username: Option<String>,
    payment_method: String,
    retries: u32,
    qr_selectors: Vec<String>,
    http: reqwest::Client,
}

impl WebDriverScraper {
    pub fn new(webdriver_url: &str, username: Option<String>, payment_method: &str, retries: u32) -> Self {
        WebDriverScraper {
            webdriver_url: webdriver_url.to_string(),
            username: username.filter(|u| !u.trim().is_empty()),
            payment_method: payment_method.trim().to_ascii_lowercase(),
            retries,
            qr_selectors: QR_SELECTORS.iter().map(|s| s.to_string()).collect(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Replaces the ordered list of CSS selectors tried when locating the QR.
    pub fn with_qr_selectors(mut self, selectors: Vec<String>) -> Self {
        if !selectors.is_empty() {
            self.qr_selectors = selectors;
        }
        self
    }

    fn profile_url(&self) -> Result<String, GateError> {
        self.username
            .as_deref()
            .map(|u| format!("{}/{}", PROFILE_BASE, u.trim().trim_start_matches('@')))
            .ok_or_else(|| GateError::ScraperNotConfigured("SAWERIA_USERNAME is not set".to_string()))
    }

    async fn connect(&self) -> Result<Client, GateError> {
        let capabilities = json!({
            "goog:chromeOptions": {
                "args": ["--headless=new", "--no-sandbox", "--disable-dev-shm-usage", "--window-size=1280,1800"]
            },
            "moz:firefoxOptions": { "args": ["-headless"] }
        });
        let capabilities = match capabilities {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        ClientBuilder::native()
            .capabilities(capabilities)
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| GateError::Scraper(format!("WebDriver session failed: {}", e)))
    }

    /// Runs `capture` in a fresh browser session and always closes it.
    async fn in_session(&self, capture: Capture<'_>) -> Result<QrImage, GateError> {
        let client = self.connect().await?;
        let result = match capture {
            Capture::Profile => self.capture_profile(&client).await,
            Capture::Checkout { amount, message } => self.capture_checkout(&client, amount, message, true).await,
            Capture::Panel { amount, message } => self.capture_checkout(&client, amount, message, false).await,
            Capture::Fill {
                amount,
                message,
                method,
            } => self.capture_filled_form(&client, amount, message, method).await,
        };
        if let Err(e) = client.close().await {
            warn!(error = %e, "WebDriver session did not close cleanly");
        }
        result
    }

    async fn capture_profile(&self, client: &Client) -> Result<QrImage, GateError> {
        client.goto(&self.profile_url()?).await.map_err(scraper_error)?;
        sleep(Duration::from_millis(800)).await;
        let png = client.screenshot().await.map_err(scraper_error)?;
        Ok(QrImage::png(png))
    }

    async fn capture_checkout(
        &self,
        client: &Client,
        amount: i64,
        message: &str,
        want_qr: bool,
    ) -> Result<QrImage, GateError> {
        client.goto(&self.profile_url()?).await.map_err(scraper_error)?;
        sleep(Duration::from_millis(600)).await;

        self.fill_form(client, amount, message, &self.payment_method).await;

        let windows_before = client.windows().await.map_err(scraper_error)?;
        if click_first(client, DONATE_SELECTORS).await.is_none() {
            warn!("Donate button not found");
        }
        sleep(Duration::from_millis(1500)).await;
        follow_new_window(client, windows_before.len()).await;

        if want_qr {
            let selectors: Vec<&str> = self.qr_selectors.iter().map(String::as_str).collect();
            if let Some((selector, element)) = find_first(client, &selectors, QR_WAIT).await {
                info!(selector, "QR element located");
                return self.extract_image(client, &element).await;
            }
            warn!("QR element not found, falling back to checkout panel");
        }

        if let Some((selector, panel)) = find_first(client, PANEL_SELECTORS, QR_WAIT).await {
            if let Ok(png) = panel.screenshot().await {
                info!(selector, bytes = png.len(), "Captured checkout panel");
                return Ok(QrImage::png(png));
            }
        }

        let png = client.screenshot().await.map_err(scraper_error)?;
        warn!(bytes = png.len(), "No QR element, returning page screenshot");
        Ok(QrImage::png(png))
    }

    async fn capture_filled_form(
        &self,
        client: &Client,
        amount: i64,
        message: &str,
        method: &str,
    ) -> Result<QrImage, GateError> {
        client.goto(&self.profile_url()?).await.map_err(scraper_error)?;
        sleep(Duration::from_millis(600)).await;
        self.fill_form(client, amount, message, method).await;
        let png = client.screenshot().await.map_err(scraper_error)?;
        Ok(QrImage::png(png))
    }

    async fn fill_form(&self, client: &Client, amount: i64, message: &str, method: &str) {
        match find_first(client, AMOUNT_SELECTORS, FIELD_WAIT).await {
            Some((selector, input)) => {
                let _ = input.clear().await;
                if input.send_keys(&amount.to_string()).await.is_ok() {
                    info!(selector, "Filled amount");
                }
            }
            None => warn!("Amount input not found"),
        }

        match find_first(client, MESSAGE_SELECTORS, FIELD_WAIT).await {
            Some((selector, input)) => {
                let _ = input.clear().await;
                if input.send_keys(message).await.is_ok() {
                    info!(selector, "Filled message");
                }
            }
            None => warn!("Message input not found"),
        }

        let method_selectors = [
            format!("[data-testid=\"{}-button\"]", method),
            format!("button[data-testid=\"{}-button\"]", method),
            format!("[data-testid*=\"{}\"]", method),
        ];
        let method_selectors: Vec<&str> = method_selectors.iter().map(String::as_str).collect();
        if click_first(client, &method_selectors).await.is_none() {
            warn!(method, "Payment method button not found");
        }
        sleep(Duration::from_millis(250)).await;
    }

    /// Image bytes for a located QR: inline data URL, then the downloaded
    /// `src`, then a screenshot of the element itself.
    async fn extract_image(&self, client: &Client, element: &Element) -> Result<QrImage, GateError> {
        let src = match element.prop("currentSrc").await {
            Ok(Some(src)) if !src.is_empty() => Some(src),
            _ => element.attr("src").await.ok().flatten(),
        };

        if let Some(src) = src.filter(|s| !s.is_empty()) {
            if src.starts_with("data:image/") {
                match QrImage::from_data_url(&src) {
                    Ok(image) => return Ok(image),
                    Err(e) => warn!(error = %e, "Inline QR could not be decoded"),
                }
            } else if let Some(image) = self.download(client, &src).await {
                return Ok(image);
            }
        }

        let png = element.screenshot().await.map_err(scraper_error)?;
        Ok(QrImage::png(png))
    }

    async fn download(&self, client: &Client, src: &str) -> Option<QrImage> {
        let page = client.current_url().await.ok()?;
        let url = page.join(src).ok()?;
        let response = self
            .http
            .get(url.as_str())
            .header("Referer", page.as_str())
            .header("Accept", "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "QR download failed");
            return None;
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await.ok()?.to_vec();
        if bytes.is_empty() {
            return None;
        }
        Some(match mime {
            Some(mime) => QrImage::new(mime, bytes),
            None => QrImage::from_bytes(bytes),
        })
    }
}

enum Capture<'a> {
    Profile,
    Checkout { amount: i64, message: &'a str },
    Panel { amount: i64, message: &'a str },
    Fill { amount: i64, message: &'a str, method: &'a str },
}

async fn find_first(client: &Client, selectors: &[&str], wait: Duration) -> Option<(String, Element)> {
    for selector in selectors {
        if let Ok(element) = client.wait().at_most(wait).for_element(Locator::Css(selector)).await {
            return Some((selector.to_string(), element));
        }
    }
    None
}

async fn click_first(client: &Client, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        if let Ok(element) = client.find(Locator::Css(selector)).await {
            if element.click().await.is_ok() {
                info!(selector, "Clicked");
                return Some(selector.to_string());
            }
        }
    }
    None
}

/// Checkout may open in a new tab.
async fn follow_new_window(client: &Client, known: usize) {
    let Ok(windows) = client.windows().await else {
        return;
    };
    if windows.len() > known {
        if let Some(latest) = windows.into_iter().last() {
            match client.switch_to_window(latest).await {
                Ok(()) => info!("Switched to checkout window"),
                Err(e) => warn!(error = %e, "Could not switch to checkout window"),
            }
            sleep(Duration::from_millis(1200)).await;
        }
    }
}

#[async_trait]
impl QrSource for WebDriverScraper {
    async fn fetch_qr(&self, amount: i64, message: &str) -> Result<QrImage, GateError> {
        self.profile_url()?;
        let attempts = self.retries.max(1);
        let mut last_error = GateError::Scraper("no attempt made".to_string());
        for attempt in 1..=attempts {
            match self.in_session(Capture::Checkout { amount, message }).await {
                Ok(image) => {
                    info!(attempt, bytes = image.bytes.len(), "QR captured");
                    return Ok(image);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "QR capture failed");
                    last_error = e;
                }
            }
            if attempt < attempts {
                sleep(RETRY_STEP * attempt).await;
            }
        }
        Err(last_error)
    }

    async fn profile_snapshot(&self) -> Result<QrImage, GateError> {
        self.in_session(Capture::Profile).await
    }

    async fn checkout_snapshot(&self, amount: i64, message: &str) -> Result<QrImage, GateError> {
        self.in_session(Capture::Panel { amount, message }).await
    }

    async fn fill_snapshot(&self, amount: i64, message: &str, method: Option<&str>) -> Result<QrImage, GateError> {
        let method = method
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.payment_method.clone());
        self.in_session(Capture::Fill {
            amount,
            message,
            method: &method,
        })
        .await
    }
}
