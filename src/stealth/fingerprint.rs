//! Fingerprint normalizer: generates internally-consistent
//! browser device properties and validates them against a coherence
//! predicate before a scraping session ever touches a page.
//!
//! Distributions are grounded in `original_source/src/stealth/fingerprint.py`
//! (browser/platform/version tables, timezone-by-language heuristic, the
//! canonical per-browser plugin set).

use parking_lot::Mutex;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use super::errors::{StealthError, StealthResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserFingerprint {
    pub user_agent: String,
    pub platform: String,
    pub platform_version: String,
    pub browser: String,
    pub browser_version: String,
    pub language: String,
    pub timezone: String,
    pub timezone_offset_minutes: i32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub device_pixel_ratio: f32,
    pub color_depth: u8,
    pub plugins: Vec<String>,
    pub consistent: bool,
}

const BROWSERS: &[&str] = &["Chrome", "Firefox", "Safari"];

fn browser_versions(browser: &str) -> &'static [&'static str] {
    match browser {
        "Chrome" => &[
            "120.0.6099.129",
            "120.0.6099.110",
            "119.0.6045.159",
            "119.0.6045.105",
            "118.0.5993.232",
            "118.0.5993.70",
        ],
        "Firefox" => &["121.0", "120.0", "119.0", "118.0"],
        _ => &["17.2.1", "17.2", "17.1.2", "17.1.1"],
    }
}

const SCREEN_RESOLUTIONS: &[(u32, u32)] = &[
    (1920, 1080),
    (1366, 768),
    (1440, 900),
    (2560, 1440),
    (1280, 720),
    (2560, 1600),
    (1600, 900),
    (1024, 768),
    (3840, 2160),
];

fn timezones_for_language(language: &str) -> &'static [&'static str] {
    match language {
        "en-US" => &["America/New_York", "America/Chicago", "America/Denver", "America/Los_Angeles", "UTC"],
        "en-GB" => &["Europe/London", "Europe/Dublin", "UTC"],
        "en-AU" => &["Australia/Sydney", "Australia/Melbourne", "Australia/Brisbane"],
        "fr-FR" => &["Europe/Paris", "UTC"],
        "de-DE" => &["Europe/Berlin", "UTC"],
        "es-ES" => &["Europe/Madrid", "UTC"],
        "ja-JP" => &["Asia/Tokyo", "UTC"],
        "zh-CN" => &["Asia/Shanghai", "UTC"],
        "pt-BR" => &["America/Sao_Paulo", "UTC"],
        "ru-RU" => &["Europe/Moscow", "UTC"],
        _ => &["UTC"],
    }
}

const LANGUAGES: &[&str] = &[
    "en-US", "en-GB", "en-AU", "fr-FR", "de-DE", "es-ES", "ja-JP", "zh-CN", "pt-BR", "ru-RU",
];

fn timezone_offset_minutes(timezone: &str) -> i32 {
    match timezone {
        "UTC" => 0,
        "America/New_York" => -300,
        "America/Chicago" => -360,
        "America/Denver" => -420,
        "America/Los_Angeles" => -480,
        "Europe/London" | "Europe/Dublin" => 0,
        "Europe/Paris" | "Europe/Berlin" | "Europe/Madrid" => 60,
        "Asia/Tokyo" => 540,
        "Australia/Sydney" => 660,
        "Australia/Melbourne" | "Australia/Brisbane" => 600,
        "Asia/Shanghai" => 480,
        "America/Sao_Paulo" => -180,
        "Europe/Moscow" => 180,
        _ => 0,
    }
}

fn chrome_plugins() -> Vec<String> {
    ["Chrome PDF Plugin", "Chrome PDF Viewer", "Native Client Plugin"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn firefox_plugins() -> Vec<String> {
    vec!["Firefox built-in plugins".to_string()]
}

fn plugins_for(browser: &str) -> Vec<String> {
    match browser {
        "Chrome" => chrome_plugins(),
        "Firefox" => firefox_plugins(),
        _ => Vec::new(),
    }
}

fn platform_for(browser: &str, rng: &mut impl Rng) -> (&'static str, &'static str) {
    if browser == "Safari" {
        return ("macOS", "13.5");
    }
    match ["Linux", "macOS", "Windows"].choose(rng).copied().unwrap_or("Linux") {
        "macOS" => ("macOS", "13.5"),
        "Windows" => ("Windows", "10.0"),
        _ => ("Linux", "5.10"),
    }
}

fn user_agent_for(browser: &str, platform: &str, version: &str) -> String {
    match browser {
        "Chrome" => match platform {
            "Linux" => format!("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36"),
            "macOS" => format!("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36"),
            _ => format!("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version} Safari/537.36"),
        },
        "Firefox" => match platform {
            "Linux" => format!("Mozilla/5.0 (X11; Linux x86_64; rv:{version}.0) Gecko/20100101 Firefox/{version}.0"),
            "macOS" => format!("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7; rv:{version}.0) Gecko/20100101 Firefox/{version}.0"),
            _ => format!("Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:{version}.0) Gecko/20100101 Firefox/{version}.0"),
        },
        _ => format!("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{version} Safari/605.1.15"),
    }
}

fn is_valid_bcp47(tag: &str) -> bool {
    let parts: Vec<&str> = tag.split('-').collect();
    if parts.is_empty() || parts.len() > 2 {
        return false;
    }
    if parts[0].len() != 2 || !parts[0].chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    if let Some(region) = parts.get(1) {
        if region.len() != 2 || !region.chars().all(|c| c.is_ascii_alphabetic()) {
            return false;
        }
    }
    true
}

/// Checks all 8 coherence conditions from spec.md §4.D, returning every
/// violation found (empty means coherent).
#[must_use]
pub fn validate_coherence(fp: &BrowserFingerprint) -> Vec<String> {
    let mut errors = Vec::new();
    let ua = fp.user_agent.to_lowercase();

    match fp.browser.as_str() {
        "Chrome" if !ua.contains("chrome") => errors.push("user-agent missing Chrome token".into()),
        "Firefox" if !ua.contains("firefox") => errors.push("user-agent missing Firefox token".into()),
        "Safari" if !ua.contains("safari") => errors.push("user-agent missing Safari token".into()),
        _ => {}
    }

    match fp.platform.as_str() {
        "Windows" if !ua.contains("windows") => errors.push("user-agent missing Windows token".into()),
        "macOS" if !ua.replace("macintosh", "").contains("mac") => {
            errors.push("user-agent missing macOS token".into())
        }
        "Linux" if !ua.contains("linux") && !ua.contains("x11") => {
            errors.push("user-agent missing Linux token".into())
        }
        _ => {}
    }
    if fp.browser == "Safari" && fp.platform != "macOS" {
        errors.push("Safari fingerprint must report macOS platform".into());
    }

    let language_region = fp.language.split('-').nth(1).unwrap_or("").to_uppercase();
    if matches!(language_region.as_str(), "US" | "CA")
        && !matches!(
            fp.timezone.as_str(),
            "America/New_York" | "America/Chicago" | "America/Denver" | "America/Los_Angeles" | "UTC"
        )
    {
        errors.push(format!("timezone {} does not match {} language region", fp.timezone, fp.language));
    }

    let expected_plugins = plugins_for(&fp.browser);
    if fp.browser != "Safari" && fp.plugins != expected_plugins {
        errors.push(format!("{} fingerprint has wrong plugin set", fp.browser));
    }

    if fp.screen_width < 800 || fp.screen_height < 600 {
        errors.push(format!("screen resolution too small: {}x{}", fp.screen_width, fp.screen_height));
    }
    if fp.screen_width > 7680 || fp.screen_height > 4320 {
        errors.push(format!("screen resolution unrealistically large: {}x{}", fp.screen_width, fp.screen_height));
    }

    if !matches!(fp.device_pixel_ratio, 1.0 | 1.5 | 2.0) {
        errors.push(format!("device pixel ratio {} is unusual", fp.device_pixel_ratio));
    }

    if !matches!(fp.color_depth, 24 | 32) {
        errors.push(format!("color depth {} is invalid", fp.color_depth));
    }

    if !is_valid_bcp47(&fp.language) {
        errors.push(format!("language '{}' is not a valid BCP-47 tag", fp.language));
    }

    errors
}

/// Widely-compatible fallback fingerprint used when repeated generation
/// attempts fail to produce a coherent one.
#[must_use]
pub fn safe_defaults() -> BrowserFingerprint {
    BrowserFingerprint {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
        platform: "Linux".into(),
        platform_version: "5.10".into(),
        browser: "Chrome".into(),
        browser_version: "120.0.0.0".into(),
        language: "en-US".into(),
        timezone: "UTC".into(),
        timezone_offset_minutes: 0,
        screen_width: 1920,
        screen_height: 1080,
        device_pixel_ratio: 1.0,
        color_depth: 24,
        plugins: chrome_plugins(),
        consistent: true,
    }
}

/// Generates and caches fingerprints, enforcing the coherence predicate.
///
/// Caching (when enabled) reuses a single fingerprint for the lifetime of
/// this normalizer so repeated calls within one session never drift.
pub struct FingerprintNormalizer {
    cache_fingerprints: bool,
    cached: Mutex<Option<BrowserFingerprint>>,
    max_attempts: u32,
}

impl FingerprintNormalizer {
    #[must_use]
    pub fn new(cache_fingerprints: bool) -> Self {
        Self { cache_fingerprints, cached: Mutex::new(None), max_attempts: 5 }
    }

    /// Generates a coherent fingerprint, optionally pinned to a browser
    /// family and/or language. Falls back to [`safe_defaults`] after
    /// `max_attempts` incoherent generations.
    pub fn generate(&self, browser: Option<&str>, language: Option<&str>) -> StealthResult<BrowserFingerprint> {
        if self.cache_fingerprints {
            if let Some(fp) = self.cached.lock().clone() {
                return Ok(fp);
            }
        }

        let mut rng = rand::rng();
        let mut last_errors = Vec::new();

        for _ in 0..self.max_attempts {
            let browser = browser.unwrap_or_else(|| BROWSERS.choose(&mut rng).copied().unwrap_or("Chrome"));
            let language = language.unwrap_or_else(|| LANGUAGES.choose(&mut rng).copied().unwrap_or("en-US"));

            let (platform, platform_version) = platform_for(browser, &mut rng);
            let browser_version = browser_versions(browser).choose(&mut rng).copied().unwrap_or("120.0.0.0");
            let user_agent = user_agent_for(browser, platform, browser_version);
            let (screen_width, screen_height) = *SCREEN_RESOLUTIONS.choose(&mut rng).unwrap_or(&(1920, 1080));
            let timezone = timezones_for_language(language).choose(&mut rng).copied().unwrap_or("UTC");
            let device_pixel_ratio = *[1.0_f32, 1.5, 2.0].choose(&mut rng).unwrap_or(&1.0);
            let color_depth = *[24_u8, 32].choose(&mut rng).unwrap_or(&24);

            let fp = BrowserFingerprint {
                user_agent,
                platform: platform.to_string(),
                platform_version: platform_version.to_string(),
                browser: browser.to_string(),
                browser_version: browser_version.to_string(),
                language: language.to_string(),
                timezone: timezone.to_string(),
                timezone_offset_minutes: timezone_offset_minutes(timezone),
                screen_width,
                screen_height,
                device_pixel_ratio,
                color_depth,
                plugins: plugins_for(browser),
                consistent: true,
            };

            let errors = validate_coherence(&fp);
            if errors.is_empty() {
                if self.cache_fingerprints {
                    *self.cached.lock() = Some(fp.clone());
                }
                return Ok(fp);
            }
            last_errors = errors;
        }

        tracing::warn!(errors = ?last_errors, "fingerprint generation did not converge, falling back to safe defaults");
        let fallback = safe_defaults();
        if self.cache_fingerprints {
            *self.cached.lock() = Some(fallback.clone());
        }
        Ok(fallback)
    }

    pub fn clear_cache(&self) {
        *self.cached.lock() = None;
    }
}

impl Default for FingerprintNormalizer {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_fingerprint_is_coherent() {
        let normalizer = FingerprintNormalizer::new(false);
        for _ in 0..20 {
            let fp = normalizer.generate(None, None).unwrap();
            assert!(validate_coherence(&fp).is_empty(), "incoherent: {fp:?}");
        }
    }

    #[test]
    fn caching_reuses_the_same_fingerprint() {
        let normalizer = FingerprintNormalizer::new(true);
        let first = normalizer.generate(None, None).unwrap();
        let second = normalizer.generate(None, None).unwrap();
        assert_eq!(first.user_agent, second.user_agent);
    }

    #[test]
    fn safari_always_reports_macos() {
        let normalizer = FingerprintNormalizer::new(false);
        for _ in 0..20 {
            let fp = normalizer.generate(Some("Safari"), None).unwrap();
            assert_eq!(fp.platform, "macOS");
        }
    }

    #[test]
    fn safe_defaults_are_coherent() {
        assert!(validate_coherence(&safe_defaults()).is_empty());
    }

    #[test]
    fn rejects_malformed_language_tags() {
        assert!(!is_valid_bcp47("english"));
        assert!(!is_valid_bcp47("en-USA"));
        assert!(is_valid_bcp47("en-US"));
        assert!(is_valid_bcp47("fr"));
    }
}
