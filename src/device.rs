//! Device classification
//!
//! Mobile and desktop hosts behave differently: mobile sizes the canvas from
//! the screen, reacts to orientation changes only, and pins every parallax
//! signal to zero. The class is decided once at mount and passed around as a
//! value.

use crate::renderer::Extent;
use serde::Deserialize;

/// Viewport width at or below which a host counts as mobile
pub const MOBILE_MAX_WIDTH: u32 = 768;

/// User agent fragments that identify a mobile browser
const MOBILE_TOKENS: &[&str] = &[
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
    "mobile",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mobile,
    Desktop,
}

impl DeviceClass {
    pub fn is_mobile(self) -> bool {
        self == DeviceClass::Mobile
    }
}

/// Configured override for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    #[default]
    Auto,
    Mobile,
    Desktop,
}

/// What the host currently knows about its display and input state
#[derive(Debug, Clone, PartialEq)]
pub struct HostMetrics {
    pub user_agent: String,
    /// Visible area; changes when browser chrome or window size changes
    pub viewport: Extent,
    /// Physical screen; only changes on rotation
    pub screen: Extent,
    /// Absolute vertical scroll offset in pixels
    pub scroll_y: f32,
}

impl HostMetrics {
    pub fn new(user_agent: impl Into<String>, viewport: Extent, screen: Extent) -> Self {
        Self {
            user_agent: user_agent.into(),
            viewport,
            screen,
            scroll_y: 0.0,
        }
    }

    /// Canvas extent for a device class: the screen on mobile (address-bar
    /// show/hide would otherwise resize it), the viewport on desktop
    pub fn canvas_extent(&self, device: DeviceClass) -> Extent {
        match device {
            DeviceClass::Mobile => self.screen,
            DeviceClass::Desktop => self.viewport,
        }
    }
}

/// True when the user agent names a mobile platform
pub fn is_mobile_user_agent(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    MOBILE_TOKENS.iter().any(|token| ua.contains(token))
}

/// Classify the host, honouring an explicit override
pub fn classify(metrics: &HostMetrics, mode: DeviceMode) -> DeviceClass {
    match mode {
        DeviceMode::Mobile => DeviceClass::Mobile,
        DeviceMode::Desktop => DeviceClass::Desktop,
        DeviceMode::Auto => {
            let narrow = metrics.viewport.width > 0 && metrics.viewport.width <= MOBILE_MAX_WIDTH;
            if is_mobile_user_agent(&metrics.user_agent) || narrow {
                DeviceClass::Mobile
            } else {
                DeviceClass::Desktop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESKTOP_UA: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
    const PHONE_UA: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";

    fn metrics(ua: &str, width: u32) -> HostMetrics {
        HostMetrics::new(ua, Extent::new(width, 900), Extent::new(width, 1000))
    }

    #[test]
    fn wide_desktop_is_desktop() {
        assert_eq!(classify(&metrics(DESKTOP_UA, 1920), DeviceMode::Auto), DeviceClass::Desktop);
    }

    #[test]
    fn mobile_user_agent_is_mobile() {
        assert!(is_mobile_user_agent(PHONE_UA));
        assert!(is_mobile_user_agent("Opera Mini/8.0"));
        assert_eq!(classify(&metrics(PHONE_UA, 1024), DeviceMode::Auto), DeviceClass::Mobile);
    }

    #[test]
    fn narrow_viewport_is_mobile() {
        assert_eq!(classify(&metrics(DESKTOP_UA, 768), DeviceMode::Auto), DeviceClass::Mobile);
        assert_eq!(classify(&metrics(DESKTOP_UA, 769), DeviceMode::Auto), DeviceClass::Desktop);
    }

    #[test]
    fn unknown_viewport_does_not_force_mobile() {
        assert_eq!(classify(&metrics(DESKTOP_UA, 0), DeviceMode::Auto), DeviceClass::Desktop);
    }

    #[test]
    fn override_wins() {
        assert_eq!(classify(&metrics(PHONE_UA, 300), DeviceMode::Desktop), DeviceClass::Desktop);
        assert_eq!(classify(&metrics(DESKTOP_UA, 2560), DeviceMode::Mobile), DeviceClass::Mobile);
    }

    #[test]
    fn canvas_extent_follows_device() {
        let m = HostMetrics::new(DESKTOP_UA, Extent::new(400, 700), Extent::new(400, 800));
        assert_eq!(m.canvas_extent(DeviceClass::Mobile), Extent::new(400, 800));
        assert_eq!(m.canvas_extent(DeviceClass::Desktop), Extent::new(400, 700));
    }
}
