//! Stealth profiles, tempo plans and the per-site policy that pairs them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize profile bundle: {0}")]
    Deserialize(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthProfileBundle {
    pub profiles: Vec<StealthProfile>,
    #[serde(default)]
    pub tempos: Vec<TempoPlan>,
    #[serde(default)]
    pub policy: Option<StealthPolicy>,
}

impl Default for StealthProfileBundle {
    fn default() -> Self {
        Self {
            profiles: vec![StealthProfile::default()],
            tempos: vec![TempoPlan::default()],
            policy: None,
        }
    }
}

/// Browser identity presented to the site. Every field feeds either a CDP
/// emulation override or the fingerprint init script, so they stay coherent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthProfile {
    pub name: String,
    pub user_agent: String,
    #[serde(default)]
    pub accept_language: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default = "StealthProfile::default_hardware_concurrency")]
    pub hardware_concurrency: u32,
    #[serde(default)]
    pub webgl: Option<WebGlIdentity>,
    #[serde(default = "StealthProfile::default_canvas_noise")]
    pub canvas_noise: bool,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

impl StealthProfile {
    fn default_hardware_concurrency() -> u32 {
        8
    }

    fn default_canvas_noise() -> bool {
        true
    }

    /// Languages list for `navigator.languages`, derived from the Accept-Language.
    pub fn languages(&self) -> Vec<String> {
        let source = self
            .accept_language
            .as_deref()
            .or(self.locale.as_deref())
            .unwrap_or("en-US,en");
        source
            .split(',')
            .map(|part| part.split(';').next().unwrap_or("").trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    }
}

impl Default for StealthProfile {
    fn default() -> Self {
        Self {
            name: "desktop-ca".into(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
                .into(),
            accept_language: Some("en-CA,en;q=0.9".into()),
            platform: Some("MacIntel".into()),
            locale: Some("en-CA".into()),
            timezone: Some("America/Toronto".into()),
            viewport: Some(Viewport::default()),
            hardware_concurrency: Self::default_hardware_concurrency(),
            webgl: Some(WebGlIdentity::default()),
            canvas_noise: true,
            extra_headers: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    #[serde(default)]
    pub mobile: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 900,
            device_scale_factor: 1.0,
            mobile: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebGlIdentity {
    pub vendor: String,
    pub renderer: String,
}

impl Default for WebGlIdentity {
    fn default() -> Self {
        Self {
            vendor: "Intel Inc.".into(),
            renderer: "Intel Iris Pro OpenGL Engine".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthPolicy {
    pub defaults: StealthSitePolicy,
    #[serde(default)]
    pub sites: Vec<StealthSitePolicyEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthSitePolicy {
    pub profile: String,
    pub tempo: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StealthSitePolicyEntry {
    pub match_pattern: String,
    pub profile: Option<String>,
    pub tempo: Option<String>,
}

/// Inclusive millisecond range a random delay is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub(crate) fn bounds(&self) -> (u64, u64) {
        if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TempoPlan {
    pub name: String,
    /// Pause between coarse actions (navigation, clicks on page controls).
    #[serde(default = "TempoPlan::default_action")]
    pub action: DelayRange,
    /// Short hesitation inside a composite action.
    #[serde(default = "TempoPlan::default_short")]
    pub short: DelayRange,
    #[serde(default)]
    pub mouse: MouseTempoPlan,
    #[serde(default)]
    pub typing: TypingTempoPlan,
    #[serde(default)]
    pub scroll: ScrollTempoPlan,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TempoPlan {
    fn default_action() -> DelayRange {
        DelayRange::new(800, 2200)
    }

    fn default_short() -> DelayRange {
        DelayRange::new(150, 450)
    }

    /// Zero-delay plan used by tests and dry runs.
    pub fn instant() -> Self {
        let zero = DelayRange::new(0, 0);
        Self {
            name: "instant".into(),
            action: zero,
            short: zero,
            mouse: MouseTempoPlan {
                press: zero,
                ..MouseTempoPlan::default()
            },
            typing: TypingTempoPlan { per_key: zero },
            scroll: ScrollTempoPlan {
                pause: zero,
                ..ScrollTempoPlan::default()
            },
            seed: Some(0),
        }
    }
}

impl Default for TempoPlan {
    fn default() -> Self {
        Self {
            name: "human".into(),
            action: Self::default_action(),
            short: Self::default_short(),
            mouse: MouseTempoPlan::default(),
            typing: TypingTempoPlan::default(),
            scroll: ScrollTempoPlan::default(),
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MouseTempoPlan {
    /// Steps from the cursor to the intermediate waypoint.
    #[serde(default = "MouseTempoPlan::default_waypoint_steps")]
    pub waypoint_steps: (u32, u32),
    /// Steps from the waypoint to the target.
    #[serde(default = "MouseTempoPlan::default_target_steps")]
    pub target_steps: (u32, u32),
    /// Horizontal and vertical band the waypoint is drawn from.
    #[serde(default = "MouseTempoPlan::default_waypoint_x")]
    pub waypoint_x: (f64, f64),
    #[serde(default = "MouseTempoPlan::default_waypoint_y")]
    pub waypoint_y: (f64, f64),
    /// Fraction of the target box a click may land in, on each axis.
    #[serde(default = "MouseTempoPlan::default_click_inset")]
    pub click_inset: (f64, f64),
    #[serde(default = "MouseTempoPlan::default_press")]
    pub press: DelayRange,
    #[serde(default)]
    pub jitter_px: f64,
}

impl MouseTempoPlan {
    fn default_waypoint_steps() -> (u32, u32) {
        (4, 8)
    }

    fn default_target_steps() -> (u32, u32) {
        (6, 14)
    }

    fn default_waypoint_x() -> (f64, f64) {
        (200.0, 900.0)
    }

    fn default_waypoint_y() -> (f64, f64) {
        (150.0, 600.0)
    }

    fn default_click_inset() -> (f64, f64) {
        (0.25, 0.75)
    }

    fn default_press() -> DelayRange {
        DelayRange::new(40, 120)
    }
}

impl Default for MouseTempoPlan {
    fn default() -> Self {
        Self {
            waypoint_steps: Self::default_waypoint_steps(),
            target_steps: Self::default_target_steps(),
            waypoint_x: Self::default_waypoint_x(),
            waypoint_y: Self::default_waypoint_y(),
            click_inset: Self::default_click_inset(),
            press: Self::default_press(),
            jitter_px: 1.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypingTempoPlan {
    #[serde(default = "TypingTempoPlan::default_per_key")]
    pub per_key: DelayRange,
}

impl TypingTempoPlan {
    fn default_per_key() -> DelayRange {
        DelayRange::new(60, 160)
    }
}

impl Default for TypingTempoPlan {
    fn default() -> Self {
        Self {
            per_key: Self::default_per_key(),
        }
    }
}

/// Incidental "glance down, drift back up" scroll.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrollTempoPlan {
    #[serde(default = "ScrollTempoPlan::default_down_px")]
    pub down_px: (u32, u32),
    #[serde(default = "ScrollTempoPlan::default_pause")]
    pub pause: DelayRange,
    #[serde(default = "ScrollTempoPlan::default_up_px")]
    pub up_px: (u32, u32),
}

impl ScrollTempoPlan {
    fn default_down_px() -> (u32, u32) {
        (200, 500)
    }

    fn default_pause() -> DelayRange {
        DelayRange::new(400, 1000)
    }

    fn default_up_px() -> (u32, u32) {
        (50, 150)
    }
}

impl Default for ScrollTempoPlan {
    fn default() -> Self {
        Self {
            down_px: Self::default_down_px(),
            pause: Self::default_pause(),
            up_px: Self::default_up_px(),
        }
    }
}

pub fn load_bundle_from_reader<R: Read>(
    mut reader: R,
) -> Result<StealthProfileBundle, ConfigError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    parse_bundle_str(&buf)
}

pub fn load_bundle_from_path(path: impl AsRef<Path>) -> Result<StealthProfileBundle, ConfigError> {
    let file = File::open(path.as_ref())?;
    load_bundle_from_reader(file)
}

pub fn parse_bundle_str(raw: &str) -> Result<StealthProfileBundle, ConfigError> {
    match serde_json::from_str(raw) {
        Ok(bundle) => Ok(bundle),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            ConfigError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}
