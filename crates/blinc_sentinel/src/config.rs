//! Sentinel configuration
//!
//! Mirrors the attribute payload a host passes to a sentinel element:
//!
//! ```json
//! {
//!   "once": true,
//!   "sentinelClass": "feed-end",
//!   "configOptions": {
//!     "scrollableArea": "#feed",
//!     "viewportTolerance": { "bottom": 200 },
//!     "threshold": [0, 0.5]
//!   }
//! }
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use blinc_observer::{ObserverOptions, RootMargin, RootSpec, Threshold};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Class always present on the sentinel container
pub const SENTINEL_CLASS: &str = "intersection-observer-sentinel";

/// Root margin in pixels, each side defaulting to 0
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewportTolerance {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl From<ViewportTolerance> for RootMargin {
    fn from(t: ViewportTolerance) -> Self {
        RootMargin::new(t.top, t.right, t.bottom, t.left)
    }
}

/// A single ratio or an ordered list of ratios
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ThresholdSetting {
    Ratio(f64),
    Ratios(Vec<f64>),
}

impl Default for ThresholdSetting {
    fn default() -> Self {
        ThresholdSetting::Ratio(0.0)
    }
}

impl From<ThresholdSetting> for Threshold {
    fn from(setting: ThresholdSetting) -> Self {
        match setting {
            ThresholdSetting::Ratio(r) => Threshold::Single(r),
            ThresholdSetting::Ratios(list) => Threshold::Multiple(list),
        }
    }
}

/// Observation settings (`configOptions`)
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SentinelConfig {
    /// Selector of the scrollable ancestor; the viewport when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrollable_area: Option<String>,
    pub viewport_tolerance: ViewportTolerance,
    pub threshold: ThresholdSetting,
}

impl SentinelConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Observer options for these settings
    pub fn observer_options(&self) -> ObserverOptions {
        let root = match &self.scrollable_area {
            Some(selector) => RootSpec::Selector(selector.clone()),
            None => RootSpec::Viewport,
        };
        ObserverOptions {
            root,
            margin: self.viewport_tolerance.into(),
            threshold: self.threshold.clone().into(),
        }
    }
}

/// Component properties of a sentinel
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SentinelProps {
    /// Emit `enter` only the first time the target becomes visible
    pub once: bool,
    /// Render slot content only once the target has been visible
    pub block: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentinel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentinel_class: Option<String>,
    pub config_options: SentinelConfig,
}

impl SentinelProps {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Attributes of the wrapping container
    ///
    /// `None` with `block`: the slot content is rendered bare.
    pub fn container_attributes(&self) -> Option<ContainerAttributes> {
        if self.block {
            return None;
        }
        let id = self
            .sentinel_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let class = match self.sentinel_class.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("{} {}", SENTINEL_CLASS, extra),
            _ => SENTINEL_CLASS.to_string(),
        };

        Some(ContainerAttributes { id, class })
    }
}

/// `id`/`class` of the container a host renders around slot content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerAttributes {
    pub id: Option<String>,
    pub class: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let props = SentinelProps::from_json("{}").unwrap();
        assert_eq!(props, SentinelProps::default());
        assert_eq!(props.config_options.observer_options(), ObserverOptions::default());
    }

    #[test]
    fn test_full_payload() {
        let json = r##"{
            "once": true,
            "block": true,
            "sentinelId": "feed-sentinel",
            "sentinelClass": "feed-end",
            "configOptions": {
                "scrollableArea": "#feed",
                "viewportTolerance": { "bottom": 200, "top": 10 },
                "threshold": [0, 0.5]
            }
        }"##;
        let props = SentinelProps::from_json(json).unwrap();

        assert!(props.once);
        assert!(props.block);
        let options = props.config_options.observer_options();
        assert_eq!(options.root, RootSpec::Selector("#feed".into()));
        assert_eq!(options.margin, RootMargin::new(10.0, 0.0, 200.0, 0.0));
        assert_eq!(options.threshold, Threshold::Multiple(vec![0.0, 0.5]));
    }

    #[test]
    fn test_single_threshold() {
        let config = SentinelConfig::from_json(r#"{ "threshold": 0.25 }"#).unwrap();
        assert_eq!(config.threshold, ThresholdSetting::Ratio(0.25));
        assert_eq!(config.observer_options().threshold, Threshold::Single(0.25));
    }

    #[test]
    fn test_invalid_payload() {
        assert!(SentinelConfig::from_json(r#"{ "threshold": "half" }"#).is_err());
        assert!(SentinelProps::from_json("not json").is_err());
    }

    #[test]
    fn test_round_trip_omits_absent_fields() {
        let props = SentinelProps {
            once: true,
            ..Default::default()
        };
        let json = props.to_json().unwrap();
        assert!(!json.contains("sentinelId"));
        assert!(!json.contains("scrollableArea"));
        assert_eq!(SentinelProps::from_json(&json).unwrap(), props);
    }

    #[test]
    fn test_container_attributes() {
        let plain = SentinelProps::default().container_attributes().unwrap();
        assert_eq!(plain.id, None);
        assert_eq!(plain.class, SENTINEL_CLASS);

        let custom = SentinelProps {
            sentinel_id: Some(" load-more ".into()),
            sentinel_class: Some("feed-end".into()),
            ..Default::default()
        }
        .container_attributes()
        .unwrap();
        assert_eq!(custom.id.as_deref(), Some("load-more"));
        assert_eq!(custom.class, "intersection-observer-sentinel feed-end");

        let bare = SentinelProps {
            block: true,
            sentinel_class: Some("feed-end".into()),
            ..Default::default()
        };
        assert_eq!(bare.container_attributes(), None);
    }
}
