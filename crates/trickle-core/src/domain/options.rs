//! Bind options - effect に渡すオプション
//!
//! # 優先順位（低 → 高）
//! 1. プロセス既定値（config の `[tooltip]`）
//! 2. `submit` 時の `SubmitOptions`
//! 3. target の class（`<prefix><placement>` / `<prefix>*`）

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where the bound widget is shown relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    #[default]
    Auto,
    Top,
    Bottom,
    Left,
    Right,
}

impl FromStr for Placement {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Placement::Auto),
            "top" => Ok(Placement::Top),
            "bottom" => Ok(Placement::Bottom),
            "left" => Ok(Placement::Left),
            "right" => Ok(Placement::Right),
            _ => Err(()),
        }
    }
}

/// Fully merged options handed to `TargetEffect::bind`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BindOptions {
    pub placement: Placement,
    pub css_classes: Vec<String>,
    pub show_delay_ms: u64,
    pub text: Option<String>,
}

/// Options supplied with one `submit` call; unset fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Dedupe mark. Equal or older than the recorded mark means "skip".
    pub timestamp: Option<u64>,
    pub placement: Option<Placement>,
    #[serde(default)]
    pub css_classes: Vec<String>,
    pub show_delay_ms: Option<u64>,
    pub text: Option<String>,
}

impl SubmitOptions {
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }
}

impl BindOptions {
    /// Merge submit-time options over process defaults.
    pub fn merged(defaults: &BindOptions, options: &SubmitOptions) -> Self {
        let mut css_classes = defaults.css_classes.clone();
        for class in &options.css_classes {
            if !css_classes.contains(class) {
                css_classes.push(class.clone());
            }
        }
        Self {
            placement: options.placement.unwrap_or(defaults.placement),
            css_classes,
            show_delay_ms: options.show_delay_ms.unwrap_or(defaults.show_delay_ms),
            text: options.text.clone().or_else(|| defaults.text.clone()),
        }
    }

    /// Apply class-derived per-target overrides.
    ///
    /// `<prefix>top` etc. sets the placement; any other `<prefix>*` class is
    /// passed through as an extra CSS class.
    pub fn with_class_overrides(mut self, classes: &[String], prefix: &str) -> Self {
        for class in classes {
            let Some(suffix) = class.strip_prefix(prefix) else {
                continue;
            };
            if let Ok(placement) = suffix.parse::<Placement>() {
                self.placement = placement;
            } else if !self.css_classes.contains(class) {
                self.css_classes.push(class.clone());
            }
        }
        self
    }
}
