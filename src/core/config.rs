//! Delivery configuration with documented tunables
//!
//! Every pacing and layout constant that shapes how authored content is
//! revealed lives here. Values load from TOML; any field left out keeps
//! its default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{LessonError, Result};
use crate::ledger::DedupScope;
use crate::pacer::LayoutMetrics;

/// Configuration for a chat session's delivery behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    // === PACING ===
    /// Learner reading-speed multiplier
    ///
    /// Divides every computed reading delay. 1.0 is the default pace,
    /// 0.5 doubles every delay, 2.0 halves it.
    pub speed_multiplier: f64,

    /// Floor for the delay before branch options are revealed (ms)
    ///
    /// Keeps fast readers from seeing options flash in before the
    /// prompt has settled. 0 disables the floor.
    pub option_reveal_min_delay_ms: u64,

    // === BRANCHING ===
    /// Which ledger layer filters re-offered options
    pub dedup_scope: DedupScope,

    /// Narrator line appended when every option under a prompt is used up
    pub exhausted_message: String,

    // === VIEWPORT ===
    /// Fraction of the available viewport height that may fill before
    /// delivery pauses for the learner to catch up
    ///
    /// Lower = pauses more eagerly. Must stay within 0.6..=1.2.
    pub pause_fraction: f32,

    /// Height estimates used by the pause heuristic
    pub layout: LayoutMetrics,

    // === AI TURNS ===
    /// Fixed delay before the first generated paragraph appears (ms)
    pub first_ai_paragraph_delay_ms: u64,

    /// Multiplier applied to the reading delay between generated paragraphs
    ///
    /// Generated replies are read as a continuous answer, so they pace
    /// faster than authored narration.
    pub ai_paragraph_delay_factor: f64,

    /// Pause after the last generated paragraph before authored traversal
    /// resumes (ms), when the reply asked to continue
    pub ai_settle_delay_ms: u64,

    /// Narrator line shown when the AI call fails or returns nothing
    pub ai_fallback_message: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 1.0,
            option_reveal_min_delay_ms: 0,
            dedup_scope: DedupScope::Global,
            exhausted_message: "You've explored every path here. Let's keep going.".into(),
            pause_fraction: 0.85,
            layout: LayoutMetrics::default(),
            first_ai_paragraph_delay_ms: 600,
            ai_paragraph_delay_factor: 0.5,
            ai_settle_delay_ms: 2000,
            ai_fallback_message:
                "Sorry, I couldn't come up with an answer to that. Could you rephrase it?".into(),
        }
    }
}

impl DeliveryConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Builder-style override for the reading speed
    pub fn with_speed(mut self, speed_multiplier: f64) -> Self {
        self.speed_multiplier = speed_multiplier;
        self
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if !(self.speed_multiplier > 0.0) {
            return Err(LessonError::Config(format!(
                "speed_multiplier must be positive, got {}",
                self.speed_multiplier
            )));
        }

        if !(0.6..=1.2).contains(&self.pause_fraction) {
            return Err(LessonError::Config(format!(
                "pause_fraction ({}) must be within 0.6..=1.2",
                self.pause_fraction
            )));
        }

        if self.layout.recent_window == 0 {
            return Err(LessonError::Config("layout.recent_window must be at least 1".into()));
        }

        if self.layout.chars_per_line == 0 {
            return Err(LessonError::Config("layout.chars_per_line must be at least 1".into()));
        }

        let factor = self.ai_paragraph_delay_factor;
        if !(factor.is_finite() && factor >= 0.0) {
            return Err(LessonError::Config(format!(
                "ai_paragraph_delay_factor must be a finite non-negative number, got {}",
                factor
            )));
        }

        Ok(())
    }

    pub fn option_reveal_floor(&self) -> Duration {
        Duration::from_millis(self.option_reveal_min_delay_ms)
    }

    pub fn first_ai_paragraph_delay(&self) -> Duration {
        Duration::from_millis(self.first_ai_paragraph_delay_ms)
    }

    pub fn ai_settle_delay(&self) -> Duration {
        Duration::from_millis(self.ai_settle_delay_ms)
    }

    /// Paragraph delay factor as used. A value `validate` would reject
    /// means no extra wait between paragraphs.
    pub fn ai_paragraph_factor(&self) -> f64 {
        let factor = self.ai_paragraph_delay_factor;
        if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            0.0
        }
    }
}
