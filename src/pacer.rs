//! Reading-time pacing and viewport-fit estimation
//!
//! Both halves are pure: delays depend only on content length and the
//! learner's speed setting, and the pause decision depends only on the
//! reported viewport and what was recently delivered.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transcript::{DeliveredItem, Payload};

/// Delay before anything is shown, regardless of length
pub const BASE_DELAY_SECS: f64 = 1.0;
/// Upper bound on a single reading delay (before speed scaling)
pub const MAX_DELAY_SECS: f64 = 5.0;
/// Average characters per word
pub const CHARS_PER_WORD: f64 = 5.0;
/// Average adult reading rate
pub const WORDS_PER_MINUTE: f64 = 225.0;

const MIN_SPEED: f64 = 0.05;
const MAX_SPEED: f64 = 20.0;

/// Time a learner needs to read content of `prior_content_len` characters.
///
/// `min(1.0 + reading_seconds, 5.0) / speed_multiplier`. A smaller
/// multiplier means a slower reader and a longer delay.
pub fn compute_delay(prior_content_len: usize, speed_multiplier: f64) -> Duration {
    let words = prior_content_len as f64 / CHARS_PER_WORD;
    let reading_secs = words / (WORDS_PER_MINUTE / 60.0);
    let capped = (BASE_DELAY_SECS + reading_secs).min(MAX_DELAY_SECS);

    let speed = if speed_multiplier.is_nan() {
        1.0
    } else {
        speed_multiplier.clamp(MIN_SPEED, MAX_SPEED)
    };
    Duration::from_secs_f64(capped / speed)
}

/// Layout constants for the height heuristic, in points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutMetrics {
    pub carousel_height: f32,
    pub media_height: f32,
    /// Height of one option button
    pub option_height: f32,
    pub options_padding: f32,
    /// Characters that fit on one wrapped line of a bubble
    pub chars_per_line: usize,
    pub line_height: f32,
    /// Vertical padding inside a text bubble
    pub bubble_padding: f32,
    /// Gap between consecutive transcript entries
    pub item_spacing: f32,
    /// Space taken by the input bar, typing indicator slot and margins
    pub chrome_allowance: f32,
    pub typing_indicator_height: f32,
    /// How many trailing entries count as "currently visible"
    pub recent_window: usize,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            carousel_height: 180.0,
            media_height: 250.0,
            option_height: 46.0,
            options_padding: 16.0,
            chars_per_line: 38,
            line_height: 21.0,
            bubble_padding: 24.0,
            item_spacing: 12.0,
            chrome_allowance: 110.0,
            typing_indicator_height: 40.0,
            recent_window: 5,
        }
    }
}

/// What is about to be placed in the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentShape {
    Text,
    Carousel,
    Media,
    /// A row of option buttons
    Options(usize),
}

impl ContentShape {
    pub fn of_item(item: &DeliveredItem) -> Self {
        match item.payload {
            Some(Payload::Carousel(_)) => Self::Carousel,
            Some(Payload::Media(_)) => Self::Media,
            None => Self::Text,
        }
    }
}

/// Viewport state as last reported by the scroll observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Visible height in points; 0 until the first report arrives
    pub height: f32,
    pub is_at_bottom: bool,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            height: 0.0,
            is_at_bottom: true,
        }
    }
}

/// Rough on-screen height of a piece of content.
///
/// Not pixel exact. Longer text never estimates shorter, and carousels and
/// media always estimate as large fixed blocks.
pub fn estimate_height(content: &str, shape: ContentShape, metrics: &LayoutMetrics) -> f32 {
    match shape {
        ContentShape::Carousel => metrics.carousel_height,
        ContentShape::Media => metrics.media_height,
        ContentShape::Options(count) => {
            count as f32 * metrics.option_height + metrics.options_padding
        }
        ContentShape::Text => {
            let per_line = metrics.chars_per_line.max(1);
            let lines: usize = content
                .split('\n')
                .map(|line| line.chars().count().div_ceil(per_line).max(1))
                .sum();
            lines as f32 * metrics.line_height + metrics.bubble_padding + metrics.item_spacing
        }
    }
}

fn estimate_item(item: &DeliveredItem, metrics: &LayoutMetrics) -> f32 {
    estimate_height(&item.text, ContentShape::of_item(item), metrics)
}

/// Whether appending `next_content` would push unread content off screen.
///
/// Never pauses before the first viewport report, or while the learner is
/// scrolled up reading history.
pub fn should_pause(
    next_content: &str,
    shape: ContentShape,
    viewport: Viewport,
    recent_items: &[DeliveredItem],
    is_typing_now: bool,
    metrics: &LayoutMetrics,
    pause_fraction: f32,
) -> bool {
    if viewport.height <= 0.0 || !viewport.is_at_bottom {
        return false;
    }

    let available = (viewport.height - metrics.chrome_allowance).max(0.0);

    // Newest first, stopping once the visible area is accounted for.
    let mut visible = 0.0;
    for item in recent_items.iter().rev().take(metrics.recent_window) {
        if visible >= available {
            break;
        }
        visible += estimate_item(item, metrics);
    }
    if is_typing_now {
        visible += metrics.typing_indicator_height;
    }

    let incoming = estimate_height(next_content, shape, metrics);
    visible + incoming > available * pause_fraction
}
