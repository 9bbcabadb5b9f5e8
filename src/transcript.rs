//! Append-only transcript of delivered chat entries

use serde::{Deserialize, Serialize};

use crate::core::error::{LessonError, Result};
use crate::core::types::{NodeId, NodeKind, Origin, Role};

/// One entry in the transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredItem {
    pub role: Role,
    pub text: String,
    pub payload: Option<Payload>,
    pub origin: Origin,
}

impl DeliveredItem {
    pub fn narrator(text: impl Into<String>) -> Self {
        Self {
            role: Role::Narrator,
            text: text.into(),
            payload: None,
            origin: Origin::Authored,
        }
    }

    pub fn learner(text: impl Into<String>) -> Self {
        Self {
            role: Role::Learner,
            text: text.into(),
            payload: None,
            origin: Origin::Authored,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            payload: None,
            origin: Origin::AiGenerated,
        }
    }

    pub fn structured(payload: Payload) -> Self {
        Self {
            role: Role::Narrator,
            text: payload.summary(),
            payload: Some(payload),
            origin: Origin::Authored,
        }
    }
}

/// Structured content rendered by a dedicated view instead of a text bubble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Carousel(CarouselPayload),
    Media(MediaPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarouselPayload {
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
    Audio,
}

impl Payload {
    /// Decode the serialized payload carried by a carousel or media node.
    pub fn parse(node: &NodeId, kind: NodeKind, content: &str) -> Result<Self> {
        let invalid = |reason: String| LessonError::InvalidPayload {
            node: node.clone(),
            reason,
        };

        match kind {
            NodeKind::CardCarousel => {
                let carousel: CarouselPayload =
                    serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
                if carousel.cards.is_empty() {
                    return Err(invalid("carousel has no cards".into()));
                }
                Ok(Self::Carousel(carousel))
            }
            NodeKind::Media => {
                let media: MediaPayload =
                    serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
                if media.url.trim().is_empty() {
                    return Err(invalid("media url is empty".into()));
                }
                Ok(Self::Media(media))
            }
            other => Err(invalid(format!("{:?} nodes carry no structured payload", other))),
        }
    }

    /// Short plain-text rendering, used for accessibility and logs
    pub fn summary(&self) -> String {
        match self {
            Self::Carousel(carousel) => carousel
                .cards
                .iter()
                .map(|c| c.title.as_str())
                .collect::<Vec<_>>()
                .join(" | "),
            Self::Media(media) => media.caption.clone().unwrap_or_else(|| media.url.clone()),
        }
    }
}

/// Ordered log of everything shown in the chat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    items: Vec<DeliveredItem>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: DeliveredItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[DeliveredItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last(&self) -> Option<&DeliveredItem> {
        self.items.last()
    }

    /// The trailing `n` entries, oldest first
    pub fn recent(&self, n: usize) -> &[DeliveredItem] {
        let start = self.items.len().saturating_sub(n);
        &self.items[start..]
    }

    /// Remove the trailing learner message and the assistant reply that
    /// followed it.
    ///
    /// A reply delivered as several paragraphs is removed whole. Returns
    /// `false` and leaves the transcript untouched unless the transcript
    /// ends with a learner entry followed only by assistant entries.
    pub fn undo_last_exchange(&mut self) -> bool {
        let reply_len = self
            .items
            .iter()
            .rev()
            .take_while(|item| item.role == Role::Assistant)
            .count();
        if reply_len == 0 || reply_len >= self.items.len() {
            return false;
        }

        let question = self.items.len() - reply_len - 1;
        if self.items[question].role != Role::Learner {
            return false;
        }
        self.items.truncate(question);
        true
    }
}
