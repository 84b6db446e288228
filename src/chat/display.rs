//! Renderable output of a turn
//!
//! A turn produces a [`TurnDisplay`]: markdown text interleaved with tool
//! cards and error notes, in the order they happened. The same steps are
//! optionally pushed live to a front end as [`DisplayEvent`]s.

use serde::Serialize;

use crate::tools::ToolResult;

/// One live step of a turn
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// Next chunk of assistant text
    TextDelta(String),
    /// A tool started and has a placeholder to show
    ToolPending {
        call_id: String,
        tool: String,
        message: String,
    },
    /// A tool finished
    ToolFinished {
        call_id: String,
        tool: String,
        result: ToolResult,
    },
    /// The response stream failed; nothing follows
    Error(String),
}

/// A tool invocation as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCard {
    pub call_id: String,
    pub tool: String,
    /// Placeholder shown while the tool ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<String>,
    /// `None` while the tool is still running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayPart {
    Markdown { text: String },
    Tool(ToolCard),
    Error { message: String },
}

/// Ordered display parts of one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnDisplay {
    pub parts: Vec<DisplayPart>,
}

impl TurnDisplay {
    /// Fold one event into the display
    ///
    /// Consecutive text deltas extend the same markdown part. A finished
    /// tool fills in the card opened by its pending event, or opens one.
    pub fn apply(&mut self, event: &DisplayEvent) {
        match event {
            DisplayEvent::TextDelta(delta) => match self.parts.last_mut() {
                Some(DisplayPart::Markdown { text }) => text.push_str(delta),
                _ => self.parts.push(DisplayPart::Markdown {
                    text: delta.clone(),
                }),
            },
            DisplayEvent::ToolPending {
                call_id,
                tool,
                message,
            } => self.parts.push(DisplayPart::Tool(ToolCard {
                call_id: call_id.clone(),
                tool: tool.clone(),
                pending: Some(message.clone()),
                result: None,
            })),
            DisplayEvent::ToolFinished {
                call_id,
                tool,
                result,
            } => match self.card_mut(call_id) {
                Some(card) => card.result = Some(result.clone()),
                None => self.parts.push(DisplayPart::Tool(ToolCard {
                    call_id: call_id.clone(),
                    tool: tool.clone(),
                    pending: None,
                    result: Some(result.clone()),
                })),
            },
            DisplayEvent::Error(message) => self.parts.push(DisplayPart::Error {
                message: message.clone(),
            }),
        }
    }

    fn card_mut(&mut self, call_id: &str) -> Option<&mut ToolCard> {
        self.parts.iter_mut().rev().find_map(|part| match part {
            DisplayPart::Tool(card) if card.call_id == call_id && card.result.is_none() => {
                Some(card)
            }
            _ => None,
        })
    }

    /// All markdown text, concatenated
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                DisplayPart::Markdown { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}
