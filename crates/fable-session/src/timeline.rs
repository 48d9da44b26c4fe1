//! Chronological merge of messages and scenes

use crate::session::{Message, Scene};

/// One entry in the rendered conversation view. Display-only; recomputed
/// on every relevant state change, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineItem<'a> {
    Message(&'a Message),
    Scene(&'a Scene),
    /// The in-flight assistant reply, always last.
    Streaming(&'a str),
}

/// Merge messages and scenes into one ascending-by-creation-time view,
/// appending the in-flight streaming buffer as a final pseudo-item.
///
/// Ties break deterministically: a message at the same timestamp as a
/// scene sorts first. Inputs are not mutated; re-invoking on unchanged
/// state yields an identical sequence.
pub fn merge<'a>(
    messages: &'a [Message],
    scenes: &'a [Scene],
    streaming: Option<&'a str>,
) -> Vec<TimelineItem<'a>> {
    // Stable sort over (timestamp, rank); at equal timestamps the rank
    // keeps a message ahead of a scene. The streaming pseudo-item is
    // appended after the sort and never participates in it.
    let mut keyed: Vec<((i64, u8), TimelineItem<'a>)> = messages
        .iter()
        .map(|m| ((m.created_at, 0u8), TimelineItem::Message(m)))
        .chain(
            scenes
                .iter()
                .map(|s| ((s.created_at, 1u8), TimelineItem::Scene(s))),
        )
        .collect();
    keyed.sort_by_key(|(key, _)| *key);

    let mut items: Vec<TimelineItem<'a>> = keyed.into_iter().map(|(_, item)| item).collect();
    if let Some(text) = streaming {
        items.push(TimelineItem::Streaming(text));
    }
    items
}
