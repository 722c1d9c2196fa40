//! Block/allow verdicts over reconciled state.
//!
//! Precedence, first match wins:
//! conversation allow > conversation deny > global allow > global deny > allowed.
//!
//! `decide` is pure. Callers reconcile against the current time first,
//! otherwise an expired or overridden record can still match.

use banlist_state::{AccessState, Record};
use serde::{Deserialize, Serialize};

/// The collection that produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    ConversationAllow,
    ConversationDeny,
    GlobalAllow,
    GlobalDeny,
}

impl Layer {
    pub fn blocks(&self) -> bool {
        matches!(self, Layer::ConversationDeny | Layer::GlobalDeny)
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub blocked: bool,
    /// Reason of the matching record; empty when none matched or none was given.
    pub reason: String,
    /// `None` when no record matched.
    pub source: Option<Layer>,
}

impl Verdict {
    /// Default verdict: not blocked, nothing matched.
    pub fn allowed() -> Self {
        Self {
            blocked: false,
            reason: String::new(),
            source: None,
        }
    }

    fn matched(layer: Layer, record: &Record) -> Self {
        Self {
            blocked: layer.blocks(),
            reason: record.reason().to_string(),
            source: Some(layer),
        }
    }
}

/// Evaluate the four collections in precedence order.
pub fn decide(state: &AccessState, conversation: &str, user_id: &str) -> Verdict {
    let layers = [
        (Layer::ConversationAllow, state.allow.find(conversation, user_id)),
        (Layer::ConversationDeny, state.deny.find(conversation, user_id)),
        (Layer::GlobalAllow, state.allow_all.get(user_id)),
        (Layer::GlobalDeny, state.deny_all.get(user_id)),
    ];
    layers
        .into_iter()
        .find_map(|(layer, record)| record.map(|r| Verdict::matched(layer, r)))
        .unwrap_or_else(Verdict::allowed)
}
