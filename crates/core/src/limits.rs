use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{
    HistoryTooLargeSnafu, MessageTooLongSnafu, TooManyTurnsSnafu, ValidationError,
};
use crate::message::History;

pub const DEFAULT_MAX_TURNS: usize = 30;
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 5000;
pub const DEFAULT_MAX_TOTAL_BYTES: usize = 10_000;

/// Size caps a history must satisfy before it may reach the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryLimits {
    pub max_turns: usize,
    /// Counted in Unicode scalar values, not bytes.
    pub max_message_chars: usize,
    /// Counted in bytes of the compact JSON wire form.
    pub max_total_bytes: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

impl HistoryLimits {
    /// Applies turn count, per-message and aggregate checks in that order.
    pub fn check(&self, history: &History) -> Result<(), ValidationError> {
        ensure!(
            history.len() <= self.max_turns,
            TooManyTurnsSnafu {
                stage: "limits-turn-count",
                count: history.len(),
                limit: self.max_turns,
            }
        );

        for (index, message) in history.iter().enumerate() {
            let chars = message.text.chars().count();
            ensure!(
                chars <= self.max_message_chars,
                MessageTooLongSnafu {
                    stage: "limits-message-length",
                    index,
                    chars,
                    limit: self.max_message_chars,
                }
            );
        }

        let bytes = history.serialized_len();
        ensure!(
            bytes <= self.max_total_bytes,
            HistoryTooLargeSnafu {
                stage: "limits-aggregate-size",
                bytes,
                limit: self.max_total_bytes,
            }
        );

        Ok(())
    }
}
