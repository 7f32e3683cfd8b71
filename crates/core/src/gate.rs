use serde_json::Value;
use snafu::{OptionExt, ensure};

use crate::error::{
    EmptyHistorySnafu, InvalidRoleSnafu, MalformedEntrySnafu, MissingMessagesSnafu,
    ValidationError,
};
use crate::limits::HistoryLimits;
use crate::message::{History, Message, Role};

/// Authoritative acceptance filter for client-supplied histories.
///
/// Checks run in a fixed order and stop at the first failure: shape, roles,
/// turn count, per-message length, aggregate size. Nothing is partially accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationGate {
    limits: HistoryLimits,
}

impl ValidationGate {
    pub fn new(limits: HistoryLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> HistoryLimits {
        self.limits
    }

    /// Turns the raw `messages` value of a request into a typed history.
    pub fn admit(&self, candidate: &Value) -> Result<History, ValidationError> {
        let entries = candidate.as_array().context(MissingMessagesSnafu {
            stage: "gate-shape",
        })?;
        ensure!(
            !entries.is_empty(),
            EmptyHistorySnafu {
                stage: "gate-shape"
            }
        );

        let pairs = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| pair_entry(index, entry))
            .collect::<Result<Vec<_>, _>>()?;

        // Roles of every entry before any text.
        let roles = pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| {
                pair[0].as_str().and_then(Role::parse).with_context(|| InvalidRoleSnafu {
                    stage: "gate-role",
                    index,
                    role: pair[0].to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let history = pairs
            .iter()
            .zip(roles)
            .enumerate()
            .map(|(index, (pair, role))| {
                let text = pair[1].as_str().context(MalformedEntrySnafu {
                    stage: "gate-text",
                    index,
                })?;
                Ok(Message::new(role, text))
            })
            .collect::<Result<History, ValidationError>>()?;

        self.limits.check(&history)?;
        Ok(history)
    }
}

/// Only requires a two-element array; role and text are checked separately.
fn pair_entry(index: usize, entry: &Value) -> Result<&[Value], ValidationError> {
    entry
        .as_array()
        .map(Vec::as_slice)
        .filter(|pair| pair.len() == 2)
        .context(MalformedEntrySnafu {
            stage: "gate-shape",
            index,
        })
}
