//! Actions proposed by the decision service and their validation.
//!
//! A [`ProposedAction`] is whatever came over the wire: a tool name plus
//! loosely typed, all-optional arguments. [`validate`] is the only way to
//! obtain an [`Action`], which always carries a non-empty reason and
//! in-range coordinates.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DecisionError;
use crate::input::clamp_normalized;

/// Raw arguments of a tool call. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposedArgs {
    #[serde(deserialize_with = "lenient_number")]
    pub x: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub y: Option<f64>,
    pub text: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub dy: Option<f64>,
    #[serde(alias = "story")]
    pub reason: Option<String>,
}

/// One unvalidated decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub name: String,
    #[serde(default)]
    pub arguments: ProposedArgs,
}

impl ProposedAction {
    pub fn new(name: impl Into<String>, arguments: ProposedArgs) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Numbers sometimes arrive quoted; accept `"500"` as well as `500`.
fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(d)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("`{s}` is not a number"))),
    }
}

// ── Action ───────────────────────────────────────────────────────

/// A validated action. Coordinates are in the normalized `[0, 1000]` grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Observe { reason: String },
    Click { x: f64, y: f64, reason: String },
    Type { text: String, reason: String },
    Scroll { dy: i32, reason: String },
    Done { reason: String },
}

impl Action {
    pub fn reason(&self) -> &str {
        match self {
            Action::Observe { reason }
            | Action::Click { reason, .. }
            | Action::Type { reason, .. }
            | Action::Scroll { reason, .. }
            | Action::Done { reason } => reason,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Observe { .. } => "observe",
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Scroll { .. } => "scroll",
            Action::Done { .. } => "done",
        }
    }

    /// Whether executing this action synthesizes input.
    pub fn changes_input(&self) -> bool {
        matches!(
            self,
            Action::Click { .. } | Action::Type { .. } | Action::Scroll { .. }
        )
    }
}

/// Turn a proposal into an [`Action`].
///
/// Out-of-range coordinates are clamped, never rejected. Missing fields,
/// non-finite numbers, unknown names and blank reasons are errors.
pub fn validate(proposed: &ProposedAction) -> Result<Action, DecisionError> {
    let name: &'static str = match proposed.name.trim().to_ascii_lowercase().as_str() {
        "observe" => "observe",
        "click" => "click",
        "type" => "type",
        "scroll" => "scroll",
        "done" => "done",
        other => return Err(DecisionError::Malformed(format!("unknown action `{other}`"))),
    };

    let args = &proposed.arguments;
    let reason = match args.reason.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => r.to_owned(),
        _ => return Err(DecisionError::MissingReason(name)),
    };

    let action = match name {
        "observe" => Action::Observe { reason },
        "click" => Action::Click {
            x: clamp_normalized(finite(name, "x", args.x)?),
            y: clamp_normalized(finite(name, "y", args.y)?),
            reason,
        },
        "type" => Action::Type {
            text: args
                .text
                .clone()
                .ok_or_else(|| missing(name, "text"))?,
            reason,
        },
        "scroll" => Action::Scroll {
            // `as` saturates at the i32 bounds.
            dy: finite(name, "dy", args.dy)? as i32,
            reason,
        },
        _ => Action::Done { reason },
    };
    Ok(action)
}

fn missing(action: &str, field: &str) -> DecisionError {
    DecisionError::Malformed(format!("`{action}` is missing `{field}`"))
}

fn finite(action: &str, field: &str, value: Option<f64>) -> Result<f64, DecisionError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(DecisionError::Malformed(format!(
            "`{action}.{field}` is not finite ({v})"
        ))),
        None => Err(missing(action, field)),
    }
}
