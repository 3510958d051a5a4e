//! Context Classifier — how a new message relates to the conversation so far.
//!
//! Single pass over the dictionary's context markers, first match wins:
//! reference markers are checked before follow-up markers, and a message
//! matching neither is `general`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dictionary::{KeywordDictionary, find_marker};

/// Classifier label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// Points back at something said earlier.
    Reference,
    /// Asks to continue the current thread.
    FollowUp,
    /// Starts something new.
    General,
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reference => "reference",
            Self::FollowUp => "follow_up",
            Self::General => "general",
        };
        f.write_str(name)
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    /// The label.
    pub context_type: ContextType,
    /// Marker phrase that decided the label.
    pub marker: Option<String>,
    /// Most recent history entry, for reference and follow-up messages.
    pub anchor: Option<String>,
}

impl ContextAnalysis {
    fn general() -> Self {
        Self {
            context_type: ContextType::General,
            marker: None,
            anchor: None,
        }
    }
}

/// Label `message` against the dictionary's context markers.
///
/// `recent_history` is ordered oldest first; it only supplies the anchor and
/// never changes the label.
#[must_use]
pub fn analyze_context<S: AsRef<str>>(
    dictionary: &KeywordDictionary,
    message: &str,
    recent_history: &[S],
) -> ContextAnalysis {
    let lowered = message.to_lowercase();
    let markers = &dictionary.context;

    let (context_type, marker) = if let Some(marker) = find_marker(&lowered, &markers.reference) {
        (ContextType::Reference, marker)
    } else if let Some(marker) = find_marker(&lowered, &markers.follow_up) {
        (ContextType::FollowUp, marker)
    } else {
        return ContextAnalysis::general();
    };

    ContextAnalysis {
        context_type,
        marker: Some(marker.to_string()),
        anchor: recent_history.last().map(|s| s.as_ref().to_string()),
    }
}
