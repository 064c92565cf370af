/// Check state definitions for the per-URL life cycle
///
/// Every URL moves through these states exactly once, in order:
///
/// ```text
/// Created -> SyntaxChecked -> Filtered
///                          -> Connected -> ContentChecked -> Recursed -> Done
/// ```
///
/// Any non-terminal state may jump to `Done` when the check fails.
use std::fmt;

/// Represents the current state of one URL check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckState {
    // ===== Active States =====
    /// Record exists, nothing has been checked yet
    Created,

    /// URL is absolute, canonical and has a cache key
    SyntaxChecked,

    /// The scheme-specific connection attempt succeeded
    Connected,

    /// Content was read (or skipped) and size-checked
    ContentChecked,

    /// Child links were submitted for checking
    Recursed,

    // ===== Terminal States =====
    /// Strict extern URL; checked only for syntax
    Filtered,

    /// Result is final, valid or invalid
    Done,
}

impl CheckState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filtered | Self::Done)
    }

    /// Returns true if a record in this state has touched the network
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::ContentChecked | Self::Recursed)
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: CheckState) -> bool {
        use CheckState::*;
        match (self, next) {
            (Created, SyntaxChecked) => true,
            (SyntaxChecked, Filtered) | (SyntaxChecked, Connected) => true,
            (Connected, ContentChecked) => true,
            (ContentChecked, Recursed) => true,
            (Filtered, _) | (Done, _) => false,
            (_, Done) => true,
            _ => false,
        }
    }

    /// Converts the state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::SyntaxChecked => "syntax_checked",
            Self::Connected => "connected",
            Self::ContentChecked => "content_checked",
            Self::Recursed => "recursed",
            Self::Filtered => "filtered",
            Self::Done => "done",
        }
    }

    /// Parses a state from its string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "syntax_checked" => Some(Self::SyntaxChecked),
            "connected" => Some(Self::Connected),
            "content_checked" => Some(Self::ContentChecked),
            "recursed" => Some(Self::Recursed),
            "filtered" => Some(Self::Filtered),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    /// Returns all possible check states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Created,
            Self::SyntaxChecked,
            Self::Connected,
            Self::ContentChecked,
            Self::Recursed,
            Self::Filtered,
            Self::Done,
        ]
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
