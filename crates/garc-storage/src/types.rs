//! Event types shared by every backend.

use std::fmt;

/// Severity of an [`ObjectEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Routine progress.
    Normal,
    /// Something an operator should look at.
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// A human-readable notification attached to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    /// Severity.
    pub event_type: EventType,
    /// Machine-readable reason in CamelCase, e.g. `SuccessfulCreated`.
    pub reason: String,
    /// What the controller did, e.g. `Create`.
    pub action: String,
    /// Free-form message.
    pub note: String,
}

impl ObjectEvent {
    /// Creates a `Normal` event.
    #[must_use]
    pub fn normal(
        reason: impl Into<String>,
        action: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EventType::Normal,
            reason: reason.into(),
            action: action.into(),
            note: note.into(),
        }
    }

    /// Creates a `Warning` event.
    #[must_use]
    pub fn warning(
        reason: impl Into<String>,
        action: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            event_type: EventType::Warning,
            reason: reason.into(),
            action: action.into(),
            note: note.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let event = ObjectEvent::normal("SuccessfulCreated", "Create", "Created deployment");
        assert_eq!(event.event_type, EventType::Normal);
        assert_eq!(event.reason, "SuccessfulCreated");

        let event = ObjectEvent::warning("ReconcileFailed", "Reconcile", "boom");
        assert_eq!(event.event_type.to_string(), "Warning");
    }
}
