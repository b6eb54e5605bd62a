//! Meeting processing status and the allowed transition graph.

use serde::{Deserialize, Serialize};

/// Processing state of a meeting record.
///
/// `pending → compressing → transcribing → correcting → summarizing →
/// completed`, with `failed` reachable from any non-terminal state. Terminal
/// states are re-enterable only through the explicit re-trigger operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Pending,
    Compressing,
    Transcribing,
    Correcting,
    Summarizing,
    Completed,
    Failed,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Compressing => "compressing",
            Self::Transcribing => "transcribing",
            Self::Correcting => "correcting",
            Self::Summarizing => "summarizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "compressing" => Some(Self::Compressing),
            "transcribing" => Some(Self::Transcribing),
            "correcting" => Some(Self::Correcting),
            "summarizing" => Some(Self::Summarizing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Human-readable label for status polling clients.
    pub fn display(&self) -> &'static str {
        match self {
            Self::Pending => "Waiting",
            Self::Compressing => "Compressing audio",
            Self::Transcribing => "Transcribing",
            Self::Correcting => "Correcting transcript",
            Self::Summarizing => "Summarizing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    /// Terminal for a run. Only these states accept a manual re-trigger.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The stage that follows this one on the happy path.
    pub fn next_stage(&self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Compressing),
            Self::Compressing => Some(Self::Transcribing),
            Self::Transcribing => Some(Self::Correcting),
            Self::Correcting => Some(Self::Summarizing),
            Self::Summarizing => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// Whether `to` is a legal direct transition from this state.
    pub fn can_transition_to(&self, to: MeetingStatus) -> bool {
        if to == Self::Failed {
            return !self.is_terminal();
        }
        self.next_stage() == Some(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_parse_roundtrip() {
        for status in [
            MeetingStatus::Pending,
            MeetingStatus::Compressing,
            MeetingStatus::Transcribing,
            MeetingStatus::Correcting,
            MeetingStatus::Summarizing,
            MeetingStatus::Completed,
            MeetingStatus::Failed,
        ] {
            assert_eq!(MeetingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MeetingStatus::parse("recording"), None);
    }

    #[test]
    fn test_happy_path_walks_to_completed() {
        let mut status = MeetingStatus::Pending;
        let mut seen = vec![status];
        while let Some(next) = status.next_stage() {
            assert!(status.can_transition_to(next));
            status = next;
            seen.push(status);
        }
        assert_eq!(status, MeetingStatus::Completed);
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        assert!(MeetingStatus::Pending.can_transition_to(MeetingStatus::Failed));
        assert!(MeetingStatus::Transcribing.can_transition_to(MeetingStatus::Failed));
        assert!(MeetingStatus::Summarizing.can_transition_to(MeetingStatus::Failed));
        assert!(!MeetingStatus::Completed.can_transition_to(MeetingStatus::Failed));
        assert!(!MeetingStatus::Failed.can_transition_to(MeetingStatus::Failed));
    }

    #[test]
    fn test_no_stage_skipping() {
        assert!(!MeetingStatus::Pending.can_transition_to(MeetingStatus::Transcribing));
        assert!(!MeetingStatus::Compressing.can_transition_to(MeetingStatus::Summarizing));
        assert!(!MeetingStatus::Correcting.can_transition_to(MeetingStatus::Completed));
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&MeetingStatus::Transcribing).unwrap();
        assert_eq!(json, "\"transcribing\"");
        let parsed: MeetingStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, MeetingStatus::Failed);
    }
}
