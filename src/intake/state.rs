//! Intake state — the step tag and the per-user session it lives in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Steps of the intake conversation.
///
/// Progresses linearly: AwaitingProblem → AwaitingName → AwaitingPhone →
/// AwaitingTime → Complete. "Idle" is the absence of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStep {
    AwaitingProblem,
    AwaitingName,
    AwaitingPhone,
    AwaitingTime,
    Complete,
}

impl IntakeStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: IntakeStep) -> bool {
        self.next() == Some(target)
    }

    /// Whether this step is terminal (flow is finished).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(&self) -> Option<IntakeStep> {
        use IntakeStep::*;
        match self {
            AwaitingProblem => Some(AwaitingName),
            AwaitingName => Some(AwaitingPhone),
            AwaitingPhone => Some(AwaitingTime),
            AwaitingTime => Some(Complete),
            Complete => None,
        }
    }
}

impl Default for IntakeStep {
    fn default() -> Self {
        Self::AwaitingProblem
    }
}

impl std::fmt::Display for IntakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingProblem => "awaiting_problem",
            Self::AwaitingName => "awaiting_name",
            Self::AwaitingPhone => "awaiting_phone",
            Self::AwaitingTime => "awaiting_time",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Answer fields, declared in collection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ProblemDescription,
    UserName,
    ContactInfo,
    ContactTime,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProblemDescription => "problem_description",
            Self::UserName => "user_name",
            Self::ContactInfo => "contact_info",
            Self::ContactTime => "contact_time",
        }
    }
}

/// Answers collected so far, iterated in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    answers: BTreeMap<Field, String>,
}

impl Draft {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.answers.get(&field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// `(field name, value)` pairs in collection order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.answers.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }
}

/// A user's in-progress intake flow.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub step: IntakeStep,
    pub draft: Draft,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Fresh session waiting for the problem description.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            step: IntakeStep::AwaitingProblem,
            draft: Draft::default(),
            started_at: now,
            last_activity: now,
        }
    }

    /// Store an accepted answer and move to `next`.
    pub fn record(&mut self, field: Field, value: String, next: IntakeStep) -> Result<(), String> {
        if !self.step.can_transition_to(next) {
            return Err(format!("Cannot transition from {} to {}", self.step, next));
        }
        self.draft.answers.insert(field, value);
        self.step = next;
        self.touch();
        Ok(())
    }

    /// Refresh the idle timer.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use IntakeStep::*;
        let transitions = [
            (AwaitingProblem, AwaitingName),
            (AwaitingName, AwaitingPhone),
            (AwaitingPhone, AwaitingTime),
            (AwaitingTime, Complete),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use IntakeStep::*;
        assert!(!AwaitingProblem.can_transition_to(AwaitingPhone));
        assert!(!AwaitingTime.can_transition_to(AwaitingName));
        assert!(!Complete.can_transition_to(AwaitingProblem));
        assert!(!AwaitingName.can_transition_to(AwaitingName));
    }

    #[test]
    fn next_walks_all_steps() {
        use IntakeStep::*;
        let mut current = IntakeStep::default();
        assert_eq!(current, AwaitingProblem);
        for expected in [AwaitingName, AwaitingPhone, AwaitingTime, Complete] {
            current = current.next().unwrap();
            assert_eq!(current, expected);
        }
        assert!(current.is_terminal());
        assert!(current.next().is_none());
    }

    #[test]
    fn display_matches_serde() {
        use IntakeStep::*;
        for step in [AwaitingProblem, AwaitingName, AwaitingPhone, AwaitingTime, Complete] {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json);
        }
    }

    #[test]
    fn draft_entries_follow_collection_order() {
        let mut session = Session::new("U1");
        session
            .record(Field::ProblemDescription, "broken".into(), IntakeStep::AwaitingName)
            .unwrap();
        session
            .record(Field::UserName, "Ann".into(), IntakeStep::AwaitingPhone)
            .unwrap();

        let entries: Vec<_> = session.draft.entries().collect();
        assert_eq!(
            entries,
            vec![("problem_description", "broken"), ("user_name", "Ann")]
        );
        assert_eq!(session.step, IntakeStep::AwaitingPhone);
    }

    #[test]
    fn record_rejects_skipping_steps() {
        let mut session = Session::new("U1");
        let err = session
            .record(Field::ContactInfo, "+79991234567".into(), IntakeStep::AwaitingTime)
            .unwrap_err();
        assert!(err.contains("awaiting_problem"));
        assert!(session.draft.is_empty());
        assert_eq!(session.step, IntakeStep::AwaitingProblem);
    }
}
