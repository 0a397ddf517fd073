//! IntakeManager — drives one user's conversation through the step table and
//! hands finished flows to the record store.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::DatabaseError;
use crate::store::{RecordStore, RequestRecord, Submission, UserRecord};

use super::machine::{self, Outcome};
use super::prompts;
use super::session_store::SessionStore;
use super::state::{Field, IntakeStep, Session};

/// Reply produced for one inbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeReply {
    /// Text to send back to the user.
    pub text: String,
    /// Step the user is at after this message. `Complete` once stored.
    pub step: IntakeStep,
}

/// Coordinates intake sessions and persistence.
pub struct IntakeManager {
    store: Arc<dyn RecordStore>,
    sessions: Arc<SessionStore>,
}

impl IntakeManager {
    pub fn new(store: Arc<dyn RecordStore>, sessions: Arc<SessionStore>) -> Self {
        Self { store, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Begin (or restart) the flow for `user_id`. Any draft in progress is
    /// discarded.
    pub async fn on_start_flow(&self, user_id: &str) -> String {
        let mut slot = self.sessions.lock(user_id).await;
        if let Some(previous) = slot.as_ref() {
            info!(user_id, step = %previous.step, "Restarting intake flow");
        } else {
            info!(user_id, "Starting intake flow");
        }
        *slot = Some(Session::new(user_id));
        prompts::PROBLEM_PROMPT.to_string()
    }

    /// Handle a non-command text.
    ///
    /// Returns `Ok(None)` when the user has no active flow. A persistence
    /// failure leaves the session waiting for the contact time, so the user
    /// can resend it to retry.
    pub async fn on_text_event(
        &self,
        user_id: &str,
        request_id: &str,
        text: &str,
    ) -> Result<Option<IntakeReply>, DatabaseError> {
        let Some(mut slot) = self.sessions.lock_existing(user_id).await else {
            debug!(user_id, "Ignoring text outside an intake flow");
            return Ok(None);
        };
        let Some(session) = slot.as_mut() else {
            debug!(user_id, "Ignoring text outside an intake flow");
            self.sessions.release(user_id, slot).await;
            return Ok(None);
        };

        let step = session.step;
        let Some(outcome) = machine::evaluate(step, text) else {
            // Sessions are removed on completion, so this is unreachable in
            // practice; treat it as idle.
            *slot = None;
            self.sessions.release(user_id, slot).await;
            return Ok(None);
        };

        match outcome {
            Outcome::Rejected(err) => {
                debug!(user_id, step = %step, reason = %err, "Answer rejected");
                session.touch();
                Ok(Some(IntakeReply {
                    text: prompts::validation_message(&err),
                    step,
                }))
            }
            Outcome::Accepted { field, value, next } if !next.is_terminal() => {
                if let Err(e) = session.record(field, value, next) {
                    warn!(user_id, "Failed to advance intake step: {}", e);
                    return Ok(Some(IntakeReply {
                        text: machine::prompt_for(step, &session.draft),
                        step,
                    }));
                }
                debug!(user_id, from = %step, to = %next, "Intake step advanced");
                Ok(Some(IntakeReply {
                    text: machine::prompt_for(next, &session.draft),
                    step: next,
                }))
            }
            Outcome::Accepted { value, .. } => {
                let Some(submission) = build_submission(session, request_id, value) else {
                    error!(user_id, "Draft incomplete at final step, restarting flow");
                    *session = Session::new(user_id);
                    return Ok(Some(IntakeReply {
                        text: prompts::PROBLEM_PROMPT.to_string(),
                        step: IntakeStep::AwaitingProblem,
                    }));
                };

                if let Err(e) = self.store.save_submission(&submission).await {
                    error!(user_id, request_id, "Failed to store request: {}", e);
                    session.touch();
                    return Err(e);
                }

                info!(user_id, request_id, "Request stored");
                *slot = None;
                self.sessions.release(user_id, slot).await;
                Ok(Some(IntakeReply {
                    text: prompts::confirmation(&submission.user.user_name),
                    step: IntakeStep::Complete,
                }))
            }
        }
    }

    /// Whether `user_id` is mid-flow.
    pub async fn has_session(&self, user_id: &str) -> bool {
        self.sessions.get(user_id).await.is_some()
    }

    /// Step `user_id` is waiting at, if mid-flow.
    pub async fn current_step(&self, user_id: &str) -> Option<IntakeStep> {
        self.sessions.get(user_id).await.map(|s| s.step)
    }
}

fn build_submission(session: &Session, request_id: &str, contact_time: String) -> Option<Submission> {
    let draft = &session.draft;
    Some(Submission {
        user: UserRecord {
            user_id: session.user_id.clone(),
            user_name: draft.get(Field::UserName)?.to_string(),
            contact_info: draft.get(Field::ContactInfo)?.to_string(),
        },
        request: RequestRecord {
            request_id: request_id.to_string(),
            user_id: session.user_id.clone(),
            problem_description: draft.get(Field::ProblemDescription)?.to_string(),
            contact_time,
        },
    })
}
