//! Intake flow — per-user conversational collection of a service request.
//!
//! A user who sends `/request` gets a session waiting for the problem
//! description. Each following text is validated against the step the session
//! is at; accepted answers advance it, rejected ones re-prompt the same step.
//! After the contact time the draft is stored as one user upsert plus one
//! request insert and the session is dropped.

pub mod machine;
pub mod manager;
pub mod prompts;
pub mod session_store;
pub mod state;
pub mod validators;

pub use machine::{Outcome, evaluate, prompt_for};
pub use manager::{IntakeManager, IntakeReply};
pub use session_store::{SessionSlot, SessionStore, spawn_expiry_task};
pub use state::{Draft, Field, IntakeStep, Session};
