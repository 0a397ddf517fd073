//! Step table — maps each waiting step to its field, validator, and successor.
//!
//! Control state is always the session's explicit [`IntakeStep`]; the table is
//! consulted by step, never by how many answers the draft holds.

use crate::error::ValidationError;

use super::prompts;
use super::state::{Draft, Field, IntakeStep};
use super::validators::{validate_free_text, validate_name, validate_phone};

type Validator = fn(&str) -> Result<String, ValidationError>;

/// One row of the step table.
pub struct StepRule {
    pub step: IntakeStep,
    pub field: Field,
    pub validate: Validator,
    pub next: IntakeStep,
}

static STEP_TABLE: [StepRule; 4] = [
    StepRule {
        step: IntakeStep::AwaitingProblem,
        field: Field::ProblemDescription,
        validate: validate_problem,
        next: IntakeStep::AwaitingName,
    },
    StepRule {
        step: IntakeStep::AwaitingName,
        field: Field::UserName,
        validate: validate_name,
        next: IntakeStep::AwaitingPhone,
    },
    StepRule {
        step: IntakeStep::AwaitingPhone,
        field: Field::ContactInfo,
        validate: validate_phone,
        next: IntakeStep::AwaitingTime,
    },
    StepRule {
        step: IntakeStep::AwaitingTime,
        field: Field::ContactTime,
        validate: validate_contact_time,
        next: IntakeStep::Complete,
    },
];

fn validate_problem(input: &str) -> Result<String, ValidationError> {
    validate_free_text("problem description", input)
}

fn validate_contact_time(input: &str) -> Result<String, ValidationError> {
    validate_free_text("preferred contact time", input)
}

/// Result of checking one inbound text against the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Answer accepted; the session should record it and move to `next`.
    Accepted {
        field: Field,
        value: String,
        next: IntakeStep,
    },
    /// Answer rejected; the step does not change.
    Rejected(ValidationError),
}

/// Table row for a step. `None` for the terminal step.
pub fn rule_for(step: IntakeStep) -> Option<&'static StepRule> {
    STEP_TABLE.iter().find(|rule| rule.step == step)
}

/// Validate `text` for `step`. Pure: the session is not touched.
pub fn evaluate(step: IntakeStep, text: &str) -> Option<Outcome> {
    let rule = rule_for(step)?;
    Some(match (rule.validate)(text) {
        Ok(value) => Outcome::Accepted {
            field: rule.field,
            value,
            next: rule.next,
        },
        Err(err) => Outcome::Rejected(err),
    })
}

/// Prompt shown on entering `step`, given the answers collected so far.
pub fn prompt_for(step: IntakeStep, draft: &Draft) -> String {
    let name = draft.get(Field::UserName).unwrap_or_default();
    match step {
        IntakeStep::AwaitingProblem => prompts::PROBLEM_PROMPT.to_string(),
        IntakeStep::AwaitingName => prompts::NAME_PROMPT.to_string(),
        IntakeStep::AwaitingPhone => prompts::phone_prompt(name),
        IntakeStep::AwaitingTime => prompts::TIME_PROMPT.to_string(),
        IntakeStep::Complete => prompts::confirmation(name),
    }
}
