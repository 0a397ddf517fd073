//! User-facing texts for commands and the intake conversation.

use crate::error::ValidationError;

pub const START_TEXT: &str = "To file a request, you'll need to answer a few questions.\n\n\
     Send /request to begin.";

pub const HELP_TEXT: &str = START_TEXT;

pub const SETTINGS_TEXT: &str = "I can help you file a request. You'll be able to change or add \
     details when we get in touch with you.";

pub const UNKNOWN_COMMAND_TEXT: &str =
    "Sorry, I didn't understand that command. To file a request, send /request.";

pub const PROBLEM_PROMPT: &str =
    "To file a request, please describe your problem in as much detail as you can.";

pub const NAME_PROMPT: &str = "Got it! How should I address you?";

pub const TIME_PROMPT: &str =
    "Great, almost done! Please tell us the preferred time for us to contact you.";

pub const NAME_ERROR: &str = "A name may contain letters only!";

pub const PHONE_ERROR: &str =
    "Invalid phone number! It must be 10 digits preceded by +7 or 8.";

pub const SAVE_FAILED: &str = "Sorry, we couldn't save your request right now. \
     Please send your preferred contact time again to retry.";

/// Asked after the name is accepted; echoes the normalized name.
pub fn phone_prompt(name: &str) -> String {
    format!("All right, {name}! Please share your phone number so we can reach you.")
}

/// Confirmation sent once the request is stored.
pub fn confirmation(name: &str) -> String {
    format!("{name}, your request has been received! We'll contact you at the time you specified.")
}

/// Field-targeted message for a rejected answer.
pub fn validation_message(err: &ValidationError) -> String {
    match err {
        ValidationError::InvalidName => NAME_ERROR.to_string(),
        ValidationError::InvalidPhone => PHONE_ERROR.to_string(),
        ValidationError::Empty { field } => format!("Please enter your {field}; it can't be empty."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_echo_name() {
        assert!(phone_prompt("Ann").contains("Ann"));
        assert!(confirmation("Ann").starts_with("Ann,"));
    }

    #[test]
    fn validation_messages_are_field_specific() {
        assert_eq!(validation_message(&ValidationError::InvalidName), NAME_ERROR);
        assert_eq!(validation_message(&ValidationError::InvalidPhone), PHONE_ERROR);
        assert!(
            validation_message(&ValidationError::Empty { field: "problem" }).contains("problem")
        );
    }
}
