//! Slash-command registry.
//!
//! Commands are matched in registration order; the first match wins. The
//! unknown-command fallback is appended by [`CommandRegistryBuilder::build`],
//! so it is always evaluated last regardless of what was registered.

use crate::intake::prompts;

/// What the bot does when a command matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Send a fixed text.
    Reply(&'static str),
    /// Begin (or restart) the intake flow.
    StartFlow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    Exact(String),
    AnyCommand,
}

#[derive(Debug, Clone)]
struct Entry {
    matcher: Matcher,
    action: CommandAction,
}

/// How an inbound text should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A slash command; `name` is lower-cased, without `/` or `@bot`.
    Command { name: String, action: CommandAction },
    /// Plain text, for the intake flow.
    Text,
}

/// Ordered command table built once at startup.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    entries: Vec<Entry>,
}

impl CommandRegistry {
    pub fn builder() -> CommandRegistryBuilder {
        CommandRegistryBuilder::default()
    }

    /// The standard command set: /start, /help, /settings, /request.
    pub fn standard() -> Self {
        Self::builder()
            .command("start", CommandAction::Reply(prompts::START_TEXT))
            .command("help", CommandAction::Reply(prompts::HELP_TEXT))
            .command("settings", CommandAction::Reply(prompts::SETTINGS_TEXT))
            .command("request", CommandAction::StartFlow)
            .build()
    }

    /// Classify `text` as a command or plain text.
    pub fn route(&self, text: &str) -> Route {
        let Some(name) = parse_command(text) else {
            return Route::Text;
        };
        let action = self
            .entries
            .iter()
            .find(|entry| match &entry.matcher {
                Matcher::Exact(n) => *n == name,
                Matcher::AnyCommand => true,
            })
            .map(|entry| entry.action)
            .unwrap_or(CommandAction::Reply(prompts::UNKNOWN_COMMAND_TEXT));
        Route::Command { name, action }
    }

    /// Registered command names in evaluation order, fallback excluded.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.matcher {
                Matcher::Exact(n) => Some(n.as_str()),
                Matcher::AnyCommand => None,
            })
            .collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Default)]
pub struct CommandRegistryBuilder {
    entries: Vec<Entry>,
}

impl CommandRegistryBuilder {
    /// Register `/name`. Names are matched case-insensitively.
    pub fn command(mut self, name: &str, action: CommandAction) -> Self {
        let name = name.trim_start_matches('/').to_lowercase();
        if self
            .entries
            .iter()
            .any(|e| e.matcher == Matcher::Exact(name.clone()))
        {
            tracing::warn!(command = %name, "Duplicate command registration ignored");
            return self;
        }
        self.entries.push(Entry {
            matcher: Matcher::Exact(name),
            action,
        });
        self
    }

    pub fn build(mut self) -> CommandRegistry {
        self.entries.push(Entry {
            matcher: Matcher::AnyCommand,
            action: CommandAction::Reply(prompts::UNKNOWN_COMMAND_TEXT),
        });
        CommandRegistry {
            entries: self.entries,
        }
    }
}

/// Extract the command name from `/name@bot args`. `None` for plain text.
fn parse_command(text: &str) -> Option<String> {
    let token = text.split_whitespace().next()?;
    let rest = token.strip_prefix('/')?;
    let name = rest.split('@').next().unwrap_or_default();
    Some(name.to_lowercase())
}
