//! Intake Desk — conversational service-request intake bot.

pub mod bot;
pub mod channels;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod intake;
pub mod store;
