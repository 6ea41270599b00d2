//! Messaging adapter: a thin layer over the Telegram Bot API.
//!
//! The platform SDK is not reproduced (non-goal); the adapter is four
//! pieces:
//!
//! 1. [`api`]       — seven Bot API methods over `reqwest`
//! 2. [`types`]     — serde models for the update subset the bot reads
//! 3. [`handlers`]  — command/document/callback dispatch
//! 4. [`poll`]      — the long-poll loop that feeds the handlers
//!
//! [`keyboards`] and [`messages`] hold the fixed UI surface: every button
//! and every template a user can ever see.

pub mod api;
pub mod handlers;
pub mod keyboards;
pub mod messages;
pub mod poll;
pub mod types;
