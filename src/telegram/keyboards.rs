//! Inline keyboards attached to the bot's replies.
//!
//! Callback data strings here must stay in sync with the dispatch arms in
//! [`crate::telegram::handlers`]; the `callback_data_is_dispatchable` test
//! pins that contract.

use crate::telegram::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Callback data values the dispatcher understands.
pub mod callback {
    pub const START_CONVERT: &str = "start_convert";
    pub const HELP: &str = "help";
    pub const STATUS: &str = "status";
    pub const CANCEL_TASK: &str = "cancel_task";
    pub const RETRY_CONVERT: &str = "retry_convert";
    pub const CONVERT_ANOTHER: &str = "convert_another";
    pub const SHOW_STATS: &str = "show_stats";
}

pub fn start_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::new(
                "📤 Начать конвертацию",
                callback::START_CONVERT,
            )],
            vec![
                InlineKeyboardButton::new("❓ Справка", callback::HELP),
                InlineKeyboardButton::new("📊 Статус", callback::STATUS),
            ],
        ],
    }
}

pub fn help_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![InlineKeyboardButton::new(
            "📤 Начать конвертацию",
            callback::START_CONVERT,
        )]],
    }
}

pub fn status_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![vec![InlineKeyboardButton::new(
            "🚫 Отменить задачу",
            callback::CANCEL_TASK,
        )]],
    }
}

pub fn error_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::new(
                "🔄 Попробовать снова",
                callback::RETRY_CONVERT,
            )],
            vec![InlineKeyboardButton::new("❓ Справка", callback::HELP)],
        ],
    }
}

pub fn success_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![InlineKeyboardButton::new(
                "📤 Конвертировать ещё файл",
                callback::CONVERT_ANOTHER,
            )],
            vec![InlineKeyboardButton::new(
                "📊 Статистика",
                callback::SHOW_STATS,
            )],
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_keyboard_serialises() {
        for markup in [
            start_keyboard(),
            help_keyboard(),
            status_keyboard(),
            error_keyboard(),
            success_keyboard(),
        ] {
            let json = serde_json::to_value(&markup).unwrap();
            assert!(json["inline_keyboard"].is_array());
        }
    }

    #[test]
    fn callback_data_is_dispatchable() {
        let known = [
            callback::START_CONVERT,
            callback::HELP,
            callback::STATUS,
            callback::CANCEL_TASK,
            callback::RETRY_CONVERT,
            callback::CONVERT_ANOTHER,
            callback::SHOW_STATS,
        ];
        for markup in [
            start_keyboard(),
            help_keyboard(),
            status_keyboard(),
            error_keyboard(),
            success_keyboard(),
        ] {
            for row in &markup.inline_keyboard {
                for button in row {
                    assert!(
                        known.contains(&button.callback_data.as_str()),
                        "unknown callback data: {}",
                        button.callback_data
                    );
                }
            }
        }
    }
}
