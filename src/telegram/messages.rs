//! Fixed user-facing message templates.
//!
//! Every error a user can see is one of these constants; the bot never
//! leaks vendor error bodies or internal diagnostics into chat. The texts
//! are Russian — the bot serves Russian-language document workflows.

use crate::db::OperationStats;
use crate::pipeline::quality::EnhancementStats;

pub const START_MESSAGE: &str = "👋 *Привет! Я конвертирую PDF в Excel.*\n\n\
Отправьте мне PDF файл — я распознаю таблицы и верну документ XLSX.\n\n\
📋 Поддерживаются файлы до 20 МБ\n\
🔍 OCR настроен на русский язык\n\
🤖 Текст проверяется и исправляется автоматически";

pub const HELP_MESSAGE: &str = "❓ *Справка*\n\n\
1. Отправьте PDF файл в этот чат\n\
2. Дождитесь окончания обработки (обычно 1–3 минуты)\n\
3. Получите готовый XLSX файл\n\n\
*Команды:*\n\
/convert — начать конвертацию\n\
/status — статус текущей задачи\n\
/help — эта справка\n\n\
*Ограничения:*\n\
• только PDF файлы\n\
• размер до 20 МБ\n\
• один файл в минуту";

pub const CONVERT_MESSAGE: &str =
    "📤 *Отправьте PDF файл*\n\nПросто перетащите файл в чат или прикрепите его скрепкой.";

pub const STATUS_NO_ACTIVE_TASKS: &str =
    "📊 *Статус*\n\nАктивных задач нет. Отправьте PDF файл, чтобы начать конвертацию.";

pub const CANCEL_SUCCESS: &str = "🚫 Задача отменена. Можете отправить новый файл.";

pub const UNKNOWN_COMMAND: &str =
    "🤔 Неизвестная команда. Отправьте /help для списка команд или просто пришлите PDF файл.";

// ── Progress ────────────────────────────────────────────────────────────────

pub const STAGE_UPLOADING: &str = "📤 *Загружаю файл в сервис конвертации…*";
pub const STAGE_CONVERTING: &str = "⚙️ *Конвертирую документ…*\n\nЭто может занять несколько минут.";
pub const STAGE_ENHANCING: &str = "🤖 *Проверяю и исправляю распознанный текст…*";
pub const STAGE_FINALIZING: &str = "📦 *Готовлю файл к отправке…*";

// ── Errors ──────────────────────────────────────────────────────────────────

pub const ERROR_INVALID_FORMAT: &str = "❌ Поддерживаются только PDF файлы";
pub const ERROR_API_UNAVAILABLE: &str = "❌ Ошибка сервиса конвертации. Попробуйте позже";
pub const ERROR_CONVERSION_FAILED: &str = "❌ Не удалось конвертировать файл";
pub const ERROR_TIMEOUT: &str = "❌ Превышено время ожидания обработки";
pub const ERROR_RATE_LIMIT: &str = "❌ Слишком частые запросы. Попробуйте через минуту";
pub const ERROR_CORRUPT_PDF: &str = "❌ Файл повреждён или не является корректным PDF документом";

pub fn error_file_too_large(size_mb: f64) -> String {
    format!("❌ Размер файла ({size_mb:.2} МБ) превышает максимально допустимый (20 МБ)")
}

// ── Parameterised templates ─────────────────────────────────────────────────

pub fn processing_start(file_name: &str, size_mb: f64) -> String {
    format!("⏳ *Обрабатываю файл*\n\n📄 {file_name}\n📦 {size_mb:.2} МБ")
}

pub fn status_active_task(file_name: &str, started_at: &str) -> String {
    format!(
        "📊 *Статус задачи*\n\n📄 Файл: {file_name}\n🔄 Состояние: Обработка\n🕐 Начало: {started_at}"
    )
}

/// Caption for the delivered document, with the quality summary when the
/// enhancement pass actually improved something.
pub fn success_caption(stats: Option<&EnhancementStats>, enhance_enabled: bool) -> String {
    let mut caption = String::from("✅ Конвертация завершена успешно!");
    match stats {
        Some(s) if s.improvement > 0 => {
            caption.push_str("\n🤖 Текст улучшен автоматически");
            caption.push_str(&format!(
                "\n📈 Качество: {}% → {}%",
                s.original_score, s.enhanced_score
            ));
            if s.ukrainian_fixed > 0 {
                caption.push_str(&format!(
                    "\n🔧 Исправлено украинских фрагментов: {}",
                    s.ukrainian_fixed
                ));
            }
            if s.ocr_fixed > 0 {
                caption.push_str(&format!("\n🔧 Исправлено OCR ошибок: {}", s.ocr_fixed));
            }
        }
        _ if enhance_enabled => {
            caption.push_str("\n✅ Качество проверено — улучшения не требуются");
        }
        _ => {}
    }
    caption
}

pub fn stats_message(stats: &OperationStats) -> String {
    format!(
        "📊 *Статистика бота*\n\n\
         📈 Всего операций: {}\n\
         ✅ Успешных: {}\n\
         ❌ С ошибками: {}\n\
         👥 Уникальных пользователей: {}\n\
         📊 Успешность: {:.1}%",
        stats.total_operations,
        stats.successful_operations,
        stats.error_operations,
        stats.unique_users,
        stats.success_rate
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_start_renders_size() {
        let text = processing_start("doc.pdf", 2.5);
        assert!(text.contains("doc.pdf"));
        assert!(text.contains("2.50 МБ"));
    }

    #[test]
    fn success_caption_without_enhancement_is_bare() {
        let caption = success_caption(None, false);
        assert_eq!(caption, "✅ Конвертация завершена успешно!");
    }

    #[test]
    fn success_caption_reports_quality_gain() {
        let stats = EnhancementStats {
            original_score: 55,
            enhanced_score: 95,
            improvement: 40,
            ukrainian_fixed: 3,
            ocr_fixed: 1,
            cells_changed: 12,
        };
        let caption = success_caption(Some(&stats), true);
        assert!(caption.contains("55% → 95%"));
        assert!(caption.contains("украинских фрагментов: 3"));
        assert!(caption.contains("OCR ошибок: 1"));
    }

    #[test]
    fn success_caption_with_clean_document_mentions_check() {
        let stats = EnhancementStats {
            original_score: 100,
            enhanced_score: 100,
            improvement: 0,
            ukrainian_fixed: 0,
            ocr_fixed: 0,
            cells_changed: 0,
        };
        let caption = success_caption(Some(&stats), true);
        assert!(caption.contains("улучшения не требуются"));
    }

    #[test]
    fn stats_message_renders_rate() {
        let stats = OperationStats {
            total_operations: 10,
            successful_operations: 9,
            error_operations: 1,
            unique_users: 4,
            success_rate: 90.0,
        };
        let text = stats_message(&stats);
        assert!(text.contains("Всего операций: 10"));
        assert!(text.contains("90.0%"));
    }
}
