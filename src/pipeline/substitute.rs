//! Deterministic Ukrainian→Russian substitution pass.
//!
//! The conversion vendor's OCR engine, even when pinned to Russian, emits
//! Ukrainian letter forms (і, ї, є, ґ) and whole Ukrainian words for scans of
//! mixed-provenance paperwork. This module applies a static, enumerable
//! mapping that repairs the bulk of those artefacts without any model call,
//! so the output is usable even when the LLM pass is disabled.
//!
//! ## Pass order
//!
//! Passes must run in this specific order:
//!
//! 1. **Word table** — exact multi-character sequences, longest first so
//!    `реєстраційний` wins over the `від` fragment inside it.
//! 2. **Pattern table** — regex rules for date constructions and case
//!    endings that a finite word list cannot enumerate.
//! 3. **Character table** — single Ukrainian letters to their Russian
//!    look-alikes. Running characters last keeps the word keys (which
//!    contain those letters) matchable in pass 1.
//!
//! ## Idempotency
//!
//! Applying the pass twice yields the same output as applying it once: no
//! replacement value contains any mapped character or word, and every regex
//! rewrites its match into a form it no longer matches. The
//! `idempotent_on_*` tests below pin this property.

use once_cell::sync::Lazy;
use regex::Regex;

// ── Pass 3: single characters ───────────────────────────────────────────────
//
// Only letters absent from the Russian alphabet are mapped. The original
// OCR confusions ѐ/ѓ/ќ (accented forms) are included; genuine Russian
// letters are never touched, which is what keeps the pass idempotent.
const CHAR_MAP: &[(char, char)] = &[
    ('ї', 'и'),
    ('Ї', 'И'),
    ('і', 'и'),
    ('І', 'И'),
    ('є', 'е'),
    ('Є', 'Е'),
    ('ґ', 'г'),
    ('Ґ', 'Г'),
    ('ў', 'у'),
    ('Ў', 'У'),
    ('ѐ', 'е'),
    ('ѓ', 'г'),
    ('Ѓ', 'Г'),
    ('ќ', 'к'),
    ('Ќ', 'К'),
];

// ── Pass 1: exact word sequences ────────────────────────────────────────────

static WORD_MAP: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    let mut map: Vec<(&str, &str)> = vec![
        // Administrative vocabulary
        ("Муніципальне", "Муниципальное"),
        ("муніципальне", "муниципальное"),
        ("Муніципальний", "Муниципальный"),
        ("муніципальний", "муниципальный"),
        ("Свідетельство", "Свидетельство"),
        ("свідетельство", "свидетельство"),
        ("Свідоцтво", "Свидетельство"),
        ("свідоцтво", "свидетельство"),
        ("державне", "государственное"),
        ("Державне", "Государственное"),
        ("казенне", "казенное"),
        ("Казенне", "Казенное"),
        // Identifiers
        ("ІНН", "ИНН"),
        ("іНН", "ИНН"),
        ("інн", "ИНН"),
        ("БІК", "БИК"),
        ("бік", "БИК"),
        // Registration vocabulary
        ("реєстраційний", "регистрационный"),
        ("Реєстраційний", "Регистрационный"),
        ("реєстрація", "регистрация"),
        ("Реєстрація", "Регистрация"),
        // Time words
        ("року", "года"),
        ("Року", "Года"),
        ("рік", "год"),
        ("Рік", "Год"),
        ("місяць", "месяц"),
        ("Місяць", "Месяц"),
        // Month names (genitive, as they appear in dates)
        ("січня", "января"),
        ("Січня", "Января"),
        ("лютого", "февраля"),
        ("Лютого", "Февраля"),
        ("березня", "марта"),
        ("Березня", "Марта"),
        ("квітня", "апреля"),
        ("Квітня", "Апреля"),
        ("травня", "мая"),
        ("Травня", "Мая"),
        ("червня", "июня"),
        ("Червня", "Июня"),
        ("липня", "июля"),
        ("Липня", "Июля"),
        ("серпня", "августа"),
        ("Серпня", "Августа"),
        ("вересня", "сентября"),
        ("Вересня", "Сентября"),
        ("жовтня", "октября"),
        ("Жовтня", "Октября"),
        ("листопада", "ноября"),
        ("Листопада", "Ноября"),
        ("грудня", "декабря"),
        ("Грудня", "Декабря"),
        // Prepositions that differ
        ("від", "от"),
        ("Від", "От"),
        ("під", "под"),
        ("Під", "Под"),
        ("з дня", "с дня"),
        ("З дня", "С дня"),
        // Institutions
        ("установа", "учреждение"),
        ("Установа", "Учреждение"),
        ("заклад", "учреждение"),
        ("Заклад", "Учреждение"),
        ("загальноосвітнє", "общеобразовательное"),
        ("Загальноосвітнє", "Общеобразовательное"),
        ("акредитації", "аккредитации"),
        ("Акредитації", "Аккредитации"),
        ("середня", "средняя"),
        ("Середня", "Средняя"),
        ("гімназія", "гимназия"),
        ("Гімназія", "Гимназия"),
        ("ліцей", "лицей"),
        ("Ліцей", "Лицей"),
        // Geography
        ("місто", "город"),
        ("Місто", "Город"),
        ("вулиця", "улица"),
        ("Вулиця", "Улица"),
        ("будинок", "дом"),
        ("Будинок", "Дом"),
        // Banking
        ("рахунок", "счет"),
        ("Рахунок", "Счет"),
        ("розрахунковий", "расчетный"),
        ("Розрахунковий", "Расчетный"),
        ("кореспондентський", "корреспондентский"),
        ("Кореспондентський", "Корреспондентский"),
        // Titles
        ("керівник", "руководитель"),
        ("Керівник", "Руководитель"),
        ("завідувач", "заведующий"),
        ("Завідувач", "Заведующий"),
        ("працівник", "работник"),
        ("Працівник", "Работник"),
        ("співробітник", "сотрудник"),
        ("Співробітник", "Сотрудник"),
    ];
    // Longest key first: `реєстраційний` must win over the `від` inside it.
    map.sort_by_key(|(k, _)| std::cmp::Reverse(k.chars().count()));
    map
});

// ── Pass 2: regex patterns ──────────────────────────────────────────────────

static PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // Date constructions
        (r"(?i)\bна\s+(\d+)\s+року\b", "на ${1} года"),
        (r"(?i)\bу\s+(\d+)\s+році\b", "в ${1} году"),
        (r"(?i)\b(\d+)\s+року\b", "${1} года"),
        (r"(?i)\b(\d+)\s+рік\b", "${1} год"),
        // Prepositions before numbers
        (r"(?i)\bз\s+(\d+)", "с ${1}"),
        (r"(?i)\bвід\s+(\d+)", "от ${1}"),
        // Case endings, longest suffix first
        (r"([а-яё]+)ування\b", "${1}ование"),
        (r"([а-яё]+)ення\b", "${1}ение"),
        (r"([а-яё]+)ання\b", "${1}ание"),
        (r"([а-яё]+)ння\b", "${1}ние"),
        (r"([а-яё]+)ський\b", "${1}ский"),
        (r"([а-яё]+)цький\b", "${1}цкий"),
    ]
    .into_iter()
    .map(|(pat, rep)| (Regex::new(pat).expect("static pattern"), rep))
    .collect()
});

/// Apply the full substitution pass to one piece of cell text.
pub fn apply(text: &str) -> String {
    let mut s = text.to_string();

    for (from, to) in WORD_MAP.iter() {
        if s.contains(from) {
            s = s.replace(from, to);
        }
    }

    for (re, rep) in PATTERNS.iter() {
        s = re.replace_all(&s, *rep).into_owned();
    }

    for &(from, to) in CHAR_MAP {
        if s.contains(from) {
            s = s.replace(from, &to.to_string());
        }
    }

    s
}

/// True if the text contains anything the pass would rewrite.
///
/// Cheaper than `apply(text) != text` for the common all-clean case because
/// the character scan short-circuits without allocating.
pub fn needs_substitution(text: &str) -> bool {
    if text.chars().any(|c| CHAR_MAP.iter().any(|&(from, _)| c == from)) {
        return true;
    }
    WORD_MAP.iter().any(|(from, _)| text.contains(from))
        || PATTERNS.iter().any(|(re, _)| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characters_mapped() {
        assert_eq!(apply("їжак і Єва"), "ижак и Ева");
        assert_eq!(apply("Ґанок ўзор"), "Ганок узор");
    }

    #[test]
    fn words_mapped_before_characters() {
        // If the character pass ran first, the key `Свідоцтво` would already
        // have mutated to `Свидоцтво` and the word rule would miss.
        assert_eq!(apply("Свідоцтво"), "Свидетельство");
        // Inflected forms missing from the word table still get the
        // character-level repair.
        assert_eq!(apply("про реєстрацію"), "про реестрацию");
    }

    #[test]
    fn longest_word_key_wins() {
        assert_eq!(apply("реєстраційний"), "регистрационный");
    }

    #[test]
    fn date_constructions_rewritten() {
        assert_eq!(apply("на 2024 року"), "на 2024 года");
        assert_eq!(apply("у 2023 році"), "в 2023 году");
        assert_eq!(apply("з 15 жовтня 2024 року"), "с 15 октября 2024 года");
    }

    #[test]
    fn case_endings_rewritten() {
        assert_eq!(apply("Волгоградський"), "Волгоградский");
        assert_eq!(apply("значення"), "значение");
    }

    #[test]
    fn russian_text_untouched() {
        let text = "Свидетельство о регистрации выдано в 2024 году";
        assert_eq!(apply(text), text);
        assert!(!needs_substitution(text));
    }

    #[test]
    fn numbers_and_codes_preserved() {
        assert_eq!(apply("ІНН 3445915248 БІК 041806001"), "ИНН 3445915248 БИК 041806001");
    }

    #[test]
    fn idempotent_on_mixed_text() {
        let input = "Свідоцтво № 12 від 3 жовтня 2024 року, реєстраційний рахунок, \
                     загальноосвітнє учреждение, Серафимовичський район";
        let once = apply(input);
        let twice = apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn idempotent_on_every_table_entry() {
        for (from, _) in WORD_MAP.iter() {
            let once = apply(from);
            assert_eq!(apply(&once), once, "word key {from:?} not idempotent");
        }
        for &(from, _) in CHAR_MAP {
            let s = from.to_string();
            let once = apply(&s);
            assert_eq!(apply(&once), once, "char {from:?} not idempotent");
        }
    }

    #[test]
    fn needs_substitution_detects_all_kinds() {
        assert!(needs_substitution("і"));
        assert!(needs_substitution("рахунок"));
        assert!(needs_substitution("на 2024 року"));
        assert!(!needs_substitution("чистый русский текст"));
    }
}
