//! Text-quality scoring for OCR output.
//!
//! The score is a blunt instrument by design: it exists to tell the user
//! "the LLM pass changed something real" versus "the document was already
//! clean", not to measure OCR accuracy. Three signal classes feed it:
//!
//! * Ukrainian letter forms and constructions that should not appear in a
//!   Russian document,
//! * adjacency patterns typical of OCR confusions (digit glued to a letter,
//!   Latin `l`/`0` inside Cyrillic words),
//! * a mixed-script ratio — documents that come back half-Latin are almost
//!   always misrecognised.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Letters that should not survive in Russian text.
const UKRAINIAN_CHARS: &[char] = &['ї', 'і', 'є', 'ґ', 'ў', 'Ї', 'І', 'Є', 'Ґ', 'Ў'];

static UKRAINIAN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bукраїн",
        r"(?i)ський\b",
        r"(?i)цький\b",
        r"(?i)\bна\s+\d+\s+року\b",
        r"(?i)\bрік\b",
        r"(?i)\bроку\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static OCR_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\b0[а-яё]", "цифра 0 вместо буквы О"),
        (r"(?i)[а-яё]0\b", "цифра 0 вместо буквы О"),
        (r"(?i)\bl[а-яё]", "латинская l вместо буквы"),
        (r"(?i)[а-яё]l\b", "латинская l вместо буквы"),
        (r"(?i)\d[а-яё]", "цифра склеена с буквой"),
        (r"(?i)[а-яё]\d", "буква склеена с цифрой"),
    ]
    .into_iter()
    .map(|(p, d)| (Regex::new(p).expect("static pattern"), d))
    .collect()
});

static RE_CYRILLIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[а-яё]").unwrap());
static RE_LATIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[a-z]").unwrap());

/// Outcome of scoring one body of text.
#[derive(Debug, Clone)]
pub struct QualityReport {
    /// Distinct Ukrainian letters found plus matched Ukrainian patterns.
    pub ukrainian_hits: usize,
    /// Total OCR-confusion pattern matches.
    pub ocr_hits: usize,
    /// True when Cyrillic and Latin are interleaved beyond the 10% ratio.
    pub mixed_scripts: bool,
    /// 0–100; 100 is clean.
    pub score: u8,
}

impl QualityReport {
    /// Whether the enhancement pass has anything to gain on this text.
    pub fn needs_enhancement(&self) -> bool {
        self.ukrainian_hits > 0 || self.ocr_hits > 0
    }
}

/// Score `text` against the signal tables.
pub fn analyze(text: &str) -> QualityReport {
    let mut ukrainian_hits = UKRAINIAN_CHARS
        .iter()
        .filter(|&&c| text.contains(c))
        .count();
    ukrainian_hits += UKRAINIAN_PATTERNS
        .iter()
        .filter(|re| re.is_match(text))
        .count();

    let ocr_hits: usize = OCR_PATTERNS
        .iter()
        .map(|(re, _)| re.find_iter(text).count())
        .sum();

    let cyrillic = RE_CYRILLIC.find_iter(text).count();
    let latin = RE_LATIN.find_iter(text).count();
    let mixed_scripts = if cyrillic > 0 && latin > 0 {
        let ratio = cyrillic.min(latin) as f64 / cyrillic.max(latin) as f64;
        ratio > 0.1
    } else {
        false
    };

    let mut score: i64 = 100;
    score -= ukrainian_hits as i64 * 15;
    score -= ocr_hits as i64 * 5;
    if mixed_scripts {
        score -= 20;
    }

    QualityReport {
        ukrainian_hits,
        ocr_hits,
        mixed_scripts,
        score: score.clamp(0, 100) as u8,
    }
}

/// Before/after statistics reported back to the user on success.
#[derive(Debug, Clone, Serialize)]
pub struct EnhancementStats {
    pub original_score: u8,
    pub enhanced_score: u8,
    /// `enhanced_score - original_score`; negative means the pass regressed
    /// (never shown to the user, but logged).
    pub improvement: i16,
    pub ukrainian_fixed: usize,
    pub ocr_fixed: usize,
    /// Worksheet cells whose text actually changed.
    pub cells_changed: usize,
}

impl EnhancementStats {
    /// Compare the text before and after the post-processing passes.
    pub fn compare(original: &str, enhanced: &str, cells_changed: usize) -> Self {
        let before = analyze(original);
        let after = analyze(enhanced);
        Self {
            original_score: before.score,
            enhanced_score: after.score,
            improvement: after.score as i16 - before.score as i16,
            ukrainian_fixed: before.ukrainian_hits.saturating_sub(after.ukrainian_hits),
            ocr_fixed: before.ocr_hits.saturating_sub(after.ocr_hits),
            cells_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_russian_scores_high() {
        let r = analyze("Свидетельство о регистрации выдано в 2024 году");
        assert_eq!(r.ukrainian_hits, 0);
        assert!(!r.mixed_scripts);
        assert!(r.score >= 90, "score = {}", r.score);
        assert!(!r.needs_enhancement());
    }

    #[test]
    fn ukrainian_letters_penalised() {
        let r = analyze("Свідоцтво про реєстрацію");
        assert!(r.ukrainian_hits >= 2);
        assert!(r.score < 80);
        assert!(r.needs_enhancement());
    }

    #[test]
    fn date_construction_detected() {
        let r = analyze("выдано на 2024 року");
        assert!(r.ukrainian_hits >= 1);
    }

    #[test]
    fn mixed_scripts_detected() {
        let r = analyze("Счет hflprops вadmin структура remote");
        assert!(r.mixed_scripts);
    }

    #[test]
    fn tiny_latin_fraction_is_not_mixed() {
        // A lone unit like "kWh" inside a page of Cyrillic is fine.
        let cyr = "только русский текст ".repeat(10);
        let r = analyze(&format!("{cyr} kW"));
        assert!(!r.mixed_scripts);
    }

    #[test]
    fn score_floor_is_zero() {
        let noisy = "ї є ґ ў і на 1 року рік 0а б0 l5 5т".repeat(4);
        let r = analyze(&noisy);
        assert_eq!(r.score, 0);
    }

    #[test]
    fn stats_reflect_substitution_gain() {
        let before = "Свідоцтво видано на 2024 року";
        let after = "Свидетельство выдано на 2024 года";
        let stats = EnhancementStats::compare(before, after, 2);
        assert!(stats.improvement > 0);
        assert!(stats.ukrainian_fixed >= 1);
        assert_eq!(stats.cells_changed, 2);
        assert!(stats.enhanced_score > stats.original_score);
    }
}
