//! Localization service boundary
//!
//! The engine only needs two things from localization: detecting the
//! language of user-authored text, and choosing which rendition of a text a
//! viewer reads. `ScriptLocalizer` is a script-based default good enough for
//! the three supported languages.

use crate::core_store::model::{Lang, LocalizedText};
use async_trait::async_trait;

#[async_trait]
pub trait Localizer: Send + Sync {
    /// Best guess at the language `text` is written in
    async fn detect_language(&self, text: &str) -> Lang;

    /// Text to show a viewer reading in `viewer_lang`
    async fn localize(
        &self,
        original: &LocalizedText,
        viewer_lang: Lang,
        show_original: bool,
    ) -> String;
}

/// Letters used by Kazakh but not by Russian
const KAZAKH_LETTERS: &[char] = &[
    'ә', 'ғ', 'қ', 'ң', 'ө', 'ұ', 'ү', 'һ', 'і', 'Ә', 'Ғ', 'Қ', 'Ң', 'Ө', 'Ұ', 'Ү', 'Һ', 'І',
];

fn is_cyrillic(c: char) -> bool {
    ('\u{0400}'..='\u{04FF}').contains(&c)
}

/// Picks a language from the dominant script
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptLocalizer;

impl ScriptLocalizer {
    pub fn detect(text: &str) -> Lang {
        let mut cyrillic = 0usize;
        let mut latin = 0usize;
        let mut kazakh = false;

        for c in text.chars() {
            if KAZAKH_LETTERS.contains(&c) {
                kazakh = true;
            }
            if is_cyrillic(c) {
                cyrillic += 1;
            } else if c.is_ascii_alphabetic() {
                latin += 1;
            }
        }

        if cyrillic == 0 && latin == 0 {
            Lang::default()
        } else if cyrillic >= latin {
            if kazakh {
                Lang::Kk
            } else {
                Lang::Ru
            }
        } else {
            Lang::En
        }
    }

    pub fn pick(original: &LocalizedText, viewer_lang: Lang, show_original: bool) -> String {
        if show_original || original.lang == viewer_lang {
            return original.text.clone();
        }
        original
            .translations
            .get(&viewer_lang)
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| original.text.clone())
    }
}

#[async_trait]
impl Localizer for ScriptLocalizer {
    async fn detect_language(&self, text: &str) -> Lang {
        ScriptLocalizer::detect(text)
    }

    async fn localize(
        &self,
        original: &LocalizedText,
        viewer_lang: Lang,
        show_original: bool,
    ) -> String {
        ScriptLocalizer::pick(original, viewer_lang, show_original)
    }
}
