use std::sync::Arc;

use once_cell::sync::Lazy;
use syntect::{
    highlighting::ThemeSet,
    html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

use crate::error::RenderError;

/// CSS class prefix of every span the highlighter emits.
pub const CLASS_PREFIX: &str = "syntax-";

/// Turns source code into class-annotated `<span>` markup.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    class_style: ClassStyle,
}

impl Highlighter {
    fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            class_style: ClassStyle::SpacedPrefixed {
                prefix: CLASS_PREFIX,
            },
        }
    }

    /// Highlight `code` as `language`. Unrecognised languages are an error so the caller
    /// can keep the block as it was.
    pub fn highlight(&self, language: &str, code: &str) -> Result<String, RenderError> {
        let syntax = self
            .find_syntax(language)
            .ok_or_else(|| RenderError::Highlight {
                language: language.to_string(),
                message: "unrecognised language".to_string(),
            })?;

        let mut code_with_newline = code.to_string();
        if !code_with_newline.ends_with('\n') {
            code_with_newline.push('\n');
        }

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntax_set, self.class_style);
        for line in LinesWithEndings::from(code_with_newline.as_str()) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|err| RenderError::Highlight {
                    language: language.to_string(),
                    message: err.to_string(),
                })?;
        }
        Ok(generator.finalize())
    }

    /// Stylesheet giving the emitted classes the colours of a bundled theme.
    pub fn theme_css(&self, theme: &str) -> Result<String, RenderError> {
        let theme = self.theme_set.themes.get(theme).ok_or_else(|| {
            let mut known: Vec<_> = self.theme_set.themes.keys().cloned().collect();
            known.sort();
            RenderError::Config(format!(
                "unknown highlight theme '{theme}', expected one of {known:?}"
            ))
        })?;
        css_for_theme_with_class_style(theme, self.class_style)
            .map_err(|err| RenderError::Config(format!("failed to build theme css: {err}")))
    }

    fn find_syntax(&self, token: &str) -> Option<&SyntaxReference> {
        let lowercase = token.to_ascii_lowercase();
        self.syntax_set
            .find_syntax_by_token(&lowercase)
            .or_else(|| self.syntax_set.find_syntax_by_name(token))
            .or_else(|| self.syntax_set.find_syntax_by_extension(&lowercase))
    }
}

static HIGHLIGHTER: Lazy<Arc<Highlighter>> = Lazy::new(|| Arc::new(Highlighter::new()));

/// Shared highlighter, loaded on first use. Loading the syntax definitions is the
/// expensive part, so every transformer in a run reuses this instance.
pub fn highlighter() -> Arc<Highlighter> {
    Arc::clone(&HIGHLIGHTER)
}
