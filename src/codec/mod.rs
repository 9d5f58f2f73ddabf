//! Markdown to standalone HTML conversion.
//!
//! [`DocumentTransformer`] turns the raw bytes of one document into a complete HTML page.
//! It is synchronous and free of shared mutable state; concurrency is the caller's concern.
//!
//! ## Stages
//!
//! 1. **Markdown**: raw bytes to an HTML fragment via [`md::bytes_to_html`]
//! 2. **Tree**: one streaming rewrite over the fragment that
//!    - replaces the text of every `code[class*="language-"]` element with highlighted
//!      markup ([`highlight::Highlighter`]), and
//!    - resolves every local `<img src>` through [`assets::AssetResolver`]
//! 3. **Serialize**: strip any synthesized document wrapper and splice the fragment into the
//!    page template ([`template::splice`])
//!
//! A failure in stage 1 or 2, or a template that cannot hold the content, fails the document
//! with [`RenderError::Parse`] naming the stage. Highlight and asset problems are logged
//! and leave the affected node as it was.
//!
//! ```rust
//! use mdrender::{codec::DocumentTransformer, config::RenderConfig};
//! use std::{path::Path, sync::Arc};
//!
//! let config = RenderConfig::new("/docs", "/docs").with_template("<main>{{{content}}}</main>");
//! let transformer = DocumentTransformer::new(Arc::new(config));
//! let html = transformer.transform(b"# Hello", Path::new("/docs"))?;
//! assert_eq!(html, "<main><h1>Hello</h1>\n</main>");
//! # Ok::<(), mdrender::RenderError>(())
//! ```

use std::{cell::RefCell, path::Path, rc::Rc, sync::Arc};

use lol_html::{element, html_content::ContentType, rewrite_str, text, RewriteStrSettings};

use crate::{
    config::{RenderConfig, CONTENT_PLACEHOLDER},
    error::{RenderError, TransformStage},
};

pub mod assets;
pub mod highlight;
pub mod md;
pub mod template;

pub use assets::{AssetOutcome, AssetResolver};
pub use highlight::{highlighter, Highlighter};

const CODE_BLOCK_SELECTOR: &str = r#"code[class*="language-"]"#;
const IMAGE_SELECTOR: &str = "img[src]";
const LANGUAGE_CLASS_PREFIX: &str = "language-";

#[derive(Debug, Default)]
struct CodeBlock {
    language: String,
    /// Escaped text gathered across chunks.
    text: String,
}

#[derive(Clone)]
pub struct DocumentTransformer {
    config: Arc<RenderConfig>,
    highlighter: Arc<Highlighter>,
}

impl DocumentTransformer {
    pub fn new(config: Arc<RenderConfig>) -> Self {
        Self::with_highlighter(config, highlighter())
    }

    pub fn with_highlighter(config: Arc<RenderConfig>, highlighter: Arc<Highlighter>) -> Self {
        DocumentTransformer {
            config,
            highlighter,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Convert one document. `source_dir` is the directory the document lives in; image
    /// references are resolved against it.
    pub fn transform(&self, raw: &[u8], source_dir: &Path) -> Result<String, RenderError> {
        let fragment = md::bytes_to_html(raw)?;
        let rewritten = self.rewrite(&fragment, source_dir)?;
        if !self.config.template.contains(CONTENT_PLACEHOLDER) {
            return Err(RenderError::parse(
                TransformStage::Serialize,
                format!("template has no {CONTENT_PLACEHOLDER} placeholder"),
            ));
        }
        Ok(template::splice(
            &self.config.template,
            template::strip_document_wrapper(&rewritten),
            &self.config.style,
        ))
    }

    fn rewrite(&self, html: &str, source_dir: &Path) -> Result<String, RenderError> {
        let block = Rc::new(RefCell::new(CodeBlock::default()));
        let resolver = AssetResolver::new(&self.config, source_dir);
        let resolver = &resolver;

        let rewritten = rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![
                    element!(CODE_BLOCK_SELECTOR, {
                        let block = Rc::clone(&block);
                        move |el| {
                            let language = el
                                .get_attribute("class")
                                .as_deref()
                                .and_then(language_from_class)
                                .unwrap_or_default();
                            *block.borrow_mut() = CodeBlock {
                                language,
                                text: String::new(),
                            };
                            Ok(())
                        }
                    }),
                    text!(CODE_BLOCK_SELECTOR, {
                        let block = Rc::clone(&block);
                        move |t| {
                            let mut block = block.borrow_mut();
                            block.text.push_str(t.as_str());
                            if t.last_in_text_node() {
                                let escaped = std::mem::take(&mut block.text);
                                let replacement = self.highlight_block(&block.language, &escaped);
                                t.replace(&replacement, ContentType::Html);
                            } else {
                                t.remove();
                            }
                            Ok(())
                        }
                    }),
                    element!(IMAGE_SELECTOR, move |el| {
                        let Some(src) = el.get_attribute("src") else {
                            return Ok(());
                        };
                        match resolver.resolve(&src) {
                            Ok(AssetOutcome::Inlined(data_uri)) => {
                                el.set_attribute("src", &data_uri)?;
                            }
                            Ok(AssetOutcome::Copied(to)) => {
                                tracing::debug!("[DocumentTransformer] copied image {:?}", to);
                            }
                            Ok(AssetOutcome::Remote | AssetOutcome::InPlace) => {}
                            Err(err) => {
                                tracing::warn!(
                                    "[DocumentTransformer] leaving image {:?} unchanged: {}",
                                    src,
                                    err
                                );
                            }
                        }
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::default()
            },
        )?;
        Ok(rewritten)
    }

    /// Highlighted markup for one code block, or the block's original text when the
    /// language is unknown or highlighting fails.
    fn highlight_block(&self, language: &str, escaped: &str) -> String {
        if language.is_empty() {
            return escaped.to_string();
        }
        match self.highlighter.highlight(language, &unescape_html(escaped)) {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!("[DocumentTransformer] failed to syntax highlight: {}", err);
                escaped.to_string()
            }
        }
    }
}

fn language_from_class(class: &str) -> Option<String> {
    class
        .split_whitespace()
        .find_map(|c| c.strip_prefix(LANGUAGE_CLASS_PREFIX))
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
}

/// Reverse the entity escaping markdown rendering applies to code text.
fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
