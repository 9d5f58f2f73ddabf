use pulldown_cmark::{html, Options, Parser as MdParser};

use crate::error::{RenderError, TransformStage};

pub use pulldown_cmark;

pub fn md_options() -> Options {
    let mut md_options = Options::empty();
    // Enabled explicitly rather than via Options::all() so output stays stable across
    // pulldown-cmark upgrades.
    md_options.insert(Options::ENABLE_DEFINITION_LIST);
    md_options.insert(Options::ENABLE_FOOTNOTES);
    md_options.insert(Options::ENABLE_GFM);
    md_options.insert(Options::ENABLE_STRIKETHROUGH);
    md_options.insert(Options::ENABLE_TABLES);
    md_options.insert(Options::ENABLE_TASKLISTS);
    // Front matter is consumed, never rendered.
    md_options.insert(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    md_options.insert(Options::ENABLE_PLUSES_DELIMITED_METADATA_BLOCKS);
    md_options
}

pub fn to_html(content: &str, output: &mut String) -> Result<(), RenderError> {
    let parser = MdParser::new_ext(content, md_options());
    html::write_html_fmt(output, parser)
        .map_err(|e| RenderError::parse(TransformStage::Markdown, e))?;
    Ok(())
}

/// Render raw document bytes. The input must be UTF-8; a leading byte order mark is
/// dropped.
pub fn bytes_to_html(raw: &[u8]) -> Result<String, RenderError> {
    let content = std::str::from_utf8(raw).map_err(|e| {
        RenderError::parse(TransformStage::Markdown, format!("input is not valid UTF-8: {e}"))
    })?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut output = String::with_capacity(content.len() + content.len() / 2);
    to_html(content, &mut output)?;
    Ok(output)
}
