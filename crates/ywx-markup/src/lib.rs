//! Inline markup translation.
//!
//! The legacy format stores rich text as compact bracket markup (`[i]`,
//! `[b]`, `[lang=xx]`, `/* comment */`); the current format stores it as
//! inline XML (`<em>`, `<strong>`, `<span xml:lang>`, `<comment>`,
//! `<note>`) inside `<p>` paragraphs. The two directions are independent
//! one-way transforms, not a shared grammar; they are inverses only up to
//! formatting normalization (the same bracket tokens come back, not the
//! same bytes).

mod to_bracket;
mod to_xml;

pub use to_bracket::xml_to_bracket;
pub use to_xml::BracketToXml;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("inline markup parse error: {0}")]
    Xml(String),
}
