//! Bracket markup -> inline XML.

use std::sync::OnceLock;

use regex::{Captures, Regex};

fn rtf_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<RTFBRK>").unwrap())
}

fn decoration_codes() -> &'static Regex {
    // Highlighting, alignment, strikethrough, underline: dropped entirely.
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[/?[hcrsu]\d*\]").unwrap())
}

fn special_spans() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(?:HTM|TEX|RTF|epub|mobi|rtfimg) .+?/(?:HTM|TEX|RTF|epub|mobi|rtfimg)>")
            .unwrap()
    })
}

fn note_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\* *@([ef]n\**) (.*?)\*/").unwrap())
}

fn comment_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/\*(.*?)\*/").unwrap())
}

fn quotation_paragraph() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<p>&gt; (.*?)</p>").unwrap())
}

/// Converter from bracket markup to paragraph-structured inline XML.
///
/// Stateful: note auto-numbering runs across all bodies converted by one
/// instance, so a whole project shares one numbering sequence.
pub struct BracketToXml {
    creator: String,
    timestamp: String,
    languages: Vec<String>,
    note_counter: u32,
    note_number: u32,
}

impl BracketToXml {
    /// `creator` and `timestamp` go into generated `<comment>` headers;
    /// `languages` lists the codes whose `[lang=xx]` spans are translated
    /// (unregistered codes pass through as literal text).
    pub fn new(
        creator: impl Into<String>,
        timestamp: impl Into<String>,
        languages: &[String],
    ) -> Self {
        Self {
            creator: creator.into(),
            timestamp: timestamp.into(),
            languages: languages.to_vec(),
            note_counter: 0,
            note_number: 0,
        }
    }

    pub fn convert(&mut self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let text = rtf_break().replace_all(text, "");
        let text = decoration_codes().replace_all(&text, "");
        let text = special_spans().replace_all(&text, "");

        let text = self.balance_lines(&text);

        let mut text = text
            .replace('&', "&amp;")
            .replace('>', "&gt;")
            .replace('<', "&lt;")
            .replace('\'', "&apos;")
            .replace('"', "&quot;")
            .replace('\n', "</p><p>")
            .replace("[i]", "<em>")
            .replace("[/i]", "</em>")
            .replace("[b]", "<strong>")
            .replace("[/b]", "</strong>");
        for language in &self.languages {
            text = text.replace(
                &format!("[lang={language}]"),
                &format!(r#"<span xml:lang="{language}">"#),
            );
            text = text.replace(&format!("[/lang={language}]"), "</span>");
        }

        if text.contains("/*") {
            text = note_span()
                .replace_all(&text, |caps: &Captures<'_>| self.replace_note(caps))
                .into_owned();
            let creator = self.creator.clone();
            let timestamp = self.timestamp.clone();
            text = comment_span()
                .replace_all(&text, |caps: &Captures<'_>| {
                    format!(
                        "<comment><creator>{creator}</creator><date>{timestamp}</date><p>{}</p></comment>",
                        &caps[1]
                    )
                })
                .into_owned();
        }

        let text = format!("<p>{text}</p>");
        quotation_paragraph()
            .replace_all(&text, r#"<p style="quotations">$1</p>"#)
            .into_owned()
    }

    /// Re-balances `[i]`/`[b]`/`[lang=xx]` spans that open on one line and
    /// close on a later one, so each paragraph serializes as properly
    /// nested inline XML. Carries open state across line breaks.
    fn balance_lines(&self, text: &str) -> String {
        let mut tags: Vec<String> = vec!["i".to_string(), "b".to_string()];
        for language in &self.languages {
            tags.push(format!("lang={language}"));
        }

        let mut is_open: Vec<bool> = vec![false; tags.len()];
        let mut lines: Vec<String> = Vec::new();
        for line in text.split('\n') {
            let mut line = line.to_string();
            for (i, tag) in tags.iter().enumerate() {
                let opening = format!("[{tag}]");
                let closing = format!("[/{tag}]");
                if is_open[i] {
                    if let Some(rest) = line.strip_prefix("> ") {
                        line = format!("> {opening}{rest}");
                    } else {
                        line = format!("{opening}{line}");
                    }
                    is_open[i] = false;
                }
                while line.matches(&opening).count() > line.matches(&closing).count() {
                    line.push_str(&closing);
                    is_open[i] = true;
                }
                while line.matches(&closing).count() > line.matches(&opening).count() {
                    line = format!("{opening}{line}");
                }
                line = line.replace(&format!("{opening}{closing}"), "");
            }
            lines.push(line);
        }
        lines.join("\n").trim_end().to_string()
    }

    fn replace_note(&mut self, caps: &Captures<'_>) -> String {
        let note_kind = &caps[1];
        self.note_counter += 1;
        self.note_number += 1;
        let mut label = self.note_number.to_string();
        let class = if note_kind.starts_with("fn") {
            if note_kind.ends_with('*') {
                self.note_number -= 1;
                label = "*".to_string();
            }
            "footnote"
        } else {
            "endnote"
        };
        format!(
            "<note id=\"ftn{}\" class=\"{class}\"><note-citation>{label}</note-citation><p>{}</p></note>",
            self.note_counter, &caps[2]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(text: &str) -> String {
        BracketToXml::new("Author", "2024-07-13T12:00:00", &[]).convert(text)
    }

    #[test]
    fn plain_text_becomes_one_paragraph() {
        assert_eq!(convert("Hello world."), "<p>Hello world.</p>");
    }

    #[test]
    fn newline_splits_paragraphs() {
        assert_eq!(convert("One.\nTwo."), "<p>One.</p><p>Two.</p>");
    }

    #[test]
    fn emphasis_and_strong_translate() {
        assert_eq!(
            convert("Hello [b]world[/b]. [i]Next[/i]."),
            "<p>Hello <strong>world</strong>. <em>Next</em>.</p>"
        );
    }

    #[test]
    fn metacharacters_are_escaped() {
        assert_eq!(convert("a & b < c"), "<p>a &amp; b &lt; c</p>");
    }

    #[test]
    fn multi_line_span_is_balanced_per_paragraph() {
        assert_eq!(
            convert("[i]one\ntwo[/i]"),
            "<p><em>one</em></p><p><em>two</em></p>"
        );
    }

    #[test]
    fn registered_language_span_translates() {
        let mut converter =
            BracketToXml::new("Author", "2024-07-13T12:00:00", &["de".to_string()]);
        assert_eq!(
            converter.convert("[lang=de]Hallo[/lang=de] [lang=fr]salut[/lang=fr]"),
            r#"<p><span xml:lang="de">Hallo</span> [lang=fr]salut[/lang=fr]</p>"#
        );
    }

    #[test]
    fn comment_becomes_structured_element() {
        assert_eq!(
            convert("Before /*remark*/ after."),
            "<p>Before <comment><creator>Author</creator><date>2024-07-13T12:00:00</date><p>remark</p></comment> after.</p>"
        );
    }

    #[test]
    fn footnotes_number_and_starred_do_not_advance() {
        let mut converter = BracketToXml::new("Author", "t", &[]);
        let out = converter.convert("a/* @fn one */b/* @fn* two */c/* @fn three */");
        assert!(out.contains(r#"<note id="ftn1" class="footnote"><note-citation>1</note-citation>"#));
        assert!(out.contains(r#"<note id="ftn2" class="footnote"><note-citation>*</note-citation>"#));
        assert!(out.contains(r#"<note id="ftn3" class="footnote"><note-citation>2</note-citation>"#));
    }

    #[test]
    fn endnote_class_is_carried() {
        let out = BracketToXml::new("Author", "t", &[]).convert("x/* @en note */y");
        assert!(out.contains(r#"class="endnote""#));
    }

    #[test]
    fn quotation_lines_get_styled_paragraphs() {
        assert_eq!(
            convert("> quoted line"),
            r#"<p style="quotations">quoted line</p>"#
        );
    }

    #[test]
    fn decoration_codes_are_dropped() {
        assert_eq!(convert("[u]plain[/u] [h3]x[/h3]"), "<p>plain x</p>");
    }
}
