//! Small text conventions shared by both codecs: semicolon lists,
//! validated scalar strings, and body word counting.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;

use crate::ModelError;

/// Splits a `;`-separated field into trimmed, de-duplicated elements.
pub fn string_to_list(text: &str) -> Vec<String> {
    let mut elements: Vec<String> = Vec::new();
    for element in text.split(';') {
        let element = element.trim();
        if !element.is_empty() && !elements.iter().any(|e| e == element) {
            elements.push(element.to_string());
        }
    }
    elements
}

/// Joins elements back into a `;`-separated field.
pub fn list_to_string(elements: &[String]) -> String {
    elements.join(";")
}

/// Keeps the elements of `list` that also occur in `reference`, preserving
/// the order of `list`. Used to drop dangling ID references on read.
pub fn intersection<S: AsRef<str>>(list: &[String], reference: &[S]) -> Vec<String> {
    list.iter()
        .filter(|elem| reference.iter().any(|r| r.as_ref() == elem.as_str()))
        .cloned()
        .collect()
}

/// Validates an ISO `YYYY-MM-DD` date string and passes it through.
pub fn verified_date(date: &str) -> Result<String, ModelError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ModelError::InvalidDate(date.to_string()))?;
    Ok(date.to_string())
}

/// Validates an integer string and passes it through.
pub fn verified_int_string(value: &str) -> Result<String, ModelError> {
    value
        .parse::<i64>()
        .map_err(|_| ModelError::InvalidInt(value.to_string()))?;
    Ok(value.to_string())
}

/// Validates an ISO time string, padding `H:MM` forms out to `H:MM:SS`.
pub fn verified_time(time: &str) -> Result<String, ModelError> {
    let mut padded = time.to_string();
    while padded.matches(':').count() < 2 {
        padded.push_str(":00");
    }
    NaiveTime::parse_from_str(&padded, "%H:%M:%S")
        .map_err(|_| ModelError::InvalidTime(time.to_string()))?;
    Ok(padded)
}

fn word_separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--|—|–|</p>").unwrap())
}

fn non_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<note>.*?</note>|<comment>.*?</comment>|<.+?>|\[.*?\]|/\*.*?\*/").unwrap()
    })
}

/// Counts the words of a section body.
///
/// Dash variants and paragraph closers count as separators; markup
/// directives, inline comment/note spans and generic tags are dropped
/// before splitting on whitespace.
pub fn count_words(text: &str) -> usize {
    let text = word_separators().replace_all(text, " ");
    let text = non_words().replace_all(&text, "");
    text.split_whitespace().count()
}

fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[\u{00}-\u{08}\u{0b}-\u{0c}\u{0e}-\u{1f}]").unwrap())
}

/// Drops control characters that are not legal in XML 1.0 text.
pub fn strip_illegal_characters(text: &str) -> String {
    illegal_chars().replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_round_trip_trims_and_dedups() {
        let list = string_to_list(" alpha ; beta;alpha; ;gamma");
        assert_eq!(list, vec!["alpha", "beta", "gamma"]);
        assert_eq!(list_to_string(&list), "alpha;beta;gamma");
    }

    #[test]
    fn intersection_keeps_order_of_first_operand() {
        let list = vec!["cr2".to_string(), "cr9".to_string(), "cr1".to_string()];
        let reference = ["cr1", "cr2"];
        assert_eq!(intersection(&list, &reference), vec!["cr2", "cr1"]);
    }

    #[test]
    fn verified_time_pads_short_forms() {
        assert_eq!(verified_time("9:15").unwrap(), "9:15:00");
        assert_eq!(verified_time("09:15:30").unwrap(), "09:15:30");
        assert!(verified_time("25:00").is_err());
    }

    #[test]
    fn count_words_ignores_markup() {
        assert_eq!(count_words("<p>Hello <em>bold</em> world.</p>"), 3);
        assert_eq!(count_words("one--two—three"), 3);
        assert_eq!(count_words("word [i]word[/i] /* note */"), 2);
        assert_eq!(count_words("<p>a<note>dropped words</note> b</p>"), 2);
    }

    #[test]
    fn strip_illegal_characters_keeps_whitespace() {
        assert_eq!(strip_illegal_characters("a\u{01}b\tc\nd"), "ab\tc\nd");
    }
}
