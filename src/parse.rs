//! Tolerant parsing of the ranking model's reply.
//!
//! Models wrap JSON in code fences, surround it with prose, or emit relaxed
//! JSON. The reply is run through an ordered chain of strategies and the
//! first one that yields a JSON value wins.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::ParseError;

/// What the model answered once its reply has been decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAnswer {
    /// Raw list items, not yet validated as picks.
    Items(Vec<Value>),
    /// `null` or `[]`: the model found nothing worth recommending.
    NothingQualifies,
}

type Strategy = fn(&str) -> Option<Value>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("strict", strict),
    ("relaxed", relaxed),
    ("extracted", extracted),
    ("sentinel", sentinel),
];

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n?(.*?)\s*```$").expect("fence regex"))
}

/// Removes a surrounding Markdown code fence, if any.
pub fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    match fence_re().captures(trimmed).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => trimmed,
    }
}

fn strict(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

fn relaxed(text: &str) -> Option<Value> {
    json5::from_str(text).ok()
}

/// Byte offset of the `]` closing the `[` that `s` starts with. Brackets inside
/// string literals don't count.
fn matching_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every balanced `[...]` span, in order of its opening bracket.
fn bracket_spans(text: &str) -> impl Iterator<Item = &str> + '_ {
    text.match_indices('[').filter_map(move |(start, _)| {
        matching_close(&text[start..]).map(|end| &text[start..=start + end])
    })
}

// Prose around the payload may carry its own brackets ("the [1-5] scale"), so the
// first span holding objects wins and any other parseable span is the fallback.
fn extracted(text: &str) -> Option<Value> {
    let mut fallback = None;
    for span in bracket_spans(text) {
        match relaxed(span) {
            Some(Value::Array(items)) if items.iter().any(Value::is_object) => {
                return Some(Value::Array(items))
            }
            Some(other) => {
                fallback.get_or_insert(other);
            }
            None => {}
        }
    }
    fallback
}

fn sentinel(text: &str) -> Option<Value> {
    let word = text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '`' | '"' | '\'' | '.'));
    if word.eq_ignore_ascii_case("null") || word.eq_ignore_ascii_case("none") {
        Some(Value::Null)
    } else if word.chars().filter(|c| !c.is_whitespace()).collect::<String>() == "[]" {
        Some(Value::Array(Vec::new()))
    } else {
        None
    }
}

fn preview(text: &str) -> String {
    let mut p: String = text.chars().take(200).collect();
    if p.len() < text.len() {
        p.push('…');
    }
    p
}

pub fn parse_model_output(raw: &str) -> Result<ModelAnswer, ParseError> {
    let text = strip_fences(raw);

    let parsed = STRATEGIES.iter().find_map(|(name, strategy)| {
        strategy(text).map(|v| {
            debug!("Model output decoded by {} strategy", name);
            v
        })
    });

    match parsed {
        Some(Value::Array(items)) if items.is_empty() => Ok(ModelAnswer::NothingQualifies),
        Some(Value::Array(items)) => Ok(ModelAnswer::Items(items)),
        Some(Value::Null) => Ok(ModelAnswer::NothingQualifies),
        Some(Value::Object(_)) => Err(ParseError::NotAList("object")),
        Some(Value::String(_)) => Err(ParseError::NotAList("string")),
        Some(Value::Number(_)) => Err(ParseError::NotAList("number")),
        Some(Value::Bool(_)) => Err(ParseError::NotAList("boolean")),
        None => Err(ParseError::Unparseable {
            preview: preview(raw.trim()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(raw: &str) -> Vec<Value> {
        match parse_model_output(raw).unwrap() {
            ModelAnswer::Items(items) => items,
            other => panic!("expected items, got {:?}", other),
        }
    }

    #[test]
    fn strips_json_code_fence() {
        assert_eq!(items("```json\n[{\"id\":\"A\"}]\n```"), vec![json!({"id": "A"})]);
        assert_eq!(items("```\n[{\"id\":\"A\"}]\n```"), vec![json!({"id": "A"})]);
    }

    #[test]
    fn accepts_relaxed_json() {
        let raw = "[{id: 'A', scores: {Novelty: 5, Rigor: 4,}, reason_en: \"ok\",},]";
        let got = items(raw);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["id"], "A");
        assert_eq!(got[0]["reason_en"], "ok");
        assert_eq!(got[0]["scores"]["Rigor"].as_f64(), Some(4.0));
    }

    #[test]
    fn extracts_array_from_prose() {
        let raw = "Here are my picks for today:\n\
                   [\n  {\"id\": \"A\", \"scores\": {\"Novelty\": [5]}},\n  {\"id\": \"B\"},\n]\n\
                   Let me know if you need more.";
        let got = items(raw);
        assert_eq!(got.len(), 2);
        assert_eq!(got[1]["id"], "B");
    }

    #[test]
    fn brackets_in_surrounding_prose_are_skipped() {
        let trailing = "```json\n[{\"id\":\"A\"}]\n```\nScores use the [1-5] scale.";
        assert_eq!(items(trailing), vec![json!({"id": "A"})]);

        let leading = "Based on [your preference], my picks:\n[{\"id\":\"A\"}]";
        assert_eq!(items(leading), vec![json!({"id": "A"})]);

        let apostrophe = "Given [the user's focus] and [2] as the cap:\n[{\"id\": \"B\", \"reason_en\": \"uses [x] notation\"}]";
        let got = items(apostrophe);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["reason_en"], "uses [x] notation");
    }

    #[test]
    fn empty_array_in_prose_means_nothing_qualifies() {
        assert_eq!(
            parse_model_output("After review, nothing fits: []").unwrap(),
            ModelAnswer::NothingQualifies
        );
    }

    #[test]
    fn finds_the_closing_bracket_of_the_first_array() {
        assert_eq!(matching_close("[[1], \"]\"] tail ]"), Some(9));
        assert_eq!(matching_close("[unterminated"), None);
        let spans: Vec<_> = bracket_spans("a [b] c [[d]]").collect();
        assert_eq!(spans, ["[b]", "[[d]]", "[d]"]);
    }

    #[test]
    fn null_and_empty_mean_nothing_qualifies() {
        for raw in ["null", "NULL", "`null`", "```json\nnull\n```", "[]", "[ ]", "Null."] {
            assert_eq!(
                parse_model_output(raw).unwrap(),
                ModelAnswer::NothingQualifies,
                "{raw}"
            );
        }
    }

    #[test]
    fn non_list_is_an_error() {
        assert_eq!(
            parse_model_output("{\"id\": \"A\"}"),
            Err(ParseError::NotAList("object"))
        );
        assert_eq!(parse_model_output("42"), Err(ParseError::NotAList("number")));
    }

    #[test]
    fn garbage_is_unparseable() {
        let err = parse_model_output("I could not decide, sorry!").unwrap_err();
        assert!(matches!(err, ParseError::Unparseable { preview } if preview.starts_with("I could")));
    }
}
