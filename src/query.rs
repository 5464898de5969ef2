//! Builds arXiv `search_query` expressions.

use crate::config::KeywordExpr;
use crate::window::DateWindow;

/// Wraps multi-word terms in double quotes so arXiv treats them as one phrase.
pub fn quote_term(term: &str) -> String {
    let term = term.trim();
    if term.len() >= 2 && term.starts_with('"') && term.ends_with('"') {
        let inner = term[1..term.len() - 1].replace('"', "");
        let inner = inner.trim();
        return if inner.is_empty() { String::new() } else { format!("\"{}\"", inner) };
    }
    let cleaned = term.replace('"', "");
    if cleaned.split_whitespace().count() > 1 {
        format!("\"{}\"", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
    } else {
        cleaned
    }
}

fn keyword_clause(keywords: &KeywordExpr) -> Option<String> {
    match keywords {
        KeywordExpr::Raw(expr) => {
            let expr = expr.trim();
            (!expr.is_empty()).then(|| expr.to_string())
        }
        KeywordExpr::AnyOf { any_of, fields } => {
            let fields: Vec<&str> = if fields.is_empty() {
                vec!["all"]
            } else {
                fields.iter().map(String::as_str).collect()
            };
            let parts: Vec<String> = any_of
                .iter()
                .map(|t| quote_term(t))
                .filter(|quoted| !quoted.is_empty())
                .map(|quoted| {
                    let per_field: Vec<String> =
                        fields.iter().map(|f| format!("{}:{}", f, quoted)).collect();
                    if per_field.len() == 1 {
                        per_field[0].clone()
                    } else {
                        format!("({})", per_field.join(" OR "))
                    }
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join(" OR "))
        }
    }
}

pub fn date_clause(window: &DateWindow) -> String {
    format!(
        "submittedDate:[{}0000 TO {}2359]",
        window.start.format("%Y%m%d"),
        window.end.format("%Y%m%d")
    )
}

/// `(cat:A OR cat:B) AND (<keywords>) AND submittedDate:[...]`
pub fn build_query(categories: &[String], keywords: &KeywordExpr, window: &DateWindow) -> String {
    let mut clauses = Vec::with_capacity(3);

    let cats: Vec<String> = categories
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| format!("cat:{}", c))
        .collect();
    if !cats.is_empty() {
        clauses.push(format!("({})", cats.join(" OR ")));
    }

    if let Some(kw) = keyword_clause(keywords) {
        clauses.push(format!("({})", kw));
    }

    clauses.push(date_clause(window));
    clauses.join(" AND ")
}
