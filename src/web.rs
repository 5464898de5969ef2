// Read-only dashboard over the digest archive.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::archive::{Archive, Stored};
use crate::config::TopicConfig;
use crate::digest::DigestEntry;
use crate::ranker::SCORE_DIMENSIONS;
use crate::window::{default_reference, Cadence, TimeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Zh,
    En,
}

impl Lang {
    /// Anything but `zh` falls back to English.
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw {
            Some(l) if l.eq_ignore_ascii_case("zh") => Lang::Zh,
            _ => Lang::En,
        }
    }

    fn code(self) -> &'static str {
        match self {
            Lang::Zh => "zh",
            Lang::En => "en",
        }
    }

    fn labels(self) -> &'static Labels {
        match self {
            Lang::Zh => &ZH,
            Lang::En => &EN,
        }
    }
}

struct Labels {
    title: &'static str,
    caption: &'static str,
    daily: &'static str,
    weekly: &'static str,
    date: &'static str,
    week: &'static str,
    this_week: &'static str,
    last_week: &'static str,
    show: &'static str,
    authors: &'static str,
    scorecard: &'static str,
    reason: &'static str,
    core_value: &'static str,
    summary: &'static str,
    pdf: &'static str,
    missing: &'static str,
    nothing: &'static str,
}

const EN: Labels = Labels {
    title: "Personal AI Editor",
    caption: "Papers scored and curated by AI.",
    daily: "Daily Picks",
    weekly: "Weekly Tutorials",
    date: "Date",
    week: "Week",
    this_week: "This Week",
    last_week: "Last Week",
    show: "Show",
    authors: "Authors",
    scorecard: "AI Scorecard (1-5)",
    reason: "AI Editor's Justification",
    core_value: "Core value",
    summary: "View Abstract",
    pdf: "Download PDF",
    missing: "No data yet.",
    nothing: "Nothing qualified for this period.",
};

const ZH: Labels = Labels {
    title: "私人 AI 总编辑",
    caption: "由 AI 评分精选的研究论文",
    daily: "每日精选",
    weekly: "每周教程",
    date: "日期",
    week: "周",
    this_week: "本周",
    last_week: "上周",
    show: "显示",
    authors: "作者",
    scorecard: "AI 评分卡 (1-5分)",
    reason: "AI 编辑推荐理由",
    core_value: "核心价值",
    summary: "查看摘要",
    pdf: "下载 PDF",
    missing: "尚无数据。",
    nothing: "本期没有符合条件的论文。",
};

/// A topic heading and what the archive holds for it.
pub struct Section<'a> {
    pub topic: &'a TopicConfig,
    pub stored: Stored,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    date: Option<String>,
    week: Option<String>,
    lang: Option<String>,
}

struct Dashboard {
    archive: Archive,
    topics: Vec<TopicConfig>,
}

impl Dashboard {
    fn sections(&self, cadence: Cadence, key: &TimeKey) -> Vec<Section<'_>> {
        self.topics
            .iter()
            .filter(|t| t.cadence == cadence)
            .map(|topic| {
                let stored = self.archive.read(&topic.key, key).unwrap_or_else(|e| {
                    error!("Could not read {} for {}: {}", topic.key, key, e);
                    Stored::Missing
                });
                Section { topic, stored }
            })
            .collect()
    }

    fn daily_page(&self, query: &PageQuery) -> String {
        let lang = Lang::from_param(query.lang.as_deref());
        let date = match query.date.as_deref().and_then(TimeKey::parse) {
            Some(TimeKey::Day(d)) => d,
            _ => default_reference(Cadence::Daily, Local::now().date_naive()),
        };
        render_daily(date, lang, &self.sections(Cadence::Daily, &TimeKey::Day(date)))
    }

    fn weekly_page(&self, query: &PageQuery) -> String {
        let lang = Lang::from_param(query.lang.as_deref());
        let this_week = TimeKey::for_cadence(Cadence::Weekly, Local::now().date_naive());
        let week = match query.week.as_deref().and_then(TimeKey::parse) {
            Some(key @ TimeKey::Week { .. }) => key,
            _ => this_week,
        };
        render_weekly(week, this_week, lang, &self.sections(Cadence::Weekly, &week))
    }

    fn digest_json(&self, topic: &str, key: &str) -> Response {
        let Some(key) = TimeKey::parse(key) else {
            return warp::reply::with_status(warp::reply::json(&Value::Null), StatusCode::BAD_REQUEST)
                .into_response();
        };
        if !self.topics.iter().any(|t| t.key == topic) {
            return warp::reply::with_status(warp::reply::json(&Value::Null), StatusCode::NOT_FOUND)
                .into_response();
        }
        match self.archive.read(topic, &key) {
            Ok(stored) if stored.entries().is_empty() => warp::reply::json(&Value::Null).into_response(),
            Ok(stored) => warp::reply::json(&stored.entries()).into_response(),
            Err(e) => {
                error!("Could not read {} for {}: {}", topic, key, e);
                warp::reply::with_status(
                    warp::reply::json(&Value::Null),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
                .into_response()
            }
        }
    }
}

pub async fn start_web_server(port: u16, archive: Archive, topics: Vec<TopicConfig>) {
    let dashboard = Arc::new(Dashboard { archive, topics });
    let state = warp::any().map(move || dashboard.clone());

    let daily = warp::get()
        .and(warp::path::end())
        .and(warp::query::<PageQuery>())
        .and(state.clone())
        .map(|query: PageQuery, d: Arc<Dashboard>| warp::reply::html(d.daily_page(&query)));

    let weekly = warp::get()
        .and(warp::path("weekly"))
        .and(warp::path::end())
        .and(warp::query::<PageQuery>())
        .and(state.clone())
        .map(|query: PageQuery, d: Arc<Dashboard>| warp::reply::html(d.weekly_page(&query)));

    let api = warp::get()
        .and(warp::path!("api" / "digest" / String / String))
        .and(state)
        .map(|topic: String, key: String, d: Arc<Dashboard>| {
            debug!("API request for {}/{}", topic, key);
            d.digest_json(&topic, &key)
        });

    let routes = daily.or(weekly).or(api);

    info!("Web interface running on http://localhost:{}", port);
    warp::serve(routes).run(([127, 0, 0, 1], port)).await;
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// Only http(s) links are rendered as links.
fn safe_href(url: &str) -> Option<String> {
    let url = url.trim();
    (url.starts_with("https://") || url.starts_with("http://")).then(|| escape_html(url))
}

pub fn render_daily(date: NaiveDate, lang: Lang, sections: &[Section<'_>]) -> String {
    let l = lang.labels();
    let body: String = sections
        .iter()
        .map(|section| render_section(section, lang, false))
        .collect();
    format!(
        "{head}\
        <form class=\"picker\" method=\"get\" action=\"/\"><label>{date_label}: \
        <input type=\"date\" name=\"date\" value=\"{date}\"></label>\
        <input type=\"hidden\" name=\"lang\" value=\"{code}\"><button type=\"submit\">{show}</button></form>\n\
        <div class=\"columns\">\n{body}</div>\n{tail}",
        head = page_start(lang, l.daily),
        date_label = l.date,
        date = date.format("%Y-%m-%d"),
        code = lang.code(),
        show = l.show,
        body = body,
        tail = PAGE_END,
    )
}

pub fn render_weekly(week: TimeKey, this_week: TimeKey, lang: Lang, sections: &[Section<'_>]) -> String {
    let l = lang.labels();

    let mut choices = vec![(this_week, l.this_week)];
    if let Some(last) = this_week.previous() {
        choices.push((last, l.last_week));
    }
    if !choices.iter().any(|(k, _)| *k == week) {
        choices.push((week, ""));
    }
    let options: String = choices
        .into_iter()
        .map(|(key, label)| {
            let selected = if key == week { " selected" } else { "" };
            let suffix = if label.is_empty() { String::new() } else { format!(" ({})", label) };
            format!(r#"<option value="{key}"{selected}>{key}{suffix}</option>"#)
        })
        .collect();
    let body: String = sections
        .iter()
        .map(|section| render_section(section, lang, true))
        .collect();

    format!(
        "{head}\
        <form class=\"picker\" method=\"get\" action=\"/weekly\"><label>{week_label}: \
        <select name=\"week\">{options}</select></label>\
        <input type=\"hidden\" name=\"lang\" value=\"{code}\"><button type=\"submit\">{show}</button></form>\n\
        {body}{tail}",
        head = page_start(lang, l.weekly),
        week_label = l.week,
        options = options,
        code = lang.code(),
        show = l.show,
        body = body,
        tail = PAGE_END,
    )
}

fn render_section(section: &Section<'_>, lang: Lang, show_core_value: bool) -> String {
    let l = lang.labels();
    let name = match lang {
        Lang::Zh => &section.topic.name_zh,
        Lang::En => &section.topic.name_en,
    };
    let content = match &section.stored {
        Stored::Missing => format!("<p class=\"empty missing\">{}</p>\n", l.missing),
        Stored::NothingQualified => format!("<p class=\"empty nothing\">{}</p>\n", l.nothing),
        Stored::Entries(entries) => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| render_entry(i + 1, entry, lang, show_core_value))
            .collect(),
    };
    format!(
        "<section class=\"topic\" id=\"{}\"><h2>{}</h2>\n{}</section>\n",
        escape_html(&section.topic.key),
        escape_html(name),
        content
    )
}

fn render_entry(n: usize, entry: &DigestEntry, lang: Lang, show_core_value: bool) -> String {
    let l = lang.labels();
    let title = if entry.title.is_empty() { &entry.id } else { &entry.title };
    let heading = match safe_href(&entry.url) {
        Some(href) => format!(
            r#"<h3>{}. <a href="{}" target="_blank">{}</a></h3>"#,
            n,
            href,
            escape_html(title)
        ),
        None => format!("<h3>{}. {}</h3>", n, escape_html(title)),
    };

    let (reason, core_value) = match lang {
        Lang::Zh => (
            entry.reason_zh.as_ref().or(entry.reason_en.as_ref()),
            entry.core_value_zh.as_ref().or(entry.core_value_en.as_ref()),
        ),
        Lang::En => (
            entry.reason_en.as_ref().or(entry.reason_zh.as_ref()),
            entry.core_value_en.as_ref().or(entry.core_value_zh.as_ref()),
        ),
    };
    let core_value = core_value
        .filter(|_| show_core_value)
        .map(|core| {
            format!(
                "<p class=\"core-value\"><b>{}:</b> {}</p>\n",
                l.core_value,
                escape_html(core)
            )
        })
        .unwrap_or_default();

    let scorecard = if entry.scores.is_empty() {
        String::new()
    } else {
        let rows: String = SCORE_DIMENSIONS
            .iter()
            .map(|(dim, _)| {
                let score = entry
                    .scores
                    .get(*dim)
                    .map_or_else(|| "N/A".to_string(), |s| s.to_string());
                format!(r#"<li><span class="dim">{}</span> <span class="score">{}</span></li>"#, dim, score)
            })
            .collect();
        format!(
            "<details class=\"scorecard\"><summary>{} <span class=\"score total\">&Sigma; {}</span></summary>\
            <ul>{}</ul></details>\n",
            l.scorecard,
            entry.total_score(),
            rows
        )
    };

    let reason = reason
        .map(|reason| format!("<div class=\"reason\"><b>{}:</b> {}</div>\n", l.reason, escape_html(reason)))
        .unwrap_or_default();
    let pdf = safe_href(&entry.pdf_url)
        .map(|href| format!("<a class=\"pdf\" href=\"{}\" target=\"_blank\">{}</a>\n", href, l.pdf))
        .unwrap_or_default();

    format!(
        "<div class=\"result\">\n{heading}\n\
        <p class=\"info\"><b>{authors_label}:</b> {authors}</p>\n\
        {core_value}{scorecard}{reason}\
        <details><summary>{summary_label}</summary><div class=\"abstract\">{summary}</div></details>\n\
        {pdf}</div>\n",
        heading = heading,
        authors_label = l.authors,
        authors = escape_html(&entry.authors),
        core_value = core_value,
        scorecard = scorecard,
        reason = reason,
        summary_label = l.summary,
        summary = escape_html(&entry.summary),
        pdf = pdf,
    )
}

fn page_start(lang: Lang, heading: &str) -> String {
    let l = lang.labels();
    let (other, other_name) = match lang {
        Lang::Zh => (Lang::En, "English"),
        Lang::En => (Lang::Zh, "简体中文"),
    };
    format!(
        "<!DOCTYPE html>\n\
        <html lang=\"{code}\">\n\
        <head><meta charset=\"utf-8\"><title>{title} - {heading}</title>\n\
        <style>{style}</style></head>\n\
        <body><div class=\"content\">\n\
        <h1>{title}</h1><p class=\"info\">{caption}</p>\n\
        <nav class=\"tabs\"><a class=\"tab\" href=\"/?lang={code}\">{daily}</a>\
        <a class=\"tab\" href=\"/weekly?lang={code}\">{weekly}</a>\
        <a class=\"tab lang\" href=\"?lang={other}\">{other_name}</a></nav>\n\
        <h2 class=\"page\">{heading}</h2>\n",
        code = lang.code(),
        title = l.title,
        heading = heading,
        style = STYLE,
        caption = l.caption,
        daily = l.daily,
        weekly = l.weekly,
        other = other.code(),
        other_name = other_name,
    )
}

const PAGE_END: &str = "</div></body></html>\n";

const STYLE: &str = r#"
        body { font-family: Arial; margin: 20px; background: #f5f5f5; }
        h1 { color: #333; }
        .tabs { margin: 20px 0; border-bottom: 2px solid #ddd; }
        .tab { display: inline-block; padding: 10px 20px; background: #e9ecef; margin-right: 5px; color: #333; text-decoration: none; }
        .tab.lang { float: right; }
        .picker { margin: 10px 0 20px 0; }
        input, select { padding: 8px; margin: 5px 0; }
        button { padding: 8px 16px; background: rgb(100, 149, 237); color: white; border: none; cursor: pointer; margin-left: 5px; }
        button:hover { background: #5a8dd4; }
        .columns { display: grid; grid-template-columns: repeat(auto-fit, minmax(320px, 1fr)); gap: 20px; }
        .topic h2 { border-bottom: 3px solid rgb(100, 149, 237); padding-bottom: 5px; }
        .result { background: white; padding: 15px; margin: 10px 0; border: 1px solid #ddd; }
        .result h3 { margin: 0 0 10px 0; }
        .result a { color: #007bff; text-decoration: none; }
        .result a:hover { text-decoration: underline; }
        .info { color: #666; font-size: 14px; }
        .score { font-weight: bold; color: rgb(0, 150, 255); }
        .scorecard ul { list-style: none; padding: 0; display: grid; grid-template-columns: 1fr 1fr; }
        .reason { margin: 10px 0; padding: 10px; background: #e8f4fd; }
        .core-value { padding: 10px; background: #d4edda; color: #155724; }
        .abstract { margin-top: 10px; padding: 10px; background: #f9f9f9; border-left: 3px solid #007bff; font-size: 14px; }
        .pdf { font-weight: bold; }
        .empty { color: #666; font-style: italic; }
"#;
