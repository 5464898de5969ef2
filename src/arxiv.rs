//! Fetches candidate papers from the arXiv Atom API.

use std::pin::pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::KeywordExpr;
use crate::digest::PaperRecord;
use crate::error::FetchError;
use crate::query::build_query;
use crate::window::DateWindow;

pub const ARXIV_ENDPOINT: &str = "https://export.arxiv.org/api/query";

/// How far the server's `submittedDate` clause is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FilterMode {
    /// Accept everything the search returns.
    Server,
    /// Re-check each publish time against the window. With `stop_early`, iteration
    /// ends at the first result older than the window, relying on descending order.
    Client {
        #[serde(default = "stop_early_default")]
        stop_early: bool,
    },
}

fn stop_early_default() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Skip,
    Stop,
}

pub fn verdict(published: DateTime<Utc>, window: &DateWindow, filter: FilterMode) -> Verdict {
    match filter {
        FilterMode::Server => Verdict::Accept,
        FilterMode::Client { .. } if window.contains_instant(published) => Verdict::Accept,
        FilterMode::Client { stop_early: true } if published < window.utc_bounds().0 => Verdict::Stop,
        FilterMode::Client { .. } => Verdict::Skip,
    }
}

/// Keeps the papers of one result page that fall in `window`. The flag is set when
/// a paper older than the window ended the scan.
pub fn confirm_window(
    papers: impl IntoIterator<Item = PaperRecord>,
    window: &DateWindow,
    filter: FilterMode,
) -> (Vec<PaperRecord>, bool) {
    let mut kept = Vec::new();
    for paper in papers {
        match verdict(paper.published, window, filter) {
            Verdict::Accept => kept.push(paper),
            Verdict::Skip => debug!("Skipping {} published {}", paper.id, paper.published),
            Verdict::Stop => {
                debug!("{} predates the window, stopping", paper.id);
                return (kept, true);
            }
        }
    }
    (kept, false)
}

#[derive(Clone)]
pub struct ArxivClient {
    http: Client,
    endpoint: String,
    page_size: usize,
    page_delay: Duration,
}

impl ArxivClient {
    pub fn new(endpoint: &str, page_size: usize, page_delay: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(concat!("arxiv_digest/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            page_size: page_size.max(1),
            page_delay,
        })
    }

    /// Candidate set for one topic. Any failure is logged and yields an empty list.
    pub async fn fetch(
        &self,
        topic_name: &str,
        categories: &[String],
        keywords: &KeywordExpr,
        window: &DateWindow,
        cap: usize,
        filter: FilterMode,
    ) -> Vec<PaperRecord> {
        info!(
            "Fetching papers for {} ({} to {})",
            topic_name, window.start, window.end
        );
        match self.try_fetch(categories, keywords, window, cap, filter).await {
            Ok(papers) => {
                info!("Fetched {} papers for {}", papers.len(), topic_name);
                papers
            }
            Err(e) => {
                error!("Fetching arXiv failed for {}: {}", topic_name, e);
                Vec::new()
            }
        }
    }

    async fn try_fetch(
        &self,
        categories: &[String],
        keywords: &KeywordExpr,
        window: &DateWindow,
        cap: usize,
        filter: FilterMode,
    ) -> Result<Vec<PaperRecord>, FetchError> {
        let query = build_query(categories, keywords, window);
        debug!("search_query = {}", query);

        let mut pages = pin!(self.pages(&query, cap));
        let mut papers = Vec::new();
        while let Some(page) = pages.try_next().await? {
            let (kept, stopped) = confirm_window(page, window, filter);
            papers.extend(kept);
            if stopped {
                break;
            }
        }
        Ok(papers)
    }

    /// Result pages in server order, at most `cap` results in total. Pages are
    /// requested lazily with a pause between them.
    fn pages<'a>(
        &'a self,
        query: &'a str,
        cap: usize,
    ) -> impl Stream<Item = Result<Vec<PaperRecord>, FetchError>> + 'a {
        stream::try_unfold((0usize, false), move |(start, exhausted)| {
            self.next_page(query, cap, start, exhausted)
        })
    }

    async fn next_page(
        &self,
        query: &str,
        cap: usize,
        start: usize,
        exhausted: bool,
    ) -> Result<Option<(Vec<PaperRecord>, (usize, bool))>, FetchError> {
        if exhausted || start >= cap {
            return Ok(None);
        }
        if start > 0 && !self.page_delay.is_zero() {
            sleep(self.page_delay).await;
        }
        let wanted = self.page_size.min(cap - start);
        let page = self.fetch_page(query, start, wanted).await?;
        let got = page.len();
        debug!("Page at offset {} returned {} entries", start, got);
        Ok(Some((page, (start + got, got < wanted))))
    }

    async fn fetch_page(
        &self,
        query: &str,
        start: usize,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>, FetchError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("search_query", query),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .query(&[("start", start), ("max_results", max_results)])
            .header(ACCEPT, "application/atom+xml, application/xml;q=0.9, text/xml;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(body.char_indices().nth(200).map_or(body.len(), |(i, _)| i));
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let text = response.text().await?;
        parse_atom_feed(&text)
    }
}

/// `http://arxiv.org/abs/2501.01234v1` → `2501.01234v1`
pub fn arxiv_id_from_url(url: &str) -> String {
    let url = url.trim();
    match url.split_once("/abs/") {
        Some((_, id)) => id.trim_matches('/').to_string(),
        None => url.rsplit('/').next().unwrap_or(url).to_string(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Default)]
struct RawEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_link: Option<String>,
}

impl RawEntry {
    fn into_record(self) -> Result<PaperRecord, FetchError> {
        if self.id.contains("/api/errors") {
            return Err(FetchError::Xml(format!(
                "arXiv reported an error: {}",
                collapse_whitespace(&self.summary)
            )));
        }
        let published = DateTime::parse_from_rfc3339(self.published.trim())
            .map(|d| d.with_timezone(&Utc))
            .map_err(|_| FetchError::Timestamp(self.published.clone()))?;
        let url = self.id.trim().to_string();
        let pdf_url = self
            .pdf_link
            .unwrap_or_else(|| url.replacen("/abs/", "/pdf/", 1));
        Ok(PaperRecord {
            id: arxiv_id_from_url(&url),
            title: collapse_whitespace(&self.title),
            summary: collapse_whitespace(&self.summary),
            authors: self.authors.join(", "),
            url,
            pdf_url,
            published,
        })
    }
}

#[derive(Clone, Copy)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

fn pdf_link(e: &BytesStart) -> Option<String> {
    let mut href = None;
    let mut is_pdf = false;
    for attr in e.attributes().flatten() {
        let value = attr.unescape_value().map(|v| v.into_owned()).unwrap_or_default();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"title" if value.eq_ignore_ascii_case("pdf") => is_pdf = true,
            b"type" if value.contains("pdf") => is_pdf = true,
            _ => {}
        }
    }
    if is_pdf {
        href
    } else {
        None
    }
}

pub fn parse_atom_feed(xml: &str) -> Result<Vec<PaperRecord>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut out = Vec::new();
    let mut entry: Option<RawEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"entry" => entry = Some(RawEntry::default()),
                name if entry.is_some() => {
                    field = match name {
                        b"id" => Some(Field::Id),
                        b"title" => Some(Field::Title),
                        b"summary" => Some(Field::Summary),
                        b"published" => Some(Field::Published),
                        b"name" => Some(Field::AuthorName),
                        _ => None,
                    };
                    if name == b"name" {
                        if let Some(cur) = entry.as_mut() {
                            cur.authors.push(String::new());
                        }
                    }
                    if name == b"link" {
                        if let (Some(cur), Some(href)) = (entry.as_mut(), pdf_link(&e)) {
                            cur.pdf_link.get_or_insert(href);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let (Some(cur), Some(href)) = (entry.as_mut(), pdf_link(&e)) {
                        cur.pdf_link.get_or_insert(href);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(cur), Some(f)) = (entry.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map_err(|e| FetchError::Xml(e.to_string()))?;
                    push_text(cur, f, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(cur), Some(f)) = (entry.as_mut(), field) {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    push_text(cur, f, &text);
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(done) = entry.take() {
                        out.push(done.into_record()?);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FetchError::Xml(e.to_string())),
            _ => {}
        }
    }
    Ok(out)
}

fn push_text(entry: &mut RawEntry, field: Field, text: &str) {
    let target = match field {
        Field::Id => &mut entry.id,
        Field::Title => &mut entry.title,
        Field::Summary => &mut entry.summary,
        Field::Published => &mut entry.published,
        Field::AuthorName => match entry.authors.last_mut() {
            Some(name) => name,
            None => return,
        },
    };
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}
