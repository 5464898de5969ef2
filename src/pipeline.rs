//! Runs each topic through fetch, rank, merge and persist.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{error, info, info_span, warn, Instrument};

use crate::archive::Archive;
use crate::arxiv::ArxivClient;
use crate::config::TopicConfig;
use crate::digest::{merge, PaperRecord};
use crate::error::RankError;
use crate::llm::InferenceBackend;
use crate::ranker::Ranker;
use crate::window::{DateWindow, TimeKey};

/// Where candidate papers come from.
pub trait PaperSource {
    /// Never fails: a broken search yields an empty candidate set.
    async fn candidates(&self, topic: &TopicConfig, window: &DateWindow) -> Vec<PaperRecord>;
}

impl PaperSource for ArxivClient {
    async fn candidates(&self, topic: &TopicConfig, window: &DateWindow) -> Vec<PaperRecord> {
        self.fetch(
            &topic.name_en,
            &topic.categories,
            &topic.keywords,
            window,
            topic.max_fetch,
            topic.filter_mode(),
        )
        .await
    }
}

/// Which branch ranking took for a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankStatus {
    Ranked,
    NothingQualified,
    NoCandidates,
    MissingCredential,
    Unreachable,
    Exhausted,
}

impl fmt::Display for RankStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RankStatus::Ranked => "ranked",
            RankStatus::NothingQualified => "nothing qualified",
            RankStatus::NoCandidates => "no candidates",
            RankStatus::MissingCredential => "missing credential",
            RankStatus::Unreachable => "service unreachable",
            RankStatus::Exhausted => "retries exhausted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct TopicReport {
    pub key: String,
    pub time_key: TimeKey,
    pub candidates: usize,
    pub picks: usize,
    /// Path written, `None` when persisting failed.
    pub persisted: Option<PathBuf>,
    pub outcome: RankStatus,
}

pub struct Pipeline<S, B> {
    source: S,
    ranker: Ranker<B>,
    archive: Archive,
}

impl<S: PaperSource, B: InferenceBackend> Pipeline<S, B> {
    pub fn new(source: S, ranker: Ranker<B>, archive: Archive) -> Self {
        Self {
            source,
            ranker,
            archive,
        }
    }

    pub async fn run_topic(&self, topic: &TopicConfig, reference: NaiveDate) -> TopicReport {
        let span = info_span!("topic", key = %topic.key);
        self.run_topic_inner(topic, reference).instrument(span).await
    }

    async fn run_topic_inner(&self, topic: &TopicConfig, reference: NaiveDate) -> TopicReport {
        let window = DateWindow::compute(reference, topic.cadence.window_mode());
        let time_key = TimeKey::for_cadence(topic.cadence, reference);
        info!("Processing {} for {}", topic.name_en, time_key);

        let candidates = self.source.candidates(topic, &window).await;

        let ranked = self
            .ranker
            .rank(&candidates, &topic.name_en, &topic.preference, topic.max_picks)
            .await;
        let (picks, outcome) = match ranked {
            Ok(picks) if picks.is_empty() => (picks, RankStatus::NothingQualified),
            Ok(picks) => (picks, RankStatus::Ranked),
            Err(RankError::NoCandidates) => {
                info!("No papers found for {}, skipping ranking", topic.name_en);
                (Vec::new(), RankStatus::NoCandidates)
            }
            Err(e @ RankError::MissingCredential(_)) => {
                warn!("{}; skipping ranking for {}", e, topic.name_en);
                (Vec::new(), RankStatus::MissingCredential)
            }
            Err(e @ RankError::Unreachable { .. }) => {
                error!("{}; skipping ranking for {}", e, topic.name_en);
                (Vec::new(), RankStatus::Unreachable)
            }
            Err(e @ RankError::Exhausted { .. }) => {
                error!("{} for {}", e, topic.name_en);
                (Vec::new(), RankStatus::Exhausted)
            }
        };

        let entries = merge(&candidates, &picks);
        if entries.len() < picks.len() {
            info!(
                "{} of {} picks matched a fetched paper",
                entries.len(),
                picks.len()
            );
        }

        let persisted = match self.archive.write(&topic.key, &time_key, &entries) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Could not save digest for {}: {}", topic.key, e);
                None
            }
        };

        TopicReport {
            key: topic.key.clone(),
            time_key,
            candidates: candidates.len(),
            picks: entries.len(),
            persisted,
            outcome,
        }
    }

    /// Runs every topic with at most `jobs` in flight. Reports come back in completion order.
    pub async fn run_all(
        &self,
        topics: &[TopicConfig],
        reference: NaiveDate,
        jobs: usize,
    ) -> Vec<TopicReport> {
        info!(
            "Running {} topics with {} (jobs = {})",
            topics.len(),
            self.ranker.backend_name(),
            jobs.max(1)
        );
        let reports: Vec<TopicReport> = stream::iter(topics)
            .map(|topic| self.run_topic(topic, reference))
            .buffer_unordered(jobs.max(1))
            .collect()
            .await;

        for report in &reports {
            info!(
                "{} [{}]: {} candidates, {} picks, {}{}",
                report.key,
                report.time_key,
                report.candidates,
                report.picks,
                report.outcome,
                if report.persisted.is_some() { "" } else { ", NOT SAVED" }
            );
        }
        let saved = reports.iter().filter(|r| r.persisted.is_some()).count();
        info!("Done: {}/{} topics saved", saved, reports.len());
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Stored;
    use crate::config::KeywordExpr;
    use crate::digest::tests::paper;
    use crate::ranker::tests::MockBackend;
    use crate::retry::RetryPolicy;
    use crate::window::Cadence;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    /// Canned candidates per topic key; records every window it is asked for.
    struct StaticSource {
        papers: HashMap<String, Vec<PaperRecord>>,
        windows: Mutex<Vec<(String, DateWindow)>>,
    }

    impl StaticSource {
        fn new(papers: &[(&str, Vec<PaperRecord>)]) -> Self {
            Self {
                papers: papers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                windows: Mutex::new(Vec::new()),
            }
        }
    }

    impl PaperSource for StaticSource {
        async fn candidates(&self, topic: &TopicConfig, window: &DateWindow) -> Vec<PaperRecord> {
            self.windows
                .lock()
                .unwrap()
                .push((topic.key.clone(), *window));
            self.papers.get(&topic.key).cloned().unwrap_or_default()
        }
    }

    fn topic(key: &str, cadence: Cadence) -> TopicConfig {
        TopicConfig {
            key: key.into(),
            name_zh: key.into(),
            name_en: key.into(),
            categories: vec!["cs.LG".into()],
            keywords: KeywordExpr::Raw("\"deep learning\"".into()),
            preference: "theory".into(),
            max_fetch: 10,
            max_picks: 2,
            cadence,
            filter: None,
        }
    }

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 14).unwrap()
    }

    fn pipeline(
        source: StaticSource,
        backend: MockBackend,
        dir: &tempfile::TempDir,
    ) -> Pipeline<StaticSource, MockBackend> {
        Pipeline::new(
            source,
            Ranker::new(backend, RetryPolicy::immediate(3)),
            Archive::new(dir.path()),
        )
    }

    #[tokio::test]
    async fn picks_are_joined_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::new(&[("t", vec![paper("A", "First"), paper("B", "Second")])]);
        let backend = MockBackend::new(vec![Some(
            r#"[{"id": "B", "scores": {"Novelty": 5}, "reason_en": "good"}, {"id": "Z"}]"#,
        )]);
        let p = pipeline(source, backend, &dir);

        let report = p.run_topic(&topic("t", Cadence::Daily), reference()).await;
        assert_eq!(report.outcome, RankStatus::Ranked);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.picks, 1);
        assert_eq!(report.time_key.to_string(), "2025-01-14");
        assert_eq!(report.persisted, Some(dir.path().join("t/2025-01-14.json")));

        let stored = p.archive.read("t", &report.time_key).unwrap();
        let entries = stored.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "B");
        assert_eq!(entries[0].title, "Second");
        assert_eq!(entries[0].reason_en.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn empty_candidates_write_the_sentinel_without_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(StaticSource::new(&[]), MockBackend::new(vec![Some("[]")]), &dir);

        let report = p.run_topic(&topic("t", Cadence::Daily), reference()).await;
        assert_eq!(report.outcome, RankStatus::NoCandidates);
        assert_eq!(p.ranker_calls(), 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("t/2025-01-14.json")).unwrap(),
            "null"
        );
    }

    #[tokio::test]
    async fn exhausted_retries_still_persist_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::new(&[("t", vec![paper("A", "First")])]);
        let backend = MockBackend::new(vec![Some("nope"), Some("still nope"), None]);
        let p = pipeline(source, backend, &dir);

        let report = p.run_topic(&topic("t", Cadence::Daily), reference()).await;
        assert_eq!(report.outcome, RankStatus::Exhausted);
        assert_eq!(p.ranker_calls(), 3);
        assert_eq!(
            p.archive.read("t", &report.time_key).unwrap(),
            Stored::NothingQualified
        );
    }

    #[tokio::test]
    async fn missing_credential_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::new(&[("t", vec![paper("A", "First")])]);
        let mut backend = MockBackend::new(vec![Some("[{\"id\": \"A\"}]")]);
        backend.credential = false;
        let p = pipeline(source, backend, &dir);

        let report = p.run_topic(&topic("t", Cadence::Daily), reference()).await;
        assert_eq!(report.outcome, RankStatus::MissingCredential);
        assert_eq!(report.picks, 0);
        assert!(report.persisted.is_some());
    }

    #[tokio::test]
    async fn weekly_topics_use_a_trailing_week_and_iso_key() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::new(&[("tutorials", vec![paper("A", "Notes")])]);
        let p = pipeline(source, MockBackend::new(vec![Some("null")]), &dir);

        let report = p
            .run_topic(&topic("tutorials", Cadence::Weekly), reference())
            .await;
        assert_eq!(report.outcome, RankStatus::NothingQualified);
        assert_eq!(report.time_key.to_string(), "2025-W03");

        let windows = p.source.windows.lock().unwrap();
        assert_eq!(windows[0].1.start, NaiveDate::from_ymd_opt(2025, 1, 8).unwrap());
        assert_eq!(windows[0].1.end, reference());
    }

    #[tokio::test]
    async fn write_failure_does_not_stop_other_topics() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the topic directory should go makes that write fail
        std::fs::write(dir.path().join("blocked"), "x").unwrap();
        let source = StaticSource::new(&[
            ("blocked", vec![paper("A", "First")]),
            ("open", vec![paper("B", "Second")]),
        ]);
        let backend = MockBackend::new(vec![Some("null"), Some("null")]);
        let p = pipeline(source, backend, &dir);

        let topics = [topic("blocked", Cadence::Daily), topic("open", Cadence::Daily)];
        let reports = p.run_all(&topics, reference(), 1).await;
        assert_eq!(reports.len(), 2);

        let by_key = |k: &str| reports.iter().find(|r| r.key == k).unwrap();
        assert!(by_key("blocked").persisted.is_none());
        assert!(by_key("open").persisted.is_some());
    }

    #[tokio::test]
    async fn parallel_run_covers_every_topic() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticSource::new(&[]);
        let p = pipeline(source, MockBackend::new(vec![]), &dir);

        let topics: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|k| topic(k, Cadence::Daily))
            .collect();
        let reports = p.run_all(&topics, reference(), 3).await;
        let mut keys: Vec<_> = reports.iter().map(|r| r.key.as_str()).collect();
        keys.sort();
        assert_eq!(keys, ["a", "b", "c", "d"]);
        for k in keys {
            assert!(dir.path().join(k).join("2025-01-14.json").exists());
        }
    }

    impl Pipeline<StaticSource, MockBackend> {
        fn ranker_calls(&self) -> usize {
            self.ranker.backend().calls.load(Ordering::SeqCst)
        }
    }
}
