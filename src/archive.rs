//! Per-topic, per-period digest files under the archive root.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::digest::DigestEntry;
use crate::error::ArchiveError;
use crate::window::TimeKey;

/// What a digest file holds, as seen by readers.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    /// The period has not been digested yet.
    Missing,
    /// The period was digested and nothing qualified (the `null` sentinel).
    NothingQualified,
    Entries(Vec<DigestEntry>),
}

impl Stored {
    pub fn entries(&self) -> &[DigestEntry] {
        match self {
            Stored::Entries(entries) => entries,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, topic_key: &str, key: &TimeKey) -> PathBuf {
        self.root.join(topic_key).join(format!("{}.json", key))
    }

    /// Overwrites the file for this topic and period. An empty list is written as `null`.
    pub fn write(
        &self,
        topic_key: &str,
        key: &TimeKey,
        entries: &[DigestEntry],
    ) -> Result<PathBuf, ArchiveError> {
        let path = self.path_for(topic_key, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let body = if entries.is_empty() {
            "null".to_string()
        } else {
            serde_json::to_string_pretty(entries).map_err(|source| ArchiveError::Json {
                path: path.clone(),
                source,
            })?
        };
        fs::write(&path, body).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;

        if entries.is_empty() {
            info!("Marked {} as nothing qualified", path.display());
        } else {
            info!("Wrote {} entries to {}", entries.len(), path.display());
        }
        Ok(path)
    }

    pub fn read(&self, topic_key: &str, key: &TimeKey) -> Result<Stored, ArchiveError> {
        let path = self.path_for(topic_key, key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Stored::Missing),
            Err(source) => return Err(ArchiveError::Io { path, source }),
        };
        let value: Value = serde_json::from_str(&raw).map_err(|source| ArchiveError::Json {
            path: path.clone(),
            source,
        })?;

        let items = match value {
            Value::Array(items) => items,
            // older files stored a single pick as a bare object
            obj @ Value::Object(_) => vec![obj],
            Value::Null => return Ok(Stored::NothingQualified),
            other => {
                debug!("Ignoring unexpected content in {}: {}", path.display(), other);
                return Ok(Stored::NothingQualified);
            }
        };

        let entries: Vec<DigestEntry> = items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if entries.is_empty() {
            Ok(Stored::NothingQualified)
        } else {
            Ok(Stored::Entries(entries))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::tests::paper;
    use crate::digest::Pick;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn day() -> TimeKey {
        TimeKey::Day(NaiveDate::from_ymd_opt(2025, 1, 14).unwrap())
    }

    #[test]
    fn paths_follow_topic_and_key() {
        let archive = Archive::new("archive");
        assert_eq!(
            archive.path_for("phd_methods", &day()),
            PathBuf::from("archive/phd_methods/2025-01-14.json")
        );
        assert_eq!(
            archive.path_for("tutorials", &TimeKey::Week { year: 2025, week: 3 }),
            PathBuf::from("archive/tutorials/2025-W03.json")
        );
    }

    #[test]
    fn empty_entries_write_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path());

        assert_eq!(archive.read("quant_crypto", &day()).unwrap(), Stored::Missing);

        let path = archive.write("quant_crypto", &day(), &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "null");
        assert_eq!(
            archive.read("quant_crypto", &day()).unwrap(),
            Stored::NothingQualified
        );
    }

    #[test]
    fn round_trip_keeps_ids_titles_and_scores() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path().join("nested").join("archive"));
        let entries = vec![
            DigestEntry::merge(
                &paper("2501.00001v1", "Minimax rates"),
                &Pick {
                    id: "2501.00001v1".into(),
                    scores: BTreeMap::from([("Novelty".into(), 5), ("Clarity".into(), 3)]),
                    reason_en: Some("tight bounds".into()),
                    ..Default::default()
                },
            ),
            DigestEntry::merge(
                &paper("2501.00002v2", "Causal forests, revisited"),
                &Pick {
                    id: "2501.00002v2".into(),
                    scores: BTreeMap::from([("Rigor".into(), 4)]),
                    core_value_zh: Some("一句话".into()),
                    ..Default::default()
                },
            ),
        ];

        archive.write("phd_foundations", &day(), &entries).unwrap();
        let stored = archive.read("phd_foundations", &day()).unwrap();
        let back = stored.entries();
        assert_eq!(back.len(), 2);
        for (a, b) in entries.iter().zip(back) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.title, b.title);
            assert_eq!(a.scores, b.scores);
        }
        assert_eq!(back, entries.as_slice());
    }

    #[test]
    fn rewrite_overwrites_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path());
        let entries = vec![DigestEntry::merge(
            &paper("A", "T1"),
            &Pick { id: "A".into(), ..Default::default() },
        )];
        archive.write("t", &day(), &entries).unwrap();
        archive.write("t", &day(), &[]).unwrap();
        assert_eq!(archive.read("t", &day()).unwrap(), Stored::NothingQualified);
    }

    #[test]
    fn reads_legacy_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path());
        let week = TimeKey::Week { year: 2024, week: 45 };
        let path = archive.path_for("tutorials", &week);
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        fs::write(&path, r#"{"id": "x", "title": "Old single pick", "reason_zh": "旧"}"#).unwrap();
        let stored = archive.read("tutorials", &week).unwrap();
        assert_eq!(stored.entries().len(), 1);
        assert_eq!(stored.entries()[0].title, "Old single pick");

        fs::write(&path, r#"[{"id": "y", "title": "Kept"}, "junk", 3]"#).unwrap();
        let stored = archive.read("tutorials", &week).unwrap();
        assert_eq!(stored.entries().len(), 1);
        assert_eq!(stored.entries()[0].id, "y");

        fs::write(&path, "[]").unwrap();
        assert_eq!(archive.read("tutorials", &week).unwrap(), Stored::NothingQualified);

        fs::write(&path, "{broken").unwrap();
        assert!(matches!(
            archive.read("tutorials", &week),
            Err(ArchiveError::Json { .. })
        ));
    }
}
