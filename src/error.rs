//! Error types for each pipeline stage.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read topics file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid topics file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid topic '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error("Duplicate topic key: {0}")]
    Duplicate(String),

    #[error("Unknown topic key: {0}")]
    Unknown(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("arXiv API error: HTTP {status} body: {body}")]
    Status { status: u16, body: String },

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Bad timestamp '{0}' in feed entry")]
    Timestamp(String),
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} returned status {status}: {body}")]
    Status {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} returned no text")]
    EmptyResponse(&'static str),

    #[error("Ollama error: {0}")]
    Ollama(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unparseable model output: {preview}")]
    Unparseable { preview: String },

    #[error("model output is a JSON {0}, expected a list")]
    NotAList(&'static str),
}

#[derive(Error, Debug)]
pub enum RankError {
    #[error("no candidates to rank")]
    NoCandidates,

    #[error("no API credential configured for {0}")]
    MissingCredential(&'static str),

    #[error("{backend} is unreachable: {reason}")]
    Unreachable {
        backend: &'static str,
        reason: String,
    },

    #[error("ranking failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
