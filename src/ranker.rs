//! Asks the inference service to score candidates against a preference profile.

use std::collections::HashSet;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::digest::{PaperRecord, Pick};
use crate::error::RankError;
use crate::llm::InferenceBackend;
use crate::parse::{parse_model_output, ModelAnswer};
use crate::retry::RetryPolicy;

pub const SCORE_DIMENSIONS: [(&str, &str); 4] = [
    ("Novelty", "proposes a new method or perspective"),
    ("Rigor", "soundness of the mathematical and statistical derivations"),
    ("Impact", "practical value, can it be applied and improve results"),
    ("Clarity", "clear logical structure, explains deep ideas simply"),
];

pub fn build_prompt(
    candidates: &[PaperRecord],
    topic_name: &str,
    preference: &str,
    max_picks: usize,
) -> String {
    let dimensions: String = SCORE_DIMENSIONS
        .iter()
        .map(|(name, meaning)| format!("   - {}: {} (1-5)\n", name, meaning))
        .collect();

    let papers: String = candidates
        .iter()
        .enumerate()
        .map(|(i, paper)| {
            format!(
                "--- Paper {} ---\nID: {}\nTitle: {}\nAbstract: {}\n",
                i + 1,
                paper.id,
                paper.title,
                paper.summary
            )
        })
        .collect();

    format!(
        "You are my personal research assistant and editor-in-chief.\n\
        Today's task is the \"{topic}\" area.\n\
        My personal preference / task is:\n\
        \"{preference}\"\n\n\
        Below are {count} papers fetched for this area. Score and select them in bulk:\n\
        1. Score: rate every paper from 1 to 5 on each criterion:\n\
        {dimensions}\
        2. Rank: combine the four scores with my preference into an overall score.\n\
        3. Select: keep the papers with the highest overall score, at most {max}.\n\
        4. Return: if no paper is good enough you MUST return only the word null \
        (an empty JSON array [] is also accepted). Otherwise return a strict JSON list and nothing else.\n\n\
        JSON format:\n\
        [\n\
          {{\n\
            \"id\": \"ID of the selected paper, copied exactly\",\n\
            \"scores\": {{\"Novelty\": 5, \"Rigor\": 4, \"Impact\": 5, \"Clarity\": 4}},\n\
            \"reason_zh\": \"(Chinese) why this paper scores highest and fits my preference\",\n\
            \"reason_en\": \"(English) the same justification\",\n\
            \"core_value_zh\": \"(optional, Chinese) one-sentence core value\",\n\
            \"core_value_en\": \"(optional, English) one-sentence core value\"\n\
          }}\n\
        ]\n\
        At most {max} objects.\n\n\
        --- Paper list start ---\n\
        {papers}\
        --- Paper list end ---\n",
        topic = topic_name,
        preference = preference,
        count = candidates.len(),
        dimensions = dimensions,
        max = max_picks,
        papers = papers,
    )
}

pub struct Ranker<B> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: InferenceBackend> Ranker<B> {
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns 0..=`max_picks` picks. Ids are not checked against the candidates here.
    pub async fn rank(
        &self,
        candidates: &[PaperRecord],
        topic_name: &str,
        preference: &str,
        max_picks: usize,
    ) -> Result<Vec<Pick>, RankError> {
        if candidates.is_empty() {
            return Err(RankError::NoCandidates);
        }
        if !self.backend.has_credential() {
            return Err(RankError::MissingCredential(self.backend.name()));
        }
        self.backend
            .probe()
            .await
            .map_err(|e| RankError::Unreachable {
                backend: self.backend.name(),
                reason: e.to_string(),
            })?;

        info!(
            "Asking {} to pick at most {} of {} papers for {}",
            self.backend.name(),
            max_picks,
            candidates.len(),
            topic_name
        );
        let prompt = build_prompt(candidates, topic_name, preference, max_picks);

        let attempts = self.policy.max_attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=attempts {
            match self.attempt(&prompt, max_picks).await {
                Ok(picks) => {
                    if picks.is_empty() {
                        info!("{} found nothing worth recommending for {}", self.backend.name(), topic_name);
                    } else {
                        info!("{} picked {} papers for {}", self.backend.name(), picks.len(), topic_name);
                    }
                    return Ok(picks);
                }
                Err(e) => {
                    warn!("Ranking attempt {}/{} failed: {}", attempt, attempts, e);
                    last = e;
                }
            }
            if attempt < attempts {
                let delay = self.policy.delay_after(attempt);
                debug!("Retrying in {:?}", delay);
                sleep(delay).await;
            }
        }
        Err(RankError::Exhausted { attempts, last })
    }

    async fn attempt(&self, prompt: &str, max_picks: usize) -> Result<Vec<Pick>, String> {
        let text = self.backend.complete(prompt).await.map_err(|e| e.to_string())?;
        match parse_model_output(&text).map_err(|e| e.to_string())? {
            ModelAnswer::NothingQualifies => Ok(Vec::new()),
            ModelAnswer::Items(items) => {
                let mut seen = HashSet::new();
                let mut picks: Vec<Pick> = items
                    .into_iter()
                    .filter_map(Pick::from_value)
                    .filter(|pick| seen.insert(pick.id.clone()))
                    .collect();
                if picks.len() > max_picks {
                    debug!("Model returned {} picks, keeping {}", picks.len(), max_picks);
                    picks.truncate(max_picks);
                }
                Ok(picks)
            }
        }
    }
}
