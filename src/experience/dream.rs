//! The dream experience.

use std::collections::BTreeMap;

use chrono::{Local, Utc};

use super::{
    Collector, ExperienceMode, ExperienceResult, NarrativeResult, Observation, Synthesizer,
};
use crate::explore::Discovery;
use crate::llm::LlmGateway;

/// Content returned when a session found nothing.
pub const EMPTY_DREAM: &str = "# Empty Dream\n\nI wandered but found only silence...";

/// Collects observations with a one-line factual note each.
#[derive(Debug, Default)]
pub struct DreamCollector {
    observations: Vec<Observation>,
}

impl DreamCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The factual note recorded for a discovery.
pub fn brief_note(discovery: &Discovery) -> String {
    if discovery.is_file() {
        if discovery.preview.is_some() {
            format!("File '{}' with personal content", discovery.name)
        } else {
            format!(
                "File '{}' ({} bytes)",
                discovery.name,
                discovery.size_bytes.unwrap_or(0)
            )
        }
    } else {
        format!("Directory '{}' with various contents", discovery.name)
    }
}

impl Collector for DreamCollector {
    fn add_observation(&mut self, discovery: &Discovery) {
        let note = brief_note(discovery);
        tracing::debug!(note = %note, "dreaming of");
        self.observations
            .push(Observation::from_discovery(discovery, note));
    }

    fn observations(&self) -> &[Observation] {
        &self.observations
    }

    fn take_observations(&mut self) -> Vec<Observation> {
        std::mem::take(&mut self.observations)
    }
}

/// Writes the dream, through the gateway when one is configured.
#[derive(Debug)]
pub struct DreamSynthesizer {
    gateway: Option<LlmGateway>,
}

impl DreamSynthesizer {
    pub fn new(gateway: Option<LlmGateway>) -> Self {
        Self { gateway }
    }

    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }
}

impl Synthesizer for DreamSynthesizer {
    fn mode(&self) -> ExperienceMode {
        ExperienceMode::Dream
    }

    fn synthesize(&self, observations: &[Observation]) -> ExperienceResult<NarrativeResult> {
        if observations.is_empty() {
            return Ok(empty_dream());
        }
        match &self.gateway {
            Some(gateway) => Ok(gateway.generate_narrative(observations)?),
            None => Ok(placeholder_dream(observations)),
        }
    }
}

fn empty_dream() -> NarrativeResult {
    let now = Utc::now();
    let mut metadata = BTreeMap::new();
    metadata.insert("mood".to_string(), serde_json::json!("mysterious"));
    NarrativeResult {
        kind: ExperienceMode::Dream,
        session_start: now,
        session_end: now,
        observation_count: 0,
        content: EMPTY_DREAM.to_string(),
        metadata,
        output_format: NarrativeResult::MARKDOWN.to_string(),
    }
}

/// A locally written dream for sessions without model access.
///
/// `observations` must not be empty.
fn placeholder_dream(observations: &[Observation]) -> NarrativeResult {
    let now = Utc::now();
    let start = observations.first().map_or(now, |o| o.timestamp);
    let end = observations.last().map_or(now, |o| o.timestamp);
    let key_discoveries: Vec<&str> = observations
        .iter()
        .take(3)
        .map(|o| o.brief_note.as_str())
        .collect();

    let mut lines = vec![
        "# Digital Dream".to_string(),
        String::new(),
        format!(
            "*Session: {} - {}*",
            start.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            end.with_timezone(&Local).format("%H:%M")
        ),
        String::new(),
        "## The Dream".to_string(),
        String::new(),
        "I wandered through digital corridors of forgotten intentions...".to_string(),
        String::new(),
    ];
    lines.extend(key_discoveries.iter().map(|note| format!("- {note}")));
    lines.extend([
        String::new(),
        "The dream fades like morning mist, leaving only impressions of a digital life lived in files and folders."
            .to_string(),
        String::new(),
        format!(
            "*{} observations collected during this session*",
            observations.len()
        ),
    ]);

    let mut metadata = BTreeMap::new();
    metadata.insert("model".to_string(), serde_json::json!("placeholder"));
    metadata.insert("mood".to_string(), serde_json::json!("contemplative"));
    metadata.insert(
        "key_discoveries".to_string(),
        serde_json::json!(key_discoveries),
    );
    metadata.insert(
        "observation_count".to_string(),
        serde_json::json!(observations.len()),
    );

    NarrativeResult {
        kind: ExperienceMode::Dream,
        session_start: start,
        session_end: end,
        observation_count: observations.len(),
        content: lines.join("\n"),
        metadata,
        output_format: NarrativeResult::MARKDOWN.to_string(),
    }
}
