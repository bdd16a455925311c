//! Experiences: how discoveries become observations and then a narrative.
//!
//! Each [`ExperienceMode`] maps to a collector/synthesizer pair through
//! [`build_experience`]. Only the dream experience is implemented; the other
//! modes report [`ExperienceError::NotSupported`] up front.

pub mod dream;
pub mod prompt;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::explore::{Discovery, DiscoveryKind};
use crate::llm::{GatewayError, LlmGateway};

/// Errors from building or running an experience.
#[derive(Debug, Error, Diagnostic)]
pub enum ExperienceError {
    #[error("experience mode \"{mode}\" is not implemented")]
    #[diagnostic(
        code(sleepwalker::experience::not_supported),
        help("Use --mode dream.")
    )]
    NotSupported { mode: ExperienceMode },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Synthesis(#[from] GatewayError),
}

pub type ExperienceResult<T> = std::result::Result<T, ExperienceError>;

/// The closed set of experience kinds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceMode {
    #[default]
    Dream,
    Adventure,
    Scrapbook,
}

impl ExperienceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dream => "dream",
            Self::Adventure => "adventure",
            Self::Scrapbook => "scrapbook",
        }
    }
}

impl fmt::Display for ExperienceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovery plus the short note a collector wrote about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub path: PathBuf,
    pub name: String,
    pub kind: DiscoveryKind,
    pub size_bytes: Option<u64>,
    pub preview: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub brief_note: String,
}

impl Observation {
    pub fn from_discovery(discovery: &Discovery, brief_note: String) -> Self {
        Self {
            timestamp: discovery.discovered_at,
            path: discovery.path.clone(),
            name: discovery.name.clone(),
            kind: discovery.kind,
            size_bytes: discovery.size_bytes,
            preview: discovery.preview.clone(),
            modified_at: discovery.modified_at,
            brief_note,
        }
    }
}

/// The synthesized output of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeResult {
    pub kind: ExperienceMode,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub observation_count: usize,
    pub content: String,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub output_format: String,
}

impl NarrativeResult {
    pub const MARKDOWN: &'static str = "markdown";
}

/// Accumulates observations for one cycle.
pub trait Collector: Send {
    fn add_observation(&mut self, discovery: &Discovery);

    fn observations(&self) -> &[Observation];

    /// Drain the collected observations, leaving the collector empty.
    fn take_observations(&mut self) -> Vec<Observation>;
}

/// Turns observations into a narrative.
pub trait Synthesizer: Send {
    fn mode(&self) -> ExperienceMode;

    fn synthesize(&self, observations: &[Observation]) -> ExperienceResult<NarrativeResult>;
}

/// A matched collector/synthesizer pair.
pub struct ExperienceKit {
    pub collector: Box<dyn Collector>,
    pub synthesizer: Box<dyn Synthesizer>,
}

impl fmt::Debug for ExperienceKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperienceKit")
            .field("mode", &self.synthesizer.mode())
            .field("observations", &self.collector.observations().len())
            .finish()
    }
}

/// Build the pair for `mode`. Without a gateway the dream falls back to a
/// locally written placeholder.
pub fn build_experience(
    mode: ExperienceMode,
    gateway: Option<LlmGateway>,
) -> ExperienceResult<ExperienceKit> {
    match mode {
        ExperienceMode::Dream => Ok(ExperienceKit {
            collector: Box::new(dream::DreamCollector::new()),
            synthesizer: Box::new(dream::DreamSynthesizer::new(gateway)),
        }),
        ExperienceMode::Adventure | ExperienceMode::Scrapbook => {
            Err(ExperienceError::NotSupported { mode })
        }
    }
}
