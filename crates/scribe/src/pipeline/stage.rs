use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StageError;

use super::context::StageContext;
use super::engines::Engines;

/// One of the four ordered processing stages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Transcribe,
    Summarize,
    Export,
}

impl Stage {
    /// Execution order. A job advances through these strictly in sequence.
    pub const ORDER: [Stage; 4] = [
        Stage::Fetch,
        Stage::Transcribe,
        Stage::Summarize,
        Stage::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Transcribe => "transcribe",
            Stage::Summarize => "summarize",
            Stage::Export => "export",
        }
    }

    /// The stage that follows this one, or `None` after export.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Fetch => Some(Stage::Transcribe),
            Stage::Transcribe => Some(Stage::Summarize),
            Stage::Summarize => Some(Stage::Export),
            Stage::Export => None,
        }
    }

    /// Dispatches to the collaborator responsible for this stage.
    ///
    /// `inputs` are the resolved artifacts of every earlier stage, in stage
    /// order. Each engine gets the first file of the stage it consumes.
    /// A fetch or export that yields no files is a failure of that stage.
    pub fn run(
        &self,
        engines: &Engines,
        ctx: &StageContext,
        inputs: &StageInputs,
    ) -> Result<Vec<PathBuf>, StageError> {
        match self {
            Stage::Fetch => non_empty(*self, engines.fetcher.fetch(ctx)?),
            Stage::Transcribe => {
                let media = inputs.first(Stage::Fetch, *self)?;
                engines.transcriber.transcribe(ctx, media).map(|p| vec![p])
            }
            Stage::Summarize => {
                let transcript = inputs.first(Stage::Transcribe, *self)?;
                engines.summarizer.summarize(ctx, transcript).map(|p| vec![p])
            }
            Stage::Export => {
                let transcript = inputs.first(Stage::Transcribe, *self)?;
                let summary = inputs.first(Stage::Summarize, *self)?;
                non_empty(*self, engines.exporter.export(ctx, transcript, summary)?)
            }
        }
    }
}

fn non_empty(stage: Stage, paths: Vec<PathBuf>) -> Result<Vec<PathBuf>, StageError> {
    if paths.is_empty() {
        return Err(StageError::for_stage(stage, "no files produced"));
    }
    Ok(paths)
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(Stage::Fetch),
            "transcribe" => Ok(Stage::Transcribe),
            "summarize" => Ok(Stage::Summarize),
            "export" => Ok(Stage::Export),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// Resolved artifacts of earlier stages, handed to a stage as its input.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    artifacts: Vec<(Stage, Vec<PathBuf>)>,
}

impl StageInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: Stage, paths: Vec<PathBuf>) -> Self {
        self.artifacts.push((stage, paths));
        self
    }

    pub fn get(&self, stage: Stage) -> Option<&[PathBuf]> {
        self.artifacts
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, p)| p.as_slice())
    }

    /// First artifact of `source`, or a `consumer` stage error when none exists.
    fn first(&self, source: Stage, consumer: Stage) -> Result<&PathBuf, StageError> {
        self.get(source)
            .and_then(|paths| paths.first())
            .ok_or_else(|| {
                StageError::for_stage(
                    consumer,
                    format!("no {} artifact recorded", source.as_str()),
                )
            })
    }
}
