use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::ai::AiExtractor;
use super::assembler::{AssemblyError, GraphAssembler};
use super::extractor::{
    AiUnavailable, CandidateEvent, ExtractionError, ExtractionStrategy, Extractor,
};
use super::fallback::PatternExtractor;
use super::ids::IdAssigner;
use super::normalizer::Normalizer;
use super::parser::{
    CompositeParser, DocumentFormat, InputError, InputResult, ParsedDocument, Parser,
};
use super::passage;
use crate::config::PipelineConfig;
use crate::graph::{DocumentRecord, GraphOutput, GraphStats, UserRecord};
use crate::source::Source;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Input error for {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: InputError,
    },
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },
    #[error("Ingest task for {0} did not complete")]
    TaskFailed(String),
}

impl IngestError {
    /// True for errors caused by the document itself rather than a defect.
    #[must_use]
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input { .. })
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    TextExtracted,
    Extracting(ExtractionStrategy),
    Normalizing,
    Assembling,
    Done,
    Failed(String),
}

impl PipelineState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// AI extraction may hand over to the fallback, never the reverse.
    /// Any live state may fail.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        use ExtractionStrategy::{Ai, Fallback};

        match (self, next) {
            (Self::Done | Self::Failed(_), _) => false,
            (_, Self::Failed(_))
            | (Self::Init, Self::TextExtracted)
            | (Self::TextExtracted, Self::Extracting(_))
            | (Self::Extracting(Ai), Self::Extracting(Fallback))
            | (Self::Extracting(_), Self::Normalizing)
            | (Self::Normalizing, Self::Assembling)
            | (Self::Assembling, Self::Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::TextExtracted => f.write_str("text_extracted"),
            Self::Extracting(strategy) => write!(f, "extracting({strategy})"),
            Self::Normalizing => f.write_str("normalizing"),
            Self::Assembling => f.write_str("assembling"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

/// Everything that belongs to a single document run.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub ids: IdAssigner,
    history: Vec<PipelineState>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            ids: IdAssigner::new(),
            history: vec![PipelineState::Init],
        }
    }

    #[must_use]
    pub fn state(&self) -> &PipelineState {
        self.history.last().unwrap_or(&PipelineState::Init)
    }

    #[must_use]
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn transition(&mut self, next: PipelineState) -> IngestResult<()> {
        let current = self.state();
        if !current.can_transition_to(&next) {
            return Err(IngestError::InvalidTransition {
                from: current.clone(),
                to: next,
            });
        }
        self.history.push(next);
        Ok(())
    }

    /// Records a failure unless the run already finished.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.state().is_terminal() {
            self.history.push(PipelineState::Failed(reason.into()));
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub strategy: ExtractionStrategy,
    /// Why the AI extractor was bypassed, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<AiUnavailable>,
    pub states: Vec<PipelineState>,
    pub stats: GraphStats,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutput {
    pub graph: GraphOutput,
    pub report: IngestReport,
}

struct Extracted {
    candidates: Vec<CandidateEvent>,
    strategy: ExtractionStrategy,
    fallback_reason: Option<AiUnavailable>,
}

pub struct IngestPipeline {
    parser: Box<dyn Parser>,
    primary: Option<Box<dyn Extractor>>,
    fallback: Box<dyn Extractor>,
    normalizer: Normalizer,
    assembler: GraphAssembler,
    config: PipelineConfig,
}

impl IngestPipeline {
    /// Pattern extraction only, default limits.
    #[must_use]
    pub fn new() -> Self {
        let config = PipelineConfig::fallback_only();
        Self {
            parser: Box::new(CompositeParser::default()),
            primary: None,
            fallback: Box::new(PatternExtractor::new(config.fallback.clone())),
            normalizer: Normalizer::new(),
            assembler: GraphAssembler::new(),
            config,
        }
    }

    /// Wires the AI extractor (when enabled) in front of the pattern fallback.
    pub fn from_config(config: PipelineConfig) -> crate::Result<Self> {
        config.validate()?;

        let primary: Option<Box<dyn Extractor>> = if config.ai.enabled {
            let extractor = AiExtractor::from_config(&config.ai)?;
            if !extractor.has_client() {
                warn!("AI extraction enabled without an API key; using pattern extraction");
            }
            Some(Box::new(extractor))
        } else {
            None
        };

        Ok(Self {
            parser: Box::new(CompositeParser::default()),
            primary,
            fallback: Box::new(PatternExtractor::new(config.fallback.clone())),
            normalizer: Normalizer::new(),
            assembler: GraphAssembler::new(),
            config,
        })
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn with_primary(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.primary = Some(extractor);
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn ingest_text(&self, text: &str, filename: &str) -> IngestResult<IngestOutput> {
        let source =
            Source::new(filename.to_string(), DocumentFormat::PlainText).with_content(text);
        let document = ParsedDocument::new(DocumentFormat::PlainText, text.to_string());

        self.run(source, async move { Ok(document) }).await
    }

    pub async fn ingest_bytes(
        &self,
        data: &[u8],
        format: DocumentFormat,
        filename: &str,
    ) -> IngestResult<IngestOutput> {
        let source = Source::new(filename.to_string(), format);

        self.run(source, self.parser.parse_bytes(data, format))
            .await
    }

    pub async fn ingest_file(&self, path: &Path) -> IngestResult<IngestOutput> {
        let format = DocumentFormat::from_path(path).map_err(|source| IngestError::Input {
            path: path.to_string_lossy().into_owned(),
            source,
        })?;
        let source = Source::file(path, format);

        self.run(source, self.parser.parse_file(path)).await
    }

    /// Processes `paths` concurrently. Results keep input order and one
    /// document's failure never affects another.
    pub async fn ingest_files(self: Arc<Self>, paths: Vec<PathBuf>) -> BatchIngestResult {
        let mut set = JoinSet::new();
        for (index, path) in paths.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self);
            set.spawn(async move {
                let result = pipeline.ingest_file(&path).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<IngestResult<IngestOutput>>> =
            paths.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "Ingest task aborted"),
            }
        }

        let mut batch = BatchIngestResult::new();
        for (path, slot) in paths.into_iter().zip(slots) {
            let path = path.to_string_lossy().into_owned();
            match slot {
                Some(Ok(output)) => batch.add_success(output),
                Some(Err(e)) => batch.add_failure(path, e),
                None => {
                    let error = IngestError::TaskFailed(path.clone());
                    batch.add_failure(path, error);
                }
            }
        }

        info!(
            succeeded = batch.success_count(),
            failed = batch.failure_count(),
            "Batch ingest complete"
        );
        batch
    }

    async fn run<F>(&self, source: Source, decode: F) -> IngestResult<IngestOutput>
    where
        F: Future<Output = InputResult<ParsedDocument>> + Send,
    {
        let mut ctx = RunContext::new();
        let span = info_span!("ingest", run_id = %ctx.run_id, filename = %source.filename);

        let result = self
            .process(&mut ctx, source, decode)
            .instrument(span.clone())
            .await;
        if let Err(e) = &result {
            ctx.fail(e.to_string());
            span.in_scope(|| warn!(error = %e, states = ?ctx.history(), "Document failed"));
        }
        result
    }

    async fn process<F>(
        &self,
        ctx: &mut RunContext,
        mut source: Source,
        decode: F,
    ) -> IngestResult<IngestOutput>
    where
        F: Future<Output = InputResult<ParsedDocument>> + Send,
    {
        let start = Instant::now();

        let document = decode
            .await
            .and_then(|document| {
                let passages =
                    passage::segment(&document.full_text, self.config.max_passage_chars)?;
                Ok(document.with_passages(passages))
            })
            .map_err(|e| IngestError::Input {
                path: source.display_path().to_string(),
                source: e,
            })?;
        if source.content_hash.is_none() {
            source = source.with_content(&document.full_text);
        }
        ctx.transition(PipelineState::TextExtracted)?;
        info!(
            format = %document.format,
            passages = document.passages.len(),
            bytes = document.full_text.len(),
            "Text extracted"
        );

        let extracted = self.extract(ctx, &document).await?;
        info!(
            strategy = %extracted.strategy,
            candidates = extracted.candidates.len(),
            "Events extracted"
        );

        ctx.transition(PipelineState::Normalizing)?;
        let normalization = self
            .normalizer
            .normalize(extracted.candidates, &mut ctx.ids);
        debug!(
            events = normalization.events.len(),
            dated = normalization.dated_event_count(),
            "Candidates normalized"
        );

        ctx.transition(PipelineState::Assembling)?;
        let document_record = DocumentRecord {
            id: IdAssigner::document_id(&source.filename),
            filename: source.filename.clone(),
        };
        let users = self
            .config
            .system_user
            .iter()
            .map(|user| {
                UserRecord::placeholder(
                    IdAssigner::user_id(&user.email),
                    user.email.clone(),
                    user.name.clone(),
                )
            })
            .collect();
        let graph = self
            .assembler
            .assemble(document_record, users, normalization, &mut ctx.ids)?;

        ctx.transition(PipelineState::Done)?;
        let stats = graph.stats();
        info!(
            events = stats.events,
            dates = stats.dates,
            locations = stats.locations,
            entities = stats.entities,
            relationships = stats.total_relationships(),
            "Graph assembled"
        );

        Ok(IngestOutput {
            report: IngestReport {
                run_id: ctx.run_id,
                filename: source.filename,
                content_hash: source.content_hash,
                strategy: extracted.strategy,
                fallback_reason: extracted.fallback_reason,
                states: ctx.history().to_vec(),
                stats,
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
            graph,
        })
    }

    /// Runs the primary extractor if there is one, handing over to the
    /// fallback only when it reports itself unavailable.
    async fn extract(
        &self,
        ctx: &mut RunContext,
        document: &ParsedDocument,
    ) -> IngestResult<Extracted> {
        let mut fallback_reason = None;

        if let Some(primary) = &self.primary {
            ctx.transition(PipelineState::Extracting(primary.strategy()))?;
            match primary.extract(document).await {
                Ok(candidates) => {
                    return Ok(Extracted {
                        candidates,
                        strategy: primary.strategy(),
                        fallback_reason: None,
                    })
                }
                Err(ExtractionError::AiUnavailable(reason)) => {
                    warn!(
                        reason = %reason,
                        "AI extraction unavailable, falling back to pattern extraction"
                    );
                    fallback_reason = Some(reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        ctx.transition(PipelineState::Extracting(self.fallback.strategy()))?;
        let candidates = self.fallback.extract(document).await?;

        Ok(Extracted {
            candidates,
            strategy: self.fallback.strategy(),
            fallback_reason,
        })
    }
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BatchIngestResult {
    pub successful: Vec<IngestOutput>,
    pub failed: Vec<(String, IngestError)>,
}

impl BatchIngestResult {
    #[must_use]
    pub fn new() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn add_success(&mut self, output: IngestOutput) {
        self.successful.push(output);
    }

    fn add_failure(&mut self, path: String, error: IngestError) {
        self.failed.push((path, error));
    }

    pub fn success_count(&self) -> usize {
        self.successful.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn total_events(&self) -> usize {
        self.successful.iter().map(|o| o.report.stats.events).sum()
    }
}

impl Default for BatchIngestResult {
    fn default() -> Self {
        Self::new()
    }
}
