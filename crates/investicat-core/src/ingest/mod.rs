mod ai;
mod assembler;
mod extractor;
mod fallback;
mod ids;
mod normalizer;
mod parser;
mod passage;
mod pipeline;

pub use ai::{
    build_prompt, parse_response, strip_code_fences, AiExtractor, CompletionClient, CompletionError,
    OpenAiClient,
};
pub use assembler::{AssemblyError, AssemblyResult, GraphAssembler};
pub use extractor::{
    AiUnavailable, CandidateEvent, ExtractionError, ExtractionResult, ExtractionStrategy, Extractor,
    Provenance,
};
pub use fallback::PatternExtractor;
pub use ids::{content_hash, IdAssigner};
pub use normalizer::{
    clean_name, parse_date, split_participants, DedupRegistry, NormalizationOutput, NormalizedEvent,
    Normalizer,
};
pub use parser::{
    CompositeParser, DocumentFormat, InputError, InputResult, ParsedDocument, Parser,
    PlainTextParser,
};
pub use passage::{segment, Passage};
pub use pipeline::{
    BatchIngestResult, IngestError, IngestOutput, IngestPipeline, IngestReport, IngestResult,
    PipelineState, RunContext,
};
