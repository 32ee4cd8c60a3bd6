pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod relationship;
pub mod source;

pub use config::{AiConfig, ConfigError, FallbackConfig, PipelineConfig, SystemUserConfig};
pub use error::{Error, Result};
pub use graph::{
    DateRecord, DocumentRecord, EntityRecord, EventRecord, GraphNodes, GraphOutput, GraphStats,
    LocationRecord, NodeKind, UserRecord,
};
pub use ingest::{
    BatchIngestResult, IngestError, IngestOutput, IngestPipeline, IngestReport, IngestResult,
};
pub use relationship::{RelationType, Relationship};
pub use source::Source;
