//! Provider-agnostic value types for the ModelPort client library:
//! conversations, tools, schemas, stream chunks, usage accounting, and the
//! shared error taxonomy.

pub mod chunk;
pub mod context;
pub mod error;
pub mod message;
pub mod options;
pub mod response;
pub mod schema;
pub mod tool;
pub mod usage;

// Re-exports for convenience.
pub use chunk::{MetaChunk, StreamChunk, StreamError, ToolCallChunkMeta, ToolCallFragment};
pub use context::{Context, Prompt};
pub use error::{Error, HttpProtocol, Result, SchemaViolation};
pub use message::{ContentPart, Message, Role};
pub use options::{EmbedOptions, GenerateOptions, ResponseFormat, ToolChoice};
pub use response::{EmbedResponse, FinishReason, Response};
pub use schema::{Field, FieldType, Schema};
pub use tool::{Tool, ToolCall, ToolCallback};
pub use usage::{ModelCost, Usage};
