//! # terrane_dialects
//!
//! Readers and writers for the four supported dialects.
//!
//! - [`source`] discovers a source tree and infers each file's dialect
//! - [`parse`] turns source text into a per-dialect syntax tree, recovering
//!   from malformed fragments as [`terrane_model::ParseError`]s
//! - [`emit`] renders a canonical graph back into dialect artifacts
//!
//! Normalization (syntax tree to graph) lives in `terrane_normalize`.

pub mod detect;
pub mod emit;
pub mod error;
pub mod metadata;
pub mod parse;
pub mod source;
pub mod values;

pub use detect::detect;
pub use emit::{emit, EmitOptions, EmitOutput, Emitter, EmitterRegistry};
pub use error::{DialectError, DialectResult};
pub use parse::{parse, parse_file, DialectAst, FileAst, ParsedFile};
pub use source::{DiscoveryOptions, SourceFile, SourceTree};
