//! Core compiler pipeline for the IDL binding generator.
//!
//! The pipeline is roughly:
//!
//!   source .idl
//!     -> lexer      (tokens)
//!     -> parser     (surface AST)
//!     -> resolve    (symbol registry + canonical IR)
//!     -> codegen_*  (per-target artifact sets)
//!     -> emit       (atomic write to the output directory)
//!
//! Higher-level tools (the CLI in particular) should depend on this
//! crate rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layer: resolution and the canonical IR
// ---------------------------------------------------------------------

pub mod resolve;
pub mod ir;

// ---------------------------------------------------------------------
// Back-end: marshaling rules, generators, orchestration, emission
// ---------------------------------------------------------------------

pub mod marshal;
pub mod codegen_c_api;
pub mod codegen_client;
pub mod codegen_jni;
pub mod codegen_wasm;
pub mod compiler;
pub mod emit;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{ArtifactSet, Options, Target, compile, generate};
pub use emit::emit;
pub use error::Error;
pub use ir::Ir;
