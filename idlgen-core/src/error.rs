use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: u32,
        column: u32,
        message: String,
    },
    #[error("semantic error in '{decl}': {message}")]
    Semantic { decl: String, message: String },
    #[error("{target} generator cannot represent '{decl}': {message}")]
    Generation {
        target: &'static str,
        decl: String,
        message: String,
    },
    #[error("failed to write {path}: {source}")]
    Emission {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn syntax(line: u32, column: u32, message: impl Into<String>) -> Self {
        Error::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn semantic(decl: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Semantic {
            decl: decl.into(),
            message: message.into(),
        }
    }

    pub(crate) fn generation(
        target: &'static str,
        decl: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Generation {
            target,
            decl: decl.into(),
            message: message.into(),
        }
    }
}
