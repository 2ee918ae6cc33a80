//! The interface to the SIN front end. The lexer and parser ship separately;
//! the compiler consumes their output through these types: a token stream of
//! (kind, value, line) triples, and the AST defined in [`crate::ast`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::Statement;
use crate::error::{CompilerError, codes};

/// Token kinds the lexer produces.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    CharLiteral,
    BoolLiteral,
    Operator,
    Punctuation,
}

/// One lexed token.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: u32,
}

/// Produces the AST for a source file. The driver uses one of these for the
/// main translation unit and for every included file.
pub trait AstSource {
    fn create_ast(&mut self, path: &Path) -> Result<Vec<Statement>, CompilerError>;
}

/// The placeholder source used when no front end is linked into the build;
/// every parse request fails. The compiler library is driven through real
/// `AstSource` implementations.
pub struct NoFrontEnd;

impl AstSource for NoFrontEnd {
    fn create_ast(&mut self, path: &Path) -> Result<Vec<Statement>, CompilerError> {
        Err(CompilerError::new(
            format!(
                "No SIN front end is linked into this build; cannot parse \"{}\"",
                path.display()
            ),
            codes::UNSUPPORTED_FEATURE,
            0,
        ))
    }
}

/// An in-memory source backed by a path-to-AST map. Used by tests and by
/// embedders that parse ahead of time.
#[derive(Default)]
pub struct StaticSource {
    files: HashMap<PathBuf, Vec<Statement>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, ast: Vec<Statement>) {
        self.files.insert(path.into(), ast);
    }
}

impl AstSource for StaticSource {
    fn create_ast(&mut self, path: &Path) -> Result<Vec<Statement>, CompilerError> {
        self.files.get(path).cloned().ok_or_else(|| {
            CompilerError::new(
                format!("Could not open file \"{}\"", path.display()),
                codes::UNDEFINED,
                0,
            )
        })
    }
}
