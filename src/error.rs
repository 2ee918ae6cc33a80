use std::error;
use std::fmt;

use crate::options::Mode;

/// Numeric error codes, grouped by category:
/// 0-99 illegal operations, 100-199 lookup failures, 200-299 type errors,
/// 300+ internal errors.
pub mod codes {
    pub const CONST_ASSIGNMENT: u32 = 1;
    pub const FINAL_ASSIGNMENT: u32 = 2;
    pub const DATA_WIDTH: u32 = 3;
    pub const DUPLICATE_SYMBOL: u32 = 30;
    pub const DUPLICATE_DEFINITION: u32 = 31;
    pub const ILLEGAL_OPERATION: u32 = 50;
    pub const ILLEGAL_RETURN: u32 = 51;
    pub const ILLEGAL_MOVE_ASSIGNMENT: u32 = 52;
    pub const MOVE_TO_REFERENCE: u32 = 53;
    pub const INVALID_UNARY_OPERATOR: u32 = 55;
    pub const UNARY_TYPE_NOT_SUPPORTED: u32 = 56;
    pub const SELF_CONTAINMENT: u32 = 60;
    pub const CONSTRUCTION_NUMBER_INIT: u32 = 61;
    pub const ALLOC_INIT_REQUIRED: u32 = 62;
    pub const ILLEGAL_THIS_PARAMETER: u32 = 63;
    pub const INCORRECT_THIS_TYPE: u32 = 64;
    pub const UNSAFE_OPERATION: u32 = 70;
    pub const DATA_FREED: u32 = 71;
    pub const INCLUDE_SCOPE: u32 = 80;
    pub const NO_RETURN: u32 = 81;

    pub const SYMBOL_NOT_FOUND: u32 = 100;
    pub const UNDEFINED: u32 = 101;
    pub const UNDEFINED_STRUCT: u32 = 102;
    pub const SIGNATURE: u32 = 120;
    pub const OUT_OF_SCOPE: u32 = 150;
    pub const INVISIBLE_SYMBOL: u32 = 155;
    pub const DECLARATION: u32 = 160;

    pub const INVALID_SYMBOL_TYPE: u32 = 200;
    pub const NON_MODIFIABLE_LVALUE: u32 = 201;
    pub const ILLEGAL_INDIRECTION: u32 = 202;
    pub const UNEXPECTED_FUNCTION_SYMBOL: u32 = 203;
    pub const NOT_SUBSCRIPTABLE: u32 = 204;
    pub const UNICODE: u32 = 205;
    pub const ILLEGAL_ADDRESS_OF_ARGUMENT: u32 = 206;
    pub const TYPE_ERROR: u32 = 210;
    pub const VOID_TYPE: u32 = 211;
    pub const OPERATOR_TYPE: u32 = 212;
    pub const UNDEFINED_OPERATOR: u32 = 213;
    pub const INVALID_CAST: u32 = 214;
    pub const RETURN_MISMATCH: u32 = 215;
    pub const REFERENCED_BEFORE_INITIALIZATION: u32 = 220;
    pub const MAIN_SIGNATURE: u32 = 225;
    pub const QUALITY_CONFLICT: u32 = 230;
    pub const ILLEGAL_QUALITY: u32 = 231;
    pub const WIDTH_MISMATCH: u32 = 240;
    pub const SIGNED_UNSIGNED_MISMATCH: u32 = 241;
    pub const POTENTIAL_DATA_LOSS: u32 = 242;
    pub const NON_CONST_ARRAY_LENGTH: u32 = 250;
    pub const TYPE_VALIDITY_RULE_VIOLATION: u32 = 251;
    pub const UNKNOWN_ATTRIBUTE: u32 = 260;

    pub const INVALID_EXPRESSION_TYPE: u32 = 300;
    pub const UNSUPPORTED_FEATURE: u32 = 301;
}

/// An error raised during compilation. Carries the numeric code and the
/// source line where the offending construct appears; line 0 means the
/// location is not attributable to a single statement.
#[derive(Clone, Debug)]
pub struct CompilerError {
    message: String,
    code: u32,
    line: u32,
}

impl CompilerError {
    pub fn new(message: impl Into<String>, code: u32, line: u32) -> Self {
        Self {
            message: message.into(),
            code,
            line,
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attaches a line number to an error raised somewhere without one
    /// (table lookups, for instance). An existing line is kept.
    pub fn with_line(mut self, line: u32) -> Self {
        if self.line == 0 {
            self.line = line;
        }
        self
    }

    // Constructors for the most common kinds, so call sites stay short.

    pub fn symbol_not_found(name: &str, line: u32) -> Self {
        Self::new(
            format!("Could not find symbol '{name}'"),
            codes::SYMBOL_NOT_FOUND,
            line,
        )
    }

    pub fn duplicate_symbol(name: &str, line: u32) -> Self {
        Self::new(
            format!("Symbol '{name}' already exists in this scope"),
            codes::DUPLICATE_SYMBOL,
            line,
        )
    }

    pub fn duplicate_definition(name: &str, line: u32) -> Self {
        Self::new(
            format!("'{name}' has already been defined"),
            codes::DUPLICATE_DEFINITION,
            line,
        )
    }

    pub fn undefined_struct(name: &str, line: u32) -> Self {
        Self::new(
            format!("Struct '{name}' is not defined"),
            codes::UNDEFINED_STRUCT,
            line,
        )
    }

    pub fn out_of_scope(name: &str, line: u32) -> Self {
        Self::new(
            format!("Symbol '{name}' is not accessible in the current scope"),
            codes::OUT_OF_SCOPE,
            line,
        )
    }

    pub fn type_error(line: u32) -> Self {
        Self::new("Types are incompatible", codes::TYPE_ERROR, line)
    }

    pub fn void_type(line: u32) -> Self {
        Self::new(
            "Void types may not appear in expressions",
            codes::VOID_TYPE,
            line,
        )
    }

    pub fn invalid_cast(line: u32) -> Self {
        Self::new("Invalid typecast", codes::INVALID_CAST, line)
    }

    pub fn quality_conflict(quality: &str, line: u32) -> Self {
        Self::new(
            format!("Quality conflict: '{quality}'"),
            codes::QUALITY_CONFLICT,
            line,
        )
    }

    pub fn non_modifiable_lvalue(line: u32) -> Self {
        Self::new(
            "Expression is not a modifiable-lvalue",
            codes::NON_MODIFIABLE_LVALUE,
            line,
        )
    }

    pub fn illegal_indirection(line: u32) -> Self {
        Self::new(
            "Cannot dereference a non-pointer type",
            codes::ILLEGAL_INDIRECTION,
            line,
        )
    }

    pub fn not_subscriptable(line: u32) -> Self {
        Self::new(
            "Type does not support subscripting",
            codes::NOT_SUBSCRIPTABLE,
            line,
        )
    }

    pub fn referenced_before_initialization(name: &str, line: u32) -> Self {
        Self::new(
            format!("Symbol '{name}' referenced before initialization"),
            codes::REFERENCED_BEFORE_INITIALIZATION,
            line,
        )
    }

    pub fn unexpected_function_symbol(line: u32) -> Self {
        Self::new(
            "Expected a variable, found a function symbol",
            codes::UNEXPECTED_FUNCTION_SYMBOL,
            line,
        )
    }

    pub fn non_const_array_length(line: u32) -> Self {
        Self::new(
            "The length of a non-dynamic array must be known at compile time",
            codes::NON_CONST_ARRAY_LENGTH,
            line,
        )
    }

    pub fn invalid_expression_type(line: u32) -> Self {
        Self::new(
            "Invalid expression type reached the evaluator",
            codes::INVALID_EXPRESSION_TYPE,
            line,
        )
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error E{:03} (line {}): {}",
            self.code, self.line, self.message
        )
    }
}

impl error::Error for CompilerError {}

/// Print a compiler warning. Warnings never interrupt compilation.
pub fn compiler_warning(message: &str, code: u32, line: u32) {
    tracing::warn!(code, line, "{message}");
}

/// Print a compiler note.
pub fn compiler_note(message: &str, line: u32) {
    tracing::info!(line, "{message}");
}

/// Issue a warning, or raise an error if compiling in strict mode. Used for
/// the width/sign/narrowing diagnostics that strict mode promotes.
pub fn warn_or_error(mode: Mode, message: &str, code: u32, line: u32) -> Result<(), CompilerError> {
    if mode.is_strict() {
        Err(CompilerError::new(message, code, line))
    } else {
        compiler_warning(message, code, line);
        Ok(())
    }
}
