//! The abstract syntax tree consumed by the compiler. The front end produces
//! these nodes; no functionality lives here beyond constructors and a few
//! structural queries.

use crate::types::DataType;

/// Expression operators, unary and binary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    Plus,
    Minus,
    Mult,
    Div,
    Modulo,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    /// Logical and (keyword `and`)
    And,
    Not,
    Or,
    Xor,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    UnaryPlus,
    UnaryMinus,
    Dot,
    Address,
    Dereference,
    Typecast,
    AttributeSelection,
}

impl Operator {
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            Operator::BitAnd | Operator::BitOr | Operator::BitXor | Operator::BitNot
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Equal
                | Operator::NotEqual
                | Operator::Greater
                | Operator::Less
                | Operator::GreaterOrEqual
                | Operator::LessOrEqual
        )
    }
}

/// The attributes that may be selected with `:`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Attribute {
    Length,
    Size,
    Variability,
}

/// An expression node: the variant payload plus the source line and whether
/// the front end marked it compile-time evaluable.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub line: u32,
    pub marked_const: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// A literal value, stored as written in the source.
    Literal { data_type: DataType, value: String },
    Identifier { name: String },
    /// Initializer lists; `{1, 2, 3}` is an array literal, `(1, true)` a
    /// tuple literal.
    List {
        members: Vec<Expression>,
        is_tuple: bool,
    },
    Indexed {
        to_index: Box<Expression>,
        index: Box<Expression>,
    },
    AttributeSelection {
        selected: Box<Expression>,
        attribute: Attribute,
    },
    Binary {
        left: Box<Expression>,
        right: Box<Expression>,
        op: Operator,
    },
    Unary {
        operand: Box<Expression>,
        op: Operator,
    },
    Cast {
        operand: Box<Expression>,
        new_type: DataType,
    },
    /// A block of statements used as an expression body (function bodies).
    Procedure { statements: Vec<Statement> },
    /// `@name(args...)` in value position.
    Call {
        name: String,
        args: Vec<Expression>,
    },
    /// A type keyword in expression position (casts, attribute selection on
    /// a type name).
    Keyword {
        keyword: String,
        data_type: DataType,
    },
}

impl Expression {
    pub fn new(kind: ExprKind, line: u32) -> Self {
        Self {
            kind,
            line,
            marked_const: false,
        }
    }

    pub fn constant(mut self) -> Self {
        self.marked_const = true;
        self
    }

    pub fn literal(data_type: DataType, value: impl Into<String>, line: u32) -> Self {
        Self::new(
            ExprKind::Literal {
                data_type,
                value: value.into(),
            },
            line,
        )
    }

    pub fn identifier(name: impl Into<String>, line: u32) -> Self {
        Self::new(ExprKind::Identifier { name: name.into() }, line)
    }

    pub fn list(members: Vec<Expression>, is_tuple: bool, line: u32) -> Self {
        Self::new(ExprKind::List { members, is_tuple }, line)
    }

    pub fn indexed(to_index: Expression, index: Expression, line: u32) -> Self {
        Self::new(
            ExprKind::Indexed {
                to_index: Box::new(to_index),
                index: Box::new(index),
            },
            line,
        )
    }

    pub fn attribute(selected: Expression, attribute: Attribute, line: u32) -> Self {
        Self::new(
            ExprKind::AttributeSelection {
                selected: Box::new(selected),
                attribute,
            },
            line,
        )
    }

    pub fn binary(left: Expression, right: Expression, op: Operator, line: u32) -> Self {
        Self::new(
            ExprKind::Binary {
                left: Box::new(left),
                right: Box::new(right),
                op,
            },
            line,
        )
    }

    pub fn unary(operand: Expression, op: Operator, line: u32) -> Self {
        Self::new(
            ExprKind::Unary {
                operand: Box::new(operand),
                op,
            },
            line,
        )
    }

    pub fn cast(operand: Expression, new_type: DataType, line: u32) -> Self {
        Self::new(
            ExprKind::Cast {
                operand: Box::new(operand),
                new_type,
            },
            line,
        )
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>, line: u32) -> Self {
        Self::new(
            ExprKind::Call {
                name: name.into(),
                args,
            },
            line,
        )
    }

    pub fn keyword(keyword: impl Into<String>, data_type: DataType, line: u32) -> Self {
        Self::new(
            ExprKind::Keyword {
                keyword: keyword.into(),
                data_type,
            },
            line,
        )
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Literal { .. })
    }
}

/// A formal parameter in a function definition or declaration. A default
/// value makes the parameter optional at the call site.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub data_type: DataType,
    pub default_value: Option<Expression>,
    pub line: u32,
}

impl Parameter {
    pub fn new(name: impl Into<String>, data_type: DataType, line: u32) -> Self {
        Self {
            name: name.into(),
            data_type,
            default_value: None,
            line,
        }
    }

    pub fn with_default(mut self, default_value: Expression) -> Self {
        self.default_value = Some(default_value);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeclarationKind {
    Variable,
    Function,
    Struct,
}

/// A `decl` statement: promises the existence of data or a function defined
/// elsewhere.
#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub data_type: DataType,
    pub kind: DeclarationKind,
    pub formal_parameters: Vec<Parameter>,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Allocation {
    pub name: String,
    pub data_type: DataType,
    pub initial_value: Option<Expression>,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub lvalue: Expression,
    pub rvalue: Expression,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub return_type: DataType,
    pub formal_parameters: Vec<Parameter>,
    pub procedure: Vec<Statement>,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberInitializer {
    pub member: String,
    pub value: Expression,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Include {
        filename: String,
        line: u32,
    },
    Declaration(Declaration),
    Allocation(Allocation),
    Assignment(Assignment),
    /// `move a -> b`
    Movement(Assignment),
    /// `construct x { member: value, ... }`
    Construction {
        to_construct: Expression,
        initializers: Vec<MemberInitializer>,
        has_default: bool,
        line: u32,
    },
    Return {
        value: Expression,
        line: u32,
    },
    IfThenElse {
        condition: Expression,
        if_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
        line: u32,
    },
    WhileLoop {
        condition: Expression,
        body: Box<Statement>,
        line: u32,
    },
    FunctionDefinition(FunctionDefinition),
    StructDefinition {
        name: String,
        procedure: Vec<Statement>,
        line: u32,
    },
    Call {
        name: String,
        args: Vec<Expression>,
        line: u32,
    },
    InlineAssembly {
        code: String,
        line: u32,
    },
    Free {
        target: Expression,
        line: u32,
    },
    ScopedBlock {
        statements: Vec<Statement>,
        line: u32,
    },
}

impl Statement {
    pub fn line(&self) -> u32 {
        match self {
            Statement::Include { line, .. }
            | Statement::Construction { line, .. }
            | Statement::Return { line, .. }
            | Statement::IfThenElse { line, .. }
            | Statement::WhileLoop { line, .. }
            | Statement::StructDefinition { line, .. }
            | Statement::Call { line, .. }
            | Statement::InlineAssembly { line, .. }
            | Statement::Free { line, .. }
            | Statement::ScopedBlock { line, .. } => *line,
            Statement::Declaration(d) => d.line,
            Statement::Allocation(a) => a.line,
            Statement::Assignment(a) | Statement::Movement(a) => a.line,
            Statement::FunctionDefinition(f) => f.line,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Statement::Return { .. })
    }
}

/// Whether a statement block returns a value on every control path. An
/// if/else only counts when both branches return.
pub fn block_returns(statements: &[Statement]) -> bool {
    statements.iter().any(statement_returns)
}

fn statement_returns(statement: &Statement) -> bool {
    match statement {
        Statement::Return { .. } => true,
        Statement::ScopedBlock { statements, .. } => block_returns(statements),
        Statement::IfThenElse {
            if_branch,
            else_branch,
            ..
        } => {
            statement_returns(if_branch)
                && else_branch.as_deref().is_some_and(statement_returns)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primary;

    fn ret(line: u32) -> Statement {
        Statement::Return {
            value: Expression::literal(DataType::simple(Primary::Int), "0", line),
            line,
        }
    }

    #[test]
    fn plain_return_counts() {
        assert!(block_returns(&[ret(1)]));
        assert!(!block_returns(&[]));
    }

    #[test]
    fn ite_needs_both_branches() {
        let condition = Expression::literal(DataType::simple(Primary::Bool), "true", 1);
        let one_sided = Statement::IfThenElse {
            condition: condition.clone(),
            if_branch: Box::new(ret(2)),
            else_branch: None,
            line: 1,
        };
        assert!(!block_returns(&[one_sided]));

        let both = Statement::IfThenElse {
            condition,
            if_branch: Box::new(ret(2)),
            else_branch: Some(Box::new(ret(3))),
            line: 1,
        };
        assert!(block_returns(&[both]));
    }

    #[test]
    fn nested_scope_blocks_count() {
        let block = Statement::ScopedBlock {
            statements: vec![ret(2)],
            line: 1,
        };
        assert!(block_returns(&[block]));
    }
}
