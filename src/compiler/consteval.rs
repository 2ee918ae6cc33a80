//! The compile-time constant evaluator, used for array lengths and const
//! initializers. It shares the expression types with the code generator but
//! reduces values instead of emitting code.

use std::collections::HashMap;

use crate::ast::{Expression, ExprKind, Operator};
use crate::error::{CompilerError, codes};
use crate::symbols::SymbolTable;

#[derive(Clone, Debug)]
struct ConstSymbol {
    scope_name: String,
    scope_level: u32,
    value: String,
}

/// Tracks the values of const symbols so later constant expressions can use
/// them. Keys are mangled names, like the symbol table's.
#[derive(Debug, Default)]
pub struct ConstEvaluator {
    constants: HashMap<String, ConstSymbol>,
}

impl ConstEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the value of a const symbol at its allocation.
    pub fn add_constant(
        &mut self,
        mangled_name: &str,
        scope_name: &str,
        scope_level: u32,
        value: String,
    ) {
        self.constants.insert(
            mangled_name.to_string(),
            ConstSymbol {
                scope_name: scope_name.to_string(),
                scope_level,
                value,
            },
        );
    }

    /// Forgets constants local to a scope being left.
    pub fn leave_scope(&mut self, scope_name: &str, scope_level: u32) {
        self.constants.retain(|_, c| {
            !(c.scope_name == scope_name && c.scope_level >= scope_level)
        });
    }

    /// Reduces an expression to its value, as a string. Fails with a
    /// non-const error when the expression is not statically reducible.
    pub fn evaluate(
        &self,
        exp: &Expression,
        scope_name: &str,
        _scope_level: u32,
        line: u32,
    ) -> Result<String, CompilerError> {
        match &exp.kind {
            ExprKind::Literal { value, .. } => Ok(value.clone()),
            ExprKind::Identifier { name } => {
                let scoped = SymbolTable::mangled_name(name, scope_name);
                let global = SymbolTable::mangled_name(name, crate::symbols::GLOBAL_SCOPE);
                self.constants
                    .get(&scoped)
                    .or_else(|| self.constants.get(&global))
                    .map(|c| c.value.clone())
                    .ok_or_else(|| {
                        CompilerError::new(
                            format!("'{name}' is not a known constant"),
                            codes::TYPE_VALIDITY_RULE_VIOLATION,
                            line,
                        )
                    })
            }
            ExprKind::Binary { left, right, op } => {
                let left = self.evaluate_int(left, scope_name, _scope_level, line)?;
                let right = self.evaluate_int(right, scope_name, _scope_level, line)?;
                let value = match op {
                    Operator::Plus => left.wrapping_add(right),
                    Operator::Minus => left.wrapping_sub(right),
                    Operator::Mult => left.wrapping_mul(right),
                    Operator::Div => {
                        if right == 0 {
                            return Err(CompilerError::new(
                                "Division by zero in constant expression",
                                codes::TYPE_VALIDITY_RULE_VIOLATION,
                                line,
                            ));
                        }
                        left / right
                    }
                    Operator::Modulo => {
                        if right == 0 {
                            return Err(CompilerError::new(
                                "Division by zero in constant expression",
                                codes::TYPE_VALIDITY_RULE_VIOLATION,
                                line,
                            ));
                        }
                        left % right
                    }
                    _ => {
                        return Err(non_const(line));
                    }
                };
                Ok(value.to_string())
            }
            ExprKind::Unary { operand, op } => match op {
                Operator::UnaryMinus => {
                    let value = self.evaluate_int(operand, scope_name, _scope_level, line)?;
                    Ok((-value).to_string())
                }
                Operator::UnaryPlus => self.evaluate(operand, scope_name, _scope_level, line),
                _ => Err(non_const(line)),
            },
            _ => Err(non_const(line)),
        }
    }

    fn evaluate_int(
        &self,
        exp: &Expression,
        scope_name: &str,
        scope_level: u32,
        line: u32,
    ) -> Result<i64, CompilerError> {
        let value = self.evaluate(exp, scope_name, scope_level, line)?;
        value.parse().map_err(|_| non_const(line))
    }
}

fn non_const(line: u32) -> CompilerError {
    CompilerError::new(
        "Expression is not a compile-time constant",
        codes::TYPE_VALIDITY_RULE_VIOLATION,
        line,
    )
}
