use std::collections::HashMap;

use crate::error::{CompilerError, codes, compiler_warning};
use crate::registers::{Register, RegisterFile};
use crate::types::{DataType, Primary};

pub mod structs;

pub use structs::{StructInfo, StructTable};

pub const GLOBAL_SCOPE: &str = "global";

/// Calling conventions a function may declare. SINCALL is the native
/// convention and the only one currently generated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CallingConvention {
    #[default]
    Sincall,
    C64,
    Windows,
}

/// The payload a function symbol carries beyond its base symbol data.
#[derive(Clone, Debug, Default)]
pub struct FunctionSignature {
    /// Formal parameters in declaration order; each carries its assigned
    /// argument register (or none, for stack-passed arguments) and its
    /// stack offset within the callee frame.
    pub formal_parameters: Vec<Symbol>,
    /// Default values for trailing parameters, indexed like the formals.
    pub parameter_defaults: Vec<Option<crate::ast::Expression>>,
    /// The register state implied by the argument assignment; pushed onto
    /// the compiler's register stack when the function body is compiled.
    pub arg_registers: RegisterFile,
    pub calling_convention: CallingConvention,
}

#[derive(Clone, Debug)]
pub enum SymbolKind {
    Variable,
    Function(Box<FunctionSignature>),
    Struct,
}

/// A named binding: a variable, function, or struct name, together with its
/// scope, type, and storage location.
#[derive(Clone, Debug)]
pub struct Symbol {
    /// The table key: mangled unless the symbol is extern.
    name: String,
    scope_name: String,
    scope_level: u32,
    data_type: DataType,
    /// Offset from RBP: positive offsets sit below RBP, negative offsets
    /// address the parameter region above it.
    stack_offset: i64,
    register: Option<Register>,
    kind: SymbolKind,
    initialized: bool,
    freed: bool,
    defined: bool,
    parameter: bool,
    line_defined: u32,
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        scope_name: impl Into<String>,
        scope_level: u32,
        data_type: DataType,
        stack_offset: i64,
        defined: bool,
        line_defined: u32,
    ) -> Self {
        Self {
            name: name.into(),
            scope_name: scope_name.into(),
            scope_level,
            data_type,
            stack_offset,
            register: None,
            kind: SymbolKind::Variable,
            initialized: false,
            freed: false,
            defined,
            parameter: false,
            line_defined,
        }
    }

    /// Creates the symbol for an allocation or declaration, mangling the name
    /// (unless extern) and advancing the stack cursor by `data_width` before
    /// recording the offset, so the first local in a frame lands just past
    /// the base pointer.
    pub fn allocate(
        raw_name: &str,
        data_type: DataType,
        data_width: usize,
        scope_name: &str,
        scope_level: u32,
        stack_offset: &mut i64,
        defined: bool,
        line: u32,
    ) -> Self {
        let name = if data_type.qualities().is_extern() {
            raw_name.to_string()
        } else {
            SymbolTable::mangled_name(raw_name, scope_name)
        };

        *stack_offset += data_width as i64;
        Self::new(
            name,
            scope_name,
            scope_level,
            data_type,
            *stack_offset,
            defined,
            line,
        )
    }

    pub fn function(
        name: impl Into<String>,
        scope_name: impl Into<String>,
        scope_level: u32,
        return_type: DataType,
        signature: FunctionSignature,
        defined: bool,
        line_defined: u32,
    ) -> Self {
        let mut sym = Self::new(
            name,
            scope_name,
            scope_level,
            return_type,
            0,
            defined,
            line_defined,
        );
        sym.kind = SymbolKind::Function(Box::new(signature));
        sym
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    pub fn scope_level(&self) -> u32 {
        self.scope_level
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn data_type_mut(&mut self) -> &mut DataType {
        &mut self.data_type
    }

    pub fn stack_offset(&self) -> i64 {
        self.stack_offset
    }

    pub fn set_stack_offset(&mut self, offset: i64) {
        self.stack_offset = offset;
    }

    pub fn register(&self) -> Option<Register> {
        self.register
    }

    pub fn set_register(&mut self, register: Option<Register>) {
        self.register = register;
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, SymbolKind::Variable)
    }

    pub fn signature(&self) -> Option<&FunctionSignature> {
        match &self.kind {
            SymbolKind::Function(signature) => Some(signature),
            _ => None,
        }
    }

    pub fn was_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn was_freed(&self) -> bool {
        self.freed
    }

    pub fn set_freed(&mut self) {
        self.freed = true;
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    pub fn set_defined(&mut self) {
        self.defined = true;
    }

    pub fn is_parameter(&self) -> bool {
        self.parameter
    }

    pub fn set_as_parameter(&mut self) {
        self.parameter = true;
    }

    pub fn line_defined(&self) -> u32 {
        self.line_defined
    }

    /// Whether this symbol can be named from the given scope: globals are
    /// visible everywhere, locals only within their scope at the same or a
    /// deeper level.
    pub fn is_accessible_from(&self, scope_name: &str, scope_level: u32) -> bool {
        self.scope_name == GLOBAL_SCOPE
            || (self.scope_name == scope_name && self.scope_level <= scope_level)
    }

    /// The stack width this symbol's slot reclaims on scope exit: reference
    /// types occupy a pointer, static data occupies no stack at all, and
    /// everything else occupies its full width.
    pub fn reclaimed_width(&self) -> usize {
        if self.data_type.qualities().is_static() {
            0
        } else {
            self.data_type.slot_width()
        }
    }

    /// Whether scope exit must emit an RC decrement for this symbol.
    pub fn requires_free_on_exit(&self) -> bool {
        let t = &self.data_type;
        t.must_free()
            || t.primary() == Primary::Reference
            || (t.primary() == Primary::Array
                && t.subtype().is_some_and(DataType::must_free))
    }
}

#[derive(Clone, Debug)]
struct LocalNode {
    name: String,
    scope_name: String,
    scope_level: u32,
}

/// The symbol table: a map keyed by mangled name, plus a stack recording
/// local insertion order so leaving a scope can discard variables in reverse.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    locals: Vec<LocalNode>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SIN_<name>` at global scope, `SIN_<scope>_<name>` in a named scope.
    /// Extern symbols never pass through here.
    pub fn mangled_name(name: &str, scope_name: &str) -> String {
        if scope_name == GLOBAL_SCOPE || scope_name.is_empty() {
            format!("SIN_{name}")
        } else {
            format!("SIN_{scope_name}_{name}")
        }
    }

    pub fn contains(&self, name: &str, scope_name: &str) -> bool {
        self.symbols
            .contains_key(&Self::mangled_name(name, scope_name))
            || self.symbols.contains_key(&Self::mangled_name(name, GLOBAL_SCOPE))
            || self.symbols.contains_key(name)
    }

    /// Inserts a symbol, returning its table key. A second insertion of the
    /// same name is allowed only when it defines a prior declaration;
    /// anything else is a duplicate-symbol (variables) or
    /// duplicate-definition (functions) error.
    pub fn insert(&mut self, to_add: Symbol, line: u32) -> Result<String, CompilerError> {
        // names that collide with the runtime's prefix will link, but badly
        if to_add.name().starts_with("sinl_") {
            compiler_warning(
                &format!(
                    "Symbol '{}' uses the 'sinl_' prefix, which is reserved for the SIN runtime; errors may be encountered at link time",
                    to_add.name()
                ),
                codes::ILLEGAL_OPERATION,
                line,
            );
        }

        let key = to_add.name().to_string();
        if let Some(existing) = self.symbols.get_mut(&key) {
            if existing.is_defined() {
                if to_add.is_function() {
                    return Err(CompilerError::duplicate_definition(&key, line));
                }
                return Err(CompilerError::duplicate_symbol(&key, line));
            }
            existing.set_defined();
            return Ok(key);
        }

        self.locals.push(LocalNode {
            name: key.clone(),
            scope_name: to_add.scope_name().to_string(),
            scope_level: to_add.scope_level(),
        });
        self.symbols.insert(key.clone(), to_add);
        Ok(key)
    }

    /// Looks a name up, trying the scope-mangled form, the global-mangled
    /// form, and finally the raw form (extern symbols).
    pub fn find(&self, name: &str, scope_name: &str) -> Result<&Symbol, CompilerError> {
        self.key_for(name, scope_name)
            .and_then(|key| self.symbols.get(&key))
            .ok_or_else(|| CompilerError::symbol_not_found(name, 0))
    }

    pub fn find_mut(&mut self, name: &str, scope_name: &str) -> Result<&mut Symbol, CompilerError> {
        match self.key_for(name, scope_name) {
            Some(key) => Ok(self
                .symbols
                .get_mut(&key)
                .expect("key_for only returns existing keys")),
            None => Err(CompilerError::symbol_not_found(name, 0)),
        }
    }

    /// Lookup by exact (already-mangled) table key.
    pub fn find_by_mangled_mut(&mut self, mangled: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(mangled)
    }

    pub fn find_by_mangled(&self, mangled: &str) -> Option<&Symbol> {
        self.symbols.get(mangled)
    }

    fn key_for(&self, name: &str, scope_name: &str) -> Option<String> {
        let scoped = Self::mangled_name(name, scope_name);
        if self.symbols.contains_key(&scoped) {
            return Some(scoped);
        }
        let global = Self::mangled_name(name, GLOBAL_SCOPE);
        if self.symbols.contains_key(&global) {
            return Some(global);
        }
        if self.symbols.contains_key(name) {
            return Some(name.to_string());
        }
        None
    }

    /// Pops every local belonging to (scope, level) off the insertion stack,
    /// removes it from the table, and returns the total stack width to
    /// reclaim. Global symbols are never reclaimed.
    pub fn leave_scope(&mut self, scope_name: &str, scope_level: u32) -> usize {
        let mut reclaimed = 0;

        while let Some(top) = self.locals.last() {
            if top.scope_level != scope_level || top.scope_name != scope_name {
                break;
            }
            let node = self
                .locals
                .pop()
                .expect("stack is non-empty inside the loop");

            if node.scope_name != GLOBAL_SCOPE
                && let Some(sym) = self.symbols.remove(&node.name)
            {
                reclaimed += sym.reclaimed_width();
            }
        }

        reclaimed
    }

    /// The locals needing an RC decrement before leaving (scope, level), in
    /// reverse insertion order. For a function exit, every level at or above
    /// `scope_level` within the function body is included.
    pub fn symbols_to_free(
        &self,
        scope_name: &str,
        scope_level: u32,
        is_function: bool,
    ) -> Vec<Symbol> {
        self.collect_locals(scope_name, scope_level, is_function, |sym| {
            sym.requires_free_on_exit()
        })
    }

    /// Struct-typed locals in the scope being left, so their members can be
    /// released as well.
    pub fn local_structs(
        &self,
        scope_name: &str,
        scope_level: u32,
        is_function: bool,
    ) -> Vec<Symbol> {
        self.collect_locals(scope_name, scope_level, is_function, |sym| {
            sym.data_type().primary() == Primary::Struct && !sym.data_type().qualities().is_dynamic()
        })
    }

    fn collect_locals(
        &self,
        scope_name: &str,
        scope_level: u32,
        is_function: bool,
        mut want: impl FnMut(&Symbol) -> bool,
    ) -> Vec<Symbol> {
        let mut found = Vec::new();

        for node in self.locals.iter().rev() {
            let in_range = if is_function {
                node.scope_level >= scope_level
            } else {
                node.scope_level == scope_level && node.scope_name == scope_name
            };
            if !in_range {
                break;
            }
            if let Some(sym) = self.symbols.get(&node.name)
                && sym.is_variable()
                && want(sym)
            {
                found.push(sym.clone());
            }
        }

        found
    }
}
