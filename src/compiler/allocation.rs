//! Allocation and declaration handling: width resolution (including constant
//! array lengths), storage selection (automatic, static, const, dynamic),
//! and alloc-init dispatch.

use std::fmt::Write as _;

use super::{Compiler, magic};
use crate::ast::{Allocation, Declaration, DeclarationKind, ExprKind};
use crate::error::{CompilerError, codes};
use crate::symbols::{GLOBAL_SCOPE, StructInfo, Symbol};
use crate::types::{DataType, Primary, Quality, widths};

impl Compiler {
    /// Resolves the full width of a type at its allocation site: array
    /// lengths are reduced by the constant evaluator, struct widths come
    /// from the struct table, tuple widths are summed member by member.
    pub(crate) fn resolve_width(
        &mut self,
        data_type: &mut DataType,
        line: u32,
    ) -> Result<usize, CompilerError> {
        if data_type.qualities().is_dynamic() {
            // dynamic data is reached through a pointer; the pointee width is
            // still resolved for the allocation call
            if data_type.primary() == Primary::Struct {
                let name = data_type
                    .struct_name()
                    .ok_or_else(|| CompilerError::undefined_struct("<anonymous>", line))?;
                let info = self.structs.find(name, line)?;
                data_type.set_struct_width(info.width());
            }
            return Ok(widths::PTR);
        }

        match data_type.primary() {
            Primary::Struct => {
                let name = data_type
                    .struct_name()
                    .ok_or_else(|| CompilerError::undefined_struct("<anonymous>", line))?
                    .to_string();
                let info = self.structs.find(&name, line)?;
                if !info.is_width_known() {
                    return Err(CompilerError::new(
                        format!("Struct '{name}' is declared but not yet defined"),
                        codes::UNDEFINED_STRUCT,
                        line,
                    ));
                }
                let width = info.width();
                data_type.set_struct_width(width);
                Ok(width)
            }
            Primary::Array => {
                if data_type.array_length() != 0 {
                    return Ok(data_type.width());
                }
                let length_expression = data_type.array_length_expression().cloned();
                match length_expression {
                    Some(exp) if exp.marked_const => {
                        let exp_type = self.expression_type(&exp, line)?;
                        if exp_type.primary() != Primary::Int {
                            return Err(CompilerError::non_const_array_length(line));
                        }
                        let value = self.evaluator.evaluate(
                            &exp,
                            &self.current_scope_name,
                            self.current_scope_level,
                            line,
                        )?;
                        let length: usize = value
                            .parse()
                            .map_err(|_| CompilerError::non_const_array_length(line))?;
                        data_type.set_array_length(length);
                        Ok(data_type.width())
                    }
                    _ => Err(CompilerError::new(
                        "The length of a non-dynamic array must be known at compile time (use a literal or a valid constexpr)",
                        codes::TYPE_VALIDITY_RULE_VIOLATION,
                        line,
                    )),
                }
            }
            Primary::Tuple => {
                let mut contained = data_type.contained_types().to_vec();
                let mut total = 0;
                for t in &mut contained {
                    total += self.resolve_width(t, line)?;
                }
                Ok(total)
            }
            _ => Ok(data_type.width()),
        }
    }

    /// Compiles an `alloc` statement.
    pub(crate) fn allocate(&mut self, alloc: &Allocation) -> Result<String, CompilerError> {
        let mut code = String::new();
        let mut data_type = alloc.data_type.clone();
        let line = alloc.line;

        // global variables live in static memory whether marked or not
        if self.current_scope_name == GLOBAL_SCOPE && !data_type.qualities().is_static() {
            data_type.add_quality(Quality::Static, line)?;
        }

        let width = self.resolve_width(&mut data_type, line)?;
        let qualities = *data_type.qualities();

        // const and ref<T> data must be initialized where they are allocated
        if (qualities.is_const() || data_type.primary() == Primary::Reference)
            && alloc.initial_value.is_none()
        {
            return Err(CompilerError::new(
                "const and ref<T> data must use alloc-init syntax",
                codes::ALLOC_INIT_REQUIRED,
                line,
            ));
        }

        // dynamic wins over the static quality a global allocation picks up
        if qualities.is_dynamic() {
            code.push_str(&self.allocate_dynamic(alloc, &mut data_type, width)?);
            return Ok(code);
        }

        if qualities.is_const() {
            return self.allocate_const(alloc, data_type, width);
        }

        if qualities.is_static() {
            return self.allocate_static(alloc, data_type, width);
        }

        // automatic storage on the stack
        let scope_name = self.current_scope_name.clone();
        let sym = Symbol::allocate(
            &alloc.name,
            data_type,
            width,
            &scope_name,
            self.current_scope_level,
            &mut self.max_offset,
            true,
            line,
        );
        let key = self.add_symbol(sym.clone(), line)?;
        let _ = writeln!(code, "\tsub rsp, {width}");

        if let Some(initial_value) = &alloc.initial_value {
            code.push_str(&self.handle_alloc_init(&sym, initial_value, line)?);
            self.symbols
                .find_by_mangled_mut(&key)
                .expect("just inserted")
                .set_initialized();
        }

        Ok(code)
    }

    /// Static data: reserved in `.bss`, initialized (if requested) by code at
    /// the allocation site. A constant scalar initializer stores directly;
    /// anything else goes through the normal assignment path.
    fn allocate_static(
        &mut self,
        alloc: &Allocation,
        data_type: DataType,
        width: usize,
    ) -> Result<String, CompilerError> {
        let mut code = String::new();
        let line = alloc.line;

        let scope_name = self.current_scope_name.clone();
        let mut unused_offset = 0;
        let sym = Symbol::allocate(
            &alloc.name,
            data_type.clone(),
            0,
            &scope_name,
            self.current_scope_level,
            &mut unused_offset,
            true,
            line,
        );
        let key = self.add_symbol(sym.clone(), line)?;

        let reserved = width.max(1);
        let _ = writeln!(self.bss, "{}: resb {reserved}", sym.name());

        if let Some(initial_value) = &alloc.initial_value {
            // integer literals are valid NASM immediates as written; bool and
            // char literals need the evaluator's normalization (0/1, backtick
            // escapes), so they take the general assignment path
            let is_direct_store = matches!(&initial_value.kind, ExprKind::Literal { .. })
                && data_type.primary() == Primary::Int;
            if is_direct_store {
                let ExprKind::Literal { value, .. } = &initial_value.kind else {
                    unreachable!("checked above");
                };
                let size_keyword = match width {
                    1 => "byte",
                    2 => "word",
                    4 => "dword",
                    _ => "qword",
                };
                let _ = writeln!(code, "\tmov {size_keyword} [{}], {value}", sym.name());
            } else {
                code.push_str(&self.handle_alloc_init(&sym, initial_value, line)?);
            }
            self.symbols
                .find_by_mangled_mut(&key)
                .expect("just inserted")
                .set_initialized();
        }

        Ok(code)
    }

    /// Const data: evaluated at compile time and emitted into `.rodata`; the
    /// value is recorded so later constant expressions can fold it.
    fn allocate_const(
        &mut self,
        alloc: &Allocation,
        data_type: DataType,
        width: usize,
    ) -> Result<String, CompilerError> {
        let line = alloc.line;
        let initial_value = alloc
            .initial_value
            .as_ref()
            .expect("alloc-init was checked by the caller");

        let value = self.evaluator.evaluate(
            initial_value,
            &self.current_scope_name.clone(),
            self.current_scope_level,
            line,
        )?;

        let scope_name = self.current_scope_name.clone();
        let mut unused_offset = 0;
        let sym = Symbol::allocate(
            &alloc.name,
            data_type.clone(),
            0,
            &scope_name,
            self.current_scope_level,
            &mut unused_offset,
            true,
            line,
        );
        let key = self.add_symbol(sym.clone(), line)?;
        self.symbols
            .find_by_mangled_mut(&key)
            .expect("just inserted")
            .set_initialized();

        match data_type.primary() {
            Primary::String => {
                let _ = writeln!(
                    self.rodata,
                    "\t{}\tdd {}, `{value}`, 0",
                    sym.name(),
                    value.len()
                );
            }
            _ => {
                let directive = match width {
                    1 => "db",
                    2 => "dw",
                    4 => "dd",
                    _ => "dq",
                };
                let _ = writeln!(self.rodata, "\t{} {directive} {value}", sym.name());
            }
        }

        self.evaluator
            .add_constant(&key, &scope_name, self.current_scope_level, value);

        // no code runs for const allocations
        Ok(String::new())
    }

    /// Dynamic data: an 8-byte slot on the stack holding a pointer into the
    /// managed heap, filled by the runtime allocator.
    fn allocate_dynamic(
        &mut self,
        alloc: &Allocation,
        data_type: &mut DataType,
        width: usize,
    ) -> Result<String, CompilerError> {
        let mut code = String::new();
        let line = alloc.line;

        let scope_name = self.current_scope_name.clone();
        let sym = Symbol::allocate(
            &alloc.name,
            data_type.clone(),
            width,
            &scope_name,
            self.current_scope_level,
            &mut self.max_offset,
            true,
            line,
        );
        let key = self.add_symbol(sym.clone(), line)?;
        let _ = writeln!(code, "\tsub rsp, {width}");

        code.push_str(&self.push_used_registers(true));

        if data_type.primary() == Primary::Array {
            // element count: a constant length expression or the literal list
            let element_width = data_type.subtype().map(DataType::width).unwrap_or(1);
            let count_code = match data_type.array_length_expression() {
                Some(exp) => {
                    let exp = exp.clone();
                    let (count_code, _) = self.evaluate_expression(&exp, line, None)?;
                    let mut c = count_code;
                    let _ = writeln!(c, "\tmov rdi, rax");
                    c
                }
                None => {
                    let count = match &alloc.initial_value {
                        Some(init) => match &init.kind {
                            ExprKind::List { members, .. } => members.len(),
                            _ => 0,
                        },
                        None => 0,
                    };
                    let mut c = String::new();
                    let _ = writeln!(c, "\tmov rdi, {count}");
                    c
                }
            };
            let _ = writeln!(code, "\tmov rsi, {element_width}");
            code.push_str(&count_code);
            code.push_str(&self.call_sincall_subroutine(magic::DYNAMIC_ARRAY_ALLOC));
        } else {
            let qualities = data_type.qualities();
            let pointee_width = match data_type.primary() {
                Primary::Struct => {
                    let name = data_type
                        .struct_name()
                        .ok_or_else(|| CompilerError::undefined_struct("<anonymous>", line))?;
                    self.structs.find(name, line)?.width()
                }
                Primary::Int | Primary::Float => {
                    if qualities.is_long() {
                        8
                    } else if qualities.is_short() {
                        2
                    } else {
                        4
                    }
                }
                Primary::Bool | Primary::Char => 1,
                _ => widths::PTR,
            };
            let _ = writeln!(code, "\tmov rsi, {}", pointee_width.max(1));
            code.push_str(&Self::call_sre_function(magic::SRE_REQUEST_RESOURCE));
        }

        // store the returned pointer in the slot
        let _ = writeln!(code, "\tmov [rbp - {}], rax", sym.stack_offset());
        code.push_str(&self.pop_used_registers(true));

        if let Some(initial_value) = &alloc.initial_value {
            code.push_str(&self.handle_alloc_init(&sym, initial_value, line)?);
        }
        self.symbols
            .find_by_mangled_mut(&key)
            .expect("just inserted")
            .set_initialized();

        Ok(code)
    }

    /// `decl` statements add symbols without reserving storage; the data or
    /// function is defined in another translation unit (or later in this
    /// one).
    pub(crate) fn handle_declaration(
        &mut self,
        decl: &Declaration,
    ) -> Result<String, CompilerError> {
        match decl.kind {
            DeclarationKind::Function => {
                let sym = self.create_function_symbol(
                    &decl.name,
                    &decl.data_type,
                    &decl.formal_parameters,
                    !decl.data_type.qualities().is_extern(),
                    false,
                    GLOBAL_SCOPE,
                    0,
                    false,
                    decl.line,
                )?;
                if decl.data_type.qualities().is_extern() {
                    self.externals.insert(sym.name().to_string());
                }
                self.add_symbol(sym, decl.line)?;
            }
            DeclarationKind::Struct => {
                if !self.structs.contains(&decl.name) {
                    self.add_struct(StructInfo::forward_declared(&decl.name), decl.line)?;
                }
            }
            DeclarationKind::Variable => {
                let mut unused_offset = 0;
                let sym = Symbol::allocate(
                    &decl.name,
                    decl.data_type.clone(),
                    0,
                    GLOBAL_SCOPE,
                    0,
                    &mut unused_offset,
                    false,
                    decl.line,
                );
                if decl.data_type.qualities().is_extern() {
                    self.externals.insert(sym.name().to_string());
                }
                let key = self.add_symbol(sym, decl.line)?;
                // declared data is defined elsewhere; treat it as live
                self.symbols
                    .find_by_mangled_mut(&key)
                    .expect("just inserted")
                    .set_initialized();
            }
        }

        Ok(String::new())
    }
}
