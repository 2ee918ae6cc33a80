//! The compiler core: statement dispatch, scope management, include
//! processing, and final section assembly.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::{Statement, block_returns};
use crate::error::{CompilerError, codes, compiler_note, compiler_warning};
use crate::frontend::AstSource;
use crate::options::Mode;
use crate::registers::{self, Register, RegisterFile};
use crate::symbols::{GLOBAL_SCOPE, StructInfo, StructTable, Symbol, SymbolTable};
use crate::types::Primary;

mod address;
mod allocation;
mod assign;
mod consteval;
mod expression;
mod functions;
mod operators;

pub use consteval::ConstEvaluator;

/// Names baked into the generated assembly. The SRE entry points are
/// referenced through NASM macros (`%[NAME]`) that the runtime include
/// defines; the label prefixes get a numeric suffix from the per-category
/// counters.
pub mod magic {
    pub const SRE_INIT: &str = "%[SRE_INIT]";
    pub const SRE_CLEAN: &str = "%[SRE_CLEAN]";
    pub const SRE_REQUEST_RESOURCE: &str = "%[SRE_REQUEST_RESOURCE]";
    pub const SRE_REALLOCATE: &str = "%[SRE_REALLOCATE]";
    pub const SRE_ADD_REF: &str = "%[SRE_ADD_REF]";
    pub const SRE_FREE: &str = "%[SRE_FREE]";
    pub const RTE_OUT_OF_BOUNDS: &str = "%[SINL_RTE_OUT_OF_BOUNDS]";
    pub const MAIN_LABEL: &str = "%[SIN_MAIN]";

    pub const CONST_STRING_LABEL: &str = "sinl_strc_";
    pub const LIST_LITERAL_LABEL: &str = "sinl_list_";
    pub const FLOAT_LITERAL_LABEL: &str = "sinl_fltc_";
    pub const ITE_LABEL: &str = ".sinl_ite_";
    pub const ITE_ELSE_LABEL: &str = ".sinl_ite_else_";
    pub const ITE_DONE_LABEL: &str = ".sinl_ite_done_";
    pub const WHILE_LABEL: &str = ".sinl_while_";
    pub const WHILE_DONE_LABEL: &str = ".sinl_while_done_";
    pub const RTBOUNDS_LABEL: &str = ".sinl_rtbounds_";
    pub const FREE_ARRAY_LABEL: &str = ".sinl_free_array_";
    pub const SP_MASK_LABEL: &str = "sinl_sp_mask";
    pub const DP_MASK_LABEL: &str = "sinl_dp_mask";

    pub const STRING_CONCAT: &str = "sinl_string_concat";
    pub const STRING_COPY: &str = "sinl_string_copy";
    pub const ARRAY_COPY: &str = "sinl_array_copy";
    pub const DYNAMIC_ARRAY_ALLOC: &str = "sinl_dynamic_array_alloc";
}

pub struct Compiler {
    mode: Mode,

    current_scope_name: String,
    current_scope_level: u32,

    symbols: SymbolTable,
    structs: StructTable,
    evaluator: ConstEvaluator,

    /// One register file per function scope; the global scope sits at the
    /// bottom.
    reg_stack: Vec<RegisterFile>,

    /// Running RBP-relative allocation cursor for the current frame. Starts
    /// at 8 to skip the saved frame pointer.
    max_offset: i64,

    // per-category label counters
    strc_num: usize,
    fltc_num: usize,
    list_num: usize,
    ite_num: usize,
    while_num: usize,
    rtbounds_num: usize,
    free_array_num: usize,

    // output sections
    text: String,
    rodata: String,
    data: String,
    bss: String,

    /// Names needing an `extern` directive at the end of the text section.
    externals: BTreeSet<String>,

    /// Canonicalized paths already included, so nothing is processed twice.
    compiled_headers: HashSet<PathBuf>,
    /// Directory of the file being compiled; include paths resolve against it.
    file_path: PathBuf,
}

impl Compiler {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            current_scope_name: GLOBAL_SCOPE.to_string(),
            current_scope_level: 0,
            symbols: SymbolTable::new(),
            structs: StructTable::new(),
            evaluator: ConstEvaluator::new(),
            reg_stack: vec![RegisterFile::new()],
            max_offset: 8,
            strc_num: 0,
            fltc_num: 0,
            list_num: 0,
            ite_num: 0,
            while_num: 0,
            rtbounds_num: 0,
            free_array_num: 0,
            text: String::new(),
            rodata: String::new(),
            data: String::new(),
            bss: String::new(),
            externals: BTreeSet::new(),
            compiled_headers: HashSet::new(),
            file_path: PathBuf::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn regs(&mut self) -> &mut RegisterFile {
        self.reg_stack
            .last_mut()
            .expect("the register stack always holds the current scope")
    }

    pub(crate) fn regs_ref(&self) -> &RegisterFile {
        self.reg_stack
            .last()
            .expect("the register stack always holds the current scope")
    }

    /// Looks up a symbol visible from the current scope, returning a copy.
    /// Copies keep the borrow checker out of code generation; flag updates go
    /// through `lookup_mut`.
    pub(crate) fn lookup(&self, name: &str, line: u32) -> Result<Symbol, CompilerError> {
        self.symbols
            .find(name, &self.current_scope_name)
            .map(Symbol::clone)
            .map_err(|e| e.with_line(line))
    }

    pub(crate) fn lookup_mut(
        &mut self,
        name: &str,
        line: u32,
    ) -> Result<&mut Symbol, CompilerError> {
        let scope = self.current_scope_name.clone();
        self.symbols
            .find_mut(name, &scope)
            .map_err(|e| e.with_line(line))
    }

    pub(crate) fn is_in_scope(&self, sym: &Symbol) -> bool {
        sym.is_accessible_from(&self.current_scope_name, self.current_scope_level)
    }

    pub(crate) fn add_symbol(&mut self, sym: Symbol, line: u32) -> Result<String, CompilerError> {
        self.symbols.insert(sym, line).map_err(|e| e.with_line(line))
    }

    pub(crate) fn add_struct(&mut self, info: StructInfo, line: u32) -> Result<(), CompilerError> {
        self.structs.insert(info, line)
    }

    pub(crate) fn get_struct_info(
        &self,
        name: &str,
        line: u32,
    ) -> Result<&StructInfo, CompilerError> {
        self.structs.find(name, line)
    }

    pub(crate) fn push_used_registers(&mut self, ignore_ab: bool) -> String {
        let regs = self
            .reg_stack
            .last_mut()
            .expect("the register stack always holds the current scope");
        registers::push_used(regs, &mut self.symbols, ignore_ab)
    }

    pub(crate) fn pop_used_registers(&mut self, ignore_ab: bool) -> String {
        registers::pop_used(self.regs_ref(), ignore_ab)
    }

    /// A call to an SRE routine under forced 16-byte stack alignment.
    pub(crate) fn call_sre_function(name: &str) -> String {
        let mut code = String::new();
        let _ = writeln!(code, "\tmov rax, rsp");
        let _ = writeln!(code, "\tand rsp, -0x10");
        let _ = writeln!(code, "\tpush rax");
        let _ = writeln!(code, "\tsub rsp, 8");
        let _ = writeln!(code, "\tcall {name}");
        let _ = writeln!(code, "\tadd rsp, 8");
        let _ = writeln!(code, "\tpop rsp");
        code
    }

    /// A call to one of the `sinl_` library routines, which expect a stack
    /// frame of their own.
    pub(crate) fn call_sincall_subroutine(&mut self, name: &str) -> String {
        self.externals.insert(name.to_string());
        let mut code = String::new();
        let _ = writeln!(code, "\tpushfq");
        let _ = writeln!(code, "\tpush rbp");
        let _ = writeln!(code, "\tmov rbp, rsp");
        let _ = writeln!(code, "\tcall {name}");
        let _ = writeln!(code, "\tmov rsp, rbp");
        let _ = writeln!(code, "\tpop rbp");
        let _ = writeln!(code, "\tpopfq");
        code
    }

    /// Emits the RC decrements for every local that owns a reference, ahead
    /// of leaving (scope, level). With `is_function`, every level within the
    /// function body is swept.
    pub(crate) fn decrement_rc(
        &mut self,
        scope_name: &str,
        scope_level: u32,
        is_function: bool,
    ) -> Result<String, CompilerError> {
        let to_free = self.symbols.symbols_to_free(scope_name, scope_level, is_function);
        let local_structs = self.symbols.local_structs(scope_name, scope_level, is_function);

        if to_free.is_empty() && local_structs.is_empty() {
            return Ok(String::new());
        }

        let mut code = String::new();
        let _ = writeln!(code, "\tpushfq");
        code.push_str(&self.push_used_registers(true));

        // struct locals first: their reference-holding members are released
        // before the instance goes away
        for struct_sym in &local_structs {
            let Some(struct_name) = struct_sym.data_type().struct_name() else {
                continue;
            };
            let members = self
                .structs
                .find(struct_name, struct_sym.line_defined())?
                .members_to_free();
            for member in members {
                code.push_str(&address::get_address(struct_sym, Register::Rbx));
                let _ = writeln!(code, "\tadd rbx, {}", member.stack_offset());
                let _ = writeln!(code, "\tmov rdi, [rbx]");
                code.push_str(&Self::call_sre_function(magic::SRE_FREE));
            }
        }

        for sym in &to_free {
            code.push_str(&self.free_symbol(sym));
        }

        code.push_str(&self.pop_used_registers(true));
        let _ = writeln!(code, "\tpopfq");

        Ok(code)
    }

    /// The RC decrement for one symbol. Arrays of reference types free each
    /// element in an assembly loop before the array itself.
    fn free_symbol(&mut self, sym: &Symbol) -> String {
        let mut code = String::new();
        let _ = writeln!(code, "; freeing symbol {}", sym.name());
        code.push_str(&address::get_address(sym, Register::Rdi));

        let t = sym.data_type();
        match t.primary() {
            Primary::Array => {
                if t.subtype().is_some_and(crate::types::DataType::must_free) {
                    let n = self.free_array_num;
                    self.free_array_num += 1;

                    let _ = writeln!(code, "\tpush rdi");
                    let _ = writeln!(code, "\tmov r12, rdi");
                    let _ = writeln!(code, "\tmov rax, rsp");
                    let _ = writeln!(code, "\tand rsp, -0x10");
                    let _ = writeln!(code, "\tpush rax");
                    let _ = writeln!(code, "\tsub rsp, 0x08");
                    let _ = writeln!(code, "\tmov r13, 0");
                    let _ = writeln!(code, "{}{n}:", magic::FREE_ARRAY_LABEL);
                    let _ = writeln!(code, "\tcmp r13d, [r12]");
                    let _ = writeln!(code, "\tjge {}done_{n}", magic::FREE_ARRAY_LABEL);
                    let _ = writeln!(code, "\tmov rdi, [r12 + r13 * 8 + 4]");
                    let _ = writeln!(code, "\tcall {}", magic::SRE_FREE);
                    let _ = writeln!(code, "\tinc r13");
                    let _ = writeln!(code, "\tjmp {}{n}", magic::FREE_ARRAY_LABEL);
                    let _ = writeln!(code, "{}done_{n}:", magic::FREE_ARRAY_LABEL);
                    let _ = writeln!(code, "\tadd rsp, 0x08");
                    let _ = writeln!(code, "\tpop rsp");
                    let _ = writeln!(code, "\tpop rdi");
                }
                if t.must_free() {
                    code.push_str(&Self::call_sre_function(magic::SRE_FREE));
                }
            }
            Primary::Tuple => {
                // release any reference-holding members, then the tuple
                let mut offset = 0;
                for member in t.contained_types() {
                    if member.must_free() {
                        let _ = writeln!(code, "\tmov rdi, [rdi + {offset}]");
                        code.push_str(&Self::call_sre_function(magic::SRE_FREE));
                        code.push_str(&address::get_address(sym, Register::Rdi));
                    }
                    offset += member.width();
                }
                if t.must_free() {
                    code.push_str(&Self::call_sre_function(magic::SRE_FREE));
                }
            }
            _ => {
                code.push_str(&Self::call_sre_function(magic::SRE_FREE));
            }
        }

        code
    }

    /// Compiles a statement block, then reclaims the block's locals: RC
    /// decrements first (while the symbols still exist), then the stack
    /// space. The `add rsp` is skipped when the block ended in a return
    /// (the code would be unreachable).
    pub(crate) fn compile_ast(
        &mut self,
        block: &[Statement],
        signature: Option<&Symbol>,
    ) -> Result<String, CompilerError> {
        let mut code = String::new();

        for statement in block {
            code.push_str(&self.compile_statement(statement, signature)?);
        }

        if self.current_scope_level != 0 {
            let ends_in_return = block.last().is_some_and(Statement::is_return);

            if !ends_in_return {
                let scope_name = self.current_scope_name.clone();
                code.push_str(&self.decrement_rc(&scope_name, self.current_scope_level, false)?);
            }

            let reserved = self
                .symbols
                .leave_scope(&self.current_scope_name.clone(), self.current_scope_level);
            self.evaluator
                .leave_scope(&self.current_scope_name, self.current_scope_level);

            if self.current_scope_level != 1 && !ends_in_return {
                let _ = writeln!(code, "\tadd rsp, {reserved}");
                self.max_offset -= reserved as i64;
            }
        }

        Ok(code)
    }

    pub(crate) fn compile_statement(
        &mut self,
        statement: &Statement,
        signature: Option<&Symbol>,
    ) -> Result<String, CompilerError> {
        let mut code = String::new();

        match statement {
            Statement::Include { line, .. } => {
                // includes are consumed by the driver before any other
                // statement; reaching one here means it was misplaced
                return Err(CompilerError::new(
                    "Include statements must be made in the global scope at level 0, before any other statement",
                    codes::INCLUDE_SCOPE,
                    *line,
                ));
            }
            Statement::Declaration(decl) => {
                if self.current_scope_name == GLOBAL_SCOPE && self.current_scope_level == 0 {
                    code.push_str(&self.handle_declaration(decl)?);
                } else {
                    return Err(CompilerError::new(
                        "Declarations must be made in the global scope",
                        codes::DECLARATION,
                        decl.line,
                    ));
                }
            }
            Statement::Allocation(alloc) => {
                code.push_str(&self.allocate(alloc)?);
                code.push('\n');
            }
            Statement::Assignment(assignment) => {
                code.push_str(&self.handle_assignment(assignment)?);
                code.push('\n');
            }
            Statement::Movement(movement) => {
                code.push_str(&self.handle_move(movement)?);
                code.push('\n');
            }
            Statement::Construction {
                to_construct,
                initializers,
                has_default,
                line,
            } => {
                code.push_str(&self.construct_object(
                    to_construct,
                    initializers,
                    *has_default,
                    *line,
                )?);
            }
            Statement::Return { value, line } => match signature {
                Some(signature) => {
                    code.push_str(&self.handle_return(value, signature, *line)?);
                    code.push('\n');
                }
                None => {
                    return Err(CompilerError::new(
                        "Return statements may only occur within functions",
                        codes::ILLEGAL_RETURN,
                        *line,
                    ));
                }
            },
            Statement::IfThenElse {
                condition,
                if_branch,
                else_branch,
                line,
            } => {
                // grab the block number up front in case of nested conditionals
                let block_num = self.ite_num;
                self.ite_num += 1;

                let (condition_code, _) = self.evaluate_expression(condition, *line, None)?;
                code.push_str(&condition_code);
                let _ = writeln!(code, "\tcmp al, 1");
                let _ = writeln!(code, "\tjne {}{block_num}", magic::ITE_ELSE_LABEL);
                let _ = writeln!(code, "{}{block_num}:", magic::ITE_LABEL);

                code.push_str(&self.compile_statement(if_branch, signature)?);
                let _ = writeln!(code, "\tjmp {}{block_num}", magic::ITE_DONE_LABEL);
                let _ = writeln!(code, "{}{block_num}:", magic::ITE_ELSE_LABEL);

                if let Some(else_branch) = else_branch {
                    code.push_str(&self.compile_statement(else_branch, signature)?);
                } else {
                    compiler_note("Empty else branch", *line);
                }

                let _ = writeln!(code, "{}{block_num}:", magic::ITE_DONE_LABEL);
            }
            Statement::WhileLoop {
                condition,
                body,
                line,
            } => {
                let block_num = self.while_num;
                self.while_num += 1;

                let (condition_code, _) = self.evaluate_expression(condition, *line, None)?;
                let _ = writeln!(code, "{}{block_num}:", magic::WHILE_LABEL);
                code.push_str(&condition_code);
                let _ = writeln!(code, "\tcmp al, 1");
                let _ = writeln!(code, "\tjne {}{block_num}", magic::WHILE_DONE_LABEL);

                code.push_str(&self.compile_statement(body, signature)?);
                let _ = writeln!(code, "\tjmp {}{block_num}", magic::WHILE_LABEL);
                let _ = writeln!(code, "{}{block_num}:", magic::WHILE_DONE_LABEL);
            }
            Statement::FunctionDefinition(definition) => {
                if !block_returns(&definition.procedure) {
                    return Err(CompilerError::new(
                        format!(
                            "Function '{}' does not return a value in all control paths",
                            definition.name
                        ),
                        codes::NO_RETURN,
                        definition.line,
                    ));
                }
                code.push_str(&self.define_function(definition)?);
                code.push('\n');
            }
            Statement::StructDefinition {
                name,
                procedure,
                line,
            } => {
                let defined = self.define_struct(name, procedure, *line)?;
                self.add_struct(defined, *line)?;
                code.push_str(&self.define_struct_methods(name, procedure)?);
            }
            Statement::Call { name, args, line } => {
                let (call_code, temp_count) = self.call_function(name, args, *line, true)?;
                code.push_str(&call_code);

                // the return value is unused at statement level; release it
                if temp_count > 0 {
                    code.push_str(&self.push_used_registers(true));
                    let _ = writeln!(code, "\tmov rdi, rax");
                    code.push_str(&Self::call_sre_function(magic::SRE_FREE));
                    code.push_str(&self.pop_used_registers(true));
                }
                code.push('\n');
            }
            Statement::InlineAssembly { code: asm, line } => {
                if self.mode.is_strict() {
                    return Err(CompilerError::new(
                        "Inline assembly is not permitted in strict mode",
                        codes::UNSAFE_OPERATION,
                        *line,
                    ));
                }
                if !self.mode.allows_unsafe() {
                    compiler_warning(
                        "Use of inline assembly is highly discouraged as it cannot be analyzed by the compiler nor utilize certain runtime safety measures (unless done manually)",
                        codes::UNSAFE_OPERATION,
                        *line,
                    );
                }
                code.push_str(asm);
                if !asm.ends_with('\n') {
                    code.push('\n');
                }
            }
            Statement::Free { target, line } => {
                code.push_str(&self.handle_free(target, *line)?);
            }
            Statement::ScopedBlock { statements, .. } => {
                let old_level = self.current_scope_level;
                self.current_scope_level += 1;

                code.push_str(&self.compile_ast(statements, signature)?);

                self.current_scope_level = old_level;
            }
        }

        Ok(code)
    }

    /// `free` releases managed data early. It may not be used with const or
    /// static data; calling it twice is a warning, not an error.
    fn handle_free(&mut self, target: &crate::ast::Expression, line: u32) -> Result<String, CompilerError> {
        let crate::ast::ExprKind::Identifier { name } = &target.kind else {
            return Err(CompilerError::non_modifiable_lvalue(line));
        };

        let sym = self.lookup(name, line)?;
        let qualities = sym.data_type().qualities();
        if qualities.is_const() || qualities.is_static() {
            return Err(CompilerError::new(
                "'free' may not be used with const or static data",
                codes::ILLEGAL_OPERATION,
                line,
            ));
        }

        if sym.was_freed() {
            compiler_warning(
                &format!("Symbol '{}' appears to have already been freed", sym.name()),
                codes::DATA_FREED,
                line,
            );
        }

        let mut code = String::new();
        if sym.data_type().must_free() && !sym.was_freed() {
            code.push_str(&self.free_symbol(&sym));
        }

        self.lookup_mut(name, line)?.set_freed();
        Ok(code)
    }

    /// Builds the struct-table entry for a definition. Only allocations (data
    /// members) and function definitions (methods) are accepted; member
    /// offsets accumulate in source order.
    fn define_struct(
        &mut self,
        struct_name: &str,
        body: &[Statement],
        line: u32,
    ) -> Result<StructInfo, CompilerError> {
        let mut members: Vec<Symbol> = Vec::new();
        let mut current_offset: i64 = 0;

        for statement in body {
            match statement {
                Statement::Allocation(alloc) => {
                    let mut member_type = alloc.data_type.clone();

                    if member_type.primary() == Primary::Struct
                        && member_type.struct_name() == Some(struct_name)
                    {
                        return Err(CompilerError::new(
                            "A struct may not contain an instance of itself; use a pointer instead",
                            codes::SELF_CONTAINMENT,
                            alloc.line,
                        ));
                    }

                    if member_type.primary() == Primary::Array
                        && !member_type.qualities().is_dynamic()
                    {
                        // member arrays need a constant length
                        let length_exp = member_type.array_length_expression().cloned();
                        match length_exp {
                            Some(exp) if exp.marked_const => {
                                let value = self.evaluator.evaluate(
                                    &exp,
                                    struct_name,
                                    1,
                                    line,
                                )?;
                                let length: usize = value.parse().map_err(|_| {
                                    CompilerError::non_const_array_length(alloc.line)
                                })?;
                                member_type.set_array_length(length);
                            }
                            _ => return Err(CompilerError::non_const_array_length(alloc.line)),
                        }
                    }

                    let mut member = Symbol::new(
                        alloc.name.clone(),
                        struct_name,
                        1,
                        member_type,
                        current_offset,
                        true,
                        alloc.line,
                    );
                    member.set_initialized();
                    current_offset += member.reclaimed_width() as i64;
                    members.push(member);
                }
                Statement::FunctionDefinition(def) => {
                    let method = self.create_function_symbol(
                        &def.name,
                        &def.return_type,
                        &def.formal_parameters,
                        true,
                        true,
                        struct_name,
                        1,
                        true,
                        def.line,
                    )?;
                    members.push(method);
                }
                Statement::StructDefinition { line, .. } => {
                    return Err(CompilerError::new(
                        "This feature (structs within structs) is not currently supported",
                        codes::ILLEGAL_OPERATION,
                        *line,
                    ));
                }
                other => {
                    return Err(CompilerError::new(
                        "Only allocations and function definitions may appear in a struct body",
                        codes::ILLEGAL_OPERATION,
                        other.line(),
                    ));
                }
            }
        }

        if members.is_empty() {
            compiler_note("Empty struct", line);
        }

        Ok(StructInfo::new(struct_name, members))
    }

    /// Compiles the method bodies of a struct definition, with the struct
    /// name as the enclosing scope.
    fn define_struct_methods(
        &mut self,
        struct_name: &str,
        body: &[Statement],
    ) -> Result<String, CompilerError> {
        let mut code = String::new();

        let prev_name = std::mem::replace(&mut self.current_scope_name, struct_name.to_string());
        let prev_level = self.current_scope_level;
        self.current_scope_level += 1;

        for statement in body {
            if let Statement::FunctionDefinition(def) = statement {
                if !block_returns(&def.procedure) {
                    return Err(CompilerError::new(
                        format!(
                            "Function '{}' does not return a value in all control paths",
                            def.name
                        ),
                        codes::NO_RETURN,
                        def.line,
                    ));
                }
                code.push_str(&self.define_method(struct_name, def)?);
            }
        }

        self.current_scope_name = prev_name;
        self.current_scope_level = prev_level;

        Ok(code)
    }

    /// Consumes an included file's AST. Only externally visible constructs
    /// are taken: extern allocations and function definitions (as symbols,
    /// not code), struct definitions, declarations, and nested includes.
    fn process_include(
        &mut self,
        include_filename: &str,
        line: u32,
        source: &mut dyn AstSource,
    ) -> Result<String, CompilerError> {
        let mut code = String::new();

        let resolved = self.resolve_include_path(include_filename);
        let canonical = resolved.canonicalize().unwrap_or_else(|_| resolved.clone());

        if self.compiled_headers.contains(&canonical) {
            compiler_note(
                &format!(
                    "Included file \"{}\" will be ignored here, as it has been included elsewhere",
                    resolved.display()
                ),
                line,
            );
            return Ok(code);
        }
        self.compiled_headers.insert(canonical);

        debug!(file = %resolved.display(), "processing include");
        let ast = source.create_ast(&resolved)?;

        for statement in &ast {
            match statement {
                Statement::Allocation(alloc) => {
                    if !alloc.data_type.qualities().is_extern() {
                        return Err(CompilerError::new(
                            format!(
                                "Symbol '{}' in included file must be marked 'extern' to be visible",
                                alloc.name
                            ),
                            codes::INVISIBLE_SYMBOL,
                            alloc.line,
                        ));
                    }
                    let mut offset = 0;
                    let sym = Symbol::allocate(
                        &alloc.name,
                        alloc.data_type.clone(),
                        0,
                        GLOBAL_SCOPE,
                        0,
                        &mut offset,
                        false,
                        alloc.line,
                    );
                    self.externals.insert(sym.name().to_string());
                    let key = self.add_symbol(sym, alloc.line)?;
                    self.symbols
                        .find_by_mangled_mut(&key)
                        .expect("just inserted")
                        .set_initialized();
                }
                Statement::FunctionDefinition(def) => {
                    if !def.return_type.qualities().is_extern() {
                        return Err(CompilerError::new(
                            format!(
                                "Function '{}' in included file must be marked 'extern' to be visible",
                                def.name
                            ),
                            codes::INVISIBLE_SYMBOL,
                            def.line,
                        ));
                    }
                    let sym = self.create_function_symbol(
                        &def.name,
                        &def.return_type,
                        &def.formal_parameters,
                        false,
                        true,
                        GLOBAL_SCOPE,
                        0,
                        false,
                        def.line,
                    )?;
                    self.externals.insert(sym.name().to_string());
                    self.add_symbol(sym, def.line)?;
                }
                Statement::StructDefinition {
                    name,
                    procedure,
                    line,
                } => {
                    let info = self.define_struct(name, procedure, *line)?;
                    self.add_struct(info, *line)?;
                }
                Statement::Declaration(decl) => {
                    code.push_str(&self.handle_declaration(decl)?);
                }
                Statement::Include { filename, line } => {
                    code.push_str(&self.process_include(filename, *line, source)?);
                }
                _ => {
                    // everything else in an included file is ignored
                }
            }
        }

        Ok(code)
    }

    /// Include paths are relative to the including file unless they begin
    /// with `/` or `~`.
    fn resolve_include_path(&self, include_filename: &str) -> PathBuf {
        if let Some(rest) = include_filename.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        if include_filename.starts_with('/') || include_filename.starts_with('~') {
            return PathBuf::from(include_filename);
        }
        self.file_path.join(include_filename)
    }

    /// The compiler's entry function: compiles the AST and assembles the
    /// final NASM-syntax output.
    pub fn generate_asm(
        &mut self,
        filename: &Path,
        ast: &[Statement],
        source: &mut dyn AstSource,
    ) -> Result<String, CompilerError> {
        self.file_path = filename.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut text = String::new();
        let _ = writeln!(text, "%ifndef _SRE_INCLUDE_");
        let _ = writeln!(text, "%define _SRE_INCLUDE_");
        let _ = writeln!(text, "%include \"SRE/asm_include.s\"");
        let _ = writeln!(text, "%endif");
        let _ = writeln!(text, "default rel");

        // leading includes are the only place includes are legal
        let mut body_start = 0;
        for statement in ast {
            if let Statement::Include { filename, line } = statement {
                text.push_str(&self.process_include(filename, *line, source)?);
                body_start += 1;
            } else {
                break;
            }
        }

        let body_code = self.compile_ast(&ast[body_start..], None)?;
        text.push_str(&body_code);

        // the entry wrapper may reference more runtime routines, so build it
        // before the extern directives are flushed
        let entry_code = self.emit_entry_point(filename)?;

        for external in &self.externals {
            let _ = writeln!(text, "extern {external}");
        }
        text.push_str(&entry_code);

        self.text.push_str(&text);
        Ok(self.assemble_sections())
    }

    fn assemble_sections(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "section .text");
        out.push_str(&self.text);
        let _ = writeln!(out);

        let _ = writeln!(out, "section .rodata");
        let _ = writeln!(out, "\t{} dd 0x80000000", magic::SP_MASK_LABEL);
        let _ = writeln!(out, "\t{} dq 0x8000000000000000", magic::DP_MASK_LABEL);
        out.push_str(&self.rodata);
        let _ = writeln!(out);

        let _ = writeln!(out, "section .data");
        out.push_str(&self.data);
        let _ = writeln!(out);

        let _ = writeln!(out, "section .bss");
        out.push_str(&self.bss);

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Allocation, Expression};
    use crate::frontend::NoFrontEnd;
    use crate::types::DataType;

    fn int_alloc(name: &str, value: Option<&str>, line: u32) -> Statement {
        Statement::Allocation(Allocation {
            name: name.to_string(),
            data_type: DataType::simple(Primary::Int),
            initial_value: value
                .map(|v| Expression::literal(DataType::simple(Primary::Int), v, line)),
            line,
        })
    }

    #[test]
    fn include_after_first_statement_is_an_error() {
        let mut compiler = Compiler::new(Mode::Normal);
        let ast = vec![
            int_alloc("x", Some("1"), 1),
            Statement::Include {
                filename: "other.sin".into(),
                line: 2,
            },
        ];
        let err = compiler
            .generate_asm(Path::new("test.sin"), &ast, &mut NoFrontEnd)
            .unwrap_err();
        assert_eq!(err.code(), codes::INCLUDE_SCOPE);
    }

    #[test]
    fn sections_appear_in_order_with_masks() {
        let mut compiler = Compiler::new(Mode::Normal);
        let asm = compiler
            .generate_asm(Path::new("test.sin"), &[], &mut NoFrontEnd)
            .unwrap();

        let text_at = asm.find("section .text").unwrap();
        let rodata_at = asm.find("section .rodata").unwrap();
        let data_at = asm.find("section .data").unwrap();
        let bss_at = asm.find("section .bss").unwrap();
        assert!(text_at < rodata_at && rodata_at < data_at && data_at < bss_at);

        assert!(asm.contains("sinl_sp_mask dd 0x80000000"));
        assert!(asm.contains("sinl_dp_mask dq 0x8000000000000000"));
        assert!(asm.contains("default rel"));
    }

    #[test]
    fn return_outside_function_is_illegal() {
        let mut compiler = Compiler::new(Mode::Normal);
        let ast = vec![Statement::Return {
            value: Expression::literal(DataType::simple(Primary::Int), "0", 1),
            line: 1,
        }];
        let err = compiler
            .generate_asm(Path::new("test.sin"), &ast, &mut NoFrontEnd)
            .unwrap_err();
        assert_eq!(err.code(), codes::ILLEGAL_RETURN);
    }
}
