//! Function machinery: signature construction with SINCALL argument
//! classification, definition and call code generation, return handling, and
//! the program entry wrapper around `main`.

use std::fmt::Write as _;
use std::path::Path;

use super::{Compiler, magic};
use crate::ast::{Expression, FunctionDefinition, Parameter, Statement};
use crate::error::{CompilerError, codes, compiler_note, compiler_warning};
use crate::registers::{SINCALL_FLOAT_ARG_REGISTERS, SINCALL_INT_ARG_REGISTERS};
use crate::symbols::{
    CallingConvention, FunctionSignature, GLOBAL_SCOPE, Symbol, SymbolTable,
};
use crate::types::{
    DataType, Primary, Qualities, can_pass_in_register, widths,
};

/// The scope name a function's locals live in: the bare function name at
/// global scope, `<outer>_<name>` inside a named scope (methods).
fn inner_scope_name(scope_name: &str, function_name: &str) -> String {
    if scope_name == GLOBAL_SCOPE || scope_name.is_empty() {
        function_name.to_string()
    } else {
        format!("{scope_name}_{function_name}")
    }
}

impl Compiler {
    /// Builds a function symbol from a definition or declaration: mangles
    /// the name (unless extern), classifies each parameter into its SINCALL
    /// register or stack slot, and synthesizes the `this` parameter for
    /// non-static methods.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create_function_symbol(
        &mut self,
        name: &str,
        return_type: &DataType,
        parameters: &[Parameter],
        mangle: bool,
        defined: bool,
        scope_name: &str,
        scope_level: u32,
        is_method: bool,
        line: u32,
    ) -> Result<Symbol, CompilerError> {
        let qualities = return_type.qualities();
        let calling_convention = if qualities.is_c64() {
            CallingConvention::C64
        } else if qualities.is_windows() {
            CallingConvention::Windows
        } else {
            CallingConvention::Sincall
        };

        let symbol_name = if qualities.is_extern() || !mangle {
            name.to_string()
        } else {
            SymbolTable::mangled_name(name, scope_name)
        };
        let inner_scope = inner_scope_name(scope_name, name);
        let inner_level = scope_level + 1;

        let mut formal_parameters: Vec<Symbol> = Vec::new();
        let mut parameter_defaults: Vec<Option<Expression>> = Vec::new();
        let mut next_int = 0usize;
        let mut next_float = 0usize;
        let mut stack_parameters = 0usize;
        // the first slot sits past the return address
        let mut stack_cursor: i64 = 8;

        let this_type = DataType::with_subtype(
            Primary::Reference,
            DataType::structure(scope_name, Qualities::new()),
            Qualities::new(),
        );
        let is_static_method = is_method && return_type.qualities().is_static();
        let mut has_this = false;

        let classify = |param_name: &str,
                            param_type: DataType,
                            param_line: u32,
                            next_int: &mut usize,
                            next_float: &mut usize,
                            stack_parameters: &mut usize,
                            stack_cursor: &mut i64|
         -> Symbol {
            let data_width = if can_pass_in_register(&param_type) {
                param_type.width()
            } else {
                // aggregates come in by reference; the slot holds the address
                widths::PTR
            };

            let register = if param_type.primary() == Primary::Float {
                let r = SINCALL_FLOAT_ARG_REGISTERS.get(*next_float).copied();
                *next_float += 1;
                r
            } else {
                let r = SINCALL_INT_ARG_REGISTERS.get(*next_int).copied();
                *next_int += 1;
                r
            };

            let mut sym = match register {
                Some(_) => Symbol::allocate(
                    param_name,
                    param_type,
                    data_width,
                    &inner_scope,
                    inner_level,
                    stack_cursor,
                    true,
                    param_line,
                ),
                None => {
                    // spilled: the caller pushes it above the frame base
                    let offset = -(8 + 8 * *stack_parameters as i64);
                    *stack_parameters += 1;
                    Symbol::new(
                        SymbolTable::mangled_name(param_name, &inner_scope),
                        &inner_scope,
                        inner_level,
                        param_type,
                        offset,
                        true,
                        param_line,
                    )
                }
            };
            sym.set_register(register);
            sym.set_as_parameter();
            sym.set_initialized();
            sym
        };

        // non-static methods take `this` first, synthesized unless provided
        if is_method && !is_static_method && parameters.is_empty() {
            formal_parameters.push(classify(
                "this",
                this_type.clone(),
                line,
                &mut next_int,
                &mut next_float,
                &mut stack_parameters,
                &mut stack_cursor,
            ));
            parameter_defaults.push(None);
            has_this = true;
        }

        for (i, param) in parameters.iter().enumerate() {
            if i == 0 && is_method && !has_this {
                if param.name == "this" {
                    let t = &param.data_type;
                    let this_ok = matches!(t.primary(), Primary::Reference | Primary::Ptr)
                        && t.subtype().is_some_and(|s| {
                            s.primary() == Primary::Struct
                                && s.struct_name() == Some(scope_name)
                        });
                    if !this_ok {
                        return Err(CompilerError::new(
                            format!(
                                "Expected 'this' parameter to have type of ptr< {scope_name} > or ref< {scope_name} >"
                            ),
                            codes::INCORRECT_THIS_TYPE,
                            param.line,
                        ));
                    }
                    has_this = true;
                } else if !is_static_method {
                    formal_parameters.push(classify(
                        "this",
                        this_type.clone(),
                        line,
                        &mut next_int,
                        &mut next_float,
                        &mut stack_parameters,
                        &mut stack_cursor,
                    ));
                    parameter_defaults.push(None);
                    has_this = true;
                }
            }

            formal_parameters.push(classify(
                &param.name,
                param.data_type.clone(),
                param.line,
                &mut next_int,
                &mut next_float,
                &mut stack_parameters,
                &mut stack_cursor,
            ));
            parameter_defaults.push(param.default_value.clone());
        }

        if is_static_method && parameters.first().is_some_and(|p| p.name == "this") {
            return Err(CompilerError::new(
                "Cannot have 'this' parameter for static member functions",
                codes::ILLEGAL_THIS_PARAMETER,
                line,
            ));
        }

        let mut arg_registers = crate::registers::RegisterFile::new();
        for param in &formal_parameters {
            if let Some(register) = param.register() {
                arg_registers.set(register, Some(param.name()));
            }
        }

        let signature = FunctionSignature {
            formal_parameters,
            parameter_defaults,
            arg_registers,
            calling_convention,
        };

        Ok(Symbol::function(
            symbol_name,
            scope_name,
            scope_level,
            return_type.clone(),
            signature,
            defined,
            line,
        ))
    }

    /// Generates the code for a function definition: label, parameter
    /// spills, and the compiled body under a fresh register context.
    pub(crate) fn define_function(
        &mut self,
        definition: &FunctionDefinition,
    ) -> Result<String, CompilerError> {
        let func_sym = self.create_function_symbol(
            &definition.name,
            &definition.return_type,
            &definition.formal_parameters,
            !definition.return_type.qualities().is_extern(),
            true,
            GLOBAL_SCOPE,
            0,
            false,
            definition.line,
        )?;

        let signature = func_sym
            .signature()
            .expect("create_function_symbol builds function symbols")
            .clone();
        if signature.calling_convention != CallingConvention::Sincall {
            return Err(CompilerError::new(
                "Currently, defining non-sincall functions is not supported",
                codes::UNSUPPORTED_FEATURE,
                definition.line,
            ));
        }

        self.add_symbol(func_sym.clone(), definition.line)?;

        let inner_scope = inner_scope_name(GLOBAL_SCOPE, &definition.name);
        self.compile_function_body(&func_sym, &inner_scope, &definition.procedure)
    }

    /// Compiles a struct method whose symbol was built during the struct
    /// definition. The caller has already switched scope to the struct.
    pub(crate) fn define_method(
        &mut self,
        struct_name: &str,
        definition: &FunctionDefinition,
    ) -> Result<String, CompilerError> {
        let method_sym = {
            let info = self.get_struct_info(struct_name, definition.line)?;
            info.member(&definition.name)
                .filter(|m| m.is_function())
                .cloned()
                .ok_or_else(|| {
                    CompilerError::new(
                        "Expected to find member function",
                        codes::INVALID_SYMBOL_TYPE,
                        definition.line,
                    )
                })?
        };

        // methods are also reachable through the symbol table
        self.add_symbol(method_sym.clone(), definition.line)?;

        let inner_scope = inner_scope_name(struct_name, &definition.name);
        self.compile_function_body(&method_sym, &inner_scope, &definition.procedure)
    }

    /// The body compilation shared by functions and methods: emit the label,
    /// bind parameters into the new frame, compile the block, restore state.
    fn compile_function_body(
        &mut self,
        func_sym: &Symbol,
        inner_scope: &str,
        procedure: &[Statement],
    ) -> Result<String, CompilerError> {
        let signature = func_sym
            .signature()
            .expect("function symbols always carry a signature")
            .clone();

        let previous_scope_name =
            std::mem::replace(&mut self.current_scope_name, inner_scope.to_string());
        let previous_scope_level = self.current_scope_level;
        let previous_max_offset = self.max_offset;
        self.current_scope_level = 1;

        // register parameters also get stack slots so taking their address
        // or spilling works; the cursor picks up where the parameters end
        // (stack-passed parameters live above the frame base and don't count)
        let params_end = signature
            .formal_parameters
            .iter()
            .map(Symbol::stack_offset)
            .filter(|&offset| offset > 0)
            .max()
            .unwrap_or(8);
        self.max_offset = if signature.formal_parameters.is_empty() {
            0
        } else {
            params_end
        };

        for param in &signature.formal_parameters {
            self.add_symbol(param.clone(), param.line_defined())?;
        }

        self.reg_stack.push(signature.arg_registers.clone());

        let mut code = String::new();
        let _ = writeln!(code, "{}:", func_sym.name());

        if params_end > 8 {
            let _ = writeln!(code, "\tsub rsp, {}", params_end - 8);
        }
        for param in &signature.formal_parameters {
            let Some(register) = param.register() else {
                continue;
            };
            let t = param.data_type();
            let instruction = if t.primary() == Primary::Float {
                if t.width() == widths::DOUBLE { "movsd" } else { "movss" }
            } else {
                "mov"
            };
            let _ = writeln!(
                code,
                "\t{instruction} [rbp - {}], {}",
                param.stack_offset(),
                register.name_for_type(t)
            );
        }

        let body = self.compile_ast(procedure, Some(func_sym))?;
        code.push_str(&body);

        self.reg_stack.pop();
        self.current_scope_name = previous_scope_name;
        self.current_scope_level = previous_scope_level;
        self.max_offset = previous_max_offset;

        Ok(code)
    }

    /// Generates a call through the `@name(args)` syntax. The returned count
    /// is 1 when the return value owns a reference the caller must release.
    pub(crate) fn call_function(
        &mut self,
        name: &str,
        args: &[Expression],
        line: u32,
        allow_void: bool,
    ) -> Result<(String, usize), CompilerError> {
        let func_sym = self.lookup(name, line)?;
        if !func_sym.is_function() {
            return Err(CompilerError::new(
                format!("'{name}' is not a function"),
                codes::INVALID_SYMBOL_TYPE,
                line,
            ));
        }

        let signature = func_sym
            .signature()
            .expect("function symbols always carry a signature");
        if signature.calling_convention != CallingConvention::Sincall {
            return Err(CompilerError::new(
                "Currently, SINCALL is the only available calling convention",
                codes::UNSUPPORTED_FEATURE,
                line,
            ));
        }

        let return_type = func_sym.data_type().clone();
        if !allow_void && return_type.primary() == Primary::Void {
            return Err(CompilerError::void_type(line));
        }

        let code = self.sincall(&func_sym, args, line)?;
        let count = usize::from(return_type.must_free());
        Ok((code, count))
    }

    /// The SINCALL caller sequence: preserve in-use registers, push spilled
    /// arguments (in reverse), establish the callee frame, place register
    /// arguments, call, and unwind.
    pub(crate) fn sincall(
        &mut self,
        func_sym: &Symbol,
        args: &[Expression],
        line: u32,
    ) -> Result<String, CompilerError> {
        let signature = func_sym
            .signature()
            .expect("function symbols always carry a signature")
            .clone();
        let formals = &signature.formal_parameters;

        if args.len() > formals.len() {
            return Err(CompilerError::new(
                format!(
                    "Function '{}' takes {} argument(s), but {} were supplied",
                    func_sym.name(),
                    formals.len(),
                    args.len()
                ),
                codes::SIGNATURE,
                line,
            ));
        }

        // fill in trailing defaults; a missing argument without a default is
        // a signature mismatch
        let mut effective: Vec<Expression> = args.to_vec();
        for i in args.len()..formals.len() {
            match &signature.parameter_defaults[i] {
                Some(default) => effective.push(default.clone()),
                None => {
                    return Err(CompilerError::new(
                        format!(
                            "Function '{}' takes {} argument(s), but {} were supplied",
                            func_sym.name(),
                            formals.len(),
                            args.len()
                        ),
                        codes::SIGNATURE,
                        line,
                    ));
                }
            }
        }

        let mut code = String::new();
        code.push_str(&self.push_used_registers(false));

        // spilled arguments go above the new frame base, last first
        let spilled: Vec<usize> = (0..formals.len())
            .filter(|&i| formals[i].register().is_none())
            .collect();
        for &i in spilled.iter().rev() {
            let formal = &formals[i];
            let arg_type = self.expression_type(&effective[i], line)?;
            if !arg_type.is_compatible(formal.data_type()) {
                return Err(CompilerError::new(
                    "Argument type does not match the function signature",
                    codes::SIGNATURE,
                    line,
                ));
            }
            let (arg_code, _) =
                self.evaluate_expression(&effective[i], line, Some(formal.data_type()))?;
            code.push_str(&arg_code);
            if formal.data_type().primary() == Primary::Float {
                let _ = writeln!(code, "\tsub rsp, 8");
                let _ = writeln!(code, "\tmovsd [rsp], xmm0");
            } else {
                let _ = writeln!(code, "\tpush rax");
            }
        }

        let _ = writeln!(code, "\tpushq rbp");
        let _ = writeln!(code, "\tmov rbp, rsp");

        // register arguments: evaluate left to right, parking each result on
        // the stack so later evaluations cannot clobber it, then pop into the
        // assigned registers in reverse
        let in_registers: Vec<usize> = (0..formals.len())
            .filter(|&i| formals[i].register().is_some())
            .collect();
        for &i in &in_registers {
            let formal = &formals[i];
            let arg_type = self.expression_type(&effective[i], line)?;
            if !arg_type.is_compatible(formal.data_type()) {
                return Err(CompilerError::new(
                    "Argument type does not match the function signature",
                    codes::SIGNATURE,
                    line,
                ));
            }
            let (arg_code, _) =
                self.evaluate_expression(&effective[i], line, Some(formal.data_type()))?;
            code.push_str(&arg_code);
            if formal.data_type().primary() == Primary::Float {
                let _ = writeln!(code, "\tsub rsp, 8");
                let _ = writeln!(code, "\tmovsd [rsp], xmm0");
            } else {
                let _ = writeln!(code, "\tpush rax");
            }
        }
        for &i in in_registers.iter().rev() {
            let formal = &formals[i];
            let register = formal
                .register()
                .expect("in_registers only holds register parameters");
            if formal.data_type().primary() == Primary::Float {
                let _ = writeln!(code, "\tmovsd {}, [rsp]", register.name());
                let _ = writeln!(code, "\tadd rsp, 8");
            } else {
                let _ = writeln!(code, "\tpop {}", register.name());
            }
        }

        let _ = writeln!(code, "\tcall {}", func_sym.name());

        let _ = writeln!(code, "\tmov rsp, rbp");
        let _ = writeln!(code, "\tpopq rbp");
        if !spilled.is_empty() {
            let _ = writeln!(code, "\tadd rsp, {}", 8 * spilled.len());
        }

        code.push_str(&self.pop_used_registers(false));

        Ok(code)
    }

    /// A return statement: check the type against the signature, evaluate
    /// into RAX/XMM0, release the function's managed locals, and return.
    pub(crate) fn handle_return(
        &mut self,
        value: &Expression,
        signature_sym: &Symbol,
        line: u32,
    ) -> Result<String, CompilerError> {
        let return_type = signature_sym.data_type().clone();
        let value_type = self.expression_type(value, line)?;
        if !value_type.is_compatible(&return_type) {
            return Err(CompilerError::new(
                "Return type does not match the function signature",
                codes::RETURN_MISMATCH,
                line,
            ));
        }

        let mut code = String::new();
        let (value_code, _) = self.evaluate_expression(value, line, Some(&return_type))?;
        code.push_str(&value_code);

        // free managed locals across the whole function body, preserving the
        // return value around the calls
        let scope_name = self.current_scope_name.clone();
        let free_code = self.decrement_rc(&scope_name, 1, true)?;
        if !free_code.is_empty() {
            if return_type.primary() == Primary::Float {
                let _ = writeln!(code, "\tsub rsp, 16");
                let _ = writeln!(code, "\tmovdqu [rsp], xmm0");
                code.push_str(&free_code);
                let _ = writeln!(code, "\tmovdqu xmm0, [rsp]");
                let _ = writeln!(code, "\tadd rsp, 16");
            } else {
                let _ = writeln!(code, "\tpush rax");
                code.push_str(&free_code);
                let _ = writeln!(code, "\tpop rax");
            }
        }

        let _ = writeln!(code, "\tret");
        Ok(code)
    }

    /// When the translation unit defines `main`, emit the exported entry
    /// label: preserve argc/argv, bring the runtime up, build the argument
    /// array, call `main`, and tear the runtime down around its return
    /// value.
    pub(crate) fn emit_entry_point(
        &mut self,
        filename: &Path,
    ) -> Result<String, CompilerError> {
        let main_sym = match self.symbols.find("main", GLOBAL_SCOPE) {
            Ok(sym) => sym.clone(),
            Err(_) => {
                // not every file needs an entry point; it might be included
                compiler_note(
                    &format!("No entry point found in file \"{}\"", filename.display()),
                    0,
                );
                return Ok(String::new());
            }
        };

        if !main_sym.is_function() {
            compiler_warning(
                "Found a symbol 'main', but it is not a function",
                codes::MAIN_SIGNATURE,
                main_sym.line_defined(),
            );
            return Ok(String::new());
        }

        if main_sym.data_type().primary() != Primary::Int {
            compiler_warning(
                "Function 'main' should have a return type of 'int'",
                codes::MAIN_SIGNATURE,
                main_sym.line_defined(),
            );
        }

        let signature = main_sym
            .signature()
            .expect("function symbols always carry a signature");
        let args_param = match signature.formal_parameters.as_slice() {
            [single] => single,
            _ => {
                return Err(CompilerError::new(
                    "Function 'main' should include one argument, 'dynamic array<string> args'",
                    codes::MAIN_SIGNATURE,
                    main_sym.line_defined(),
                ));
            }
        };
        let param_type = args_param.data_type();
        let param_ok = param_type.primary() == Primary::Array
            && param_type.qualities().is_dynamic()
            && param_type
                .subtype()
                .is_some_and(|s| s.primary() == Primary::String);
        if !param_ok {
            return Err(CompilerError::new(
                "Function 'main' should include one argument, 'dynamic array<string> args'",
                codes::MAIN_SIGNATURE,
                main_sym.line_defined(),
            ));
        }
        let args_register = args_param
            .register()
            .expect("a dynamic array parameter is register-eligible");

        let mut code = String::new();
        let _ = writeln!(code, "global {}", magic::MAIN_LABEL);
        let _ = writeln!(code, "{}:", magic::MAIN_LABEL);

        // preserve argc and argv
        let _ = writeln!(code, "\tmov r12, rdi");
        let _ = writeln!(code, "\tmov r13, rsi");

        // bring up the runtime under 16-byte alignment
        let _ = writeln!(code, "\tmov rax, rsp");
        let _ = writeln!(code, "\tand rsp, -0x10");
        let _ = writeln!(code, "\tpush rax");
        let _ = writeln!(code, "\tsub rsp, 8");
        let _ = writeln!(code, "\tmov rax, 0");
        let _ = writeln!(code, "\tcall {}", magic::SRE_INIT);
        let _ = writeln!(code, "\tadd rsp, 8");
        let _ = writeln!(code, "\tpop rsp");

        // an array to hold the command-line arguments
        let _ = writeln!(code, "\tmov rsi, 8");
        let _ = writeln!(code, "\tmov rdi, r12");
        code.push_str(&self.call_sincall_subroutine(magic::DYNAMIC_ARRAY_ALLOC));
        let _ = writeln!(code, "\tpush rax");

        // call main itself
        let _ = writeln!(code, "\tmov {}, rax", args_register.name());
        let _ = writeln!(code, "\tpushq rbp");
        let _ = writeln!(code, "\tmov rbp, rsp");
        let _ = writeln!(code, "\tcall {}", main_sym.name());
        let _ = writeln!(code, "\tmov rsp, rbp");
        let _ = writeln!(code, "\tpopq rbp");

        // stash the return value, clean up the runtime, and return it
        let _ = writeln!(code, "\tmov [rsp], rax");
        let _ = writeln!(code, "\tmov rax, rsp");
        let _ = writeln!(code, "\tand rsp, -0x10");
        let _ = writeln!(code, "\tpush rax");
        let _ = writeln!(code, "\tsub rsp, 8");
        let _ = writeln!(code, "\tcall {}", magic::SRE_CLEAN);
        let _ = writeln!(code, "\tadd rsp, 8");
        let _ = writeln!(code, "\tpop rsp");
        let _ = writeln!(code, "\tpop rax");
        let _ = writeln!(code, "\tret");

        Ok(code)
    }
}
