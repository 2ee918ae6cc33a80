use std::fmt::Write as _;

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::symbols::{Symbol, SymbolTable};
use crate::types::{DataType, Primary};

/// The registers available to generated code: 14 general-purpose registers
/// (RSP and RBP are reserved for the stack) plus the first eight SSE
/// registers.
///
/// The declaration order is the allocation order; `Register::iter()` walks it
/// deterministically, which keeps register selection reproducible from run to
/// run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
}

pub const REGISTER_COUNT: usize = 22;

/// Integer registers eligible for SINCALL argument passing, in assignment
/// order.
pub const SINCALL_INT_ARG_REGISTERS: [Register; 6] = [
    Register::Rsi,
    Register::Rdi,
    Register::Rcx,
    Register::Rdx,
    Register::R8,
    Register::R9,
];

/// SSE registers eligible for SINCALL argument passing.
pub const SINCALL_FLOAT_ARG_REGISTERS: [Register; 6] = [
    Register::Xmm0,
    Register::Xmm1,
    Register::Xmm2,
    Register::Xmm3,
    Register::Xmm4,
    Register::Xmm5,
];

impl Register {
    const fn index(self) -> usize {
        match self {
            Register::Rax => 0,
            Register::Rbx => 1,
            Register::Rcx => 2,
            Register::Rdx => 3,
            Register::Rsi => 4,
            Register::Rdi => 5,
            Register::R8 => 6,
            Register::R9 => 7,
            Register::R10 => 8,
            Register::R11 => 9,
            Register::R12 => 10,
            Register::R13 => 11,
            Register::R14 => 12,
            Register::R15 => 13,
            Register::Xmm0 => 14,
            Register::Xmm1 => 15,
            Register::Xmm2 => 16,
            Register::Xmm3 => 17,
            Register::Xmm4 => 18,
            Register::Xmm5 => 19,
            Register::Xmm6 => 20,
            Register::Xmm7 => 21,
        }
    }

    pub fn is_xmm(self) -> bool {
        matches!(
            self,
            Register::Xmm0
                | Register::Xmm1
                | Register::Xmm2
                | Register::Xmm3
                | Register::Xmm4
                | Register::Xmm5
                | Register::Xmm6
                | Register::Xmm7
        )
    }

    pub fn is_integer(self) -> bool {
        !self.is_xmm()
    }

    /// Integer registers usable as scratch while RAX and RBX are serving as
    /// the evaluator's working registers.
    pub fn iter_integer_scratch() -> impl Iterator<Item = Register> {
        Register::iter()
            .filter(|&r| r.is_integer() && !matches!(r, Register::Rax | Register::Rbx))
    }

    /// The full 64-bit register name.
    pub fn name(self) -> &'static str {
        match self {
            Register::Rax => "rax",
            Register::Rbx => "rbx",
            Register::Rcx => "rcx",
            Register::Rdx => "rdx",
            Register::Rsi => "rsi",
            Register::Rdi => "rdi",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::R10 => "r10",
            Register::R11 => "r11",
            Register::R12 => "r12",
            Register::R13 => "r13",
            Register::R14 => "r14",
            Register::R15 => "r15",
            Register::Xmm0 => "xmm0",
            Register::Xmm1 => "xmm1",
            Register::Xmm2 => "xmm2",
            Register::Xmm3 => "xmm3",
            Register::Xmm4 => "xmm4",
            Register::Xmm5 => "xmm5",
            Register::Xmm6 => "xmm6",
            Register::Xmm7 => "xmm7",
        }
    }

    /// The register name sized for a data width in bytes. SSE registers have
    /// only one name regardless of width.
    pub fn name_for_width(self, width: usize) -> &'static str {
        if self.is_xmm() {
            return self.name();
        }

        match width {
            1 => match self {
                Register::Rax => "al",
                Register::Rbx => "bl",
                Register::Rcx => "cl",
                Register::Rdx => "dl",
                Register::Rsi => "sil",
                Register::Rdi => "dil",
                Register::R8 => "r8b",
                Register::R9 => "r9b",
                Register::R10 => "r10b",
                Register::R11 => "r11b",
                Register::R12 => "r12b",
                Register::R13 => "r13b",
                Register::R14 => "r14b",
                Register::R15 => "r15b",
                _ => unreachable!("xmm handled above"),
            },
            2 => match self {
                Register::Rax => "ax",
                Register::Rbx => "bx",
                Register::Rcx => "cx",
                Register::Rdx => "dx",
                Register::Rsi => "si",
                Register::Rdi => "di",
                Register::R8 => "r8w",
                Register::R9 => "r9w",
                Register::R10 => "r10w",
                Register::R11 => "r11w",
                Register::R12 => "r12w",
                Register::R13 => "r13w",
                Register::R14 => "r14w",
                Register::R15 => "r15w",
                _ => unreachable!("xmm handled above"),
            },
            4 => match self {
                Register::Rax => "eax",
                Register::Rbx => "ebx",
                Register::Rcx => "ecx",
                Register::Rdx => "edx",
                Register::Rsi => "esi",
                Register::Rdi => "edi",
                Register::R8 => "r8d",
                Register::R9 => "r9d",
                Register::R10 => "r10d",
                Register::R11 => "r11d",
                Register::R12 => "r12d",
                Register::R13 => "r13d",
                Register::R14 => "r14d",
                Register::R15 => "r15d",
                _ => unreachable!("xmm handled above"),
            },
            _ => self.name(),
        }
    }

    /// The register name sized for the given type's width.
    pub fn name_for_type(self, t: &DataType) -> &'static str {
        self.name_for_width(t.width())
    }
}

/// The name of the RAX variant that holds a value of the given width.
pub fn rax_variant_for_width(width: usize) -> &'static str {
    Register::Rax.name_for_width(width)
}

/// Which class of register a value needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegisterClass {
    Integer,
    FloatingPoint,
}

impl RegisterClass {
    /// The register class for a primary type; `None` for types that never
    /// occupy a register of their own (their addresses do instead).
    pub fn for_primary(primary: Primary) -> Option<RegisterClass> {
        match primary {
            Primary::Float => Some(RegisterClass::FloatingPoint),
            Primary::Array | Primary::Struct | Primary::String => None,
            _ => Some(RegisterClass::Integer),
        }
    }

    fn matches(self, register: Register) -> bool {
        match self {
            RegisterClass::Integer => register.is_integer(),
            RegisterClass::FloatingPoint => register.is_xmm(),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Slot {
    in_use: bool,
    ever_used: bool,
    /// Mangled name of the symbol currently held, if any.
    owner: Option<String>,
}

/// Tracks which registers are in use in the current scope, and which symbol
/// (if any) each one holds. One of these is pushed per function scope.
#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    slots: [Slot; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_use(&self, register: Register) -> bool {
        self.slots[register.index()].in_use
    }

    pub fn was_used(&self, register: Register) -> bool {
        self.slots[register.index()].ever_used
    }

    /// Marks a register as in use, optionally binding the symbol it holds.
    pub fn set(&mut self, register: Register, owner: Option<&str>) {
        let slot = &mut self.slots[register.index()];
        slot.in_use = true;
        slot.ever_used = true;
        if let Some(name) = owner {
            slot.owner = Some(name.to_string());
        }
    }

    /// Marks a register as available and unbinds any owning symbol.
    pub fn clear(&mut self, register: Register) {
        let slot = &mut self.slots[register.index()];
        slot.in_use = false;
        slot.owner = None;
    }

    pub fn owner(&self, register: Register) -> Option<&str> {
        self.slots[register.index()].owner.as_deref()
    }

    pub fn clear_owner(&mut self, register: Register) {
        self.slots[register.index()].owner = None;
    }

    /// The first register of the requested class not currently in use.
    pub fn get_available(&self, class: RegisterClass) -> Option<Register> {
        Register::iter().find(|&r| class.matches(r) && !self.is_in_use(r))
    }

    /// Registers currently in use, in the fixed iteration order.
    pub fn in_use(&self) -> impl Iterator<Item = Register> + '_ {
        Register::iter().filter(|&r| self.is_in_use(r))
    }
}

/// Store a symbol held in a register back into its memory slot.
pub fn store_symbol(sym: &Symbol) -> String {
    let mut code = String::new();

    let Some(register) = sym.register() else {
        return code;
    };

    let dt = sym.data_type();
    let store_instruction = if dt.primary() == Primary::Float {
        if dt.qualities().is_long() { "movsd" } else { "movss" }
    } else {
        "mov"
    };
    let reg_name = register.name_for_type(dt);

    if dt.qualities().is_static() {
        let _ = writeln!(code, "\tlea rax, [{}]", sym.name());
        let _ = writeln!(code, "\t{store_instruction} [rax], {reg_name}");
    } else if dt.qualities().is_dynamic() {
        let _ = writeln!(code, "\tmov rax, [rbp - {}]", sym.stack_offset());
        let _ = writeln!(code, "\t{store_instruction} [rax], {reg_name}");
    } else if sym.stack_offset() < 0 {
        let _ = writeln!(
            code,
            "\t{store_instruction} [rbp + {}], {reg_name}",
            -sym.stack_offset()
        );
    } else {
        let _ = writeln!(
            code,
            "\t{store_instruction} [rbp - {}], {reg_name}",
            sym.stack_offset()
        );
    }

    code
}

/// Load a symbol from its memory slot into the given register.
pub fn load_symbol(sym: &Symbol, register: Register) -> String {
    let mut code = String::new();

    let dt = sym.data_type();
    let load_instruction = if dt.primary() == Primary::Float {
        if dt.qualities().is_long() { "movsd" } else { "movss" }
    } else {
        "mov"
    };
    let reg_name = register.name_for_type(dt);

    if dt.qualities().is_static() {
        let _ = writeln!(code, "\tlea rax, [{}]", sym.name());
        let _ = writeln!(code, "\t{load_instruction} {reg_name}, [rax]");
    } else if sym.stack_offset() < 0 {
        let _ = writeln!(
            code,
            "\t{load_instruction} {reg_name}, [rbp + {}]",
            -sym.stack_offset()
        );
    } else {
        let _ = writeln!(
            code,
            "\t{load_instruction} {reg_name}, [rbp - {}]",
            sym.stack_offset()
        );
    }

    code
}

/// Preserve every register currently in use ahead of a call or an SRE
/// routine. Registers holding a live symbol are stored back to the symbol's
/// slot (and unbound); anonymous intermediates are pushed. With `ignore_ab`,
/// RAX and RBX are skipped because the evaluator is using them as its working
/// registers.
pub fn push_used(regs: &mut RegisterFile, symbols: &mut SymbolTable, ignore_ab: bool) -> String {
    let mut code = String::new();

    for register in Register::iter() {
        if ignore_ab && matches!(register, Register::Rax | Register::Rbx) {
            continue;
        }
        if !regs.is_in_use(register) {
            continue;
        }

        let owner_name = regs.owner(register).map(str::to_string);
        let mut stored = None;
        if let Some(name) = owner_name
            && let Some(sym) = symbols.find_by_mangled_mut(&name)
        {
            let store = store_symbol(sym);
            sym.set_register(None);
            stored = Some(store);
        }

        match stored {
            Some(stored) => {
                code.push_str(&stored);
                regs.clear(register);
            }
            None => {
                let _ = writeln!(code, "\tpush {register}");
            }
        }
    }

    code
}

/// The mirror of `push_used`: pop, in reverse order, only the registers that
/// were pushed (symbols were stored, not pushed, so they are skipped).
pub fn pop_used(regs: &RegisterFile, ignore_ab: bool) -> String {
    let mut code = String::new();

    let all: Vec<Register> = Register::iter().collect();
    for &register in all.iter().rev() {
        if ignore_ab && matches!(register, Register::Rax | Register::Rbx) {
            continue;
        }
        if regs.is_in_use(register) && regs.owner(register).is_none() {
            let _ = writeln!(code, "\tpop {register}");
        }
    }

    code
}

/// Reconcile register contents when switching between register contexts
/// (e.g. returning from a function scope into its caller). For each register
/// used by both contexts with different symbols, the leaving symbol is stored
/// first (if still accessible from the target scope), then the entering
/// context's symbol is reloaded.
pub fn restore_across_scope(
    leaving: &mut RegisterFile,
    entering: &mut RegisterFile,
    symbols: &mut SymbolTable,
    entering_scope: &str,
    entering_level: u32,
) -> String {
    let mut code = String::new();

    for register in Register::iter() {
        if !leaving.is_in_use(register) {
            continue;
        }

        if entering.is_in_use(register) {
            let leaving_name = leaving.owner(register).map(str::to_string);
            let entering_name = entering.owner(register).map(str::to_string);

            if let (Some(leaving_name), Some(entering_name)) = (leaving_name, entering_name)
                && leaving_name != entering_name
            {
                if let Some(leaving_sym) = symbols.find_by_mangled_mut(&leaving_name)
                    && leaving_sym.is_accessible_from(entering_scope, entering_level)
                {
                    code.push_str(&store_symbol(leaving_sym));
                    leaving_sym.set_register(None);
                }

                if let Some(entering_sym) = symbols.find_by_mangled_mut(&entering_name) {
                    code.push_str(&load_symbol(entering_sym, register));
                    entering_sym.set_register(Some(register));
                }
            }
        } else {
            let contained = leaving.owner(register).map(str::to_string);
            if let Some(name) = contained
                && let Some(sym) = symbols.find_by_mangled_mut(&name)
                && sym.is_accessible_from(entering_scope, entering_level)
            {
                code.push_str(&store_symbol(sym));
                sym.set_register(None);
            }
            leaving.clear(register);
        }
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::GLOBAL_SCOPE;

    #[test]
    fn allocation_order_is_stable() {
        let regs = RegisterFile::new();
        assert_eq!(regs.get_available(RegisterClass::Integer), Some(Register::Rax));
        assert_eq!(
            regs.get_available(RegisterClass::FloatingPoint),
            Some(Register::Xmm0)
        );
    }

    #[test]
    fn set_and_clear_round_trip() {
        let mut regs = RegisterFile::new();
        regs.set(Register::Rcx, Some("SIN_x"));
        assert!(regs.is_in_use(Register::Rcx));
        assert_eq!(regs.owner(Register::Rcx), Some("SIN_x"));
        assert_eq!(regs.get_available(RegisterClass::Integer), Some(Register::Rax));

        regs.clear(Register::Rcx);
        assert!(!regs.is_in_use(Register::Rcx));
        assert!(regs.owner(Register::Rcx).is_none());
        assert!(regs.was_used(Register::Rcx));
    }

    #[test]
    fn exhausting_a_class_yields_none() {
        let mut regs = RegisterFile::new();
        for r in Register::iter().filter(|r| r.is_xmm()) {
            regs.set(r, None);
        }
        assert_eq!(regs.get_available(RegisterClass::FloatingPoint), None);
        assert!(regs.get_available(RegisterClass::Integer).is_some());
    }

    #[test]
    fn width_variants() {
        assert_eq!(Register::Rax.name_for_width(1), "al");
        assert_eq!(Register::Rax.name_for_width(2), "ax");
        assert_eq!(Register::Rax.name_for_width(4), "eax");
        assert_eq!(Register::Rax.name_for_width(8), "rax");
        assert_eq!(Register::R10.name_for_width(4), "r10d");
        assert_eq!(Register::Rsi.name_for_width(1), "sil");
        assert_eq!(Register::Xmm3.name_for_width(4), "xmm3");
    }

    #[test]
    fn push_used_stores_symbols_and_pushes_intermediates() {
        let mut symbols = SymbolTable::new();
        let mut offset = 0;
        let sym = Symbol::allocate(
            "x",
            DataType::simple(Primary::Int),
            4,
            "f",
            1,
            &mut offset,
            true,
            1,
        );
        let key = symbols.insert(sym, 1).unwrap();
        symbols
            .find_by_mangled_mut(&key)
            .unwrap()
            .set_register(Some(Register::Rcx));

        let mut regs = RegisterFile::new();
        regs.set(Register::Rcx, Some(&key));
        regs.set(Register::R10, None);

        let code = push_used(&mut regs, &mut symbols, false);
        // the symbol goes back to its slot, the intermediate is pushed
        assert!(code.contains("mov [rbp - 4], ecx"));
        assert!(code.contains("push r10"));
        assert!(symbols.find_by_mangled_mut(&key).unwrap().register().is_none());

        // the mirror pops only what was pushed
        let popped = pop_used(&regs, false);
        assert!(popped.contains("pop r10"));
        assert!(!popped.contains("pop rcx"));
    }

    #[test]
    fn restore_across_scope_reloads_the_entering_context() {
        let mut symbols = SymbolTable::new();
        let mut offset = 0;
        for name in ["caller_val", "callee_val"] {
            let sym = Symbol::allocate(
                name,
                DataType::simple(Primary::Int),
                4,
                GLOBAL_SCOPE,
                0,
                &mut offset,
                true,
                1,
            );
            let key = symbols.insert(sym, 1).unwrap();
            symbols
                .find_by_mangled_mut(&key)
                .unwrap()
                .set_register(Some(Register::R12));
        }

        let mut leaving = RegisterFile::new();
        leaving.set(Register::R12, Some("SIN_callee_val"));
        let mut entering = RegisterFile::new();
        entering.set(Register::R12, Some("SIN_caller_val"));

        let code = restore_across_scope(&mut leaving, &mut entering, &mut symbols, GLOBAL_SCOPE, 0);
        // the leaving symbol is stored, the entering one reloaded
        assert!(code.contains("mov [rbp - 8], r12d"));
        assert!(code.contains("mov r12d, [rbp - 4]"));
    }

    #[test]
    fn aggregates_have_no_register_class() {
        assert_eq!(RegisterClass::for_primary(Primary::Array), None);
        assert_eq!(RegisterClass::for_primary(Primary::Struct), None);
        assert_eq!(RegisterClass::for_primary(Primary::String), None);
        assert_eq!(
            RegisterClass::for_primary(Primary::Ptr),
            Some(RegisterClass::Integer)
        );
    }
}
