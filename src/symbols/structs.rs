use std::collections::HashMap;

use crate::error::CompilerError;
use crate::symbols::{Symbol, SymbolTable};

/// Layout and member information for a struct definition. A forward-declared
/// struct has no members and an unknown width until its definition is seen.
#[derive(Clone, Debug)]
pub struct StructInfo {
    name: String,
    /// Members in source order; each carries its offset within the struct in
    /// its `stack_offset` field. Methods are stored as function symbols.
    members: Vec<Symbol>,
    width: usize,
    width_known: bool,
}

impl StructInfo {
    pub fn new(name: impl Into<String>, members: Vec<Symbol>) -> Self {
        let width = members
            .iter()
            .filter(|m| m.is_variable())
            .map(Symbol::reclaimed_width)
            .sum();
        Self {
            name: name.into(),
            members,
            width,
            width_known: true,
        }
    }

    /// A forward declaration: the name is known, the layout is not.
    pub fn forward_declared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            width: 0,
            width_known: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Symbol] {
        &self.members
    }

    pub fn data_member_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_variable()).count()
    }

    /// Finds a member by its source name; method members are stored mangled,
    /// so both forms are accepted.
    pub fn member(&self, name: &str) -> Option<&Symbol> {
        let mangled = SymbolTable::mangled_name(name, &self.name);
        self.members
            .iter()
            .find(|m| m.name() == name || m.name() == mangled)
    }

    /// The struct's width in bytes; 0 if only forward-declared.
    pub fn width(&self) -> usize {
        if self.width_known { self.width } else { 0 }
    }

    pub fn is_width_known(&self) -> bool {
        self.width_known
    }

    /// Data members that hold references needing an RC decrement when an
    /// instance dies.
    pub fn members_to_free(&self) -> Vec<Symbol> {
        self.members
            .iter()
            .filter(|m| m.is_variable() && m.requires_free_on_exit())
            .cloned()
            .collect()
    }
}

/// Struct definitions for the whole translation unit. An entry may be
/// inserted once as forward-declared and once as defined; redefining a
/// completed entry is an error.
#[derive(Debug, Default)]
pub struct StructTable {
    structs: HashMap<String, StructInfo>,
}

impl StructTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.structs.contains_key(name)
    }

    pub fn insert(&mut self, to_add: StructInfo, line: u32) -> Result<(), CompilerError> {
        match self.structs.get(to_add.name()) {
            Some(existing) if existing.is_width_known() => {
                Err(CompilerError::duplicate_definition(to_add.name(), line))
            }
            _ => {
                self.structs.insert(to_add.name().to_string(), to_add);
                Ok(())
            }
        }
    }

    pub fn find(&self, name: &str, line: u32) -> Result<&StructInfo, CompilerError> {
        self.structs
            .get(name)
            .ok_or_else(|| CompilerError::undefined_struct(name, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Primary};

    fn member(name: &str, offset: i64, width_type: Primary) -> Symbol {
        let mut sym = Symbol::new(
            name,
            "point",
            1,
            DataType::simple(width_type),
            offset,
            true,
            1,
        );
        sym.set_initialized();
        sym
    }

    #[test]
    fn width_sums_data_members() {
        let info = StructInfo::new(
            "point",
            vec![member("x", 0, Primary::Int), member("y", 4, Primary::Int)],
        );
        assert_eq!(info.width(), 8);
        assert!(info.is_width_known());
        assert_eq!(info.member("y").unwrap().stack_offset(), 4);
        assert!(info.member("z").is_none());
    }

    #[test]
    fn forward_declaration_then_definition() {
        let mut table = StructTable::new();
        table.insert(StructInfo::forward_declared("node"), 1).unwrap();
        assert_eq!(table.find("node", 1).unwrap().width(), 0);

        table
            .insert(
                StructInfo::new("node", vec![member("next", 0, Primary::Int)]),
                2,
            )
            .unwrap();
        assert!(table.find("node", 2).unwrap().is_width_known());

        // redefinition after a completed entry is an error
        assert!(
            table
                .insert(StructInfo::new("node", Vec::new()), 3)
                .is_err()
        );
    }

    #[test]
    fn unknown_struct_lookup_fails() {
        let table = StructTable::new();
        assert!(table.find("ghost", 4).is_err());
    }
}
