use phf::phf_map;

use crate::error::CompilerError;

/// A single quality keyword, as it appears in a declaration.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Quality {
    Const,
    Final,
    Static,
    Dynamic,
    Signed,
    Unsigned,
    Long,
    Short,
    Extern,
    Unmanaged,
    SincallConvention,
    C64Convention,
    WindowsConvention,
}

/// Maps quality keywords to their enum values; the front end looks these up
/// when parsing declarations.
pub static QUALITY_KEYWORDS: phf::Map<&'static str, Quality> = phf_map! {
    "const" => Quality::Const,
    "final" => Quality::Final,
    "static" => Quality::Static,
    "dynamic" => Quality::Dynamic,
    "signed" => Quality::Signed,
    "unsigned" => Quality::Unsigned,
    "long" => Quality::Long,
    "short" => Quality::Short,
    "extern" => Quality::Extern,
    "unmanaged" => Quality::Unmanaged,
    "sincall" => Quality::SincallConvention,
    "c64" => Quality::C64Convention,
    "windows" => Quality::WindowsConvention,
};

/// The set of qualities attached to a type.
///
/// Invariants, enforced by `add`:
///   * `const` and `final` are mutually exclusive
///   * `long` and `short` are mutually exclusive
///   * a type is either signed or unsigned, never both
///   * at most one calling-convention marker may be set
///
/// Data is managed unless `unmanaged` was listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Qualities {
    const_q: bool,
    final_q: bool,
    static_q: bool,
    dynamic_q: bool,
    signed_q: bool,
    listed_unsigned: bool,
    long_q: bool,
    short_q: bool,
    extern_q: bool,
    managed: bool,
    sincall_con: bool,
    c64_con: bool,
    windows_con: bool,
}

impl Default for Qualities {
    fn default() -> Self {
        Self {
            const_q: false,
            final_q: false,
            static_q: false,
            dynamic_q: false,
            signed_q: false,
            listed_unsigned: false,
            long_q: false,
            short_q: false,
            extern_q: false,
            managed: true,
            sincall_con: false,
            c64_con: false,
            windows_con: false,
        }
    }
}

impl Qualities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a quality set from listed keywords, failing on the first
    /// conflict. The reported quality is always the one added second.
    pub fn from_list(list: &[Quality], line: u32) -> Result<Self, CompilerError> {
        let mut qualities = Self::new();
        for &quality in list {
            qualities.add(quality, line)?;
        }
        Ok(qualities)
    }

    pub fn is_const(&self) -> bool {
        self.const_q
    }

    pub fn is_final(&self) -> bool {
        self.final_q
    }

    pub fn is_static(&self) -> bool {
        self.static_q
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic_q
    }

    pub fn is_signed(&self) -> bool {
        self.signed_q
    }

    pub fn is_unsigned(&self) -> bool {
        !self.signed_q
    }

    /// Whether a sign quality was explicitly listed (as opposed to the
    /// default sign an `int` picks up).
    pub fn has_sign_quality(&self) -> bool {
        self.signed_q || self.listed_unsigned
    }

    pub fn is_long(&self) -> bool {
        self.long_q
    }

    pub fn is_short(&self) -> bool {
        self.short_q
    }

    pub fn is_extern(&self) -> bool {
        self.extern_q
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn is_sincall(&self) -> bool {
        self.sincall_con
    }

    pub fn is_c64(&self) -> bool {
        self.c64_con
    }

    pub fn is_windows(&self) -> bool {
        self.windows_con
    }

    /// Adds a single quality, raising a quality-conflict error (naming the
    /// quality being added) if it contradicts one already present.
    pub fn add(&mut self, to_add: Quality, line: u32) -> Result<(), CompilerError> {
        match to_add {
            Quality::Const => {
                if self.final_q {
                    return Err(CompilerError::quality_conflict("const", line));
                }
                self.const_q = true;
            }
            Quality::Final => {
                if self.const_q {
                    return Err(CompilerError::quality_conflict("final", line));
                }
                self.final_q = true;
            }
            Quality::Static => self.static_q = true,
            Quality::Dynamic => self.dynamic_q = true,
            Quality::Signed => {
                if self.listed_unsigned {
                    return Err(CompilerError::quality_conflict("signed", line));
                }
                self.signed_q = true;
            }
            Quality::Unsigned => {
                if self.signed_q {
                    return Err(CompilerError::quality_conflict("unsigned", line));
                }
                self.signed_q = false;
                self.listed_unsigned = true;
            }
            Quality::Long => {
                if self.short_q {
                    return Err(CompilerError::quality_conflict("long", line));
                }
                self.long_q = true;
            }
            Quality::Short => {
                if self.long_q {
                    return Err(CompilerError::quality_conflict("short", line));
                }
                self.short_q = true;
            }
            Quality::Extern => self.extern_q = true,
            Quality::Unmanaged => self.managed = false,
            Quality::SincallConvention => {
                if self.c64_con || self.windows_con {
                    return Err(CompilerError::quality_conflict("sincall", line));
                }
                self.sincall_con = true;
            }
            Quality::C64Convention => {
                if self.sincall_con || self.windows_con {
                    return Err(CompilerError::quality_conflict("c64", line));
                }
                self.c64_con = true;
            }
            Quality::WindowsConvention => {
                if self.sincall_con || self.c64_con {
                    return Err(CompilerError::quality_conflict("windows", line));
                }
                self.windows_con = true;
            }
        }
        Ok(())
    }

    /// Merges another quality set into this one, applying the same conflict
    /// rules as `add`.
    pub fn merge(&mut self, other: &Qualities, line: u32) -> Result<(), CompilerError> {
        if other.const_q {
            self.add(Quality::Const, line)?;
        }
        if other.final_q {
            self.add(Quality::Final, line)?;
        }
        if other.static_q {
            self.add(Quality::Static, line)?;
        }
        if other.dynamic_q {
            self.add(Quality::Dynamic, line)?;
        }
        if other.signed_q {
            self.add(Quality::Signed, line)?;
        }
        if other.listed_unsigned {
            self.add(Quality::Unsigned, line)?;
        }
        if other.long_q {
            self.add(Quality::Long, line)?;
        }
        if other.short_q {
            self.add(Quality::Short, line)?;
        }
        if other.extern_q {
            self.add(Quality::Extern, line)?;
        }
        if !other.managed {
            self.add(Quality::Unmanaged, line)?;
        }
        if other.sincall_con {
            self.add(Quality::SincallConvention, line)?;
        }
        if other.c64_con {
            self.add(Quality::C64Convention, line)?;
        }
        if other.windows_con {
            self.add(Quality::WindowsConvention, line)?;
        }
        Ok(())
    }

    pub(super) fn force_signed(&mut self) {
        self.signed_q = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_then_final_names_final() {
        let err = Qualities::from_list(&[Quality::Const, Quality::Final], 3).unwrap_err();
        assert!(err.message().contains("final"));
    }

    #[test]
    fn final_then_const_names_const() {
        let err = Qualities::from_list(&[Quality::Final, Quality::Const], 3).unwrap_err();
        assert!(err.message().contains("const"));
    }

    #[test]
    fn long_and_short_conflict() {
        assert!(Qualities::from_list(&[Quality::Long, Quality::Short], 1).is_err());
        assert!(Qualities::from_list(&[Quality::Short, Quality::Long], 1).is_err());
    }

    #[test]
    fn single_calling_convention_allowed() {
        assert!(Qualities::from_list(&[Quality::SincallConvention], 1).is_ok());
        assert!(
            Qualities::from_list(&[Quality::SincallConvention, Quality::C64Convention], 1).is_err()
        );
    }

    #[test]
    fn managed_by_default() {
        let q = Qualities::new();
        assert!(q.is_managed());
        let mut q = Qualities::new();
        q.add(Quality::Unmanaged, 1).unwrap();
        assert!(!q.is_managed());
    }

    #[test]
    fn keyword_table_round_trips() {
        assert_eq!(QUALITY_KEYWORDS.get("const"), Some(&Quality::Const));
        assert_eq!(QUALITY_KEYWORDS.get("unsigned"), Some(&Quality::Unsigned));
        assert_eq!(QUALITY_KEYWORDS.get("windows"), Some(&Quality::WindowsConvention));
        assert!(QUALITY_KEYWORDS.get("volatile").is_none());
    }
}
