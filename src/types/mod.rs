use std::fmt::Write as _;

use crate::ast::Expression;
use crate::error::{CompilerError, codes, compiler_note, warn_or_error};
use crate::options::Mode;
use crate::registers::rax_variant_for_width;

pub mod qualities;

pub use qualities::{QUALITY_KEYWORDS, Qualities, Quality};

/// Widths of the fixed-size types, in bytes.
pub mod widths {
    pub const BOOL: usize = 1;
    pub const CHAR: usize = 1;
    pub const SHORT: usize = 2;
    pub const INT: usize = 4;
    pub const LONG: usize = 8;
    pub const FLOAT: usize = 4;
    pub const DOUBLE: usize = 8;
    pub const HALF: usize = 2;
    pub const PTR: usize = 8;
}

/// The primary type of a SIN value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Primary {
    Void,
    Char,
    Int,
    Float,
    Bool,
    String,
    Ptr,
    Reference,
    Raw,
    Array,
    Tuple,
    Struct,
}

/// A complete SIN data type: primary, contained types (the subtype for
/// pointers/references/arrays, the ordered member types for tuples), the
/// quality set, and the computed width.
///
/// The width is 0 for `void` and for struct/array types whose layout has not
/// been resolved yet; a `dynamic`-qualified type is always pointer-width.
#[derive(Clone, Debug)]
pub struct DataType {
    primary: Primary,
    contained: Vec<DataType>,
    qualities: Qualities,
    array_length: usize,
    array_length_expression: Option<Box<Expression>>,
    struct_name: Option<String>,
    width: usize,
}

// Type equality compares the primary and the contained types; qualities and
// resolved widths do not participate (`long int` and `int` are the same type
// at different widths).
impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        self.primary == other.primary
            && self.contained == other.contained
            && self.struct_name == other.struct_name
    }
}

impl Eq for DataType {}

impl From<Primary> for DataType {
    fn from(primary: Primary) -> Self {
        DataType::simple(primary)
    }
}

impl DataType {
    pub fn simple(primary: Primary) -> Self {
        Self::construct(primary, Vec::new(), Qualities::new(), None, None)
    }

    pub fn with_qualities(primary: Primary, qualities: Qualities) -> Self {
        Self::construct(primary, Vec::new(), qualities, None, None)
    }

    /// A pointer, reference, or array over `subtype`.
    pub fn with_subtype(primary: Primary, subtype: DataType, qualities: Qualities) -> Self {
        Self::construct(primary, vec![subtype], qualities, None, None)
    }

    pub fn tuple(contained: Vec<DataType>, qualities: Qualities) -> Self {
        Self::construct(Primary::Tuple, contained, qualities, None, None)
    }

    pub fn structure(struct_name: impl Into<String>, qualities: Qualities) -> Self {
        Self::construct(
            Primary::Struct,
            Vec::new(),
            qualities,
            None,
            Some(struct_name.into()),
        )
    }

    pub fn array_of(
        subtype: DataType,
        qualities: Qualities,
        length_expression: Option<Expression>,
    ) -> Self {
        Self::construct(
            Primary::Array,
            vec![subtype],
            qualities,
            length_expression.map(Box::new),
            None,
        )
    }

    fn construct(
        primary: Primary,
        contained: Vec<DataType>,
        mut qualities: Qualities,
        array_length_expression: Option<Box<Expression>>,
        struct_name: Option<String>,
    ) -> Self {
        // ints are signed unless 'unsigned' was listed; floats are always signed
        if (primary == Primary::Int && !qualities.has_sign_quality()) || primary == Primary::Float {
            qualities.force_signed();
        }

        let mut data_type = Self {
            primary,
            contained,
            qualities,
            array_length: 0,
            array_length_expression,
            struct_name,
            width: 0,
        };
        data_type.set_width();
        data_type
    }

    fn set_width(&mut self) {
        // all dynamic memory is accessed through a pointer
        if self.qualities.is_dynamic() {
            self.width = widths::PTR;
            return;
        }

        self.width = match self.primary {
            Primary::Int => {
                if self.qualities.is_long() {
                    widths::LONG
                } else if self.qualities.is_short() {
                    widths::SHORT
                } else {
                    widths::INT
                }
            }
            Primary::Float => {
                if self.qualities.is_long() {
                    widths::DOUBLE
                } else if self.qualities.is_short() {
                    widths::HALF
                } else {
                    widths::FLOAT
                }
            }
            Primary::Bool => widths::BOOL,
            Primary::Char => widths::CHAR,
            Primary::Ptr | Primary::Reference | Primary::String => widths::PTR,
            Primary::Array => {
                if self.array_length != 0 {
                    let subtype_width = self.contained.first().map_or(0, DataType::width);
                    if subtype_width == 0 {
                        0
                    } else {
                        widths::INT + self.array_length * subtype_width
                    }
                } else {
                    0
                }
            }
            Primary::Tuple => {
                let mut total = 0;
                for t in &self.contained {
                    if t.width() == 0 {
                        total = 0;
                        break;
                    }
                    total += t.width();
                }
                total
            }
            // void is nothing; struct widths live in the struct table until
            // resolved; raw has no storage of its own
            Primary::Void | Primary::Struct | Primary::Raw => 0,
        };
    }

    pub fn primary(&self) -> Primary {
        self.primary
    }

    pub fn subtype(&self) -> Option<&DataType> {
        self.contained.first()
    }

    pub fn contained_types(&self) -> &[DataType] {
        &self.contained
    }

    pub fn qualities(&self) -> &Qualities {
        &self.qualities
    }

    pub fn array_length(&self) -> usize {
        self.array_length
    }

    pub fn array_length_expression(&self) -> Option<&Expression> {
        self.array_length_expression.as_deref()
    }

    pub fn struct_name(&self) -> Option<&str> {
        self.struct_name.as_deref()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn set_primary(&mut self, primary: Primary) {
        self.primary = primary;
        self.set_width();
    }

    /// Records a resolved array element count and recomputes the width.
    pub fn set_array_length(&mut self, length: usize) {
        self.array_length = length;
        self.set_width();
    }

    /// Overrides the computed width; used once a struct's layout is known.
    pub fn set_struct_width(&mut self, width: usize) {
        if self.primary == Primary::Struct && !self.qualities.is_dynamic() {
            self.width = width;
        }
    }

    pub fn add_quality(&mut self, quality: Quality, line: u32) -> Result<(), CompilerError> {
        self.qualities.add(quality, line)?;
        self.set_width();
        Ok(())
    }

    pub fn merge_qualities(&mut self, other: &Qualities, line: u32) -> Result<(), CompilerError> {
        self.qualities.merge(other, line)?;
        self.set_width();
        Ok(())
    }

    /// Whether values of this type live behind a pointer.
    pub fn is_reference_type(&self) -> bool {
        matches!(
            self.primary,
            Primary::String | Primary::Array | Primary::Struct | Primary::Ptr | Primary::Reference
        ) || self.qualities.is_dynamic()
    }

    /// The stack or layout width of one slot of this type: pointer-sized for
    /// data living behind a pointer, the full width otherwise.
    pub fn slot_width(&self) -> usize {
        if self.qualities.is_dynamic()
            || matches!(
                self.primary,
                Primary::Ptr | Primary::Reference | Primary::String
            )
        {
            widths::PTR
        } else {
            self.width
        }
    }

    /// Whether the data owns a reference that must be released when the
    /// symbol dies: anything dynamic, strings, and managed pointers.
    pub fn must_free(&self) -> bool {
        self.qualities.is_dynamic()
            || self.primary == Primary::String
            || (self.primary == Primary::Ptr && self.qualities.is_managed())
    }

    /// Type compatibility:
    ///   * `raw` is compatible with everything
    ///   * pointers with pointers and arrays with arrays compare subtypes
    ///   * otherwise the effective primaries must match, where an array on
    ///     either side is unwrapped one level (array-of-T vs. T)
    pub fn is_compatible(&self, other: &DataType) -> bool {
        if self.primary == Primary::Raw || other.primary == Primary::Raw {
            return true;
        }

        // references dereference implicitly, so ref<T> compares as T
        if self.primary == Primary::Reference && other.primary != Primary::Reference {
            return self.subtype().is_some_and(|s| s.is_compatible(other));
        }
        if other.primary == Primary::Reference && self.primary != Primary::Reference {
            return other.subtype().is_some_and(|s| s.is_compatible(self));
        }

        if (self.primary == Primary::Ptr && other.primary == Primary::Ptr)
            || (self.primary == Primary::Array && other.primary == Primary::Array)
        {
            return match (self.subtype(), other.subtype()) {
                (Some(left), Some(right)) => left.is_compatible(right),
                _ => false,
            };
        }

        let left = if self.primary == Primary::Array {
            self.subtype().map_or(self.primary, DataType::primary)
        } else {
            self.primary
        };
        let right = if other.primary == Primary::Array {
            other.subtype().map_or(other.primary, DataType::primary)
        } else {
            other.primary
        };

        left == right
    }

    pub fn is_valid(&self) -> bool {
        self.primary != Primary::Void || self.contained.is_empty()
    }
}

pub fn is_subscriptable(primary: Primary) -> bool {
    matches!(primary, Primary::Array | Primary::String)
}

/// Whether a value of this type is passed to functions in a register.
/// Aggregates only qualify when dynamic (a pointer is what actually moves).
pub fn can_pass_in_register(t: &DataType) -> bool {
    match t.primary() {
        Primary::Array | Primary::Struct | Primary::Tuple => t.qualities().is_dynamic(),
        _ => true,
    }
}

/// Casting to or from strings, arrays, and pointers is never valid, nor is
/// casting a char to anything but an int.
pub fn is_valid_cast(old_type: &DataType, new_type: &DataType) -> bool {
    !(old_type.primary() == Primary::String
        || old_type.primary() == Primary::Array
        || new_type.primary() == Primary::String
        || new_type.primary() == Primary::Array
        || old_type.primary() == Primary::Ptr
        || new_type.primary() == Primary::Ptr
        || (old_type.primary() == Primary::Char && new_type.primary() != Primary::Int))
}

/// Emits the conversion sequence for a value in RAX/XMM0, leaving the result
/// in RAX or XMM0 per the destination type. Narrowing conversions warn in
/// normal mode and fail in strict mode.
pub fn cast(
    old_type: &DataType,
    new_type: &DataType,
    line: u32,
    mode: Mode,
) -> Result<String, CompilerError> {
    let mut code = String::new();

    if old_type == new_type && old_type.width() == new_type.width() {
        compiler_note("Typecast appears to have no effect", line);
        return Ok(code);
    }

    match new_type.primary() {
        Primary::Bool => {
            if old_type.primary() == Primary::Float {
                // compare against zero in xmm1 and collect the flags
                let (zero, compare) = if old_type.qualities().is_long() {
                    ("xorpd", "comisd")
                } else {
                    ("xorps", "comiss")
                };
                let _ = writeln!(code, "\t{zero} xmm1, xmm1");
                let _ = writeln!(code, "\t{compare} xmm0, xmm1");
            } else {
                // any non-zero value is true
                let _ = writeln!(code, "\tcmp rax, 0x00");
            }
            let _ = writeln!(code, "\tsetne al");
        }
        Primary::Int => match old_type.primary() {
            Primary::Float => {
                if old_type.width() > new_type.width() {
                    warn_or_error(
                        mode,
                        "Attempting to convert floating-point type to a smaller integral type; potential loss of data",
                        codes::WIDTH_MISMATCH,
                        line,
                    )?;
                }
                if old_type.qualities().is_long() {
                    let _ = writeln!(code, "\tcvttsd2si rax, xmm0");
                } else {
                    let _ = writeln!(code, "\tcvttss2si eax, xmm0");
                }
            }
            Primary::Bool => {
                let _ = writeln!(code, "\tcmp al, 0");
                let _ = writeln!(code, "\tsetne al");
                let _ = writeln!(code, "\tmovzx rax, al");
            }
            _ => {
                // sign-extend only when both sides are signed and we widen;
                // everything else is a plain reinterpretation of RAX
                if old_type.qualities().is_signed()
                    && new_type.qualities().is_signed()
                    && old_type.width() < new_type.width()
                {
                    let _ = writeln!(
                        code,
                        "\tmovsx {}, {}",
                        rax_variant_for_width(new_type.width()),
                        rax_variant_for_width(old_type.width())
                    );
                }
            }
        },
        Primary::Float => {
            if old_type.primary() == Primary::Float {
                if old_type.width() < new_type.width() {
                    let _ = writeln!(code, "\tcvtss2sd xmm0, xmm0");
                } else if old_type.width() > new_type.width() {
                    let _ = writeln!(code, "\tcvtsd2ss xmm0, xmm0");
                }
            } else {
                if old_type.primary() == Primary::Bool {
                    let _ = writeln!(code, "\tcmp al, 0");
                    let _ = writeln!(code, "\tsetne al");
                    let _ = writeln!(code, "\tmovzx rax, al");
                } else if old_type.primary() == Primary::Int
                    && old_type.width() > new_type.width()
                {
                    warn_or_error(
                        mode,
                        "Potential data loss when converting integer to floating-point number of smaller width",
                        codes::WIDTH_MISMATCH,
                        line,
                    )?;
                }

                let instruction = if new_type.qualities().is_long() {
                    "cvtsi2sd"
                } else {
                    "cvtsi2ss"
                };
                let _ = writeln!(
                    code,
                    "\t{instruction} xmm0, {}",
                    rax_variant_for_width(old_type.width().max(widths::INT))
                );
            }
        }
        Primary::Char if old_type.primary() == Primary::Int => {
            // only the low byte survives; no code is needed
            if old_type.width() > new_type.width() {
                warn_or_error(
                    mode,
                    "Only the lowest byte will be considered when casting integral types to char",
                    codes::WIDTH_MISMATCH,
                    line,
                )?;
            }
        }
        _ => return Err(CompilerError::invalid_cast(line)),
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_type() -> DataType {
        DataType::simple(Primary::Int)
    }

    fn long_int() -> DataType {
        let mut q = Qualities::new();
        q.add(Quality::Long, 0).unwrap();
        DataType::with_qualities(Primary::Int, q)
    }

    #[test]
    fn widths_follow_modifiers() {
        assert_eq!(int_type().width(), 4);
        assert_eq!(long_int().width(), 8);

        let mut q = Qualities::new();
        q.add(Quality::Short, 0).unwrap();
        assert_eq!(DataType::with_qualities(Primary::Int, q).width(), 2);
        assert_eq!(DataType::with_qualities(Primary::Float, q).width(), 2);

        assert_eq!(DataType::simple(Primary::Bool).width(), 1);
        assert_eq!(DataType::simple(Primary::String).width(), 8);
        assert_eq!(DataType::simple(Primary::Void).width(), 0);
    }

    #[test]
    fn dynamic_forces_pointer_width() {
        let mut q = Qualities::new();
        q.add(Quality::Dynamic, 0).unwrap();
        let t = DataType::array_of(int_type(), q, None);
        assert_eq!(t.width(), 8);
        assert!(t.is_reference_type());
    }

    #[test]
    fn array_width_includes_length_prefix() {
        let mut t = DataType::array_of(int_type(), Qualities::new(), None);
        assert_eq!(t.width(), 0);
        t.set_array_length(3);
        assert_eq!(t.width(), 4 + 3 * 4);
    }

    #[test]
    fn int_defaults_to_signed() {
        assert!(int_type().qualities().is_signed());
        let mut q = Qualities::new();
        q.add(Quality::Unsigned, 0).unwrap();
        assert!(DataType::with_qualities(Primary::Int, q).qualities().is_unsigned());
    }

    #[test]
    fn compatibility_is_symmetric() {
        let cases = [
            (int_type(), long_int()),
            (int_type(), DataType::simple(Primary::Float)),
            (DataType::simple(Primary::String), int_type()),
            (
                DataType::with_subtype(Primary::Ptr, int_type(), Qualities::new()),
                DataType::with_subtype(Primary::Ptr, DataType::simple(Primary::Bool), Qualities::new()),
            ),
        ];
        for (a, b) in &cases {
            assert_eq!(a.is_compatible(b), b.is_compatible(a));
        }
    }

    #[test]
    fn raw_is_compatible_with_everything() {
        let raw = DataType::simple(Primary::Raw);
        for p in [Primary::Int, Primary::String, Primary::Struct, Primary::Void] {
            assert!(raw.is_compatible(&DataType::simple(p)));
            assert!(DataType::simple(p).is_compatible(&raw));
        }
    }

    #[test]
    fn array_compatibility_recurses_on_subtypes() {
        let a = DataType::array_of(int_type(), Qualities::new(), None);
        let b = DataType::array_of(long_int(), Qualities::new(), None);
        let c = DataType::array_of(DataType::simple(Primary::String), Qualities::new(), None);
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
        // array-of-T unwraps against plain T
        assert!(a.is_compatible(&int_type()));
    }

    #[test]
    fn string_casts_are_invalid() {
        let s = DataType::simple(Primary::String);
        assert!(!is_valid_cast(&s, &int_type()));
        assert!(!is_valid_cast(&int_type(), &s));
        assert!(cast(&s, &int_type(), 1, Mode::Normal).is_err());
    }

    #[test]
    fn float_to_int_narrowing_is_strict_error() {
        let mut q = Qualities::new();
        q.add(Quality::Long, 0).unwrap();
        let double = DataType::with_qualities(Primary::Float, q);
        let mut short_q = Qualities::new();
        short_q.add(Quality::Short, 0).unwrap();
        let short_int = DataType::with_qualities(Primary::Int, short_q);

        assert!(cast(&double, &short_int, 1, Mode::Normal).is_ok());
        assert!(cast(&double, &short_int, 1, Mode::Strict).is_err());
    }

    #[test]
    fn widening_signed_cast_sign_extends() {
        let code = cast(&int_type(), &long_int(), 1, Mode::Normal).unwrap();
        assert!(code.contains("movsx rax, eax"));
    }

    #[test]
    fn bool_to_int_zero_extends() {
        let code = cast(&DataType::simple(Primary::Bool), &int_type(), 1, Mode::Normal).unwrap();
        assert!(code.contains("movzx rax, al"));
    }
}
