//! Alignment rules for stored entries.

use std::fmt;
use std::sync::Arc;

use crate::format::MAX_VARIABLE_FIELD_SIZE;
use crate::format::extra::MIN_ALIGNMENT_SEGMENT_SIZE;
use crate::{Error, Result};

/// Alignment meaning "anywhere".
pub const NO_ALIGNMENT: u32 = 1;

/// Largest accepted alignment.
///
/// Padding for an alignment `a` can reach `a + 5` bytes, and it has to fit
/// in a 16-bit extra field.
pub const MAX_ALIGNMENT: u32 = (MAX_VARIABLE_FIELD_SIZE + 1 - MIN_ALIGNMENT_SEGMENT_SIZE) as u32;

/// Decides the alignment of an entry's data from its name.
///
/// Rules are consulted only for entries stored without compression:
/// compressed data cannot be mapped into memory, so aligning it buys nothing.
///
/// ```rust
/// use zfile::layout::{AlignmentRule, NO_ALIGNMENT};
///
/// let rule = AlignmentRule::compose(vec![
///     AlignmentRule::constant_for_suffix(".so", 4096)?,
///     AlignmentRule::constant(4)?,
/// ]);
/// assert_eq!(rule.alignment("lib/arm64/libfoo.so"), 4096);
/// assert_eq!(rule.alignment("res/raw/a.bin"), 4);
/// assert_eq!(AlignmentRule::None.alignment("x"), NO_ALIGNMENT);
/// # Ok::<(), zfile::Error>(())
/// ```
#[derive(Clone, Default)]
pub enum AlignmentRule {
    /// No alignment.
    #[default]
    None,
    /// The same alignment for every entry.
    Constant(u32),
    /// An alignment for names ending in a suffix, none otherwise.
    Suffix {
        /// Suffix to match, case-sensitive.
        suffix: String,
        /// Alignment of matching entries.
        alignment: u32,
    },
    /// The first rule answering something other than [`NO_ALIGNMENT`].
    Compose(Vec<AlignmentRule>),
    /// A caller-provided function.
    Custom(Arc<dyn Fn(&str) -> u32 + Send + Sync>),
}

impl AlignmentRule {
    /// Aligns every entry to `alignment`.
    pub fn constant(alignment: u32) -> Result<Self> {
        check(alignment)?;
        Ok(Self::Constant(alignment))
    }

    /// Aligns entries whose name ends with `suffix` to `alignment`.
    pub fn constant_for_suffix(suffix: impl Into<String>, alignment: u32) -> Result<Self> {
        check(alignment)?;
        Ok(Self::Suffix {
            suffix: suffix.into(),
            alignment,
        })
    }

    /// Combines rules: the first one with an opinion wins.
    pub fn compose(rules: Vec<AlignmentRule>) -> Self {
        Self::Compose(rules)
    }

    /// Wraps a function. Answers outside `1..=MAX_ALIGNMENT` are treated as
    /// [`NO_ALIGNMENT`].
    pub fn custom(f: impl Fn(&str) -> u32 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Returns the alignment for an entry named `name`.
    ///
    /// Variants built directly with an alignment outside
    /// `1..=MAX_ALIGNMENT` answer [`NO_ALIGNMENT`].
    pub fn alignment(&self, name: &str) -> u32 {
        match self.raw_alignment(name) {
            a if check(a).is_ok() => a,
            _ => NO_ALIGNMENT,
        }
    }

    fn raw_alignment(&self, name: &str) -> u32 {
        match self {
            Self::None => NO_ALIGNMENT,
            Self::Constant(alignment) => *alignment,
            Self::Suffix { suffix, alignment } => {
                if name.ends_with(suffix.as_str()) {
                    *alignment
                } else {
                    NO_ALIGNMENT
                }
            }
            Self::Compose(rules) => rules
                .iter()
                .map(|r| r.alignment(name))
                .find(|&a| a != NO_ALIGNMENT)
                .unwrap_or(NO_ALIGNMENT),
            Self::Custom(f) => f(name),
        }
    }
}

impl fmt::Debug for AlignmentRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Constant(a) => f.debug_tuple("Constant").field(a).finish(),
            Self::Suffix { suffix, alignment } => f
                .debug_struct("Suffix")
                .field("suffix", suffix)
                .field("alignment", alignment)
                .finish(),
            Self::Compose(rules) => f.debug_tuple("Compose").field(rules).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn check(alignment: u32) -> Result<()> {
    if alignment == 0 || alignment > MAX_ALIGNMENT {
        return Err(Error::invalid_argument(format!(
            "alignment must be between 1 and {}, got {}",
            MAX_ALIGNMENT, alignment
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_alignment() {
        assert!(AlignmentRule::constant(0).is_err());
        assert!(AlignmentRule::constant(65536).is_err());
        assert!(AlignmentRule::constant_for_suffix(".so", 0).is_err());
        assert!(AlignmentRule::constant(MAX_ALIGNMENT).is_ok());
    }

    #[test]
    fn test_rejects_alignment_whose_padding_overflows_extra() {
        for alignment in [MAX_ALIGNMENT + 1, 65535] {
            let err = AlignmentRule::constant(alignment).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{:?}", err);
            let err = AlignmentRule::constant_for_suffix(".so", alignment).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{:?}", err);
        }
        assert_eq!(AlignmentRule::Constant(65535).alignment("x"), NO_ALIGNMENT);
    }

    #[test]
    fn test_max_alignment_padding_fits() {
        use crate::format::extra::{ExtraField, alignment_padding};

        let worst = (0..u64::from(MAX_ALIGNMENT))
            .map(|offset| alignment_padding(offset, u64::from(MAX_ALIGNMENT)))
            .max()
            .unwrap();
        let field = ExtraField::default()
            .with_alignment_padding(MAX_ALIGNMENT as u16, worst)
            .unwrap();
        assert!(field.size() <= MAX_VARIABLE_FIELD_SIZE);
    }

    #[test]
    fn test_suffix() {
        let rule = AlignmentRule::constant_for_suffix(".so", 4096).unwrap();
        assert_eq!(rule.alignment("lib/x86/libz.so"), 4096);
        assert_eq!(rule.alignment("lib/x86/libz.so.txt"), NO_ALIGNMENT);
    }

    #[test]
    fn test_compose_first_opinion_wins() {
        let rule = AlignmentRule::compose(vec![
            AlignmentRule::None,
            AlignmentRule::constant_for_suffix(".arsc", 8).unwrap(),
            AlignmentRule::constant(4).unwrap(),
        ]);
        assert_eq!(rule.alignment("resources.arsc"), 8);
        assert_eq!(rule.alignment("classes.dex"), 4);
        assert_eq!(AlignmentRule::compose(Vec::new()).alignment("x"), NO_ALIGNMENT);
    }

    #[test]
    fn test_custom_out_of_range() {
        let rule = AlignmentRule::custom(|name| if name.starts_with("big") { 1 << 20 } else { 16 });
        assert_eq!(rule.alignment("big.bin"), NO_ALIGNMENT);
        assert_eq!(rule.alignment("small.bin"), 16);
    }
}
