//! Entry name encoding.
//!
//! Zip names are raw bytes. Flag bit 11 marks them as UTF-8; without it the
//! historical encoding is IBM code page 437. In practice many tools write
//! UTF-8 without setting the flag, so unflagged names that are valid UTF-8
//! are read as UTF-8 and only the rest fall back to code page 437.
//!
//! [`EntryName`] keeps the raw bytes next to the decoded string so that a
//! name read from an archive is written back byte for byte.

use std::fmt;

use super::{MAX_VARIABLE_FIELD_SIZE, flags};
use crate::{Error, Result};

/// Code page 437, bytes 0x80 to 0xFF.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// Decodes code page 437 bytes.
pub fn decode_cp437(raw: &[u8]) -> String {
    raw.iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

/// The name of an entry, as stored and as decoded.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EntryName {
    raw: Vec<u8>,
    name: String,
}

impl EntryName {
    /// Creates a name for a new entry, encoded as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the name is empty, longer than
    /// 65535 bytes, or contains a NUL character.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::invalid_argument("entry name must not be empty"));
        }
        if name.len() > MAX_VARIABLE_FIELD_SIZE {
            return Err(Error::invalid_argument(format!(
                "entry name is {} bytes, the limit is {}",
                name.len(),
                MAX_VARIABLE_FIELD_SIZE
            )));
        }
        if name.contains('\0') {
            return Err(Error::invalid_argument("entry name contains a NUL character"));
        }
        Ok(Self {
            raw: name.as_bytes().to_vec(),
            name: name.to_string(),
        })
    }

    /// Decodes a name read from an archive.
    pub fn from_raw(raw: Vec<u8>, general_purpose_flags: u16) -> Self {
        let name = if general_purpose_flags & flags::UTF8 != 0 {
            String::from_utf8_lossy(&raw).into_owned()
        } else {
            match std::str::from_utf8(&raw) {
                Ok(s) => s.to_string(),
                Err(_) => decode_cp437(&raw),
            }
        };
        Self { raw, name }
    }

    /// Returns the decoded name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Returns the bytes written to the archive.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Returns `true` if the name denotes a directory.
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Returns `true` if the UTF-8 flag should be set for this name.
    pub fn needs_utf8_flag(&self) -> bool {
        !self.raw.is_ascii() && std::str::from_utf8(&self.raw).is_ok()
    }
}

impl fmt::Debug for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.name, f)
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_name_validation() {
        assert!(EntryName::new("").is_err());
        assert!(EntryName::new("a\0b").is_err());
        assert!(EntryName::new(&"x".repeat(70_000)).is_err());
        assert!(EntryName::new("dir/file.txt").is_ok());
    }

    #[test]
    fn test_utf8_flag() {
        assert!(!EntryName::new("plain.txt").unwrap().needs_utf8_flag());
        assert!(EntryName::new("café.txt").unwrap().needs_utf8_flag());
    }

    #[test]
    fn test_unflagged_utf8_is_accepted() {
        let name = EntryName::from_raw("ñ/ü.txt".as_bytes().to_vec(), 0);
        assert_eq!(name.as_str(), "ñ/ü.txt");
    }

    #[test]
    fn test_cp437_fallback_keeps_raw() {
        // 0x81 is 'ü' in code page 437 and not valid UTF-8 on its own.
        let raw = vec![b'a', 0x81, b'.', b't'];
        let name = EntryName::from_raw(raw.clone(), 0);
        assert_eq!(name.as_str(), "aü.t");
        assert_eq!(name.raw(), raw.as_slice());
        assert!(!name.needs_utf8_flag());
    }

    #[test]
    fn test_directory() {
        assert!(EntryName::new("dir/").unwrap().is_directory());
        assert!(!EntryName::new("dir/file").unwrap().is_directory());
    }
}
