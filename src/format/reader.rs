//! Little-endian reading and writing helpers for zip records.

use std::io::{self, Read};

/// Reads a single byte.
pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads an unsigned 16-bit little-endian integer.
pub fn read_u16_le<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads an unsigned 32-bit little-endian integer.
pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads exact number of bytes into a new vector.
pub fn read_bytes<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Appends an unsigned 16-bit little-endian integer.
pub fn write_u16_le(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Appends an unsigned 32-bit little-endian integer.
pub fn write_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Reads a little-endian `u16` at `pos` of `data`, if it is in bounds.
pub fn u16_at(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Reads a little-endian `u32` at `pos` of `data`, if it is in bounds.
pub fn u32_at(data: &[u8], pos: usize) -> Option<u32> {
    let bytes = data.get(pos..pos.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_u16_le() {
        let data = [0x01, 0x02];
        let mut cursor = Cursor::new(&data);
        assert_eq!(read_u16_le(&mut cursor).unwrap(), 0x0201);
    }

    #[test]
    fn test_read_u32_le() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut cursor = Cursor::new(&data);
        assert_eq!(read_u32_le(&mut cursor).unwrap(), 0x04030201);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0x01];
        let mut cursor = Cursor::new(&data);
        assert!(read_u16_le(&mut cursor).is_err());
    }

    #[test]
    fn test_write_helpers() {
        let mut out = Vec::new();
        write_u16_le(&mut out, 0x0201);
        write_u32_le(&mut out, 0x06054b50);
        assert_eq!(out, [0x01, 0x02, b'P', b'K', 0x05, 0x06]);
    }

    #[test]
    fn test_at_helpers() {
        let data = [0x50, 0x4b, 0x03, 0x04, 0x0a];
        assert_eq!(u32_at(&data, 0), Some(0x04034b50));
        assert_eq!(u16_at(&data, 3), Some(0x0a04));
        assert_eq!(u16_at(&data, 4), None);
        assert_eq!(u32_at(&data, usize::MAX), None);
    }

    #[test]
    fn test_read_bytes() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut cursor = Cursor::new(&data);
        let result = read_bytes(&mut cursor, 3).unwrap();
        assert_eq!(result, vec![0x01, 0x02, 0x03]);
        assert_eq!(read_u8(&mut cursor).unwrap(), 0x04);
    }
}
