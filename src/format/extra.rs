//! Extra fields.
//!
//! An extra field is a list of segments, each `id: u16, size: u16` followed by
//! `size` bytes. Some tools write extra fields that do not follow that layout;
//! those are kept as opaque bytes and written back unchanged.
//!
//! Alignment of stored entries is done by padding the local extra field with
//! a segment of id [`ALIGNMENT_SEGMENT_ID`]:
//!
//! ```text
//! +--------+--------+-----------+-------------------+
//! | 0xd935 | size   | alignment | zero padding      |
//! | u16    | u16    | u16       | size - 2 bytes    |
//! +--------+--------+-----------+-------------------+
//! ```

use super::MAX_VARIABLE_FIELD_SIZE;
use super::reader::{u16_at, write_u16_le};
use crate::{Error, Result};

/// Segment id of the alignment padding segment.
pub const ALIGNMENT_SEGMENT_ID: u16 = 0xd935;

/// Smallest alignment segment: header plus the alignment value.
pub const MIN_ALIGNMENT_SEGMENT_SIZE: usize = 6;

/// One segment of an extra field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraSegment {
    /// Alignment padding.
    Alignment {
        /// The alignment the entry data was padded to.
        alignment: u16,
        /// Total size of the segment, header included.
        size: usize,
    },
    /// Any other segment, kept verbatim.
    Raw {
        /// Segment id.
        id: u16,
        /// Segment data.
        data: Vec<u8>,
    },
}

impl ExtraSegment {
    /// Returns the segment id.
    pub fn id(&self) -> u16 {
        match self {
            Self::Alignment { .. } => ALIGNMENT_SEGMENT_ID,
            Self::Raw { id, .. } => *id,
        }
    }

    /// Returns the encoded size, header included.
    pub fn size(&self) -> usize {
        match self {
            Self::Alignment { size, .. } => *size,
            Self::Raw { data, .. } => 4 + data.len(),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Alignment { alignment, size } => {
                write_u16_le(out, ALIGNMENT_SEGMENT_ID);
                write_u16_le(out, (size - 4) as u16);
                write_u16_le(out, *alignment);
                out.resize(out.len() + size - MIN_ALIGNMENT_SEGMENT_SIZE, 0);
            }
            Self::Raw { id, data } => {
                write_u16_le(out, *id);
                write_u16_le(out, data.len() as u16);
                out.extend_from_slice(data);
            }
        }
    }
}

/// The extra field of a local or central header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    /// A well-formed list of segments.
    Segments(Vec<ExtraSegment>),
    /// Bytes that could not be split into segments.
    Opaque(Vec<u8>),
}

impl Default for ExtraField {
    fn default() -> Self {
        Self::Segments(Vec::new())
    }
}

impl ExtraField {
    /// Parses `raw`, keeping it opaque if it is not a list of segments.
    pub fn parse(raw: &[u8]) -> Self {
        let mut segments = Vec::new();
        let mut pos = 0;
        while pos < raw.len() {
            let (Some(id), Some(len)) = (u16_at(raw, pos), u16_at(raw, pos + 2)) else {
                return Self::Opaque(raw.to_vec());
            };
            let start = pos + 4;
            let end = start + len as usize;
            let Some(data) = raw.get(start..end) else {
                return Self::Opaque(raw.to_vec());
            };
            let segment = match (id, u16_at(data, 0)) {
                (ALIGNMENT_SEGMENT_ID, Some(alignment)) => ExtraSegment::Alignment {
                    alignment,
                    size: 4 + data.len(),
                },
                _ => ExtraSegment::Raw {
                    id,
                    data: data.to_vec(),
                },
            };
            segments.push(segment);
            pos = end;
        }
        Self::Segments(segments)
    }

    /// Encodes the field.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Opaque(raw) => raw.clone(),
            Self::Segments(segments) => {
                let mut out = Vec::with_capacity(self.size());
                for segment in segments {
                    segment.encode(&mut out);
                }
                out
            }
        }
    }

    /// Returns the encoded size.
    pub fn size(&self) -> usize {
        match self {
            Self::Opaque(raw) => raw.len(),
            Self::Segments(segments) => segments.iter().map(ExtraSegment::size).sum(),
        }
    }

    /// Returns the segments, or `None` for an opaque field.
    pub fn segments(&self) -> Option<&[ExtraSegment]> {
        match self {
            Self::Segments(segments) => Some(segments),
            Self::Opaque(_) => None,
        }
    }

    /// Returns the first segment with `id`.
    pub fn segment(&self, id: u16) -> Option<&ExtraSegment> {
        self.segments()?.iter().find(|s| s.id() == id)
    }

    /// Returns the field without its alignment segments.
    ///
    /// Opaque fields are returned unchanged.
    pub fn without_alignment(&self) -> Self {
        match self {
            Self::Opaque(raw) => Self::Opaque(raw.clone()),
            Self::Segments(segments) => Self::Segments(
                segments
                    .iter()
                    .filter(|s| s.id() != ALIGNMENT_SEGMENT_ID)
                    .cloned()
                    .collect(),
            ),
        }
    }

    /// Returns the field with an alignment segment of `padding` bytes added.
    ///
    /// A padding of 0 removes alignment instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the field is opaque, if `padding`
    /// is between 1 and 5 bytes, or if the result would not fit in a 16-bit
    /// length.
    pub fn with_alignment_padding(&self, alignment: u16, padding: usize) -> Result<Self> {
        let base = self.without_alignment();
        if padding == 0 {
            return Ok(base);
        }
        let Self::Segments(mut segments) = base else {
            return Err(Error::invalid_argument(
                "cannot add alignment padding to an unparseable extra field",
            ));
        };
        if padding < MIN_ALIGNMENT_SEGMENT_SIZE {
            return Err(Error::invalid_argument(format!(
                "alignment padding of {} bytes is smaller than the {} byte minimum",
                padding, MIN_ALIGNMENT_SEGMENT_SIZE
            )));
        }
        segments.push(ExtraSegment::Alignment {
            alignment,
            size: padding,
        });
        let field = Self::Segments(segments);
        if field.size() > MAX_VARIABLE_FIELD_SIZE {
            return Err(Error::invalid_argument(format!(
                "extra field of {} bytes exceeds {} bytes",
                field.size(),
                MAX_VARIABLE_FIELD_SIZE
            )));
        }
        Ok(field)
    }
}

/// Computes the padding that moves `data_offset` to a multiple of `alignment`.
///
/// The result is 0 or at least [`MIN_ALIGNMENT_SEGMENT_SIZE`], since padding
/// has to fit an alignment segment.
pub fn alignment_padding(data_offset: u64, alignment: u64) -> usize {
    if alignment <= 1 {
        return 0;
    }
    let mut padding = (alignment - data_offset % alignment) % alignment;
    while padding != 0 && padding < MIN_ALIGNMENT_SEGMENT_SIZE as u64 {
        padding += alignment;
    }
    padding as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments() {
        let raw = [0x55, 0x54, 0x05, 0x00, 1, 2, 3, 4, 5, 0x0a, 0x00, 0x00, 0x00];
        let field = ExtraField::parse(&raw);
        let segments = field.segments().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].id(), 0x5455);
        assert_eq!(segments[1].size(), 4);
        assert_eq!(field.encode(), raw);
    }

    #[test]
    fn test_truncated_field_is_opaque() {
        let raw = [0x55, 0x54, 0x09, 0x00, 1, 2];
        let field = ExtraField::parse(&raw);
        assert!(field.segments().is_none());
        assert_eq!(field.encode(), raw);
        assert!(field.with_alignment_padding(4, 8).is_err());
    }

    #[test]
    fn test_alignment_segment_layout() {
        let field = ExtraField::default().with_alignment_padding(4, 9).unwrap();
        let encoded = field.encode();
        assert_eq!(encoded.len(), 9);
        assert_eq!(&encoded[..6], &[0x35, 0xd9, 0x05, 0x00, 0x04, 0x00]);
        assert!(encoded[6..].iter().all(|&b| b == 0));

        let parsed = ExtraField::parse(&encoded);
        assert_eq!(
            parsed.segment(ALIGNMENT_SEGMENT_ID),
            Some(&ExtraSegment::Alignment {
                alignment: 4,
                size: 9
            })
        );
    }

    #[test]
    fn test_alignment_replaces_previous_padding() {
        let field = ExtraField::Segments(vec![ExtraSegment::Raw {
            id: 1,
            data: vec![7],
        }]);
        let padded = field.with_alignment_padding(4, 6).unwrap();
        let repadded = padded.with_alignment_padding(4, 10).unwrap();
        assert_eq!(repadded.size(), 5 + 10);
        assert_eq!(repadded.with_alignment_padding(4, 0).unwrap(), field);
    }

    #[test]
    fn test_small_padding_rejected() {
        assert!(ExtraField::default().with_alignment_padding(4, 3).is_err());
    }

    #[test]
    fn test_alignment_padding() {
        assert_eq!(alignment_padding(100, 1), 0);
        assert_eq!(alignment_padding(100, 4), 0);
        assert_eq!(alignment_padding(98, 4), 6);
        assert_eq!(alignment_padding(101, 4), 7);
        assert_eq!(alignment_padding(4095, 4096), 4097);
        assert_eq!(alignment_padding(4000, 4096), 96);
    }
}
