//! NumPy `.npy` format 1.0 encoding for the two dataset artifacts.
//!
//! Only what the dataset needs: C-ordered `|u1` tensors and `<U{n}` string
//! vectors, plus a header parser so written artifacts can be inspected.

use std::io::Write;

use crate::error::DatasetError;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
/// Data starts on a multiple of this many bytes.
const ARRAY_ALIGN: usize = 64;
/// Spare header room numpy reserves so the leading axis can grow in place.
const GROWTH_AXIS_MAX_DIGITS: usize = 21;

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub descr: String,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

impl NpyHeader {
    pub fn new(descr: impl Into<String>, shape: &[usize]) -> Self {
        Self {
            descr: descr.into(),
            fortran_order: false,
            shape: shape.to_vec(),
        }
    }

    /// Number of elements implied by `shape`.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Python-literal dict, as numpy writes it.
    fn dict_literal(&self) -> String {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        let shape = match dims.len() {
            1 => format!("({},)", dims[0]),
            _ => format!("({})", dims.join(", ")),
        };
        let fortran = if self.fortran_order { "True" } else { "False" };
        let mut dict = format!(
            "{{'descr': '{}', 'fortran_order': {fortran}, 'shape': {shape}, }}",
            self.descr
        );
        if let Some(&leading) = self.shape.first() {
            let digits = leading.to_string().len();
            dict.push_str(&" ".repeat(GROWTH_AXIS_MAX_DIGITS.saturating_sub(digits)));
        }
        dict
    }

    /// Magic, version, length and padded dict, ready to precede the data.
    pub fn encode(&self) -> Result<Vec<u8>, DatasetError> {
        let dict = self.dict_literal();
        let hlen = dict.len() + 1;
        let padlen = ARRAY_ALIGN - ((MAGIC.len() + 2 + 2 + hlen) % ARRAY_ALIGN);
        let total = u16::try_from(hlen + padlen).map_err(|_| DatasetError::NpyHeader {
            message: format!("header of {} bytes exceeds format 1.0", hlen + padlen),
        })?;

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + total as usize);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(dict.as_bytes());
        out.extend(std::iter::repeat_n(b' ', padlen));
        out.push(b'\n');
        Ok(out)
    }

    /// Parse a header from the start of `bytes`, returning it and the data offset.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), DatasetError> {
        let malformed = |message: &str| DatasetError::NpyHeader {
            message: message.to_string(),
        };
        if bytes.len() < 10 || &bytes[..6] != MAGIC {
            return Err(malformed("missing \\x93NUMPY magic"));
        }
        let (len, start) = match bytes[6] {
            1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
            2 | 3 if bytes.len() >= 12 => (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            ),
            _ => return Err(malformed("unsupported format version")),
        };
        let end = start + len;
        let dict = bytes
            .get(start..end)
            .and_then(|b| std::str::from_utf8(b).ok())
            .ok_or_else(|| malformed("truncated header"))?;

        let descr = quoted_value(dict, "descr").ok_or_else(|| malformed("no descr"))?;
        let fortran_order = dict.contains("'fortran_order': True");
        let shape = shape_value(dict).ok_or_else(|| malformed("no shape"))?;
        Ok((
            Self {
                descr: descr.to_string(),
                fortran_order,
                shape,
            },
            end,
        ))
    }
}

fn quoted_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("'{key}': '");
    let rest = &dict[dict.find(&marker)? + marker.len()..];
    rest.split('\'').next()
}

fn shape_value(dict: &str) -> Option<Vec<usize>> {
    let marker = "'shape': (";
    let rest = &dict[dict.find(marker)? + marker.len()..];
    let inner = &rest[..rest.find(')')?];
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

/// Write a C-ordered `uint8` array of `shape`.
pub fn write_u8<W: Write>(mut w: W, shape: &[usize], data: &[u8]) -> Result<(), DatasetError> {
    let header = NpyHeader::new("|u1", shape);
    debug_assert_eq!(header.element_count(), data.len());
    let io = |source: std::io::Error| DatasetError::ArtifactWrite {
        path: "<npy stream>".into(),
        source,
    };
    w.write_all(&header.encode()?).map_err(io)?;
    w.write_all(data).map_err(io)?;
    Ok(())
}

/// Fixed-width `<U{n}` width for `labels`: longest label in chars, at least 1.
pub fn unicode_width(labels: &[String]) -> usize {
    labels
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .max(1)
}

/// Write a 1-d little-endian UTF-32 string array.
pub fn write_unicode<W: Write>(mut w: W, labels: &[String]) -> Result<(), DatasetError> {
    let width = unicode_width(labels);
    let header = NpyHeader::new(format!("<U{width}"), &[labels.len()]);
    let io = |source: std::io::Error| DatasetError::ArtifactWrite {
        path: "<npy stream>".into(),
        source,
    };
    w.write_all(&header.encode()?).map_err(io)?;

    let mut row = Vec::with_capacity(width * 4);
    for label in labels {
        row.clear();
        for c in label.chars() {
            row.extend_from_slice(&(c as u32).to_le_bytes());
        }
        row.resize(width * 4, 0);
        w.write_all(&row).map_err(io)?;
    }
    Ok(())
}

/// Read back a `<U{n}` vector written by [`write_unicode`].
pub fn read_unicode(bytes: &[u8]) -> Result<Vec<String>, DatasetError> {
    let (header, offset) = NpyHeader::parse(bytes)?;
    let width: usize = header
        .descr
        .strip_prefix("<U")
        .and_then(|w| w.parse().ok())
        .ok_or_else(|| DatasetError::NpyHeader {
            message: format!("expected <U dtype, found {}", header.descr),
        })?;
    if width == 0 {
        return Err(DatasetError::NpyHeader {
            message: format!("zero-width string dtype {}", header.descr),
        });
    }
    let overflow = || DatasetError::NpyHeader {
        message: format!("{} with shape {:?} overflows", header.descr, header.shape),
    };
    let row_len = width.checked_mul(4).ok_or_else(overflow)?;
    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(overflow)?;
    let needed = count.checked_mul(row_len).ok_or_else(overflow)?;
    let data = &bytes[offset..];
    if data.len() < needed {
        return Err(DatasetError::NpyHeader {
            message: "string data shorter than header shape".into(),
        });
    }
    let labels: Vec<String> = data
        .chunks_exact(row_len)
        .take(count)
        .map(|row| {
            row.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .take_while(|&cp| cp != 0)
                .filter_map(char::from_u32)
                .collect::<String>()
        })
        .collect();
    Ok(labels)
}
