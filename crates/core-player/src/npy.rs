//! A minimal `.npy` reader: just enough to pull a flat byte buffer and its
//! shape/dtype out of the single-array files bundled in a clip archive.
//! Not a general NumPy format implementation — no object arrays, no
//! big-endian byte order, no Fortran layout.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("buffer too short to contain an npy header")]
    Truncated,
    #[error("bad magic bytes, not an npy file")]
    BadMagic,
    #[error("unsupported npy version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("header missing '{0}' field")]
    MissingField(&'static str),
    #[error("unsupported dtype {0}")]
    UnsupportedDtype(String),
    #[error("array is empty, no scalar to read")]
    Empty,
}

const MAGIC: &[u8; 6] = b"\x93NUMPY";

pub struct NpyArray {
    pub shape: Vec<usize>,
    pub dtype: String,
    pub data: Vec<u8>,
}

impl NpyArray {
    pub fn parse(bytes: &[u8]) -> Result<Self, NpyError> {
        if bytes.len() < 10 {
            return Err(NpyError::Truncated);
        }
        if &bytes[0..6] != MAGIC {
            return Err(NpyError::BadMagic);
        }
        let major = bytes[6];
        let minor = bytes[7];

        let (header_len, data_start) = match major {
            1 => {
                let len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
                (len, 10)
            }
            2 | 3 => {
                if bytes.len() < 12 {
                    return Err(NpyError::Truncated);
                }
                let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
                (len, 12)
            }
            _ => return Err(NpyError::UnsupportedVersion(major, minor)),
        };

        let header_end = data_start + header_len;
        if bytes.len() < header_end {
            return Err(NpyError::Truncated);
        }
        let header = std::str::from_utf8(&bytes[data_start..header_end]).unwrap_or_default();

        let dtype = extract_quoted(header, "descr").ok_or(NpyError::MissingField("descr"))?;
        let shape = extract_shape(header).ok_or(NpyError::MissingField("shape"))?;

        Ok(Self {
            shape,
            dtype,
            data: bytes[header_end..].to_vec(),
        })
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product::<usize>().max(1)
    }

    /// Read the first element as `f64`, regardless of scalar or array shape.
    /// Used for the single-valued `fps.npy`/`width.npy`/`height.npy`
    /// sidecars a clip archive carries alongside `frames.npy`.
    pub fn first_as_f64(&self) -> Result<f64, NpyError> {
        if self.data.is_empty() {
            return Err(NpyError::Empty);
        }
        match self.dtype.as_str() {
            "<f8" | "=f8" => Ok(f64::from_le_bytes(self.data[0..8].try_into().unwrap())),
            "<f4" | "=f4" => Ok(f32::from_le_bytes(self.data[0..4].try_into().unwrap()) as f64),
            "<i8" | "=i8" => Ok(i64::from_le_bytes(self.data[0..8].try_into().unwrap()) as f64),
            "<i4" | "=i4" => Ok(i32::from_le_bytes(self.data[0..4].try_into().unwrap()) as f64),
            "<u8" | "=u8" => Ok(u64::from_le_bytes(self.data[0..8].try_into().unwrap()) as f64),
            "<u4" | "=u4" => Ok(u32::from_le_bytes(self.data[0..4].try_into().unwrap()) as f64),
            "|u1" | "<u1" => Ok(self.data[0] as f64),
            other => Err(NpyError::UnsupportedDtype(other.to_string())),
        }
    }
}

fn extract_quoted(header: &str, key: &str) -> Option<String> {
    let needle = format!("'{key}':");
    let after = &header[header.find(&needle)? + needle.len()..];
    let start = after.find('\'')? + 1;
    let rest = &after[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

fn extract_shape(header: &str) -> Option<Vec<usize>> {
    let needle = "'shape':";
    let after = &header[header.find(needle)? + needle.len()..];
    let start = after.find('(')? + 1;
    let end = after.find(')')?;
    let inner = &after[start..end];
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<usize>().ok())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_npy(descr: &str, shape: &str, payload: &[u8]) -> Vec<u8> {
        let header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}");
        let mut padded = header.into_bytes();
        padded.push(b'\n');
        while (10 + padded.len()) % 64 != 0 {
            padded.insert(padded.len() - 1, b' ');
        }
        let mut out = MAGIC.to_vec();
        out.push(1);
        out.push(0);
        out.extend_from_slice(&(padded.len() as u16).to_le_bytes());
        out.extend_from_slice(&padded);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn parses_scalar_float() {
        let bytes = build_npy("<f8", "()", &42.5f64.to_le_bytes());
        let arr = NpyArray::parse(&bytes).unwrap();
        assert_eq!(arr.dtype, "<f8");
        assert!(arr.shape.is_empty());
        assert!((arr.first_as_f64().unwrap() - 42.5).abs() < 1e-9);
    }

    #[test]
    fn parses_uint8_array_shape() {
        let payload = vec![0u8; 2 * 3 * 4 * 3];
        let bytes = build_npy("|u1", "(2, 3, 4, 3)", &payload);
        let arr = NpyArray::parse(&bytes).unwrap();
        assert_eq!(arr.shape, vec![2, 3, 4, 3]);
        assert_eq!(arr.data.len(), payload.len());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 20];
        assert!(matches!(NpyArray::parse(&bytes), Err(NpyError::BadMagic)));
    }
}
