//! Vector index abstraction and an exact (brute-force) L2 implementation.
//!
//! The corpus builder and the query service only talk to [`VectorIndex`],
//! so alternative backends or test doubles can be injected. [`FlatL2Index`]
//! is the default: exhaustive squared-L2 search over a contiguous `f32`
//! buffer, persisted as a small self-describing byte blob.

use std::cmp::Ordering;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};

/// Id returned in place of a neighbour when fewer than `k` vectors exist.
pub const MISSING_ID: i64 = -1;

/// Ids and distances returned by [`VectorIndex::search`], nearest first.
///
/// Both vectors always have exactly `k` elements. Slots beyond the number
/// of stored vectors hold [`MISSING_ID`] and `f32::MAX`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    pub ids: Vec<i64>,
    pub distances: Vec<f32>,
}

/// Capability set of a vector index.
pub trait VectorIndex: Send + Sync {
    /// Dimensionality, or `None` before [`initialize`](Self::initialize).
    fn dims(&self) -> Option<usize>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fix the dimensionality. Allowed once.
    fn initialize(&mut self, dims: usize) -> Result<()>;

    /// Append vectors; ids are assigned sequentially from `len()`.
    fn append(&mut self, vectors: &[Vec<f32>]) -> Result<()>;

    /// The `k` nearest stored vectors to `query`.
    fn search(&self, query: &[f32], k: usize) -> Result<Neighbors>;
}

const MAGIC: &[u8; 4] = b"DQIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// Exhaustive squared-L2 index.
#[derive(Debug, Clone, Default)]
pub struct FlatL2Index {
    dims: Option<usize>,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored vector `id`, if any.
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        let dims = self.dims?;
        let start = id.checked_mul(dims)?;
        self.data.get(start..start + dims)
    }

    /// Serialize as `magic | version | dims | count | f32 LE data`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let dims = self.dims.unwrap_or(0) as u64;
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&dims.to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        out.extend_from_slice(&vec_to_blob(&self.data));
        out
    }

    /// Decode a blob written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::MalformedIndex(format!(
                "blob is {} bytes, shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(Error::MalformedIndex("bad magic".into()));
        }
        let version = u32::from_le_bytes(read_array(&bytes[4..8]));
        if version != FORMAT_VERSION {
            return Err(Error::MalformedIndex(format!("unsupported version {version}")));
        }
        let dims = u64::from_le_bytes(read_array(&bytes[8..16])) as usize;
        let count = u64::from_le_bytes(read_array(&bytes[16..24])) as usize;

        let payload = &bytes[HEADER_LEN..];
        let expected = dims
            .checked_mul(count)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| Error::MalformedIndex("header overflows".into()))?;
        if payload.len() != expected {
            return Err(Error::MalformedIndex(format!(
                "expected {expected} payload bytes for {count}x{dims}, found {}",
                payload.len()
            )));
        }

        Ok(Self {
            dims: if dims == 0 { None } else { Some(dims) },
            data: blob_to_vec(payload),
        })
    }
}

impl VectorIndex for FlatL2Index {
    fn dims(&self) -> Option<usize> {
        self.dims
    }

    fn len(&self) -> usize {
        match self.dims {
            Some(d) => self.data.len() / d,
            None => 0,
        }
    }

    fn initialize(&mut self, dims: usize) -> Result<()> {
        if dims == 0 || self.dims.is_some() {
            return Err(Error::InvalidDimension(dims));
        }
        self.dims = Some(dims);
        Ok(())
    }

    fn append(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let dims = self.dims.ok_or(Error::IndexNotInitialized)?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * dims);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Neighbors> {
        let dims = self.dims.ok_or(Error::IndexNotInitialized)?;
        if query.len() != dims {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(i64, f32)> = self
            .data
            .chunks_exact(dims)
            .enumerate()
            .map(|(id, v)| (id as i64, squared_l2(query, v)))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        let mut out = Neighbors {
            ids: Vec::with_capacity(k),
            distances: Vec::with_capacity(k),
        };
        for (id, d) in scored {
            out.ids.push(id);
            out.distances.push(d);
        }
        while out.ids.len() < k {
            out.ids.push(MISSING_ID);
            out.distances.push(f32::MAX);
        }
        Ok(out)
    }
}

/// Squared Euclidean distance.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(vectors: &[Vec<f32>]) -> FlatL2Index {
        let mut index = FlatL2Index::new();
        index.initialize(vectors[0].len()).unwrap();
        index.append(vectors).unwrap();
        index
    }

    #[test]
    fn test_nearest_first() {
        let index = index_with(&[vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]]);
        let n = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(n.ids, vec![0, 2, 1]);
        assert_eq!(n.distances, vec![0.0, 1.0, 25.0]);
    }

    #[test]
    fn test_pads_with_missing_id() {
        let index = index_with(&[vec![1.0, 1.0]]);
        let n = index.search(&[1.0, 1.0], 3).unwrap();
        assert_eq!(n.ids, vec![0, MISSING_ID, MISSING_ID]);
        assert_eq!(n.distances.len(), 3);
    }

    #[test]
    fn test_ties_ordered_by_id() {
        let index = index_with(&[vec![1.0, 0.0], vec![-1.0, 0.0], vec![0.0, 1.0]]);
        let n = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(n.ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_dimension_checks() {
        let mut index = FlatL2Index::new();
        assert_eq!(index.append(&[vec![1.0]]), Err(Error::IndexNotInitialized));
        index.initialize(2).unwrap();
        assert_eq!(index.initialize(2), Err(Error::InvalidDimension(2)));
        assert_eq!(
            index.append(&[vec![1.0, 2.0], vec![1.0]]),
            Err(Error::DimensionMismatch { expected: 2, actual: 1 })
        );
        assert_eq!(index.len(), 0);
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let index = index_with(&[vec![0.5, -1.0, 2.0], vec![3.0, 0.0, 1.0]]);
        let restored = FlatL2Index::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored.dims(), Some(3));
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.vector(1), Some(&[3.0, 0.0, 1.0][..]));
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(matches!(
            FlatL2Index::from_bytes(b"nope"),
            Err(Error::MalformedIndex(_))
        ));
        let mut bytes = index_with(&[vec![1.0, 2.0]]).to_bytes();
        bytes.pop();
        assert!(matches!(
            FlatL2Index::from_bytes(&bytes),
            Err(Error::MalformedIndex(_))
        ));
        let mut bytes = index_with(&[vec![1.0, 2.0]]).to_bytes();
        bytes[0] = b'X';
        assert!(FlatL2Index::from_bytes(&bytes).is_err());
    }
}
