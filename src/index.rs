//! Exact inner-product vector index.
//!
//! [`FlatIndex`] stores vectors contiguously and scores every one of them
//! against the query. With L2-normalised inputs the inner product equals
//! cosine similarity. Per-session indexes hold at most a few thousand
//! chunks, so brute force is exact and fast enough.
//!
//! # On-disk layout (`index.bin`, little-endian)
//!
//! ```text
//! magic  "DQAFLAT1"        8 bytes
//! dims   u32               4 bytes
//! count  u64               8 bytes
//! data   f32 × dims×count
//! ```

use anyhow::{bail, ensure, Result};

const MAGIC: &[u8; 8] = b"DQAFLAT1";
const HEADER_LEN: usize = 8 + 4 + 8;

/// Scale `v` to unit length in place. Zero vectors are left unchanged.
pub fn normalize_l2(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Flat (brute-force) index of fixed-dimension vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector; its position is the current [`len`](Self::len).
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        ensure!(
            vector.len() == self.dims,
            "vector has {} dimensions, index expects {}",
            vector.len(),
            self.dims
        );
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dims)?;
        self.data.get(start..start + self.dims)
    }

    /// Top `k` `(position, score)` pairs by descending inner product.
    ///
    /// Ties keep insertion order. Non-finite scores are dropped.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        ensure!(
            query.len() == self.dims,
            "query has {} dimensions, index expects {}",
            query.len(),
            self.dims
        );
        if k == 0 || self.dims == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dims)
            .map(|v| dot(v, query))
            .enumerate()
            .filter(|(_, s)| s.is_finite())
            .collect();
        // sort_by is stable, so equal scores stay in position order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.dims as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for &v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(bytes.len() >= HEADER_LEN, "index file truncated ({} bytes)", bytes.len());
        let (header, body) = bytes.split_at(HEADER_LEN);
        if &header[..8] != MAGIC {
            bail!("not a flat index file (bad magic)");
        }
        let dims = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header[12..20]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let expected = dims
            .checked_mul(count)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| anyhow::anyhow!("index header overflows: {} × {}", dims, count))?;
        ensure!(
            body.len() == expected,
            "index body is {} bytes, header declares {}",
            body.len(),
            expected
        );

        let data = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { dims, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        normalize_l2(&mut v);
        v
    }

    #[test]
    fn normalize_produces_unit_length() {
        let v = unit(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0f32; 3];
        normalize_l2(&mut zero);
        assert_eq!(zero, vec![0.0; 3]);
    }

    #[test]
    fn search_ranks_by_inner_product() {
        let mut idx = FlatIndex::new(2);
        idx.add(&unit(&[1.0, 0.0])).unwrap();
        idx.add(&unit(&[0.0, 1.0])).unwrap();
        idx.add(&unit(&[1.0, 1.0])).unwrap();

        let hits = idx.search(&unit(&[1.0, 0.2]), 5).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert_eq!(hits[2].0, 1);
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn search_truncates_to_k_and_keeps_ties_in_order() {
        let mut idx = FlatIndex::new(2);
        for _ in 0..4 {
            idx.add(&[1.0, 0.0]).unwrap();
        }
        let hits = idx.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits, vec![(0, 1.0), (1, 1.0)]);
        assert!(idx.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut idx = FlatIndex::new(3);
        assert!(idx.add(&[1.0, 2.0]).is_err());
        assert!(idx.search(&[1.0], 1).is_err());
        assert!(idx.is_empty());
    }

    #[test]
    fn bytes_layout_and_decode() {
        let mut idx = FlatIndex::new(2);
        idx.add(&[0.5, -0.25]).unwrap();
        let bytes = idx.to_bytes();
        assert_eq!(&bytes[..8], b"DQAFLAT1");
        assert_eq!(&bytes[8..12], &2u32.to_le_bytes());
        assert_eq!(&bytes[12..20], &1u64.to_le_bytes());
        assert_eq!(bytes.len(), 20 + 8);
        assert_eq!(FlatIndex::from_bytes(&bytes).unwrap(), idx);
    }

    #[test]
    fn corrupt_bytes_are_rejected() {
        assert!(FlatIndex::from_bytes(b"short").is_err());

        let mut idx = FlatIndex::new(2);
        idx.add(&[1.0, 2.0]).unwrap();
        let mut bytes = idx.to_bytes();
        bytes.pop();
        assert!(FlatIndex::from_bytes(&bytes).is_err());

        let mut bad_magic = idx.to_bytes();
        bad_magic[0] = b'X';
        assert!(FlatIndex::from_bytes(&bad_magic).is_err());
    }
}
