// ============================================================
// Layer 3 — Embedding Table
// ============================================================
// A CPU-side, row-major copy of an embedding matrix.
// Layer 5 fills it from a tensor; evaluation only ever reads it.

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingTable {
    rows: usize,
    dim:  usize,
    data: Vec<f32>,
}

impl EmbeddingTable {
    /// Returns `None` when `data` does not hold exactly `rows * dim` values.
    pub fn new(rows: usize, dim: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == rows * dim).then_some(Self { rows, dim, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    /// Dot product of `query` against every row.
    pub fn scores(&self, query: &[f32]) -> Vec<f32> {
        self.data
            .chunks_exact(self.dim)
            .map(|row| dot(row, query))
            .collect()
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_checked() {
        assert!(EmbeddingTable::new(2, 3, vec![0.0; 6]).is_some());
        assert!(EmbeddingTable::new(2, 3, vec![0.0; 5]).is_none());
    }

    #[test]
    fn test_scores() {
        let t = EmbeddingTable::new(3, 2, vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(t.row(2), &[1.0, 1.0]);
        assert_eq!(t.scores(&[2.0, 3.0]), vec![2.0, 3.0, 5.0]);
    }
}
