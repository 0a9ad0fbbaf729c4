use rayon::prelude::*;

use crate::index::matrix::CountMatrix;

/// TF-IDF weighting scheme.
///
/// Implement this trait to plug a different weighting into the retriever;
/// `DefaultTfIdfEngine` provides the standard scheme.
pub trait TfIdfEngine {
    /// Inverse-document-frequency weight of a token occurring in `doc_freq`
    /// of `num_facts` facts.
    fn idf(num_facts: u64, doc_freq: u32) -> f64;
    /// Dampened term frequency for a raw in-fact count.
    fn tf(count: u32) -> f64;
}

/// Robertson–Spärck Jones idf with negative weights clamped to zero, and
/// log-dampened term frequency.
///
/// A token appearing in the overwhelming majority of facts contributes zero
/// weight, never negative weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTfIdfEngine;

impl TfIdfEngine for DefaultTfIdfEngine {
    #[inline]
    fn idf(num_facts: u64, doc_freq: u32) -> f64 {
        let n = num_facts as f64;
        let df = doc_freq as f64;
        ((n - df + 0.5) / (df + 0.5)).ln().max(0.0)
    }

    #[inline]
    fn tf(count: u32) -> f64 {
        (count as f64).ln_1p()
    }
}

/// TF-IDF weighted matrix: `W = diag(idf) · log1p(C)`.
///
/// Same shape and sparsity pattern as the count matrix it was derived from.
/// The per-token idf vector is kept alongside so query vectors can be
/// weighted in the same space.
#[derive(Debug, Clone)]
pub struct WeightedMatrix {
    num_tokens: usize,
    num_facts: u64,
    row_ptr: Vec<usize>,
    fact_ids: Vec<u64>,
    weights: Vec<f64>,
    idf: Vec<f64>,
}

impl WeightedMatrix {
    /// Derive the weighted matrix from a count matrix.
    ///
    /// Document frequencies come from the stored sparsity pattern; the
    /// row-scaling pass runs row-parallel.
    pub fn from_counts<E: TfIdfEngine>(counts: &CountMatrix) -> Self {
        let (num_tokens, num_facts) = counts.shape();
        let idf: Vec<f64> = counts
            .doc_freqs()
            .into_iter()
            .map(|df| E::idf(num_facts, df))
            .collect();

        let rows: Vec<Vec<f64>> = (0..num_tokens)
            .into_par_iter()
            .map(|t| {
                let (_, row_counts) = counts.row(t as u32);
                let weight = idf[t];
                row_counts.iter().map(|&c| weight * E::tf(c)).collect()
            })
            .collect();

        let mut row_ptr = Vec::with_capacity(num_tokens + 1);
        row_ptr.push(0usize);
        let mut weights = Vec::with_capacity(counts.nnz());
        let mut fact_ids = Vec::with_capacity(counts.nnz());
        for (t, row) in rows.into_iter().enumerate() {
            weights.extend(row);
            fact_ids.extend_from_slice(counts.row(t as u32).0);
            row_ptr.push(weights.len());
        }

        WeightedMatrix {
            num_tokens,
            num_facts,
            row_ptr,
            fact_ids,
            weights,
            idf,
        }
    }

    pub fn shape(&self) -> (usize, u64) {
        (self.num_tokens, self.num_facts)
    }

    pub fn num_facts(&self) -> u64 {
        self.num_facts
    }

    /// Idf weight of a token; 0.0 for out-of-range ids.
    #[inline]
    pub fn idf(&self, token_id: u32) -> f64 {
        self.idf.get(token_id as usize).copied().unwrap_or(0.0)
    }

    /// Fact ids and weights of one token row. Out-of-range rows are empty.
    #[inline]
    pub fn row(&self, token_id: u32) -> (&[u64], &[f64]) {
        let t = token_id as usize;
        if t >= self.num_tokens {
            return (&[], &[]);
        }
        let (start, end) = (self.row_ptr[t], self.row_ptr[t + 1]);
        (&self.fact_ids[start..end], &self.weights[start..end])
    }
}
