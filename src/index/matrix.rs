use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrieverError};
use crate::index::FrequencyTriple;

/// Sparse token×fact term-frequency matrix in CSR layout.
///
/// Rows are global token ids, columns are global fact ids. Cells are stored
/// as parallel `fact_ids`/`counts` arrays per row, ascending by fact id,
/// with duplicate `(token, fact)` contributions summed at build time. Every
/// stored cell is nonzero, so a row's stored length is that token's document
/// frequency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountMatrix {
    num_tokens: usize,
    num_facts: u64,
    /// `row_ptr[t]..row_ptr[t + 1]` indexes token `t`'s cells.
    row_ptr: Vec<usize>,
    fact_ids: Vec<u64>,
    counts: Vec<u32>,
}

impl CountMatrix {
    /// Assemble the matrix from accumulated triples.
    ///
    /// Duplicate coordinates (the same token observed for the same fact by
    /// more than one source) are summed, never overwritten. Zero-count
    /// triples are dropped so the stored sparsity pattern is exactly the
    /// nonzero pattern. A triple whose token id falls outside `num_tokens`
    /// does not belong to the vocabulary that defined the shape and is
    /// rejected as corrupt.
    pub fn from_triples(
        triples: &[FrequencyTriple],
        num_tokens: usize,
        num_facts: u64,
    ) -> Result<Self> {
        let mut cells: Vec<(u32, u64, u32)> = triples
            .iter()
            .filter(|t| t.count > 0)
            .map(|t| (t.token_id, t.fact_id, t.count))
            .collect();
        cells.sort_unstable_by_key(|&(token, fact, _)| (token, fact));

        let mut rows: Vec<u32> = Vec::with_capacity(cells.len());
        let mut fact_ids: Vec<u64> = Vec::with_capacity(cells.len());
        let mut counts: Vec<u32> = Vec::with_capacity(cells.len());
        for (token, fact, count) in cells {
            if token as usize >= num_tokens {
                return Err(RetrieverError::CorruptArtifact(format!(
                    "triple references token {token} outside a vocabulary of {num_tokens}"
                )));
            }
            match counts.last_mut() {
                Some(last) if rows.last() == Some(&token) && fact_ids.last() == Some(&fact) => {
                    *last += count;
                }
                _ => {
                    rows.push(token);
                    fact_ids.push(fact);
                    counts.push(count);
                }
            }
        }

        let mut row_ptr = vec![0usize; num_tokens + 1];
        for &row in &rows {
            row_ptr[row as usize + 1] += 1;
        }
        for t in 0..num_tokens {
            row_ptr[t + 1] += row_ptr[t];
        }

        Ok(CountMatrix {
            num_tokens,
            num_facts,
            row_ptr,
            fact_ids,
            counts,
        })
    }

    /// `(num_tokens, num_facts)`.
    pub fn shape(&self) -> (usize, u64) {
        (self.num_tokens, self.num_facts)
    }

    /// Number of stored (nonzero) cells.
    pub fn nnz(&self) -> usize {
        self.fact_ids.len()
    }

    /// Fact ids and counts of one token row. Out-of-range rows are empty.
    #[inline]
    pub fn row(&self, token_id: u32) -> (&[u64], &[u32]) {
        let t = token_id as usize;
        if t >= self.num_tokens {
            return (&[], &[]);
        }
        let (start, end) = (self.row_ptr[t], self.row_ptr[t + 1]);
        (&self.fact_ids[start..end], &self.counts[start..end])
    }

    /// Per-token document frequency: the number of facts each token occurs
    /// in at least once. Tokens occurring nowhere report 0 and store no
    /// cells at all.
    pub fn doc_freqs(&self) -> Vec<u32> {
        (0..self.num_tokens)
            .map(|t| (self.row_ptr[t + 1] - self.row_ptr[t]) as u32)
            .collect()
    }

    /// Expand the matrix back into triples, one per stored cell.
    ///
    /// Used on load so that ingestion after a reload accumulates into the
    /// persisted data instead of discarding it.
    pub fn to_triples(&self) -> Vec<FrequencyTriple> {
        let mut triples = Vec::with_capacity(self.nnz());
        for t in 0..self.num_tokens {
            let (facts, counts) = self.row(t as u32);
            for (&fact_id, &count) in facts.iter().zip(counts) {
                triples.push(FrequencyTriple {
                    token_id: t as u32,
                    fact_id,
                    count,
                });
            }
        }
        triples
    }
}
