use super::DataComparator;
use crate::database::unescape;
use crate::model::RetrievalScores;
use async_trait::async_trait;

/// Positional table comparison over the columns both result sets share.
///
/// A row matches when every shared column agrees at the same position. A
/// column matches when it agrees on every compared row. Precision divides by
/// the generated side, recall by the golden side; empty denominators give 0,
/// except that two empty results over the same columns match fully.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularComparator;

struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parses the header line plus data lines. Repeated column names keep
    /// their first occurrence only.
    fn parse(text: &str) -> Self {
        let mut lines = text.split('\n');
        let header: Vec<String> = match lines.next() {
            Some(h) if !h.is_empty() => h.split('\t').map(unescape).collect(),
            _ => Vec::new(),
        };

        let mut columns = Vec::new();
        let mut keep = Vec::new();
        for (i, c) in header.iter().enumerate() {
            if !columns.contains(c) {
                columns.push(c.clone());
                keep.push(i);
            }
        }

        let rows = lines
            .map(|l| {
                let cells: Vec<String> = l.split('\t').map(unescape).collect();
                keep.iter()
                    .map(|&i| cells.get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl TabularComparator {
    pub fn score(&self, generated: &str, golden: &str) -> RetrievalScores {
        let gen = Table::parse(generated);
        let gold = Table::parse(golden);

        let shared: Vec<(usize, usize)> = gen
            .columns
            .iter()
            .enumerate()
            .filter_map(|(gi, c)| gold.index_of(c).map(|ri| (gi, ri)))
            .collect();
        let compared = gen.rows.len().min(gold.rows.len());

        let matching_rows = if shared.is_empty() {
            0
        } else {
            (0..compared)
                .filter(|&i| shared.iter().all(|&(g, r)| gen.rows[i][g] == gold.rows[i][r]))
                .count()
        };
        let matching_columns = shared
            .iter()
            .filter(|&&(g, r)| (0..compared).all(|i| gen.rows[i][g] == gold.rows[i][r]))
            .count();

        let both_empty = gen.rows.is_empty()
            && gold.rows.is_empty()
            && gen.columns.len() == gold.columns.len()
            && shared.len() == gen.columns.len();
        let (rows_precision, rows_recall) = if both_empty {
            (1.0, 1.0)
        } else {
            (
                ratio(matching_rows, gen.rows.len()),
                ratio(matching_rows, gold.rows.len()),
            )
        };

        RetrievalScores {
            column_precision: ratio(matching_columns, gen.columns.len()),
            column_recall: ratio(matching_columns, gold.columns.len()),
            rows_precision,
            rows_recall,
        }
    }
}

#[async_trait]
impl DataComparator for TabularComparator {
    async fn compare(&self, generated: &str, golden: &str) -> anyhow::Result<RetrievalScores> {
        Ok(self.score(generated, golden))
    }
}
