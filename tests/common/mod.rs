// Synthetic corpus shared by the integration tests.

#![allow(dead_code)]

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use register_space::{CategoryEntry, CategoryTaxonomy, DocumentMeta, FeatureMatrix};
use std::collections::BTreeMap;

pub const N_DOCS: usize = 120;
pub const FINE: [&str; 4] = ["A1", "A2", "B1", "B2"];
pub const FEATURES: [&str; 6] = ["nouns", "verbs", "pronouns", "contractions", "passives", "constant"];

/// Every tenth document is too short and is dropped by the default size filter.
pub fn is_short(row: usize) -> bool {
    row % 10 == 0
}

pub fn doc_id(row: usize) -> String {
    format!("ICE-{:04}", row)
}

/// Feature counts whose means move with the fine category; "constant" never changes.
pub fn features(seed: u64) -> FeatureMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noise = Normal::<f64>::new(0.0, 1.5).unwrap();
    let shifts = [
        [0.0, 6.0, -3.0, 0.0, 2.0],
        [2.0, 3.0, 3.0, -2.0, 0.0],
        [6.0, -2.0, 0.0, 3.0, -1.0],
        [8.0, -4.0, -2.0, 0.0, 4.0],
    ];
    let mut values = Array2::<f64>::zeros((N_DOCS, FEATURES.len()));
    for row in 0..N_DOCS {
        let class = row % 4;
        for col in 0..5 {
            values[[row, col]] = (20.0 + shifts[class][col] + noise.sample(&mut rng)).max(0.0);
        }
        values[[row, 5]] = 7.0;
    }
    FeatureMatrix::new(
        (0..N_DOCS).map(doc_id).collect(),
        FEATURES.iter().map(|s| s.to_string()).collect(),
        values,
    )
    .unwrap()
}

pub fn metadata() -> Vec<DocumentMeta> {
    // Reverse order: alignment has to restore the feature row order.
    (0..N_DOCS)
        .rev()
        .map(|row| {
            let fine = FINE[row % 4];
            let mut categories = BTreeMap::new();
            categories.insert("cat4".to_owned(), fine.to_owned());
            categories.insert("cat2".to_owned(), fine[..1].to_owned());
            DocumentMeta {
                id: doc_id(row),
                variety: if row % 2 == 0 { "GB".to_owned() } else { "IND".to_owned() },
                mode: if fine.starts_with('A') { "spoken".to_owned() } else { "written".to_owned() },
                format: "text".to_owned(),
                categories,
                words: if is_short(row) { 50 } else { 2000 },
                sentences: 40,
            }
        })
        .collect()
}

fn entry(code: &str, order: usize) -> CategoryEntry {
    CategoryEntry {
        code: code.to_owned(),
        label: format!("{} texts", code),
        name: code.to_lowercase(),
        order,
    }
}

pub fn taxonomy() -> CategoryTaxonomy {
    CategoryTaxonomy::new()
        .with_level("cat4", FINE.iter().enumerate().map(|(i, c)| entry(c, i)).collect())
        .with_level("cat2", vec![entry("B", 1), entry("A", 0)])
}
