// ============================================================
// Layer 4 — Bundle Loader
// ============================================================
// Reads one experiment's interaction bundle from a JSON file.
//
// Expected layout (all ids are zero-based):
//
//   {
//     "n_users": 3, "n_items": 4,
//     "train_u2i": {"0": [1, 2], "2": [0]},    ← object keyed by id
//     "test_u2i":  [[3], [], [1]],              ← or array indexed by id
//     "train_i2u": ..., "test_i2u": ...,       ← optional, derived if absent
//     "train_set": [[0, 1], [0, 2], [2, 0]],   ← optional, derived if absent
//     "test_set":  ...,                        ← optional, derived if absent
//     "user_side_features": {"gender": [0, 1, 0]}
//   }
//
// Ids missing from an object-keyed table get an empty list.
// The resulting bundle is validated before it is returned.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use crate::domain::bundle::InteractionBundle;
use crate::domain::traits::InteractionSource;

/// Per-id list table, either as an object or as an array of rows.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdTable {
    Rows(Vec<Vec<usize>>),
    // Keys stay strings here: untagged buffering cannot parse
    // JSON object keys into integers.
    Keyed(BTreeMap<String, Vec<usize>>),
}

impl IdTable {
    fn into_rows(self, len: usize, field: &str) -> Result<Vec<Vec<usize>>> {
        match self {
            IdTable::Rows(mut rows) => {
                if rows.len() < len {
                    rows.resize(len, Vec::new());
                }
                Ok(rows)
            }
            IdTable::Keyed(map) => {
                let mut rows = vec![Vec::new(); len];
                for (key, items) in map {
                    let id: usize = key
                        .parse()
                        .with_context(|| format!("{field}: key '{key}' is not an id"))?;
                    if id >= len {
                        bail!("{field}: id {id} out of range (expected < {len})");
                    }
                    rows[id] = items;
                }
                Ok(rows)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBundle {
    n_users:   usize,
    n_items:   usize,
    train_u2i: IdTable,
    test_u2i:  IdTable,
    #[serde(default)]
    train_i2u: Option<IdTable>,
    #[serde(default)]
    test_i2u:  Option<IdTable>,
    #[serde(default)]
    train_set: Option<Vec<(usize, usize)>>,
    #[serde(default)]
    test_set:  Option<Vec<(usize, usize)>>,
    #[serde(default)]
    user_side_features: BTreeMap<String, Vec<i64>>,
}

impl RawBundle {
    fn into_bundle(self) -> Result<InteractionBundle> {
        let (n_users, n_items) = (self.n_users, self.n_items);

        let train_u2i = self.train_u2i.into_rows(n_users, "train_u2i")?;
        let test_u2i  = self.test_u2i.into_rows(n_users, "test_u2i")?;

        let train_i2u = match self.train_i2u {
            Some(t) => t.into_rows(n_items, "train_i2u")?,
            None    => invert(&train_u2i, n_items),
        };
        let test_i2u = match self.test_i2u {
            Some(t) => t.into_rows(n_items, "test_i2u")?,
            None    => invert(&test_u2i, n_items),
        };

        let train_set = self.train_set.unwrap_or_else(|| flatten(&train_u2i));
        let test_set  = self.test_set.unwrap_or_else(|| flatten(&test_u2i));

        Ok(InteractionBundle {
            n_users,
            n_items,
            train_u2i,
            train_i2u,
            test_u2i,
            test_i2u,
            train_set,
            test_set,
            user_side_features: self.user_side_features,
        })
    }
}

/// item → users from user → items. Out-of-range items are left for
/// validation to report.
fn invert(u2i: &[Vec<usize>], n_items: usize) -> Vec<Vec<usize>> {
    let mut i2u = vec![Vec::new(); n_items];
    for (user, items) in u2i.iter().enumerate() {
        for &item in items {
            if let Some(row) = i2u.get_mut(item) {
                row.push(user);
            }
        }
    }
    i2u
}

fn flatten(u2i: &[Vec<usize>]) -> Vec<(usize, usize)> {
    u2i.iter()
        .enumerate()
        .flat_map(|(user, items)| items.iter().map(move |&item| (user, item)))
        .collect()
}

/// Loads an interaction bundle from a JSON file.
/// Implements the InteractionSource trait from Layer 3.
pub struct BundleLoader {
    path: PathBuf,
}

impl BundleLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl InteractionSource for BundleLoader {
    fn load(&self) -> Result<InteractionBundle> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open dataset '{}'", self.path.display()))?;

        let raw: RawBundle = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Cannot parse dataset '{}'", self.path.display()))?;

        let bundle = raw.into_bundle()?;
        bundle
            .validate()
            .with_context(|| format!("Invalid dataset '{}'", self.path.display()))?;

        tracing::info!(
            "Loaded dataset: {} users, {} items, {} train interactions, {} test users",
            bundle.n_users,
            bundle.n_items,
            bundle.train_interactions(),
            bundle.test_users(),
        );
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(body: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_keyed_tables_and_derived_fields() {
        let f = write_json(r#"{
            "n_users": 3, "n_items": 4,
            "train_u2i": {"0": [1, 2], "2": [0]},
            "test_u2i":  {"1": [3]},
            "user_side_features": {"gender": [0, 1, 0]}
        }"#);

        let bundle = BundleLoader::new(f.path()).load().unwrap();
        assert_eq!(bundle.train_u2i, vec![vec![1, 2], vec![], vec![0]]);
        assert_eq!(bundle.test_u2i,  vec![vec![], vec![3], vec![]]);
        assert_eq!(bundle.train_set, vec![(0, 1), (0, 2), (2, 0)]);
        assert_eq!(bundle.train_i2u[0], vec![2]);
        assert_eq!(bundle.test_i2u[3], vec![1]);
        assert_eq!(bundle.sensitive("gender").unwrap(), vec![0, 1, 0]);
    }

    #[test]
    fn test_row_tables() {
        let f = write_json(r#"{
            "n_users": 2, "n_items": 2,
            "train_u2i": [[0], [1]],
            "test_u2i":  [[1]],
            "train_set": [[0, 0], [1, 1]],
            "user_side_features": {"gender": [1, 0]}
        }"#);

        let bundle = BundleLoader::new(f.path()).load().unwrap();
        assert_eq!(bundle.test_u2i, vec![vec![1], vec![]]);
        assert_eq!(bundle.train_set.len(), 2);
    }

    #[test]
    fn test_out_of_range_item_is_rejected() {
        let f = write_json(r#"{
            "n_users": 1, "n_items": 2,
            "train_u2i": [[5]],
            "test_u2i":  [[]]
        }"#);
        let err = BundleLoader::new(f.path()).load().unwrap_err();
        assert!(format!("{err:#}").contains("out of range"));
    }

    #[test]
    fn test_bad_key_is_rejected() {
        let f = write_json(r#"{
            "n_users": 1, "n_items": 1,
            "train_u2i": {"alice": [0]},
            "test_u2i":  []
        }"#);
        assert!(BundleLoader::new(f.path()).load().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = BundleLoader::new("/definitely/not/here.json").load().unwrap_err();
        assert!(err.to_string().contains("Cannot open dataset"));
    }
}
