// ============================================================
// Layer 3 — Interaction Bundle
// ============================================================
// Everything one experiment reads from disk:
//
//   train_u2i / test_u2i   — items per user  (index = user id)
//   train_i2u / test_i2u   — users per item  (index = item id)
//   train_set / test_set   — flat (user, item) pairs
//   user_side_features     — named integer columns, one value per user
//   n_users / n_items      — id ranges are 0..n_users and 0..n_items
//
// The sensitive attribute (e.g. "gender") is one of the
// user_side_features columns, picked by name at run time.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Validation failures for a loaded bundle.
#[derive(Debug, Error, PartialEq)]
pub enum BundleError {
    #[error("bundle has no users or no items (n_users={n_users}, n_items={n_items})")]
    EmptyUniverse { n_users: usize, n_items: usize },

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("{field}: user id {id} out of range (n_users={n_users})")]
    UserOutOfRange { field: &'static str, id: usize, n_users: usize },

    #[error("{field}: item id {id} out of range (n_items={n_items})")]
    ItemOutOfRange { field: &'static str, id: usize, n_items: usize },

    #[error("{field}: expected {expected} rows, found {found}")]
    RowCount { field: &'static str, expected: usize, found: usize },

    #[error("user side feature '{0}' not found")]
    MissingAttribute(String),

    #[error("user side feature '{name}' has {found} values, expected {expected}")]
    AttributeLength { name: String, expected: usize, found: usize },

    #[error("user side feature '{name}' has negative value {value} for user {user}")]
    NegativeLabel { name: String, user: usize, value: i64 },
}

#[derive(Debug, Clone, Default)]
pub struct InteractionBundle {
    pub n_users:            usize,
    pub n_items:            usize,
    pub train_u2i:          Vec<Vec<usize>>,
    pub train_i2u:          Vec<Vec<usize>>,
    pub test_u2i:           Vec<Vec<usize>>,
    pub test_i2u:           Vec<Vec<usize>>,
    pub train_set:          Vec<(usize, usize)>,
    pub test_set:           Vec<(usize, usize)>,
    pub user_side_features: BTreeMap<String, Vec<i64>>,
}

impl InteractionBundle {
    /// Check every id against `n_users` / `n_items` and every per-id
    /// table against its expected row count.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.n_users == 0 || self.n_items == 0 {
            return Err(BundleError::EmptyUniverse {
                n_users: self.n_users,
                n_items: self.n_items,
            });
        }
        if self.train_set.is_empty() {
            return Err(BundleError::EmptyTrainingSet);
        }

        for (field, table) in [("train_u2i", &self.train_u2i), ("test_u2i", &self.test_u2i)] {
            check_rows(field, table, self.n_users)?;
            for &item in table.iter().flatten() {
                self.check_item(field, item)?;
            }
        }
        for (field, table) in [("train_i2u", &self.train_i2u), ("test_i2u", &self.test_i2u)] {
            check_rows(field, table, self.n_items)?;
            for &user in table.iter().flatten() {
                self.check_user(field, user)?;
            }
        }
        for (field, pairs) in [("train_set", &self.train_set), ("test_set", &self.test_set)] {
            for &(user, item) in pairs {
                self.check_user(field, user)?;
                self.check_item(field, item)?;
            }
        }
        for (name, column) in &self.user_side_features {
            if column.len() != self.n_users {
                return Err(BundleError::AttributeLength {
                    name:     name.clone(),
                    expected: self.n_users,
                    found:    column.len(),
                });
            }
        }
        Ok(())
    }

    /// Sensitive labels for every user, as class indices.
    pub fn sensitive(&self, name: &str) -> Result<Vec<usize>, BundleError> {
        let column = self
            .user_side_features
            .get(name)
            .ok_or_else(|| BundleError::MissingAttribute(name.to_string()))?;

        if column.len() != self.n_users {
            return Err(BundleError::AttributeLength {
                name:     name.to_string(),
                expected: self.n_users,
                found:    column.len(),
            });
        }

        column
            .iter()
            .enumerate()
            .map(|(user, &value)| {
                usize::try_from(value).map_err(|_| BundleError::NegativeLabel {
                    name: name.to_string(),
                    user,
                    value,
                })
            })
            .collect()
    }

    pub fn train_interactions(&self) -> usize {
        self.train_u2i.iter().map(Vec::len).sum()
    }

    pub fn test_users(&self) -> usize {
        self.test_u2i.iter().filter(|items| !items.is_empty()).count()
    }

    fn check_user(&self, field: &'static str, id: usize) -> Result<(), BundleError> {
        if id >= self.n_users {
            return Err(BundleError::UserOutOfRange { field, id, n_users: self.n_users });
        }
        Ok(())
    }

    fn check_item(&self, field: &'static str, id: usize) -> Result<(), BundleError> {
        if id >= self.n_items {
            return Err(BundleError::ItemOutOfRange { field, id, n_items: self.n_items });
        }
        Ok(())
    }
}

fn check_rows(field: &'static str, table: &[Vec<usize>], expected: usize) -> Result<(), BundleError> {
    if table.len() != expected {
        return Err(BundleError::RowCount { field, expected, found: table.len() });
    }
    Ok(())
}

/// Number of classes a classifier needs to cover every label.
///
/// Equal to the number of distinct labels when labels are contiguous
/// from zero; gaps widen the head instead of breaking cross-entropy.
pub fn class_count(labels: &[usize]) -> usize {
    let distinct = labels.iter().collect::<BTreeSet<_>>().len();
    let span = labels.iter().max().map_or(0, |&m| m + 1);
    distinct.max(span)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// 4 users, 5 items, binary gender. Users 0/1 are group 0, 2/3 group 1.
    pub fn toy_bundle() -> InteractionBundle {
        let train_u2i = vec![vec![0, 1, 2], vec![1, 2], vec![2, 3], vec![3, 4, 0]];
        let test_u2i  = vec![vec![3], vec![0], vec![4], vec![1]];
        let n_items = 5;

        let invert = |u2i: &[Vec<usize>]| {
            let mut i2u = vec![Vec::new(); n_items];
            for (u, items) in u2i.iter().enumerate() {
                for &i in items {
                    i2u[i].push(u);
                }
            }
            i2u
        };
        let pairs = |u2i: &[Vec<usize>]| {
            u2i.iter()
                .enumerate()
                .flat_map(|(u, items)| items.iter().map(move |&i| (u, i)))
                .collect::<Vec<_>>()
        };

        let mut user_side_features = BTreeMap::new();
        user_side_features.insert("gender".to_string(), vec![0, 0, 1, 1]);

        InteractionBundle {
            n_users: 4,
            n_items,
            train_i2u: invert(&train_u2i),
            test_i2u:  invert(&test_u2i),
            train_set: pairs(&train_u2i),
            test_set:  pairs(&test_u2i),
            train_u2i,
            test_u2i,
            user_side_features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::toy_bundle;
    use super::*;

    #[test]
    fn test_toy_bundle_is_valid() {
        let bundle = toy_bundle();
        assert_eq!(bundle.validate(), Ok(()));
        assert_eq!(bundle.train_interactions(), 10);
        assert_eq!(bundle.test_users(), 4);
    }

    #[test]
    fn test_item_out_of_range() {
        let mut bundle = toy_bundle();
        bundle.train_u2i[1].push(9);
        assert_eq!(
            bundle.validate(),
            Err(BundleError::ItemOutOfRange { field: "train_u2i", id: 9, n_items: 5 })
        );
    }

    #[test]
    fn test_user_out_of_range_in_pairs() {
        let mut bundle = toy_bundle();
        bundle.test_set.push((7, 0));
        assert!(matches!(
            bundle.validate(),
            Err(BundleError::UserOutOfRange { field: "test_set", id: 7, .. })
        ));
    }

    #[test]
    fn test_sensitive_column() {
        let bundle = toy_bundle();
        let sens = bundle.sensitive("gender").unwrap();
        assert_eq!(sens, vec![0, 0, 1, 1]);
        assert_eq!(class_count(&sens), 2);
        assert_eq!(class_count(&[0, 3, 3]), 4);
        assert_eq!(class_count(&[]), 0);
        assert_eq!(
            bundle.sensitive("age"),
            Err(BundleError::MissingAttribute("age".to_string()))
        );
    }

    #[test]
    fn test_negative_label_rejected() {
        let mut bundle = toy_bundle();
        bundle.user_side_features.insert("gender".into(), vec![0, -1, 1, 1]);
        assert!(matches!(
            bundle.sensitive("gender"),
            Err(BundleError::NegativeLabel { user: 1, value: -1, .. })
        ));
    }

    #[test]
    fn test_empty_training_set() {
        let mut bundle = toy_bundle();
        bundle.train_set.clear();
        assert_eq!(bundle.validate(), Err(BundleError::EmptyTrainingSet));
    }
}
