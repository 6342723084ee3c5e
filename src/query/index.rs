use anyhow::{Result, anyhow};
use mongodb::bson::Document;

use super::find::SortDirection;

/// Ordered list of index keys. Field order decides which queries can use the
/// index as a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    keys: Vec<(String, SortDirection)>,
}

impl IndexSpec {
    pub fn single(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            keys: vec![(field.into(), direction)],
        }
    }

    pub fn compound<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, SortDirection)>,
        S: Into<String>,
    {
        let mut collected: Vec<(String, SortDirection)> = Vec::new();
        for (field, direction) in keys {
            let field = field.into();
            if collected.iter().any(|(f, _)| *f == field) {
                return Err(anyhow!("Duplicate field '{}' in index keys", field));
            }
            collected.push((field, direction));
        }
        if collected.is_empty() {
            return Err(anyhow!("An index needs at least one key"));
        }
        Ok(Self { keys: collected })
    }

    pub fn key_document(&self) -> Document {
        let mut doc = Document::new();
        for (field, direction) in &self.keys {
            doc.insert(field.as_str(), direction.as_i32());
        }
        doc
    }

    /// Default server-side name, e.g. `author_1_published_year_1`
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| format!("{}_{}", field, direction.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Whether an equality filter on `fields` can seek on this index, i.e.
    /// the leading key is constrained
    pub fn usable_for(&self, fields: &[&str]) -> bool {
        self.keys
            .first()
            .is_some_and(|(leading, _)| fields.contains(&leading.as_str()))
    }

    /// Number of leading keys covered by `fields`
    pub fn prefix_len(&self, fields: &[&str]) -> usize {
        self.keys
            .iter()
            .take_while(|(field, _)| fields.contains(&field.as_str()))
            .count()
    }

    /// Human readable key list, e.g. `author (ascending), published_year (ascending)`
    pub fn describe(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| format!("{} ({})", field, direction.label()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
