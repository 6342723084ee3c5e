use derive_builder::Builder;
use mongodb::bson::{Bson, Document, doc};

/// Direction of a sort key or index key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Server representation (`1` / `-1`)
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
        }
    }
}

/// A query predicate. Conditions on distinct fields are combined with an
/// implicit AND; a second condition on the same field goes through `$and`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Document);

impl Filter {
    /// Matches every document
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: &str, value: impl Into<Bson>) -> Self {
        let mut doc = Document::new();
        doc.insert(field, value.into());
        Self(doc)
    }

    pub fn gt(field: &str, value: impl Into<Bson>) -> Self {
        Self::compare(field, "$gt", value)
    }

    fn compare(field: &str, op: &str, value: impl Into<Bson>) -> Self {
        let mut cond = Document::new();
        cond.insert(op, value.into());
        let mut doc = Document::new();
        doc.insert(field, cond);
        Self(doc)
    }

    /// Conjunction of this filter and `other`
    pub fn and(self, other: Filter) -> Self {
        if self.0.keys().any(|k| other.0.contains_key(k)) {
            return Self(doc! { "$and": [self.0, other.0] });
        }
        let mut merged = self.0;
        for (field, cond) in other.0 {
            merged.insert(field, cond);
        }
        Self(merged)
    }

    /// Names of the fields the filter constrains at the top level
    pub fn fields(&self) -> Vec<&str> {
        self.0
            .keys()
            .filter(|k| !k.starts_with('$'))
            .map(String::as_str)
            .collect()
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

}

/// Fields to include in returned documents
#[derive(Debug, Clone, PartialEq)]
pub struct Projection(Document);

impl Projection {
    /// Inclusion projection. `_id` is excluded unless it is one of `fields`.
    pub fn include(fields: &[&str]) -> Self {
        let mut doc = Document::new();
        for field in fields {
            doc.insert(*field, 1);
        }
        if !fields.contains(&"_id") {
            doc.insert("_id", 0);
        }
        Self(doc)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }
}

/// Single sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(self.field.as_str(), self.direction.as_i32());
        doc
    }
}

/// Descriptor shared by every read in the catalog
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct FindSpec {
    #[builder(setter(into))]
    pub filter: Filter,
    #[builder(default, setter(into, strip_option))]
    pub projection: Option<Projection>,
    #[builder(default, setter(into, strip_option))]
    pub sort: Option<SortKey>,
    #[builder(default, setter(strip_option))]
    pub skip: Option<u64>,
    #[builder(default, setter(strip_option))]
    pub limit: Option<i64>,
}

impl FindSpec {
    /// Plain filtered read with no projection, sort or paging
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            projection: None,
            sort: None,
            skip: None,
            limit: None,
        }
    }
}
