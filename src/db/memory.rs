//! In-memory store evaluating the subset of query semantics the catalog uses.
//!
//! Backs dry runs and tests. Documents are kept in insertion order, which
//! plays the role of storage order.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use std::cmp::Ordering;
use tokio::sync::RwLock;

use super::store::{BookStore, DeleteSummary, UpdateSummary};
use crate::query::aggregate::{AVERAGE_FIELD, COUNT_FIELD};
use crate::query::{Aggregation, Filter, FindSpec, IndexSpec, SortDirection, decade_label};

const ID_INDEX: &str = "_id_";

#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<Vec<Document>>,
    indexes: RwLock<Vec<IndexSpec>>,
}

impl MemoryStore {
    pub fn new(docs: Vec<Document>) -> Self {
        Self {
            docs: RwLock::new(docs.into_iter().map(with_id).collect()),
            indexes: RwLock::new(Vec::new()),
        }
    }

    /// Store preloaded with the sample inventory
    pub fn seeded() -> Result<Self> {
        Ok(Self::new(crate::seed::sample_documents()?))
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    fn namespace(&self) -> String {
        "memory.books".to_string()
    }

    async fn find(&self, spec: &FindSpec) -> Result<Vec<Document>> {
        let docs = self.docs.read().await;
        let mut matched = Vec::new();
        for doc in docs.iter() {
            if matches(doc, spec.filter.as_document())? {
                matched.push(doc);
            }
        }

        if let Some(sort) = &spec.sort {
            // Stable: ties keep storage order
            matched.sort_by(|a, b| {
                let ord = compare_for_sort(a.get(&sort.field), b.get(&sort.field));
                match sort.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }

        let skip = spec.skip.unwrap_or(0) as usize;
        let limit = match spec.limit {
            Some(0) | None => usize::MAX,
            Some(n) => n.unsigned_abs() as usize,
        };

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &spec.projection {
                Some(projection) => project(doc, projection.as_document()),
                None => doc.clone(),
            })
            .collect())
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>> {
        let docs = self.docs.read().await;
        for doc in docs.iter() {
            if matches(doc, filter.as_document())? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn update_one(&self, filter: &Filter, fields: Document) -> Result<UpdateSummary> {
        if let Some(key) = fields.keys().find(|k| k.starts_with('$')) {
            bail!("Field name '{}' must not start with '$'", key);
        }

        let mut docs = self.docs.write().await;
        let Some(doc) = first_match(&mut docs, filter)? else {
            return Ok(UpdateSummary::default());
        };

        let mut modified = false;
        for (field, value) in fields {
            if doc.get(&field) != Some(&value) {
                modified = true;
                doc.insert(field, value);
            }
        }
        Ok(UpdateSummary {
            matched: 1,
            modified: u64::from(modified),
        })
    }

    async fn delete_one(&self, filter: &Filter) -> Result<DeleteSummary> {
        let mut docs = self.docs.write().await;
        let mut position = None;
        for (i, doc) in docs.iter().enumerate() {
            if matches(doc, filter.as_document())? {
                position = Some(i);
                break;
            }
        }
        Ok(match position {
            Some(i) => {
                docs.remove(i);
                DeleteSummary { deleted: 1 }
            }
            None => DeleteSummary::default(),
        })
    }

    async fn aggregate(&self, aggregation: &Aggregation) -> Result<Vec<Document>> {
        let docs = self.docs.read().await;
        let rows = match aggregation {
            Aggregation::AverageBy { group, field } => {
                let mut groups: Vec<(Bson, Vec<f64>)> = Vec::new();
                for doc in docs.iter() {
                    let key = doc.get(group).cloned().unwrap_or(Bson::Null);
                    let slot = group_slot(&mut groups, key);
                    if let Some(value) = doc.get(field).and_then(as_f64) {
                        slot.push(value);
                    }
                }
                groups.sort_by(|a, b| compare_for_sort(Some(&a.0), Some(&b.0)));
                groups
                    .into_iter()
                    .map(|(key, values)| {
                        let average = if values.is_empty() {
                            Bson::Null
                        } else {
                            Bson::Double(values.iter().sum::<f64>() / values.len() as f64)
                        };
                        let mut row = doc! { "_id": key };
                        row.insert(AVERAGE_FIELD, average);
                        row
                    })
                    .collect()
            }
            Aggregation::TopByCount { group } => {
                let mut counts = count_groups(docs.iter().map(|doc| {
                    doc.get(group).cloned().unwrap_or(Bson::Null)
                }));
                counts.sort_by(|a, b| {
                    b.1.cmp(&a.1)
                        .then_with(|| compare_for_sort(Some(&a.0), Some(&b.0)))
                });
                counts.truncate(1);
                count_rows(counts)
            }
            Aggregation::CountByDecade { field } => {
                let mut keys = Vec::with_capacity(docs.len());
                for doc in docs.iter() {
                    keys.push(decade_key(doc.get(field))?);
                }
                let mut counts = count_groups(keys.into_iter());
                counts.sort_by(|a, b| compare_for_sort(Some(&a.0), Some(&b.0)));
                count_rows(counts)
            }
        };
        Ok(rows)
    }

    async fn create_index(&self, index: &IndexSpec) -> Result<String> {
        let mut indexes = self.indexes.write().await;
        let name = index.name();
        if !indexes.iter().any(|existing| existing.name() == name) {
            indexes.push(index.clone());
        }
        Ok(name)
    }

    async fn index_names(&self) -> Result<Vec<String>> {
        let indexes = self.indexes.read().await;
        let mut names = vec![ID_INDEX.to_string()];
        names.extend(indexes.iter().map(IndexSpec::name));
        Ok(names)
    }

    async fn explain(&self, filter: &Filter) -> Result<Document> {
        let docs = self.docs.read().await;
        let indexes = self.indexes.read().await;
        let fields = filter.fields();

        let mut returned = 0i64;
        for doc in docs.iter() {
            if matches(doc, filter.as_document())? {
                returned += 1;
            }
        }

        let chosen = indexes
            .iter()
            .filter(|index| index.usable_for(&fields))
            .max_by_key(|index| index.prefix_len(&fields));

        let (plan, keys_examined, docs_examined) = match chosen {
            Some(index) => (
                doc! {
                    "stage": "FETCH",
                    "inputStage": {
                        "stage": "IXSCAN",
                        "indexName": index.name(),
                        "keyPattern": index.key_document(),
                    },
                },
                returned,
                returned,
            ),
            None => (
                doc! {
                    "stage": "COLLSCAN",
                    "filter": filter.as_document().clone(),
                },
                0,
                docs.len() as i64,
            ),
        };

        Ok(doc! {
            "queryPlanner": { "winningPlan": plan },
            "executionStats": {
                "nReturned": returned,
                "executionTimeMillis": 0,
                "totalKeysExamined": keys_examined,
                "totalDocsExamined": docs_examined,
            },
        })
    }

    async fn insert_many(&self, new_docs: Vec<Document>) -> Result<u64> {
        let mut docs = self.docs.write().await;
        let count = new_docs.len() as u64;
        docs.extend(new_docs.into_iter().map(with_id));
        Ok(count)
    }

    async fn drop_collection(&self) -> Result<()> {
        self.docs.write().await.clear();
        self.indexes.write().await.clear();
        Ok(())
    }
}

/// Decade bucket for one value. Missing and null values group under null;
/// other non-numeric values fail the way `$divide` does on the server.
fn decade_key(value: Option<&Bson>) -> Result<Bson> {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => Ok(Bson::Null),
        Some(v) => match as_f64(v) {
            Some(year) => Ok(Bson::String(decade_label(year.floor() as i64))),
            None => bail!(
                "$divide only supports numeric types, not {:?}",
                v.element_type()
            ),
        },
    }
}

fn first_match<'a>(docs: &'a mut [Document], filter: &Filter) -> Result<Option<&'a mut Document>> {
    for doc in docs.iter_mut() {
        if matches(doc, filter.as_document())? {
            return Ok(Some(doc));
        }
    }
    Ok(None)
}

fn with_id(doc: Document) -> Document {
    if doc.contains_key("_id") {
        return doc;
    }
    let mut out = doc! { "_id": ObjectId::new() };
    for (k, v) in doc {
        out.insert(k, v);
    }
    out
}

fn group_slot(groups: &mut Vec<(Bson, Vec<f64>)>, key: Bson) -> &mut Vec<f64> {
    let position = match groups.iter().position(|(k, _)| *k == key) {
        Some(i) => i,
        None => {
            groups.push((key, Vec::new()));
            groups.len() - 1
        }
    };
    &mut groups[position].1
}

fn count_groups(keys: impl Iterator<Item = Bson>) -> Vec<(Bson, i32)> {
    let mut counts: Vec<(Bson, i32)> = Vec::new();
    for key in keys {
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => counts.push((key, 1)),
        }
    }
    counts
}

fn count_rows(counts: Vec<(Bson, i32)>) -> Vec<Document> {
    counts
        .into_iter()
        .map(|(key, count)| {
            let mut row = doc! { "_id": key };
            row.insert(COUNT_FIELD, count);
            row
        })
        .collect()
}

/// Evaluate a filter document against a stored document
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" | "$or" => {
                let clauses = condition
                    .as_array()
                    .ok_or_else(|| anyhow!("{} requires an array", key))?;
                let mut results = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    let clause = clause
                        .as_document()
                        .ok_or_else(|| anyhow!("{} clauses must be documents", key))?;
                    results.push(matches(doc, clause)?);
                }
                if key == "$and" {
                    results.iter().all(|r| *r)
                } else {
                    results.iter().any(|r| *r)
                }
            }
            op if op.starts_with('$') => bail!("Unsupported top-level operator '{}'", op),
            field => field_matches(doc.get(field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let operators = match condition {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => ops,
        _ => return Ok(any_element(value, |v| values_equal(v, condition))),
    };

    for (op, operand) in operators {
        let ordering = |wanted: &[Ordering]| {
            any_element(value, |v| {
                v.and_then(|v| compare_values(v, operand))
                    .is_some_and(|o| wanted.contains(&o))
            })
        };
        let ok = match op.as_str() {
            "$eq" => any_element(value, |v| values_equal(v, operand)),
            "$ne" => !any_element(value, |v| values_equal(v, operand)),
            "$gt" => ordering(&[Ordering::Greater]),
            "$gte" => ordering(&[Ordering::Greater, Ordering::Equal]),
            "$lt" => ordering(&[Ordering::Less]),
            "$lte" => ordering(&[Ordering::Less, Ordering::Equal]),
            other => bail!("Unsupported query operator '{}'", other),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// A predicate on an array field holds if it holds for the whole array or
/// for any one element
fn any_element(value: Option<&Bson>, pred: impl Fn(Option<&Bson>) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => pred(value) || items.iter().any(|item| pred(Some(item))),
        _ => pred(value),
    }
}

fn values_equal(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(v) => compare_values(v, expected) == Some(Ordering::Equal),
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Comparison within one type bracket; `None` across brackets
fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// Position of a value's type in the server's cross-type sort order
fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => 2,
        Some(Bson::String(_) | Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(_) => 10,
    }
}

fn compare_for_sort(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let by_type = type_rank(a).cmp(&type_rank(b));
    if by_type != Ordering::Equal {
        return by_type;
    }
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        other => as_f64(other).is_none_or(|n| n != 0.0),
    }
}

/// Apply an inclusion or exclusion projection. Output keeps document order.
fn project(doc: &Document, projection: &Document) -> Document {
    let inclusion = projection.iter().any(|(k, v)| k != "_id" && truthy(v));
    let include_id = projection.get("_id").is_none_or(truthy);

    let mut out = Document::new();
    for (key, value) in doc {
        let keep = if key == "_id" {
            include_id
        } else if inclusion {
            projection.get(key).is_some_and(truthy)
        } else {
            projection.get(key).is_none_or(truthy)
        };
        if keep {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FindSpecBuilder, Projection, SortKey};

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            doc! { "title": "A", "genre": "Fiction", "published_year": 1949, "price": 10.0, "in_stock": true },
            doc! { "title": "B", "genre": "Fiction", "published_year": 1950, "price": 12.0, "in_stock": false },
            doc! { "title": "C", "genre": "Fantasy", "published_year": 2015, "price": 8.0, "in_stock": true },
            doc! { "title": "D", "price": 8.0 },
        ])
    }

    fn titles(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.get_str("title").unwrap()).collect()
    }

    #[test]
    fn test_matches_equality_and_comparison() {
        let doc = doc! { "genre": "Fiction", "published_year": 1960, "in_stock": true };
        assert!(matches(&doc, &doc! { "genre": "Fiction" }).unwrap());
        assert!(!matches(&doc, &doc! { "genre": "Fantasy" }).unwrap());
        assert!(matches(&doc, &doc! { "published_year": { "$gt": 1950 } }).unwrap());
        assert!(!matches(&doc, &doc! { "published_year": { "$gt": 1960 } }).unwrap());
        assert!(matches(&doc, &doc! { "published_year": { "$gte": 1960_i64 } }).unwrap());
        assert!(matches(&doc, &doc! { "published_year": 1960.0 }).unwrap());
        // Comparisons never cross type brackets
        assert!(!matches(&doc, &doc! { "genre": { "$gt": 5 } }).unwrap());
        assert!(matches(&doc, &doc! { "missing": null }).unwrap());
    }

    #[test]
    fn test_matches_array_elements() {
        let doc = doc! { "genre": ["Fiction", "Classic"], "ratings": [3, 5] };
        assert!(matches(&doc, &doc! { "genre": "Classic" }).unwrap());
        assert!(matches(&doc, &doc! { "genre": ["Fiction", "Classic"] }).unwrap());
        assert!(!matches(&doc, &doc! { "genre": "Fantasy" }).unwrap());
        assert!(matches(&doc, &doc! { "ratings": { "$gt": 4 } }).unwrap());
        assert!(!matches(&doc, &doc! { "ratings": { "$gt": 5 } }).unwrap());
        assert!(!matches(&doc, &doc! { "genre": { "$ne": "Fiction" } }).unwrap());
    }

    #[test]
    fn test_matches_rejects_unknown_operator() {
        let doc = doc! { "title": "A" };
        assert!(matches(&doc, &doc! { "title": { "$regex": "A" } }).is_err());
        assert!(matches(&doc, &doc! { "$where": "true" }).is_err());
    }

    #[test]
    fn test_projection_inclusion_and_exclusion() {
        let doc = doc! { "_id": 1, "title": "A", "author": "X", "price": 3.0 };
        assert_eq!(
            project(&doc, &doc! { "price": 1, "title": 1, "_id": 0 }),
            doc! { "title": "A", "price": 3.0 }
        );
        assert_eq!(
            project(&doc, &doc! { "title": 1 }),
            doc! { "_id": 1, "title": "A" }
        );
        assert_eq!(
            project(&doc, &doc! { "author": 0 }),
            doc! { "_id": 1, "title": "A", "price": 3.0 }
        );
    }

    #[tokio::test]
    async fn test_find_sorts_stably_and_pages() {
        let store = store();
        let spec = FindSpecBuilder::default()
            .filter(Filter::all())
            .projection(Projection::include(&["title", "price"]))
            .sort(SortKey::new("price", SortDirection::Ascending))
            .build()
            .unwrap();
        let docs = store.find(&spec).await.unwrap();
        // C and D tie on price and keep storage order
        assert_eq!(titles(&docs), vec!["C", "D", "A", "B"]);
        assert!(!docs[0].contains_key("_id"));

        let page = FindSpecBuilder::default()
            .filter(Filter::all())
            .skip(1)
            .limit(2)
            .build()
            .unwrap();
        assert_eq!(titles(&store.find(&page).await.unwrap()), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_sort_places_missing_fields_first() {
        let store = store();
        let spec = FindSpecBuilder::default()
            .filter(Filter::all())
            .sort(SortKey::new("published_year", SortDirection::Ascending))
            .build()
            .unwrap();
        assert_eq!(
            titles(&store.find(&spec).await.unwrap()),
            vec!["D", "A", "B", "C"]
        );
    }

    #[tokio::test]
    async fn test_update_reports_unchanged_values() {
        let store = store();
        let filter = Filter::eq("title", "A");

        let first = store
            .update_one(&filter, doc! { "price": 11.99 })
            .await
            .unwrap();
        assert_eq!(first, UpdateSummary { matched: 1, modified: 1 });

        let again = store
            .update_one(&filter, doc! { "price": 11.99 })
            .await
            .unwrap();
        assert_eq!(again, UpdateSummary { matched: 1, modified: 0 });

        let none = store
            .update_one(&Filter::eq("title", "Z"), doc! { "price": 1.0 })
            .await
            .unwrap();
        assert_eq!(none, UpdateSummary::default());

        assert!(
            store
                .update_one(&filter, doc! { "$inc": { "price": 1 } })
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_delete_removes_first_match_only() {
        let store = store();
        let summary = store
            .delete_one(&Filter::eq("genre", "Fiction"))
            .await
            .unwrap();
        assert_eq!(summary.deleted, 1);
        let remaining = store
            .find(&FindSpec::filtered(Filter::all()))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(store.find_one(&Filter::eq("title", "A")).await.unwrap().is_none());
        assert!(store.find_one(&Filter::eq("title", "B")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_aggregations_group_missing_keys_as_null() {
        let store = store();

        let averages = store
            .aggregate(&Aggregation::average_by("genre", "price"))
            .await
            .unwrap();
        assert_eq!(
            averages,
            vec![
                doc! { "_id": null, "average": 8.0 },
                doc! { "_id": "Fantasy", "average": 8.0 },
                doc! { "_id": "Fiction", "average": 11.0 },
            ]
        );

        let decades = store
            .aggregate(&Aggregation::count_by_decade("published_year"))
            .await
            .unwrap();
        assert_eq!(
            decades,
            vec![
                doc! { "_id": null, "count": 1 },
                doc! { "_id": "1940s", "count": 1 },
                doc! { "_id": "1950s", "count": 1 },
                doc! { "_id": "2010s", "count": 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_decade_buckets_reject_non_numeric_years() {
        let store = MemoryStore::new(vec![
            doc! { "title": "A", "published_year": 1999.0 },
            doc! { "title": "B", "published_year": "nineteen" },
        ]);
        let err = store
            .aggregate(&Aggregation::count_by_decade("published_year"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("$divide only supports numeric types"));

        let store = MemoryStore::new(vec![
            doc! { "title": "A", "published_year": 1999.0 },
            doc! { "title": "B", "published_year": null },
        ]);
        let decades = store
            .aggregate(&Aggregation::count_by_decade("published_year"))
            .await
            .unwrap();
        assert_eq!(
            decades,
            vec![
                doc! { "_id": null, "count": 1 },
                doc! { "_id": "1990s", "count": 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_top_by_count_tie_goes_to_smallest_key() {
        let store = MemoryStore::new(vec![
            doc! { "author": "Zed" },
            doc! { "author": "Amy" },
            doc! { "author": "Zed" },
            doc! { "author": "Amy" },
            doc! { "author": "Bob" },
        ]);
        let top = store
            .aggregate(&Aggregation::top_by_count("author"))
            .await
            .unwrap();
        assert_eq!(top, vec![doc! { "_id": "Amy", "count": 2 }]);
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let store = store();
        let index = IndexSpec::single("title", SortDirection::Ascending);
        assert_eq!(store.create_index(&index).await.unwrap(), "title_1");
        assert_eq!(store.create_index(&index).await.unwrap(), "title_1");
        assert_eq!(store.index_names().await.unwrap(), vec!["_id_", "title_1"]);
    }

    #[tokio::test]
    async fn test_explain_reports_index_scan_when_usable() {
        let store = store();
        let filter = Filter::eq("title", "A");

        let before = store.explain(&filter).await.unwrap();
        assert_eq!(
            before
                .get_document("queryPlanner")
                .unwrap()
                .get_document("winningPlan")
                .unwrap()
                .get_str("stage")
                .unwrap(),
            "COLLSCAN"
        );

        store
            .create_index(&IndexSpec::single("title", SortDirection::Ascending))
            .await
            .unwrap();
        let after = store.explain(&filter).await.unwrap();
        let stats = after.get_document("executionStats").unwrap();
        assert_eq!(stats.get_i64("totalKeysExamined").unwrap(), 1);
        assert_eq!(stats.get_i64("totalDocsExamined").unwrap(), 1);
    }
}
