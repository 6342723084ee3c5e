use mongodb::bson::{Document, doc};
use serde::Deserialize;

use crate::book::lenient_text;

/// Output field holding the per-group average
pub const AVERAGE_FIELD: &str = "average";

/// Output field holding the per-group document count
pub const COUNT_FIELD: &str = "count";

/// Suffix appended to a decade number to form its bucket label
pub const DECADE_SUFFIX: &str = "s";

/// Grouping aggregations run by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    /// Average of `field` per distinct `group`, sorted by group ascending
    AverageBy { group: String, field: String },
    /// The `group` value with the most documents; ties go to the smallest key
    TopByCount { group: String },
    /// Document count per decade of the numeric `field`, sorted by label
    CountByDecade { field: String },
}

impl Aggregation {
    pub fn average_by(group: impl Into<String>, field: impl Into<String>) -> Self {
        Aggregation::AverageBy {
            group: group.into(),
            field: field.into(),
        }
    }

    pub fn top_by_count(group: impl Into<String>) -> Self {
        Aggregation::TopByCount {
            group: group.into(),
        }
    }

    pub fn count_by_decade(field: impl Into<String>) -> Self {
        Aggregation::CountByDecade {
            field: field.into(),
        }
    }

    /// MongoDB pipeline stages for this aggregation
    pub fn pipeline(&self) -> Vec<Document> {
        match self {
            Aggregation::AverageBy { group, field } => {
                let mut stage = doc! { "_id": format!("${group}") };
                stage.insert(AVERAGE_FIELD, doc! { "$avg": format!("${field}") });
                vec![doc! { "$group": stage }, doc! { "$sort": { "_id": 1 } }]
            }
            Aggregation::TopByCount { group } => {
                let mut stage = doc! { "_id": format!("${group}") };
                stage.insert(COUNT_FIELD, doc! { "$sum": 1 });
                let mut sort = Document::new();
                sort.insert(COUNT_FIELD, -1);
                sort.insert("_id", 1);
                vec![
                    doc! { "$group": stage },
                    doc! { "$sort": sort },
                    doc! { "$limit": 1 },
                ]
            }
            Aggregation::CountByDecade { field } => {
                let decade = doc! {
                    "$concat": [
                        { "$toString": {
                            "$multiply": [
                                { "$floor": { "$divide": [format!("${field}"), 10] } },
                                10,
                            ]
                        } },
                        DECADE_SUFFIX,
                    ]
                };
                let mut stage = doc! { "_id": decade };
                stage.insert(COUNT_FIELD, doc! { "$sum": 1 });
                vec![doc! { "$group": stage }, doc! { "$sort": { "_id": 1 } }]
            }
        }
    }
}

/// Row produced by [`Aggregation::AverageBy`]. Field names match
/// [`AVERAGE_FIELD`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupAverage {
    #[serde(rename = "_id", default, deserialize_with = "lenient_text")]
    pub category: Option<String>,
    #[serde(default)]
    pub average: Option<f64>,
}

/// Row produced by [`Aggregation::TopByCount`] and
/// [`Aggregation::CountByDecade`]. Field names match [`COUNT_FIELD`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupCount {
    #[serde(rename = "_id", default, deserialize_with = "lenient_text")]
    pub key: Option<String>,
    pub count: i64,
}

/// Decade bucket label for a year, e.g. 1949 -> "1940s"
pub fn decade_label(year: i64) -> String {
    format!("{}{}", year.div_euclid(10) * 10, DECADE_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;

    #[test]
    fn test_decade_label_boundaries() {
        assert_eq!(decade_label(1949), "1940s");
        assert_eq!(decade_label(1950), "1950s");
        assert_eq!(decade_label(1813), "1810s");
        assert_eq!(decade_label(2020), "2020s");
    }

    #[test]
    fn test_average_pipeline_shape() {
        let pipeline = Aggregation::average_by("genre", "price").pipeline();
        assert_eq!(
            pipeline,
            vec![
                doc! { "$group": { "_id": "$genre", "average": { "$avg": "$price" } } },
                doc! { "$sort": { "_id": 1 } },
            ]
        );
    }

    #[test]
    fn test_top_by_count_breaks_ties_on_key() {
        let pipeline = Aggregation::top_by_count("author").pipeline();
        assert_eq!(pipeline.len(), 3);
        assert_eq!(pipeline[1], doc! { "$sort": { "count": -1, "_id": 1 } });
        assert_eq!(pipeline[2], doc! { "$limit": 1 });
    }

    #[test]
    fn test_decade_pipeline_concatenates_suffix() {
        let pipeline = Aggregation::count_by_decade("published_year").pipeline();
        let id = pipeline[0]
            .get_document("$group")
            .unwrap()
            .get_document("_id")
            .unwrap();
        let parts = id.get_array("$concat").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], bson::Bson::String("s".to_string()));
    }

    #[test]
    fn test_pipelines_name_output_fields() {
        let average = Aggregation::average_by("genre", "price").pipeline();
        let group = average[0].get_document("$group").unwrap();
        assert!(group.contains_key(AVERAGE_FIELD));

        let top = Aggregation::top_by_count("author").pipeline();
        let group = top[0].get_document("$group").unwrap();
        assert_eq!(group.get_document(COUNT_FIELD).unwrap(), &doc! { "$sum": 1 });

        let row: GroupCount =
            bson::from_document(doc! { "_id": "George Orwell", "count": 2 }).unwrap();
        assert_eq!(row.count, 2);
    }

    #[test]
    fn test_array_group_key_decodes_as_text() {
        let row: GroupAverage = bson::from_document(doc! {
            "_id": ["Fiction", "Classic"],
            "average": 20.0,
        })
        .unwrap();
        assert_eq!(row.category.as_deref(), Some("Fiction, Classic"));
    }

    #[test]
    fn test_rows_decode_from_server_shapes() {
        let avg: GroupAverage =
            bson::from_document(doc! { "_id": "Fiction", "average": 11.5 }).unwrap();
        assert_eq!(avg.category.as_deref(), Some("Fiction"));
        assert_eq!(avg.average, Some(11.5));

        // $sum yields Int32 on the server
        let count: GroupCount = bson::from_document(doc! { "_id": null, "count": 3_i32 }).unwrap();
        assert_eq!(count.key, None);
        assert_eq!(count.count, 3);
    }
}
