use mongodb::bson::Bson;
use serde::{Deserialize, Deserializer, Serialize};

/// A document of the books collection. Every field is optional: the
/// collection is schemaless and projections return partial documents.
///
/// Decoding never fails on a field of an unexpected BSON type. Numbers are
/// accepted in any numeric representation, text fields render scalars and
/// arrays as text, and anything else decodes as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_i32")]
    pub published_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_bool")]
    pub in_stock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_i32")]
    pub pages: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub publisher: Option<String>,
}

impl Book {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: &str,
        author: &str,
        genre: &str,
        published_year: i32,
        price: f64,
        in_stock: bool,
        pages: i32,
        publisher: &str,
    ) -> Self {
        Self {
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            genre: Some(genre.to_string()),
            published_year: Some(published_year),
            price: Some(price),
            in_stock: Some(in_stock),
            pages: Some(pages),
            publisher: Some(publisher.to_string()),
        }
    }
}

/// Text form of a stored value; arrays are joined with `, `
fn display_text(value: &Bson) -> Option<String> {
    match value {
        Bson::Null | Bson::Undefined => None,
        Bson::String(s) | Bson::Symbol(s) => Some(s.clone()),
        Bson::Int32(n) => Some(n.to_string()),
        Bson::Int64(n) => Some(n.to_string()),
        Bson::Double(n) => Some(n.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        Bson::Array(items) => Some(
            items
                .iter()
                .filter_map(display_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) if n.is_finite() => Some(*n),
        _ => None,
    }
}

pub(crate) fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Bson>::deserialize(d)?.as_ref().and_then(display_text))
}

fn lenient_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    Ok(match Option::<Bson>::deserialize(d)? {
        Some(Bson::Int32(n)) => Some(n),
        Some(Bson::Int64(n)) => i32::try_from(n).ok(),
        Some(Bson::Double(n))
            if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) =>
        {
            Some(n as i32)
        }
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Option::<Bson>::deserialize(d)?.as_ref().and_then(numeric))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Bson>::deserialize(d)? {
        Some(Bson::Boolean(b)) => Some(b),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, doc};

    #[test]
    fn test_decode_partial_document() {
        let book: Book = bson::from_document(doc! { "title": "1984", "price": 10.99 }).unwrap();
        assert_eq!(book.title.as_deref(), Some("1984"));
        assert_eq!(book.price, Some(10.99));
        assert_eq!(book.author, None);
    }

    #[test]
    fn test_decode_ignores_id_and_accepts_integer_price() {
        let book: Book = bson::from_document(doc! {
            "_id": bson::oid::ObjectId::new(),
            "title": "Free Book",
            "price": 0_i32,
            "published_year": 2001_i64,
        })
        .unwrap();
        assert_eq!(book.price, Some(0.0));
        assert_eq!(book.published_year, Some(2001));
    }

    #[test]
    fn test_encode_skips_missing_fields() {
        let book = Book {
            title: Some("Untitled".to_string()),
            ..Book::default()
        };
        assert_eq!(bson::to_document(&book).unwrap(), doc! { "title": "Untitled" });
    }

    #[test]
    fn test_decode_tolerates_mismatched_types() {
        let book: Book = bson::from_document(doc! {
            "title": 1984_i32,
            "author": null,
            "genre": ["Fiction", "Classic"],
            "published_year": 1999.0,
            "price": "cheap",
            "in_stock": "yes",
            "pages": 312.5,
            "publisher": { "name": "Penguin" },
        })
        .unwrap();
        assert_eq!(book.title.as_deref(), Some("1984"));
        assert_eq!(book.author, None);
        assert_eq!(book.genre.as_deref(), Some("Fiction, Classic"));
        assert_eq!(book.published_year, Some(1999));
        assert_eq!(book.price, None);
        assert_eq!(book.in_stock, None);
        assert_eq!(book.pages, None);
        assert!(book.publisher.unwrap().contains("Penguin"));
    }
}
