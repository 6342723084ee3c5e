//! Line formatting for report entries

use crate::book::Book;
use crate::config::MISSING_LABEL;
use crate::query::{ExplainStats, GroupAverage, GroupCount};

fn text(value: Option<&str>) -> &str {
    value.unwrap_or(MISSING_LABEL)
}

fn number<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| MISSING_LABEL.to_string(), |v| v.to_string())
}

/// Price as stored, e.g. `$11.99`; no rounding
pub fn price(value: Option<f64>) -> String {
    match value {
        Some(p) => format!("${}", p),
        None => MISSING_LABEL.to_string(),
    }
}

pub fn title_by_author(book: &Book) -> String {
    format!(
        " - \"{}\" by {}",
        text(book.title.as_deref()),
        text(book.author.as_deref())
    )
}

pub fn title_with_year(book: &Book) -> String {
    format!(
        " - \"{}\" ({})",
        text(book.title.as_deref()),
        number(book.published_year)
    )
}

pub fn quoted_title(book: &Book) -> String {
    format!(" - \"{}\"", text(book.title.as_deref()))
}

pub fn plain_title(book: &Book) -> String {
    format!(" - {}", text(book.title.as_deref()))
}

pub fn title_with_price(book: &Book) -> String {
    format!(
        " - \"{}\": {}",
        text(book.title.as_deref()),
        price(book.price)
    )
}

pub fn title_author_price(book: &Book) -> String {
    format!(
        " - Title: {}, Author: {}, Price: {}",
        text(book.title.as_deref()),
        text(book.author.as_deref()),
        price(book.price)
    )
}

/// Average rounded to 2 decimals for display
pub fn genre_average(row: &GroupAverage) -> String {
    let average = match row.average {
        Some(avg) => format!("${:.2}", avg),
        None => MISSING_LABEL.to_string(),
    };
    format!(
        " - Genre: {}, Average Price: {}",
        text(row.category.as_deref()),
        average
    )
}

pub fn author_count(row: &GroupCount) -> String {
    format!(
        " - Author: {}, Books: {}",
        text(row.key.as_deref()),
        row.count
    )
}

pub fn decade_count(row: &GroupCount) -> String {
    format!(
        " - Decade: {}, Count: {}",
        text(row.key.as_deref()),
        row.count
    )
}

pub fn explain_lines(stats: &ExplainStats) -> Vec<String> {
    vec![
        format!("     Total Keys Examined: {}", number(stats.keys_examined)),
        format!("     Total Docs Examined: {}", number(stats.docs_examined)),
        format!("     Execution Time (ms): {}", number(stats.execution_time_ms)),
        format!("     Winning Plan Stage: {}", stats.winning_plan.label()),
        format!(
            "     Access Path: {}",
            text(stats.access_path.as_deref())
        ),
        format!(
            "     Index Used: {}",
            if stats.used_index() { "yes" } else { "no" }
        ),
    ]
}
