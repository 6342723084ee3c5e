//! The report runner: executes the operation catalog in order and renders
//! every result as text.
//!
//! Operations are awaited one at a time. The first failure aborts the rest of
//! the catalog and is returned with the failing operation's name as context.

pub mod render;

use anyhow::{Context, Result, bail};
use mongodb::bson::doc;
use std::io::Write;
use std::time::Instant;
use tracing::debug;

use crate::book::Book;
use crate::config::Catalog;
use crate::db::{BookStore, DeleteSummary, UpdateSummary};
use crate::query::{
    Aggregation, ExplainStats, Filter, FindSpec, FindSpecBuilder, GroupAverage, GroupCount,
    IndexSpec, Projection, SortDirection, SortKey, decode_all,
};
use crate::telemetry::{RunStats, TelemetryEvent};

pub const BOOKS_IN_GENRE: &str = "Books in genre";
pub const BOOKS_PUBLISHED_AFTER: &str = "Books published after year";
pub const BOOKS_BY_AUTHOR: &str = "Books by author";
pub const UPDATE_PRICE: &str = "Update price";
pub const VERIFY_UPDATE: &str = "Verify updated price";
pub const DELETE_BOOK: &str = "Delete book";
pub const VERIFY_DELETE: &str = "Verify deletion";
pub const IN_STOCK_AFTER: &str = "In stock and published after year";
pub const PROJECTED_READ: &str = "Projected read";
pub const SORTED_ASCENDING: &str = "Sorted by price ascending";
pub const SORTED_DESCENDING: &str = "Sorted by price descending";
pub const PAGINATED_READ: &str = "Paginated read";
pub const AVERAGE_BY_GENRE: &str = "Average price by genre";
pub const TOP_AUTHOR: &str = "Author with most books";
pub const BOOKS_BY_DECADE: &str = "Books by decade";
pub const TITLE_INDEX: &str = "Create title index";
pub const COMPOUND_INDEX: &str = "Create author/year index";
pub const EXPLAIN_TITLE: &str = "Explain title query";
pub const EXPLAIN_COMPOUND: &str = "Explain author/year query";

/// Runs the catalog against one store, writing the report to `out`
pub struct ReportRunner<'a, S: BookStore + ?Sized, W: Write> {
    store: &'a S,
    catalog: Catalog,
    out: W,
    stats: RunStats,
}

impl<'a, S: BookStore + ?Sized, W: Write> ReportRunner<'a, S, W> {
    pub fn new(store: &'a S, catalog: Catalog, out: W) -> Self {
        Self {
            store,
            catalog,
            out,
            stats: RunStats::new(),
        }
    }

    /// Run every section in order, returning the accumulated statistics
    pub async fn run(mut self) -> Result<RunStats> {
        debug!("Running catalog against {}", self.store.namespace());

        self.basic_queries().await?;
        self.advanced_queries().await?;
        self.aggregations().await?;
        self.indexing().await?;

        self.out.flush()?;
        Ok(self.stats)
    }

    async fn basic_queries(&mut self) -> Result<()> {
        self.heading("Basic Queries")?;

        let genre = self.catalog.genre.clone();
        self.step(1, &format!("Books in \"{}\" genre:", genre))?;
        let books = self
            .read(BOOKS_IN_GENRE, FindSpec::filtered(Filter::eq("genre", genre)))
            .await?;
        self.lines(books.iter().map(render::title_by_author))?;

        let year = self.catalog.published_after;
        self.step(2, &format!("Books published after {}:", year))?;
        let books = self
            .read(
                BOOKS_PUBLISHED_AFTER,
                FindSpec::filtered(Filter::gt("published_year", year)),
            )
            .await?;
        self.lines(books.iter().map(render::title_with_year))?;

        let author = self.catalog.author.clone();
        self.step(3, &format!("Books by \"{}\":", author))?;
        let books = self
            .read(BOOKS_BY_AUTHOR, FindSpec::filtered(Filter::eq("author", author)))
            .await?;
        self.lines(books.iter().map(render::quoted_title))?;

        self.update_price(4).await?;
        self.delete_book(5).await?;
        Ok(())
    }

    /// Update one price, then re-read the document to show the stored value
    async fn update_price(&mut self, step: usize) -> Result<()> {
        let title = self.catalog.updated_title.clone();
        let new_price = self.catalog.updated_price;
        self.step(
            step,
            &format!("Updating price of \"{}\" to {}...", title, new_price),
        )?;

        let start = Instant::now();
        let filter = Filter::eq("title", title.as_str());
        let summary: UpdateSummary = self
            .store
            .update_one(&filter, doc! { "price": new_price })
            .await
            .with_context(|| format!("Failed to run '{}'", UPDATE_PRICE))?;
        self.record(TelemetryEvent::MutationApplied {
            operation: UPDATE_PRICE,
            matched: summary.matched,
            modified: summary.modified,
            deleted: 0,
            duration_ms: elapsed_ms(start),
        });
        self.line(&format!(
            "Matched {}, Modified {} document(s).",
            summary.matched, summary.modified
        ))?;

        self.line(&format!("Updated \"{}\" book details:", title))?;
        match self.read_one(VERIFY_UPDATE, &filter).await? {
            Some(book) => self.line(&format!(
                " - \"{}\" price: {}",
                book.title.as_deref().unwrap_or(&title),
                render::price(book.price)
            ))?,
            None => self.line(&format!(" - \"{}\" not found.", title))?,
        }
        Ok(())
    }

    /// Delete one book, then re-read to confirm it is gone
    async fn delete_book(&mut self, step: usize) -> Result<()> {
        let title = self.catalog.deleted_title.clone();
        self.step(step, &format!("Deleting \"{}\"...", title))?;

        let start = Instant::now();
        let filter = Filter::eq("title", title.as_str());
        let summary: DeleteSummary = self
            .store
            .delete_one(&filter)
            .await
            .with_context(|| format!("Failed to run '{}'", DELETE_BOOK))?;
        self.record(TelemetryEvent::MutationApplied {
            operation: DELETE_BOOK,
            matched: summary.deleted,
            modified: 0,
            deleted: summary.deleted,
            duration_ms: elapsed_ms(start),
        });
        self.line(&format!("Deleted {} document(s).", summary.deleted))?;

        self.line(&format!("Checking if \"{}\" exists:", title))?;
        match self.read_one(VERIFY_DELETE, &filter).await? {
            Some(_) => self.line(&format!(" - {} still exists.", title))?,
            None => self.line(&format!(" - {} successfully deleted.", title))?,
        }
        Ok(())
    }

    async fn advanced_queries(&mut self) -> Result<()> {
        self.heading("Advanced Queries")?;

        let year = self.catalog.in_stock_after;
        self.step(1, &format!("Books in stock and published after {}:", year))?;
        let filter = Filter::eq("in_stock", true).and(Filter::gt("published_year", year));
        let books = self
            .read(IN_STOCK_AFTER, FindSpec::filtered(filter))
            .await?;
        self.lines(books.iter().map(render::title_with_year))?;

        self.step(
            2,
            "All books with only title, author, and price (projection):",
        )?;
        let spec = FindSpecBuilder::default()
            .filter(Filter::all())
            .projection(Projection::include(&["title", "author", "price"]))
            .build()?;
        let books = self.read(PROJECTED_READ, spec).await?;
        self.lines(books.iter().map(render::title_author_price))?;

        for (step, direction, operation) in [
            (3, SortDirection::Ascending, SORTED_ASCENDING),
            (4, SortDirection::Descending, SORTED_DESCENDING),
        ] {
            self.step(
                step,
                &format!("Books sorted by price ({}):", direction.label()),
            )?;
            let spec = FindSpecBuilder::default()
                .filter(Filter::all())
                .projection(Projection::include(&["title", "price"]))
                .sort(SortKey::new("price", direction))
                .build()?;
            let books = self.read(operation, spec).await?;
            self.lines(books.iter().map(render::title_with_price))?;
        }

        let page_size = self.catalog.page_size;
        for page in 0..self.catalog.pages {
            self.step(
                5,
                &format!(
                    "Pagination - Page {} ({} books per page):",
                    page + 1,
                    page_size
                ),
            )?;
            let books = self.read(PAGINATED_READ, page_spec(page, page_size)?).await?;
            self.lines(books.iter().map(render::plain_title))?;
        }
        Ok(())
    }

    async fn aggregations(&mut self) -> Result<()> {
        self.heading("Aggregation Pipeline")?;

        self.step(1, "Average price of books by genre:")?;
        let rows: Vec<GroupAverage> = self
            .aggregate(AVERAGE_BY_GENRE, Aggregation::average_by("genre", "price"))
            .await?;
        self.lines(rows.iter().map(render::genre_average))?;

        self.step(2, "Author with the most books:")?;
        let rows: Vec<GroupCount> = self
            .aggregate(TOP_AUTHOR, Aggregation::top_by_count("author"))
            .await?;
        self.lines(rows.iter().map(render::author_count))?;

        self.step(3, "Books grouped by publication decade:")?;
        let rows: Vec<GroupCount> = self
            .aggregate(
                BOOKS_BY_DECADE,
                Aggregation::count_by_decade("published_year"),
            )
            .await?;
        self.lines(rows.iter().map(render::decade_count))?;
        Ok(())
    }

    async fn indexing(&mut self) -> Result<()> {
        self.heading("Indexing")?;

        self.step(1, "Creating index on \"title\" field...")?;
        let title_index = IndexSpec::single("title", SortDirection::Ascending);
        self.ensure_index(TITLE_INDEX, &title_index).await?;

        self.step(
            2,
            "Creating compound index on \"author\" and \"published_year\" fields...",
        )?;
        let compound_index = IndexSpec::compound([
            ("author", SortDirection::Ascending),
            ("published_year", SortDirection::Ascending),
        ])?;
        self.ensure_index(COMPOUND_INDEX, &compound_index).await?;

        self.step(3, "Explaining query performance with indexes:")?;

        let title = self.catalog.updated_title.clone();
        self.line("")?;
        self.line(&format!(
            "   Query for \"{}\" (using title index):",
            title
        ))?;
        self.explain(EXPLAIN_TITLE, &Filter::eq("title", title))
            .await?;

        let author = self.catalog.author.clone();
        let year = self.catalog.explained_year;
        self.line("")?;
        self.line(&format!(
            "   Query for \"{}\" published in {} (using compound index):",
            author, year
        ))?;
        let filter = Filter::eq("author", author).and(Filter::eq("published_year", year));
        self.explain(EXPLAIN_COMPOUND, &filter).await?;
        Ok(())
    }

    async fn read(&mut self, operation: &'static str, spec: FindSpec) -> Result<Vec<Book>> {
        let start = Instant::now();
        let docs = self
            .store
            .find(&spec)
            .await
            .with_context(|| format!("Failed to run '{}'", operation))?;
        let books: Vec<Book> =
            decode_all(docs).with_context(|| format!("Failed to run '{}'", operation))?;
        self.record(TelemetryEvent::DocumentsReturned {
            operation,
            documents: books.len() as u64,
            duration_ms: elapsed_ms(start),
        });
        Ok(books)
    }

    async fn read_one(&mut self, operation: &'static str, filter: &Filter) -> Result<Option<Book>> {
        let start = Instant::now();
        let doc = self
            .store
            .find_one(filter)
            .await
            .with_context(|| format!("Failed to run '{}'", operation))?;
        let book = doc
            .map(|doc| mongodb::bson::from_document::<Book>(doc))
            .transpose()
            .with_context(|| format!("Failed to run '{}'", operation))?;
        self.record(TelemetryEvent::DocumentsReturned {
            operation,
            documents: u64::from(book.is_some()),
            duration_ms: elapsed_ms(start),
        });
        Ok(book)
    }

    async fn aggregate<T: serde::de::DeserializeOwned>(
        &mut self,
        operation: &'static str,
        aggregation: Aggregation,
    ) -> Result<Vec<T>> {
        let start = Instant::now();
        let docs = self
            .store
            .aggregate(&aggregation)
            .await
            .with_context(|| format!("Failed to run '{}'", operation))?;
        let rows: Vec<T> =
            decode_all(docs).with_context(|| format!("Failed to run '{}'", operation))?;
        self.record(TelemetryEvent::DocumentsReturned {
            operation,
            documents: rows.len() as u64,
            duration_ms: elapsed_ms(start),
        });
        Ok(rows)
    }

    async fn ensure_index(&mut self, operation: &'static str, index: &IndexSpec) -> Result<()> {
        let start = Instant::now();
        let name = self
            .store
            .create_index(index)
            .await
            .with_context(|| format!("Failed to run '{}'", operation))?;
        let names = self
            .store
            .index_names()
            .await
            .with_context(|| format!("Failed to run '{}'", operation))?;
        if !names.contains(&name) {
            bail!(
                "Failed to run '{}': index '{}' missing after creation",
                operation,
                name
            );
        }
        self.record(TelemetryEvent::IndexEnsured {
            operation,
            duration_ms: elapsed_ms(start),
        });
        self.line(&format!(
            "Index \"{}\" on {} created ({} indexes on collection).",
            name,
            index.describe(),
            names.len()
        ))
    }

    async fn explain(&mut self, operation: &'static str, filter: &Filter) -> Result<()> {
        let start = Instant::now();
        let raw = self
            .store
            .explain(filter)
            .await
            .with_context(|| format!("Failed to run '{}'", operation))?;
        let stats = ExplainStats::from_explain(&raw);
        self.record(TelemetryEvent::PlanExplained {
            operation,
            used_index: stats.used_index(),
            duration_ms: elapsed_ms(start),
        });

        self.line("   Execution Stats:")?;
        self.lines(render::explain_lines(&stats))
    }

    fn record(&mut self, event: TelemetryEvent) {
        debug!("Completed '{}'", event.operation());
        self.stats.update(&event);
    }

    fn heading(&mut self, title: &str) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "--- {} ---", title)?;
        Ok(())
    }

    fn step(&mut self, number: usize, description: &str) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}. {}", number, description)?;
        Ok(())
    }

    fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text)?;
        Ok(())
    }

    fn lines<I, L>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        for line in lines {
            writeln!(self.out, "{}", line.as_ref())?;
        }
        Ok(())
    }
}

/// Descriptor for one page of titles. Pages are zero-based skip/limit pairs
/// over the title ordering.
pub fn page_spec(page: u64, page_size: u64) -> Result<FindSpec> {
    let limit = i64::try_from(page_size).context("Page size is too large")?;
    Ok(FindSpecBuilder::default()
        .filter(Filter::all())
        .projection(Projection::include(&["title"]))
        .sort(SortKey::new("title", SortDirection::Ascending))
        .skip(page * page_size)
        .limit(limit)
        .build()?)
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
