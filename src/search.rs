use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use crate::error::Result;
use crate::index::{Index, IndexRecord};

pub use crate::cli::OutputFormat;

/// Default cap on returned records.
pub const DEFAULT_LIMIT: usize = 1000;

/// Configuration for search operations.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Output format
    pub format: OutputFormat,
    /// Maximum results to return
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { format: OutputFormat::Plain, max_results: DEFAULT_LIMIT }
    }
}

/// JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonOutput<'a> {
    pub results: &'a [IndexRecord],
}

/// Multi-term AND substring search over an [`Index`].
pub struct Searcher<'a> {
    index: &'a Index,
    config: SearchConfig,
}

impl<'a> Searcher<'a> {
    /// Create a new searcher.
    pub const fn new(index: &'a Index, config: SearchConfig) -> Self {
        Self { index, config }
    }

    /// Search with the configured result cap.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<IndexRecord> {
        self.search_limited(query, self.config.max_results)
    }

    /// Records whose filename contains every whitespace-separated term of
    /// `query`, case-insensitively.
    ///
    /// Results are sorted by full path (filename breaks ties) and truncated
    /// to `limit`. An empty or blank query returns nothing.
    #[must_use]
    pub fn search_limited(&self, query: &str, limit: usize) -> Vec<IndexRecord> {
        let terms = Self::normalize_query(query);
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        // Only Arc clones happen under the read lock; sorting and copying
        // the records out happens after it is released.
        let mut matches: Vec<Arc<IndexRecord>> = self.index.with_suffixes(|suffixes| {
            let mut per_term: Vec<HashSet<Arc<IndexRecord>>> =
                terms.iter().map(|term| suffixes.prefix_matches(term)).collect();

            // Intersect starting from the smallest set.
            per_term.sort_unstable_by_key(HashSet::len);
            let mut sets = per_term.into_iter();
            let mut result = sets.next().unwrap_or_default();
            for set in sets {
                if result.is_empty() {
                    break;
                }
                result.retain(|record| set.contains(record));
            }
            result.into_iter().collect()
        });

        matches.sort_unstable();
        matches.truncate(limit);
        matches.into_iter().map(|record| IndexRecord::clone(&record)).collect()
    }

    /// Lowercase, trim and split the query into distinct terms.
    fn normalize_query(query: &str) -> Vec<String> {
        let mut terms: Vec<String> =
            query.to_lowercase().split_whitespace().map(String::from).collect();
        terms.sort_unstable();
        terms.dedup();
        terms
    }

    /// Format and output search results.
    ///
    /// # Errors
    /// Returns `IndexerError` if:
    /// - Writing to the output stream fails (wrapped as `IndexerError::Io`)
    /// - JSON serialization fails (when using JSON format)
    pub fn format_results<W: Write>(&self, results: &[IndexRecord], output: &mut W) -> Result<()> {
        match self.config.format {
            OutputFormat::Plain => Self::format_plain(results, output),
            OutputFormat::Json => Self::format_json(results, output),
        }
    }

    /// Format results as plain text (one path per line).
    fn format_plain<W: Write>(results: &[IndexRecord], output: &mut W) -> Result<()> {
        for result in results {
            writeln!(output, "{}", result.full_path)?;
        }
        Ok(())
    }

    /// Format results as JSON.
    fn format_json<W: Write>(results: &[IndexRecord], output: &mut W) -> Result<()> {
        let json = serde_json::to_string_pretty(&JsonOutput { results })?;
        writeln!(output, "{json}")?;
        Ok(())
    }
}
