//! Vector search query construction.
//!
//! A query is a single structured string understood by the store's search
//! engine: a tag filter predicate followed by a KNN clause, plus sorting,
//! paging, field projection and a pinned dialect.
//!
//! # Usage
//!
//! ```rust
//! use paper_qa::query::VectorQuery;
//!
//! let years = vec!["2020".to_string(), "2021".to_string()];
//! let query = VectorQuery::builder()
//!     .years(&years)
//!     .number_of_results(5)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(
//!     query.query_string(),
//!     "(@year:{2020 | 2021})=>[KNN 5 @vector $vec_param AS vector_score]"
//! );
//! ```

use thiserror::Error;

use crate::DEFAULT_SEARCH_TYPE;

/// Predicate matching every record.
pub const MATCH_ALL: &str = "*";

/// Name of the query parameter the vector blob is bound to.
pub const VECTOR_PARAM: &str = "vec_param";

/// Alias of the distance computed by the vector clause.
pub const SCORE_FIELD: &str = "vector_score";

/// Query dialect required for vector clauses and parameters.
pub const DIALECT: u32 = 2;

/// Fields returned for each hit.
pub const RETURN_FIELDS: [&str; 12] = [
    "paper_id",
    "vector",
    "vector_score",
    "year",
    "title",
    "authors",
    "abstract",
    "categories",
    "update_date",
    "journal-ref",
    "submitter",
    "doi",
];

/// Errors that can occur while building a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Invalid query parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

fn tag_group(field: &str, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    Some(format!("@{}:{{{}}}", field, values.join(" | ")))
}

/// Build the filter predicate from optional year and category lists.
///
/// Each list becomes an OR-joined tag group. When both are present the two
/// groups are OR-combined; with neither the predicate is [`MATCH_ALL`].
pub fn build_filter(years: Option<&[String]>, categories: Option<&[String]>) -> String {
    let groups: Vec<String> = [
        tag_group("year", years.unwrap_or_default()),
        tag_group("categories", categories.unwrap_or_default()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let filter = format!("({})", groups.join(" | "));
    // "()" means nothing was selected.
    if filter.len() < 3 {
        MATCH_ALL.to_string()
    } else {
        filter
    }
}

/// A fully specified vector search.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    /// Filter predicate
    pub filter: String,

    /// Vector clause keyword (e.g. "KNN")
    pub search_type: String,

    /// Number of neighbours requested, also the page size
    pub number_of_results: usize,

    /// Vector field searched
    pub vector_field: String,

    /// Paging offset
    pub offset: usize,

    /// Fields returned per hit
    pub return_fields: Vec<String>,
}

impl VectorQuery {
    /// Start building a query.
    pub fn builder() -> VectorQueryBuilder {
        VectorQueryBuilder::default()
    }

    /// The query string: filter followed by the vector clause.
    pub fn query_string(&self) -> String {
        format!(
            "{}=>[{} {} @{} ${} AS {}]",
            self.filter,
            self.search_type,
            self.number_of_results,
            self.vector_field,
            VECTOR_PARAM,
            SCORE_FIELD
        )
    }

    /// Projection, sorting and paging directives that follow the query string.
    pub fn directives(&self) -> Vec<String> {
        let mut args = vec!["RETURN".to_string(), self.return_fields.len().to_string()];
        args.extend(self.return_fields.iter().cloned());
        args.extend([
            "SORTBY".to_string(),
            SCORE_FIELD.to_string(),
            "ASC".to_string(),
            "LIMIT".to_string(),
            self.offset.to_string(),
            self.number_of_results.to_string(),
        ]);
        args
    }
}

/// Builder for [`VectorQuery`].
#[derive(Debug, Clone)]
pub struct VectorQueryBuilder {
    years: Option<Vec<String>>,
    categories: Option<Vec<String>>,
    search_type: String,
    number_of_results: usize,
}

impl Default for VectorQueryBuilder {
    fn default() -> Self {
        Self {
            years: None,
            categories: None,
            search_type: DEFAULT_SEARCH_TYPE.to_string(),
            number_of_results: 10,
        }
    }
}

impl VectorQueryBuilder {
    pub fn years(mut self, years: &[String]) -> Self {
        self.years = Some(years.to_vec());
        self
    }

    pub fn categories(mut self, categories: &[String]) -> Self {
        self.categories = Some(categories.to_vec());
        self
    }

    pub fn search_type(mut self, search_type: &str) -> Self {
        self.search_type = search_type.to_string();
        self
    }

    pub fn number_of_results(mut self, number_of_results: usize) -> Self {
        self.number_of_results = number_of_results;
        self
    }

    /// Finish the query.
    ///
    /// # Errors
    /// Returns `QueryError::InvalidQuery` if no results are requested or the
    /// search type is blank
    pub fn build(self) -> QueryResult<VectorQuery> {
        if self.number_of_results == 0 {
            return Err(QueryError::InvalidQuery(
                "number of results must be positive".to_string(),
            ));
        }
        if self.search_type.trim().is_empty() {
            return Err(QueryError::InvalidQuery("search type cannot be empty".to_string()));
        }

        Ok(VectorQuery {
            filter: build_filter(self.years.as_deref(), self.categories.as_deref()),
            search_type: self.search_type,
            number_of_results: self.number_of_results,
            vector_field: "vector".to_string(),
            offset: 0,
            return_fields: RETURN_FIELDS.iter().map(|f| f.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_years_only() {
        let years = strings(&["2020", "2021"]);
        let query = VectorQuery::builder()
            .years(&years)
            .number_of_results(5)
            .build()
            .unwrap();

        assert!(query.filter.contains("@year:{2020 | 2021}"));
        assert!(query.query_string().contains("[KNN 5 @vector $vec_param AS vector_score]"));
        assert!(query.directives().ends_with(&strings(&["LIMIT", "0", "5"])));
    }

    #[test]
    fn test_categories_only() {
        let categories = strings(&["cs.LG", "cs.AI"]);
        assert_eq!(build_filter(None, Some(categories.as_slice())), "(@categories:{cs.LG | cs.AI})");
    }

    #[test]
    fn test_both_groups_are_kept() {
        let years = strings(&["2019"]);
        let categories = strings(&["hep-ph", "math.CO"]);
        let filter = build_filter(Some(years.as_slice()), Some(categories.as_slice()));
        assert_eq!(filter, "(@year:{2019} | @categories:{hep-ph | math.CO})");
    }

    #[test]
    fn test_empty_filters_match_all() {
        assert_eq!(build_filter(None, None), MATCH_ALL);
        assert_eq!(build_filter(Some(&[][..]), Some(&[][..])), MATCH_ALL);

        let query = VectorQuery::builder().number_of_results(3).build().unwrap();
        assert_eq!(query.query_string(), "*=>[KNN 3 @vector $vec_param AS vector_score]");
    }

    #[test]
    fn test_directives_layout() {
        let query = VectorQuery::builder().number_of_results(7).build().unwrap();
        let args = query.directives();
        assert_eq!(args[0], "RETURN");
        assert_eq!(args[1], RETURN_FIELDS.len().to_string());
        let sort_at = 2 + RETURN_FIELDS.len();
        assert_eq!(&args[sort_at..sort_at + 3], &["SORTBY", "vector_score", "ASC"]);
    }

    #[test]
    fn test_custom_search_type() {
        let query = VectorQuery::builder()
            .search_type("HYBRID")
            .number_of_results(2)
            .build()
            .unwrap();
        assert!(query.query_string().contains("[HYBRID 2 @vector"));
    }

    #[test]
    fn test_invalid_queries() {
        assert!(VectorQuery::builder().number_of_results(0).build().is_err());
        assert!(VectorQuery::builder().search_type(" ").build().is_err());
    }
}
