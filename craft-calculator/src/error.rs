//! Error types for the catalog and the resolver

use std::time::Duration;

use thiserror::Error;

/// A catalog record that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("{record}: field '{field}' must not be empty")]
    EmptyField { record: String, field: &'static str },

    #[error("{record}: field '{field}' must be positive, got {value}")]
    NonPositive {
        record: String,
        field: &'static str,
        value: i64,
    },
}

/// Failure inside a lookup capability (storage, transport, backend).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed catalog record: {0}")]
    Malformed(#[from] ContractError),

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Everything a resolution request can fail with.
///
/// None of these are swallowed by the resolver; callers decide how to
/// present them.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("item '{0}' not found in catalog")]
    ItemNotFound(String),

    #[error("cyclic recipe: {}", path.join(" -> "))]
    CyclicRecipe { path: Vec<String> },

    #[error("lookup failed for '{item_id}'")]
    LookupFailed {
        item_id: String,
        #[source]
        source: CatalogError,
    },

    #[error("invalid quantity for '{item_id}': {reason}")]
    InvalidQuantity { item_id: String, reason: String },

    #[error("recipe expansion of '{item_id}' exceeded depth {max_depth}")]
    DepthExceeded { item_id: String, max_depth: usize },

    #[error("resolution cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_shows_path() {
        let err = ResolveError::CyclicRecipe {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic recipe: a -> b -> a");
    }

    #[test]
    fn test_lookup_failure_keeps_source() {
        use std::error::Error as _;

        let err = ResolveError::LookupFailed {
            item_id: "plank".into(),
            source: CatalogError::Unavailable("connection reset".into()),
        };
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("catalog unavailable: connection reset".to_string())
        );
    }
}
