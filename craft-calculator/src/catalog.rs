//! Recipe lookup capability consumed by the resolver
//!
//! The resolver never talks to storage directly. It is handed something
//! implementing [`Catalog`]: the SQLite store in [`crate::db`], the
//! [`MemoryCatalog`] used by tests and sample data, or either of those
//! wrapped in a [`TimeoutCatalog`].

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::error::CatalogError;
use crate::models::{Ingredient, Item, Recipe};

/// Item and recipe lookups by row id.
///
/// `lookup_recipes` returns every recipe variant producing the item, in
/// catalog order. An empty list means the item is a base resource.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    async fn lookup_item(&self, row_id: &str) -> Result<Option<Item>, CatalogError>;

    async fn lookup_recipes(&self, row_id: &str) -> Result<Vec<Recipe>, CatalogError>;
}

impl<C: Catalog + ?Sized> Catalog for &C {
    async fn lookup_item(&self, row_id: &str) -> Result<Option<Item>, CatalogError> {
        (**self).lookup_item(row_id).await
    }

    async fn lookup_recipes(&self, row_id: &str) -> Result<Vec<Recipe>, CatalogError> {
        (**self).lookup_recipes(row_id).await
    }
}

/// Catalog held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    items: HashMap<String, Item>,
    recipes: HashMap<String, Vec<Recipe>>,
    failing: HashSet<String>,
    lookups: Cell<usize>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&mut self, item: Item) {
        self.items.insert(item.row_id.clone(), item);
    }

    /// Adds a recipe variant after any existing variants for the same output
    pub fn insert_recipe(&mut self, recipe: Recipe) {
        self.recipes
            .entry(recipe.output_item_row_id.clone())
            .or_default()
            .push(recipe);
    }

    /// Shorthand for a base item with no category.
    pub fn with_item(mut self, row_id: &str, name: &str) -> Self {
        self.insert_item(Item {
            row_id: row_id.to_string(),
            name: name.to_string(),
            category: None,
        });
        self
    }

    /// Shorthand for a recipe producing `count_to_create` of `output`.
    pub fn with_recipe(mut self, output: &str, count_to_create: u64, ingredients: &[(&str, u64)]) -> Self {
        let variant = self.recipes.get(output).map_or(0, Vec::len);
        self.insert_recipe(Recipe {
            row_id: format!("{output}_recipe_{variant}"),
            output_item_row_id: output.to_string(),
            count_to_create,
            ingredients: ingredients
                .iter()
                .map(|(id, qty)| Ingredient {
                    item_row_id: id.to_string(),
                    quantity: *qty,
                    substitute_group: None,
                })
                .collect(),
            bench: None,
            unlock: Default::default(),
        });
        self
    }

    /// Makes every lookup of `row_id` fail with a backend error.
    pub fn fail_on(mut self, row_id: &str) -> Self {
        self.failing.insert(row_id.to_string());
        self
    }

    /// Number of lookups served so far, both kinds.
    pub fn lookup_count(&self) -> usize {
        self.lookups.get()
    }

    fn check(&self, row_id: &str) -> Result<(), CatalogError> {
        self.lookups.set(self.lookups.get() + 1);
        if self.failing.contains(row_id) {
            return Err(CatalogError::Unavailable(format!("lookup of '{row_id}' rejected")));
        }
        Ok(())
    }
}

impl Catalog for MemoryCatalog {
    async fn lookup_item(&self, row_id: &str) -> Result<Option<Item>, CatalogError> {
        self.check(row_id)?;
        Ok(self.items.get(row_id).cloned())
    }

    async fn lookup_recipes(&self, row_id: &str) -> Result<Vec<Recipe>, CatalogError> {
        self.check(row_id)?;
        Ok(self.recipes.get(row_id).cloned().unwrap_or_default())
    }
}

/// Run a synchronous lookup on tokio's blocking pool.
///
/// Backends with blocking I/O go through here so that the returned future
/// actually yields and a [`TimeoutCatalog`] can abandon it.
pub async fn run_blocking<T, F>(lookup: F) -> Result<T, CatalogError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
{
    tokio::task::spawn_blocking(lookup)
        .await
        .map_err(|e| CatalogError::Unavailable(format!("lookup task failed: {e}")))?
}

/// Bounds every lookup of the wrapped catalog by a fixed timeout.
///
/// A timed-out lookup surfaces as [`CatalogError::Timeout`], which the
/// resolver reports like any other lookup failure. The wrapped lookup must
/// yield to be cut short; blocking backends go through [`run_blocking`].
#[derive(Debug)]
pub struct TimeoutCatalog<C> {
    inner: C,
    timeout: Duration,
}

impl<C: Catalog> TimeoutCatalog<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<C: Catalog> Catalog for TimeoutCatalog<C> {
    async fn lookup_item(&self, row_id: &str) -> Result<Option<Item>, CatalogError> {
        tokio::time::timeout(self.timeout, self.inner.lookup_item(row_id))
            .await
            .map_err(|_| CatalogError::Timeout(self.timeout))?
    }

    async fn lookup_recipes(&self, row_id: &str) -> Result<Vec<Recipe>, CatalogError> {
        tokio::time::timeout(self.timeout, self.inner.lookup_recipes(row_id))
            .await
            .map_err(|_| CatalogError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::resolver::Resolver;

    struct SlowCatalog;

    impl Catalog for SlowCatalog {
        async fn lookup_item(&self, _row_id: &str) -> Result<Option<Item>, CatalogError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(None)
        }

        async fn lookup_recipes(&self, _row_id: &str) -> Result<Vec<Recipe>, CatalogError> {
            Ok(Vec::new())
        }
    }

    /// Blocks its thread the way a synchronous database query does.
    struct BlockingCatalog;

    impl Catalog for BlockingCatalog {
        async fn lookup_item(&self, row_id: &str) -> Result<Option<Item>, CatalogError> {
            let row_id = row_id.to_string();
            run_blocking(move || {
                std::thread::sleep(Duration::from_millis(200));
                Ok(Some(Item {
                    row_id: row_id.clone(),
                    name: row_id,
                    category: None,
                }))
            })
            .await
        }

        async fn lookup_recipes(&self, _row_id: &str) -> Result<Vec<Recipe>, CatalogError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_memory_catalog_keeps_variant_order() {
        let catalog = MemoryCatalog::new()
            .with_item("rope", "Rope")
            .with_recipe("rope", 1, &[("fiber", 3)])
            .with_recipe("rope", 2, &[("cloth", 1)]);

        let recipes = catalog.lookup_recipes("rope").await.unwrap();
        assert_eq!(recipes.len(), 2);
        assert_eq!(recipes[0].row_id, "rope_recipe_0");
        assert_eq!(recipes[1].count_to_create, 2);
        assert!(catalog.lookup_recipes("fiber").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_catalog_injected_failure() {
        let catalog = MemoryCatalog::new().with_item("glue", "Glue").fail_on("glue");

        let err = catalog.lookup_item("glue").await.unwrap_err();
        assert!(matches!(err, CatalogError::Unavailable(_)));
        assert_eq!(catalog.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_catalog_reports_timeout() {
        let catalog = TimeoutCatalog::new(SlowCatalog, Duration::from_millis(10));

        let err = catalog.lookup_item("anything").await.unwrap_err();
        assert!(matches!(err, CatalogError::Timeout(d) if d == Duration::from_millis(10)));
        assert!(catalog.lookup_recipes("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blocking_lookup_times_out_through_resolver() {
        let resolver = Resolver::new(TimeoutCatalog::new(BlockingCatalog, Duration::from_millis(10)));

        let err = resolver.build_dependency_tree("plank", 1).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::LookupFailed {
                ref item_id,
                source: CatalogError::Timeout(_),
            } if item_id == "plank"
        ));
    }

    #[tokio::test]
    async fn test_blocking_lookup_within_timeout() {
        let catalog = TimeoutCatalog::new(BlockingCatalog, Duration::from_secs(5));
        let item = catalog.lookup_item("plank").await.unwrap();
        assert_eq!(item.map(|i| i.row_id).as_deref(), Some("plank"));
    }
}
