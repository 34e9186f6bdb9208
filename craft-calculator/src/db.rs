//! Database schema and operations

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};

use crate::catalog::{Catalog, run_blocking};
use crate::error::CatalogError;
use crate::models::{
    IngredientRecord, Item, ItemDetail, ItemRecord, ItemSummary, Recipe, RecipeRecord,
    SubstituteGroup,
};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), CatalogError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            row_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT
        );

        -- One row per recipe variant; position orders variants of the same output
        CREATE TABLE IF NOT EXISTS recipes (
            row_id TEXT PRIMARY KEY,
            output_item_row_id TEXT NOT NULL,
            count_to_create INTEGER NOT NULL DEFAULT 1,
            bench TEXT,
            is_default_unlocked INTEGER NOT NULL DEFAULT 0,
            unlock_condition TEXT,
            position INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS recipe_ingredients (
            recipe_row_id TEXT NOT NULL,
            item_row_id TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            substitute_group TEXT,
            position INTEGER NOT NULL
        );

        -- Interchangeable item groups (e.g. "any desk")
        CREATE TABLE IF NOT EXISTS recipe_substitutes (
            row_id TEXT PRIMARY KEY,
            name TEXT
        );

        CREATE TABLE IF NOT EXISTS recipe_substitute_items (
            substitute_row_id TEXT NOT NULL,
            item_row_id TEXT NOT NULL,
            position INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recipes_output ON recipes(output_item_row_id);
        CREATE INDEX IF NOT EXISTS idx_ingredients_recipe ON recipe_ingredients(recipe_row_id);
        CREATE INDEX IF NOT EXISTS idx_substitute_items ON recipe_substitute_items(substitute_row_id);
        "#,
    )?;
    Ok(())
}

/// Insert or replace an item
pub fn upsert_item(conn: &Connection, item: &Item) -> Result<(), CatalogError> {
    conn.execute(
        "INSERT OR REPLACE INTO items (row_id, name, category) VALUES (?1, ?2, ?3)",
        (&item.row_id, &item.name, &item.category),
    )?;
    Ok(())
}

/// Insert or update a recipe and replace its ingredient list.
///
/// New variants are appended after the existing variants of the same output.
pub fn upsert_recipe(conn: &Connection, recipe: &Recipe) -> Result<(), CatalogError> {
    in_transaction(conn, |conn| {
        conn.execute(
            "INSERT INTO recipes (row_id, output_item_row_id, count_to_create, bench,
                                  is_default_unlocked, unlock_condition, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                     (SELECT COUNT(*) FROM recipes WHERE output_item_row_id = ?2))
             ON CONFLICT(row_id) DO UPDATE SET
                 output_item_row_id = excluded.output_item_row_id,
                 count_to_create = excluded.count_to_create,
                 bench = excluded.bench,
                 is_default_unlocked = excluded.is_default_unlocked,
                 unlock_condition = excluded.unlock_condition",
            params![
                recipe.row_id,
                recipe.output_item_row_id,
                recipe.count_to_create as i64,
                recipe.bench,
                recipe.unlock.default_unlocked,
                recipe.unlock.condition,
            ],
        )?;

        conn.execute(
            "DELETE FROM recipe_ingredients WHERE recipe_row_id = ?1",
            [&recipe.row_id],
        )?;
        for (position, ingredient) in recipe.ingredients.iter().enumerate() {
            conn.execute(
                "INSERT INTO recipe_ingredients (recipe_row_id, item_row_id, quantity, substitute_group, position)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    recipe.row_id,
                    ingredient.item_row_id,
                    ingredient.quantity as i64,
                    ingredient.substitute_group,
                    position as i64,
                ],
            )?;
        }
        Ok(())
    })
}

/// Insert or replace a substitution group and its members
pub fn upsert_substitute(conn: &Connection, group: &SubstituteGroup) -> Result<(), CatalogError> {
    in_transaction(conn, |conn| {
        conn.execute(
            "INSERT OR REPLACE INTO recipe_substitutes (row_id, name) VALUES (?1, ?2)",
            (&group.row_id, &group.name),
        )?;
        conn.execute(
            "DELETE FROM recipe_substitute_items WHERE substitute_row_id = ?1",
            [&group.row_id],
        )?;
        for (position, item_row_id) in group.item_row_ids.iter().enumerate() {
            conn.execute(
                "INSERT INTO recipe_substitute_items (substitute_row_id, item_row_id, position)
                 VALUES (?1, ?2, ?3)",
                params![group.row_id, item_row_id, position as i64],
            )?;
        }
        Ok(())
    })
}

/// Run `f` inside a transaction unless the caller already holds one
pub fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, CatalogError>,
) -> Result<T, CatalogError> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = conn.unchecked_transaction()?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

/// Clear all catalog data (for re-import)
pub fn clear_catalog(conn: &Connection) -> Result<(), CatalogError> {
    conn.execute_batch(
        r#"
        DELETE FROM recipe_substitute_items;
        DELETE FROM recipe_substitutes;
        DELETE FROM recipe_ingredients;
        DELETE FROM recipes;
        DELETE FROM items;
        "#,
    )?;
    Ok(())
}

pub fn get_item(conn: &Connection, row_id: &str) -> Result<Option<Item>, CatalogError> {
    let record = conn
        .query_row(
            "SELECT row_id, name, category FROM items WHERE row_id = ?1",
            [row_id],
            |row| {
                Ok(ItemRecord {
                    row_id: row.get(0)?,
                    name: row.get(1)?,
                    category: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(record.map(Item::try_from).transpose()?)
}

/// Find an item row id by exact display name, ignoring case
pub fn find_item_by_name(conn: &Connection, name: &str) -> Result<Option<String>, CatalogError> {
    Ok(conn
        .query_row(
            "SELECT row_id FROM items WHERE lower(name) = lower(?1) ORDER BY row_id LIMIT 1",
            [name.trim()],
            |row| row.get(0),
        )
        .optional()?)
}

/// Get every recipe variant producing an item, in variant order
pub fn get_recipes(conn: &Connection, output_row_id: &str) -> Result<Vec<Recipe>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT row_id, output_item_row_id, count_to_create, bench, is_default_unlocked, unlock_condition
         FROM recipes
         WHERE output_item_row_id = ?1
         ORDER BY position, row_id",
    )?;

    let rows = stmt.query_map([output_row_id], |row| {
        Ok(RecipeRecord {
            row_id: row.get(0)?,
            output_item_row_id: row.get(1)?,
            count_to_create: row.get(2)?,
            ingredients: Vec::new(),
            bench: row.get(3)?,
            is_default_unlocked: row.get(4)?,
            unlock_condition: row.get(5)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }

    let mut results = Vec::with_capacity(records.len());
    for mut record in records {
        record.ingredients = get_ingredients(conn, &record.row_id)?;
        results.push(Recipe::try_from(record)?);
    }
    Ok(results)
}

fn get_ingredients(conn: &Connection, recipe_row_id: &str) -> Result<Vec<IngredientRecord>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT item_row_id, quantity, substitute_group
         FROM recipe_ingredients
         WHERE recipe_row_id = ?1
         ORDER BY position",
    )?;

    let rows = stmt.query_map([recipe_row_id], |row| {
        Ok(IngredientRecord {
            item_row_id: row.get(0)?,
            quantity: row.get(1)?,
            substitute_group: row.get(2)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn get_substitute(conn: &Connection, row_id: &str) -> Result<Option<SubstituteGroup>, CatalogError> {
    let name: Option<Option<String>> = conn
        .query_row(
            "SELECT name FROM recipe_substitutes WHERE row_id = ?1",
            [row_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(name) = name else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT item_row_id FROM recipe_substitute_items
         WHERE substitute_row_id = ?1
         ORDER BY position",
    )?;
    let rows = stmt.query_map([row_id], |row| row.get::<_, String>(0))?;
    let mut item_row_ids = Vec::new();
    for row in rows {
        item_row_ids.push(row?);
    }

    Ok(Some(SubstituteGroup {
        row_id: row_id.to_string(),
        name,
        item_row_ids,
    }))
}

/// Item with all of its recipe variants
pub fn get_item_detail(conn: &Connection, row_id: &str) -> Result<Option<ItemDetail>, CatalogError> {
    let Some(item) = get_item(conn, row_id)? else {
        return Ok(None);
    };
    let recipes = get_recipes(conn, row_id)?;
    Ok(Some(ItemDetail { item, recipes }))
}

/// Search items by name or row id (case-insensitive substring match)
pub fn search_items(
    conn: &Connection,
    query: Option<&str>,
    category: Option<&str>,
    craftable_only: bool,
) -> Result<Vec<ItemSummary>, CatalogError> {
    let pattern = query.map(|q| format!("%{}%", q.trim()));

    let mut stmt = conn.prepare(
        "SELECT i.row_id, i.name, i.category,
                EXISTS (SELECT 1 FROM recipes r WHERE r.output_item_row_id = i.row_id) AS craftable
         FROM items i
         WHERE (?1 IS NULL OR lower(i.name) LIKE lower(?1) OR lower(i.row_id) LIKE lower(?1))
           AND (?2 IS NULL OR lower(i.category) = lower(?2))
           AND (?3 = 0 OR EXISTS (SELECT 1 FROM recipes r WHERE r.output_item_row_id = i.row_id))
         ORDER BY i.name, i.row_id",
    )?;

    let rows = stmt.query_map(params![pattern, category, craftable_only], |row| {
        Ok(ItemSummary {
            row_id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            craftable: row.get(3)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// List all distinct item categories
pub fn list_categories(conn: &Connection) -> Result<Vec<String>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT category FROM items WHERE category IS NOT NULL ORDER BY category",
    )?;

    let rows = stmt.query_map([], |row| row.get(0))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Row counts per table: (items, recipes, substitutes)
pub fn catalog_counts(conn: &Connection) -> Result<(usize, usize, usize), CatalogError> {
    let count = |table: &str| -> Result<usize, CatalogError> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n as usize)
    };
    Ok((count("items")?, count("recipes")?, count("recipe_substitutes")?))
}

/// Accept either a row id or a display name; unknown input is returned as is.
pub fn resolve_item_ref(conn: &Connection, input: &str) -> Result<String, CatalogError> {
    if get_item(conn, input)?.is_some() {
        return Ok(input.to_string());
    }
    Ok(find_item_by_name(conn, input)?.unwrap_or_else(|| input.to_string()))
}

/// [`Catalog`] backed by a SQLite connection.
///
/// Queries run on tokio's blocking pool, so a [`crate::TimeoutCatalog`]
/// around this catalog can give up on a slow query. Clones share the
/// connection.
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        Ok(Self::new(Connection::open(path)?))
    }

    async fn query<T, F>(&self, row_id: &str, query: F) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T, CatalogError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let row_id = row_id.to_string();
        run_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| CatalogError::Unavailable("sqlite connection poisoned".to_string()))?;
            query(&*conn, row_id.as_str())
        })
        .await
    }
}

impl Catalog for SqliteCatalog {
    async fn lookup_item(&self, row_id: &str) -> Result<Option<Item>, CatalogError> {
        self.query(row_id, get_item).await
    }

    async fn lookup_recipes(&self, row_id: &str) -> Result<Vec<Recipe>, CatalogError> {
        self.query(row_id, get_recipes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ingredient;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn item(row_id: &str, name: &str, category: Option<&str>) -> Item {
        Item {
            row_id: row_id.into(),
            name: name.into(),
            category: category.map(Into::into),
        }
    }

    fn recipe(row_id: &str, output: &str, count: u64, ingredients: &[(&str, u64)]) -> Recipe {
        Recipe {
            row_id: row_id.into(),
            output_item_row_id: output.into(),
            count_to_create: count,
            ingredients: ingredients
                .iter()
                .map(|(id, qty)| Ingredient {
                    item_row_id: id.to_string(),
                    quantity: *qty,
                    substitute_group: None,
                })
                .collect(),
            bench: Some("bench_basic".into()),
            unlock: Default::default(),
        }
    }

    #[test]
    fn test_recipe_roundtrip_keeps_variant_order() {
        let conn = memory_db();
        upsert_recipe(&conn, &recipe("r_rope_b", "rope", 1, &[("fiber", 3), ("glue", 1)])).unwrap();
        upsert_recipe(&conn, &recipe("r_rope_a", "rope", 2, &[("cloth", 1)])).unwrap();

        let recipes = get_recipes(&conn, "rope").unwrap();
        let ids: Vec<_> = recipes.iter().map(|r| r.row_id.as_str()).collect();
        assert_eq!(ids, vec!["r_rope_b", "r_rope_a"]);
        assert_eq!(recipes[0].ingredients[0].item_row_id, "fiber");
        assert_eq!(recipes[0].ingredients[1].quantity, 1);
        assert_eq!(recipes[1].bench.as_deref(), Some("bench_basic"));
    }

    #[test]
    fn test_upsert_recipe_replaces_ingredients() {
        let conn = memory_db();
        upsert_recipe(&conn, &recipe("r_table", "table", 1, &[("plank", 4), ("nail", 2)])).unwrap();
        upsert_recipe(&conn, &recipe("r_table", "table", 1, &[("plank", 6)])).unwrap();

        let recipes = get_recipes(&conn, "table").unwrap();
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].ingredients.len(), 1);
        assert_eq!(recipes[0].ingredients[0].quantity, 6);
    }

    #[test]
    fn test_corrupt_row_is_rejected() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO recipes (row_id, output_item_row_id, count_to_create) VALUES ('r_bad', 'x', 0)",
            [],
        )
        .unwrap();

        assert!(matches!(get_recipes(&conn, "x"), Err(CatalogError::Malformed(_))));
    }

    #[test]
    fn test_search_and_categories() {
        let conn = memory_db();
        upsert_item(&conn, &item("plank", "Wooden Plank", Some("Resource"))).unwrap();
        upsert_item(&conn, &item("table", "Table", Some("Furniture"))).unwrap();
        upsert_item(&conn, &item("shelf", "Plank Shelf", Some("Furniture"))).unwrap();
        upsert_recipe(&conn, &recipe("r_table", "table", 1, &[("plank", 4)])).unwrap();
        upsert_recipe(&conn, &recipe("r_shelf", "shelf", 1, &[("plank", 2)])).unwrap();

        let hits = search_items(&conn, Some("PLANK"), None, false).unwrap();
        let names: Vec<_> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Plank Shelf", "Wooden Plank"]);
        assert!(hits[0].craftable);
        assert!(!hits[1].craftable);

        let furniture = search_items(&conn, None, Some("furniture"), true).unwrap();
        assert_eq!(furniture.len(), 2);

        let craftable_planks = search_items(&conn, Some("plank"), Some("resource"), true).unwrap();
        assert!(craftable_planks.is_empty());

        assert_eq!(list_categories(&conn).unwrap(), vec!["Furniture", "Resource"]);
        assert_eq!(
            find_item_by_name(&conn, "wooden plank").unwrap().as_deref(),
            Some("plank")
        );
        assert!(find_item_by_name(&conn, "plank").unwrap().is_none());
    }

    #[test]
    fn test_substitute_roundtrip() {
        let conn = memory_db();
        let group = SubstituteGroup {
            row_id: "any_desk".into(),
            name: Some("Any Desk".into()),
            item_row_ids: vec!["desk_wood".into(), "desk_metal".into()],
        };
        upsert_substitute(&conn, &group).unwrap();

        assert_eq!(get_substitute(&conn, "any_desk").unwrap(), Some(group));
        assert_eq!(get_substitute(&conn, "any_chair").unwrap(), None);
    }

    #[test]
    fn test_clear_catalog() {
        let conn = memory_db();
        upsert_item(&conn, &item("plank", "Plank", None)).unwrap();
        upsert_recipe(&conn, &recipe("r_table", "table", 1, &[("plank", 4)])).unwrap();
        assert_eq!(catalog_counts(&conn).unwrap(), (1, 1, 0));

        clear_catalog(&conn).unwrap();
        assert_eq!(catalog_counts(&conn).unwrap(), (0, 0, 0));
        assert!(get_item_detail(&conn, "plank").unwrap().is_none());
    }

    #[test]
    fn test_resolve_item_ref() {
        let conn = memory_db();
        upsert_item(&conn, &item("scrap_metal", "Scrap Metal", None)).unwrap();

        assert_eq!(resolve_item_ref(&conn, "scrap_metal").unwrap(), "scrap_metal");
        assert_eq!(resolve_item_ref(&conn, "scrap metal").unwrap(), "scrap_metal");
        assert_eq!(resolve_item_ref(&conn, "Unobtainium").unwrap(), "Unobtainium");
    }

    #[tokio::test]
    async fn test_sqlite_catalog_lookups() {
        let conn = memory_db();
        upsert_item(&conn, &item("table", "Table", None)).unwrap();
        upsert_recipe(&conn, &recipe("r_table", "table", 1, &[("plank", 4)])).unwrap();

        let catalog = SqliteCatalog::new(conn);
        let shared = catalog.clone();
        assert_eq!(catalog.lookup_item("table").await.unwrap().map(|i| i.name).as_deref(), Some("Table"));
        assert!(shared.lookup_item("plank").await.unwrap().is_none());
        assert_eq!(shared.lookup_recipes("table").await.unwrap()[0].row_id, "r_table");
    }
}
