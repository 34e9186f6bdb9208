//! Catalog import from JSON data files
//!
//! Walks a data directory for `*.json` files. Each file may carry any of
//! three record lists:
//!
//! ```json
//! { "items": [...], "recipes": [...], "substitutes": [...] }
//! ```
//!
//! A file is validated as a whole before anything from it is written, so a
//! single malformed record skips that file rather than leaving it half
//! imported.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::MemoryCatalog;
use crate::db;
use crate::models::{Item, ItemRecord, Recipe, RecipeRecord, SubstituteGroup, SubstituteRecord};

/// Sample catalog bundled with the binary
pub const SAMPLE_CATALOG: &str = include_str!("../data/sample_catalog.json");

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<ItemRecord>,
    #[serde(default)]
    recipes: Vec<RecipeRecord>,
    #[serde(default)]
    substitutes: Vec<SubstituteRecord>,
}

/// Validated contents of one catalog file
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatalogData {
    pub items: Vec<Item>,
    pub recipes: Vec<Recipe>,
    pub substitutes: Vec<SubstituteGroup>,
}

impl CatalogData {
    /// Parse and validate catalog JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json).context("invalid catalog JSON")?;

        let items = file
            .items
            .into_iter()
            .map(Item::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let recipes = file
            .recipes
            .into_iter()
            .map(Recipe::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let substitutes = file
            .substitutes
            .into_iter()
            .map(SubstituteGroup::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CatalogData {
            items,
            recipes,
            substitutes,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.recipes.is_empty() && self.substitutes.is_empty()
    }

    pub fn into_memory_catalog(self) -> MemoryCatalog {
        let mut catalog = MemoryCatalog::new();
        for item in self.items {
            catalog.insert_item(item);
        }
        for recipe in self.recipes {
            catalog.insert_recipe(recipe);
        }
        catalog
    }

    /// Write every record to the database in one transaction, or inside
    /// the caller's transaction if one is open.
    pub fn write_to(&self, conn: &Connection) -> Result<()> {
        db::in_transaction(conn, |conn| {
            for item in &self.items {
                db::upsert_item(conn, item)?;
            }
            for recipe in &self.recipes {
                db::upsert_recipe(conn, recipe)?;
            }
            for group in &self.substitutes {
                db::upsert_substitute(conn, group)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

/// Find all JSON files under the data directory, in a stable order
pub fn find_catalog_files(data_dir: &Path) -> Result<Vec<PathBuf>> {
    if !data_dir.is_dir() {
        anyhow::bail!("{} is not a directory", data_dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(data_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Load a single catalog file
pub fn load_catalog_file(path: &Path) -> Result<CatalogData> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    CatalogData::from_json(&content).with_context(|| format!("Failed to load {}", path.display()))
}

/// Import every catalog file under `data_dir` into the database.
///
/// With `clear`, existing data is removed first. The whole import is one
/// transaction, so a failed write leaves the previous catalog in place.
pub fn import_directory(conn: &Connection, data_dir: &Path, clear: bool) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    info!(dir = %data_dir.display(), "scanning for catalog files");
    let files = find_catalog_files(data_dir)?;
    info!(count = files.len(), "found catalog files");

    let tx = conn.unchecked_transaction()?;
    if clear {
        info!("clearing existing catalog");
        db::clear_catalog(&tx)?;
    }

    for path in &files {
        match load_catalog_file(path) {
            Ok(data) if data.is_empty() => {
                debug!(file = %path.display(), "no catalog records");
                stats.skipped += 1;
            }
            Ok(data) => {
                data.write_to(&tx)
                    .with_context(|| format!("Failed to store {}", path.display()))?;

                stats.files += 1;
                stats.items += data.items.len();
                stats.recipes += data.recipes.len();
                stats.substitutes += data.substitutes.len();

                info!(
                    file = %path.display(),
                    items = data.items.len(),
                    recipes = data.recipes.len(),
                    substitutes = data.substitutes.len(),
                    "imported"
                );
            }
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{e:#}"), "skipping invalid catalog file");
                stats.errors += 1;
            }
        }
    }

    tx.commit()?;
    Ok(stats)
}

/// Replace the database contents with the bundled sample catalog
pub fn load_sample(conn: &Connection) -> Result<ImportStats> {
    let data = CatalogData::from_json(SAMPLE_CATALOG)?;

    let tx = conn.unchecked_transaction()?;
    db::clear_catalog(&tx)?;
    data.write_to(&tx)?;
    tx.commit()?;

    Ok(ImportStats {
        files: 1,
        items: data.items.len(),
        recipes: data.recipes.len(),
        substitutes: data.substitutes.len(),
        ..Default::default()
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub items: usize,
    pub recipes: usize,
    pub substitutes: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} files ({} items, {} recipes, {} substitute groups). Skipped: {}, Errors: {}",
            self.files, self.items, self.recipes, self.substitutes, self.skipped, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_sample_catalog_is_valid() {
        let data = CatalogData::from_json(SAMPLE_CATALOG).unwrap();
        assert!(!data.items.is_empty());
        assert!(!data.recipes.is_empty());
        assert!(!data.substitutes.is_empty());
    }

    #[test]
    fn test_invalid_record_rejects_file() {
        let json = r#"{
            "items": [{"row_id": "plank", "name": "Plank"}],
            "recipes": [{"row_id": "r", "output_item_row_id": "table",
                         "ingredients": [{"item_row_id": "plank", "quantity": 0}]}]
        }"#;
        let err = CatalogData::from_json(json).unwrap_err();
        assert!(format!("{err:#}").contains("quantity"));
    }

    #[test]
    fn test_import_directory_counts() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("a_items.json"),
            r#"{"items": [{"row_id": "plank", "name": "Plank"}, {"row_id": "table", "name": "Table"}]}"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("nested").join("recipes.json"),
            r#"{"recipes": [{"row_id": "r_table", "output_item_row_id": "table",
                             "ingredients": [{"item_row_id": "plank", "quantity": 4}]}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("empty.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let conn = memory_db();
        let stats = import_directory(&conn, dir.path(), false).unwrap();
        assert_eq!(
            stats,
            ImportStats {
                files: 2,
                items: 2,
                recipes: 1,
                substitutes: 0,
                skipped: 1,
                errors: 1,
            }
        );
        assert_eq!(db::get_recipes(&conn, "table").unwrap().len(), 1);
    }

    #[test]
    fn test_import_missing_directory() {
        let conn = memory_db();
        assert!(import_directory(&conn, Path::new("/definitely/not/here"), false).is_err());
    }

    fn stale_db() -> Connection {
        let conn = memory_db();
        db::upsert_item(
            &conn,
            &Item {
                row_id: "stale".into(),
                name: "Stale".into(),
                category: None,
            },
        )
        .unwrap();
        conn
    }

    fn reject_item(conn: &Connection, row_id: &str) {
        conn.execute_batch(&format!(
            "CREATE TRIGGER reject_{row_id} BEFORE INSERT ON items
             WHEN NEW.row_id = '{row_id}'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;"
        ))
        .unwrap();
    }

    #[test]
    fn test_import_with_clear_replaces_data() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("items.json"),
            r#"{"items": [{"row_id": "plank", "name": "Plank"}]}"#,
        )
        .unwrap();

        let conn = stale_db();
        import_directory(&conn, dir.path(), true).unwrap();
        assert!(db::get_item(&conn, "stale").unwrap().is_none());
        assert!(db::get_item(&conn, "plank").unwrap().is_some());
    }

    #[test]
    fn test_failed_import_with_clear_keeps_old_data() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("items.json"),
            r#"{"items": [{"row_id": "plank", "name": "Plank"}, {"row_id": "nail", "name": "Nail"}]}"#,
        )
        .unwrap();

        let conn = stale_db();
        reject_item(&conn, "nail");
        assert!(import_directory(&conn, dir.path(), true).is_err());
        assert!(db::get_item(&conn, "stale").unwrap().is_some());
        assert!(db::get_item(&conn, "plank").unwrap().is_none());
    }

    #[test]
    fn test_failed_sample_load_keeps_old_data() {
        let conn = stale_db();
        reject_item(&conn, "knife");
        assert!(load_sample(&conn).is_err());
        assert!(db::get_item(&conn, "stale").unwrap().is_some());
        assert!(db::get_item(&conn, "plank").unwrap().is_none());
    }

    #[test]
    fn test_load_sample_replaces_data() {
        let conn = stale_db();

        let stats = load_sample(&conn).unwrap();
        assert!(stats.items > 0);
        assert!(db::get_item(&conn, "stale").unwrap().is_none());
    }
}
