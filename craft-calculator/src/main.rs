//! Crafting Calculator
//!
//! Dependency trees and base-resource totals for survival-crafting recipes.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use craft_calculator::config::Settings;
use craft_calculator::db::{self, SqliteCatalog};
use craft_calculator::resolver::{
    MissingIngredientPolicy, Resolver, VariantSelector, format_tree, summarize_tree,
};
use craft_calculator::{CraftRequest, TimeoutCatalog, import, notes};

#[derive(Parser)]
#[command(name = "craft-calculator")]
#[command(about = "Crafting dependency and base-resource calculator")]
struct Cli {
    /// Path to the SQLite database (overrides the config file)
    #[arg(short, long, env = "CRAFT_DB")]
    database: Option<PathBuf>,

    /// Path to a TOML settings file
    #[arg(short, long, env = "CRAFT_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Expand this recipe variant where it applies instead of the first one
    #[arg(long, global = true, conflicts_with = "fewest")]
    recipe: Option<String>,

    /// Expand the variant with the fewest ingredients
    #[arg(long, global = true)]
    fewest: bool,

    /// Treat ingredients missing from the catalog as base resources
    #[arg(long, global = true)]
    lenient: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Import catalog JSON files from a data directory
    Import {
        /// Directory containing *.json catalog files
        data_dir: PathBuf,

        /// Clear existing data before import
        #[arg(long)]
        clear: bool,
    },

    /// Replace the database contents with the bundled sample catalog
    LoadSample,

    /// Show the dependency tree for an item
    Tree {
        /// Item row id or display name
        item: String,

        /// Number of units wanted
        #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
        quantity: u64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Total base resources needed for an item
    Resources {
        /// Item row id or display name
        item: String,

        /// Number of units wanted
        #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
        quantity: u64,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Total base resources for a crafting-notes order file ("-" for stdin)
    Notes {
        file: PathBuf,

        /// Resources already on hand, as ITEM=QUANTITY
        #[arg(long = "have", value_name = "ITEM=QUANTITY")]
        have: Vec<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Search items by name or row id
    Search {
        query: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Only list items that have a recipe
        #[arg(long)]
        craftable: bool,
    },

    /// List all item categories
    Categories,

    /// Show details for a specific item
    Item {
        /// Item row id or display name
        id: String,
    },
}

#[derive(Serialize)]
struct NotesReport<'a> {
    requests: &'a [CraftRequest],
    resources: &'a [craft_calculator::ResourceCalculation],
    missing: &'a [notes::MissingResource],
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        settings.database = database.clone();
    }
    if let Some(recipe) = &cli.recipe {
        settings.variant = VariantSelector::ByRowId(recipe.clone());
    } else if cli.fewest {
        settings.variant = VariantSelector::Fewest;
    }
    if cli.lenient {
        settings.missing_ingredient = MissingIngredientPolicy::TreatAsBase;
    }

    let conn = Connection::open(&settings.database)
        .with_context(|| format!("Failed to open {}", settings.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            let (items, recipes, substitutes) = db::catalog_counts(&conn)?;
            println!("Database initialized at: {}", settings.database.display());
            println!(
                "  {} items, {} recipes, {} substitute groups",
                items, recipes, substitutes
            );
        }

        Commands::Import { data_dir, clear } => {
            if clear {
                println!("Replacing existing data...");
            }

            let stats = import::import_directory(&conn, &data_dir, clear)?;
            println!("{}", stats);
        }

        Commands::LoadSample => {
            let stats = import::load_sample(&conn)?;
            println!("Sample data loaded successfully! {}", stats);
        }

        Commands::Tree {
            item,
            quantity,
            json,
        } => {
            let item_id = db::resolve_item_ref(&conn, &item)?;
            let tree = open_resolver(&settings)?
                .build_dependency_tree(&item_id, quantity)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                println!("Dependency tree:\n");
                println!("{}", format_tree(&tree, 0));
                println!("{}", summarize_tree(&tree)?);
            }
        }

        Commands::Resources {
            item,
            quantity,
            json,
        } => {
            let item_id = db::resolve_item_ref(&conn, &item)?;
            let resources = open_resolver(&settings)?
                .flatten_resources(&item_id, quantity)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&resources)?);
            } else if resources.is_empty() {
                println!("No base resources required.");
            } else {
                let name = db::get_item(&conn, &item_id)?.map_or(item_id, |i| i.name);
                println!("Base resources for {}x {}:", quantity, name);
                for r in resources {
                    println!("  {:>6}x {}", r.total_quantity, r.item_name);
                }
            }
        }

        Commands::Notes { file, have, json } => {
            let text = read_notes(&file)?;
            let mut requests = notes::parse_order(&text)?;
            for request in &mut requests {
                request.item_id = db::resolve_item_ref(&conn, &request.item_id)?;
            }
            let on_hand = notes::rekey_stock(notes::parse_stock(&have)?, |key| {
                db::resolve_item_ref(&conn, key)
            })?;

            let resources = open_resolver(&settings)?.flatten_many(&requests).await?;
            let missing = notes::missing_resources(&resources, &on_hand);

            if json {
                let report = NotesReport {
                    requests: &requests,
                    resources: &resources,
                    missing: &missing,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Order:");
                for r in &requests {
                    println!("  {}x {}", r.quantity, r.item_id);
                }
                println!("\nBase resources required:");
                for r in &resources {
                    println!("  {:>6}x {}", r.total_quantity, r.item_name);
                }
                if !on_hand.is_empty() {
                    if missing.is_empty() {
                        println!("\nEverything is on hand.");
                    } else {
                        println!("\nMissing:");
                        for m in &missing {
                            println!("  {:>6}x {}", m.quantity_needed, m.item_name);
                        }
                    }
                }
            }
        }

        Commands::Search {
            query,
            category,
            craftable,
        } => {
            let items = db::search_items(&conn, query.as_deref(), category.as_deref(), craftable)?;
            if items.is_empty() {
                println!("No matching items. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<30} {:<24} {:<18} {}", "Item", "Row id", "Category", "Craftable");
                println!("{}", "-".repeat(84));
                for i in items {
                    println!(
                        "{:<30} {:<24} {:<18} {}",
                        i.name,
                        i.row_id,
                        i.category.as_deref().unwrap_or("-"),
                        if i.craftable { "yes" } else { "no" }
                    );
                }
            }
        }

        Commands::Categories => {
            let categories = db::list_categories(&conn)?;
            if categories.is_empty() {
                println!("No categories in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("Categories:");
                for c in categories {
                    println!("  {}", c);
                }
            }
        }

        Commands::Item { id } => {
            let item_id = db::resolve_item_ref(&conn, &id)?;
            let Some(detail) = db::get_item_detail(&conn, &item_id)? else {
                println!("Item '{}' not found", id);
                return Ok(());
            };

            println!("Item: {}", detail.item.name);
            println!("  ID: {}", detail.item.row_id);
            if let Some(category) = &detail.item.category {
                println!("  Category: {}", category);
            }
            if !detail.is_craftable() {
                println!("  Base resource (no recipe)");
            }
            for recipe in &detail.recipes {
                println!(
                    "  Recipe {} (makes {}{})",
                    recipe.row_id,
                    recipe.count_to_create,
                    recipe
                        .bench
                        .as_deref()
                        .map(|b| format!(", at {b}"))
                        .unwrap_or_default()
                );
                for ing in &recipe.ingredients {
                    let group = match &ing.substitute_group {
                        Some(group_id) => db::get_substitute(&conn, group_id)?,
                        None => None,
                    };
                    match group {
                        Some(group) => println!(
                            "    {}x {} (or any of {})",
                            ing.quantity,
                            ing.item_row_id,
                            group.item_row_ids.join(", ")
                        ),
                        None => println!("    {}x {}", ing.quantity, ing.item_row_id),
                    }
                }
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolver over its own connection to the catalog, so lookups can run on
/// the blocking pool while `main` keeps using its connection.
fn open_resolver(settings: &Settings) -> Result<Resolver<TimeoutCatalog<SqliteCatalog>>> {
    let catalog = SqliteCatalog::open(&settings.database)
        .with_context(|| format!("Failed to open {}", settings.database.display()))?;
    Ok(Resolver::with_options(
        TimeoutCatalog::new(catalog, settings.lookup_timeout()),
        settings.resolver_options(),
    ))
}

fn read_notes(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
