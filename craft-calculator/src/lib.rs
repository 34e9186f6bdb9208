//! Crafting dependency calculator
//!
//! Expands craftable items into dependency trees and base-resource totals
//! over a recipe catalog.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod notes;
pub mod resolver;

pub use catalog::{Catalog, MemoryCatalog, TimeoutCatalog};
pub use error::{CatalogError, ContractError, ResolveError};
pub use models::{DependencyNode, Ingredient, Item, Recipe, ResourceCalculation};
pub use resolver::{
    CancelFlag, CraftRequest, MissingIngredientPolicy, Resolver, ResolverOptions, VariantSelector,
};
