//! Recipe dependency resolution
//!
//! Expands a requested `(item, quantity)` into a dependency tree and into
//! the flattened total of base resources it needs. Each ingredient that is
//! itself craftable is expanded through one selected recipe variant.
//!
//! Quantity math per node: `craft_ops = ceil(quantity / count_to_create)`,
//! and each ingredient needs `craft_ops * ingredient.quantity` units.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::ResolveError;
use crate::models::{DependencyNode, Item, Recipe, ResourceCalculation};

/// Which recipe variant to expand when an item has several.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "policy", content = "recipe")]
pub enum VariantSelector {
    /// The first variant in catalog order
    #[default]
    First,
    /// The variant with the fewest ingredient slots, first on ties
    Fewest,
    /// A specific recipe row id; items without it use their first variant
    ByRowId(String),
}

impl VariantSelector {
    pub fn select<'a>(&self, recipes: &'a [Recipe]) -> Option<&'a Recipe> {
        match self {
            VariantSelector::First => recipes.first(),
            VariantSelector::Fewest => recipes.iter().min_by_key(|r| r.ingredients.len()),
            VariantSelector::ByRowId(row_id) => recipes
                .iter()
                .find(|r| &r.row_id == row_id)
                .or_else(|| recipes.first()),
        }
    }
}

/// What to do when an ingredient references an item missing from the catalog.
///
/// The root item is always required to exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingIngredientPolicy {
    /// Fail with [`ResolveError::ItemNotFound`]
    #[default]
    Fail,
    /// Log a warning and count the ingredient as a base resource
    TreatAsBase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    pub variant: VariantSelector,
    pub missing_ingredient: MissingIngredientPolicy,
    /// Maximum number of recipe edges between the root and any node
    pub max_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            variant: VariantSelector::First,
            missing_ingredient: MissingIngredientPolicy::Fail,
            max_depth: 64,
        }
    }
}

/// Shared flag for abandoning a resolution in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One line of a crafting order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CraftRequest {
    pub item_id: String,
    pub quantity: u64,
}

impl CraftRequest {
    pub fn new(item_id: impl Into<String>, quantity: u64) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Resolves dependency trees and base-resource totals against a [`Catalog`].
pub struct Resolver<C> {
    catalog: C,
    options: ResolverOptions,
    cancel: CancelFlag,
}

impl<C: Catalog> Resolver<C> {
    pub fn new(catalog: C) -> Self {
        Self::with_options(catalog, ResolverOptions::default())
    }

    pub fn with_options(catalog: C, options: ResolverOptions) -> Self {
        Self {
            catalog,
            options,
            cancel: CancelFlag::new(),
        }
    }

    /// Use `cancel` to abort resolutions run by this resolver.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Build the dependency tree needed to obtain `quantity` units of `item_id`.
    pub async fn build_dependency_tree(
        &self,
        item_id: &str,
        quantity: u64,
    ) -> Result<DependencyNode, ResolveError> {
        validate_request(item_id, quantity)?;
        let mut lookups = Lookups::new(&self.catalog);
        let mut path = Vec::new();
        self.expand(&mut lookups, item_id, quantity, &mut path).await
    }

    /// Total base resources needed for `quantity` units of `item_id`,
    /// sorted by display name.
    pub async fn flatten_resources(
        &self,
        item_id: &str,
        quantity: u64,
    ) -> Result<Vec<ResourceCalculation>, ResolveError> {
        self.flatten_many(&[CraftRequest::new(item_id, quantity)]).await
    }

    /// Total base resources for several requests, summed across all of them.
    pub async fn flatten_many(
        &self,
        requests: &[CraftRequest],
    ) -> Result<Vec<ResourceCalculation>, ResolveError> {
        for request in requests {
            validate_request(&request.item_id, request.quantity)?;
        }

        let mut lookups = Lookups::new(&self.catalog);
        let mut totals = ResourceTotals::default();
        for request in requests {
            let mut path = Vec::new();
            let tree = self
                .expand(&mut lookups, &request.item_id, request.quantity, &mut path)
                .await?;
            totals.collect(&tree)?;
        }
        Ok(totals.into_sorted())
    }

    fn expand<'a, 'c: 'a>(
        &'a self,
        lookups: &'a mut Lookups<'c, C>,
        item_id: &'a str,
        quantity: u64,
        path: &'a mut Vec<String>,
    ) -> LocalBoxFuture<'a, Result<DependencyNode, ResolveError>> {
        async move {
            if self.cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            if let Some(pos) = path.iter().position(|id| id == item_id) {
                let mut cycle = path[pos..].to_vec();
                cycle.push(item_id.to_string());
                return Err(ResolveError::CyclicRecipe { path: cycle });
            }

            if path.len() > self.options.max_depth {
                return Err(ResolveError::DepthExceeded {
                    item_id: item_id.to_string(),
                    max_depth: self.options.max_depth,
                });
            }

            let item = match lookups.item(item_id).await? {
                Some(item) => item,
                None if path.is_empty()
                    || self.options.missing_ingredient == MissingIngredientPolicy::Fail =>
                {
                    return Err(ResolveError::ItemNotFound(item_id.to_string()));
                }
                None => {
                    warn!(item = item_id, parent = ?path.last(), "ingredient missing from catalog, treating as base resource");
                    return Ok(DependencyNode::leaf(item_id, item_id, quantity));
                }
            };

            let recipes = lookups.recipes(item_id).await?;
            let Some(recipe) = self.options.variant.select(&recipes) else {
                debug!(item = item_id, quantity, "base resource");
                return Ok(DependencyNode::leaf(item.row_id, item.name, quantity));
            };

            let craft_ops = quantity.div_ceil(recipe.count_to_create);
            debug!(
                item = item_id,
                quantity,
                recipe = %recipe.row_id,
                craft_ops,
                depth = path.len(),
                "expanding recipe"
            );

            path.push(item_id.to_string());
            let mut children = Vec::with_capacity(recipe.ingredients.len());
            for ingredient in &recipe.ingredients {
                let required = craft_ops.checked_mul(ingredient.quantity).ok_or_else(|| {
                    ResolveError::InvalidQuantity {
                        item_id: ingredient.item_row_id.clone(),
                        reason: format!("{craft_ops} x {} overflows", ingredient.quantity),
                    }
                })?;
                let child = self
                    .expand(lookups, &ingredient.item_row_id, required, path)
                    .await?;
                children.push(child);
            }
            path.pop();

            Ok(DependencyNode {
                item_id: item.row_id,
                item_name: item.name,
                quantity,
                craftable: true,
                recipe_id: Some(recipe.row_id.clone()),
                bench: recipe.bench.clone(),
                children,
            })
        }
        .boxed_local()
    }
}

fn validate_request(item_id: &str, quantity: u64) -> Result<(), ResolveError> {
    if item_id.trim().is_empty() {
        return Err(ResolveError::ItemNotFound(item_id.to_string()));
    }
    if quantity == 0 {
        return Err(ResolveError::InvalidQuantity {
            item_id: item_id.to_string(),
            reason: "quantity must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Per-call memo of catalog answers, so items shared between branches
/// are fetched once.
struct Lookups<'c, C> {
    catalog: &'c C,
    items: HashMap<String, Option<Item>>,
    recipes: HashMap<String, Vec<Recipe>>,
}

impl<'c, C: Catalog> Lookups<'c, C> {
    fn new(catalog: &'c C) -> Self {
        Self {
            catalog,
            items: HashMap::new(),
            recipes: HashMap::new(),
        }
    }

    async fn item(&mut self, row_id: &str) -> Result<Option<Item>, ResolveError> {
        if let Some(cached) = self.items.get(row_id) {
            return Ok(cached.clone());
        }
        let item = self
            .catalog
            .lookup_item(row_id)
            .await
            .map_err(|source| ResolveError::LookupFailed {
                item_id: row_id.to_string(),
                source,
            })?;
        self.items.insert(row_id.to_string(), item.clone());
        Ok(item)
    }

    async fn recipes(&mut self, row_id: &str) -> Result<Vec<Recipe>, ResolveError> {
        if let Some(cached) = self.recipes.get(row_id) {
            return Ok(cached.clone());
        }
        let recipes = self
            .catalog
            .lookup_recipes(row_id)
            .await
            .map_err(|source| ResolveError::LookupFailed {
                item_id: row_id.to_string(),
                source,
            })?;
        self.recipes.insert(row_id.to_string(), recipes.clone());
        Ok(recipes)
    }
}

/// Accumulates base-resource leaves of one or more dependency trees
#[derive(Default)]
struct ResourceTotals {
    totals: HashMap<String, ResourceCalculation>,
}

impl ResourceTotals {
    fn collect(&mut self, node: &DependencyNode) -> Result<(), ResolveError> {
        // Crafted intermediates only count through their ingredients
        if node.craftable {
            for child in &node.children {
                self.collect(child)?;
            }
            return Ok(());
        }

        let entry = self
            .totals
            .entry(node.item_id.clone())
            .or_insert_with(|| ResourceCalculation {
                item_id: node.item_id.clone(),
                item_name: node.item_name.clone(),
                total_quantity: 0,
                is_base_resource: true,
            });
        entry.total_quantity = entry.total_quantity.checked_add(node.quantity).ok_or_else(|| {
            ResolveError::InvalidQuantity {
                item_id: node.item_id.clone(),
                reason: "aggregated total overflows".to_string(),
            }
        })?;
        Ok(())
    }

    fn into_sorted(self) -> Vec<ResourceCalculation> {
        let mut list: Vec<_> = self.totals.into_values().collect();
        list.sort_by(|a, b| {
            a.item_name
                .cmp(&b.item_name)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        list
    }
}

/// Render a dependency tree as indented text.
pub fn format_tree(node: &DependencyNode, indent: usize) -> String {
    let mut output = String::new();
    let prefix = "  ".repeat(indent);

    if node.craftable {
        let bench = node
            .bench
            .as_deref()
            .map(|b| format!(" @ {b}"))
            .unwrap_or_default();
        output.push_str(&format!(
            "{}{}x {}{}\n",
            prefix, node.quantity, node.item_name, bench
        ));
        for child in &node.children {
            output.push_str(&format_tree(child, indent + 1));
        }
    } else {
        output.push_str(&format!(
            "{}{}x {} (base resource)\n",
            prefix, node.quantity, node.item_name
        ));
    }

    output
}

/// Report combining crafted intermediates and base resources for one request
#[derive(Debug)]
pub struct ResourceSummary {
    pub target: String,
    pub quantity: u64,
    /// Units crafted per intermediate (and target) item, by display name
    pub crafted: Vec<(String, u64)>,
    pub base_resources: Vec<ResourceCalculation>,
}

/// Summarize a dependency tree for display.
pub fn summarize_tree(node: &DependencyNode) -> Result<ResourceSummary, ResolveError> {
    let mut crafted: HashMap<String, u64> = HashMap::new();
    collect_crafted(node, &mut crafted)?;

    let mut crafted: Vec<_> = crafted.into_iter().collect();
    crafted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut totals = ResourceTotals::default();
    totals.collect(node)?;

    Ok(ResourceSummary {
        target: node.item_name.clone(),
        quantity: node.quantity,
        crafted,
        base_resources: totals.into_sorted(),
    })
}

fn collect_crafted(
    node: &DependencyNode,
    crafted: &mut HashMap<String, u64>,
) -> Result<(), ResolveError> {
    if !node.craftable {
        return Ok(());
    }
    let count = crafted.entry(node.item_name.clone()).or_default();
    *count = count
        .checked_add(node.quantity)
        .ok_or_else(|| ResolveError::InvalidQuantity {
            item_id: node.item_id.clone(),
            reason: "crafted total overflows".to_string(),
        })?;
    for child in &node.children {
        collect_crafted(child, crafted)?;
    }
    Ok(())
}

impl fmt::Display for ResourceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Resource Summary ===")?;
        writeln!(f, "Target: {}x {}", self.quantity, self.target)?;
        writeln!(f)?;

        writeln!(f, "Crafted items:")?;
        for (name, count) in &self.crafted {
            writeln!(f, "  {}x {}", count, name)?;
        }
        writeln!(f)?;

        writeln!(f, "Base resources required:")?;
        for resource in &self.base_resources {
            writeln!(f, "  {}x {}", resource.total_quantity, resource.item_name)?;
        }

        Ok(())
    }
}
