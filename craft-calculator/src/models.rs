//! Data contracts for catalog items, recipes and resolver output
//!
//! Catalog records arrive as loosely-shaped JSON (or SQLite rows). Each
//! record type has a raw serde form and a validated form; conversion
//! between them rejects malformed data before it can reach the resolver.

use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// A catalog entry: something that can be crafted, gathered, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ItemRecord", into = "ItemRecord")]
pub struct Item {
    pub row_id: String,
    pub name: String,
    pub category: Option<String>,
}

/// One way of producing an output item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecipeRecord", into = "RecipeRecord")]
pub struct Recipe {
    pub row_id: String,
    pub output_item_row_id: String,
    /// Units of output produced per craft operation, always >= 1
    pub count_to_create: u64,
    pub ingredients: Vec<Ingredient>,
    /// Crafting station required, if any
    pub bench: Option<String>,
    pub unlock: UnlockState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockState {
    pub default_unlocked: bool,
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingredient {
    pub item_row_id: String,
    /// Always > 0
    pub quantity: u64,
    /// Substitution group this slot belongs to. Stored, never consulted by resolution.
    pub substitute_group: Option<String>,
}

/// A set of interchangeable items that may fill one recipe slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SubstituteRecord", into = "SubstituteRecord")]
pub struct SubstituteGroup {
    pub row_id: String,
    pub name: Option<String>,
    pub item_row_ids: Vec<String>,
}

/// An item together with every recipe variant that produces it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemDetail {
    pub item: Item,
    pub recipes: Vec<Recipe>,
}

impl ItemDetail {
    pub fn is_craftable(&self) -> bool {
        !self.recipes.is_empty()
    }
}

/// Short form returned by catalog searches
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub row_id: String,
    pub name: String,
    pub category: Option<String>,
    pub craftable: bool,
}

/// Node of a dependency tree, built fresh per resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyNode {
    pub item_id: String,
    pub item_name: String,
    pub quantity: u64,
    pub craftable: bool,
    /// Recipe variant chosen for this node; `None` for base resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bench: Option<String>,
    pub children: Vec<DependencyNode>,
}

impl DependencyNode {
    /// Leaf node for a base resource.
    pub fn leaf(item_id: impl Into<String>, item_name: impl Into<String>, quantity: u64) -> Self {
        Self {
            item_id: item_id.into(),
            item_name: item_name.into(),
            quantity,
            craftable: false,
            recipe_id: None,
            bench: None,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Aggregated base-resource requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceCalculation {
    pub item_id: String,
    pub item_name: String,
    pub total_quantity: u64,
    pub is_base_resource: bool,
}

// Raw records, as found in import files

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub row_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub row_id: String,
    pub output_item_row_id: String,
    #[serde(default = "default_count_to_create")]
    pub count_to_create: i64,
    #[serde(default)]
    pub ingredients: Vec<IngredientRecord>,
    #[serde(default)]
    pub bench: Option<String>,
    #[serde(default)]
    pub is_default_unlocked: bool,
    #[serde(default)]
    pub unlock_condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngredientRecord {
    pub item_row_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub substitute_group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstituteRecord {
    pub row_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub items: Vec<String>,
}

fn default_count_to_create() -> i64 {
    1
}

fn required(record: &str, field: &'static str, value: String) -> Result<String, ContractError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ContractError::EmptyField {
            record: record.to_string(),
            field,
        });
    }
    Ok(trimmed.to_string())
}

fn positive(record: &str, field: &'static str, value: i64) -> Result<u64, ContractError> {
    if value <= 0 {
        return Err(ContractError::NonPositive {
            record: record.to_string(),
            field,
            value,
        });
    }
    Ok(value as u64)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "None")
}

impl TryFrom<ItemRecord> for Item {
    type Error = ContractError;

    fn try_from(record: ItemRecord) -> Result<Self, Self::Error> {
        let row_id = required("item", "row_id", record.row_id)?;
        // Untranslated items fall back to their row id
        let name = non_blank(record.name).unwrap_or_else(|| row_id.clone());
        Ok(Item {
            row_id,
            name,
            category: non_blank(record.category),
        })
    }
}

impl From<Item> for ItemRecord {
    fn from(item: Item) -> Self {
        ItemRecord {
            row_id: item.row_id,
            name: Some(item.name),
            category: item.category,
        }
    }
}

impl TryFrom<RecipeRecord> for Recipe {
    type Error = ContractError;

    fn try_from(record: RecipeRecord) -> Result<Self, Self::Error> {
        let row_id = required("recipe", "row_id", record.row_id)?;
        let output_item_row_id = required(&row_id, "output_item_row_id", record.output_item_row_id)?;
        let count_to_create = positive(&row_id, "count_to_create", record.count_to_create)?;

        let ingredients = record
            .ingredients
            .into_iter()
            .map(|ing| {
                Ok(Ingredient {
                    item_row_id: required(&row_id, "item_row_id", ing.item_row_id)?,
                    quantity: positive(&row_id, "quantity", ing.quantity)?,
                    substitute_group: non_blank(ing.substitute_group),
                })
            })
            .collect::<Result<Vec<_>, ContractError>>()?;

        Ok(Recipe {
            row_id,
            output_item_row_id,
            count_to_create,
            ingredients,
            bench: non_blank(record.bench),
            unlock: UnlockState {
                default_unlocked: record.is_default_unlocked,
                condition: non_blank(record.unlock_condition),
            },
        })
    }
}

impl From<Recipe> for RecipeRecord {
    fn from(recipe: Recipe) -> Self {
        RecipeRecord {
            row_id: recipe.row_id,
            output_item_row_id: recipe.output_item_row_id,
            count_to_create: recipe.count_to_create as i64,
            ingredients: recipe
                .ingredients
                .into_iter()
                .map(|ing| IngredientRecord {
                    item_row_id: ing.item_row_id,
                    quantity: ing.quantity as i64,
                    substitute_group: ing.substitute_group,
                })
                .collect(),
            bench: recipe.bench,
            is_default_unlocked: recipe.unlock.default_unlocked,
            unlock_condition: recipe.unlock.condition,
        }
    }
}

impl TryFrom<SubstituteRecord> for SubstituteGroup {
    type Error = ContractError;

    fn try_from(record: SubstituteRecord) -> Result<Self, Self::Error> {
        let row_id = required("substitute", "row_id", record.row_id)?;
        let item_row_ids = record
            .items
            .into_iter()
            .map(|id| required(&row_id, "items", id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SubstituteGroup {
            row_id,
            name: non_blank(record.name),
            item_row_ids,
        })
    }
}

impl From<SubstituteGroup> for SubstituteRecord {
    fn from(group: SubstituteGroup) -> Self {
        SubstituteRecord {
            row_id: group.row_id,
            name: group.name,
            items: group.item_row_ids,
        }
    }
}
