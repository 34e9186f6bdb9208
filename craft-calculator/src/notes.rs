//! Crafting notes: order lines and on-hand stock
//!
//! An order is plain text, one request per line:
//!
//! ```text
//! # base camp
//! 3x table
//! crafting_bench
//! knife * 2
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::models::ResourceCalculation;
use crate::resolver::CraftRequest;

// "3x table", "3 x table", "3 table", "3*table"
static PREFIX_QTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<qty>\d+)\s*[xX*]?\s+(?P<item>\S.*?)$|^(?P<qty2>\d+)\s*[xX*]\s*(?P<item2>\S.*?)$")
        .expect("prefix quantity pattern")
});
// "table x3", "table * 3", "table:3"
static SUFFIX_QTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<item>.+?)(?:\s+[xX]\s*|\s*\*\s*|\s*:\s*)(?P<qty>\d+)$")
        .expect("suffix quantity pattern")
});
static STOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<item>[^=\s](?:[^=]*[^=\s])?)\s*=\s*(?P<qty>\d+)\s*$").expect("stock pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotesError {
    #[error("line {line}: quantity in '{text}' must be at least 1")]
    ZeroQuantity { line: usize, text: String },

    #[error("line {line}: quantity in '{text}' is too large")]
    QuantityTooLarge { line: usize, text: String },

    #[error("invalid stock entry '{0}', expected ITEM=QUANTITY")]
    InvalidStock(String),
}

/// Parse one order line. Blank lines and `#` comments yield `None`.
pub fn parse_order_line(line_no: usize, line: &str) -> Result<Option<CraftRequest>, NotesError> {
    let text = line.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }

    let (item, qty) = if let Some(caps) = PREFIX_QTY.captures(text) {
        let qty = caps.name("qty").or_else(|| caps.name("qty2"));
        let item = caps.name("item").or_else(|| caps.name("item2"));
        match (item, qty) {
            (Some(item), Some(qty)) => (item.as_str(), Some(qty.as_str())),
            _ => (text, None),
        }
    } else if let Some(caps) = SUFFIX_QTY.captures(text) {
        (
            caps.name("item").map_or(text, |m| m.as_str()),
            caps.name("qty").map(|m| m.as_str()),
        )
    } else {
        (text, None)
    };

    let quantity = match qty {
        None => 1,
        Some(digits) => digits.parse::<u64>().map_err(|_| NotesError::QuantityTooLarge {
            line: line_no,
            text: text.to_string(),
        })?,
    };
    if quantity == 0 {
        return Err(NotesError::ZeroQuantity {
            line: line_no,
            text: text.to_string(),
        });
    }

    Ok(Some(CraftRequest::new(item.trim(), quantity)))
}

/// Parse a whole order; line numbers in errors are 1-based.
pub fn parse_order(text: &str) -> Result<Vec<CraftRequest>, NotesError> {
    let mut requests = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if let Some(request) = parse_order_line(idx + 1, line)? {
            requests.push(request);
        }
    }
    Ok(requests)
}

/// Parse `ITEM=QUANTITY` stock entries into an on-hand map.
pub fn parse_stock<S: AsRef<str>>(entries: &[S]) -> Result<HashMap<String, u64>, NotesError> {
    let mut stock: HashMap<String, u64> = HashMap::new();
    for entry in entries {
        let entry = entry.as_ref();
        let caps = STOCK
            .captures(entry)
            .ok_or_else(|| NotesError::InvalidStock(entry.to_string()))?;
        let qty = caps["qty"]
            .parse::<u64>()
            .map_err(|_| NotesError::InvalidStock(entry.to_string()))?;
        let entry = stock.entry(caps["item"].to_string()).or_default();
        *entry = entry.saturating_add(qty);
    }
    Ok(stock)
}

/// Re-key stock entries through `resolve`, merging entries that name the
/// same item (say by row id and by display name).
pub fn rekey_stock<E>(
    stock: HashMap<String, u64>,
    mut resolve: impl FnMut(&str) -> Result<String, E>,
) -> Result<HashMap<String, u64>, E> {
    let mut rekeyed: HashMap<String, u64> = HashMap::new();
    for (key, qty) in stock {
        let entry = rekeyed.entry(resolve(&key)?).or_default();
        *entry = entry.saturating_add(qty);
    }
    Ok(rekeyed)
}

/// A base resource the crafter is short of
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingResource {
    pub item_id: String,
    pub item_name: String,
    pub quantity_needed: u64,
}

/// Subtract on-hand stock from the required resources, keeping only shortfalls.
pub fn missing_resources(
    required: &[ResourceCalculation],
    on_hand: &HashMap<String, u64>,
) -> Vec<MissingResource> {
    required
        .iter()
        .filter_map(|r| {
            let have = on_hand.get(&r.item_id).copied().unwrap_or(0);
            let needed = r.total_quantity.saturating_sub(have);
            (needed > 0).then(|| MissingResource {
                item_id: r.item_id.clone(),
                item_name: r.item_name.clone(),
                quantity_needed: needed,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(item: &str, qty: u64) -> Option<CraftRequest> {
        Some(CraftRequest::new(item, qty))
    }

    #[test]
    fn test_order_line_forms() {
        assert_eq!(parse_order_line(1, "3x table").unwrap(), req("table", 3));
        assert_eq!(parse_order_line(1, "3 x table").unwrap(), req("table", 3));
        assert_eq!(parse_order_line(1, "12 crafting_bench").unwrap(), req("crafting_bench", 12));
        assert_eq!(parse_order_line(1, "table x4").unwrap(), req("table", 4));
        assert_eq!(parse_order_line(1, "knife * 2").unwrap(), req("knife", 2));
        assert_eq!(parse_order_line(1, "knife:5").unwrap(), req("knife", 5));
        assert_eq!(parse_order_line(1, "  sheet_metal ").unwrap(), req("sheet_metal", 1));
        assert_eq!(parse_order_line(1, "box").unwrap(), req("box", 1));
    }

    #[test]
    fn test_comments_and_blanks() {
        let order = parse_order("# camp\n\n2x table\n   \nknife\n").unwrap();
        assert_eq!(order, vec![CraftRequest::new("table", 2), CraftRequest::new("knife", 1)]);
    }

    #[test]
    fn test_zero_quantity_reports_line() {
        let err = parse_order("table\n0x knife").unwrap_err();
        assert_eq!(
            err,
            NotesError::ZeroQuantity {
                line: 2,
                text: "0x knife".into()
            }
        );
    }

    #[test]
    fn test_huge_quantity() {
        assert!(matches!(
            parse_order_line(7, "99999999999999999999999 table"),
            Err(NotesError::QuantityTooLarge { line: 7, .. })
        ));
    }

    #[test]
    fn test_parse_stock() {
        let stock = parse_stock(&["plank=10", "glue = 2", "plank=1"]).unwrap();
        assert_eq!(stock["plank"], 11);
        assert_eq!(stock["glue"], 2);
        assert!(matches!(parse_stock(&["plank"]), Err(NotesError::InvalidStock(_))));
        assert!(matches!(parse_stock(&["=4"]), Err(NotesError::InvalidStock(_))));
    }

    #[test]
    fn test_stock_by_display_name() {
        let stock = parse_stock(&["Scrap Metal = 20", "Glue=5", "glue=1"]).unwrap();
        assert_eq!(stock["Scrap Metal"], 20);

        let names = HashMap::from([("Scrap Metal", "scrap_metal"), ("Glue", "glue")]);
        let stock = rekey_stock(stock, |key| {
            Ok::<_, NotesError>(names.get(key).map_or(key, |id| *id).to_string())
        })
        .unwrap();
        assert_eq!(stock, HashMap::from([("scrap_metal".to_string(), 20), ("glue".to_string(), 6)]));
    }

    #[test]
    fn test_missing_resources() {
        let required = vec![
            ResourceCalculation {
                item_id: "glue".into(),
                item_name: "Glue".into(),
                total_quantity: 3,
                is_base_resource: true,
            },
            ResourceCalculation {
                item_id: "plank".into(),
                item_name: "Plank".into(),
                total_quantity: 12,
                is_base_resource: true,
            },
        ];
        let on_hand = HashMap::from([("plank".to_string(), 5), ("glue".to_string(), 9)]);

        assert_eq!(
            missing_resources(&required, &on_hand),
            vec![MissingResource {
                item_id: "plank".into(),
                item_name: "Plank".into(),
                quantity_needed: 7,
            }]
        );
    }
}
