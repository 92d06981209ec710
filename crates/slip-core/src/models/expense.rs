//! Expense record produced from a scanned receipt.

use std::fmt;

use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ReceiptError, Result};

/// Date format used for `ScannedExpense::date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A structured expense derived from one receipt image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedExpense {
    /// Freshly generated identifier, never taken from the model.
    pub id: String,

    /// Merchant name as read by the model.
    pub merchant: String,

    /// Receipt total.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    /// Purchase date as `YYYY-MM-DD`.
    pub date: String,

    /// Expense category.
    pub category: Category,

    /// Short free-text description.
    pub description: String,

    /// Line items in receipt order.
    pub items: Vec<ExpenseItem>,
}

/// A single line on the receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpenseItem {
    pub name: String,
    pub quantity: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

/// Closed set of expense categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transportation,
    Utilities,
    Entertainment,
    Shopping,
    Health,
    Education,
    #[default]
    Other,
}

impl Category {
    /// All categories, in the order they are offered to the model.
    pub const ALL: [Category; 8] = [
        Category::Food,
        Category::Transportation,
        Category::Utilities,
        Category::Entertainment,
        Category::Shopping,
        Category::Health,
        Category::Education,
        Category::Other,
    ];

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transportation => "transportation",
            Category::Utilities => "utilities",
            Category::Entertainment => "entertainment",
            Category::Shopping => "shopping",
            Category::Health => "health",
            Category::Education => "education",
            Category::Other => "other",
        }
    }

    /// Parse a category name, ignoring case and surrounding whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expense shape as emitted by the model, before defaults are filled in.
///
/// Missing and `null` fields both decode as empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExpense {
    merchant: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    amount: Option<Decimal>,
    date: Option<String>,
    category: Option<String>,
    description: Option<String>,
    items: Option<Vec<RawItem>>,
}

/// Line item as emitted by the model.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawItem {
    name: Option<String>,
    quantity: Option<i64>,
    #[serde(with = "rust_decimal::serde::float_option")]
    price: Option<Decimal>,
}

impl From<RawItem> for ExpenseItem {
    fn from(raw: RawItem) -> Self {
        Self {
            name: raw.name.unwrap_or_default(),
            quantity: raw.quantity.unwrap_or_default(),
            price: raw.price.unwrap_or_default(),
        }
    }
}

impl ScannedExpense {
    /// Parse model output into an expense, defaulting the date to today.
    pub fn from_model_text(text: &str) -> Result<Self> {
        Self::from_model_text_on(text, Local::now().date_naive())
    }

    /// Parse model output into an expense using `today` as the fallback date.
    ///
    /// The text must be a bare JSON object; fenced or annotated output is
    /// rejected with [`ReceiptError::Parse`].
    pub fn from_model_text_on(text: &str, today: NaiveDate) -> Result<Self> {
        let raw: RawExpense = serde_json::from_str(text).map_err(ReceiptError::Parse)?;

        let date = match raw.date {
            Some(date) if !date.is_empty() => date,
            _ => {
                debug!("Model returned no date, using {}", today);
                today.format(DATE_FORMAT).to_string()
            }
        };

        let category = match raw.category.as_deref() {
            None | Some("") => Category::Other,
            Some(name) => Category::parse(name).unwrap_or_else(|| {
                warn!("Unknown category {:?} from model, using other", name);
                Category::Other
            }),
        };

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            merchant: raw.merchant.unwrap_or_default(),
            amount: raw.amount.unwrap_or_default(),
            date,
            category,
            description: raw.description.unwrap_or_default(),
            items: raw
                .items
                .unwrap_or_default()
                .into_iter()
                .map(ExpenseItem::from)
                .collect(),
        })
    }

    /// Sum of `quantity * price` over all items.
    pub fn items_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|i| Decimal::from(i.quantity) * i.price)
            .sum()
    }
}
