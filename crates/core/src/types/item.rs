//! Shopping list row models

use crate::types::{Category, ListId, Timestamp, Validator};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a list row, assigned by the remote store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Creates a new random ItemId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an ItemId from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the ItemId as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A row on a shared list
///
/// `checked_at` is set if and only if `checked` is true; use
/// [`ShoppingListItem::set_checked`] to keep the two in step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub id: ItemId,
    pub list_id: ListId,
    pub name: String,
    pub category: Category,
    pub quantity: u32,
    pub unit: Option<String>,
    pub target_price: Option<f64>,
    pub checked: bool,
    pub checked_at: Option<Timestamp>,
    pub notes: Option<String>,
    /// Display name of the participant who added the row
    pub added_by: Option<String>,
    pub added_at: Timestamp,
}

impl ShoppingListItem {
    /// Creates an unchecked row
    pub fn new(list_id: ListId, name: impl Into<String>, category: Category) -> Self {
        Self {
            id: ItemId::new(),
            list_id,
            name: name.into(),
            category,
            quantity: 1,
            unit: None,
            target_price: None,
            checked: false,
            checked_at: None,
            notes: None,
            added_by: None,
            added_at: Timestamp::now(),
        }
    }

    /// Builds a row from a validated add request
    pub fn from_new(id: ItemId, input: NewItem, added_at: Timestamp) -> Self {
        Self {
            id,
            list_id: input.list_id,
            name: input.name.trim().to_string(),
            category: input.category,
            quantity: input.quantity,
            unit: input.unit,
            target_price: input.target_price,
            checked: false,
            checked_at: None,
            notes: input.notes,
            added_by: input.added_by,
            added_at,
        }
    }

    /// Sets the checked flag, stamping or clearing `checked_at`
    pub fn set_checked(&mut self, checked: bool, now: Timestamp) {
        self.checked = checked;
        self.checked_at = if checked { Some(now) } else { None };
    }

    /// Returns a copy with the checked flag applied
    pub fn with_checked(mut self, checked: bool, now: Timestamp) -> Self {
        self.set_checked(checked, now);
        self
    }

    /// True when the fields a viewer sees change between `self` and `other`
    ///
    /// Compares the checked state and the editable fields; ids and
    /// bookkeeping (`added_by`, `added_at`) are ignored.
    pub fn differs_visibly(&self, other: &ShoppingListItem) -> bool {
        self.checked != other.checked
            || self.name != other.name
            || self.checked_at != other.checked_at
            || self.category != other.category
            || self.quantity != other.quantity
            || self.unit != other.unit
            || self.target_price != other.target_price
            || self.notes != other.notes
    }
}

impl Validator for ShoppingListItem {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Item name cannot be empty".to_string());
        }

        if self.quantity == 0 {
            errors.push("Quantity must be at least 1".to_string());
        }

        if self.checked != self.checked_at.is_some() {
            errors.push("checked_at must be set exactly when the item is checked".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Request to add a row to a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub list_id: ListId,
    pub name: String,
    pub category: Category,
    pub quantity: u32,
    pub unit: Option<String>,
    pub target_price: Option<f64>,
    pub notes: Option<String>,
    pub added_by: Option<String>,
}

impl NewItem {
    /// Creates a request for a single unit of `name`
    pub fn new(list_id: ListId, name: impl Into<String>, category: Category) -> Self {
        Self {
            list_id,
            name: name.into(),
            category,
            quantity: 1,
            unit: None,
            target_price: None,
            notes: None,
            added_by: None,
        }
    }

    /// Sets the quantity
    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Sets the unit label
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the target price
    pub fn with_target_price(mut self, price: f64) -> Self {
        self.target_price = Some(price);
        self
    }

    /// Sets free-form notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Records who added the row
    pub fn added_by(mut self, name: impl Into<String>) -> Self {
        self.added_by = Some(name.into());
        self
    }
}

impl Validator for NewItem {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Item name cannot be empty".to_string());
        }

        if self.quantity == 0 {
            errors.push("Quantity must be at least 1".to_string());
        }

        if let Some(price) = self.target_price {
            if !price.is_finite() || price < 0.0 {
                errors.push("Target price must be a non-negative amount".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Changes to the editable fields of a row
///
/// Fields left as `None` keep their current value. The checked flag is not
/// part of an edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub quantity: Option<u32>,
    pub unit: Option<String>,
    pub target_price: Option<f64>,
    pub notes: Option<String>,
}

impl ItemUpdate {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_target_price(mut self, price: f64) -> Self {
        self.target_price = Some(price);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// True when no field would change
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.quantity.is_none()
            && self.unit.is_none()
            && self.target_price.is_none()
            && self.notes.is_none()
    }

    /// Writes the set fields into `item`
    pub fn apply_to(&self, item: &mut ShoppingListItem) {
        if let Some(name) = &self.name {
            item.name = name.trim().to_string();
        }
        if let Some(category) = self.category {
            item.category = category;
        }
        if let Some(quantity) = self.quantity {
            item.quantity = quantity;
        }
        if let Some(unit) = &self.unit {
            item.unit = Some(unit.clone());
        }
        if let Some(price) = self.target_price {
            item.target_price = Some(price);
        }
        if let Some(notes) = &self.notes {
            item.notes = Some(notes.clone());
        }
    }
}

impl Validator for ItemUpdate {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            errors.push("Item name cannot be empty".to_string());
        }

        if self.quantity == Some(0) {
            errors.push("Quantity must be at least 1".to_string());
        }

        if let Some(price) = self.target_price {
            if !price.is_finite() || price < 0.0 {
                errors.push("Target price must be a non-negative amount".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
