//! Domain types shared by every ShopList crate
//!
//! - `ShoppingList` / `ShoppingListItem`: the shared list and its rows
//! - `Category`: the fixed grouping enumeration
//! - `NewItem`: validated input for adding a row
//! - `Timestamp`: millisecond wall-clock instants used for `checked_at`

pub mod error;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use types::{
    Category, ItemId, ItemUpdate, ListId, NewItem, ShoppingList, ShoppingListItem, Timestamp, Validator,
};
