//! Domain types for ShopList
//!
//! - `list`: shared lists and their ids
//! - `item`: list rows, ids and add requests
//! - `category`: the grouping enumeration
//! - `common`: timestamps and the validation trait

mod category;
mod common;
mod item;
mod list;

pub use category::Category;
pub use common::{Timestamp, Validator};
pub use item::{ItemId, ItemUpdate, NewItem, ShoppingListItem};
pub use list::{ListId, ShoppingList};
