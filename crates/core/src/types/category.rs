//! Fixed category enumeration used for grouping list rows

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grocery category a list row is grouped under
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Category {
    Meat,
    Seafood,
    Dairy,
    Produce,
    Snacks,
    Drinks,
    Household,
    #[default]
    Other,
}

impl Category {
    /// All categories in display order
    pub const ALL: [Category; 8] = [
        Category::Meat,
        Category::Seafood,
        Category::Dairy,
        Category::Produce,
        Category::Snacks,
        Category::Drinks,
        Category::Household,
        Category::Other,
    ];

    /// Maps a free-form label to a category
    ///
    /// Matching is case-insensitive. Legacy labels (`Beef`, `Pork`, `Chicken`)
    /// fold into `Meat`; anything unrecognized becomes `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "meat" | "beef" | "pork" | "chicken" => Category::Meat,
            "seafood" => Category::Seafood,
            "dairy" => Category::Dairy,
            "produce" => Category::Produce,
            "snacks" => Category::Snacks,
            "drinks" => Category::Drinks,
            "household" => Category::Household,
            _ => Category::Other,
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Category::Meat => "Meat",
            Category::Seafood => "Seafood",
            Category::Dairy => "Dairy",
            Category::Produce => "Produce",
            Category::Snacks => "Snacks",
            Category::Drinks => "Drinks",
            Category::Household => "Household",
            Category::Other => "Other",
        }
    }

    /// Position in display order
    pub fn display_index(&self) -> usize {
        match self {
            Category::Meat => 0,
            Category::Seafood => 1,
            Category::Dairy => 2,
            Category::Produce => 3,
            Category::Snacks => 4,
            Category::Drinks => 5,
            Category::Household => 6,
            Category::Other => 7,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
