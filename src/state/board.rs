//! Board layout and generation.
//!
//! A board for a grid of side `n` holds `n²` cells. Cell `i` belongs to pair
//! `i / 2`, so every value appears exactly twice. The cells are then shuffled
//! so the spatial layout carries no information about the pairing.

use rand::Rng;

use crate::config::BoardConfig;

/// Cell identifier, `0..grid_size²`. Stable for the lifetime of a board.
pub type CellId = usize;

/// Theme name that produces numeric pair values.
pub const NUMBERS_THEME: &str = "numbers";

/// Board theme, captured when the session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Theme {
    /// Values are the numeric pair index.
    Numbers,
    /// Values are `icon-N` identifiers from a named icon set.
    Icons(String),
}

impl Theme {
    pub fn parse(name: &str) -> Self {
        if name == NUMBERS_THEME {
            Self::Numbers
        } else {
            Self::Icons(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Numbers => NUMBERS_THEME,
            Self::Icons(name) => name,
        }
    }

    /// Value carried by both cells of a pair.
    pub fn value_for_pair(&self, pair_index: usize, max_icons: usize) -> CellValue {
        match self {
            Self::Numbers => CellValue::Number(pair_index),
            Self::Icons(_) => CellValue::Icon(pair_index % max_icons.max(1)),
        }
    }
}

/// Face value of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellValue {
    Number(usize),
    Icon(usize),
}

impl CellValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(n) => serde_json::json!(n),
            Self::Icon(_) => serde_json::json!(self.to_string()),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Icon(n) => write!(f, "icon-{}", n),
        }
    }
}

/// A single board cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub id: CellId,
    pub value: CellValue,
}

impl Cell {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "value": self.value.to_json()
        })
    }
}

/// Number of pairs on a board of the given side.
pub fn pair_count(grid_size: usize) -> usize {
    grid_size * grid_size / 2
}

/// Check that a grid side and theme produce a board where every value
/// appears exactly twice.
pub fn is_valid_layout(grid_size: usize, theme: &Theme, limits: &BoardConfig) -> bool {
    if grid_size < limits.min_grid_size || grid_size > limits.max_grid_size {
        return false;
    }
    if (grid_size * grid_size) % 2 != 0 {
        return false;
    }
    match theme {
        Theme::Numbers => true,
        Theme::Icons(_) => pair_count(grid_size) <= limits.max_icons,
    }
}

/// Generate a shuffled board.
pub fn generate_board<R: Rng + ?Sized>(
    grid_size: usize,
    theme: &Theme,
    max_icons: usize,
    rng: &mut R,
) -> Vec<Cell> {
    let mut cells: Vec<Cell> = (0..grid_size * grid_size)
        .map(|id| Cell {
            id,
            value: theme.value_for_pair(id / 2, max_icons),
        })
        .collect();
    shuffle(&mut cells, rng);
    cells
}

/// Unbiased in-place Fisher-Yates shuffle.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}
