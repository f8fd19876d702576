//! Shared board configuration: grid dimensions and background image

use log::{info, warn};
use shared::GridSize;

/// Process-wide board state. Owned exclusively by the dispatch loop;
/// collaborators only ever read copies.
#[derive(Debug, Default)]
pub struct BoardConfig {
    grid: GridSize,
    background: String,
}

impl BoardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    pub fn background(&self) -> &str {
        &self.background
    }

    /// Replaces both dimensions atomically. Takes effect for subsequent
    /// movement validation only; participants already outside the new
    /// bounds keep their stored positions. Returns true if the stored
    /// configuration actually changed.
    pub fn set_dimensions(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            warn!("Ignoring grid resize to {}x{}", width, height);
            return false;
        }

        let updated = GridSize::new(width, height);
        if updated == self.grid {
            return false;
        }

        info!(
            "Grid resized from {}x{} to {}x{}",
            self.grid.width, self.grid.height, width, height
        );
        self.grid = updated;
        true
    }

    /// Replaces the background reference (URL or data-encoded blob).
    /// Returns true if the stored reference actually changed.
    pub fn set_background(&mut self, reference: String) -> bool {
        if reference == self.background {
            return false;
        }

        self.background = reference;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{DEFAULT_GRID_HEIGHT, DEFAULT_GRID_WIDTH};

    #[test]
    fn test_default_configuration() {
        let board = BoardConfig::new();
        assert_eq!(board.grid().width, DEFAULT_GRID_WIDTH);
        assert_eq!(board.grid().height, DEFAULT_GRID_HEIGHT);
        assert_eq!(board.background(), "");
    }

    #[test]
    fn test_set_dimensions() {
        let mut board = BoardConfig::new();

        assert!(board.set_dimensions(5, 8));
        assert_eq!(board.grid(), GridSize::new(5, 8));
    }

    #[test]
    fn test_set_dimensions_rejects_non_positive() {
        let mut board = BoardConfig::new();

        assert!(!board.set_dimensions(0, 10));
        assert!(!board.set_dimensions(10, 0));
        assert_eq!(board.grid(), GridSize::default());
    }

    #[test]
    fn test_set_dimensions_unchanged_is_not_a_mutation() {
        let mut board = BoardConfig::new();

        assert!(!board.set_dimensions(DEFAULT_GRID_WIDTH, DEFAULT_GRID_HEIGHT));
    }

    #[test]
    fn test_set_background() {
        let mut board = BoardConfig::new();

        assert!(board.set_background("https://example.com/dungeon.png".to_string()));
        assert_eq!(board.background(), "https://example.com/dungeon.png");

        // Re-applying the same reference changes nothing
        assert!(!board.set_background("https://example.com/dungeon.png".to_string()));
    }
}
