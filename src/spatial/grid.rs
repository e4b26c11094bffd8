//! Generic dense grid over integer tile coordinates

use serde::{Deserialize, Serialize};

/// Dense row-major 2D grid; out-of-range reads return `None`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid<T: Clone + Default> {
    pub width: i32,
    pub height: i32,
    data: Vec<T>,
}

impl<T: Clone + Default> Grid<T> {
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            width,
            height,
            data: vec![T::default(); (width * height) as usize],
        }
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        self.contains(x, y).then(|| (y * self.width + x) as usize)
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> Option<&T> {
        self.index(x, y).map(|i| &self.data[i])
    }

    #[inline]
    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut T> {
        self.index(x, y).map(move |i| &mut self.data[i])
    }

    #[inline]
    pub fn set(&mut self, x: i32, y: i32, value: T) {
        if let Some(i) = self.index(x, y) {
            self.data[i] = value;
        }
    }

    /// Clamp a coordinate pair into the grid
    pub fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        (
            x.clamp(0, (self.width - 1).max(0)),
            y.clamp(0, (self.height - 1).max(0)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_bounds() {
        let mut grid: Grid<u8> = Grid::new(4, 3);
        grid.set(3, 2, 9);
        assert_eq!(grid.get(3, 2), Some(&9));
        assert_eq!(grid.get(4, 0), None);
        assert_eq!(grid.get(-1, 0), None);
        grid.set(10, 10, 1);
        assert_eq!(grid.clamp(10, -4), (3, 0));
    }
}
