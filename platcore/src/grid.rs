//! Row-major grid storage for tile-based levels.
//!
//! Cells are addressed by integer grid coordinates; world positions are
//! integer pixels, converted with floor division so negative positions map
//! to negative cells instead of cell zero.

use crate::math::IVec2;

/// A cell address in grid space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Grid that stores one value per cell.
#[derive(Clone, Debug)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cell_size: i32,
    cells: Vec<T>, // Row-major: [y * width + x]
}

impl<T: Clone> Grid<T> {
    /// Create a grid of `width` x `height` cells, each `cell_size` pixels square.
    pub fn new(width: usize, height: usize, cell_size: i32, default: T) -> Self {
        Self {
            width,
            height,
            cell_size,
            cells: vec![default; width * height],
        }
    }
}

impl<T> Grid<T> {
    /// Get the width of the grid in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Get the height of the grid in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Size of each cell in pixels.
    pub fn cell_size(&self) -> i32 {
        self.cell_size
    }

    /// Convert a pixel position to the coordinate of the cell containing it.
    pub fn world_to_grid(&self, world_pos: IVec2) -> GridCoord {
        GridCoord {
            x: world_pos.x.div_euclid(self.cell_size),
            y: world_pos.y.div_euclid(self.cell_size),
        }
    }

    /// Pixel position of the top-left corner of a cell.
    pub fn grid_to_world(&self, coord: GridCoord) -> IVec2 {
        IVec2::new(coord.x * self.cell_size, coord.y * self.cell_size)
    }

    /// Check if a grid coordinate is within bounds.
    pub fn is_valid(&self, coord: &GridCoord) -> bool {
        coord.x >= 0
            && coord.x < self.width as i32
            && coord.y >= 0
            && coord.y < self.height as i32
    }

    /// Get the cell data at the given coordinate.
    /// Returns `None` if the coordinate is out of bounds.
    pub fn get(&self, coord: GridCoord) -> Option<&T> {
        if !self.is_valid(&coord) {
            return None;
        }
        let index = (coord.y as usize) * self.width + (coord.x as usize);
        self.cells.get(index)
    }

    /// Get mutable access to the cell data at the given coordinate.
    /// Returns `None` if the coordinate is out of bounds.
    pub fn get_mut(&mut self, coord: GridCoord) -> Option<&mut T> {
        if !self.is_valid(&coord) {
            return None;
        }
        let index = (coord.y as usize) * self.width + (coord.x as usize);
        self.cells.get_mut(index)
    }

    /// Set the cell data at the given coordinate.
    /// Returns `false` if the coordinate is out of bounds.
    pub fn set(&mut self, coord: GridCoord, value: T) -> bool {
        if let Some(cell) = self.get_mut(coord) {
            *cell = value;
            true
        } else {
            false
        }
    }

    /// Iterate over all cells with their coordinates, row by row.
    pub fn iter(&self) -> impl Iterator<Item = (GridCoord, &T)> {
        let width = self.width.max(1);
        self.cells.iter().enumerate().map(move |(index, cell)| {
            let coord = GridCoord::new((index % width) as i32, (index / width) as i32);
            (coord, cell)
        })
    }
}
