use pendulum_common::{SquareRegion, Vec2, Viewport};

/// Fraction of the smaller viewport dimension covered by the pendulum square.
pub const SQUARE_FRACTION: f64 = 0.7;

/// Placement of a population of pendulums inside the viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub square: SquareRegion,
    /// Number of cells per row and per column.
    pub grid_dim: u32,
    pub cell_size: f64,
    /// Suspension point of each pendulum, row-major, one per cell index.
    pub origins: Vec<Vec2>,
}

/// Number of rows/columns of the smallest square grid holding `count` cells.
#[inline(always)]
pub fn grid_dim_for(count: usize) -> u32 {
    // Integer ceil-sqrt avoids float rounding at perfect squares.
    // Squares saturate, and the result saturates at u32::MAX.
    let count = count as u64;
    let mut dim = (count as f64).sqrt().floor() as u64;
    while dim.saturating_mul(dim) < count {
        dim += 1;
    }
    while dim > 1 && (dim - 1).saturating_mul(dim - 1) >= count {
        dim -= 1;
    }
    u32::try_from(dim.max(1)).unwrap_or(u32::MAX)
}

/// Centers a square of 70% of the smaller viewport side and places `count` origins
/// at the centers of its grid cells, filling row by row.
pub fn compute_layout(count: usize, viewport: Viewport) -> GridLayout {
    let grid_dim = grid_dim_for(count);
    let size = viewport.width.min(viewport.height) * SQUARE_FRACTION;
    let square = SquareRegion {
        x: (viewport.width - size) / 2.0,
        y: (viewport.height - size) / 2.0,
        size,
    };
    let cell_size = size / grid_dim as f64;

    let dim = grid_dim as usize;
    let origins = (0..count)
        .map(|i| {
            let col = (i % dim) as f64;
            let row = (i / dim) as f64;
            Vec2::new(
                square.x + col * cell_size + cell_size / 2.0,
                square.y + row * cell_size + cell_size / 2.0,
            )
        })
        .collect();

    GridLayout { square, grid_dim, cell_size, origins }
}
