//! Placement of shared browser windows on a room's board.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Width of a shared browser window, in pixels.
pub const WINDOW_WIDTH: i64 = 1280;
/// Height of a shared browser window, in pixels.
pub const WINDOW_HEIGHT: i64 = 720;
/// Board width in grid cells.
pub const GRID_WIDTH: i64 = 50;
/// Board height in grid cells.
pub const GRID_HEIGHT: i64 = 30;
/// Grid cell size, in pixels.
pub const CELL_SIZE: i64 = 80;
/// Exclusive upper bound for a window's `x`.
pub const MAX_X: i64 = 1 + GRID_WIDTH * CELL_SIZE - WINDOW_WIDTH;
/// Exclusive upper bound for a window's `y`.
pub const MAX_Y: i64 = 1 + GRID_HEIGHT * CELL_SIZE - WINDOW_HEIGHT;
/// Candidate positions tried before settling for an overlapping one.
pub const PLACEMENT_ATTEMPTS: usize = 300;

/// Top-left corner of a window on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset.
    pub x: i64,
    /// Vertical offset.
    pub y: i64,
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: i64,
    /// Top edge.
    pub y: i64,
    /// Width.
    pub width: i64,
    /// Height.
    pub height: i64,
}

impl Rect {
    /// A window-sized rectangle at `position`.
    pub fn window(position: Position) -> Self {
        Self {
            x: position.x,
            y: position.y,
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
        }
    }
}

/// Returns true if `a` and `b` overlap. Touching edges do not overlap.
pub fn rect_intersects(a: Rect, b: Rect) -> bool {
    b.x + b.width > a.x && b.y + b.height > a.y && a.x + a.width > b.x && a.y + a.height > b.y
}

/// Picks a window position in `[0, MAX_X) × [0, MAX_Y)` not overlapping any
/// window in `occupied`.
///
/// After [`PLACEMENT_ATTEMPTS`] colliding candidates the last one is used
/// anyway, so a crowded board still gets its window.
pub fn pick_random_position<R: Rng + ?Sized>(rng: &mut R, occupied: &[Position]) -> Position {
    let mut candidate = random_position(rng);
    for _ in 0..PLACEMENT_ATTEMPTS {
        let window = Rect::window(candidate);
        if !occupied
            .iter()
            .any(|other| rect_intersects(window, Rect::window(*other)))
        {
            break;
        }
        candidate = random_position(rng);
    }
    candidate
}

fn random_position<R: Rng + ?Sized>(rng: &mut R) -> Position {
    Position {
        x: rng.gen_range(0..MAX_X),
        y: rng.gen_range(0..MAX_Y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rect(x: i64, y: i64, width: i64, height: i64) -> Rect {
        Rect { x, y, width, height }
    }

    #[test]
    fn board_bounds() {
        assert_eq!(MAX_X, 2721);
        assert_eq!(MAX_Y, 1681);
    }

    #[test]
    fn intersection() {
        assert!(rect_intersects(rect(0, 0, 10, 10), rect(5, 5, 10, 10)));
        assert!(rect_intersects(rect(0, 0, 10, 10), rect(2, 2, 2, 2)));
        assert!(!rect_intersects(rect(0, 0, 10, 10), rect(10, 0, 10, 10)));
        assert!(!rect_intersects(rect(0, 0, 10, 10), rect(0, 20, 10, 10)));
    }

    #[test]
    fn positions_stay_on_board() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let p = pick_random_position(&mut rng, &[]);
            assert!((0..MAX_X).contains(&p.x));
            assert!((0..MAX_Y).contains(&p.y));
        }
    }

    #[test]
    fn avoids_existing_windows() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut occupied = Vec::new();
        for _ in 0..3 {
            let p = pick_random_position(&mut rng, &occupied);
            assert!(occupied
                .iter()
                .all(|o| !rect_intersects(Rect::window(p), Rect::window(*o))));
            occupied.push(p);
        }
    }

    #[test]
    fn full_board_still_places() {
        // Windows tiled over the whole board leave no free spot.
        let mut occupied = Vec::new();
        for x in (0..MAX_X + WINDOW_WIDTH).step_by(WINDOW_WIDTH as usize) {
            for y in (0..MAX_Y + WINDOW_HEIGHT).step_by(WINDOW_HEIGHT as usize) {
                occupied.push(Position { x, y });
            }
        }
        let mut rng = StdRng::seed_from_u64(1);
        let p = pick_random_position(&mut rng, &occupied);
        assert!((0..MAX_X).contains(&p.x));
    }
}
