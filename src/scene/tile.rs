//! Per-window placement policy.
//!
//! The transition table is total: unchanged states are no-ops, `Regular`
//! as a target means "restore the saved geometry".

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileState {
    #[default]
    Regular,
    Maximized,
    Minimized,
    Left,
    Right,
    Top,
    TopLeft,
    TopRight,
    Bottom,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKey {
    Left,
    Right,
    Up,
    Down,
}

impl TileState {
    pub fn is_tiled(&self) -> bool {
        !matches!(self, TileState::Regular | TileState::Minimized)
    }
}

/// Next state for a tiling keypress, or None when nothing changes.
/// `Some(Regular)` restores the saved geometry.
pub fn transition(state: TileState, key: TileKey) -> Option<TileState> {
    use TileKey as K;
    use TileState::*;
    let next = match (state, key) {
        (Regular, K::Left) => Left,
        (Regular, K::Right) => Right,
        (Regular, K::Up) => Top,
        (Regular, K::Down) => Bottom,
        (Maximized, K::Left) => Left,
        (Maximized, K::Right) => Right,
        (Maximized, K::Up) => Regular,
        (Maximized, K::Down) => Top,
        (Left, K::Right) => Regular,
        (Left, K::Up) => TopLeft,
        (Left, K::Down) => BottomLeft,
        (Right, K::Left) => Regular,
        (Right, K::Up) => TopRight,
        (Right, K::Down) => BottomRight,
        (Top, K::Left) => TopLeft,
        (Top, K::Right) => TopRight,
        (Top, K::Up) => Maximized,
        (Top, K::Down) => Regular,
        (TopLeft, K::Right) => Top,
        (TopLeft, K::Down) => Left,
        (TopRight, K::Left) => Top,
        (TopRight, K::Down) => Right,
        (Bottom, K::Left) => BottomLeft,
        (Bottom, K::Right) => BottomRight,
        (Bottom, K::Up) => Regular,
        (BottomLeft, K::Right) => Bottom,
        (BottomLeft, K::Up) => Left,
        (BottomRight, K::Left) => Bottom,
        (BottomRight, K::Up) => Right,
        _ => return None,
    };
    Some(next)
}

/// Screen rectangle `(left, top, width, height)` a tiled state occupies.
/// The right and bottom halves absorb any odd pixel. None for the states
/// that keep user geometry.
pub fn tile_rect(state: TileState, screen_w: u32, screen_h: u32) -> Option<(i32, i32, u32, u32)> {
    use TileState::*;
    let half_w = screen_w / 2;
    let rest_w = screen_w - half_w;
    let half_h = screen_h / 2;
    let rest_h = screen_h - half_h;
    let rect = match state {
        Regular | Minimized => return None,
        Maximized => (0, 0, screen_w, screen_h),
        Left => (0, 0, half_w, screen_h),
        Right => (half_w as i32, 0, rest_w, screen_h),
        Top => (0, 0, screen_w, half_h),
        Bottom => (0, half_h as i32, screen_w, rest_h),
        TopLeft => (0, 0, half_w, half_h),
        TopRight => (half_w as i32, 0, rest_w, half_h),
        BottomLeft => (0, half_h as i32, half_w, rest_h),
        BottomRight => (half_w as i32, half_h as i32, rest_w, rest_h),
    };
    Some(rect)
}

#[cfg(test)]
mod tests {
    use super::TileState::*;
    use super::*;

    #[test]
    fn transition_table() {
        let cases = [
            (Regular, [Some(Left), Some(Right), Some(Top), Some(Bottom)]),
            (Maximized, [Some(Left), Some(Right), Some(Regular), Some(Top)]),
            (Left, [None, Some(Regular), Some(TopLeft), Some(BottomLeft)]),
            (Right, [Some(Regular), None, Some(TopRight), Some(BottomRight)]),
            (Top, [Some(TopLeft), Some(TopRight), Some(Maximized), Some(Regular)]),
            (TopLeft, [None, Some(Top), None, Some(Left)]),
            (TopRight, [Some(Top), None, None, Some(Right)]),
            (Bottom, [Some(BottomLeft), Some(BottomRight), Some(Regular), None]),
            (BottomLeft, [None, Some(Bottom), Some(Left), None]),
            (BottomRight, [Some(Bottom), None, Some(Right), None]),
            (Minimized, [None, None, None, None]),
        ];
        let keys = [TileKey::Left, TileKey::Right, TileKey::Up, TileKey::Down];
        for (state, expected) in cases {
            for (key, want) in keys.iter().zip(expected) {
                assert_eq!(transition(state, *key), want, "{:?} + {:?}", state, key);
            }
        }
    }

    #[test]
    fn no_op_is_idempotent() {
        assert_eq!(transition(TopLeft, TileKey::Left), None);
        assert_eq!(transition(TopLeft, TileKey::Left), None);
    }

    #[test]
    fn odd_pixel_goes_right_and_bottom() {
        let (lx, _, lw, _) = tile_rect(Left, 1025, 769).expect("rect");
        let (rx, _, rw, _) = tile_rect(Right, 1025, 769).expect("rect");
        assert_eq!((lx, lw), (0, 512));
        assert_eq!((rx, rw), (512, 513));
        let (_, ty, _, th) = tile_rect(Top, 1025, 769).expect("rect");
        let (_, by, _, bh) = tile_rect(Bottom, 1025, 769).expect("rect");
        assert_eq!((ty, th), (0, 384));
        assert_eq!((by, bh), (384, 385));
    }

    #[test]
    fn quarters_cover_the_screen() {
        let (x, y, w, h) = tile_rect(BottomRight, 1024, 768).expect("rect");
        assert_eq!((x, y, w, h), (512, 384, 512, 384));
    }
}
