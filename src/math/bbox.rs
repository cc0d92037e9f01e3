//! Axis-aligned bounding boxes over `geo` rectangles.

use geo::{Coord, Point, Rect};

/// Bounding box of a set of points. `None` for an empty input.
pub fn bbox_around(points: impl IntoIterator<Item = Point<f64>>) -> Option<Rect<f64>> {
    let mut iter = points.into_iter();
    let first = iter.next()?;
    let mut min = Coord {
        x: first.x(),
        y: first.y(),
    };
    let mut max = min;
    for p in iter {
        min.x = min.x.min(p.x());
        min.y = min.y.min(p.y());
        max.x = max.x.max(p.x());
        max.y = max.y.max(p.y());
    }
    Some(Rect::new(min, max))
}

/// Grows a rectangle by `amount` in every direction.
pub fn expand(rect: Rect<f64>, amount: f64) -> Rect<f64> {
    let min = rect.min();
    let max = rect.max();
    Rect::new(
        Coord {
            x: min.x - amount,
            y: min.y - amount,
        },
        Coord {
            x: max.x + amount,
            y: max.y + amount,
        },
    )
}
