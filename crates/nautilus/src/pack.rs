//! Placing finished components next to each other: fixed components stay
//! where their coordinates put them, the rest are tiled row-major on a
//! near-square grid.

use crate::LayoutOptions;
use crate::geom::Vec2;
use crate::model::LayoutGraph;

/// Arranges components on the plane. Components flagged in `placed` (fixed
/// or matched onto existing coordinates) keep their absolute positions; the
/// others are tiled below them in rows of `ceil(sqrt(n))`, separated by
/// `component_gap · bond_length`.
pub fn pack_components(components: &mut [LayoutGraph], placed: &[bool], options: &LayoutOptions) {
    let gap = options.component_gap * options.bond_length;

    let mut fixed_bottom = 0.0f64;
    let mut has_fixed = false;
    for (lg, &keep) in components.iter().zip(placed) {
        if keep {
            if let Some((min, _)) = lg.bounding_box() {
                fixed_bottom = if has_fixed {
                    fixed_bottom.min(min.y)
                } else {
                    min.y
                };
                has_fixed = true;
            }
        }
    }

    let loose: Vec<usize> = (0..components.len()).filter(|&i| !placed[i]).collect();
    if loose.is_empty() {
        return;
    }
    let columns = (loose.len() as f64).sqrt().ceil() as usize;

    let start_y = if has_fixed { fixed_bottom - gap } else { 0.0 };
    let mut cursor = Vec2::new(0.0, start_y);
    let mut row_height = 0.0f64;
    for (slot, &i) in loose.iter().enumerate() {
        if slot > 0 && slot % columns == 0 {
            cursor.x = 0.0;
            cursor.y -= row_height + gap;
            row_height = 0.0;
        }
        let lg = &mut components[i];
        let Some((min, max)) = lg.bounding_box() else {
            continue;
        };
        // Top-left corner of the component lands on the cursor.
        lg.translate(Vec2::new(cursor.x - min.x, cursor.y - max.y));
        let size = max - min;
        cursor.x += size.x + gap;
        row_height = row_height.max(size.y);
    }
}
