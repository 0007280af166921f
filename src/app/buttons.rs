//! The mode button bar.
//!
//! A strip across the top of the window with one button per [`Mode`]. Layout
//! and hit testing run in window pixel coordinates; captions are Typst math
//! typeset once at construction and scaled into each button plate per frame.
//! Page space and screen space are both y-down, so caption meshes place with
//! a plain scale + translate.

use log::warn;

use crate::modes::Mode;
use crate::scene::{Aabb2, Affine2, DrawItem2D, Mesh2D, Rgba};
use crate::typeset;

/// Height of the bar in logical pixels.
pub const BAR_HEIGHT_PX: f32 = 64.0;

const MARGIN_PX: f32 = 10.0;
const GAP_PX: f32 = 10.0;
const CAPTION_PADDING_PX: f32 = 12.0;

const BAR_FILL: Rgba = Rgba::rgb(0.10, 0.11, 0.14);
const PLATE_FILL: Rgba = Rgba::rgb(0.18, 0.20, 0.25);
const PLATE_HOVER_FILL: Rgba = Rgba::rgb(0.26, 0.29, 0.36);
const CAPTION_FILL: Rgba = Rgba::rgb(0.92, 0.93, 0.95);

/// Axis-aligned rectangle in window pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RectPx {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl RectPx {
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.min[0] && x < self.max[0] && y >= self.min[1] && y < self.max[1]
    }

    #[inline]
    pub fn center(&self) -> [f32; 2] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        ]
    }

    #[inline]
    pub fn size(&self) -> [f32; 2] {
        [self.max[0] - self.min[0], self.max[1] - self.min[1]]
    }
}

/// Button plate rectangles for the current window width, in bar order.
pub fn layout_buttons(width_px: f32) -> Vec<(Mode, RectPx)> {
    let count = Mode::ALL.len() as f32;
    let usable = (width_px - 2.0 * MARGIN_PX - (count - 1.0) * GAP_PX).max(count);
    let button_w = usable / count;
    let top = MARGIN_PX;
    let bottom = BAR_HEIGHT_PX - MARGIN_PX;

    Mode::ALL
        .iter()
        .enumerate()
        .map(|(i, &mode)| {
            let x0 = MARGIN_PX + i as f32 * (button_w + GAP_PX);
            (
                mode,
                RectPx {
                    min: [x0, top],
                    max: [x0 + button_w, bottom],
                },
            )
        })
        .collect()
}

/// Which button, if any, contains the given window-pixel position.
pub fn hit_test(width_px: f32, x: f32, y: f32) -> Option<Mode> {
    if y >= BAR_HEIGHT_PX {
        return None;
    }
    layout_buttons(width_px)
        .into_iter()
        .find(|(_, rect)| rect.contains(x, y))
        .map(|(mode, _)| mode)
}

struct Caption {
    mesh: Mesh2D,
    bounds: Aabb2,
}

/// The bar itself: pre-typeset captions plus transient hover state.
pub struct ButtonBar {
    captions: Vec<Option<Caption>>,
    hovered: Option<Mode>,
}

impl ButtonBar {
    /// Typeset all captions. A caption that fails to typeset degrades to a
    /// plain plate; the button still works.
    pub fn new() -> Self {
        let captions = Mode::ALL
            .iter()
            .map(|&mode| match typeset::compile_expression(mode.caption_markup()) {
                Ok(artifact) => Some(Caption {
                    bounds: artifact.bounds,
                    mesh: artifact.mesh,
                }),
                Err(err) => {
                    warn!("caption for {mode} failed to typeset: {err}");
                    None
                }
            })
            .collect();

        Self {
            captions,
            hovered: None,
        }
    }

    /// Update hover from a cursor position. Returns true when it changed.
    pub fn set_cursor(&mut self, width_px: f32, x: f32, y: f32) -> bool {
        let hovered = hit_test(width_px, x, y);
        if hovered != self.hovered {
            self.hovered = hovered;
            true
        } else {
            false
        }
    }

    pub fn hovered(&self) -> Option<Mode> {
        self.hovered
    }

    /// Build the bar's draw items in window-pixel space.
    ///
    /// While `busy`, plates dim and hover highlighting is suppressed to show
    /// that clicks are being rejected.
    pub fn draw_items(&self, width_px: f32, busy: bool) -> Vec<DrawItem2D> {
        let mut items = Vec::new();

        let mut bar = Mesh2D::default();
        bar.append_rect([0.0, 0.0], [width_px, BAR_HEIGHT_PX]);
        items.push(DrawItem2D {
            mesh: bar,
            fill: BAR_FILL,
            world_from_local: Affine2::IDENTITY,
            z: 10,
        });

        for (i, (mode, rect)) in layout_buttons(width_px).into_iter().enumerate() {
            let hovered = !busy && self.hovered == Some(mode);
            let plate_fill = if hovered { PLATE_HOVER_FILL } else { PLATE_FILL };
            let dim = if busy { 0.45 } else { 1.0 };

            let mut plate = Mesh2D::default();
            plate.append_rect(rect.min, rect.max);
            items.push(DrawItem2D {
                mesh: plate,
                fill: plate_fill.with_alpha(dim),
                world_from_local: Affine2::IDENTITY,
                z: 11,
            });

            if let Some(caption) = &self.captions[i] {
                if let Some(world_from_local) = caption_transform(caption.bounds, rect) {
                    items.push(DrawItem2D {
                        mesh: caption.mesh.clone(),
                        fill: CAPTION_FILL.with_alpha(dim),
                        world_from_local,
                        z: 12,
                    });
                }
            }
        }

        items
    }
}

/// Fit a caption's pt-space bounds into a button plate: uniform scale, then
/// center. Returns None for degenerate bounds.
fn caption_transform(bounds: Aabb2, rect: RectPx) -> Option<Affine2> {
    if bounds.is_empty() {
        return None;
    }

    let size = bounds.size();
    let (cw, ch) = (size[0].max(1e-3), size[1].max(1e-3));
    let avail = rect.size();
    let aw = (avail[0] - 2.0 * CAPTION_PADDING_PX).max(1.0);
    let ah = (avail[1] - 2.0 * CAPTION_PADDING_PX).max(1.0);

    let s = (aw / cw).min(ah / ch);
    let center = bounds.center();
    let target = rect.center();

    Some(
        Affine2::translate(target[0], target[1])
            .mul(Affine2::scale(s, s))
            .mul(Affine2::translate(-center[0], -center[1])),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_produces_one_rect_per_mode_within_width() {
        let rects = layout_buttons(900.0);
        assert_eq!(rects.len(), Mode::ALL.len());
        for (_, rect) in &rects {
            assert!(rect.min[0] >= 0.0);
            assert!(rect.max[0] <= 900.0);
            assert!(rect.max[1] <= BAR_HEIGHT_PX);
        }
        // No horizontal overlap in bar order.
        for pair in rects.windows(2) {
            assert!(pair[0].1.max[0] <= pair[1].1.min[0]);
        }
    }

    #[test]
    fn hit_test_maps_plate_centers_to_their_modes() {
        let width = 900.0;
        for (mode, rect) in layout_buttons(width) {
            let c = rect.center();
            assert_eq!(hit_test(width, c[0], c[1]), Some(mode));
        }
    }

    #[test]
    fn hit_test_misses_below_the_bar_and_in_gaps() {
        let width = 900.0;
        assert_eq!(hit_test(width, 100.0, BAR_HEIGHT_PX + 5.0), None);

        let rects = layout_buttons(width);
        let gap_x = (rects[0].1.max[0] + rects[1].1.min[0]) * 0.5;
        assert_eq!(hit_test(width, gap_x, BAR_HEIGHT_PX * 0.5), None);
    }

    #[test]
    fn caption_transform_centers_and_fits() {
        let bounds = Aabb2 {
            min: [0.0, 0.0],
            max: [20.0, 10.0],
        };
        let rect = RectPx {
            min: [0.0, 0.0],
            max: [100.0, 50.0],
        };

        let xf = caption_transform(bounds, rect).unwrap();
        let (cx, cy) = xf.transform_point(10.0, 5.0);
        assert!((cx - 50.0).abs() < 1e-4);
        assert!((cy - 25.0).abs() < 1e-4);

        // Corners stay inside the padded plate.
        let (x0, y0) = xf.transform_point(0.0, 0.0);
        let (x1, y1) = xf.transform_point(20.0, 10.0);
        assert!(x0 >= CAPTION_PADDING_PX - 1e-3 && x1 <= 100.0 - CAPTION_PADDING_PX + 1e-3);
        assert!(y0 >= CAPTION_PADDING_PX - 1e-3 && y1 <= 50.0 - CAPTION_PADDING_PX + 1e-3);
    }
}
