//! 2D geometry primitives shared by the typesetter and the renderer.
//!
//! Everything that ends up on screen is a flat list of [`DrawItem2D`]s:
//! a triangle mesh in local **pt** coordinates, a fill color, and a composed
//! `world_from_local` transform. There is no retained scene graph — the
//! display region holds at most one typeset artifact at a time, and the
//! button bar rebuilds its items per frame.
//!
//! Conventions:
//! - Layout space is **pt** end-to-end (Typst output stays in pt).
//! - Column vectors (x, y, 1); composition is `world_from_local = parent * local`.
//! - [`Camera2D`] maps pt world coordinates into clip space (-1..1).

/// 2D affine transform stored as a 3x3 matrix in column-major order.
///
/// 3x3 is enough for translation/rotation/scale/shear, composes cleanly, and
/// embeds into a 4x4 MVP for the GPU via [`Affine2::to_mat4`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Affine2 {
    /// Column-major 3x3 matrix.
    pub m: [[f32; 3]; 3],
}

impl Default for Affine2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2 {
    pub const IDENTITY: Self = Self {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    #[inline]
    pub fn translate(tx: f32, ty: f32) -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [tx, ty, 1.0]],
        }
    }

    #[inline]
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            m: [[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Map window pixel coordinates (origin top-left, y down) into clip space.
    ///
    /// Used for UI chrome (the button bar) that is laid out in pixels rather
    /// than camera-framed pt space.
    #[inline]
    pub fn clip_from_screen_px(width: u32, height: u32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Affine2::translate(-1.0, 1.0).mul(Affine2::scale(2.0 / w, -2.0 / h))
    }

    /// Compose transforms: `self * rhs` (rhs applies first).
    #[inline]
    pub fn mul(self, rhs: Self) -> Self {
        let a = self.m;
        let b = rhs.m;

        let mut out = [[0.0f32; 3]; 3];
        for col in 0..3 {
            for row in 0..3 {
                out[col][row] =
                    a[0][row] * b[col][0] + a[1][row] * b[col][1] + a[2][row] * b[col][2];
            }
        }
        Self { m: out }
    }

    #[inline]
    pub fn transform_point(self, x: f32, y: f32) -> (f32, f32) {
        let nx = self.m[0][0] * x + self.m[1][0] * y + self.m[2][0];
        let ny = self.m[0][1] * x + self.m[1][1] * y + self.m[2][1];
        (nx, ny)
    }

    /// Embed into a 4x4 (column-major) for GPU MVP use.
    ///
    /// Transforms (x, y, 0, 1) with z unchanged and w = 1.
    #[inline]
    pub fn to_mat4(self) -> [[f32; 4]; 4] {
        let m = self.m;
        [
            [m[0][0], m[0][1], 0.0, m[0][2]],
            [m[1][0], m[1][1], 0.0, m[1][2]],
            [0.0, 0.0, 1.0, 0.0],
            [m[2][0], m[2][1], 0.0, m[2][2]],
        ]
    }
}

/// Axis-aligned bounding box in pt-space.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Aabb2 {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl Aabb2 {
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY, f32::INFINITY],
            max: [f32::NEG_INFINITY, f32::NEG_INFINITY],
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1]
    }

    #[inline]
    pub fn include_point(&mut self, p: [f32; 2]) {
        self.min[0] = self.min[0].min(p[0]);
        self.min[1] = self.min[1].min(p[1]);
        self.max[0] = self.max[0].max(p[0]);
        self.max[1] = self.max[1].max(p[1]);
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

/// Simple RGBA color (linear space assumed; the renderer targets an sRGB view).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };

    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    #[inline]
    pub const fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// An owned CPU triangle mesh: 2D positions + u32 indices.
///
/// Indices are u32 so a single merged artifact (a long typeset expression)
/// can exceed 65k vertices without overflow.
#[derive(Debug, Clone, Default)]
pub struct Mesh2D {
    pub positions: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Mesh2D {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() || self.indices.is_empty()
    }

    /// Append `src` with index offset.
    pub fn append(&mut self, src: &Mesh2D) {
        if src.is_empty() {
            return;
        }

        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&src.positions);
        self.indices
            .extend(src.indices.iter().copied().map(|i| base + i));
    }

    /// Append a quad covering the given rectangle (two triangles).
    pub fn append_rect(&mut self, min: [f32; 2], max: [f32; 2]) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&[
            [min[0], min[1]],
            [max[0], min[1]],
            [max[0], max[1]],
            [min[0], max[1]],
        ]);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Append a line segment as a thin filled quad.
    ///
    /// Caps/joins/dashes are ignored; degenerate segments are skipped.
    pub fn append_line_quad(&mut self, a: [f32; 2], b: [f32; 2], thickness: f32) {
        let dx = b[0] - a[0];
        let dy = b[1] - a[1];
        let len = (dx * dx + dy * dy).sqrt();
        if len < 1e-6 {
            return;
        }

        let nx = -dy / len;
        let ny = dx / len;
        let half = 0.5 * thickness;

        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&[
            [a[0] + nx * half, a[1] + ny * half],
            [a[0] - nx * half, a[1] - ny * half],
            [b[0] - nx * half, b[1] - ny * half],
            [b[0] + nx * half, b[1] + ny * half],
        ]);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Bounding box of all positions.
    pub fn bounds(&self) -> Aabb2 {
        let mut bounds = Aabb2::empty();
        for &p in &self.positions {
            bounds.include_point(p);
        }
        bounds
    }
}

/// A draw item consumed by the mesh renderer.
///
/// `world_from_local` must already be fully composed; `z` is painter's order
/// (higher draws later).
#[derive(Debug, Clone)]
pub struct DrawItem2D {
    pub mesh: Mesh2D,
    pub fill: Rgba,
    pub world_from_local: Affine2,
    pub z: i32,
}

/// A 2D camera operating in pt-space.
///
/// Maps world pt coordinates into clip space (-1..1) with isotropic zoom and
/// aspect correction, so a typeset formula can be framed into the viewport
/// without stretching.
#[derive(Debug, Copy, Clone)]
pub struct Camera2D {
    pub center_pt: [f32; 2],
    pub zoom: f32,
    pub viewport_aspect: f32,
}

impl Default for Camera2D {
    fn default() -> Self {
        Self {
            center_pt: [0.0, 0.0],
            zoom: 1.0,
            viewport_aspect: 1.0,
        }
    }
}

impl Camera2D {
    /// Set the viewport size in pixels to update the aspect ratio.
    #[inline]
    pub fn set_viewport_px(&mut self, width: u32, height: u32) {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        self.viewport_aspect = w / h;
    }

    fn aspect_scales(&self) -> (f32, f32) {
        let ax = if self.viewport_aspect > 1.0 {
            1.0 / self.viewport_aspect
        } else {
            1.0
        };
        let ay = if self.viewport_aspect < 1.0 {
            self.viewport_aspect
        } else {
            1.0
        };
        (ax, ay)
    }

    /// Affine transform from world (pt) to clip space.
    pub fn clip_from_world(&self) -> Affine2 {
        let t = Affine2::translate(-self.center_pt[0], -self.center_pt[1]);
        let (ax, ay) = self.aspect_scales();
        let s = Affine2::scale(self.zoom * ax, self.zoom * ay);

        // Translate first, then scale: p_clip = s * t * p_world.
        s.mul(t)
    }

    /// Frame the given world-space bounds into the viewport.
    ///
    /// - `padding_pt`: extra margin around the bounds in world units.
    /// - `fill_ratio`: fraction of the viewport to occupy (e.g. 0.8).
    pub fn frame_bounds(&mut self, bounds: Aabb2, padding_pt: f32, fill_ratio: f32) {
        if bounds.is_empty() {
            return;
        }

        let mut b = bounds;
        b.min[0] -= padding_pt;
        b.min[1] -= padding_pt;
        b.max[0] += padding_pt;
        b.max[1] += padding_pt;

        let size = b.size();
        let size_x = size[0].max(1e-3);
        let size_y = size[1].max(1e-3);

        self.center_pt = b.center();

        let fill = fill_ratio.clamp(0.05, 0.98);
        let (ax, ay) = self.aspect_scales();

        // Clip space spans 2.0 units per axis; pick the zoom that fits both.
        let zoom_x = (2.0 * fill) / (size_x * ax);
        let zoom_y = (2.0 * fill) / (size_y * ay);
        self.zoom = zoom_x.min(zoom_y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affine_compose_applies_rhs_first() {
        // scale(2) * translate(1, 0): translate first, then scale.
        let xf = Affine2::scale(2.0, 2.0).mul(Affine2::translate(1.0, 0.0));
        let (x, y) = xf.transform_point(0.0, 0.0);
        assert_eq!((x, y), (2.0, 0.0));
    }

    #[test]
    fn screen_px_maps_corners_to_clip() {
        let xf = Affine2::clip_from_screen_px(800, 600);
        let (x, y) = xf.transform_point(0.0, 0.0);
        assert!((x + 1.0).abs() < 1e-6 && (y - 1.0).abs() < 1e-6);
        let (x, y) = xf.transform_point(800.0, 600.0);
        assert!((x - 1.0).abs() < 1e-6 && (y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn mesh_append_offsets_indices() {
        let mut a = Mesh2D::default();
        a.append_rect([0.0, 0.0], [1.0, 1.0]);
        let mut b = Mesh2D::default();
        b.append_rect([2.0, 2.0], [3.0, 3.0]);
        a.append(&b);

        assert_eq!(a.positions.len(), 8);
        assert_eq!(a.indices.len(), 12);
        assert!(a.indices[6..].iter().all(|&i| i >= 4));
    }

    #[test]
    fn camera_frames_bounds_centered() {
        let mut cam = Camera2D::default();
        cam.set_viewport_px(1000, 1000);

        let bounds = Aabb2 {
            min: [10.0, 10.0],
            max: [30.0, 20.0],
        };
        cam.frame_bounds(bounds, 0.0, 0.8);

        assert_eq!(cam.center_pt, [20.0, 15.0]);
        // Width (20pt) is the limiting axis: 20 * zoom == 2 * 0.8.
        assert!((cam.zoom - 0.08).abs() < 1e-6);

        let (cx, cy) = cam.clip_from_world().transform_point(20.0, 15.0);
        assert!(cx.abs() < 1e-6 && cy.abs() < 1e-6);
    }
}
