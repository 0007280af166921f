//! Outline tessellation: `lyon::path::Path` → triangle meshes.
//!
//! Glyph outlines and Typst shape geometry arrive as vector paths; the
//! renderer wants filled triangles. This module owns that conversion:
//! 1. Build a path (font units or pt).
//! 2. Apply a transform (font units → pt, plus positioning).
//! 3. Fill-tessellate into a [`Mesh2D`].
//!
//! Fill rule: fonts are authored for non-zero winding, which is the default
//! here. Tolerance trades triangle count against curve smoothness.

use lyon::path::Path;
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, FillVertexConstructor,
    VertexBuffers,
};

use crate::scene::Mesh2D;

/// Tessellation options for outline filling.
#[derive(Debug, Copy, Clone)]
pub struct TessellateOptions {
    /// Smaller => more triangles (smoother curves).
    pub tolerance: f32,
    pub fill_rule: FillRule,
}

impl Default for TessellateOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.02,
            fill_rule: FillRule::NonZero,
        }
    }
}

/// Minimal 2x3 affine for pre-tessellation point transforms.
///
/// Kept separate from `scene::Affine2` so this module stays free of the
/// scene's matrix conventions; convert at the boundary.
///
/// Matrix (column-vector convention):
/// ```text
/// [ a c tx ]
/// [ b d ty ]
/// ```
#[derive(Debug, Copy, Clone)]
pub struct Affine2x3 {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Affine2x3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2x3 {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    #[inline]
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    #[inline]
    pub fn translate(tx: f32, ty: f32) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    /// Compose: `self * rhs` (rhs applies first).
    #[inline]
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            a: self.a * rhs.a + self.c * rhs.b,
            b: self.b * rhs.a + self.d * rhs.b,
            c: self.a * rhs.c + self.c * rhs.d,
            d: self.b * rhs.c + self.d * rhs.d,
            tx: self.a * rhs.tx + self.c * rhs.ty + self.tx,
            ty: self.b * rhs.tx + self.d * rhs.ty + self.ty,
        }
    }

    #[inline]
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }
}

/// Convert a `scene::Affine2` into the tessellator's 2x3 form.
#[inline]
pub fn affine2x3_from_scene(xf: crate::scene::Affine2) -> Affine2x3 {
    Affine2x3 {
        a: xf.m[0][0],
        b: xf.m[0][1],
        c: xf.m[1][0],
        d: xf.m[1][1],
        tx: xf.m[2][0],
        ty: xf.m[2][1],
    }
}

/// Tessellation output vertex (2D position only).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TessVertex {
    pub position: [f32; 2],
}

struct TessVertexCtor {
    xf: Affine2x3,
}

impl FillVertexConstructor<TessVertex> for TessVertexCtor {
    fn new_vertex(&mut self, v: FillVertex) -> TessVertex {
        let p = v.position();
        let (x, y) = self.xf.transform_point(p.x, p.y);
        TessVertex { position: [x, y] }
    }
}

/// Tessellate one outline path into a fresh mesh.
///
/// Self-intersecting contours are common in fonts, so the tessellator runs
/// with its default robustness settings.
pub fn tessellate_path_to_mesh(
    path: &Path,
    transform: Affine2x3,
    opts: TessellateOptions,
) -> Result<Mesh2D, String> {
    let mut tess = FillTessellator::new();
    let mut buffers: VertexBuffers<TessVertex, u32> = VertexBuffers::new();

    let fill = FillOptions::tolerance(opts.tolerance).with_fill_rule(opts.fill_rule);

    let ctor = TessVertexCtor { xf: transform };
    tess.tessellate_path(path, &fill, &mut BuffersBuilder::new(&mut buffers, ctor))
        .map_err(|e| format!("lyon tessellation failed: {e:?}"))?;

    Ok(Mesh2D {
        positions: buffers.vertices.iter().map(|v| v.position).collect(),
        indices: buffers.indices.clone(),
    })
}

/// Tessellate a path and append it into an existing mesh (index-offset).
pub fn append_tessellated_path(
    out: &mut Mesh2D,
    path: &Path,
    transform: Affine2x3,
    opts: TessellateOptions,
) -> Result<(), String> {
    let mesh = tessellate_path_to_mesh(path, transform, opts)?;
    out.append(&mesh);
    Ok(())
}

/// Append `src` into `dst` after transforming its positions by `xf`.
///
/// Used to place cached glyph meshes without re-tessellating.
pub fn append_mesh_with_transform(dst: &mut Mesh2D, src: &Mesh2D, xf: Affine2x3) {
    let base = dst.positions.len() as u32;

    dst.positions.extend(src.positions.iter().map(|p| {
        let (x, y) = xf.transform_point(p[0], p[1]);
        [x, y]
    }));

    dst.indices
        .extend(src.indices.iter().copied().map(|i| base + i));
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyon::math::point;

    fn unit_square() -> Path {
        let mut b = Path::builder();
        b.begin(point(0.0, 0.0));
        b.line_to(point(1.0, 0.0));
        b.line_to(point(1.0, 1.0));
        b.line_to(point(0.0, 1.0));
        b.close();
        b.build()
    }

    #[test]
    fn square_tessellates_to_two_triangles() {
        let mesh =
            tessellate_path_to_mesh(&unit_square(), Affine2x3::IDENTITY, Default::default())
                .unwrap();
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.positions.len(), 4);
    }

    #[test]
    fn transform_composition_matches_pointwise() {
        let xf = Affine2x3::scale(2.0, 3.0).mul(Affine2x3::translate(1.0, 1.0));
        let (x, y) = xf.transform_point(0.0, 0.0);
        assert_eq!((x, y), (2.0, 3.0));
    }

    #[test]
    fn merged_meshes_grow_past_u16_vertices() {
        // A long typeset expression merges tens of thousands of glyph
        // vertices into one mesh; that must not overflow the index type.
        let src = tessellate_path_to_mesh(&unit_square(), Affine2x3::IDENTITY, Default::default())
            .unwrap();
        let mut dst = Mesh2D::default();

        let copies = (u16::MAX as usize / src.positions.len()) + 2;
        for i in 0..copies {
            append_mesh_with_transform(&mut dst, &src, Affine2x3::translate(i as f32 * 2.0, 0.0));
        }

        assert!(dst.positions.len() > u16::MAX as usize);
        assert_eq!(dst.indices.len(), copies * src.indices.len());
        let last = *dst.indices.last().unwrap() as usize;
        assert!(last < dst.positions.len());
    }

    #[test]
    fn append_with_transform_offsets_indices() {
        let src = tessellate_path_to_mesh(&unit_square(), Affine2x3::IDENTITY, Default::default())
            .unwrap();
        let mut dst = src.clone();
        append_mesh_with_transform(&mut dst, &src, Affine2x3::translate(10.0, 0.0));

        assert_eq!(dst.positions.len(), 8);
        assert_eq!(dst.indices.len(), 12);
        let bounds = dst.bounds();
        assert!(bounds.max[0] >= 11.0 - 1e-6);
    }
}
