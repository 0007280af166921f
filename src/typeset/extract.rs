//! Typst frame extraction: compiled `PagedDocument` → triangle mesh.
//!
//! This walks the nested frame tree of a compiled document, accumulating
//! group transforms, and tessellates everything renderable into one merged
//! mesh (per artifact, the display region only ever shows a single uniform
//! fill):
//! - `FrameItem::Text` → per-glyph TTF outlines (`ttf-parser`) → lyon fill
//! - `Geometry::Rect` / `Geometry::Curve` → lyon fill (fraction bars,
//!   radicals, delimiters)
//! - `Geometry::Line` → thin quad approximation using stroke thickness
//!
//! Glyph tessellations are cached by (glyph id, scale bits) since a formula
//! repeats symbols at identical sizes. Gradients, images and links are
//! ignored; a math expression never produces them.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
};

use log::warn;
use lyon::math::point as lyon_point;
use lyon::path::Path;

use crate::scene::{Affine2, Mesh2D};
use crate::typeset::tessellate::{
    Affine2x3, TessellateOptions, affine2x3_from_scene, append_mesh_with_transform,
    append_tessellated_path, tessellate_path_to_mesh,
};
use typst::{
    layout::{Frame, FrameItem, PagedDocument, Transform},
    text::TextItem,
    visualize::{CurveItem, Geometry, Shape},
};

/// Options controlling extraction behavior.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Tessellation tolerance. Smaller => more triangles.
    pub tolerance: f32,

    /// Quad thickness for `Geometry::Line` when the stroke carries none.
    pub default_line_thickness_pt: f32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.02,
            default_line_thickness_pt: 0.75,
        }
    }
}

/// Extraction counters for logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractStats {
    pub pages: usize,
    pub groups: usize,
    pub texts_seen: usize,
    pub shapes_seen: usize,

    pub lines_emitted: usize,
    pub filled_shapes_emitted: usize,
    pub glyphs_emitted: usize,
    pub glyph_triangles: usize,
}

/// Walk all pages and tessellate renderable items into one mesh.
pub fn mesh_from_paged_document(doc: &PagedDocument, opts: &ExtractOptions) -> (Mesh2D, ExtractStats) {
    let mut out = Mesh2D::default();
    let mut stats = ExtractStats {
        pages: doc.pages.len(),
        ..Default::default()
    };

    let mut cache = GlyphMeshCache::default();

    for page in &doc.pages {
        walk_frame(
            &page.frame,
            Affine2::IDENTITY,
            opts,
            &mut cache,
            &mut out,
            &mut stats,
        );
    }

    (out, stats)
}

fn walk_frame(
    frame: &Frame,
    world_from_frame: Affine2,
    opts: &ExtractOptions,
    cache: &mut GlyphMeshCache,
    out: &mut Mesh2D,
    stats: &mut ExtractStats,
) {
    for (pos, item) in frame.items() {
        match item {
            FrameItem::Group(group) => {
                stats.groups += 1;
                let world_from_group =
                    world_from_frame.mul(affine2_from_typst_transform(group.transform));
                walk_frame(&group.frame, world_from_group, opts, cache, out, stats);
            }

            FrameItem::Shape(shape, _span) => {
                stats.shapes_seen += 1;
                let world_from_item = world_from_frame.mul(Affine2::translate(
                    pos.x.to_pt() as f32,
                    pos.y.to_pt() as f32,
                ));
                extract_shape(world_from_item, shape, opts, out, stats);
            }

            FrameItem::Text(text) => {
                stats.texts_seen += 1;
                let world_from_item = world_from_frame.mul(Affine2::translate(
                    pos.x.to_pt() as f32,
                    pos.y.to_pt() as f32,
                ));
                append_text_glyph_outlines(out, cache, world_from_item, text, opts, stats);
            }

            _ => {}
        }
    }
}

fn extract_shape(
    world_from_item: Affine2,
    shape: &Shape,
    opts: &ExtractOptions,
    out: &mut Mesh2D,
    stats: &mut ExtractStats,
) {
    match &shape.geometry {
        Geometry::Line(delta) => {
            let (x0, y0) = world_from_item.transform_point(0.0, 0.0);
            let (x1, y1) =
                world_from_item.transform_point(delta.x.to_pt() as f32, delta.y.to_pt() as f32);

            let thickness_pt = shape
                .stroke
                .as_ref()
                .map(|s| s.thickness.to_pt() as f32)
                .unwrap_or(opts.default_line_thickness_pt)
                .max(0.25);

            out.append_line_quad([x0, y0], [x1, y1], thickness_pt);
            stats.lines_emitted += 1;
        }

        Geometry::Rect(size) => {
            let w = size.x.to_pt() as f32;
            let h = size.y.to_pt() as f32;

            let mut b = Path::builder();
            b.begin(lyon_point(0.0, 0.0));
            b.line_to(lyon_point(w, 0.0));
            b.line_to(lyon_point(w, h));
            b.line_to(lyon_point(0.0, h));
            b.close();

            append_filled_path(out, b.build(), world_from_item, opts, stats);
        }

        Geometry::Curve(curve) => {
            let mut b = Path::builder();
            let mut started = false;

            for item in curve.0.iter() {
                match item {
                    CurveItem::Move(p) => {
                        if started {
                            b.close();
                        }
                        b.begin(lyon_point(p.x.to_pt() as f32, p.y.to_pt() as f32));
                        started = true;
                    }
                    CurveItem::Line(p) => {
                        if !started {
                            b.begin(lyon_point(0.0, 0.0));
                            started = true;
                        }
                        b.line_to(lyon_point(p.x.to_pt() as f32, p.y.to_pt() as f32));
                    }
                    CurveItem::Cubic(p1, p2, p) => {
                        if !started {
                            b.begin(lyon_point(0.0, 0.0));
                            started = true;
                        }
                        b.cubic_bezier_to(
                            lyon_point(p1.x.to_pt() as f32, p1.y.to_pt() as f32),
                            lyon_point(p2.x.to_pt() as f32, p2.y.to_pt() as f32),
                            lyon_point(p.x.to_pt() as f32, p.y.to_pt() as f32),
                        );
                    }
                    CurveItem::Close => {
                        if started {
                            b.close();
                            started = false;
                        }
                    }
                }
            }

            if started {
                b.close();
            }

            append_filled_path(out, b.build(), world_from_item, opts, stats);
        }
    }
}

fn append_filled_path(
    out: &mut Mesh2D,
    path: Path,
    world_from_item: Affine2,
    opts: &ExtractOptions,
    stats: &mut ExtractStats,
) {
    let xf = affine2x3_from_scene(world_from_item);
    let before = out.indices.len();
    if let Err(err) = append_tessellated_path(
        out,
        &path,
        xf,
        TessellateOptions {
            tolerance: opts.tolerance,
            ..Default::default()
        },
    ) {
        warn!("shape tessellation failed: {err}");
        return;
    }
    if out.indices.len() > before {
        stats.filled_shapes_emitted += 1;
    }
}

/// Extract and append tessellated glyph outlines for a shaped `TextItem`.
///
/// Glyph outlines come from the font's TTF face in font units; scale to pt
/// using the item's font size, place with pen advance + per-glyph offsets,
/// then apply the accumulated item transform.
fn append_text_glyph_outlines(
    dst: &mut Mesh2D,
    cache: &mut GlyphMeshCache,
    world_from_item: Affine2,
    text: &TextItem,
    opts: &ExtractOptions,
    stats: &mut ExtractStats,
) {
    let face = text.font.ttf();
    let upm = face.units_per_em() as f32;
    if upm <= 0.0 {
        return;
    }

    let font_units_to_pt = (text.size.to_pt() as f32) / upm;
    let world_from_item_2x3 = affine2x3_from_scene(world_from_item);

    let mut pen_x_pt = 0.0f32;

    for g in text.glyphs.iter() {
        let adv_pt = g.x_advance.at(text.size).to_pt() as f32;
        let x_off_pt = g.x_offset.at(text.size).to_pt() as f32;
        let y_off_pt = g.y_offset.at(text.size).to_pt() as f32;

        let key = GlyphCacheKey {
            glyph_id: g.id,
            scale_bits: font_units_to_pt.to_bits(),
        };

        // Cache meshes in glyph-local space (scaled, untranslated); the pen
        // translation is applied when appending. TTF outlines are y-up, the
        // page is y-down, so the scale negates y.
        let cached = cache.get_or_insert_with(key, || {
            let gid = ttf_parser::GlyphId(g.id);
            let mut builder = LyonOutlineBuilder::new();
            face.outline_glyph(gid, &mut builder)?;

            let path = builder.build();
            tessellate_path_to_mesh(
                &path,
                Affine2x3::scale(font_units_to_pt, -font_units_to_pt),
                TessellateOptions {
                    tolerance: opts.tolerance,
                    ..Default::default()
                },
            )
            .ok()
        });

        if let Some(src) = cached {
            let xf = world_from_item_2x3
                .mul(Affine2x3::translate(pen_x_pt + x_off_pt, y_off_pt));

            let before = dst.indices.len();
            append_mesh_with_transform(dst, src, xf);
            let added = dst.indices.len().saturating_sub(before);

            stats.glyph_triangles += added / 3;
            stats.glyphs_emitted += 1;
        }

        pen_x_pt += adv_pt;
    }
}

/// Convert a Typst `Transform` into our column-major `Affine2`.
fn affine2_from_typst_transform(t: Transform) -> Affine2 {
    let sx = t.sx.get() as f32;
    let sy = t.sy.get() as f32;
    let kx = t.kx.get() as f32;
    let ky = t.ky.get() as f32;
    let tx = t.tx.to_pt() as f32;
    let ty = t.ty.to_pt() as f32;

    Affine2 {
        m: [[sx, ky, 0.0], [kx, sy, 0.0], [tx, ty, 1.0]],
    }
}

/// Cache key: glyph id + pt-scale bits (bit pattern avoids float hashing pitfalls).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct GlyphCacheKey {
    glyph_id: u16,
    scale_bits: u32,
}

impl Hash for GlyphCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.glyph_id.hash(state);
        self.scale_bits.hash(state);
    }
}

/// Cache of tessellated glyph meshes (`None` = glyph has no outline).
#[derive(Debug, Default)]
struct GlyphMeshCache {
    inner: HashMap<GlyphCacheKey, Option<Mesh2D>>,
}

impl GlyphMeshCache {
    fn get_or_insert_with(
        &mut self,
        key: GlyphCacheKey,
        f: impl FnOnce() -> Option<Mesh2D>,
    ) -> Option<&Mesh2D> {
        self.inner.entry(key).or_insert_with(f).as_ref()
    }
}

/// Convert `ttf-parser` outline callbacks into a `lyon::path::Path`.
///
/// A glyph may contain multiple contours: `move_to` starts a new one,
/// `close` ends the current one.
struct LyonOutlineBuilder {
    builder: lyon::path::Builder,
    contour_open: bool,
}

impl LyonOutlineBuilder {
    fn new() -> Self {
        Self {
            builder: Path::builder(),
            contour_open: false,
        }
    }

    fn build(mut self) -> Path {
        if self.contour_open {
            self.builder.close();
            self.contour_open = false;
        }
        self.builder.build()
    }
}

impl ttf_parser::OutlineBuilder for LyonOutlineBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        if self.contour_open {
            self.builder.close();
            self.contour_open = false;
        }
        self.builder.begin(lyon_point(x, y));
        self.contour_open = true;
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(lyon_point(x, y));
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder
            .quadratic_bezier_to(lyon_point(x1, y1), lyon_point(x, y));
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder
            .cubic_bezier_to(lyon_point(x1, y1), lyon_point(x2, y2), lyon_point(x, y));
    }

    fn close(&mut self) {
        if self.contour_open {
            self.builder.close();
            self.contour_open = false;
        }
    }
}
