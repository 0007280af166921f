//! Typesetting backend: engine output text → filled triangle mesh.
//!
//! The engine prints one Typst math expression per computation. This module
//! wraps that payload in display-math delimiters, compiles it with an
//! in-memory [`TypesetWorld`], and extracts the page geometry into a single
//! [`Mesh2D`] ready for GPU upload.

pub mod extract;
pub mod tessellate;
pub mod world;

use log::{debug, warn};

use crate::scene::{Aabb2, Mesh2D};
use extract::{ExtractOptions, mesh_from_paged_document};
use typst::layout::PagedDocument;
use world::{ExprDoc, TypesetWorld};

/// Typesetting failures, distinct from engine failures: the engine ran and
/// produced output, but the output could not be turned into geometry.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The engine produced nothing to typeset.
    #[error("engine produced an empty expression")]
    EmptyExpression,

    /// Typst rejected the (wrapped) expression.
    #[error("typst compilation failed: {0}")]
    Compile(String),

    /// Compilation succeeded but the page contained nothing renderable.
    #[error("typeset output contains no geometry")]
    NoGeometry,
}

/// A typeset computation result: the source it came from plus its geometry.
#[derive(Debug, Clone)]
pub struct TypesetArtifact {
    /// The raw (unwrapped) expression the mesh was built from.
    pub source: String,
    pub mesh: Mesh2D,
    /// Mesh bounds in pt, for camera framing.
    pub bounds: Aabb2,
}

/// Wrap a raw engine payload in Typst display-math delimiters.
///
/// The payload is trusted Typst math syntax; spaces inside the delimiters
/// select display style.
pub fn wrap_math(payload: &str) -> String {
    format!("$ {} $", payload.trim())
}

/// Compile one expression into a renderable artifact.
///
/// Builds a fresh single-source world per call; font loading dominates the
/// cost, but invocations are user-paced (one per button press) so this stays
/// simple rather than caching a world across calls.
pub fn compile_expression(payload: &str) -> Result<TypesetArtifact, RenderError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(RenderError::EmptyExpression);
    }

    let wrapped = wrap_math(trimmed);
    let doc = compile_wrapped(&wrapped)?;

    let (mesh, stats) = mesh_from_paged_document(&doc, &ExtractOptions::default());
    debug!(
        "typeset: {} page(s), {} glyphs ({} tris), {} shapes, {} lines",
        stats.pages,
        stats.glyphs_emitted,
        stats.glyph_triangles,
        stats.filled_shapes_emitted,
        stats.lines_emitted
    );

    if mesh.is_empty() {
        return Err(RenderError::NoGeometry);
    }

    let bounds = mesh.bounds();
    Ok(TypesetArtifact {
        source: trimmed.to_string(),
        mesh,
        bounds,
    })
}

fn compile_wrapped(wrapped: &str) -> Result<PagedDocument, RenderError> {
    let world = TypesetWorld::new(ExprDoc::new("expr.typ", wrapped))
        .map_err(|e| RenderError::Compile(format!("world setup failed: {e}")))?;
    debug!("typeset world ready with {} font face(s)", world.font_count());

    let compiled = typst::compile::<PagedDocument>(&world);

    for diag in &compiled.warnings {
        warn!("typst warning: {}", diag.message);
    }

    compiled.output.map_err(|diags| {
        let msg = diags
            .iter()
            .map(|d| d.message.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        RenderError::Compile(msg)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_math_adds_display_delimiters() {
        assert_eq!(wrap_math("x^2"), "$ x^2 $");
        assert_eq!(wrap_math("  x^2  "), "$ x^2 $");
    }

    #[test]
    fn empty_payload_is_rejected_before_compilation() {
        assert!(matches!(
            compile_expression("   \n  "),
            Err(RenderError::EmptyExpression)
        ));
    }

    #[test]
    fn simple_expression_produces_geometry() {
        let artifact = compile_expression("x^2 + 1").expect("compile x^2 + 1");
        assert!(!artifact.mesh.is_empty());
        let size = artifact.bounds.size();
        assert!(size[0] > 0.0 && size[1] > 0.0);
        assert_eq!(artifact.source, "x^2 + 1");
    }

    #[test]
    fn glyph_ink_runs_down_the_page() {
        // Page space is y-down: an ascender ("b") must start higher on the
        // page than an x-height-plus-descender glyph ("g"), and "g" must
        // reach further down. Both compile on identical page layouts, so the
        // baselines line up.
        let b = compile_expression("b").expect("compile b").bounds;
        let g = compile_expression("g").expect("compile g").bounds;

        assert!(
            b.min[1] < g.min[1],
            "ascender should start higher on the page: b.min_y={} g.min_y={}",
            b.min[1],
            g.min[1]
        );
        assert!(
            g.max[1] > b.max[1],
            "descender should reach lower on the page: g.max_y={} b.max_y={}",
            g.max[1],
            b.max[1]
        );
    }

    #[test]
    fn malformed_expression_reports_compile_error() {
        // `#` escapes to code inside math; the variable does not exist.
        let err = compile_expression("x + #nonexistentfn()").unwrap_err();
        assert!(matches!(err, RenderError::Compile(_)));
    }
}
