//! The single-slot display region.
//!
//! The region below the button bar shows at most one artifact at a time:
//! either the most recent typeset computation or a procedural error
//! indicator. Mounting new content releases whatever was there first, so
//! stale geometry can never linger behind a new result.
//!
//! Typeset meshes arrive in Typst page space (pt, y down). The slot stores
//! them as-is and flips into the camera's y-up world via `world_from_local`,
//! keeping the flip out of the extraction path.

use crate::scene::{Aabb2, Affine2, Camera2D, DrawItem2D, Mesh2D, Rgba};
use crate::typeset::TypesetArtifact;

/// Margin around mounted content when framing the camera, in pt.
const FRAME_PADDING_PT: f32 = 40.0;

/// Fraction of the viewport the mounted content should occupy.
const FRAME_FILL_RATIO: f32 = 0.75;

/// Side length of the procedural error indicator, in pt.
const ERROR_INDICATOR_SIZE_PT: f32 = 60.0;

/// What currently occupies the slot.
pub enum SlotContent {
    Typeset(RenderState),
    ErrorIndicator(Mesh2D),
}

/// A mounted typeset artifact plus its framing data.
pub struct RenderState {
    /// The raw expression this mesh was typeset from (for logs).
    pub source: String,
    pub mesh: Mesh2D,
    /// Bounds in y-up world space (already flipped from page space).
    pub world_bounds: Aabb2,
}

/// Holds the one artifact the display region shows.
#[derive(Default)]
pub struct DisplaySlot {
    content: Option<SlotContent>,
    mounts: u64,
}

impl DisplaySlot {
    /// Release the current content and attach a typeset artifact.
    pub fn mount_artifact(&mut self, artifact: TypesetArtifact) {
        let world_bounds = flip_y_bounds(artifact.bounds);
        self.attach(SlotContent::Typeset(RenderState {
            source: artifact.source,
            mesh: artifact.mesh,
            world_bounds,
        }));
    }

    /// Release the current content and attach the error indicator.
    ///
    /// The indicator is procedural so this path cannot itself fail.
    pub fn mount_error_indicator(&mut self) {
        self.attach(SlotContent::ErrorIndicator(error_indicator_mesh()));
    }

    fn attach(&mut self, content: SlotContent) {
        // Explicit release before attach: the old artifact drops here, not
        // at the end of the statement.
        self.content = None;
        self.content = Some(content);
        self.mounts += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
    }

    /// Total number of mounts so far (each one replaced the previous content).
    pub fn mounts(&self) -> u64 {
        self.mounts
    }

    pub fn content(&self) -> Option<&SlotContent> {
        self.content.as_ref()
    }

    /// Point the camera at the mounted content. No-op while empty.
    pub fn frame_camera(&self, camera: &mut Camera2D) {
        let bounds = match &self.content {
            Some(SlotContent::Typeset(state)) => state.world_bounds,
            Some(SlotContent::ErrorIndicator(mesh)) => mesh.bounds(),
            None => return,
        };
        camera.frame_bounds(bounds, FRAME_PADDING_PT, FRAME_FILL_RATIO);
    }

    /// The draw item for the mounted content, in camera world space.
    pub fn draw_item(&self) -> Option<DrawItem2D> {
        match &self.content {
            Some(SlotContent::Typeset(state)) => Some(DrawItem2D {
                mesh: state.mesh.clone(),
                fill: Rgba::WHITE,
                // Page space is y-down; the camera world is y-up.
                world_from_local: Affine2::scale(1.0, -1.0),
                z: 0,
            }),
            Some(SlotContent::ErrorIndicator(mesh)) => Some(DrawItem2D {
                mesh: mesh.clone(),
                fill: Rgba::rgb(0.85, 0.25, 0.22),
                world_from_local: Affine2::IDENTITY,
                z: 0,
            }),
            None => None,
        }
    }
}

fn flip_y_bounds(bounds: Aabb2) -> Aabb2 {
    if bounds.is_empty() {
        return bounds;
    }
    Aabb2 {
        min: [bounds.min[0], -bounds.max[1]],
        max: [bounds.max[0], -bounds.min[1]],
    }
}

/// A centered X glyph built from two thick quads.
fn error_indicator_mesh() -> Mesh2D {
    let half = ERROR_INDICATOR_SIZE_PT * 0.5;
    let thickness = ERROR_INDICATOR_SIZE_PT * 0.18;

    let mut mesh = Mesh2D::default();
    mesh.append_line_quad([-half, -half], [half, half], thickness);
    mesh.append_line_quad([-half, half], [half, -half], thickness);
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(source: &str) -> TypesetArtifact {
        let mut mesh = Mesh2D::default();
        mesh.append_rect([0.0, 0.0], [10.0, 4.0]);
        TypesetArtifact {
            source: source.to_string(),
            bounds: mesh.bounds(),
            mesh,
        }
    }

    #[test]
    fn slot_starts_empty() {
        let slot = DisplaySlot::default();
        assert!(slot.is_empty());
        assert!(slot.draw_item().is_none());
        assert_eq!(slot.mounts(), 0);
    }

    #[test]
    fn mounting_replaces_previous_content() {
        let mut slot = DisplaySlot::default();
        slot.mount_artifact(artifact("x^2"));
        slot.mount_artifact(artifact("sin(x)"));

        assert_eq!(slot.mounts(), 2);
        match slot.content() {
            Some(SlotContent::Typeset(state)) => assert_eq!(state.source, "sin(x)"),
            _ => panic!("expected typeset content"),
        }
    }

    #[test]
    fn error_indicator_replaces_typeset_content() {
        let mut slot = DisplaySlot::default();
        slot.mount_artifact(artifact("x^2"));
        slot.mount_error_indicator();

        assert_eq!(slot.mounts(), 2);
        assert!(matches!(slot.content(), Some(SlotContent::ErrorIndicator(_))));
        let item = slot.draw_item().unwrap();
        assert!(!item.mesh.is_empty());
    }

    #[test]
    fn mounted_bounds_are_flipped_into_world_space() {
        let mut slot = DisplaySlot::default();
        // Page-space box spanning y in [0, 4] (y down).
        slot.mount_artifact(artifact("x"));

        match slot.content() {
            Some(SlotContent::Typeset(state)) => {
                assert_eq!(state.world_bounds.min[1], -4.0);
                assert_eq!(state.world_bounds.max[1], 0.0);
            }
            _ => panic!("expected typeset content"),
        }
    }

    #[test]
    fn framing_centers_camera_on_content() {
        let mut slot = DisplaySlot::default();
        slot.mount_artifact(artifact("x"));

        let mut camera = Camera2D::default();
        camera.set_viewport_px(800, 600);
        slot.frame_camera(&mut camera);

        // Flipped box spans x [0, 10], y [-4, 0].
        assert_eq!(camera.center_pt, [5.0, -2.0]);
        assert!(camera.zoom > 0.0);
    }
}
