//! # Sort Stage
//!
//! Turns a cull output into the operation stream a rendering processor
//! consumes. The pass-through sorter keeps traversal order; the state
//! sorter orders opaque geometry by render-order hint and transparent
//! geometry back to front.

use log::debug;

use crate::cull::{CullOutput, CulledRenderable};
use crate::render::{GraphicsDetails, GraphicsEnvironmentData, GraphicsRequestData, RenderOp};

/// Strategy producing draw order
pub trait Sorter: Send {
    /// Build the frame's request from the visible renderables
    fn sort(&mut self, culled: &CullOutput, environment: GraphicsEnvironmentData) -> GraphicsRequestData;
}

fn details_of(entry: &CulledRenderable) -> GraphicsDetails {
    GraphicsDetails {
        renderable: entry.renderable.clone(),
        transform: entry.world_transform,
    }
}

/// Sorter that keeps traversal order
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughSorter;

impl Sorter for PassThroughSorter {
    fn sort(&mut self, culled: &CullOutput, environment: GraphicsEnvironmentData) -> GraphicsRequestData {
        let mut request = GraphicsRequestData::new(environment);
        for entry in &culled.entries {
            request.push_bracket(details_of(entry));
        }
        request
    }
}

/// Sorter grouping opaque and transparent geometry
///
/// Opaque renderables come first, stably ordered by render-order hint.
/// Transparent ones follow, farthest from the eye first. With two-pass
/// transparency a [`RenderOp::TransparencyPass`] marker separates them.
#[derive(Debug, Default, Clone)]
pub struct StateSorter {
    two_pass_transparency: bool,
    opaque: Vec<usize>,
    transparent: Vec<(usize, f32)>,
}

impl StateSorter {
    /// Create a state sorter
    pub fn new(two_pass_transparency: bool) -> Self {
        Self {
            two_pass_transparency,
            ..Self::default()
        }
    }
}

impl Sorter for StateSorter {
    fn sort(&mut self, culled: &CullOutput, environment: GraphicsEnvironmentData) -> GraphicsRequestData {
        let eye = environment.eye_position;
        self.opaque.clear();
        self.transparent.clear();
        for (index, entry) in culled.entries.iter().enumerate() {
            if entry.transparent {
                self.transparent.push((index, (entry.world_center - eye).magnitude_squared()));
            } else {
                self.opaque.push(index);
            }
        }
        self.opaque.sort_by_key(|index| culled.entries[*index].render_order);
        self.transparent.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut request = GraphicsRequestData::new(environment);
        for index in &self.opaque {
            request.push_bracket(details_of(&culled.entries[*index]));
        }
        if self.two_pass_transparency && !self.transparent.is_empty() {
            request.push_marker(RenderOp::TransparencyPass);
        }
        for (index, _) in &self.transparent {
            request.push_bracket(details_of(&culled.entries[*index]));
        }
        debug!(
            "Sorted {} opaque and {} transparent renderables",
            self.opaque.len(),
            self.transparent.len()
        );
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::render::headless::BoxRenderable;
    use crate::scene::NodeId;
    use slotmap::SlotMap;
    use std::sync::Arc;

    fn entries(specs: &[(&str, i32, bool, f32)]) -> CullOutput {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        let entries = specs
            .iter()
            .map(|(name, order, transparent, z)| CulledRenderable {
                node: keys.insert(()),
                renderable: Arc::new(BoxRenderable::cube(*name, 1.0)),
                world_transform: Mat4::new_translation(&Vec3::new(0.0, 0.0, *z)),
                world_center: Vec3::new(0.0, 0.0, *z),
                render_order: *order,
                transparent: *transparent,
            })
            .collect();
        CullOutput { entries, visited: specs.len() }
    }

    fn names(request: &GraphicsRequestData) -> Vec<String> {
        request
            .codes
            .iter()
            .zip(&request.details)
            .filter(|(code, _)| **code == RenderOp::StartRender)
            .filter_map(|(_, details)| details.as_ref().map(|d| d.renderable.name().to_string()))
            .collect()
    }

    #[test]
    fn test_pass_through_preserves_order_and_brackets() {
        let culled = entries(&[("b", 5, true, -1.0), ("a", 0, false, -2.0)]);
        let request = PassThroughSorter.sort(&culled, GraphicsEnvironmentData::default());
        assert_eq!(names(&request), vec!["b", "a"]);
        assert_eq!(
            request.codes,
            vec![RenderOp::StartRender, RenderOp::StopRender, RenderOp::StartRender, RenderOp::StopRender]
        );
        assert_eq!(request.codes.len(), request.details.len());
    }

    #[test]
    fn test_state_sorter_orders_opaque_then_transparent_back_to_front() {
        let culled = entries(&[
            ("glass-near", 0, true, -2.0),
            ("late", 10, false, -5.0),
            ("glass-far", 0, true, -9.0),
            ("early", -1, false, -5.0),
            ("default", 0, false, -5.0),
        ]);
        let request = StateSorter::new(false).sort(&culled, GraphicsEnvironmentData::default());
        assert_eq!(names(&request), vec!["early", "default", "late", "glass-far", "glass-near"]);
        assert!(!request.codes.contains(&RenderOp::TransparencyPass));
    }

    #[test]
    fn test_two_pass_inserts_marker_only_when_needed() {
        let mixed = entries(&[("glass", 0, true, -2.0), ("wall", 0, false, -5.0)]);
        let request = StateSorter::new(true).sort(&mixed, GraphicsEnvironmentData::default());
        assert_eq!(
            request.codes,
            vec![
                RenderOp::StartRender,
                RenderOp::StopRender,
                RenderOp::TransparencyPass,
                RenderOp::StartRender,
                RenderOp::StopRender,
            ]
        );
        assert!(request.details[2].is_none());
        assert_eq!(request.bracket_count(), 2);

        let opaque = entries(&[("wall", 0, false, -5.0)]);
        let request = StateSorter::new(true).sort(&opaque, GraphicsEnvironmentData::default());
        assert!(!request.codes.contains(&RenderOp::TransparencyPass));
    }
}
