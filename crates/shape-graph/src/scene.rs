//! Arena of shape nodes and the tree-level authoring API.
//!
//! All calls are expected from the thread that owns the GPU context. Editing
//! the tree while [`Scene::prepare`] or [`Scene::draw`] runs is the caller's
//! problem; nothing here guards against it.

use crate::buffers::{RootBuffers, TextureResolver};
use crate::color::Color;
use crate::config::{ShapeSettings, TextureMode};
use crate::error::{Result, ShapeError};
use crate::input::{InputVertex, VertexCode};
use crate::node::{Change, ShapeFamily, ShapeId, ShapeKind, ShapeNode};
use crate::primitives::PathData;
use crate::style::{ImageRef, Lighting, StrokeCap, StrokeJoin};
use crate::tess_geometry::StreamKind;
use crate::tessellate::Tessellator;
use glam::{Mat4, Vec3};
use std::ops::RangeInclusive;

/// Counters of the expensive pipeline stages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Leaves tessellated
    pub tessellations: usize,
    pub aggregations: usize,
    /// Streams whose buffers were (re)allocated
    pub buffer_inits: usize,
    pub cache_flushes: usize,
}

struct Slot {
    generation: u32,
    node: Option<ShapeNode>,
}

pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<usize>,
    pub(crate) settings: ShapeSettings,
    pub(crate) tessellator: Tessellator,
    pub(crate) stats: PipelineStats,
    /// Buffers of nodes that stopped being roots, released on the next prepare
    pub(crate) released: Vec<RootBuffers>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(ShapeSettings::default())
    }
}

impl Scene {
    pub fn new(settings: ShapeSettings) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            settings,
            tessellator: Tessellator::new(),
            stats: PipelineStats::default(),
            released: Vec::new(),
        }
    }

    pub fn settings(&self) -> &ShapeSettings {
        &self.settings
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = PipelineStats::default();
    }

    // Arena

    fn insert(&mut self, family: ShapeFamily) -> ShapeId {
        let node = ShapeNode::new(family, &self.settings);
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                ShapeId::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                ShapeId::new(self.slots.len() - 1, 0)
            }
        }
    }

    pub fn is_alive(&self, id: ShapeId) -> bool {
        self.node(id).is_ok()
    }

    pub fn node(&self, id: ShapeId) -> Result<&ShapeNode> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(ShapeError::InvalidHandle(id))
    }

    pub(crate) fn node_mut(&mut self, id: ShapeId) -> Result<&mut ShapeNode> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(ShapeError::InvalidHandle(id))
    }

    // Creation

    pub fn create_group(&mut self) -> ShapeId {
        self.insert(ShapeFamily::Group)
    }

    /// A shape authored vertex by vertex, complete after [`Scene::end`]
    pub fn create_geometry(&mut self, kind: ShapeKind) -> ShapeId {
        if matches!(
            kind,
            ShapeKind::Rect | ShapeKind::Ellipse | ShapeKind::Arc | ShapeKind::Box | ShapeKind::Sphere
        ) {
            log::warn!("{kind:?} is generated from parameters, use create_primitive");
        }
        self.insert(ShapeFamily::Geometry(kind))
    }

    pub fn create_primitive(&mut self, kind: ShapeKind, params: &[f32]) -> ShapeId {
        if !kind.is_primitive() {
            log::warn!("{kind:?} is not a primitive kind");
        }
        self.insert(ShapeFamily::Primitive(kind, params.to_vec()))
    }

    /// A path from coordinates and optional vertex codes; without codes every
    /// coordinate is a plain vertex
    pub fn create_path(
        &mut self,
        coords: Vec<[f32; 3]>,
        codes: Vec<VertexCode>,
        close: bool,
    ) -> ShapeId {
        self.insert(ShapeFamily::Path(PathData {
            coords,
            codes,
            closed: close,
        }))
    }

    // Tree

    pub fn parent(&self, id: ShapeId) -> Result<Option<ShapeId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: ShapeId) -> Result<&[ShapeId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn root(&self, id: ShapeId) -> Result<ShapeId> {
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            current = parent;
        }
        Ok(current)
    }

    /// Node ids of the subtree in traversal (pre-)order
    pub fn subtree(&self, id: ShapeId) -> Result<Vec<ShapeId>> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            stack.extend(self.node(current)?.children.iter().rev());
        }
        Ok(order)
    }

    /// Leaves of the subtree in traversal order
    pub fn leaves(&self, id: ShapeId) -> Result<Vec<ShapeId>> {
        let mut leaves = Vec::new();
        for node in self.subtree(id)? {
            if !self.node(node)?.is_group() {
                leaves.push(node);
            }
        }
        Ok(leaves)
    }

    pub fn add_child(&mut self, parent: ShapeId, child: ShapeId) -> Result<()> {
        if !self.node(parent)?.is_group() {
            log::warn!("children can only be added to groups");
            return Ok(());
        }
        if self.node(child)?.parent.is_some() {
            log::warn!("shape is already part of a tree, remove it first");
            return Ok(());
        }
        let mut ancestor = Some(parent);
        while let Some(a) = ancestor {
            if a == child {
                log::warn!("adding a shape below itself would create a cycle");
                return Ok(());
            }
            ancestor = self.node(a)?.parent;
        }

        let child_node = self.node_mut(child)?;
        child_node.parent = Some(parent);
        if let Some(buffers) = child_node.buffers.take() {
            self.released.push(buffers);
        }
        self.node_mut(parent)?.children.push(child);
        self.refresh_matrix_flags(Some(parent))?;
        self.invalidate_root(parent)
    }

    /// Detach `child`; it becomes the root of its own tree
    pub fn remove_child(&mut self, parent: ShapeId, child: ShapeId) -> Result<()> {
        if self.node(child)?.parent != Some(parent) {
            log::warn!("shape is not a child of the given group");
            return Ok(());
        }
        self.node_mut(parent)?.children.retain(|&c| c != child);
        let child_node = self.node_mut(child)?;
        child_node.parent = None;
        child_node.tessellated = false;
        self.refresh_matrix_flags(Some(parent))?;
        self.invalidate_root(parent)
    }

    /// Remove a node and its whole subtree. Handles to it become stale.
    pub fn destroy(&mut self, id: ShapeId) -> Result<()> {
        if let Some(parent) = self.node(id)?.parent {
            self.remove_child(parent, id)?;
        }
        for node_id in self.subtree(id)? {
            let slot = &mut self.slots[node_id.index()];
            if let Some(mut node) = slot.node.take() {
                if let Some(buffers) = node.buffers.take() {
                    self.released.push(buffers);
                }
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node_id.index());
        }
        Ok(())
    }

    /// Mark the tree of `id` for re-tessellation of dirty leaves and
    /// re-aggregation
    pub(crate) fn invalidate_root(&mut self, id: ShapeId) -> Result<()> {
        let root = self.root(id)?;
        self.node_mut(root)?.tessellated = false;
        Ok(())
    }

    fn apply(&mut self, id: ShapeId, change: Change) -> Result<()> {
        match change {
            Change::Geometry => self.invalidate_root(id),
            Change::Attributes | Change::None => Ok(()),
        }
    }

    fn author(&mut self, id: ShapeId, f: impl FnOnce(&mut ShapeNode) -> Change) -> Result<()> {
        let change = f(self.node_mut(id)?);
        self.apply(id, change)
    }

    /// Apply a style edit to a node and, for groups, every descendant
    fn restyle(&mut self, id: ShapeId, mut f: impl FnMut(&mut ShapeNode) -> Change) -> Result<()> {
        let mut geometry = false;
        for node in self.subtree(id)? {
            geometry |= f(self.node_mut(node)?) == Change::Geometry;
        }
        if geometry {
            self.invalidate_root(id)?;
        }
        Ok(())
    }

    // Vertex authoring

    pub fn vertex(&mut self, id: ShapeId, position: Vec3) -> Result<()> {
        self.node_mut(id)?.vertex(position, None)
    }

    pub fn vertex_uv(&mut self, id: ShapeId, position: Vec3, u: f32, v: f32) -> Result<()> {
        self.node_mut(id)?.vertex(position, Some([u, v]))
    }

    pub fn bezier_vertex(&mut self, id: ShapeId, c1: Vec3, c2: Vec3, end: Vec3) -> Result<()> {
        self.node_mut(id)?.bezier_vertex(c1, c2, end)
    }

    pub fn quadratic_vertex(&mut self, id: ShapeId, control: Vec3, end: Vec3) -> Result<()> {
        self.node_mut(id)?.quadratic_vertex(control, end)
    }

    pub fn curve_vertex(&mut self, id: ShapeId, point: Vec3) -> Result<()> {
        self.node_mut(id)?.curve_vertex(point)
    }

    pub fn normal(&mut self, id: ShapeId, normal: Vec3) -> Result<()> {
        self.node_mut(id)?.normal(normal);
        Ok(())
    }

    pub fn begin_contour(&mut self, id: ShapeId) -> Result<()> {
        self.node_mut(id)?.begin_contour();
        Ok(())
    }

    pub fn end_contour(&mut self, id: ShapeId) -> Result<()> {
        self.node_mut(id)?.end_contour();
        Ok(())
    }

    /// Freeze the authored vertices
    pub fn end(&mut self, id: ShapeId, close: bool) -> Result<()> {
        self.author(id, |node| node.end(close))
    }

    pub fn set_params(&mut self, id: ShapeId, params: &[f32]) -> Result<()> {
        self.author(id, |node| node.set_params(params.to_vec()))
    }

    pub fn set_path(
        &mut self,
        id: ShapeId,
        coords: Vec<[f32; 3]>,
        codes: Vec<VertexCode>,
        close: bool,
    ) -> Result<()> {
        self.author(id, |node| {
            node.set_path(PathData {
                coords,
                codes,
                closed: close,
            })
        })
    }

    // Style

    pub fn fill(&mut self, id: ShapeId, color: Color) -> Result<()> {
        self.restyle(id, |node| node.set_fill(Some(color)))
    }

    pub fn no_fill(&mut self, id: ShapeId) -> Result<()> {
        self.restyle(id, |node| node.set_fill(None))
    }

    pub fn stroke(&mut self, id: ShapeId, color: Color) -> Result<()> {
        self.restyle(id, |node| node.set_stroke(Some(color)))
    }

    pub fn no_stroke(&mut self, id: ShapeId) -> Result<()> {
        self.restyle(id, |node| node.set_stroke(None))
    }

    pub fn stroke_weight(&mut self, id: ShapeId, weight: f32) -> Result<()> {
        self.restyle(id, |node| node.set_stroke_weight(weight))
    }

    pub fn stroke_cap(&mut self, id: ShapeId, cap: StrokeCap) -> Result<()> {
        self.restyle(id, |node| node.set_stroke_cap(cap))
    }

    pub fn stroke_join(&mut self, id: ShapeId, join: StrokeJoin) -> Result<()> {
        self.restyle(id, |node| node.set_stroke_join(join))
    }

    pub fn tint(&mut self, id: ShapeId, color: Color) -> Result<()> {
        self.restyle(id, |node| node.set_tint(Some(color)))
    }

    pub fn no_tint(&mut self, id: ShapeId) -> Result<()> {
        self.restyle(id, |node| node.set_tint(None))
    }

    pub fn texture(&mut self, id: ShapeId, image: ImageRef) -> Result<()> {
        self.restyle(id, |node| node.set_texture(Some(image)))
    }

    pub fn no_texture(&mut self, id: ShapeId) -> Result<()> {
        self.restyle(id, |node| node.set_texture(None))
    }

    pub fn solid(&mut self, id: ShapeId, solid: bool) -> Result<()> {
        self.restyle(id, |node| node.set_solid(solid))
    }

    pub fn ambient(&mut self, id: ShapeId, color: Color) -> Result<()> {
        self.restyle(id, |node| node.set_ambient(color))
    }

    pub fn specular(&mut self, id: ShapeId, color: Color) -> Result<()> {
        self.restyle(id, |node| node.set_specular(color))
    }

    pub fn emissive(&mut self, id: ShapeId, color: Color) -> Result<()> {
        self.restyle(id, |node| node.set_emissive(color))
    }

    pub fn shininess(&mut self, id: ShapeId, shininess: f32) -> Result<()> {
        self.restyle(id, |node| node.set_shininess(shininess))
    }

    pub fn texture_mode(&mut self, id: ShapeId, mode: TextureMode) -> Result<()> {
        self.node_mut(id)?.set_texture_mode(mode);
        Ok(())
    }

    pub fn bezier_detail(&mut self, id: ShapeId, detail: u32) -> Result<()> {
        self.node_mut(id)?.set_bezier_detail(detail);
        Ok(())
    }

    pub fn curve_detail(&mut self, id: ShapeId, detail: u32) -> Result<()> {
        self.node_mut(id)?.set_curve_detail(detail);
        Ok(())
    }

    pub fn curve_tightness(&mut self, id: ShapeId, tightness: f32) -> Result<()> {
        self.node_mut(id)?.set_curve_tightness(tightness);
        Ok(())
    }

    // Per-vertex access

    pub fn vertex_count(&self, id: ShapeId) -> Result<usize> {
        Ok(self.node(id)?.vertex_count())
    }

    pub fn get_vertex(&self, id: ShapeId, index: usize) -> Result<Option<Vec3>> {
        Ok(self.node(id)?.get_vertex(index))
    }

    pub fn get_normal(&self, id: ShapeId, index: usize) -> Result<Option<Vec3>> {
        Ok(self.node(id)?.get_normal(index))
    }

    pub fn get_texture_uv(&self, id: ShapeId, index: usize) -> Result<Option<[f32; 2]>> {
        Ok(self.node(id)?.get_texture_uv(index))
    }

    pub fn get_fill(&self, id: ShapeId, index: usize) -> Result<Option<Color>> {
        Ok(self.node(id)?.get_fill(index))
    }

    pub fn get_stroke(&self, id: ShapeId, index: usize) -> Result<Option<Color>> {
        Ok(self.node(id)?.get_stroke(index))
    }

    pub fn get_lighting(&self, id: ShapeId, index: usize) -> Result<Option<Lighting>> {
        Ok(self.node(id)?.get_lighting(index))
    }

    pub fn get_stroke_weight(&self, id: ShapeId, index: usize) -> Result<Option<f32>> {
        Ok(self.node(id)?.get_stroke_weight(index))
    }

    fn edit_vertex(
        &mut self,
        id: ShapeId,
        index: usize,
        edit: impl FnOnce(&mut InputVertex),
    ) -> Result<()> {
        self.author(id, |node| node.edit_vertex(index, edit))
    }

    pub fn set_vertex(&mut self, id: ShapeId, index: usize, position: Vec3) -> Result<()> {
        self.edit_vertex(id, index, |v| v.position = position.to_array())
    }

    pub fn set_normal(&mut self, id: ShapeId, index: usize, normal: Vec3) -> Result<()> {
        self.edit_vertex(id, index, |v| v.normal = normal.to_array())
    }

    pub fn set_texture_uv(&mut self, id: ShapeId, index: usize, u: f32, v: f32) -> Result<()> {
        self.edit_vertex(id, index, |vertex| vertex.uv = [u, v])
    }

    pub fn set_fill_at(&mut self, id: ShapeId, index: usize, color: Color) -> Result<()> {
        self.edit_vertex(id, index, |v| v.fill = color)
    }

    pub fn set_stroke_at(&mut self, id: ShapeId, index: usize, color: Color) -> Result<()> {
        self.edit_vertex(id, index, |v| v.stroke = color)
    }

    pub fn set_stroke_weight_at(&mut self, id: ShapeId, index: usize, weight: f32) -> Result<()> {
        self.edit_vertex(id, index, |v| v.stroke_weight = weight)
    }

    // Transforms

    pub fn translate(&mut self, id: ShapeId, offset: Vec3) -> Result<()> {
        self.apply_matrix(id, Mat4::from_translation(offset))
    }

    /// Rotate around the z axis
    pub fn rotate(&mut self, id: ShapeId, angle: f32) -> Result<()> {
        self.apply_matrix(id, Mat4::from_rotation_z(angle))
    }

    pub fn rotate_axis(&mut self, id: ShapeId, angle: f32, axis: Vec3) -> Result<()> {
        let Some(axis) = axis.try_normalize() else {
            log::warn!("rotation axis has zero length");
            return Ok(());
        };
        self.apply_matrix(id, Mat4::from_axis_angle(axis, angle))
    }

    pub fn scale(&mut self, id: ShapeId, factor: Vec3) -> Result<()> {
        self.apply_matrix(id, Mat4::from_scale(factor))
    }

    /// Post-multiply the node's local matrix
    pub fn apply_matrix(&mut self, id: ShapeId, matrix: Mat4) -> Result<()> {
        let node = self.node_mut(id)?;
        if !node.shape_ended {
            log::warn!("transforms can only be applied to ended shapes");
            return Ok(());
        }
        node.matrix = Some(node.matrix.unwrap_or(Mat4::IDENTITY) * matrix);
        let parent = node.parent;
        self.refresh_matrix_flags(parent)
    }

    pub fn reset_matrix(&mut self, id: ShapeId) -> Result<()> {
        let node = self.node_mut(id)?;
        node.matrix = None;
        let parent = node.parent;
        self.refresh_matrix_flags(parent)
    }

    /// Recompute `child_has_matrix` from `start` up to the root
    fn refresh_matrix_flags(&mut self, start: Option<ShapeId>) -> Result<()> {
        let mut current = start;
        while let Some(id) = current {
            let mut flag = false;
            for &child in &self.node(id)?.children {
                let child = self.node(child)?;
                flag |= child.matrix.is_some() || child.child_has_matrix;
            }
            let node = self.node_mut(id)?;
            node.child_has_matrix = flag;
            current = node.parent;
        }
        Ok(())
    }

    // Bounds

    /// Axis-aligned bounds of the tessellated geometry under `id`, in the
    /// coordinates of `id` itself. Dirty leaves are tessellated first.
    pub fn bounds(
        &mut self,
        id: ShapeId,
        textures: &mut dyn TextureResolver,
    ) -> Result<Option<(Vec3, Vec3)>> {
        self.tessellate_dirty(id, textures)?;
        let mut bounds = None;
        self.extend_bounds(id, Mat4::IDENTITY, &mut bounds)?;
        Ok(bounds)
    }

    /// Width, height and depth of [`Scene::bounds`], zero when empty
    pub fn size(&mut self, id: ShapeId, textures: &mut dyn TextureResolver) -> Result<Vec3> {
        Ok(self
            .bounds(id, textures)?
            .map_or(Vec3::ZERO, |(min, max)| max - min))
    }

    fn extend_bounds(
        &self,
        id: ShapeId,
        model: Mat4,
        bounds: &mut Option<(Vec3, Vec3)>,
    ) -> Result<()> {
        let node = self.node(id)?;
        if node.is_group() {
            for &child in &node.children {
                let child_model = self.node(child)?.matrix.map_or(model, |m| model * m);
                self.extend_bounds(child, child_model, bounds)?;
            }
            return Ok(());
        }

        let tess = &node.tess;
        let positions = tess
            .fill
            .positions
            .iter()
            .chain(&tess.line.positions)
            .chain(&tess.point.positions);
        for p in positions {
            let p = model.transform_point3(Vec3::from_array(*p));
            *bounds = Some(match *bounds {
                Some((min, max)) => (min.min(p), max.max(p)),
                None => (p, p),
            });
        }
        Ok(())
    }

    /// Inclusive vertex range a node occupies in its root's buffers for one
    /// stream. Only a root spans the whole buffer.
    pub fn vertex_range(
        &self,
        id: ShapeId,
        stream: StreamKind,
    ) -> Result<Option<RangeInclusive<usize>>> {
        Ok(self.node(id)?.tess.range(stream).vertices())
    }
}
