//! Frame pipeline: tessellate dirty leaves, aggregate, sync buffers, then
//! issue batched draw calls.

use crate::buffers::{DrawCall, GpuBackend, RootBuffers, TextureHandle, TextureResolver};
use crate::error::Result;
use crate::node::{ShapeId, ShapeNode};
use crate::scene::Scene;
use crate::tess_geometry::{Attribute, StreamKind};
use crate::tessellate::Tessellator;
use glam::Mat4;

impl Scene {
    /// Bring the GPU buffers of the tree under `root` up to date
    pub fn prepare(
        &mut self,
        root: ShapeId,
        backend: &mut dyn GpuBackend,
        textures: &mut dyn TextureResolver,
    ) -> Result<()> {
        if self.node(root)?.parent.is_some() {
            log::warn!("only a root can be prepared");
            return Ok(());
        }
        for buffers in self.released.drain(..) {
            buffers.release(backend);
        }

        if !self.node(root)?.tessellated {
            self.tessellate_dirty(root, textures)?;
            self.aggregate(root)?;
            for id in self.subtree(root)? {
                let node = self.node_mut(id)?;
                if node.is_group() {
                    node.tessellated = true;
                }
            }
        }

        let existing = self.node_mut(root)?.buffers.take();
        let mut buffers = match existing {
            Some(buffers) => buffers,
            None => RootBuffers::create(backend, self.settings.cache_capacity)?,
        };
        let result = self.sync(root, &mut buffers, backend);
        self.node_mut(root)?.buffers = Some(buffers);
        result
    }

    pub(crate) fn tessellate_dirty(
        &mut self,
        root: ShapeId,
        textures: &mut dyn TextureResolver,
    ) -> Result<()> {
        let mut tessellator = std::mem::take(&mut self.tessellator);
        let result = self.tessellate_leaves(root, &mut tessellator, textures);
        self.tessellator = tessellator;
        result
    }

    fn tessellate_leaves(
        &mut self,
        root: ShapeId,
        tessellator: &mut Tessellator,
        textures: &mut dyn TextureResolver,
    ) -> Result<()> {
        for id in self.leaves(root)? {
            let node = self.node(id)?;
            if node.tessellated {
                continue;
            }
            let texture = node.style.texture.and_then(|image| {
                let resolved = textures.resolve(&image);
                if resolved.is_none() {
                    log::warn!("texture {} could not be resolved, drawing untextured", image.id);
                }
                resolved
            });
            let node = self.node_mut(id)?;
            // Unended geometry stays dirty until it is ended
            let ended = node.shape_ended;
            node.tessellate(tessellator, texture);
            node.tessellated = ended;
            if ended {
                self.stats.tessellations += 1;
            }
        }
        Ok(())
    }

    /// Push every modified attribute and index range through the update
    /// caches
    fn sync(
        &mut self,
        root: ShapeId,
        buffers: &mut RootBuffers,
        backend: &mut dyn GpuBackend,
    ) -> Result<()> {
        for stream in StreamKind::ALL {
            let range = self.node(root)?.tess.range(stream);
            let (vertices, indices) = (range.vertex_count, range.index_count);
            if buffers.init_stream(backend, stream, vertices, indices)? {
                self.stats.buffer_inits += 1;
            }
        }

        let leaves = self.leaves(root)?;

        for attribute in Attribute::ALL {
            let stream = attribute.stream();
            let handle = buffers.attribute(attribute);
            let cache = &mut buffers.attribute_caches[attribute.index()];
            for &id in &leaves {
                let node = self.node(id)?;
                let count = node.tess.vertex_count(stream);
                if count == 0 {
                    continue;
                }
                if node.modified.attribute(attribute) {
                    let first = node.tess.range(stream).first_vertex;
                    cache.add(first, count, node.tess.attribute(attribute));
                } else if cache.flush(backend, handle)? {
                    self.stats.cache_flushes += 1;
                }
            }
            if cache.flush(backend, handle)? {
                self.stats.cache_flushes += 1;
            }
        }

        for stream in StreamKind::ALL {
            let handle = buffers.index_buffer(stream);
            let cache = &mut buffers.index_caches[stream.index()];
            for &id in &leaves {
                let node = self.node(id)?;
                let indices = node.tess.indices(stream);
                if indices.is_empty() {
                    continue;
                }
                if node.modified.indices(stream) {
                    let range = node.tess.range(stream);
                    // Local indices become indices into the root buffers
                    cache.add_shifted(
                        range.first_index,
                        indices.len(),
                        indices,
                        range.first_vertex as u32,
                    );
                } else if cache.flush(backend, handle)? {
                    self.stats.cache_flushes += 1;
                }
            }
            if cache.flush(backend, handle)? {
                self.stats.cache_flushes += 1;
            }
        }

        for id in leaves {
            self.node_mut(id)?.modified.clear();
        }
        Ok(())
    }

    /// GPU buffers of a prepared root
    pub fn root_buffers(&self, root: ShapeId) -> Result<Option<&RootBuffers>> {
        Ok(self.node(root)?.buffers.as_ref())
    }

    /// Issue the draw calls of a prepared tree
    pub fn draw(&self, root: ShapeId, backend: &mut dyn GpuBackend) -> Result<()> {
        let node = self.node(root)?;
        let Some(buffers) = node.buffers.as_ref() else {
            log::warn!("tree has not been prepared, nothing to draw");
            return Ok(());
        };
        self.draw_node(root, Mat4::IDENTITY, buffers, backend)
    }

    /// Prepare and draw. A failed prepare skips the draw.
    pub fn render(
        &mut self,
        root: ShapeId,
        backend: &mut dyn GpuBackend,
        textures: &mut dyn TextureResolver,
    ) -> Result<()> {
        self.prepare(root, backend, textures)?;
        self.draw(root, backend)
    }

    fn draw_node(
        &self,
        id: ShapeId,
        parent: Mat4,
        buffers: &RootBuffers,
        backend: &mut dyn GpuBackend,
    ) -> Result<()> {
        let node = self.node(id)?;
        let model = node.matrix.map_or(parent, |m| parent * m);

        if !node.is_group() {
            let texture = node.texture.map(|t| t.handle);
            return draw_ranges(node, texture, model, buffers, backend);
        }

        let mixed_fill =
            node.textures.len() > 1 || (node.textures.len() == 1 && node.untextured_fill);
        if !node.child_has_matrix && !mixed_fill {
            let texture = node.textures.first().copied();
            draw_ranges(node, texture, model, buffers, backend)
        } else {
            for &child in &node.children {
                self.draw_node(child, model, buffers, backend)?;
            }
            Ok(())
        }
    }
}

/// One texture bind and one draw per recorded range, per non-empty stream
fn draw_ranges(
    node: &ShapeNode,
    texture: Option<TextureHandle>,
    model: Mat4,
    buffers: &RootBuffers,
    backend: &mut dyn GpuBackend,
) -> Result<()> {
    for stream in StreamKind::ALL {
        let range = node.tess.range(stream);
        if range.index_data.is_empty() {
            continue;
        }
        backend.bind_texture(if stream == StreamKind::Fill { texture } else { None });
        let vertex_buffers = buffers.vertex_buffers(stream);
        for data in &range.index_data {
            backend.draw_indexed_range(&DrawCall {
                stream,
                index_buffer: buffers.index_buffer(stream),
                vertex_buffers: vertex_buffers.clone(),
                first_index: data.index_offset,
                index_count: data.index_count,
                model,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{NoTextures, ResolvedTexture, TextureMap};
    use crate::color::Color;
    use crate::error::ShapeError;
    use crate::node::ShapeKind;
    use crate::recording::{Call, RecordingBackend};
    use crate::scene::PipelineStats;
    use crate::style::ImageRef;
    use glam::Vec3;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn rect(scene: &mut Scene, x: f32) -> ShapeId {
        init_logger();
        scene.create_primitive(ShapeKind::Rect, &[x, 0.0, 10.0, 10.0])
    }

    fn group_of(scene: &mut Scene, count: usize) -> (ShapeId, Vec<ShapeId>) {
        let root = scene.create_group();
        let leaves: Vec<_> = (0..count).map(|i| rect(scene, 20.0 * i as f32)).collect();
        for &leaf in &leaves {
            scene.add_child(root, leaf).unwrap();
        }
        (root, leaves)
    }

    #[test]
    fn test_rect_without_stroke() {
        let mut scene = Scene::default();
        let shape = rect(&mut scene, 0.0);
        scene.no_stroke(shape).unwrap();
        let mut backend = RecordingBackend::new();
        scene.prepare(shape, &mut backend, &mut NoTextures).unwrap();

        let tess = scene.node(shape).unwrap().tess();
        assert_eq!(tess.vertex_count(StreamKind::Fill), 4);
        assert_eq!(tess.index_count(StreamKind::Fill), 6);
        assert_eq!(tess.vertex_count(StreamKind::Line), 0);
    }

    #[test]
    fn test_second_prepare_is_free() {
        let mut scene = Scene::default();
        let (root, _) = group_of(&mut scene, 3);
        let mut backend = RecordingBackend::new();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();
        assert_eq!(scene.stats().tessellations, 3);
        assert_eq!(scene.stats().aggregations, 1);

        scene.reset_stats();
        backend.clear_calls();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();
        assert_eq!(scene.stats(), PipelineStats::default());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_full_upload_is_one_copy_per_buffer() {
        let mut scene = Scene::default();
        let (root, _) = group_of(&mut scene, 3);
        let mut backend = RecordingBackend::new();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

        let buffers = scene.root_buffers(root).unwrap().unwrap();
        for attribute in [Attribute::FillPosition, Attribute::LineDirection] {
            assert_eq!(backend.copies_to(buffers.attribute(attribute)), 1);
        }
        // Points are empty, nothing to write
        assert_eq!(backend.copies_to(buffers.attribute(Attribute::PointPosition)), 0);
        assert_eq!(
            backend.indices(buffers.index_buffer(StreamKind::Fill))[..12],
            [0, 1, 3, 1, 2, 3, 4, 5, 7, 5, 6, 7]
        );
    }

    #[test]
    fn test_recolor_rewrites_only_colors() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        let mut backend = RecordingBackend::new();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

        let buffers = scene.root_buffers(root).unwrap().unwrap();
        let positions = buffers.attribute(Attribute::FillPosition);
        let colors = buffers.attribute(Attribute::FillColor);
        let before = backend.bytes(positions).unwrap().to_vec();

        scene.reset_stats();
        backend.clear_calls();
        scene.fill(leaves[1], Color::rgb(1.0, 0.0, 0.0)).unwrap();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

        assert_eq!(scene.stats().tessellations, 0);
        assert_eq!(scene.stats().aggregations, 0);
        assert_eq!(backend.copies(), 1);
        assert_eq!(
            backend.calls()[0],
            Call::Copy {
                buffer: colors,
                offset: 4,
                count: 4
            }
        );
        assert_eq!(backend.bytes(positions).unwrap(), before.as_slice());

        let floats = backend.floats(colors);
        assert_eq!(&floats[..4], &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(&floats[16..20], &[1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_lighting_rewrites_only_its_buffer() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        let mut backend = RecordingBackend::new();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();
        let buffers = scene.root_buffers(root).unwrap().unwrap();
        let handles: Vec<_> = Attribute::ALL.iter().map(|&a| buffers.attribute(a)).collect();

        let edits: [(Attribute, fn(&mut Scene, ShapeId)); 4] = [
            (Attribute::FillAmbient, |s, id| s.ambient(id, Color::gray(0.2)).unwrap()),
            (Attribute::FillSpecular, |s, id| s.specular(id, Color::WHITE).unwrap()),
            (Attribute::FillEmissive, |s, id| s.emissive(id, Color::rgb(0.0, 0.3, 0.0)).unwrap()),
            (Attribute::FillShininess, |s, id| s.shininess(id, 32.0).unwrap()),
        ];
        for (attribute, edit) in edits {
            scene.reset_stats();
            backend.clear_calls();
            edit(&mut scene, leaves[1]);
            scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

            assert_eq!(scene.stats().tessellations, 0);
            assert_eq!(backend.copies(), 1);
            assert_eq!(
                backend.calls()[0],
                Call::Copy {
                    buffer: handles[attribute.index()],
                    offset: 4,
                    count: 4
                }
            );
        }

        let shininess = backend.floats(handles[Attribute::FillShininess.index()]);
        assert_eq!(&shininess[..4], &[1.0; 4]);
        assert_eq!(&shininess[4..8], &[32.0; 4]);
    }

    #[test]
    fn test_size_of_group() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        scene.translate(leaves[1], Vec3::new(0.0, 0.0, 5.0)).unwrap();

        let (min, max) = scene.bounds(root, &mut NoTextures).unwrap().unwrap();
        assert_eq!(min, Vec3::ZERO);
        assert_eq!(max, Vec3::new(30.0, 10.0, 5.0));
        assert_eq!(scene.size(leaves[0], &mut NoTextures).unwrap(), Vec3::new(10.0, 10.0, 0.0));

        // Bounds tessellated the leaves, prepare only aggregates
        scene.reset_stats();
        scene
            .prepare(root, &mut RecordingBackend::new(), &mut NoTextures)
            .unwrap();
        assert_eq!(scene.stats().tessellations, 0);
        assert_eq!(scene.stats().aggregations, 1);
    }

    #[test]
    fn test_unsupported_kind_tessellates_once() {
        init_logger();
        let mut scene = Scene::default();
        let shape = scene.create_geometry(ShapeKind::Rect);
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)] {
            scene.vertex(shape, Vec3::new(x, y, 0.0)).unwrap();
        }
        scene.end(shape, true).unwrap();

        let mut backend = RecordingBackend::new();
        scene.prepare(shape, &mut backend, &mut NoTextures).unwrap();
        scene.prepare(shape, &mut backend, &mut NoTextures).unwrap();

        assert_eq!(scene.stats().tessellations, 1);
        let node = scene.node(shape).unwrap();
        assert!(node.is_tessellated());
        for stream in StreamKind::ALL {
            assert_eq!(node.tess().vertex_count(stream), 0);
        }
    }

    #[test]
    fn test_polygon_off_the_xy_plane_fills() {
        init_logger();
        let mut scene = Scene::default();
        let shape = scene.create_geometry(ShapeKind::Polygon);
        scene.no_stroke(shape).unwrap();
        for (x, z) in [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)] {
            scene.vertex(shape, Vec3::new(x, 0.0, z)).unwrap();
        }
        scene.end(shape, true).unwrap();
        scene
            .prepare(shape, &mut RecordingBackend::new(), &mut NoTextures)
            .unwrap();

        let tess = scene.node(shape).unwrap().tess();
        assert_eq!(tess.vertex_count(StreamKind::Fill), 4);
        assert_eq!(tess.index_count(StreamKind::Fill), 6);
        assert_eq!(scene.size(shape, &mut NoTextures).unwrap(), Vec3::new(10.0, 0.0, 10.0));
    }

    #[test]
    fn test_cache_flushes_around_clean_nodes() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 3);
        let mut backend = RecordingBackend::new();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

        backend.clear_calls();
        scene.stroke(leaves[0], Color::gray(0.5)).unwrap();
        scene.stroke(leaves[2], Color::gray(0.5)).unwrap();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

        let buffers = scene.root_buffers(root).unwrap().unwrap();
        assert_eq!(backend.copies_to(buffers.attribute(Attribute::LineColor)), 2);
        assert_eq!(backend.copies(), 2);
    }

    #[test]
    fn test_stroke_weight_updates_directions_only() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        let mut backend = RecordingBackend::new();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

        backend.clear_calls();
        scene.stroke_weight(leaves[0], 4.0).unwrap();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

        let buffers = scene.root_buffers(root).unwrap().unwrap();
        assert_eq!(backend.copies(), 1);
        assert_eq!(backend.copies_to(buffers.attribute(Attribute::LineDirection)), 1);
        assert_eq!(backend.floats(buffers.attribute(Attribute::LineDirection))[3], 2.0);
    }

    #[test]
    fn test_geometry_edit_keeps_allocation() {
        let mut scene = Scene::default();
        let shape = scene.create_geometry(ShapeKind::Triangles);
        for p in [Vec3::ZERO, Vec3::X, Vec3::Y] {
            scene.vertex(shape, p).unwrap();
        }
        scene.end(shape, true).unwrap();
        let mut backend = RecordingBackend::new();
        scene.prepare(shape, &mut backend, &mut NoTextures).unwrap();

        scene.reset_stats();
        backend.clear_calls();
        scene.set_vertex(shape, 2, Vec3::new(0.0, 2.0, 0.0)).unwrap();
        scene.prepare(shape, &mut backend, &mut NoTextures).unwrap();

        assert_eq!(scene.stats().tessellations, 1);
        assert_eq!(scene.stats().aggregations, 1);
        assert_eq!(scene.stats().buffer_inits, 0);
        assert_eq!(backend.inits(), 0);
        let buffers = scene.root_buffers(shape).unwrap().unwrap();
        assert_eq!(backend.floats(buffers.attribute(Attribute::FillPosition))[7], 2.0);
    }

    #[test]
    fn test_untransformed_group_batches() {
        let mut scene = Scene::default();
        let (root, _) = group_of(&mut scene, 2);
        let mut backend = RecordingBackend::new();
        scene.render(root, &mut backend, &mut NoTextures).unwrap();

        // Fill and line: one bind and one merged range each
        assert_eq!(backend.binds(), 2);
        assert_eq!(backend.draws().len(), 2);
        let fill = backend.draws()[0];
        assert_eq!(fill.stream, StreamKind::Fill);
        assert_eq!((fill.first_index, fill.index_count), (0, 12));
    }

    #[test]
    fn test_transformed_child_splits() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        scene.translate(root, Vec3::new(5.0, 0.0, 0.0)).unwrap();
        scene.translate(leaves[1], Vec3::new(0.0, 7.0, 0.0)).unwrap();
        let mut backend = RecordingBackend::new();
        scene.render(root, &mut backend, &mut NoTextures).unwrap();

        assert_eq!(backend.binds(), 4);
        let draws = backend.draws();
        assert_eq!(draws.len(), 4);
        assert_eq!(draws[0].model, Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(
            draws[3].model.transform_point3(Vec3::ZERO),
            Vec3::new(5.0, 7.0, 0.0)
        );
    }

    #[test]
    fn test_mixed_textures_split() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        scene.no_stroke(root).unwrap();
        scene.texture(leaves[0], ImageRef::new(9, 16, 16)).unwrap();

        let mut textures = TextureMap::new();
        let handle = TextureHandle(3);
        textures.insert(
            9,
            ResolvedTexture {
                handle,
                flipped: false,
            },
        );
        let mut backend = RecordingBackend::new();
        scene.render(root, &mut backend, &mut textures).unwrap();

        assert_eq!(
            backend.calls().iter().filter(|c| matches!(c, Call::BindTexture(_))).collect::<Vec<_>>(),
            vec![&Call::BindTexture(Some(handle)), &Call::BindTexture(None)]
        );
        assert_eq!(backend.draws().len(), 2);
    }

    #[test]
    fn test_shared_texture_batches() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        scene.no_stroke(root).unwrap();
        for &leaf in &leaves {
            scene.texture(leaf, ImageRef::new(1, 8, 8)).unwrap();
        }
        let mut textures = TextureMap::new();
        textures.insert(
            1,
            ResolvedTexture {
                handle: TextureHandle(0),
                flipped: true,
            },
        );
        let mut backend = RecordingBackend::new();
        scene.render(root, &mut backend, &mut textures).unwrap();

        assert_eq!(backend.binds(), 1);
        assert_eq!(backend.draws().len(), 1);
        // Flipped texture: v of the first corner goes from 0 to 1
        let texcoords = scene.node(leaves[0]).unwrap().tess().fill.texcoords[0];
        assert_eq!(texcoords, [0.0, 1.0]);
    }

    #[test]
    fn test_allocation_failure_skips_draw() {
        let mut scene = Scene::default();
        let (root, _) = group_of(&mut scene, 2);
        let mut backend = RecordingBackend::new().with_allocation_limit(16);
        let result = scene.render(root, &mut backend, &mut NoTextures);

        assert!(matches!(result, Err(ShapeError::Gpu(_))));
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn test_vertex_range_inside_root() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        scene
            .prepare(root, &mut RecordingBackend::new(), &mut NoTextures)
            .unwrap();
        assert_eq!(scene.vertex_range(leaves[1], StreamKind::Fill).unwrap(), Some(4..=7));
        assert_eq!(scene.vertex_range(root, StreamKind::Fill).unwrap(), Some(0..=7));
        assert_eq!(scene.vertex_range(root, StreamKind::Point).unwrap(), None);
    }

    #[test]
    fn test_detached_child_renders_alone() {
        let mut scene = Scene::default();
        let (root, leaves) = group_of(&mut scene, 2);
        let mut backend = RecordingBackend::new();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();

        scene.remove_child(root, leaves[1]).unwrap();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();
        scene.prepare(leaves[1], &mut backend, &mut NoTextures).unwrap();

        assert_eq!(scene.vertex_range(root, StreamKind::Fill).unwrap(), Some(0..=3));
        assert_eq!(scene.vertex_range(leaves[1], StreamKind::Fill).unwrap(), Some(0..=3));
        assert!(scene.root_buffers(leaves[1]).unwrap().is_some());
    }

    #[test]
    fn test_attached_root_releases_buffers() {
        let mut scene = Scene::default();
        let leaf = rect(&mut scene, 0.0);
        let mut backend = RecordingBackend::new();
        scene.prepare(leaf, &mut backend, &mut NoTextures).unwrap();
        let live = backend.buffer_count();

        let root = scene.create_group();
        scene.add_child(root, leaf).unwrap();
        scene.prepare(root, &mut backend, &mut NoTextures).unwrap();
        assert_eq!(backend.buffer_count(), live);
        assert!(backend.calls().iter().any(|c| matches!(c, Call::Release(_))));
    }
}
