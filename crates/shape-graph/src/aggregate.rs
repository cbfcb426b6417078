//! Placement of every node's streams inside its root's combined buffers.
//!
//! Two passes over the tree: totals are summed bottom-up, then leaves are
//! handed consecutive ranges in traversal order and register their draw
//! ranges with every ancestor.

use crate::error::Result;
use crate::node::ShapeId;
use crate::scene::Scene;
use crate::tess_geometry::{IndexData, StreamKind};
use std::collections::BTreeSet;

/// Running vertex and index offsets per stream
type Cursor = [(usize, usize); 3];

impl Scene {
    /// Recompute ranges and draw ranges for the tree under `root`
    pub(crate) fn aggregate(&mut self, root: ShapeId) -> Result<()> {
        let order = self.subtree(root)?;

        // Reverse pre-order visits every child before its parent
        for &id in order.iter().rev() {
            self.count(id)?;
        }

        let mut cursor: Cursor = [(0, 0); 3];
        let mut ancestors = Vec::new();
        self.assign(root, &mut cursor, &mut ancestors)?;

        for &id in &order {
            let node = self.node_mut(id)?;
            if !node.is_group() {
                // Every leaf may have moved, all of it goes up again
                node.modified.mark_all();
            }
        }

        self.stats.aggregations += 1;
        let totals = &self.node(root)?.tess.ranges;
        log::debug!(
            "aggregated tree: fill {}/{}, line {}/{}, point {}/{} vertices/indices",
            totals[0].vertex_count,
            totals[0].index_count,
            totals[1].vertex_count,
            totals[1].index_count,
            totals[2].vertex_count,
            totals[2].index_count
        );
        Ok(())
    }

    /// Count pass for one node whose children are already counted
    fn count(&mut self, id: ShapeId) -> Result<()> {
        let node = self.node(id)?;

        let mut counts = [(0usize, 0usize); 3];
        let mut textures = BTreeSet::new();
        let mut untextured_fill = false;

        if node.is_group() {
            for &child in &node.children {
                let child = self.node(child)?;
                for stream in StreamKind::ALL {
                    let range = child.tess.range(stream);
                    counts[stream.index()].0 += range.vertex_count;
                    counts[stream.index()].1 += range.index_count;
                }
                textures.extend(child.textures.iter().copied());
                untextured_fill |= child.untextured_fill;
            }
        } else {
            for stream in StreamKind::ALL {
                counts[stream.index()] = (node.tess.vertex_count(stream), node.tess.index_count(stream));
            }
            if node.tess.fill.vertex_count() > 0 {
                match node.texture {
                    Some(texture) => {
                        textures.insert(texture.handle);
                    }
                    None => untextured_fill = true,
                }
            }
        }

        let node = self.node_mut(id)?;
        for stream in StreamKind::ALL {
            let range = node.tess.range_mut(stream);
            range.reset();
            (range.vertex_count, range.index_count) = counts[stream.index()];
        }
        node.textures = textures;
        node.untextured_fill = untextured_fill;
        Ok(())
    }

    /// Offset pass in traversal order
    fn assign(
        &mut self,
        id: ShapeId,
        cursor: &mut Cursor,
        ancestors: &mut Vec<ShapeId>,
    ) -> Result<()> {
        let start = *cursor;

        if self.node(id)?.is_group() {
            ancestors.push(id);
            let children = self.node(id)?.children.clone();
            for child in children {
                self.assign(child, cursor, ancestors)?;
            }
            ancestors.pop();
        } else {
            for stream in StreamKind::ALL {
                let (vertices, indices) = cursor[stream.index()];
                let range = self.node(id)?.tess.range(stream);
                let (vertex_count, index_count) = (range.vertex_count, range.index_count);
                cursor[stream.index()] = (vertices + vertex_count, indices + index_count);

                if vertex_count == 0 || index_count == 0 {
                    continue;
                }
                let data = IndexData {
                    first_vertex: vertices as u32,
                    vertex_count: vertex_count as u32,
                    index_offset: indices as u32,
                    index_count: index_count as u32,
                };
                self.node_mut(id)?.tess.range_mut(stream).index_data.push(data);
                for &ancestor in ancestors.iter() {
                    let list = &mut self.node_mut(ancestor)?.tess.range_mut(stream).index_data;
                    let merged = list.last_mut().is_some_and(|last| last.try_merge(&data));
                    if !merged {
                        list.push(data);
                    }
                }
            }
        }

        // A node's range is the union of everything assigned below it
        let node = self.node_mut(id)?;
        for stream in StreamKind::ALL {
            let (first_vertex, first_index) = start[stream.index()];
            let (end_vertex, end_index) = cursor[stream.index()];
            let range = node.tess.range_mut(stream);
            range.first_vertex = first_vertex;
            range.first_index = first_index;
            range.last_vertex = end_vertex.saturating_sub(1).max(first_vertex);
            range.last_index = end_index.saturating_sub(1).max(first_index);
        }
        Ok(())
    }
}
