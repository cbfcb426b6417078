use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-frame camera and viewport
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct Globals {
    pub view_proj: [[f32; 4]; 4],
    /// Viewport size in pixels, for screen-space line and point expansion
    pub viewport: [f32; 2],
    pub _padding: [f32; 2],
}

impl Globals {
    pub fn new(view_proj: Mat4, viewport: [f32; 2]) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            viewport,
            _padding: [0.0; 2],
        }
    }
}

/// Composed model matrix of one draw call
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ModelUniform {
    pub model: [[f32; 4]; 4],
}

/// Byte stride between consecutive model uniforms in the dynamic-offset
/// buffer
pub(crate) fn model_stride(min_alignment: u32) -> u64 {
    let size = std::mem::size_of::<ModelUniform>() as u64;
    let align = u64::from(min_alignment.max(1));
    size.div_ceil(align) * align
}

/// Pack model matrices at `stride` byte intervals
pub(crate) fn pack_models(models: &[Mat4], stride: u64) -> Vec<u8> {
    let stride = stride as usize;
    let mut bytes = vec![0u8; models.len() * stride];
    for (i, model) in models.iter().enumerate() {
        let uniform = ModelUniform {
            model: model.to_cols_array_2d(),
        };
        let start = i * stride;
        bytes[start..start + std::mem::size_of::<ModelUniform>()]
            .copy_from_slice(bytemuck::bytes_of(&uniform));
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_stride_respects_alignment() {
        assert_eq!(model_stride(256), 256);
        assert_eq!(model_stride(32), 64);
        assert_eq!(model_stride(0), 64);
    }

    #[test]
    fn test_pack_models_places_each_matrix_at_stride() {
        let models = [Mat4::IDENTITY, Mat4::from_translation(glam::Vec3::new(5.0, 0.0, 0.0))];
        let bytes = pack_models(&models, 256);
        assert_eq!(bytes.len(), 512);

        let second: Vec<f32> = bytes[256..256 + 64]
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(second[12], 5.0);
        assert_eq!(second[0], 1.0);
    }
}
