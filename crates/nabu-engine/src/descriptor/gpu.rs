use crate::error::Result;

use super::cache::{DescriptorCache, DescriptorKey};
use super::sampler::{SamplerCache, SamplerMode};

/// Texture slots per draw: diffuse, lightmap, detail, fog.
pub const TEXTURE_SLOTS: usize = 4;

/// Scene texture bindings: the bind group layout, samplers and the set cache.
///
/// Slots 0 and 2 sample through the draw's [`SamplerMode`]; the lightmap and
/// fog slots always use a linear clamping sampler.
pub struct TextureBindings {
    layout: wgpu::BindGroupLayout,
    samplers: SamplerCache,
    clamp_sampler: wgpu::Sampler,
    cache: DescriptorCache<wgpu::BindGroup>,
}

impl TextureBindings {
    pub fn new(device: &wgpu::Device, pool_size: usize) -> Self {
        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("nabu scene textures layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                sampler_entry(4),
                sampler_entry(5),
            ],
        });

        let clamp_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("nabu lightmap sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });

        Self {
            layout,
            samplers: SamplerCache::new(),
            clamp_sampler,
            cache: DescriptorCache::new(pool_size),
        }
    }

    #[inline]
    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    #[inline]
    pub fn cache(&self) -> &DescriptorCache<wgpu::BindGroup> {
        &self.cache
    }

    /// Returns the bind group for `key`, writing all four bindings on a miss.
    ///
    /// `views` must be the views of `key.textures`, in order.
    pub fn get_texture_descriptor_set(
        &mut self,
        device: &wgpu::Device,
        key: DescriptorKey,
        views: [&wgpu::TextureView; TEXTURE_SLOTS],
    ) -> Result<&wgpu::BindGroup> {
        let layout = &self.layout;
        let samplers = &mut self.samplers;
        let clamp_sampler = &self.clamp_sampler;

        self.cache.get_or_create(key, |key| {
            let sampler = samplers.get(device, key.sampler);
            Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("nabu scene textures"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(views[0]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(views[1]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(views[2]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(views[3]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::Sampler(clamp_sampler),
                    },
                ],
            }))
        })
    }

    /// Sampler for a mode, shared with callers that bind textures outside the cache.
    pub fn sampler(&mut self, device: &wgpu::Device, mode: SamplerMode) -> &wgpu::Sampler {
        self.samplers.get(device, mode)
    }

    /// Drops every cached set; the caller retires them.
    pub fn clear(&mut self) -> Vec<wgpu::BindGroup> {
        self.cache.clear()
    }
}
