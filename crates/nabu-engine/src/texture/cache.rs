//! Texture cache: one GPU resource per `(cache id, masked)` pair.
//!
//! The cache itself never touches wgpu. Allocation and uploads go through a
//! [`TextureAllocator`] passed into each call, so bookkeeping (identity, epochs,
//! placeholders, layouts) is exercised by the tests with a fake allocator.

use std::collections::HashMap;

use super::format::{FormatUploader, PixelFormat, UploaderTable};
use super::layout::ImageLayout;
use super::source::TextureSource;
use crate::error::Result;

/// Handle identifying one cached resource. Stable until the next [`TextureCache::clear`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    /// The shared 1×1 white texture.
    pub const NULL: TextureId = TextureId(0);

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Shape of a GPU texture to allocate.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    /// Padding levels in front of the real mip chain.
    pub dummy_mips: u32,
    pub format: wgpu::TextureFormat,
}

/// One source mip region and the destination level it lands in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MipRegion {
    pub src_level: usize,
    pub dst_level: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Everything an allocator needs to upload a set of regions.
pub struct UploadJob<'a> {
    pub uploader: &'a FormatUploader,
    pub source: &'a TextureSource,
    pub masked: bool,
    pub regions: &'a [MipRegion],
    /// Layout the image was in before this upload.
    pub previous_layout: ImageLayout,
}

/// Creates and fills GPU textures on behalf of the cache.
pub trait TextureAllocator {
    type Texture;

    fn max_dimension(&self) -> u32;

    fn allocate(&mut self, desc: &TextureDesc) -> Result<Self::Texture>;

    fn upload(&mut self, texture: &Self::Texture, desc: &TextureDesc, job: &UploadJob<'_>) -> Result<()>;
}

/// A texture owned by the cache.
#[derive(Debug)]
pub struct CachedTexture<T> {
    id: TextureId,
    resource: T,
    desc: TextureDesc,
    format: PixelFormat,
    realtime_change_count: u32,
    layout: ImageLayout,
    uploads: u32,
    placeholder: bool,
}

impl<T> CachedTexture<T> {
    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    pub fn resource(&self) -> &T {
        &self.resource
    }

    #[inline]
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn dummy_mips(&self) -> u32 {
        self.desc.dummy_mips
    }

    #[inline]
    pub fn realtime_change_count(&self) -> u32 {
        self.realtime_change_count
    }

    #[inline]
    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    /// Uploads recorded into this resource, initial one included.
    #[inline]
    pub fn upload_count(&self) -> u32 {
        self.uploads
    }

    #[inline]
    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

type CacheKey = (u64, bool);

pub struct TextureCache<T> {
    entries: HashMap<CacheKey, CachedTexture<T>>,
    ids: HashMap<TextureId, CacheKey>,
    null: Option<CachedTexture<T>>,
    uploaders: UploaderTable,
    next_id: u64,
    uploads: u64,

    warned_unsupported: bool,
    warned_oversize: bool,
}

impl<T> TextureCache<T> {
    pub fn new(uploaders: UploaderTable) -> Self {
        Self {
            entries: HashMap::new(),
            ids: HashMap::new(),
            null: None,
            uploaders,
            next_id: 1,
            uploads: 0,
            warned_unsupported: false,
            warned_oversize: false,
        }
    }

    #[inline]
    pub fn uploaders(&self) -> &UploaderTable {
        &self.uploaders
    }

    /// Cached textures, the null texture excluded.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uploads recorded since creation.
    #[inline]
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }

    /// Looks up a cached texture without creating it.
    pub fn get(&self, cache_id: u64, masked: bool) -> Option<&CachedTexture<T>> {
        self.entries.get(&(cache_id, masked))
    }

    /// Resolves a [`TextureId`] handed out earlier.
    pub fn by_id(&self, id: TextureId) -> Option<&CachedTexture<T>> {
        if id.is_null() {
            return self.null.as_ref();
        }
        self.ids.get(&id).and_then(|key| self.entries.get(key))
    }

    /// Returns the texture for `source`, creating or re-uploading it as needed.
    ///
    /// `None` and id 0 resolve to the null texture.
    pub fn get_texture<A>(
        &mut self,
        source: Option<&mut TextureSource>,
        masked: bool,
        alloc: &mut A,
    ) -> Result<&CachedTexture<T>>
    where
        A: TextureAllocator<Texture = T>,
    {
        let source = match source {
            Some(s) if s.cache_id != 0 => s,
            _ => return self.null_texture(alloc),
        };
        let key = (source.cache_id, masked);

        if let Some(entry) = self.entries.get_mut(&key) {
            let stale = source.realtime_changed
                && entry.realtime_change_count != source.realtime_change_count
                && !entry.placeholder;
            if stale {
                if let Some(uploader) = self.uploaders.get(source.format) {
                    let mut regions = full_chain(source, entry.desc.dummy_mips);
                    regions.truncate((entry.desc.mip_levels - entry.desc.dummy_mips) as usize);
                    upload_into(entry, uploader, source, masked, &regions, alloc)?;
                    entry.realtime_change_count = source.realtime_change_count;
                    self.uploads += 1;
                    log::trace!("re-uploaded realtime texture {:#x}", source.cache_id);
                }
            }
        } else {
            let entry = self.create(source, masked, alloc)?;
            self.ids.insert(entry.id, key);
            self.entries.insert(key, entry);
        }

        // The flag is shared by both variants; the other one may still be behind.
        if source.realtime_changed && self.variants_current(source) {
            source.mark_uploaded();
        }

        Ok(&self.entries[&key])
    }

    /// Whether every cached variant of `source` holds its current stamp.
    fn variants_current(&self, source: &TextureSource) -> bool {
        [false, true].into_iter().all(|masked| {
            self.entries
                .get(&(source.cache_id, masked))
                .is_none_or(|e| e.placeholder || e.realtime_change_count == source.realtime_change_count)
        })
    }

    /// The shared 1×1 white texture, created on first use.
    pub fn null_texture<A>(&mut self, alloc: &mut A) -> Result<&CachedTexture<T>>
    where
        A: TextureAllocator<Texture = T>,
    {
        let entry = match self.null.take() {
            Some(entry) => entry,
            None => {
                let white = TextureSource::solid_white(0);
                self.create_white(TextureId::NULL, &white, "null texture", alloc)?
            }
        };
        Ok(self.null.insert(entry))
    }

    /// Re-uploads a sub-rectangle of mip 0 of the unmasked variant.
    ///
    /// Returns `false` without doing anything when the texture is not cached yet,
    /// the region is out of bounds, or the format cannot upload regions.
    pub fn update_rect<A>(
        &mut self,
        source: &TextureSource,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        alloc: &mut A,
    ) -> Result<bool>
    where
        A: TextureAllocator<Texture = T>,
    {
        let Some(entry) = self.entries.get_mut(&(source.cache_id, false)) else {
            return Ok(false);
        };
        if entry.placeholder || width == 0 || height == 0 {
            return Ok(false);
        }
        let in_bounds = x.checked_add(width).is_some_and(|r| r <= source.width())
            && y.checked_add(height).is_some_and(|b| b <= source.height());
        if !in_bounds {
            return Ok(false);
        }
        let Some(uploader) = self.uploaders.get(source.format).filter(|u| u.supports_rect) else {
            return Ok(false);
        };

        let region = MipRegion {
            src_level: 0,
            dst_level: entry.desc.dummy_mips,
            x,
            y,
            width,
            height,
        };
        upload_into(entry, uploader, source, false, &[region], alloc)?;
        self.uploads += 1;
        Ok(true)
    }

    /// Drops every cached texture (null texture included) and hands the
    /// resources back so the caller can retire them after the GPU is done.
    pub fn clear(&mut self) -> Vec<T> {
        self.ids.clear();
        let mut released: Vec<T> = self.entries.drain().map(|(_, e)| e.resource).collect();
        if let Some(null) = self.null.take() {
            released.push(null.resource);
        }
        log::debug!("texture cache cleared, {} resources released", released.len());
        released
    }

    // ── creation ──────────────────────────────────────────────────────────

    fn allocate_id(&mut self) -> TextureId {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        id
    }

    fn create<A>(&mut self, source: &TextureSource, masked: bool, alloc: &mut A) -> Result<CachedTexture<T>>
    where
        A: TextureAllocator<Texture = T>,
    {
        let id = self.allocate_id();

        let Some(uploader) = self.uploaders.get(source.format) else {
            if !self.warned_unsupported {
                log::warn!(
                    "texture format {:?} is not supported by this device; using placeholder",
                    source.format
                );
                self.warned_unsupported = true;
            }
            return self.create_placeholder(id, source, alloc);
        };

        if let Err(e) = source.validate() {
            log::warn!("{e}; using placeholder");
            return self.create_placeholder(id, source, alloc);
        }

        let limit = alloc.max_dimension();
        if source.width() > limit || source.height() > limit {
            if !self.warned_oversize {
                log::warn!(
                    "texture {:#x} is {}x{}, device limit {limit}; using placeholder",
                    source.cache_id,
                    source.width(),
                    source.height()
                );
                self.warned_oversize = true;
            }
            return self.create_placeholder(id, source, alloc);
        }

        let dummy_mips = dummy_mip_count(uploader, source.width(), source.height());
        let width = source.width() << dummy_mips;
        let height = source.height() << dummy_mips;
        let max_levels = u32::BITS - width.max(height).leading_zeros();
        let real_levels = (source.mips.len() as u32).min(max_levels - dummy_mips);

        let desc = TextureDesc {
            label: format!("texture {:#x}{}", source.cache_id, if masked { " masked" } else { "" }),
            width,
            height,
            mip_levels: real_levels + dummy_mips,
            dummy_mips,
            format: uploader.gpu_format,
        };

        let resource = alloc.allocate(&desc)?;
        let mut entry = CachedTexture {
            id,
            resource,
            desc,
            format: source.format,
            realtime_change_count: source.realtime_change_count,
            layout: ImageLayout::Undefined,
            uploads: 0,
            placeholder: false,
        };

        let mut regions = full_chain(source, dummy_mips);
        regions.truncate(real_levels as usize);
        upload_into(&mut entry, uploader, source, masked, &regions, alloc)?;
        self.uploads += 1;
        Ok(entry)
    }

    fn create_placeholder<A>(&mut self, id: TextureId, source: &TextureSource, alloc: &mut A) -> Result<CachedTexture<T>>
    where
        A: TextureAllocator<Texture = T>,
    {
        let white = TextureSource::solid_white(source.cache_id);
        let label = format!("placeholder {:#x}", source.cache_id);
        let mut entry = self.create_white(id, &white, &label, alloc)?;
        entry.placeholder = true;
        entry.realtime_change_count = source.realtime_change_count;
        Ok(entry)
    }

    fn create_white<A>(&mut self, id: TextureId, white: &TextureSource, label: &str, alloc: &mut A) -> Result<CachedTexture<T>>
    where
        A: TextureAllocator<Texture = T>,
    {
        let uploader = self.uploaders.fallback();
        let desc = TextureDesc {
            label: label.to_owned(),
            width: 1,
            height: 1,
            mip_levels: 1,
            dummy_mips: 0,
            format: uploader.gpu_format,
        };
        let resource = alloc.allocate(&desc)?;
        let mut entry = CachedTexture {
            id,
            resource,
            desc,
            format: PixelFormat::Rgba8,
            realtime_change_count: 0,
            layout: ImageLayout::Undefined,
            uploads: 0,
            placeholder: false,
        };
        upload_into(&mut entry, uploader, white, false, &full_chain(white, 0), alloc)?;
        self.uploads += 1;
        Ok(entry)
    }
}

/// Regions covering every source mip, shifted past the dummy levels.
fn full_chain(source: &TextureSource, dummy_mips: u32) -> Vec<MipRegion> {
    source
        .mips
        .iter()
        .enumerate()
        .map(|(level, mip)| MipRegion {
            src_level: level,
            dst_level: level as u32 + dummy_mips,
            x: 0,
            y: 0,
            width: mip.width,
            height: mip.height,
        })
        .collect()
}

/// Smallest `d` so that `width << d` and `height << d` both reach the block size.
fn dummy_mip_count(uploader: &FormatUploader, width: u32, height: u32) -> u32 {
    let block = uploader.dst_block;
    let mut d = 0;
    while (width << d) < block.width || (height << d) < block.height {
        d += 1;
    }
    d
}

fn upload_into<T, A>(
    entry: &mut CachedTexture<T>,
    uploader: &FormatUploader,
    source: &TextureSource,
    masked: bool,
    regions: &[MipRegion],
    alloc: &mut A,
) -> Result<()>
where
    A: TextureAllocator<Texture = T>,
{
    let previous_layout = entry.layout.begin_transfer();
    let job = UploadJob {
        uploader,
        source,
        masked,
        regions,
        previous_layout,
    };
    let result = alloc.upload(&entry.resource, &entry.desc, &job);
    // The transfer is closed either way; a failed upload leaves stale texels.
    entry.layout.end_transfer();
    result?;
    entry.uploads += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::texture::source::MipSource;

    #[derive(Debug, PartialEq)]
    struct FakeTexture(usize);

    #[derive(Default)]
    struct FakeAllocator {
        max_dimension: u32,
        allocated: Vec<TextureDesc>,
        uploads: Vec<(usize, ImageLayout, Vec<MipRegion>)>,
    }

    impl FakeAllocator {
        fn new() -> Self {
            Self {
                max_dimension: 4096,
                ..Default::default()
            }
        }
    }

    impl TextureAllocator for FakeAllocator {
        type Texture = FakeTexture;

        fn max_dimension(&self) -> u32 {
            self.max_dimension
        }

        fn allocate(&mut self, desc: &TextureDesc) -> Result<FakeTexture> {
            self.allocated.push(desc.clone());
            Ok(FakeTexture(self.allocated.len() - 1))
        }

        fn upload(&mut self, texture: &FakeTexture, _desc: &TextureDesc, job: &UploadJob<'_>) -> Result<()> {
            self.uploads.push((texture.0, job.previous_layout, job.regions.to_vec()));
            Ok(())
        }
    }

    fn p8(id: u64, size: u32) -> TextureSource {
        let mut mips = Vec::new();
        let mut s = size;
        loop {
            mips.push(MipSource::new(s, s, vec![1; (s * s) as usize]));
            if s == 1 {
                break;
            }
            s /= 2;
        }
        TextureSource::new(id, PixelFormat::P8, mips).with_palette(vec![[9, 9, 9, 255]; 256])
    }

    fn cache(bc: bool) -> TextureCache<FakeTexture> {
        TextureCache::new(UploaderTable::new(bc))
    }

    #[test]
    fn repeated_lookups_return_the_same_resource() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();
        let mut src = p8(42, 8);

        let first = c.get_texture(Some(&mut src), false, &mut a).unwrap().id();
        let again = c.get_texture(Some(&mut src), false, &mut a).unwrap().id();
        assert_eq!(first, again);
        assert_eq!(a.allocated.len(), 1);

        let masked = c.get_texture(Some(&mut src), true, &mut a).unwrap().id();
        assert_ne!(first, masked);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn first_upload_covers_whole_chain_from_undefined() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();
        let mut src = p8(1, 4);

        let t = c.get_texture(Some(&mut src), false, &mut a).unwrap();
        assert_eq!(t.layout(), ImageLayout::ShaderReadOnly);
        assert_eq!(t.desc().mip_levels, 3);

        let (_, from, regions) = &a.uploads[0];
        assert_eq!(*from, ImageLayout::Undefined);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[2].dst_level, 2);
    }

    #[test]
    fn one_stamp_change_means_one_reupload() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();
        let mut src = p8(5, 4).realtime();

        c.get_texture(Some(&mut src), false, &mut a).unwrap();
        src.mark_changed();
        let t = c.get_texture(Some(&mut src), false, &mut a).unwrap();
        assert_eq!(t.upload_count(), 2);
        assert_eq!(t.realtime_change_count(), 1);
        assert!(!src.realtime_changed);

        // No further change: no further upload.
        let t = c.get_texture(Some(&mut src), false, &mut a).unwrap();
        assert_eq!(t.upload_count(), 2);
        assert_eq!(a.uploads.len(), 2);
        assert_eq!(a.uploads[1].1, ImageLayout::ShaderReadOnly);
    }

    #[test]
    fn changed_flag_with_matching_stamp_is_ignored() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();
        let mut src = p8(5, 4).realtime();

        c.get_texture(Some(&mut src), false, &mut a).unwrap();
        src.realtime_changed = true;
        let t = c.get_texture(Some(&mut src), false, &mut a).unwrap();
        assert_eq!(t.upload_count(), 1);
        assert!(!src.realtime_changed);
    }

    #[test]
    fn realtime_change_refreshes_both_variants() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();
        let mut src = p8(5, 4).realtime();

        c.get_texture(Some(&mut src), false, &mut a).unwrap();
        c.get_texture(Some(&mut src), true, &mut a).unwrap();
        src.mark_changed();

        assert_eq!(c.get_texture(Some(&mut src), false, &mut a).unwrap().upload_count(), 2);
        // The masked variant is still behind, so the change stays pending.
        assert!(src.realtime_changed);

        for _ in 0..3 {
            c.get_texture(Some(&mut src), true, &mut a).unwrap();
        }
        let masked = c.get(5, true).unwrap();
        assert_eq!(masked.upload_count(), 2);
        assert_eq!(masked.realtime_change_count(), src.realtime_change_count);
        assert!(!src.realtime_changed);
        assert_eq!(c.upload_count(), 4);
    }

    #[test]
    fn null_source_resolves_to_shared_white_texture() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();

        let id = c.get_texture(None, false, &mut a).unwrap().id();
        assert!(id.is_null());
        let mut zero = p8(0, 2);
        assert!(c.get_texture(Some(&mut zero), true, &mut a).unwrap().id().is_null());
        assert_eq!(a.allocated.len(), 1);
        assert_eq!((a.allocated[0].width, a.allocated[0].height), (1, 1));
        assert!(c.is_empty());
    }

    #[test]
    fn oversized_texture_becomes_placeholder() {
        let mut c = cache(false);
        let mut a = FakeAllocator {
            max_dimension: 4,
            ..FakeAllocator::new()
        };
        let mut src = p8(3, 8);

        let t = c.get_texture(Some(&mut src), false, &mut a).unwrap();
        assert!(t.is_placeholder());
        assert_eq!((t.desc().width, t.desc().height), (1, 1));
        assert!(!t.id().is_null());
    }

    #[test]
    fn compressed_texture_without_bc_support_becomes_placeholder() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();
        let mut src = TextureSource::new(8, PixelFormat::Bc1, vec![MipSource::new(4, 4, vec![0; 8])]);
        assert!(c.get_texture(Some(&mut src), false, &mut a).unwrap().is_placeholder());
    }

    #[test]
    fn small_compressed_texture_gets_dummy_mips() {
        let mut c = cache(true);
        let mut a = FakeAllocator::new();
        let mut src = TextureSource::new(
            9,
            PixelFormat::Bc1,
            vec![MipSource::new(2, 2, vec![0; 8]), MipSource::new(1, 1, vec![0; 8])],
        );

        let t = c.get_texture(Some(&mut src), false, &mut a).unwrap();
        assert_eq!(t.dummy_mips(), 1);
        assert_eq!((t.desc().width, t.desc().height), (4, 4));
        assert_eq!(t.desc().mip_levels, 3);
        let regions = &a.uploads[0].2;
        assert_eq!(regions[0].dst_level, 1);
        assert_eq!(regions[1].dst_level, 2);
    }

    #[test]
    fn malformed_source_becomes_placeholder() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();
        let mut src = TextureSource::new(4, PixelFormat::Rgba8, vec![MipSource::new(4, 4, vec![0; 3])]);
        assert!(c.get_texture(Some(&mut src), false, &mut a).unwrap().is_placeholder());
    }

    #[test]
    fn update_rect_noops() {
        let mut c = cache(true);
        let mut a = FakeAllocator::new();
        let mut src = p8(11, 8);

        // Not cached yet.
        assert!(!c.update_rect(&src, 0, 0, 2, 2, &mut a).unwrap());

        // Only the masked variant is cached.
        c.get_texture(Some(&mut src), true, &mut a).unwrap();
        assert!(!c.update_rect(&src, 0, 0, 2, 2, &mut a).unwrap());

        c.get_texture(Some(&mut src), false, &mut a).unwrap();
        assert!(!c.update_rect(&src, 6, 6, 4, 4, &mut a).unwrap());
        assert!(c.update_rect(&src, 2, 2, 4, 4, &mut a).unwrap());

        let (_, from, regions) = a.uploads.last().unwrap();
        assert_eq!(*from, ImageLayout::ShaderReadOnly);
        assert_eq!(regions, &vec![MipRegion { src_level: 0, dst_level: 0, x: 2, y: 2, width: 4, height: 4 }]);

        let mut block = TextureSource::new(12, PixelFormat::Bc1, vec![MipSource::new(4, 4, vec![0; 8])]);
        c.get_texture(Some(&mut block), false, &mut a).unwrap();
        assert!(!c.update_rect(&block, 0, 0, 4, 4, &mut a).unwrap());
    }

    #[test]
    fn clear_releases_everything_and_issues_fresh_ids() {
        let mut c = cache(false);
        let mut a = FakeAllocator::new();
        let mut src = p8(21, 2);

        let before = c.get_texture(Some(&mut src), false, &mut a).unwrap().id();
        c.null_texture(&mut a).unwrap();
        let released = c.clear();
        assert_eq!(released.len(), 2);
        assert!(c.is_empty());

        let after = c.get_texture(Some(&mut src), false, &mut a).unwrap().id();
        assert_ne!(before, after);
        assert!(c.by_id(before).is_none());
        assert!(c.by_id(after).is_some());
    }

    #[test]
    fn allocation_failure_propagates() {
        struct Failing;
        impl TextureAllocator for Failing {
            type Texture = FakeTexture;
            fn max_dimension(&self) -> u32 {
                4096
            }
            fn allocate(&mut self, _: &TextureDesc) -> Result<FakeTexture> {
                Err(RenderError::Gpu("out of memory".into()))
            }
            fn upload(&mut self, _: &FakeTexture, _: &TextureDesc, _: &UploadJob<'_>) -> Result<()> {
                Ok(())
            }
        }

        let mut c = cache(false);
        let mut src = p8(1, 2);
        assert!(c.get_texture(Some(&mut src), false, &mut Failing).is_err());
        assert!(c.is_empty());
    }
}
