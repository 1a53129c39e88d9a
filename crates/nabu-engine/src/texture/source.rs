use super::format::PixelFormat;
use crate::error::{RenderError, Result};

/// One mip level of source texels, tightly packed.
#[derive(Debug, Clone)]
pub struct MipSource {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl MipSource {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }
}

/// Engine-side description of a texture.
///
/// `cache_id` is the stable identity the cache keys on; zero means "no texture".
/// Dynamic textures bump `realtime_change_count` and raise `realtime_changed`
/// through [`TextureSource::mark_changed`] whenever their texels change.
#[derive(Debug, Clone)]
pub struct TextureSource {
    pub cache_id: u64,
    pub format: PixelFormat,
    pub mips: Vec<MipSource>,
    pub palette: Option<Vec<[u8; 4]>>,

    pub realtime: bool,
    pub realtime_changed: bool,
    pub realtime_change_count: u32,

    pub u_scale: f32,
    pub v_scale: f32,
    pub u_pan: f32,
    pub v_pan: f32,
}

impl TextureSource {
    pub fn new(cache_id: u64, format: PixelFormat, mips: Vec<MipSource>) -> Self {
        Self {
            cache_id,
            format,
            mips,
            palette: None,
            realtime: false,
            realtime_changed: false,
            realtime_change_count: 0,
            u_scale: 1.0,
            v_scale: 1.0,
            u_pan: 0.0,
            v_pan: 0.0,
        }
    }

    pub fn with_palette(mut self, palette: Vec<[u8; 4]>) -> Self {
        self.palette = Some(palette);
        self
    }

    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Opaque white 1×1 texture.
    pub fn solid_white(cache_id: u64) -> Self {
        Self::new(
            cache_id,
            PixelFormat::Rgba8,
            vec![MipSource::new(1, 1, vec![255; 4])],
        )
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.mips.first().map_or(0, |m| m.width)
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.mips.first().map_or(0, |m| m.height)
    }

    /// Records a content change for the next cache lookup.
    pub fn mark_changed(&mut self) {
        self.realtime_changed = true;
        self.realtime_change_count = self.realtime_change_count.wrapping_add(1);
    }

    /// Clears the change flag once the cache has re-uploaded the texels.
    pub fn mark_uploaded(&mut self) {
        self.realtime_changed = false;
    }

    /// Checks the mip chain for shape and length.
    ///
    /// Level `i` must be `max(1, base >> i)` on both axes and hold at least
    /// [`PixelFormat::mip_len`] bytes.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| RenderError::InvalidTexture {
            id: self.cache_id,
            reason,
        };

        let base = self.mips.first().ok_or_else(|| invalid("no mip levels".into()))?;
        if base.width == 0 || base.height == 0 {
            return Err(invalid(format!("zero extent {}x{}", base.width, base.height)));
        }

        for (level, mip) in self.mips.iter().enumerate() {
            let shift = level as u32;
            let expected = (
                base.width.checked_shr(shift).unwrap_or(0).max(1),
                base.height.checked_shr(shift).unwrap_or(0).max(1),
            );
            if (mip.width, mip.height) != expected {
                return Err(invalid(format!(
                    "mip {level} is {}x{}, expected {}x{}",
                    mip.width, mip.height, expected.0, expected.1
                )));
            }
            let need = self.format.mip_len(mip.width, mip.height);
            if mip.data.len() < need {
                return Err(invalid(format!(
                    "mip {level} holds {} bytes, needs {need}",
                    mip.data.len()
                )));
            }
        }

        if self.format == PixelFormat::P8 && self.palette.is_none() {
            log::debug!("texture {:#x}: P8 without palette, using grayscale", self.cache_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_chain_validates() {
        let t = TextureSource::new(
            7,
            PixelFormat::P8,
            vec![
                MipSource::new(4, 2, vec![0; 8]),
                MipSource::new(2, 1, vec![0; 2]),
                MipSource::new(1, 1, vec![0; 1]),
            ],
        );
        assert!(t.validate().is_ok());
        assert_eq!((t.width(), t.height()), (4, 2));
    }

    #[test]
    fn short_or_misshapen_mips_are_rejected() {
        let short = TextureSource::new(1, PixelFormat::Rgba8, vec![MipSource::new(2, 2, vec![0; 15])]);
        assert!(matches!(short.validate(), Err(RenderError::InvalidTexture { id: 1, .. })));

        let shape = TextureSource::new(
            2,
            PixelFormat::P8,
            vec![MipSource::new(4, 4, vec![0; 16]), MipSource::new(3, 2, vec![0; 6])],
        );
        assert!(shape.validate().is_err());

        let empty = TextureSource::new(3, PixelFormat::P8, Vec::new());
        assert!(empty.validate().is_err());
    }

    #[test]
    fn mark_changed_bumps_stamp() {
        let mut t = TextureSource::solid_white(9).realtime();
        t.mark_changed();
        t.mark_changed();
        assert!(t.realtime_changed);
        assert_eq!(t.realtime_change_count, 2);
    }
}
