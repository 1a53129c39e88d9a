/// Logical layout of a cached image.
///
/// wgpu transitions images itself; the cache still tracks the protocol so an
/// image is only ever sampled after its upload finished and only ever written
/// while nobody samples it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    TransferDst,
    ShaderReadOnly,
}

impl ImageLayout {
    /// Enters the transfer-destination state and returns the previous layout.
    pub fn begin_transfer(&mut self) -> ImageLayout {
        let previous = *self;
        debug_assert_ne!(previous, ImageLayout::TransferDst, "nested transfer");
        *self = ImageLayout::TransferDst;
        previous
    }

    /// Leaves the transfer-destination state for shader reads.
    pub fn end_transfer(&mut self) {
        debug_assert_eq!(*self, ImageLayout::TransferDst, "no transfer in progress");
        *self = ImageLayout::ShaderReadOnly;
    }

    #[inline]
    pub fn is_sampleable(self) -> bool {
        self == ImageLayout::ShaderReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_upload_starts_undefined() {
        let mut layout = ImageLayout::default();
        assert_eq!(layout.begin_transfer(), ImageLayout::Undefined);
        assert!(!layout.is_sampleable());
        layout.end_transfer();
        assert!(layout.is_sampleable());
    }

    #[test]
    fn reupload_starts_from_shader_read() {
        let mut layout = ImageLayout::ShaderReadOnly;
        assert_eq!(layout.begin_transfer(), ImageLayout::ShaderReadOnly);
        layout.end_transfer();
        assert_eq!(layout, ImageLayout::ShaderReadOnly);
    }
}
