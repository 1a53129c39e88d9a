bitflags::bitflags! {
    /// Polygon flag bitmask carried by every scene draw call.
    ///
    /// Bit values match the scene traversal's own flag word so callers can pass
    /// it through unchanged; bits without a name here are kept as they are.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct PolyFlags: u32 {
        const INVISIBLE = 0x0000_0001;
        const MASKED = 0x0000_0002;
        const TRANSLUCENT = 0x0000_0004;
        const ENVIRONMENT = 0x0000_0010;
        const MODULATED = 0x0000_0040;
        const FAKE_BACKDROP = 0x0000_0080;
        const TWO_SIDED = 0x0000_0100;
        const NO_SMOOTH = 0x0000_0800;
        const FLAT = 0x0000_4000;
        const HIGHLIGHTED = 0x0001_0000;
        const UNLIT = 0x0040_0000;
        const OCCLUDE = 0x8000_0000;

        const _ = !0;
    }
}

impl PolyFlags {
    pub const NONE: Self = Self::empty();
}

impl Default for PolyFlags {
    fn default() -> Self {
        Self::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_operations() {
        let mut f = PolyFlags::TRANSLUCENT | PolyFlags::MASKED;
        assert!(f.contains(PolyFlags::MASKED));
        assert!(f.intersects(PolyFlags::MASKED | PolyFlags::OCCLUDE));
        assert!(!f.contains(PolyFlags::MASKED | PolyFlags::OCCLUDE));

        f.remove(PolyFlags::MASKED);
        assert_eq!(f, PolyFlags::TRANSLUCENT);
        f.insert(PolyFlags::OCCLUDE);
        assert_eq!(f.bits(), 0x8000_0004);
        assert_eq!(f & !PolyFlags::OCCLUDE, PolyFlags::TRANSLUCENT);
        assert!(PolyFlags::NONE.is_empty());
    }

    #[test]
    fn unnamed_bits_pass_through() {
        let f = PolyFlags::from_bits_retain(0x0000_0200 | PolyFlags::MASKED.bits());
        assert_eq!(f.bits(), 0x0000_0202);
        assert_eq!((f & !PolyFlags::MASKED).bits(), 0x0000_0200);
        assert_eq!(PolyFlags::default(), PolyFlags::NONE);
    }
}
