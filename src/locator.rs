//! Dynamic-field descriptor decoding.
//!
//! Some trace-point contexts encode a variable-length field (such as a
//! filename) not as a pointer but as a packed 32-bit descriptor relative to
//! the start of the context structure: the low 16 bits give the byte offset
//! of the field's data, the high 16 bits a length in richer schemas.

/// A packed dynamic-field descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLoc(pub u32);

impl DataLoc {
    /// Byte offset of the field's data relative to the context base.
    #[inline]
    pub fn offset(self) -> usize {
        (self.0 & 0xFFFF) as usize
    }

    /// Declared field length. Unused by the capture engine; the bounded
    /// reader enforces its own capacity regardless.
    #[inline]
    pub fn len(self) -> usize {
        (self.0 >> 16) as usize
    }

    /// Resolve the field's address relative to `ctx_base`.
    ///
    /// No bounds validation is possible here: a zero or implausibly large
    /// offset still yields an address, and safety is delegated entirely to
    /// the bounded, capacity-limited copy that consumes it.
    #[inline]
    pub fn resolve(self, ctx_base: usize) -> usize {
        ctx_base.wrapping_add(self.offset())
    }
}
