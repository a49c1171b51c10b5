//! Pixel read-back.
//!
//! The worker copies the raw surface bytes out while the surface is locked; the channel swap
//! runs afterwards on the calling thread, so the engine is locked only for one memcpy.

/// Outcome of a pixel copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelUpdate {
    /// The destination now holds the latest frame.
    Updated,
    /// Nothing changed since the last copy. The destination was not touched.
    NoUpdate,
    /// Bad handle, missing surface, or destination smaller than `width * height * 4`.
    Rejected,
}

impl PixelUpdate {
    pub fn is_updated(self) -> bool {
        self == PixelUpdate::Updated
    }

    /// C ABI code: 1 updated, 0 no update, -1 rejected.
    pub fn code(self) -> i32 {
        match self {
            PixelUpdate::Updated => 1,
            PixelUpdate::NoUpdate => 0,
            PixelUpdate::Rejected => -1,
        }
    }
}

/// Raw BGRA bytes of one surface, rows padded to `row_bytes`.
#[derive(Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("row_bytes", &self.row_bytes)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Bytes needed for a tightly packed RGBA image.
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// Converts BGRA rows with stride `row_bytes` into tightly packed RGBA.
///
/// Returns false without writing anything if `src` or `dst` is too small.
pub fn bgra_to_rgba(src: &[u8], width: u32, height: u32, row_bytes: u32, dst: &mut [u8]) -> bool {
    let w = width as usize;
    let h = height as usize;
    let stride = row_bytes as usize;
    let packed = w * 4;

    if stride < packed || dst.len() < packed * h {
        return false;
    }
    if h > 0 && src.len() < stride * (h - 1) + packed {
        return false;
    }

    for (row, out) in dst.chunks_exact_mut(packed).take(h).enumerate() {
        let line = &src[row * stride..row * stride + packed];
        for (s, d) in line.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
            d[0] = s[2];
            d[1] = s[1];
            d[2] = s[0];
            d[3] = s[3];
        }
    }
    true
}

impl RawFrame {
    /// Converts into `dst` (tightly packed RGBA).
    pub fn write_rgba(&self, dst: &mut [u8]) -> bool {
        bgra_to_rgba(&self.bytes, self.width, self.height, self.row_bytes, dst)
    }
}
