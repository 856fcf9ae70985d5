//! Morton (z-curve) linearization of 3-D grid coordinates.
//!
//! Occupancy cells are laid out along a Morton curve so that spatially close
//! cells stay close in the bit array, which keeps the marcher's scan access
//! cache-friendly. Encode/decode are exact inverses for all coordinates in
//! `[0, MAX_RESOLUTION)`.

/// Highest per-axis resolution representable in a `u32` Morton index
/// (10 bits per axis).
pub const MAX_RESOLUTION: u32 = 1 << 10;

/// Spread the low 10 bits of `v` so that two zero bits separate each bit.
///
/// `0b0000001111` → `0b001001001001`
#[inline(always)]
const fn expand_bits(v: u32) -> u32 {
  let mut x = v & 0x3ff;
  x = (x | (x << 16)) & 0x030000ff;
  x = (x | (x << 8)) & 0x0300f00f;
  x = (x | (x << 4)) & 0x030c30c3;
  x = (x | (x << 2)) & 0x09249249;
  x
}

/// Inverse of [`expand_bits`]: collapse every third bit back together.
#[inline(always)]
const fn compact_bits(v: u32) -> u32 {
  let mut x = v & 0x09249249;
  x = (x | (x >> 2)) & 0x030c30c3;
  x = (x | (x >> 4)) & 0x0300f00f;
  x = (x | (x >> 8)) & 0x030000ff;
  x = (x | (x >> 16)) & 0x000003ff;
  x
}

/// Interleave three 10-bit coordinates into a Morton index.
#[inline(always)]
pub const fn morton3d(x: u32, y: u32, z: u32) -> u32 {
  expand_bits(x) | (expand_bits(y) << 1) | (expand_bits(z) << 2)
}

/// Recover the coordinates interleaved by [`morton3d`].
#[inline(always)]
pub const fn morton3d_invert(idx: u32) -> (u32, u32, u32) {
  (compact_bits(idx), compact_bits(idx >> 1), compact_bits(idx >> 2))
}

#[cfg(test)]
#[path = "morton_test.rs"]
mod morton_test;
