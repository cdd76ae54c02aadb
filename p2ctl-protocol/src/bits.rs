//! Bit-field and compact-float primitives for the telemetry layout.
//!
//! Bit positions are inclusive and counted from the least significant bit.

/// Mask covering `width` low bits.
fn mask(width: u32) -> u32 {
    if width >= u32::BITS {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// Extracts bits `from..=to` of `value`.
pub fn get_bits(value: u32, from: u32, to: u32) -> u32 {
    debug_assert!(from <= to && to < u32::BITS);
    (value >> from) & mask(to - from + 1)
}

/// Returns `value` with bits `from..=to` replaced by the low bits of `field`.
pub fn set_bits(value: u32, from: u32, to: u32, field: u32) -> u32 {
    debug_assert!(from <= to && to < u32::BITS);
    let window = mask(to - from + 1) << from;
    (value & !window) | ((field << from) & window)
}

/// Returns whether bit `bit` of `value` is set.
pub fn bit(value: u32, bit: u32) -> bool {
    get_bits(value, bit, bit) == 1
}

/// Decodes the camera's 16-bit compact float.
///
/// The low 12 bits hold the significand, the high 4 bits an exponent biased
/// by `16 - decimals`. The result is rounded to `decimals` places.
pub fn compact_float(raw: u16, decimals: i32) -> f64 {
    let raw = u32::from(raw);
    let significand = get_bits(raw, 0, 11) as f64;
    let exponent = get_bits(raw, 12, 15) as i32 - (16 - decimals);
    (significand * 10f64.powi(exponent)).round() / 10f64.powi(decimals)
}
