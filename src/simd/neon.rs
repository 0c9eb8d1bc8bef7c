#![allow(unsafe_code)]
//! aarch64 NEON backend, 16-byte lanes. NEON is part of the aarch64
//! baseline (unlike x86's AVX2), so no runtime feature detection is
//! needed here.

use std::arch::aarch64::*;

use super::scalar;

pub fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    unsafe { find_byte_neon(haystack, needle) }
}

pub fn count_newlines(haystack: &[u8]) -> usize {
    unsafe { count_newlines_neon(haystack) }
}

pub fn find_substring(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    find_substring_from(haystack, needle, 0)
}

pub fn find_substring_from(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.len() < 2 {
        return match needle.first() {
            None => Some(start.min(haystack.len())),
            Some(&b) => find_byte(haystack.get(start..)?, b).map(|i| i + start),
        };
    }
    unsafe { packed_pair_neon(haystack.get(start..)?, needle, false) }.map(|i| i + start)
}

pub fn find_substring_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() < 2 {
        return match needle.first() {
            None => Some(0),
            Some(&b) => {
                let folded = scalar::fold(b);
                haystack.iter().position(|&h| scalar::fold(h) == folded)
            }
        };
    }
    unsafe { packed_pair_neon(haystack, needle, true) }
}

#[target_feature(enable = "neon")]
unsafe fn find_byte_neon(haystack: &[u8], needle: u8) -> Option<usize> {
    const W: usize = 16;
    let n = haystack.len();
    let splat = unsafe { vdupq_n_u8(needle) };
    let mut i = 0;
    while i + W <= n {
        let chunk = unsafe { vld1q_u8(haystack.as_ptr().add(i)) };
        let eq = unsafe { vceqq_u8(chunk, splat) };
        if let Some(bit) = first_set_lane(eq) {
            return Some(i + bit);
        }
        i += W;
    }
    scalar::find_byte(haystack.get(i..)?, needle).map(|p| p + i)
}

#[target_feature(enable = "neon")]
unsafe fn count_newlines_neon(haystack: &[u8]) -> usize {
    const W: usize = 16;
    let n = haystack.len();
    let splat = unsafe { vdupq_n_u8(b'\n') };
    let mut i = 0;
    let mut total = 0usize;
    while i + W <= n {
        let chunk = unsafe { vld1q_u8(haystack.as_ptr().add(i)) };
        let eq = unsafe { vceqq_u8(chunk, splat) };
        total += popcount_lanes(eq);
        i += W;
    }
    total + scalar::count_newlines(haystack.get(i..).unwrap_or(&[]))
}

#[target_feature(enable = "neon")]
unsafe fn packed_pair_neon(haystack: &[u8], needle: &[u8], ignore_case: bool) -> Option<usize> {
    const W: usize = 16;
    let n = haystack.len();
    let off = needle.len() - 1;
    if needle.len() > n {
        return None;
    }
    let first = if ignore_case {
        scalar::fold(needle[0])
    } else {
        needle[0]
    };
    let last = if ignore_case {
        scalar::fold(needle[off])
    } else {
        needle[off]
    };
    let f_vec = unsafe { vdupq_n_u8(first) };
    let l_vec = unsafe { vdupq_n_u8(last) };

    let last_start = n - needle.len();
    let mut i = 0usize;
    while i + off + W <= n {
        let h1 = unsafe { vld1q_u8(haystack.as_ptr().add(i)) };
        let h2 = unsafe { vld1q_u8(haystack.as_ptr().add(i + off)) };
        let (h1, h2) = if ignore_case {
            (unsafe { fold_lane(h1) }, unsafe { fold_lane(h2) })
        } else {
            (h1, h2)
        };
        let m1 = unsafe { vceqq_u8(h1, f_vec) };
        let m2 = unsafe { vceqq_u8(h2, l_vec) };
        let combined = unsafe { vandq_u8(m1, m2) };
        let mut bits = lane_bits(combined);
        while bits != 0 {
            let bit = bits.trailing_zeros() as usize;
            let cand = i + bit;
            if cand <= last_start && verify(haystack, cand, needle, ignore_case) {
                return Some(cand);
            }
            bits &= bits - 1;
        }
        i += W;
    }
    let mut i = i;
    while i <= last_start {
        if verify(haystack, i, needle, ignore_case) {
            return Some(i);
        }
        i += 1;
    }
    None
}

#[target_feature(enable = "neon")]
unsafe fn fold_lane(v: uint8x16_t) -> uint8x16_t {
    let upper_a = unsafe { vdupq_n_u8(b'A') };
    let upper_z = unsafe { vdupq_n_u8(b'Z') };
    let ge_a = unsafe { vcgeq_u8(v, upper_a) };
    let le_z = unsafe { vcleq_u8(v, upper_z) };
    let is_upper = unsafe { vandq_u8(ge_a, le_z) };
    let bit5 = unsafe { vdupq_n_u8(0x20) };
    let add = unsafe { vandq_u8(is_upper, bit5) };
    unsafe { vorrq_u8(v, add) }
}

/// Extracts a 16-bit "one bit per lane" summary by keeping only the low bit
/// of each lane byte and narrowing. Cheaper than per-lane extraction.
#[target_feature(enable = "neon")]
unsafe fn lane_bits(mask: uint8x16_t) -> u32 {
    let bit_positions: [u8; 16] = [1, 2, 4, 8, 16, 32, 64, 128, 1, 2, 4, 8, 16, 32, 64, 128];
    let bits = unsafe { vld1q_u8(bit_positions.as_ptr()) };
    let masked = unsafe { vandq_u8(mask, bits) };
    let lo = unsafe { vget_low_u8(masked) };
    let hi = unsafe { vget_high_u8(masked) };
    let lo_sum = unsafe { vaddv_u8(lo) } as u32;
    let hi_sum = unsafe { vaddv_u8(hi) } as u32;
    lo_sum | (hi_sum << 8)
}

#[target_feature(enable = "neon")]
unsafe fn first_set_lane(mask: uint8x16_t) -> Option<usize> {
    let bits = unsafe { lane_bits(mask) };
    if bits == 0 {
        None
    } else {
        Some(bits.trailing_zeros() as usize)
    }
}

#[target_feature(enable = "neon")]
unsafe fn popcount_lanes(mask: uint8x16_t) -> usize {
    unsafe { lane_bits(mask) }.count_ones() as usize
}

#[inline]
fn verify(haystack: &[u8], start: usize, needle: &[u8], ignore_case: bool) -> bool {
    match haystack.get(start..start + needle.len()) {
        Some(window) if ignore_case => scalar::eq_ignore_ascii_case(window, needle),
        Some(window) => window == needle,
        None => false,
    }
}
