#![allow(unsafe_code)]
//! x86_64 vector backends.
//!
//! Two widths are supported, selected at call time via runtime CPU feature
//! detection (checked once and cached, not per-call): AVX2 (32-byte lanes)
//! when available, SSE2 (16-byte lanes, always present on x86_64) otherwise.
//! Every routine here falls back to [`super::scalar`] for the unaligned
//! remainder.

use std::arch::x86_64::*;
use std::sync::atomic::{AtomicU8, Ordering};

use super::scalar;

const UNINIT: u8 = 0;
const AVX2: u8 = 1;
const SSE2_ONLY: u8 = 2;

static TIER: AtomicU8 = AtomicU8::new(UNINIT);

#[inline]
fn tier() -> u8 {
    let cached = TIER.load(Ordering::Relaxed);
    if cached != UNINIT {
        return cached;
    }
    let detected = if is_x86_feature_detected!("avx2") {
        AVX2
    } else {
        SSE2_ONLY
    };
    TIER.store(detected, Ordering::Relaxed);
    detected
}

pub fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    match tier() {
        AVX2 => unsafe { find_byte_avx2(haystack, needle) },
        _ => unsafe { find_byte_sse2(haystack, needle) },
    }
}

pub fn count_newlines(haystack: &[u8]) -> usize {
    match tier() {
        AVX2 => unsafe { count_newlines_avx2(haystack) },
        _ => unsafe { count_newlines_sse2(haystack) },
    }
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
    let hay = haystack.get(start..)?;
    let found = match tier() {
        AVX2 => unsafe { packed_pair_avx2(hay, needle, false) },
        _ => unsafe { packed_pair_sse2(hay, needle, false) },
    };
    found.map(|i| i + start)
}

pub fn find_substring_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() < 2 {
        return match needle.first() {
            None => Some(0),
            Some(&b) => {
                let folded = scalar::fold(b);
                haystack
                    .iter()
                    .position(|&h| scalar::fold(h) == folded)
            }
        };
    }
    match tier() {
        AVX2 => unsafe { packed_pair_avx2(haystack, needle, true) },
        _ => unsafe { packed_pair_sse2(haystack, needle, true) },
    }
}

// ---------------------------------------------------------------- AVX2 ---

#[target_feature(enable = "avx2")]
unsafe fn find_byte_avx2(haystack: &[u8], needle: u8) -> Option<usize> {
    const W: usize = 32;
    let n = haystack.len();
    let splat = unsafe { _mm256_set1_epi8(needle as i8) };
    let mut i = 0;
    while i + W <= n {
        let chunk = unsafe { _mm256_loadu_si256(haystack.as_ptr().add(i).cast()) };
        let eq = unsafe { _mm256_cmpeq_epi8(chunk, splat) };
        let mask = unsafe { _mm256_movemask_epi8(eq) } as u32;
        if mask != 0 {
            return Some(i + mask.trailing_zeros() as usize);
        }
        i += W;
    }
    scalar::find_byte(haystack.get(i..)?, needle).map(|p| p + i)
}

#[target_feature(enable = "avx2")]
unsafe fn count_newlines_avx2(haystack: &[u8]) -> usize {
    const W: usize = 32;
    let n = haystack.len();
    let splat = unsafe { _mm256_set1_epi8(b'\n' as i8) };
    let mut i = 0;
    let mut total = 0usize;
    while i + W <= n {
        let chunk = unsafe { _mm256_loadu_si256(haystack.as_ptr().add(i).cast()) };
        let eq = unsafe { _mm256_cmpeq_epi8(chunk, splat) };
        let mask = unsafe { _mm256_movemask_epi8(eq) } as u32;
        total += mask.count_ones() as usize;
        i += W;
    }
    total + scalar::count_newlines(haystack.get(i..).unwrap_or(&[]))
}

/// Packed-pair two-byte fingerprint, §4.1. Splats the first and last bytes
/// of `needle` (each duplicated in its alternate ASCII case, OR'd together,
/// when `ignore_case` is set), loads the haystack twice offset by
/// `needle.len() - 1`, and keeps only the lanes where both match before
/// paying for a full byte-by-byte verification.
#[target_feature(enable = "avx2")]
unsafe fn packed_pair_avx2(haystack: &[u8], needle: &[u8], ignore_case: bool) -> Option<usize> {
    const W: usize = 32;
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
    let f_vec = unsafe { _mm256_set1_epi8(first as i8) };
    let l_vec = unsafe { _mm256_set1_epi8(last as i8) };

    let last_start = n - needle.len();
    let mut i = 0usize;
    while i + off + W <= n {
        let h1 = unsafe { _mm256_loadu_si256(haystack.as_ptr().add(i).cast()) };
        let h2 = unsafe { _mm256_loadu_si256(haystack.as_ptr().add(i + off).cast()) };
        let (h1, h2) = if ignore_case {
            (unsafe { fold_lane_avx2(h1) }, unsafe { fold_lane_avx2(h2) })
        } else {
            (h1, h2)
        };
        let m1 = unsafe { _mm256_cmpeq_epi8(h1, f_vec) };
        let m2 = unsafe { _mm256_cmpeq_epi8(h2, l_vec) };
        let mut mask = unsafe { _mm256_movemask_epi8(_mm256_and_si256(m1, m2)) } as u32;
        while mask != 0 {
            let bit = mask.trailing_zeros() as usize;
            let cand = i + bit;
            if cand <= last_start && verify(haystack, cand, needle, ignore_case) {
                return Some(cand);
            }
            mask &= mask - 1;
        }
        i += W;
    }
    scalar_tail(haystack, needle, i, last_start, ignore_case)
}

#[target_feature(enable = "avx2")]
unsafe fn fold_lane_avx2(v: __m256i) -> __m256i {
    let upper_a = unsafe { _mm256_set1_epi8((b'A' - 1) as i8) };
    let upper_z = unsafe { _mm256_set1_epi8((b'Z' + 1) as i8) };
    let ge_a = unsafe { _mm256_cmpgt_epi8(v, upper_a) };
    let le_z = unsafe { _mm256_cmpgt_epi8(upper_z, v) };
    let is_upper = unsafe { _mm256_and_si256(ge_a, le_z) };
    let bit5 = unsafe { _mm256_set1_epi8(0x20) };
    let add = unsafe { _mm256_and_si256(is_upper, bit5) };
    unsafe { _mm256_or_si256(v, add) }
}

// ---------------------------------------------------------------- SSE2 ---

#[target_feature(enable = "sse2")]
unsafe fn find_byte_sse2(haystack: &[u8], needle: u8) -> Option<usize> {
    const W: usize = 16;
    let n = haystack.len();
    let splat = unsafe { _mm_set1_epi8(needle as i8) };
    let mut i = 0;
    while i + W <= n {
        let chunk = unsafe { _mm_loadu_si128(haystack.as_ptr().add(i).cast()) };
        let eq = unsafe { _mm_cmpeq_epi8(chunk, splat) };
        let mask = unsafe { _mm_movemask_epi8(eq) } as u32;
        if mask != 0 {
            return Some(i + mask.trailing_zeros() as usize);
        }
        i += W;
    }
    scalar::find_byte(haystack.get(i..)?, needle).map(|p| p + i)
}

#[target_feature(enable = "sse2")]
unsafe fn count_newlines_sse2(haystack: &[u8]) -> usize {
    const W: usize = 16;
    let n = haystack.len();
    let splat = unsafe { _mm_set1_epi8(b'\n' as i8) };
    let mut i = 0;
    let mut total = 0usize;
    while i + W <= n {
        let chunk = unsafe { _mm_loadu_si128(haystack.as_ptr().add(i).cast()) };
        let eq = unsafe { _mm_cmpeq_epi8(chunk, splat) };
        let mask = unsafe { _mm_movemask_epi8(eq) } as u32;
        total += mask.count_ones() as usize;
        i += W;
    }
    total + scalar::count_newlines(haystack.get(i..).unwrap_or(&[]))
}

#[target_feature(enable = "sse2")]
unsafe fn packed_pair_sse2(haystack: &[u8], needle: &[u8], ignore_case: bool) -> Option<usize> {
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
    let f_vec = unsafe { _mm_set1_epi8(first as i8) };
    let l_vec = unsafe { _mm_set1_epi8(last as i8) };

    let last_start = n - needle.len();
    let mut i = 0usize;
    while i + off + W <= n {
        let h1 = unsafe { _mm_loadu_si128(haystack.as_ptr().add(i).cast()) };
        let h2 = unsafe { _mm_loadu_si128(haystack.as_ptr().add(i + off).cast()) };
        let (h1, h2) = if ignore_case {
            (unsafe { fold_lane_sse2(h1) }, unsafe { fold_lane_sse2(h2) })
        } else {
            (h1, h2)
        };
        let m1 = unsafe { _mm_cmpeq_epi8(h1, f_vec) };
        let m2 = unsafe { _mm_cmpeq_epi8(h2, l_vec) };
        let mut mask = unsafe { _mm_movemask_epi8(_mm_and_si128(m1, m2)) } as u32;
        while mask != 0 {
            let bit = mask.trailing_zeros() as usize;
            let cand = i + bit;
            if cand <= last_start && verify(haystack, cand, needle, ignore_case) {
                return Some(cand);
            }
            mask &= mask - 1;
        }
        i += W;
    }
    scalar_tail(haystack, needle, i, last_start, ignore_case)
}

/// Folds `A..Z` to `a..z` within a 128-bit lane without a table lookup,
/// using the same bit-5 trick as the scalar folder.
#[target_feature(enable = "sse2")]
unsafe fn fold_lane_sse2(v: __m128i) -> __m128i {
    let upper_a = unsafe { _mm_set1_epi8((b'A' - 1) as i8) };
    let upper_z = unsafe { _mm_set1_epi8((b'Z' + 1) as i8) };
    // signed comparisons work here because ASCII bytes are all < 0x80.
    let ge_a = unsafe { _mm_cmpgt_epi8(v, upper_a) };
    let le_z = unsafe { _mm_cmpgt_epi8(upper_z, v) };
    let is_upper = unsafe { _mm_and_si128(ge_a, le_z) };
    let bit5 = unsafe { _mm_set1_epi8(0x20) };
    let add = unsafe { _mm_and_si128(is_upper, bit5) };
    unsafe { _mm_or_si128(v, add) }
}

#[inline]
fn verify(haystack: &[u8], start: usize, needle: &[u8], ignore_case: bool) -> bool {
    match haystack.get(start..start + needle.len()) {
        Some(window) if ignore_case => scalar::eq_ignore_ascii_case(window, needle),
        Some(window) => window == needle,
        None => false,
    }
}

#[inline]
fn scalar_tail(
    haystack: &[u8],
    needle: &[u8],
    from: usize,
    last_start: usize,
    ignore_case: bool,
) -> Option<usize> {
    let mut i = from;
    while i <= last_start {
        if verify(haystack, i, needle, ignore_case) {
            return Some(i);
        }
        i += 1;
    }
    None
}
