//! Unpacking of the interleaved five-channel video block.
//!
//! Counts are stored pixel by pixel, five channels per pixel. The 8- and
//! 16-bit packings keep one count per byte or per big-endian word; the
//! 10-bit packing squeezes three counts into each big-endian 32-bit word
//! (bits 29..20, 19..10 and 9..0), so a channel's position inside the
//! word rotates from pixel to pixel.

use crate::io::layout::CHANNELS_PER_PIXEL;
use crate::types::{AvhrrError, AvhrrResult, PixelPacking};

/// Upper bound (exclusive) of a valid count
pub const MAX_VALID_COUNT: i32 = 1024;

/// Shift of the n-th 10-bit field inside its word
const TEN_BIT_SHIFTS: [u32; 3] = [20, 10, 0];
const TEN_BIT_MASK: u32 = 0x3FF;

/// Counts of one channel slot for `pixels` pixels
pub fn unpack_channel(
    packing: PixelPacking,
    video: &[u8],
    slot: usize,
    pixels: usize,
) -> AvhrrResult<Vec<i32>> {
    if slot >= CHANNELS_PER_PIXEL {
        return Err(AvhrrError::InvalidRequest(format!("channel slot {} out of range", slot)));
    }
    let needed = packing.video_bytes(pixels * CHANNELS_PER_PIXEL);
    if video.len() < needed {
        return Err(AvhrrError::InvalidRequest(format!(
            "video block of {} bytes is shorter than the {} bytes needed for {} pixels",
            video.len(),
            needed,
            pixels
        )));
    }

    Ok(match packing {
        PixelPacking::Bits8 => unpack_8bit(video, slot, pixels),
        PixelPacking::Bits10 => unpack_10bit(video, slot, pixels),
        PixelPacking::Bits16 => unpack_16bit(video, slot, pixels),
    })
}

pub fn unpack_8bit(video: &[u8], slot: usize, pixels: usize) -> Vec<i32> {
    video
        .iter()
        .skip(slot)
        .step_by(CHANNELS_PER_PIXEL)
        .take(pixels)
        .map(|&b| i32::from(b))
        .collect()
}

pub fn unpack_16bit(video: &[u8], slot: usize, pixels: usize) -> Vec<i32> {
    video
        .chunks_exact(2)
        .skip(slot)
        .step_by(CHANNELS_PER_PIXEL)
        .take(pixels)
        .map(|w| i32::from(u16::from_be_bytes([w[0], w[1]])))
        .collect()
}

/// Fast 10-bit decoder.
///
/// Sample `k = 5 * pixel + slot` sits in word `k / 3` at field `k % 3`.
/// Moving to the next pixel adds 5 to `k`: the field index advances by two
/// (mod 3) and the word index by one, plus one more when the field wraps.
/// The walk is therefore a 3-cycle of (shift, word increment) pairs that
/// depends only on the starting field.
pub fn unpack_10bit(video: &[u8], slot: usize, pixels: usize) -> Vec<i32> {
    let mut counts = Vec::with_capacity(pixels);
    let mut word = slot / 3;
    let mut field = slot % 3;

    for _ in 0..pixels {
        let base = word * 4;
        let value = u32::from_be_bytes([video[base], video[base + 1], video[base + 2], video[base + 3]]);
        counts.push(((value >> TEN_BIT_SHIFTS[field]) & TEN_BIT_MASK) as i32);

        field += 2;
        if field >= 3 {
            field -= 3;
            word += 2;
        } else {
            word += 1;
        }
    }
    counts
}

/// Whole-line validity: every count must lie in `1..1024`.
///
/// The same range applies to all packings, including 8-bit data.
pub fn counts_valid(counts: &[i32]) -> bool {
    counts.iter().all(|&c| c > 0 && c < MAX_VALID_COUNT)
}


#[cfg(test)]
mod tests {
    use super::reference::{pack_10bit, unpack_10bit_slow};
    use super::*;
    use proptest::prelude::*;

    fn interleaved(pixels: usize, value: impl Fn(usize, usize) -> u16) -> Vec<u16> {
        (0..pixels * CHANNELS_PER_PIXEL)
            .map(|k| value(k / CHANNELS_PER_PIXEL, k % CHANNELS_PER_PIXEL))
            .collect()
    }

    #[test]
    fn test_10bit_known_pattern() {
        let pixels = 409;
        let samples = interleaved(pixels, |p, c| ((p * 7 + c * 131) % 1024) as u16);
        let video = pack_10bit(&samples);
        assert_eq!(video.len(), 2728);

        for slot in 0..CHANNELS_PER_PIXEL {
            let counts = unpack_channel(PixelPacking::Bits10, &video, slot, pixels).unwrap();
            for (p, &count) in counts.iter().enumerate() {
                assert_eq!(count, ((p * 7 + slot * 131) % 1024) as i32, "slot {} pixel {}", slot, p);
            }
        }
    }

    #[test]
    fn test_8_and_16_bit() {
        let samples = interleaved(4, |p, c| (p * 10 + c) as u16);
        let video8: Vec<u8> = samples.iter().map(|&s| s as u8).collect();
        assert_eq!(unpack_8bit(&video8, 3, 4), vec![3, 13, 23, 33]);

        let video16: Vec<u8> = samples.iter().flat_map(|&s| (s + 1000).to_be_bytes()).collect();
        assert_eq!(unpack_16bit(&video16, 1, 4), vec![1001, 1011, 1021, 1031]);
    }

    #[test]
    fn test_short_video_block_is_rejected() {
        let video = vec![0u8; 100];
        assert!(unpack_channel(PixelPacking::Bits10, &video, 0, 2048).is_err());
        assert!(unpack_channel(PixelPacking::Bits8, &video, 5, 1).is_err());
    }

    #[test]
    fn test_validity_filter() {
        assert!(counts_valid(&[1, 512, 1023]));
        assert!(!counts_valid(&[1, 0, 5]));
        assert!(!counts_valid(&[1024, 5]));
        assert!(!counts_valid(&[-3]));
        // 8-bit lines follow the same rule
        assert!(!counts_valid(&[0u8 as i32, 255]));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn fast_10bit_matches_reference(
            samples in proptest::collection::vec(0u16..1024, CHANNELS_PER_PIXEL..CHANNELS_PER_PIXEL * 300),
            slot in 0usize..CHANNELS_PER_PIXEL,
        ) {
            let pixels = samples.len() / CHANNELS_PER_PIXEL;
            let video = pack_10bit(&samples);
            let fast = unpack_10bit(&video, slot, pixels);
            let slow = unpack_10bit_slow(&video, slot, pixels);
            prop_assert_eq!(&fast, &slow);

            let expected: Vec<i32> = samples
                .iter()
                .skip(slot)
                .step_by(CHANNELS_PER_PIXEL)
                .take(pixels)
                .map(|&s| i32::from(s))
                .collect();
            prop_assert_eq!(fast, expected);
        }

        #[test]
        fn filter_rejects_any_out_of_range_sample(
            mut counts in proptest::collection::vec(1i32..1024, 1..200),
            bad in prop_oneof![i32::MIN..=0, 1024..i32::MAX],
            position in any::<proptest::sample::Index>(),
        ) {
            prop_assert!(counts_valid(&counts));
            let i = position.index(counts.len());
            counts[i] = bad;
            prop_assert!(!counts_valid(&counts));
        }
    }
}
