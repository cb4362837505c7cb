//! Output must not depend on the number of threads.

use decmt_lib::geometry::{FrameGeometry, PictureGeometry, SuperblockSize};
use decmt_lib::synthetic::SyntheticConfig;
use rstest::rstest;

use crate::helpers::{assert_clean_frame, checksums, decode_sequence, grid, small_2x2};

fn uneven_tiles() -> FrameGeometry {
    // 10x6 superblocks split into columns of 1, 6 and 3 superblocks and rows of 4 and 2.
    let picture = PictureGeometry::new(640, 384, SuperblockSize::Sb64);
    FrameGeometry::from_sb_starts(picture, &[0, 1, 7], &[0, 4]).unwrap()
}

fn large_superblocks() -> FrameGeometry {
    let picture = PictureGeometry::new(1000, 700, SuperblockSize::Sb128);
    FrameGeometry::uniform(picture, 3, 2).unwrap()
}

#[rstest]
#[case::two_by_two(small_2x2())]
#[case::single_tile(grid(320, 320, 1, 1))]
#[case::wide(grid(1280, 256, 5, 1))]
#[case::tall(grid(256, 1024, 1, 4))]
#[case::uneven(uneven_tiles())]
#[case::sb128(large_superblocks())]
fn test_checksums_match_across_thread_counts(#[case] geometry: FrameGeometry) {
    let config = SyntheticConfig::default().with_seed(7);
    let reference = decode_sequence(1, &geometry, &config, 3);
    for frame in &reference {
        assert_clean_frame(frame);
    }
    let expected = checksums(&reference);

    for threads in [2, 4, 8] {
        let frames = decode_sequence(threads, &geometry, &config, 3);
        for frame in &frames {
            assert_clean_frame(frame);
        }
        assert_eq!(checksums(&frames), expected, "{threads} threads diverged");
    }
}

#[test]
fn test_ragged_tiles_match_single_thread() {
    let geometry = grid(1024, 512, 4, 2);
    let config = SyntheticConfig::default().with_seed(11).with_ragged_cost(3_000);
    let expected = checksums(&decode_sequence(1, &geometry, &config, 2));
    let frames = decode_sequence(6, &geometry, &config, 2);
    frames.iter().for_each(|f| assert_clean_frame(f));
    assert_eq!(checksums(&frames), expected);
}

#[rstest]
#[case::no_loop_filter(false, true)]
#[case::no_cdef(true, false)]
#[case::no_filters(false, false)]
fn test_disabled_filters_are_deterministic(#[case] loop_filter: bool, #[case] cdef: bool) {
    let geometry = grid(512, 384, 2, 2);
    let config = SyntheticConfig::default().with_filters(loop_filter, cdef);
    let expected = checksums(&decode_sequence(1, &geometry, &config, 2));
    let frames = decode_sequence(4, &geometry, &config, 2);
    frames.iter().for_each(|f| assert_clean_frame(f));
    assert_eq!(checksums(&frames), expected);

    let filtered = checksums(&decode_sequence(1, &geometry, &SyntheticConfig::default(), 2));
    assert_ne!(expected, filtered, "disabling a filter must change the output");
}

#[test]
fn test_different_seeds_differ() {
    let geometry = small_2x2();
    let a = checksums(&decode_sequence(2, &geometry, &SyntheticConfig::default().with_seed(1), 1));
    let b = checksums(&decode_sequence(2, &geometry, &SyntheticConfig::default().with_seed(2), 1));
    assert_ne!(a, b);
}
