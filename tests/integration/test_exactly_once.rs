//! Every job of every stage runs exactly once, for arbitrary geometries.

use std::sync::Arc;

use decmt_lib::frame_pipeline::Stage;
use decmt_lib::geometry::{FrameGeometry, PictureGeometry, SuperblockSize};
use decmt_lib::synthetic::{Claim, SyntheticConfig};
use proptest::prelude::*;

use crate::helpers::{assert_clean_frame, scheduler_for, synthetic};

fn arb_geometry() -> impl Strategy<Value = FrameGeometry> {
    let sb_size = prop_oneof![Just(SuperblockSize::Sb64), Just(SuperblockSize::Sb128)];
    (64_u32..=1200, 64_u32..=900, sb_size, 1_u32..=5, 1_u32..=4)
        .prop_map(|(width, height, sb_size, cols, rows)| {
            let picture = PictureGeometry::new(width, height, sb_size);
            let cols = cols.min(picture.sb_cols());
            let rows = rows.min(picture.sb_rows());
            FrameGeometry::uniform(picture, cols, rows).expect("tile grid fits the picture")
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_every_job_runs_once(geometry in arb_geometry(), threads in 1_usize..=6, seed in any::<u64>()) {
        let config = SyntheticConfig::default().with_seed(seed).with_ragged_cost(200);
        let mut scheduler = scheduler_for(threads, &geometry);
        let frame = synthetic(&geometry, &config, 0);
        scheduler.decode_frame(Arc::clone(&frame)).unwrap();
        scheduler.shutdown().unwrap();

        prop_assert_eq!(frame.violations(), 0, "{:?}", frame.violation_notes());
        prop_assert!(frame.ran_exactly_once());
        prop_assert!(frame.is_complete());

        let mut reference = scheduler_for(1, &geometry);
        let expected = synthetic(&geometry, &config, 0);
        reference.decode_frame(Arc::clone(&expected)).unwrap();
        prop_assert_eq!(frame.checksum(), expected.checksum());
    }
}

#[test]
fn test_claim_counts_for_known_geometry() {
    let picture = PictureGeometry::new(384, 320, SuperblockSize::Sb64);
    let geometry = FrameGeometry::uniform(picture, 3, 2).unwrap();
    let mut scheduler = scheduler_for(5, &geometry);
    let frame = synthetic(&geometry, &SyntheticConfig::default(), 0);
    scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_clean_frame(&frame);

    let counts = frame.claim_counts();
    let expected = frame.expected_claims();
    assert_eq!(counts.len(), expected.len());
    // 5 superblock rows split 2 + 3; 3 tile columns per tile row.
    let recon_rows: Vec<&Claim> =
        expected.iter().filter(|c| c.stage == Stage::Recon).collect();
    assert_eq!(recon_rows.len(), 3 * 2 + 3 * 3);
    assert!(counts.values().all(|&n| n == 1));
}

#[cfg(feature = "stress-tests")]
mod stress_tests {
    use super::*;
    use crate::helpers::grid;

    /// Many small frames with heavily skewed tile costs on more threads than tiles.
    ///
    /// Verifies: no hangs across frames, every job once per frame.
    #[test]
    fn test_stress_many_frames_ragged_tiles() {
        let geometry = grid(640, 448, 5, 3);
        let config = SyntheticConfig::default().with_ragged_cost(2_000);
        let mut scheduler = scheduler_for(16, &geometry);
        for index in 0..500 {
            let frame = synthetic(&geometry, &config, index);
            scheduler
                .decode_frame(Arc::clone(&frame))
                .unwrap_or_else(|e| panic!("Frame {index}: {e}"));
            assert_clean_frame(&frame);
        }
        scheduler.shutdown().unwrap();
    }

    /// Alternating layouts on a large pool, including reallocation.
    #[test]
    fn test_stress_alternating_layouts() {
        let layouts = [grid(256, 256, 2, 2), grid(1024, 512, 8, 4), grid(512, 512, 1, 4)];
        let config = SyntheticConfig::default().with_ragged_cost(500);
        let mut scheduler = scheduler_for(12, &layouts[0]);
        for index in 0..300_u64 {
            let geometry = &layouts[(index % 3) as usize];
            let frame = synthetic(geometry, &config, index);
            scheduler
                .decode_frame(Arc::clone(&frame))
                .unwrap_or_else(|e| panic!("Frame {index}: {e}"));
            assert_clean_frame(&frame);
        }
        scheduler.shutdown().unwrap();
    }
}
