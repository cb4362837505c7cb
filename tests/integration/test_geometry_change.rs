//! Frames whose tile layout changes mid-sequence.

use std::sync::Arc;

use decmt_lib::frame_pipeline::FrameScheduler;
use decmt_lib::geometry::{FrameGeometry, GeometryChange};
use decmt_lib::synthetic::{SyntheticConfig, SyntheticFrame};

use crate::helpers::{assert_clean_frame, grid, scheduler_for, synthetic, test_config};

/// Checksum of frame `index` of `geometry` decoded alone on one thread.
fn reference_checksum(geometry: &FrameGeometry, config: &SyntheticConfig, index: u64) -> u64 {
    let mut scheduler = scheduler_for(1, geometry);
    let frame = synthetic(geometry, config, index);
    scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    scheduler.shutdown().unwrap();
    frame.checksum()
}

#[test]
fn test_alternating_grids_reconfigure() {
    let wide = grid(256, 256, 2, 2);
    let narrow = grid(256, 256, 1, 2);
    let config = SyntheticConfig::default().with_ragged_cost(32);
    let mut scheduler = scheduler_for(4, &wide);

    for index in 0..6 {
        let geometry = if index % 2 == 0 { &wide } else { &narrow };
        let frame = synthetic(geometry, &config, index);
        let report = scheduler.decode_frame(Arc::clone(&frame)).unwrap();
        assert_clean_frame(&frame);
        assert_eq!(report.geometry_change, GeometryChange::Reconfigure, "frame {index}");
        assert_eq!(report.num_tiles, geometry.num_tiles());
        assert_eq!(frame.checksum(), reference_checksum(geometry, &config, index));
    }
    assert_eq!(*scheduler.capacity(), wide.required_capacity());
    scheduler.shutdown().unwrap();
}

#[test]
fn test_same_grid_after_reconfigure() {
    let first = grid(256, 256, 2, 2);
    let second = grid(256, 256, 2, 1);
    let config = SyntheticConfig::default();
    let capacity = first.required_capacity().union(&second.required_capacity());
    let mut scheduler: FrameScheduler<SyntheticFrame> =
        FrameScheduler::new(test_config(3), capacity).unwrap();

    let changes: Vec<_> = [&first, &second, &second, &first]
        .into_iter()
        .enumerate()
        .map(|(index, geometry)| {
            let frame = synthetic(geometry, &config, index as u64);
            let report = scheduler.decode_frame(Arc::clone(&frame)).unwrap();
            assert_clean_frame(&frame);
            report.geometry_change
        })
        .collect();
    assert_eq!(
        changes,
        [
            GeometryChange::Reconfigure,
            GeometryChange::Reconfigure,
            GeometryChange::Same,
            GeometryChange::Reconfigure
        ]
    );
}

#[test]
fn test_growing_grid_reallocates() {
    let small = grid(256, 256, 2, 2);
    let large = grid(512, 384, 4, 3);
    let config = SyntheticConfig::default();
    let mut scheduler = scheduler_for(4, &small);
    assert!(!scheduler.capacity().covers(&large.required_capacity()));

    let frame = synthetic(&small, &config, 0);
    scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_clean_frame(&frame);

    let frame = synthetic(&large, &config, 1);
    let report = scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_clean_frame(&frame);
    assert_eq!(report.geometry_change, GeometryChange::Reallocate);
    assert_eq!(report.num_tiles, 12);
    assert!(scheduler.capacity().covers(&large.required_capacity()));
    assert!(scheduler.capacity().covers(&small.required_capacity()));
    assert_eq!(frame.checksum(), reference_checksum(&large, &config, 1));

    // Shrinking back fits the grown allocation.
    let frame = synthetic(&small, &config, 2);
    let report = scheduler.decode_frame(Arc::clone(&frame)).unwrap();
    assert_clean_frame(&frame);
    assert_eq!(report.geometry_change, GeometryChange::Reconfigure);
    assert_eq!(frame.checksum(), reference_checksum(&small, &config, 2));

    assert_eq!(scheduler.frames_decoded(), 3);
    scheduler.shutdown().unwrap();
}

#[test]
fn test_reallocate_on_single_thread() {
    let small = grid(128, 128, 1, 1);
    let large = grid(384, 384, 3, 3);
    let config = SyntheticConfig::default();
    let mut scheduler = scheduler_for(1, &small);

    for (index, geometry) in [&small, &large, &large].into_iter().enumerate() {
        let frame = synthetic(geometry, &config, index as u64);
        scheduler.decode_frame(Arc::clone(&frame)).unwrap();
        assert_clean_frame(&frame);
    }
    assert_eq!(*scheduler.capacity(), large.required_capacity());
    scheduler.shutdown().unwrap();
}
