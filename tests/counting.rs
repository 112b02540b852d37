// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use image::{Rgb, RgbImage};
use linecount::overlay::HudMode;
use linecount::{
    BBox, CountedCategory, CountingConfig, CountingEngine, Direction, Pipeline, PipelineOptions,
    TrackedDetection,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;

fn det(id: u64, label: &str, cy: f32) -> TrackedDetection {
    TrackedDetection::new(Some(id), label, BBox::new(0.0, cy - 8.0, 16.0, cy + 8.0))
}

#[test]
fn oscillating_tracks_count_at_most_once() {
    let mut rng = StdRng::seed_from_u64(42);
    let labels = ["car", "bus", "truck", "motorbike", "bicycle", "dog"];
    let mut engine = CountingEngine::default();
    let line = engine.start_session(400).unwrap();
    assert_eq!(line, 200.0);

    let mut per_identity: HashMap<u64, usize> = HashMap::new();
    let mut total_events = 0;
    for frame in 1..=500u64 {
        let detections: Vec<_> = (0..20u64)
            .filter_map(|id| {
                if !rng.gen_bool(0.8) {
                    return None;
                }
                // 在计数线附近抖动
                let cy = 200.0 + rng.gen_range(-30.0..30.0f32);
                Some(det(id, labels[(id % labels.len() as u64) as usize], cy))
            })
            .collect();
        let report = engine.process_frame(&detections, frame).unwrap();
        for event in &report.events {
            *per_identity.entry(event.identity).or_default() += 1;
        }
        total_events += report.events.len();
    }

    assert!(per_identity.values().all(|&n| n == 1));
    // dog (id % 6 == 5) 从不计数
    assert!(per_identity.keys().all(|id| id % 6 != 5));

    let tally = engine.end_session().unwrap();
    assert_eq!(tally.total() as usize, total_events);
    assert!(total_events <= 20);
}

#[test]
fn motorcycle_synonyms_accumulate_together() {
    let mut engine = CountingEngine::default();
    engine.start_session(200).unwrap();
    engine
        .process_frame(&[det(1, "motorcycle", 150.0), det(2, "MOTORBIKE", 150.0)], 1)
        .unwrap();
    let report = engine
        .process_frame(&[det(1, "motorcycle", 40.0), det(2, "MOTORBIKE", 40.0)], 2)
        .unwrap();
    assert!(report.events.iter().all(|e| e.direction == Direction::Up));
    assert_eq!(report.tally.get(CountedCategory::Motorcycle).outbound, 2);
}

fn write_tracks(path: &Path, lines: &[&str]) {
    fs::write(path, lines.join("\n")).unwrap();
}

const SCENARIO: [&str; 4] = [
    r#"{"frame": 1, "detections": [{"id": 7, "label": "car", "bbox": [10, 40, 30, 60]}, {"id": 8, "label": "dog", "bbox": [10, 40, 30, 60]}]}"#,
    r#"{"frame": 3, "detections": [{"id": 7, "label": "car", "bbox": [10, 10, 30, 30]}]}"#,
    r#"{"frame": 2, "detections": [{"id": 7, "label": "car", "bbox": [10, 140, 30, 160]}, {"id": 8, "label": "dog", "bbox": [10, 140, 30, 160]}]}"#,
    r#"{"frame": 4, "detections": [{"id": 9, "label": "truck", "bbox": [0, 150]}]}"#,
];

#[test]
fn pipeline_counts_track_file() {
    let dir = tempfile::tempdir().unwrap();
    let tracks = dir.path().join("tracks.jsonl");
    write_tracks(&tracks, &SCENARIO);

    let mut options = PipelineOptions::new(&tracks);
    options.frame_height = Some(200);
    options.output_dir = dir.path().join("outputs");

    let outcome = Pipeline::new(CountingConfig::default(), options).run().unwrap();
    let report = &outcome.report;

    assert_eq!(report.line_y, 100.0);
    assert_eq!(report.frames_processed, 4);
    assert!(!report.cancelled);
    assert_eq!(report.malformed_input, 1);
    assert_eq!(report.tally.get(CountedCategory::Car).inbound, 1);
    assert_eq!(report.tally.get(CountedCategory::Car).outbound, 0);
    assert_eq!(report.tally.total(), 1);
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].frame_index, 2);
    assert!(outcome.report_path.exists());
    assert!(outcome.annotated_dir.is_none());
}

#[test]
fn pipeline_stops_early_with_partial_tally() {
    let dir = tempfile::tempdir().unwrap();
    let tracks = dir.path().join("tracks.jsonl");
    write_tracks(&tracks, &SCENARIO);

    let mut options = PipelineOptions::new(&tracks);
    options.frame_height = Some(200);
    options.output_dir = dir.path().join("outputs");
    options.max_frames = Some(2);

    let outcome = Pipeline::new(CountingConfig::default(), options.clone())
        .run()
        .unwrap();
    assert!(outcome.report.cancelled);
    assert_eq!(outcome.report.frames_processed, 2);
    assert_eq!(outcome.report.tally.get(CountedCategory::Car).inbound, 1);

    options.max_frames = None;
    let pipeline = Pipeline::new(CountingConfig::default(), options);
    pipeline.stop_handle().store(true, Ordering::Relaxed);
    let outcome = pipeline.run().unwrap();
    assert!(outcome.report.cancelled);
    assert_eq!(outcome.report.frames_processed, 0);
    assert_eq!(outcome.report.tally.total(), 0);
}

#[test]
fn pipeline_requires_frame_height() {
    let dir = tempfile::tempdir().unwrap();
    let tracks = dir.path().join("tracks.jsonl");
    write_tracks(&tracks, &SCENARIO);

    let mut options = PipelineOptions::new(&tracks);
    options.output_dir = dir.path().join("outputs");
    assert!(Pipeline::new(CountingConfig::default(), options).run().is_err());
}

#[test]
fn pipeline_renders_annotated_frames() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    fs::create_dir_all(&frames).unwrap();
    for i in 1..=3u64 {
        RgbImage::from_pixel(360, 200, Rgb([90, 90, 90]))
            .save(frames.join(format!("{:06}.png", i)))
            .unwrap();
    }
    let tracks = dir.path().join("tracks.jsonl");
    write_tracks(&tracks, &SCENARIO[..3]);

    let mut options = PipelineOptions::new(&tracks);
    options.frames_dir = Some(frames);
    options.frame_ext = "png".to_string();
    options.output_dir = dir.path().join("outputs");
    options.enhance = "brightness".parse().unwrap();

    let outcome = Pipeline::new(CountingConfig::default(), options).run().unwrap();
    // 画面高度取自第一帧图片
    assert_eq!(outcome.report.frame_height, 200);
    assert_eq!(outcome.report.line_y, 100.0);

    let annotated = outcome.annotated_dir.unwrap();
    let frame2 = image::open(annotated.join("000002.png")).unwrap().to_rgb8();
    // 帧2有目标向下过线: 计数线外圈为绿色
    assert_eq!(frame2.get_pixel(350, 102), &Rgb([0, 255, 0]));
    assert_eq!(frame2.get_pixel(350, 100), &Rgb([255, 0, 0]));
    assert!(annotated.join("000003.png").exists());
}

#[test]
fn pipeline_detect_mode_skips_counting_hud() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    fs::create_dir_all(&frames).unwrap();
    for i in 1..=2u64 {
        RgbImage::from_pixel(360, 200, Rgb([90, 90, 90]))
            .save(frames.join(format!("{:06}.png", i)))
            .unwrap();
    }
    let tracks = dir.path().join("tracks.jsonl");
    write_tracks(&tracks, &[SCENARIO[0], SCENARIO[2]]);

    let mut options = PipelineOptions::new(&tracks);
    options.frames_dir = Some(frames);
    options.frame_ext = "png".to_string();
    options.output_dir = dir.path().join("outputs");
    options.hud_mode = HudMode::Detect;

    let outcome = Pipeline::new(CountingConfig::default(), options).run().unwrap();
    // 计数照常进行
    assert_eq!(outcome.report.tally.get(CountedCategory::Car).inbound, 1);

    let annotated = outcome.annotated_dir.unwrap();
    let frame2 = image::open(annotated.join("000002.png")).unwrap().to_rgb8();
    assert_eq!(frame2.get_pixel(100, 40), &Rgb([45, 45, 45]));
    assert_eq!(frame2.get_pixel(350, 100), &Rgb([90, 90, 90]));
    assert_eq!(frame2.get_pixel(350, 102), &Rgb([90, 90, 90]));
}

#[test]
fn pipeline_survives_bad_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let tracks = dir.path().join("tracks.jsonl");
    write_tracks(
        &tracks,
        &[
            r#"{"frame": 1, "detections": [{"id": 1, "label": "car", "bbox": [0, 40, 10, 60]}]}"#,
            r#"{"frame": 2, "detections": [{"id": 2, "label": "bus", "bbox": [0, null, 10, 10]}, {"id": 1, "label": "car", "bbox": [0, 140, 10, 160]}]}"#,
        ],
    );

    let mut options = PipelineOptions::new(&tracks);
    options.frame_height = Some(200);
    options.output_dir = dir.path().join("outputs");

    let outcome = Pipeline::new(CountingConfig::default(), options).run().unwrap();
    assert_eq!(outcome.report.frames_processed, 2);
    assert_eq!(outcome.report.malformed_input, 1);
    assert_eq!(outcome.report.tally.get(CountedCategory::Car).inbound, 1);
}
