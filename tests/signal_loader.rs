mod support;

use bearing_diag::ErrorKind;
use bearing_diag::cache::DiagnosticsCache;
use bearing_diag::dataset::build_from_signal;
use bearing_diag::pipeline::{PipelineContext, render_preview};
use bearing_diag::signal::{SignalLoader, list_channels, recordings_in};

use support::mat::{synthetic_signal, write_mat, write_recording};

#[test]
fn loads_drive_end_channel_in_full() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("IR007_0.mat");
    write_recording(&path, 1, 3_000);

    let signal = SignalLoader::new("DE").unwrap().load(&path).unwrap();
    assert_eq!(signal.label(), "IR007_0");
    assert_eq!(signal.len(), 3_000);
    let expected = synthetic_signal(1, 3_000);
    assert!((signal.values()[10] - expected[10] as f32).abs() < 1e-6);

    let channels = list_channels(&path).unwrap();
    let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["XIR007_0_FE_time", "XIR007_0_DE_time", "X097RPM"]);
}

#[test]
fn preview_returns_leading_points() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Normal_0.mat");
    write_recording(&path, 0, 4_000);
    let loader = SignalLoader::new("DE").unwrap();
    let preview = loader.preview(&path, 2_500).unwrap();
    assert_eq!(preview.len(), 2_500);
    assert_eq!(preview[..], loader.load(&path).unwrap().values()[..2_500]);
    assert_eq!(loader.preview(&path, 10_000).unwrap().len(), 4_000);
}

#[test]
fn missing_or_empty_channel_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let fan_only = dir.path().join("fan.mat");
    write_mat(&fan_only, &[("X100_FE_time", vec![0.1, 0.2])]);
    let err = SignalLoader::new("DE").unwrap().load(&fan_only).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);

    let empty = dir.path().join("empty.mat");
    write_mat(&empty, &[("X100_DE_time", Vec::new())]);
    assert_eq!(
        SignalLoader::new("DE").unwrap().load(&empty).unwrap_err().kind(),
        ErrorKind::Format
    );

    let junk = dir.path().join("junk.mat");
    std::fs::write(&junk, b"definitely not a matlab file").unwrap();
    assert_eq!(
        SignalLoader::new("DE").unwrap().load(&junk).unwrap_err().kind(),
        ErrorKind::Format
    );
}

#[test]
fn custom_marker_selects_other_channel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("B007_0.mat");
    write_recording(&path, 2, 1_000);
    let fan = SignalLoader::new("FE").unwrap().load(&path).unwrap();
    let drive = SignalLoader::new("DE").unwrap().load(&path).unwrap();
    assert!((fan.values()[5] + drive.values()[5] * 0.3).abs() < 1e-5);
}

#[test]
fn recordings_are_sorted_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    write_recording(&dir.path().join("b.mat"), 0, 600);
    write_recording(&dir.path().join("a.MAT"), 1, 600);
    std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    let found = recordings_in(dir.path()).unwrap();
    let names: Vec<_> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a.MAT", "b.mat"]);
}

#[test]
fn diagnosis_windows_need_enough_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.mat");
    write_recording(&path, 0, 998);
    let signal = SignalLoader::new("DE").unwrap().load(&path).unwrap();
    let err = build_from_signal(&signal, 500, 500).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientData);

    write_recording(&path, 0, 999);
    let signal = SignalLoader::new("DE").unwrap().load(&path).unwrap();
    let windows = build_from_signal(&signal, 500, 500).unwrap();
    assert_eq!(windows.len(), 500);
    assert!(windows.iter().all(|w| w.len() == 500));
}

#[test]
fn preview_image_lands_in_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("OR007_0.mat");
    write_recording(&path, 3, 3_000);
    let ctx = PipelineContext::new(
        SignalLoader::new("DE").unwrap(),
        DiagnosticsCache::new(dir.path().join("cache")),
        2_500,
    );

    let image_path = render_preview(&ctx, &path).unwrap();
    assert_eq!(image_path, dir.path().join("cache").join("OR007_0.png"));
    let image = image::open(&image_path).unwrap();
    assert_eq!(image.width(), bearing_diag::plots::PLOT_WIDTH * 2);
}
