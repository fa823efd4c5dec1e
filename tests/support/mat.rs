use std::path::{Path, PathBuf};

const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;

fn push_tag(out: &mut Vec<u8>, data_type: u32, len: usize) {
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

fn pad8(out: &mut Vec<u8>) {
    while out.len() % 8 != 0 {
        out.push(0);
    }
}

fn matrix_element(name: &str, values: &[f64]) -> Vec<u8> {
    let mut body = Vec::new();
    push_tag(&mut body, MI_UINT32, 8);
    body.extend_from_slice(&MX_DOUBLE_CLASS.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());

    push_tag(&mut body, MI_INT32, 8);
    body.extend_from_slice(&(values.len() as i32).to_le_bytes());
    body.extend_from_slice(&1i32.to_le_bytes());

    push_tag(&mut body, MI_INT8, name.len());
    body.extend_from_slice(name.as_bytes());
    pad8(&mut body);

    push_tag(&mut body, MI_DOUBLE, values.len() * 8);
    for value in values {
        body.extend_from_slice(&value.to_le_bytes());
    }
    pad8(&mut body);

    let mut element = Vec::with_capacity(body.len() + 8);
    push_tag(&mut element, MI_MATRIX, body.len());
    element.extend_from_slice(&body);
    element
}

/// Write an uncompressed level-5 MAT-file holding column vectors of doubles.
pub fn write_mat(path: &Path, channels: &[(&str, Vec<f64>)]) {
    let mut bytes = Vec::new();
    let mut text = b"MATLAB 5.0 MAT-file, Platform: test, Created by: bearing-diag tests".to_vec();
    text.resize(116, b' ');
    bytes.extend_from_slice(&text);
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(&0x0100u16.to_le_bytes());
    bytes.extend_from_slice(b"IM");
    for (name, values) in channels {
        bytes.extend_from_slice(&matrix_element(name, values));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create mat parent dirs");
    }
    std::fs::write(path, bytes).expect("write mat file");
}

/// Deterministic vibration-like signal whose character depends on `class`.
pub fn synthetic_signal(class: usize, len: usize) -> Vec<f64> {
    let base = 0.05 + 0.07 * class as f64;
    let impulse_every = 97 + 41 * class;
    (0..len)
        .map(|i| {
            let t = i as f64;
            let tone = (t * base).sin() * (1.0 + class as f64 * 0.5);
            let hiss = (t * 12.9898).sin() * 43758.5453;
            let hiss = (hiss - hiss.floor() - 0.5) * 0.2;
            let impulse = if class > 0 && i % impulse_every < 3 {
                2.5 * class as f64
            } else {
                0.0
            };
            tone + hiss + impulse
        })
        .collect()
}

/// One recording per class with a drive-end channel and a decoy fan-end channel.
pub fn write_recording(path: &Path, class: usize, len: usize) {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("X000")
        .to_string();
    let values = synthetic_signal(class, len);
    let decoy: Vec<f64> = values.iter().map(|v| -v * 0.3).collect();
    let fan_end = format!("X{stem}_FE_time");
    let drive_end = format!("X{stem}_DE_time");
    write_mat(
        path,
        &[
            (fan_end.as_str(), decoy),
            (drive_end.as_str(), values),
            ("X097RPM", vec![1797.0]),
        ],
    );
}

/// Write `classes.len()` recordings of `len` samples into `dir`.
pub fn write_dataset(dir: &Path, classes: &[&str], len: usize) -> PathBuf {
    for (idx, class) in classes.iter().enumerate() {
        write_recording(&dir.join(format!("{class}.mat")), idx, len);
    }
    dir.to_path_buf()
}
