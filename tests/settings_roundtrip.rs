mod support;

use bearing_diag::app_dirs::APP_DIR_NAME;
use bearing_diag::config::{self, AppSettings, CONFIG_FILE_NAME};

use support::diag_env::DiagEnvGuard;

#[test]
fn settings_live_under_the_configured_home() {
    let home = tempfile::tempdir().unwrap();
    let _env = DiagEnvGuard::set_config_home(home.path().to_path_buf());

    let root = home.path().join(APP_DIR_NAME);
    assert_eq!(config::config_path().unwrap(), root.join(CONFIG_FILE_NAME));
    assert_eq!(config::load_or_default().unwrap(), AppSettings::default());
    assert_eq!(
        AppSettings::default().resolved_cache_dir().unwrap(),
        root.join("cache")
    );

    let settings = AppSettings {
        seed: 7,
        drive_end_marker: "FE".into(),
        clear_cache_on_exit: false,
        ..AppSettings::default()
    };
    config::save(&settings).unwrap();
    assert!(root.join(CONFIG_FILE_NAME).is_file());
    assert_eq!(config::load_or_default().unwrap(), settings);
}

#[test]
fn blank_fields_fall_back_to_defaults() {
    let home = tempfile::tempdir().unwrap();
    let _env = DiagEnvGuard::set_config_home(home.path().to_path_buf());

    let path = config::config_path().unwrap();
    std::fs::write(&path, "drive_end_marker = \"  \"\npreview_points = 0\n").unwrap();
    let loaded = config::load_or_default().unwrap();
    assert_eq!(loaded.drive_end_marker, "DE");
    assert_eq!(loaded.preview_points, config::DEFAULT_PREVIEW_POINTS);
}
