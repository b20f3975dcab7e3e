use memory_globe::catalog::{MediaCatalog, MediaKind, DEFAULT_VIDEO_EXTENSIONS};
use memory_globe::cli::CliOverrides;
use memory_globe::config::AppConfig;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn catalog_loads_from_json_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("catalog.json");
    std::fs::write(
        &path,
        r#"{ "media": ["photos/a.jpg", "photos/b.png", "clips/c.mp4", "photos/a.jpg", "  "] }"#,
    )
    .expect("write catalog");

    let catalog = MediaCatalog::load(&path, &DEFAULT_VIDEO_EXTENSIONS).expect("load catalog");
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.images().count(), 2);
    assert_eq!(catalog.videos().count(), 1);
    assert_eq!(catalog.get(2).map(|media| media.kind()), Some(MediaKind::Video));

    let slots: Vec<&str> = catalog.slots(5).into_iter().map(|media| media.uri()).collect();
    assert_eq!(slots, ["photos/a.jpg", "photos/b.png", "clips/c.mp4", "photos/a.jpg", "photos/b.png"]);
}

#[test]
fn unreadable_catalog_falls_back_to_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, "{ not json").expect("write catalog");
    assert!(MediaCatalog::load(&path, &DEFAULT_VIDEO_EXTENSIONS).is_err());
    assert!(MediaCatalog::load_or_default(&path, &DEFAULT_VIDEO_EXTENSIONS).is_empty());
    assert!(MediaCatalog::load_or_default(dir.path().join("missing.json"), &DEFAULT_VIDEO_EXTENSIONS).is_empty());
}

#[test]
fn partial_config_keeps_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("globe.json");
    std::fs::write(
        &path,
        r#"{ "globe": { "tile_count": 12 }, "loading": { "video_ready_timeout_ms": 2500 } }"#,
    )
    .expect("write config");

    let config = AppConfig::load(&path).expect("load config");
    assert_eq!(config.globe.tile_count, 12);
    assert_eq!(config.loading.video_ready_timeout(), Duration::from_millis(2500));
    assert_eq!(config.loading.global_ready_timeout(), Duration::from_secs(12));
    assert_eq!(config.window.title, "Memory Globe");
    assert!(config.media.autoplay);
}

#[test]
fn invalid_values_are_sanitized() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("globe.json");
    std::fs::write(
        &path,
        r#"{ "globe": { "radius": -4.0 }, "camera": { "near": 10.0, "far": 1.0 }, "loading": { "global_ready_timeout_ms": 0 } }"#,
    )
    .expect("write config");

    let config = AppConfig::load(&path).expect("load config");
    let defaults = AppConfig::default();
    assert_eq!(config.globe.radius, defaults.globe.radius);
    assert!(config.camera.far > config.camera.near);
    assert_eq!(config.loading.global_ready_timeout(), defaults.loading.global_ready_timeout());
}

#[test]
fn command_line_overrides_win_over_file() {
    let mut config = AppConfig::default();
    let cli = CliOverrides::parse(["globe", "--tiles", "8", "--width", "800", "--media-root", "/srv/media"])
        .expect("parse flags");
    config.apply_overrides(&cli.into_config_overrides());
    assert_eq!(config.globe.tile_count, 8);
    assert_eq!(config.window.width, 800);
    assert_eq!(config.window.height, 720);
    assert_eq!(config.media.root, PathBuf::from("/srv/media"));
}

#[test]
fn shipped_catalog_points_at_shipped_media() {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = AppConfig::load(manifest.join("config/globe.json")).expect("load shipped config");
    let catalog = MediaCatalog::load(manifest.join(&config.media.catalog), &config.media.video_extensions)
        .expect("load shipped catalog");
    assert!(!catalog.is_empty());
    assert_eq!(catalog.videos().count(), 2);
    for media in catalog.iter() {
        let path = manifest.join(&config.media.root).join(media.uri());
        assert!(path.is_file(), "catalog entry {} has no file at {}", media.uri(), path.display());
    }
}
