//! Configuration loading and precedence tests

use lime_config::{ConfigError, ConfigFile, ConfigLoader, LogFormat};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Loader whose global layer is `global.toml` in `dir` (absent unless written)
fn loader_in(dir: &Path) -> ConfigLoader {
    ConfigLoader::with_global_config_path(dir.join("global.toml"))
}

// ============================================================================
// Layering
// ============================================================================

#[test]
#[serial]
fn test_no_files_gives_defaults() {
    let temp_dir = TempDir::new().unwrap();

    let config = loader_in(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(!config.is_project());
    assert_eq!(config.compression(), "deflate");
    assert_eq!(config.compression_level(), 6);
    assert_eq!(config.trigger_timeout(), Duration::from_secs(30));
    assert_eq!(config.log_format(), LogFormat::Text);
}

#[test]
#[serial]
fn test_global_config_applies_without_project() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "global.toml",
        r#"
[engine]
root = "/srv/root"
"#,
    );

    let config = loader_in(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(config.root(), PathBuf::from("/srv/root"));
    assert_eq!(
        config.status_file(),
        PathBuf::from("/srv/root/var/lib/lime/status.yaml")
    );
}

#[test]
#[serial]
fn test_project_overrides_global() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "global.toml",
        r#"
[archive]
compression = "none"
level = 9

[logging]
level = "warn"
"#,
    );
    let project = temp_dir.path().join("project");
    write(
        &project,
        "lime.toml",
        r#"
[archive]
level = 2
"#,
    );

    let config = loader_in(temp_dir.path())
        .load_from_directory(&project)
        .unwrap();

    assert_eq!(config.compression(), "none");
    assert_eq!(config.compression_level(), 2);
    assert_eq!(config.log_level(), "warn");
    assert_eq!(config.project_root(), Some(project.as_path()));
}

#[test]
#[serial]
fn test_env_overrides_project() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "lime.toml",
        r#"
[engine]
trigger_timeout_ms = 1000

[logging]
level = "info"
"#,
    );

    env::set_var("LIME_TRIGGER_TIMEOUT_MS", "250");
    env::set_var("LIME_LOG", "lime_package=trace");
    env::set_var("LIME_ROOT", "/mnt/target");

    let result = loader_in(temp_dir.path()).load_from_directory(temp_dir.path());

    env::remove_var("LIME_TRIGGER_TIMEOUT_MS");
    env::remove_var("LIME_LOG");
    env::remove_var("LIME_ROOT");

    let config = result.unwrap();
    assert_eq!(config.trigger_timeout(), Duration::from_millis(250));
    assert_eq!(config.log_level(), "lime_package=trace");
    assert_eq!(config.root(), PathBuf::from("/mnt/target"));
}

#[test]
#[serial]
fn test_env_level_out_of_range() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("LIME_COMPRESSION_LEVEL", "12");
    let result = loader_in(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("LIME_COMPRESSION_LEVEL");

    assert!(matches!(
        result,
        Err(ConfigError::InvalidValue { ref field, .. }) if field == "LIME_COMPRESSION_LEVEL"
    ));
}

#[test]
#[serial]
fn test_env_zero_timeout_rejected() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("LIME_TRIGGER_TIMEOUT_MS", "0");
    let result = loader_in(temp_dir.path()).load_from_directory(temp_dir.path());
    env::remove_var("LIME_TRIGGER_TIMEOUT_MS");

    assert!(result.is_err());
}

// ============================================================================
// Files
// ============================================================================

#[test]
#[serial]
fn test_load_from_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        temp_dir.path(),
        "custom/lime.toml",
        r#"
[logging]
format = "json"
"#,
    );

    let config = loader_in(temp_dir.path()).load_from_file(&path).unwrap();

    assert_eq!(config.log_format(), LogFormat::Json);
    assert_eq!(
        config.project_root(),
        Some(temp_dir.path().join("custom").as_path())
    );
}

#[test]
#[serial]
fn test_missing_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    assert!(matches!(
        loader_in(temp_dir.path()).load_from_file(&missing),
        Err(ConfigError::NotFound(ref path)) if path == &missing
    ));
}

#[test]
#[serial]
fn test_invalid_toml_names_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(temp_dir.path(), "lime.toml", "[archive\ncompression = ");

    match loader_in(temp_dir.path()).load_from_directory(temp_dir.path()) {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("expected TomlParseError, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_unknown_section_rejected() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "lime.toml",
        r#"
[registry]
url = "https://example.invalid"
"#,
    );

    assert!(loader_in(temp_dir.path())
        .load_from_directory(temp_dir.path())
        .is_err());
}

#[test]
fn test_config_file_toml_output_reloads() {
    let temp_dir = TempDir::new().unwrap();
    let original: ConfigFile = toml::from_str(
        r#"
[archive]
compression = "deflate"
level = 4

[engine]
trigger_timeout_ms = 9000
"#,
    )
    .unwrap();

    let path = write(temp_dir.path(), "lime.toml", &original.to_toml().unwrap());
    assert_eq!(ConfigFile::load_from_file(&path).unwrap(), original);
}
