use std::{fs, path::PathBuf};

use crate::config::{load_settings_from, Settings};

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "photowall-config-{tag}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn settings_trim_and_strip_trailing_slash() {
    let settings = Settings::new("  https://api.example.com/  ", " key-123 ").expect("valid");
    assert_eq!(settings.api_url, "https://api.example.com");
    assert_eq!(settings.api_key, "key-123");
}

#[test]
fn empty_url_is_rejected() {
    assert!(Settings::new("", "key").is_err());
}

#[test]
fn empty_key_is_rejected() {
    assert!(Settings::new("https://api.example.com", "   ").is_err());
}

#[test]
fn non_http_scheme_is_rejected() {
    assert!(Settings::new("ftp://api.example.com", "key").is_err());
}

#[test]
fn garbage_url_is_rejected() {
    assert!(Settings::new("not a url", "key").is_err());
}

#[test]
fn settings_load_from_a_toml_file() {
    let dir = temp_dir("file");
    let path = dir.join("photowall.toml");
    fs::write(
        &path,
        "api_url = \"https://files.example.com\"\napi_key = \"file-key\"\n",
    )
    .expect("write config");

    let settings = load_settings_from(&path).expect("load");
    assert_eq!(settings.api_url, "https://files.example.com");
    assert_eq!(settings.api_key, "file-key");

    fs::remove_dir_all(dir).ok();
}

#[test]
fn missing_file_without_env_fails() {
    let dir = temp_dir("missing");
    let path = dir.join("photowall.toml");
    // only valid when the process environment does not provide the values
    if std::env::var("PHOTOWALL_API_URL").is_err() && std::env::var("PHOTOWALL_API_KEY").is_err() {
        assert!(load_settings_from(&path).is_err());
    }
    fs::remove_dir_all(dir).ok();
}

#[test]
fn malformed_file_is_an_error() {
    let dir = temp_dir("malformed");
    let path = dir.join("photowall.toml");
    fs::write(&path, "api_url = [not toml").expect("write config");
    assert!(load_settings_from(&path).is_err());
    fs::remove_dir_all(dir).ok();
}
