use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use super::*;

#[test]
fn defaults_cover_every_setting() {
    let settings = EngineSettings::default();
    assert_eq!(settings.page_size, 20);
    assert_eq!(settings.typing_debounce(), Duration::from_millis(2000));
    assert_eq!(settings.follow_threshold_px, 150.0);
}

#[test]
fn file_then_env_overrides() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("chat_engine_config_test_{suffix}.toml"));
    fs::write(
        &path,
        "page_size = 50\nhistory_url = \"http://history.local/api\"\ntyping_debounce_ms = \"oops\"\n",
    )
    .expect("write config");

    let settings = load_settings_from(&path, |key| match key {
        "CHAT_PAGE_SIZE" => Some("30".into()),
        "APP__RELAY_URL" => Some("wss://relay.local".into()),
        _ => None,
    });

    assert_eq!(settings.page_size, 30);
    assert_eq!(settings.history_url, "http://history.local/api");
    assert_eq!(settings.relay_url, "wss://relay.local");
    assert_eq!(settings.typing_debounce_ms, 2000);

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn missing_file_yields_defaults() {
    let settings = load_settings_from(Path::new("/nonexistent/chat.toml"), |_| None);
    assert_eq!(settings, EngineSettings::default());
}
