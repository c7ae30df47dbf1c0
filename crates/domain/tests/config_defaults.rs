use ms_domain::config::Config;

#[test]
fn default_poll_interval_is_15s() {
    let config = Config::default();
    assert_eq!(config.calendar.poll_seconds, 15);
}

#[test]
fn explicit_sections_parse() {
    let toml_str = r#"
[calendar]
calendar_id = "team@example.com"
poll_seconds = 30

[notetaker]
bot_name = "Scribe"
max_entry_denials = 2

[pipeline]
max_chars = 1500
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.calendar.calendar_id, "team@example.com");
    assert_eq!(config.calendar.poll_seconds, 30);
    assert_eq!(config.notetaker.bot_name, "Scribe");
    assert_eq!(config.notetaker.max_entry_denials, 2);
    assert_eq!(config.pipeline.max_chars, 1500);
    // Untouched sections keep their defaults.
    assert_eq!(config.notetaker.max_kicks, 3);
    assert_eq!(config.pipeline.overlap_chars, 200);
}

#[test]
fn supervisor_defaults_match_policy() {
    let config = Config::default();
    assert_eq!(config.notetaker.waiting_room_timeout_seconds, 300);
    assert_eq!(config.notetaker.reconnect_interval_seconds, 30);
    assert_eq!(config.notetaker.max_overrun_seconds, 1800);
    assert_eq!(config.notetaker.event_end_grace_seconds, 900);
}
