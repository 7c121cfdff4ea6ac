use fleet_admin::config::Config;
use std::path::PathBuf;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.agent.port, 8182);
    assert_eq!(cfg.screen.target_port, 5935);
    assert_eq!(cfg.paths.templates_dir(), PathBuf::from("./templates"));
}

#[test]
fn test_config_listen_override_from_env() {
    // Only this test touches the environment.
    unsafe {
        std::env::remove_var("ADMIN_CONFIG");
        std::env::set_var("LISTEN", "0.0.0.0:3000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    unsafe {
        std::env::remove_var("LISTEN");
    }
}

#[test]
fn test_config_from_yaml_partial() {
    let cfg = Config::from_yaml_str(
        r#"
paths:
  data_dir: /usr/share/fleet-admin
  profiles_dir: /var/lib/fleet-admin/profiles
agent:
  request_timeout_ms: 1500
"#,
    )
    .unwrap();

    assert_eq!(cfg.paths.static_dir(), PathBuf::from("/usr/share/fleet-admin/static"));
    assert_eq!(cfg.paths.profiles_dir, PathBuf::from("/var/lib/fleet-admin/profiles"));
    assert_eq!(cfg.agent.request_timeout().as_millis(), 1500);
    // untouched sections keep their defaults
    assert_eq!(cfg.agent.port, 8182);
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
}

#[test]
fn test_config_rejects_invalid_yaml() {
    assert!(Config::from_yaml_str("agent: [not, a, map]").is_err());
}
