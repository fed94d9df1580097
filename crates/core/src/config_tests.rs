// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn write_config(dir: &tempfile::TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("prox.toml");
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn load_fills_process_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
            [processes.web]
            command = "python -m http.server 8000"

            [processes.worker]
            command = "sleep 100"
        "#,
    );

    let config = Config::load(&path).unwrap();
    assert_eq!(config.processes["web"].name, "web");
    assert_eq!(config.processes["worker"].name, "worker");
    assert!(config.path.is_absolute());
}

#[test]
fn load_rejects_empty_command() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
            [processes.bad]
            command = "   "
        "#,
    );

    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::EmptyCommand(name) if name == "bad"));
}

#[test]
fn load_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
            [processes.web]
            command = "true"
            commandd = "typo"
        "#,
    );

    assert!(matches!(Config::load(&path), Err(ConfigError::Parse(..))));
}

#[test]
fn health_defaults_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
            [processes.web]
            command = "true"

            [processes.web.health]
            command = "curl -fsS localhost:8000/healthz"
        "#,
    );

    let config = Config::load(&path).unwrap();
    let health = config.processes["web"].health.as_ref().unwrap();
    assert_eq!(health.interval, 10);
    assert_eq!(health.timeout, 5);
    assert_eq!(health.retries, 3);
}

#[test]
fn merged_env_inline_wins() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("global.env"), "SHARED=global\nGLOBAL_ONLY=1\n").unwrap();
    std::fs::write(dir.path().join("web.env"), "SHARED=file\nFILE_ONLY=1\n").unwrap();
    let path = write_config(
        &dir,
        r#"
            env_file = "global.env"

            [processes.web]
            command = "true"
            env_file = "web.env"
            env = { SHARED = "inline" }
        "#,
    );

    let config = Config::load(&path).unwrap();
    let env = config.merged_env(&config.processes["web"]).unwrap();
    assert_eq!(env["SHARED"], "inline");
    assert_eq!(env["GLOBAL_ONLY"], "1");
    assert_eq!(env["FILE_ONLY"], "1");
}

#[test]
fn env_file_parses_quotes_and_comments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vars.env");
    std::fs::write(
        &path,
        "# comment\n\nPLAIN=a\nDOUBLE=\"b c\"\nSINGLE='d'\nSPACED = e \n",
    )
    .unwrap();

    let vars = parse_env_file(&path).unwrap();
    assert_eq!(vars["PLAIN"], "a");
    assert_eq!(vars["DOUBLE"], "b c");
    assert_eq!(vars["SINGLE"], "d");
    assert_eq!(vars["SPACED"], "e");
}

#[test]
fn env_file_rejects_missing_equals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vars.env");
    std::fs::write(&path, "NOT A VAR\n").unwrap();

    let err = parse_env_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::EnvFile { line: 1, .. }));
}

#[test]
fn proxy_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
            [proxy]
            domain = "local.dev"
            cert_file = "cert.pem"
            key_file = "key.pem"

            [proxy.services.web]
            port = 8000
        "#,
    );

    let config = Config::load(&path).unwrap();
    let proxy = config.proxy.unwrap();
    assert_eq!(proxy.https_port, 443);
    assert_eq!(proxy.services["web"].host, "127.0.0.1");
    assert!(!proxy.capture);
    assert_eq!(proxy.max_body_bytes, 1024 * 1024);
}
