//! Integration tests for bucket-cache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn bucket_cache(config: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("bucket-cache");
        cmd.env_remove("BUCKET_CACHE_BUCKET")
            .env_remove("BUCKET_CACHE_REFRESH_AFTER_SECS")
            .env_remove("STORAGE_EMULATOR_HOST")
            .env("BUCKET_CACHE_CONFIG", config);
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        bucket_cache(&temp.path().join("config.toml"))
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("remote build-artifact cache"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        bucket_cache(&temp.path().join("config.toml"))
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("bucket-cache"));
    }

    #[test]
    fn hash_prints_sha256() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("artifact.bin");
        std::fs::write(&file, b"hello").unwrap();

        bucket_cache(&temp.path().join("config.toml"))
            .arg("hash")
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            ));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        bucket_cache(&temp.path().join("custom.toml"))
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_applies_overrides() {
        let temp = TempDir::new().unwrap();
        bucket_cache(&temp.path().join("config.toml"))
            .args(["--bucket", "cache-1", "--refresh-after", "3600", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("name = \"cache-1\""))
            .stdout(predicate::str::contains("refresh_after_secs = 3600"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        bucket_cache(&path)
            .args(["config", "init"])
            .assert()
            .success();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[bucket]"));
    }

    #[test]
    fn put_without_bucket_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        bucket_cache(&temp.path().join("config.toml"))
            .args(["put", "abc123"])
            .write_stdin("payload")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No bucket configured"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn get_rejects_invalid_key() {
        let temp = TempDir::new().unwrap();
        bucket_cache(&temp.path().join("config.toml"))
            .args(["--bucket", "cache-1", "get", "../etc/passwd?"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache key"));
    }

    #[test]
    fn check_unreachable_store_is_transport_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[bucket]
name = "cache-1"

[gcs]
endpoint = "http://127.0.0.1:9"
anonymous = true
timeout_secs = 5
"#,
        )
        .unwrap();

        bucket_cache(&path)
            .arg("check")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Transport error"));
    }

    #[test]
    fn log_format_comes_from_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[general]\nlog_format = \"json\"\n").unwrap();

        bucket_cache(&path)
            .args(["-v", "config", "init", "--force"])
            .assert()
            .success()
            .stderr(predicate::str::contains("\"level\":\"INFO\""))
            .stderr(predicate::str::contains("Configuration saved"));
    }

    #[test]
    fn log_format_flag_beats_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[general]\nlog_format = \"json\"\n").unwrap();

        bucket_cache(&path)
            .args(["-v", "--log-format", "text", "config", "init", "--force"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Configuration saved"))
            .stderr(predicate::str::contains("\"level\"").not());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn check_reports_connected_bucket() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cache-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"name":"cache-1"}"#),
            )
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(
            &config,
            format!(
                "[bucket]\nname = \"cache-1\"\nrefresh_after_secs = 3600\n\n[gcs]\nendpoint = \"{}\"\nanonymous = true\n",
                server.uri()
            ),
        )
        .unwrap();

        bucket_cache(&config)
            .arg("check")
            .assert()
            .success()
            .stdout(predicate::str::contains("Connected to bucket cache-1"))
            .stdout(predicate::str::contains("(connection").not())
            .stdout(predicate::str::contains("older than 3600s (blocking)"));
    }
}

mod client_tests {
    use bucket_cache::clock::{Clock, ManualClock};
    use bucket_cache::config::{BucketConfig, RefreshMode};
    use bucket_cache::store::MemoryStore;
    use bucket_cache::{CacheClient, CacheKey};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn refresh_keeps_live_artifact_young() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        let store = MemoryStore::with_clock(Arc::new(clock.clone()));
        store.create_bucket("cache-1").await;

        let config = BucketConfig {
            name: "cache-1".to_string(),
            refresh_after_secs: 3600,
            refresh_mode: RefreshMode::Blocking,
        };
        let client =
            CacheClient::connect_with_clock(Arc::new(store.clone()), &config, Arc::new(clock.clone()))
                .await
                .unwrap();
        let key = CacheKey::parse("abc123").unwrap();

        client.store(&key, &[0x01, 0x02, 0x03]).await.unwrap();

        let entry = client.load(&key).await.unwrap().unwrap();
        assert_eq!(entry.payload, vec![0x01, 0x02, 0x03]);
        assert_eq!(store.put_count().await, 1);

        clock.advance(Duration::seconds(4000));
        let entry = client.load(&key).await.unwrap().unwrap();
        assert_eq!(entry.payload, vec![0x01, 0x02, 0x03]);
        assert_eq!(store.put_count().await, 2);

        let obj = store.object("cache-1", "abc123").await.unwrap();
        assert_eq!(obj.created_at, clock.now());

        client.close().await.unwrap();
    }
}
