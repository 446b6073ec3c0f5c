#[cfg(test)]
mod tests {
    use crate::config::{self, AppConfig};
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;

    // config::load reads process-wide environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_temp_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert!(config.database.url.starts_with("postgres://"));
        assert!(config.database.bootstrap_schema);
        assert_eq!(config.auth.view_role, "mds-mine-view");
        assert_eq!(config.auth.create_role, "mds-mine-create");
        assert_eq!(config.search.min_term_length, 3);
        assert_eq!(config.search.max_results_per_type, 5);
        assert_eq!(config.search.single_type_max_results, 50);
        assert_eq!(config.search.simple_max_results, 10);
        assert!(config.search.column_limit.is_none());
        assert_eq!(config.activity.window_days, 30);
        assert_eq!(config.activity.max_workers, 50);
        assert!(config.security.is_none());
        assert!(config::validate(&config).is_ok());
    }

    #[test]
    fn test_pool_size_bounds() {
        let mut config = AppConfig::default();
        let derived = config.database.pool_size();
        assert!((4..=64).contains(&derived));
        config.database.max_connections = Some(7);
        assert_eq!(config.database.pool_size(), 7);
    }

    #[test]
    fn test_load_with_file_and_env_layers() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_temp_config(
            r#"
            [server]
            port = 6100

            [search]
            max_results_per_type = 8
            column_limit = 200
            "#,
        );
        env::set_var("MDS_CONFIG", file.path());
        env::set_var("MDS__SERVER__HOST", "0.0.0.0");
        env::set_var("MDS__ACTIVITY__WINDOW_DAYS", "14");

        let result = config::load();

        env::remove_var("MDS_CONFIG");
        env::remove_var("MDS__SERVER__HOST");
        env::remove_var("MDS__ACTIVITY__WINDOW_DAYS");

        let config = result.unwrap();
        assert_eq!(config.server.port, 6100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.search.max_results_per_type, 8);
        assert_eq!(config.search.column_limit, Some(200));
        assert_eq!(config.search.single_type_max_results, 50);
        assert_eq!(config.activity.window_days, 14);
    }

    #[test]
    fn test_env_overrides_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let file = write_temp_config("[server]\nport = 6200\n");
        env::set_var("MDS_CONFIG", file.path());
        env::set_var("MDS__SERVER__PORT", "6300");

        let result = config::load();

        env::remove_var("MDS_CONFIG");
        env::remove_var("MDS__SERVER__PORT");
        assert_eq!(result.unwrap().server.port, 6300);
    }

    #[test]
    fn test_invalid_server_port() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("MDS__SERVER__PORT", "0");
        let result = config::load();
        env::remove_var("MDS__SERVER__PORT");

        assert!(result.unwrap_err().to_string().contains("invalid server.port"));
    }

    #[test]
    fn test_validate_rejects_impossible_values() {
        let mut config = AppConfig::default();
        config.activity.max_workers = 0;
        assert!(config::validate(&config).is_err());
        config.activity.max_workers = 257;
        assert!(config::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.activity.window_days = 0;
        assert!(config::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.search.min_term_length = 0;
        assert!(config::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.auth.secret = None;
        assert!(config::validate(&config).unwrap_err().to_string().contains("auth.secret"));

        let mut config = AppConfig::default();
        config.auth.algorithm = "RS256".to_string();
        assert!(config::validate(&config).unwrap_err().to_string().contains("public_key_pem"));

        let mut config = AppConfig::default();
        config.auth.view_role = "  ".to_string();
        assert!(config::validate(&config).unwrap_err().to_string().contains("auth.view_role"));

        let mut config = AppConfig::default();
        config.database.url = "sqlite://data/mds.db".to_string();
        assert!(config::validate(&config).is_err());
    }
}
