use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// Create tables, extensions and code-table seeds on startup.
    #[serde(default = "default_true")]
    pub bootstrap_schema: bool,
}

impl DatabaseConfig {
    pub fn pool_size(&self) -> u32 {
        self.max_connections.unwrap_or_else(|| (num_cpus::get() as u32 * 4).clamp(4, 64))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// "HS256" (shared secret) or "RS256" (realm public key).
    pub algorithm: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    pub view_role: String,
    pub create_role: String,
    pub admin_role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub min_term_length: usize,
    pub max_results_per_type: usize,
    pub single_type_max_results: usize,
    pub simple_max_results: usize,
    /// Row cap per searched column; unlimited when unset.
    #[serde(default)]
    pub column_limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    pub window_days: i64,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub search_max_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub search: SearchConfig,
    pub activity: ActivityConfig,
    pub rate_limit: RateLimitConfig,
    pub security: Option<SecurityConfig>,
}

fn default_true() -> bool {
    true
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // The embedded defaults are part of the binary; failing to parse them is a build defect.
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
        {
            Ok(app_cfg) => app_cfg,
            Err(e) => {
                eprintln!("FATAL: Failed to load embedded default config: {}", e);
                panic!("Failed to load embedded default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        .add_source(::config::File::with_name("mds").required(false));

    if let Ok(custom_path) = std::env::var("MDS_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("MDS").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    if !cfg.database.url.starts_with("postgres://") && !cfg.database.url.starts_with("postgresql://") {
        return Err(anyhow::anyhow!("database.url must be a postgres:// URL"));
    }
    if cfg.database.max_connections == Some(0) {
        return Err(anyhow::anyhow!("database.max_connections must be > 0 when set"));
    }

    match cfg.auth.algorithm.as_str() {
        "HS256" => {
            if cfg.auth.secret.as_deref().map_or(true, |s| s.is_empty()) {
                return Err(anyhow::anyhow!("auth.secret is required for HS256"));
            }
        }
        "RS256" => {
            if cfg.auth.public_key_pem.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(anyhow::anyhow!("auth.public_key_pem is required for RS256"));
            }
        }
        other => return Err(anyhow::anyhow!("unsupported auth.algorithm: {}", other)),
    }
    for (key, role) in [
        ("auth.view_role", &cfg.auth.view_role),
        ("auth.create_role", &cfg.auth.create_role),
        ("auth.admin_role", &cfg.auth.admin_role),
    ] {
        if role.trim().is_empty() {
            return Err(anyhow::anyhow!("{} must not be empty", key));
        }
    }

    if cfg.search.min_term_length == 0 {
        return Err(anyhow::anyhow!("search.min_term_length must be > 0"));
    }
    if cfg.search.max_results_per_type == 0 || cfg.search.single_type_max_results == 0 {
        return Err(anyhow::anyhow!("search result caps must be > 0"));
    }
    if let Some(limit) = cfg.search.column_limit {
        if limit <= 0 {
            return Err(anyhow::anyhow!("search.column_limit must be > 0 when set"));
        }
    }

    if cfg.activity.window_days <= 0 {
        return Err(anyhow::anyhow!("activity.window_days must be > 0"));
    }
    if cfg.activity.max_workers == 0 || cfg.activity.max_workers > 256 {
        return Err(anyhow::anyhow!("activity.max_workers must be in 1..=256"));
    }

    if cfg.rate_limit.max_requests == 0 || cfg.rate_limit.window_seconds == 0 {
        return Err(anyhow::anyhow!("rate_limit.max_requests and rate_limit.window_seconds must be > 0"));
    }

    Ok(())
}
