use clap::Parser;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum StorageKind {
    Sled,
    Postgres,
}

/// Daemon configuration, layered env-var-first (matching the ambient
/// convention of `DatabaseConfig::from_env`) with CLI flags overriding
/// the environment.
#[derive(Debug, Parser)]
#[command(name = "kestreld", about = "Kestrel plugin-first kernel daemon")]
pub struct DaemonConfig {
    #[arg(long, env = "KESTREL_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    #[arg(long, env = "KESTREL_PLUGIN_ROOT", default_value = "/data/kestrel/plugins")]
    pub plugin_root: String,

    #[arg(long, value_enum, env = "KESTREL_STORAGE_KIND", default_value = "sled")]
    pub storage_kind: StorageKind,

    #[arg(long, env = "KESTREL_SLED_PATH", default_value = "/data/kestrel/state.sled")]
    pub sled_path: String,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "KESTREL_JWT_SECRET")]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "KESTREL_CORS_ORIGINS", default_value = "")]
    pub cors_origins: String,
}

impl DaemonConfig {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    /// Resolves the JWT secret, panicking in production if it was left
    /// at the obviously-insecure default — mirrors the teacher's
    /// startup check that a real deployment never boots with a
    /// well-known development secret.
    pub fn resolve_jwt_secret(&self) -> String {
        let secret = self
            .jwt_secret
            .clone()
            .unwrap_or_else(|| "dev-insecure-jwt-secret-change-me".to_string());

        let production = std::env::var("KESTREL_ENV").map(|v| v == "production").unwrap_or(false);
        if production && secret == "dev-insecure-jwt-secret-change-me" {
            panic!("refusing to start in production with the default JWT secret; set KESTREL_JWT_SECRET");
        }

        secret
    }
}
