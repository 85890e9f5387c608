//! Typed CLI/env configuration, following the corpus's `clap(derive)` convention
//! of layering environment variables under long-form flags.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "archive-swarm-coordinator")]
#[command(about = "Coordination server for the volunteer archiving swarm", long_about = None)]
pub struct Args {
    /// Address to bind the HTTP listener on.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to bind the HTTP listener on.
    #[arg(long, default_value = "8000", env = "PORT")]
    pub port: u16,

    /// When set (together with `tls_key`), also bind a port-80 listener that
    /// 301-redirects to the HTTPS origin below.
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<String>,

    /// Paired with `tls_cert`; presence alone gates the redirect listener.
    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<String>,

    /// Public HTTPS origin used to build the 301 redirect target, e.g.
    /// `archive.example.org`.
    #[arg(long, default_value = "localhost", env = "PUBLIC_HOST")]
    pub public_host: String,

    /// Full database connection string. Overrides the discrete `db_*` fields
    /// below when set.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, default_value = "localhost", env = "DB_HOST")]
    pub db_host: String,

    #[arg(long, default_value = "5432", env = "DB_PORT")]
    pub db_port: u16,

    #[arg(long, default_value = "postgres", env = "DB_USER")]
    pub db_user: String,

    #[arg(long, default_value = "", env = "DB_PASSWORD")]
    pub db_password: String,

    #[arg(long, default_value = "archive_swarm", env = "DB_NAME")]
    pub db_name: String,

    /// Maximum number of pooled database connections.
    #[arg(long, default_value = "16", env = "DB_POOL_SIZE")]
    pub db_pool_size: u32,

    #[arg(long, env = "S3_ACCESS_KEY")]
    pub s3_access_key: String,

    #[arg(long, env = "S3_SECRET_KEY")]
    pub s3_secret_key: String,

    #[arg(long, default_value = "us-east-1", env = "S3_REGION")]
    pub s3_region: String,

    #[arg(long, env = "S3_BUCKET")]
    pub s3_bucket: String,

    /// S3-compatible endpoint, e.g. for a self-hosted MinIO deployment.
    /// Unset means "use AWS's regional default endpoint".
    #[arg(long, env = "S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Seconds a presigned PUT URL remains valid.
    #[arg(long, default_value = "3600", env = "S3_PRESIGN_TTL_SECS")]
    pub s3_presign_ttl_secs: u64,

    /// Relative discrepancy below which a worker's reported content size is
    /// accepted as correct during re-verification. Must lie in (0, 1).
    #[arg(long, default_value = "0.05", env = "CONTENT_THRESHOLD")]
    pub content_threshold: f64,

    /// Reputation above which a disagreeing worker is trusted with a
    /// versioned overwrite instead of being penalised.
    #[arg(long, default_value = "100", env = "TRUSTED_REPUTATION")]
    pub trusted_reputation: i64,

    /// Per-IP cap on the number of enrolled workers.
    #[arg(long, default_value = "1000", env = "MAX_WORKERS_PER_IP")]
    pub max_workers_per_ip: i64,
}

impl Args {
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }

    pub fn s3_public_base_url(&self) -> String {
        match &self.s3_endpoint {
            Some(endpoint) => format!("{endpoint}/{bucket}", endpoint = endpoint.trim_end_matches('/'), bucket = self.s3_bucket),
            None => format!(
                "https://{bucket}.s3.{region}.amazonaws.com",
                bucket = self.s3_bucket,
                region = self.s3_region
            ),
        }
    }
}
