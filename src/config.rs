//! CLI arguments and server configuration defaults.

use clap::Parser;

pub const DEFAULT_UPLOAD_DIR: &str = "./upload";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "filedrop", version, about = "HTTP file-transfer server")]
pub struct Args {
    #[arg(
        short = 'p',
        long,
        env = "FILEDROP_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Port to serve on"
    )]
    pub port: u16,
    #[arg(
        short = 'b',
        long,
        env = "FILEDROP_BIND",
        default_value = DEFAULT_HOST,
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'd',
        long,
        env = "FILEDROP_UPLOAD_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Upload root directory (created if missing)"
    )]
    pub upload_dir: String,
    #[arg(
        long,
        env = "FILEDROP_TLS",
        default_value_t = false,
        help = "Serve HTTPS (self-signed cert unless --tls-cert/--tls-key given)"
    )]
    pub tls: bool,
    #[arg(short = 'c', long, env = "FILEDROP_TLS_CERT", help = "TLS cert path")]
    pub tls_cert: Option<String>,
    #[arg(short = 'k', long, env = "FILEDROP_TLS_KEY", help = "TLS key path")]
    pub tls_key: Option<String>,
    #[arg(
        long,
        env = "FILEDROP_LOG_LEVEL",
        default_value = DEFAULT_LOG_LEVEL,
        help = "Default log filter (RUST_LOG overrides)"
    )]
    pub log_level: String,
    #[arg(long, env = "FILEDROP_LOG_FILE", help = "Append logs to this file")]
    pub log_file: Option<String>,
    #[arg(
        long,
        env = "FILEDROP_SERVE_DIR",
        help = "Serve-only mode: serve this directory read-only, no upload/cleanup"
    )]
    pub serve_dir: Option<String>,
    #[arg(
        long,
        env = "FILEDROP_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
}

impl Args {
    /// TLS is active when requested explicitly or when a cert/key pair is given.
    pub fn tls_enabled(&self) -> bool {
        self.tls || (self.tls_cert.is_some() && self.tls_key.is_some())
    }
}
