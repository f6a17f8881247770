use std::env;
use std::path::PathBuf;

use crate::UseCompress;

/// Process-wide configuration, parsed once from the environment variables
/// named in the external-interfaces section of the design.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub data_file_size: u64,
    pub max_upload_file_size: u64,
    pub server_address: String,
    pub server_port: u16,
    pub use_compress: UseCompress,
    pub minimal_compression: f64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("DB_PATH")
                .unwrap_or_else(|_| "catalog.db".to_string())
                .into(),
            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            data_file_size: env::var("DATA_FILE_SIZE")
                .ok()
                .and_then(|v| parse_byte_size(&v))
                .unwrap_or(1024 * 1024 * 1024),
            max_upload_file_size: env::var("MAX_UPLOAD_FILE_SIZE")
                .ok()
                .and_then(|v| parse_byte_size(&v))
                .unwrap_or(100 * 1024 * 1024),
            server_address: env::var("SERVER_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            use_compress: env::var("USE_COMPRESS")
                .ok()
                .and_then(|v| UseCompress::parse(&v))
                .unwrap_or_default(),
            minimal_compression: env::var("MINIMAL_COMPRESSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        }
    }
}

/// Parses sizes like `"512"`, `"10K"`, `"2M"`, `"1G"` (binary multiples).
fn parse_byte_size(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (digits, mult) = match raw.as_bytes()[raw.len() - 1] {
        b'K' | b'k' => (&raw[..raw.len() - 1], 1024u64),
        b'M' | b'm' => (&raw[..raw.len() - 1], 1024 * 1024),
        b'G' | b'g' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };
    digits.trim().parse::<u64>().ok().map(|n| n * mult)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_suffixed_sizes() {
        assert_eq!(parse_byte_size("512"), Some(512));
        assert_eq!(parse_byte_size("10K"), Some(10 * 1024));
        assert_eq!(parse_byte_size("2M"), Some(2 * 1024 * 1024));
        assert_eq!(parse_byte_size("1G"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_byte_size("bogus"), None);
    }

    #[test]
    fn default_config_has_sane_fallbacks() {
        let cfg = Config {
            db_path: "catalog.db".into(),
            data_dir: "data".into(),
            data_file_size: 1024 * 1024 * 1024,
            max_upload_file_size: 100 * 1024 * 1024,
            server_address: "0.0.0.0".into(),
            server_port: 8080,
            use_compress: UseCompress::Auto,
            minimal_compression: 10.0,
            log_level: "info".into(),
            log_format: LogFormat::Text,
            admin_username: None,
            admin_password: None,
        };
        assert_eq!(cfg.use_compress, UseCompress::Auto);
        assert_eq!(cfg.log_format, LogFormat::Text);
    }
}
