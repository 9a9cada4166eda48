use anyhow::Context;
use axum::http::HeaderValue;
use std::env;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub bind_address: String,
    pub cors_origins: Vec<HeaderValue>,
    /// Per-session outbound queue depth before senders back-pressure.
    pub session_send_queue: usize,
    /// Per-subscriber channel depth before envelopes are dropped for it.
    pub subscriber_buffer: usize,
    /// Directory scanned at startup for packaged plugin artifacts.
    pub plugin_dir: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/probehub.db".to_string());

        let port_str = env::var("PORT").unwrap_or_else(|_| "8090".to_string());
        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow::anyhow!(
                "Invalid PORT value '{}': must be an integer between 1 and 65535",
                port_str
            )
        })?;
        if port == 0 {
            anyhow::bail!("Invalid PORT value '0': must be between 1 and 65535");
        }

        // Defaults to loopback only; set 0.0.0.0 explicitly when agents
        // connect from other hosts.
        let bind_address = match env::var("BIND_ADDRESS") {
            Ok(addr) => {
                addr.parse::<std::net::IpAddr>().with_context(|| {
                    format!(
                        "Invalid BIND_ADDRESS '{}': must be a valid IP address (e.g., '127.0.0.1')",
                        addr
                    )
                })?;
                addr
            }
            Err(_) => "127.0.0.1".to_string(),
        };

        let cors_origins_str = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://127.0.0.1:5173".to_string());

        // Skip invalid CORS origins with a warning instead of failing startup.
        let cors_origins: Vec<HeaderValue> = cors_origins_str
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
                    tracing::warn!(
                        "Skipping CORS origin with invalid scheme '{}': must be http:// or https://",
                        trimmed
                    );
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::warn!("Skipping invalid CORS origin '{}': {}", trimmed, e);
                        None
                    }
                }
            })
            .collect();

        let session_send_queue = env::var("SESSION_SEND_QUEUE")
            .unwrap_or_else(|_| "64".to_string())
            .parse::<usize>()
            .context("Failed to parse SESSION_SEND_QUEUE")?;
        if session_send_queue == 0 || session_send_queue > 4096 {
            anyhow::bail!(
                "SESSION_SEND_QUEUE must be between 1 and 4096 (got {})",
                session_send_queue
            );
        }

        let subscriber_buffer = env::var("SUBSCRIBER_BUFFER")
            .unwrap_or_else(|_| "256".to_string())
            .parse::<usize>()
            .context("Failed to parse SUBSCRIBER_BUFFER")?;
        if subscriber_buffer == 0 || subscriber_buffer > 65536 {
            anyhow::bail!(
                "SUBSCRIBER_BUFFER must be between 1 and 65536 (got {})",
                subscriber_buffer
            );
        }

        let plugin_dir = env::var("PLUGIN_DIR").unwrap_or_else(|_| "data/plugins".to_string());

        Ok(Self {
            database_url,
            port,
            bind_address,
            cors_origins,
            session_send_queue,
            subscriber_buffer,
            plugin_dir,
        })
    }
}
