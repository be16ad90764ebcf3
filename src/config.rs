use anyhow::{Context, Result};
use keyring::Entry;
use std::net::SocketAddr;
use std::path::PathBuf;

const KEYRING_SERVICE: &str = "roni_gemini_api_key";
const KEYRING_USER: &str = "gemini";

/// Process configuration, read from the environment. The provider credential
/// is referenced indirectly (`env:VAR` or `keyring`), never embedded.
#[derive(Debug, Clone)]
pub struct Config {
    /// Gateway listen address.
    pub bind_addr: SocketAddr,
    /// SQLite database file for the conversation log.
    pub database_path: PathBuf,
    /// Where to find the Gemini API key: `env:VAR` or `keyring`.
    pub gemini_key_ref: String,
    /// Base URL the terminal client dials.
    pub gateway_url: String,
    /// Optional static bearer credential the client attaches.
    pub gateway_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_addr: SocketAddr = env_or("RONI_BIND_ADDR", "127.0.0.1:8787")
            .parse()
            .context("Invalid RONI_BIND_ADDR")?;
        let database_path = PathBuf::from(env_or("RONI_DB_PATH", "roni.sqlite"));
        let gemini_key_ref = env_or("RONI_GEMINI_KEY_REF", "env:GEMINI_API_KEY");
        let gateway_url = std::env::var("RONI_GATEWAY_URL")
            .unwrap_or_else(|_| format!("http://{}", bind_addr));
        let gateway_token = std::env::var("RONI_GATEWAY_TOKEN").ok();

        Ok(Self {
            bind_addr,
            database_path,
            gemini_key_ref,
            gateway_url,
            gateway_token,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

// --- API Key Retrieval ---

/// Resolves the Gemini API key from a reference string: `env:VAR` reads the
/// environment, `keyring` reads the OS keyring.
pub fn resolve_api_key(key_ref: &str) -> Result<String> {
    match key_ref {
        r if r.starts_with("env:") => {
            let env_var_name = r.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            std::env::var(env_var_name).with_context(|| {
                format!(
                    "Failed to get API key from environment variable '{}'",
                    env_var_name
                )
            })
        }
        "keyring" => {
            let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)
                .context("Failed to create keyring entry")?;
            log::debug!("Retrieving API key from keyring service: {}", KEYRING_SERVICE);
            entry
                .get_password()
                .context("Failed to get API key from keyring. Please set it first.")
        }
        other => Err(anyhow::anyhow!("Unsupported key reference format: {}", other)),
    }
}

/// Stores the Gemini API key in the OS keyring.
pub fn store_api_key_in_keyring(api_key: &str) -> Result<()> {
    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .context("Failed to create keyring entry for setting password")?;
    log::info!("Setting API key in keyring service: {}", KEYRING_SERVICE);
    entry
        .set_password(api_key)
        .context("Failed to set API key in keyring")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_reads_environment_reference() {
        std::env::set_var("RONI_TEST_GEMINI_KEY", "sekrit");
        let key = resolve_api_key("env:RONI_TEST_GEMINI_KEY").unwrap();
        assert_eq!(key, "sekrit");
        std::env::remove_var("RONI_TEST_GEMINI_KEY");
    }

    #[test]
    fn resolve_api_key_rejects_unknown_reference() {
        let err = resolve_api_key("vault:whatever").unwrap_err();
        assert!(err.to_string().contains("Unsupported key reference"));
    }

    #[test]
    fn missing_environment_variable_is_an_error() {
        assert!(resolve_api_key("env:RONI_TEST_KEY_THAT_DOES_NOT_EXIST").is_err());
    }
}
