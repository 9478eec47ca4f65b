use crate::config::schema::AppConfig;

/// Check the configuration for problems.
///
/// Returns one human-readable message per problem; an empty list means the
/// configuration is usable. Problems are reported, not fatal: the service
/// still starts and the affected feature degrades (e.g. to simulation).
pub fn validate_config(config: &AppConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.server.enabled && config.server.port == 0 {
        errors.push("Server port must be non-zero when the API is enabled".to_string());
    }

    if let Some(key) = &config.server.api_key {
        if key.trim().is_empty() {
            errors.push("Server api_key is set but empty".to_string());
        }
    }

    let base_url = &config.tools.base_url;
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        errors.push(format!(
            "Invalid tools base_url: {}. Must start with http:// or https://",
            base_url
        ));
    }

    if config.tools.timeout_secs == 0 {
        errors.push("Tool timeout_secs must be greater than zero".to_string());
    }

    let mut services: Vec<&String> = config.services.keys().collect();
    services.sort();
    for service in services {
        match config.get_api_config(service) {
            Ok(api) => {
                if api.setting("api_key").is_some_and(|k| k.trim().is_empty()) {
                    errors.push(format!("API key for service {} is empty", service));
                }
            }
            Err(e) => errors.push(e.to_string()),
        }
    }

    errors
}
