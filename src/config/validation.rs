use crate::config::types::{
    Config, EngineConfig, ExtractMode, HttpConfig, OutputConfig, SpiderConfig, UserAgentConfig,
};
use crate::ConfigError;
use reqwest::Method;
use scraper::Selector;
use tokio::sync::Semaphore;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine_config())?;
    validate_user_agent_config(&config.user_agent)?;
    validate_http_config(&config.http)?;
    validate_spider_config(&config.spider)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the runtime engine configuration
pub fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.fetch_concurrency < 1 || config.fetch_concurrency > Semaphore::MAX_PERMITS {
        return Err(ConfigError::Validation(format!(
            "fetch_concurrency must be between 1 and {}, got {}",
            Semaphore::MAX_PERMITS,
            config.fetch_concurrency
        )));
    }

    if config.worker_threads < 1 {
        return Err(ConfigError::Validation(format!(
            "worker_threads must be >= 1, got {}",
            config.worker_threads
        )));
    }

    if config.idle_tick.is_zero() {
        return Err(ConfigError::Validation(
            "idle_tick must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates HTTP transport settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "connect_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the configured spider
fn validate_spider_config(config: &SpiderConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation(
            "spider name cannot be empty".to_string(),
        ));
    }

    if !config
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "spider name must contain only alphanumeric characters, hyphens and underscores, got '{}'",
            config.name
        )));
    }

    if config.seeds.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Spider '{}' must have at least one seed",
            config.name
        )));
    }

    match &config.url_template {
        Some(template) => {
            if !template.contains("{seed}") {
                return Err(ConfigError::Validation(format!(
                    "url-template '{}' must contain a {{seed}} placeholder",
                    template
                )));
            }
            let sample = template.replace("{seed}", "seed");
            Url::parse(&sample).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid url-template '{}': {}", template, e))
            })?;
        }
        None => {
            // Without a template every seed is fetched as-is
            for seed in &config.seeds {
                Url::parse(seed).map_err(|e| {
                    ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e))
                })?;
            }
        }
    }

    if let Some(method) = &config.method {
        Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            ConfigError::Validation(format!("Invalid HTTP method '{}'", method))
        })?;
    }

    for status in &config.accept_status {
        if !(100..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "accept-status entries must be between 100 and 599, got {}",
                status
            )));
        }
    }

    if config.fields.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Spider '{}' must declare at least one field",
            config.name
        )));
    }

    for (name, expression) in &config.fields {
        match config.mode {
            ExtractMode::Html => validate_css_field(name, expression)?,
            ExtractMode::Json => validate_json_pointer(name, expression)?,
        }
    }

    if let Some(follow) = &config.follow {
        if config.mode != ExtractMode::Html {
            return Err(ConfigError::Validation(
                "follow is only supported in html mode".to_string(),
            ));
        }
        Selector::parse(follow).map_err(|e| {
            ConfigError::InvalidSelector(format!("follow selector '{}': {:?}", follow, e))
        })?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a `css` or `css@attribute` field expression
fn validate_css_field(name: &str, expression: &str) -> Result<(), ConfigError> {
    let (css, attribute) = crate::spider::split_field_expression(expression);

    if let Some(attribute) = attribute {
        if attribute.is_empty() {
            return Err(ConfigError::InvalidSelector(format!(
                "field '{}' has an empty attribute name",
                name
            )));
        }
    }

    Selector::parse(css).map_err(|e| {
        ConfigError::InvalidSelector(format!("field '{}' selector '{}': {:?}", name, css, e))
    })?;

    Ok(())
}

/// Validates a JSON pointer (RFC 6901): empty, or starting with '/'
fn validate_json_pointer(name: &str, pointer: &str) -> Result<(), ConfigError> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "field '{}' JSON pointer '{}' must start with '/'",
            name, pointer
        )));
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
