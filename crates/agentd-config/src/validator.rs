//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Collapse the errors into a single `ConfigError`, if any.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        if self.errors.is_empty() {
            return Ok(self.warnings);
        }
        let message = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ConfigError::Invalid(message))
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_runner(config, &mut result);
        Self::validate_workflow(config, &mut result);
        Self::validate_release(config, &mut result);
        Self::validate_bash(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }

        if config.auth.token_env.is_empty() {
            result.add_error(ValidationError::new(
                "auth.token_env",
                "Token environment variable name cannot be empty",
            ));
        }
    }

    fn validate_runner(config: &Config, result: &mut ValidationResult) {
        if config.runner.tick_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "runner.tick_interval_ms",
                "tick_interval_ms must be greater than 0",
            ));
        }

        // A tick slower than the debounce window can skip a whole matching minute.
        if config.runner.tick_interval_ms > 60_000 {
            result.add_warning(ValidationWarning::new(
                "runner.tick_interval_ms",
                "tick interval exceeds one minute, some cron matches will be missed",
            ));
        }

        if config.runner.max_loops == Some(0) {
            result.add_error(ValidationError::new(
                "runner.max_loops",
                "max_loops must be greater than 0 when set",
            ));
        }

        if config.runner.update_check_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "runner.update_check_interval_secs",
                "update_check_interval_secs must be greater than 0",
            ));
        }
    }

    fn validate_workflow(config: &Config, result: &mut ValidationResult) {
        let url = &config.workflow.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            result.add_error(ValidationError::new(
                "workflow.base_url",
                "base_url must start with http:// or https://",
            ));
        }

        if config.workflow.api_key.is_none() {
            result.add_warning(ValidationWarning::new(
                "workflow.api_key",
                "API key is not set, workflow requests will be unauthenticated",
            ));
        }
    }

    fn validate_release(config: &Config, result: &mut ValidationResult) {
        if !config.release.tarball_url.contains("{version}") {
            result.add_error(ValidationError::new(
                "release.tarball_url",
                "tarball_url must contain the {version} placeholder",
            ));
        }

        if config.runner.auto_update && config.release.feed_url.is_empty() {
            result.add_warning(ValidationWarning::new(
                "release.feed_url",
                "auto_update is enabled but no release feed is configured",
            ));
        }

        if config.reboot.release_prefix.is_empty() {
            result.add_error(ValidationError::new(
                "reboot.release_prefix",
                "release_prefix cannot be empty, it scopes directory removal",
            ));
        }
    }

    fn validate_bash(config: &Config, result: &mut ValidationResult) {
        if config.bash.allowed_commands.is_empty() {
            result.add_warning(ValidationWarning::new(
                "bash.allowed_commands",
                "allow-list is empty, every /api/bash request will be rejected",
            ));
        }

        for command in &config.bash.allowed_commands {
            if command.is_empty() || command.contains(char::is_whitespace) {
                result.add_error(ValidationError::new(
                    "bash.allowed_commands",
                    format!("'{}' is not a single program name", command),
                ));
            }
        }

        if config.bash.timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "bash.timeout_ms",
                "timeout_ms must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
