//! Tunable defaults for the pipeline, overridable by the CLI or environment.

#[derive(Debug, Clone)]
pub struct ForgeConfig {
    pub max_spec_bytes: u64,
    pub max_redirects: usize,
    pub network_deadline_secs: u64,
    pub allow_private_hosts: bool,
    pub job_history_size: usize,
    pub stage_timeout_load_secs: u64,
    pub stage_timeout_normalize_secs: u64,
    pub stage_timeout_validate_secs: u64,
    pub stage_timeout_map_secs: u64,
    pub stage_timeout_render_secs: u64,
    pub stage_timeout_write_secs: u64,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        ForgeConfig {
            max_spec_bytes: 16 * 1024 * 1024,
            max_redirects: 5,
            network_deadline_secs: 30,
            allow_private_hosts: false,
            job_history_size: 100,
            stage_timeout_load_secs: 30,
            stage_timeout_normalize_secs: 5,
            stage_timeout_validate_secs: 10,
            stage_timeout_map_secs: 5,
            stage_timeout_render_secs: 30,
            stage_timeout_write_secs: 10,
        }
    }
}

impl ForgeConfig {
    /// Overlay values from environment variables, in the idiom of the
    /// teacher's plain `std::env` reads. Unset or unparsable variables keep
    /// the existing value.
    pub fn from_env() -> Self {
        let mut config = ForgeConfig::default();
        if let Some(v) = env_u64("MCPFORGE_MAX_SPEC_BYTES") {
            config.max_spec_bytes = v;
        }
        if let Some(v) = env_u64("MCPFORGE_MAX_REDIRECTS") {
            config.max_redirects = v as usize;
        }
        if let Some(v) = env_u64("MCPFORGE_NETWORK_DEADLINE_SECS") {
            config.network_deadline_secs = v;
        }
        if let Ok(v) = std::env::var("MCPFORGE_ALLOW_PRIVATE_HOSTS") {
            config.allow_private_hosts = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = env_u64("MCPFORGE_JOB_HISTORY_SIZE") {
            config.job_history_size = v as usize;
        }
        config
    }

    pub fn stage_timeout(&self, stage: crate::error::Stage) -> std::time::Duration {
        use crate::error::Stage;
        let secs = match stage {
            Stage::Load => self.stage_timeout_load_secs,
            Stage::Normalize => self.stage_timeout_normalize_secs,
            Stage::Validate => self.stage_timeout_validate_secs,
            Stage::Map => self.stage_timeout_map_secs,
            Stage::Render => self.stage_timeout_render_secs,
            Stage::Write => self.stage_timeout_write_secs,
        };
        std::time::Duration::from_secs(secs)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ForgeConfig::default();
        assert_eq!(config.max_spec_bytes, 16 * 1024 * 1024);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.network_deadline_secs, 30);
        assert!(!config.allow_private_hosts);
        assert_eq!(config.job_history_size, 100);
    }
}
