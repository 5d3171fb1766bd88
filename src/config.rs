//! Per-session configuration.

/// Tunables recognised by [`McServerSession`](crate::session::McServerSession).
///
/// Plain fields with [`Default`]; validation happens at session
/// construction.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Maximum parsed requests dispatched per loop turn. Bounds how long a
    /// burst of pipelined requests can starve reply processing.
    pub requests_per_read: usize,
    /// Lower bound on the receive-region the parser is offered per read.
    pub min_buffer_size: usize,
    /// Upper bound on buffered-but-unparsed inbound bytes.
    pub max_buffer_size: usize,
    /// Throttle cap on outstanding real requests; `0` disables throttling.
    pub max_in_flight: usize,
    /// When `true`, each reply buffer is written on its own; otherwise all
    /// replies staged during one loop turn coalesce into a single vectored
    /// write.
    pub single_write: bool,
    /// When `true`, the session answers `version` itself with
    /// [`SessionConfig::version_string`].
    pub default_version_handler: bool,
    /// Payload for session-answered `version` requests.
    pub version_string: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            requests_per_read: 64,
            min_buffer_size: 256,
            max_buffer_size: 4096,
            max_in_flight: 0,
            single_write: false,
            default_version_handler: true,
            version_string: concat!("mcshuttle ", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl SessionConfig {
    /// Returns an explanation when the configuration is unusable.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.requests_per_read == 0 {
            return Err("requests_per_read must be at least 1".to_owned());
        }
        if self.min_buffer_size == 0 {
            return Err("min_buffer_size must be at least 1".to_owned());
        }
        if self.min_buffer_size > self.max_buffer_size {
            return Err(format!(
                "min_buffer_size {} exceeds max_buffer_size {}",
                self.min_buffer_size, self.max_buffer_size
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_buffer_bounds_are_rejected() {
        let config = SessionConfig {
            min_buffer_size: 8192,
            max_buffer_size: 1024,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_requests_per_read_is_rejected() {
        let config = SessionConfig {
            requests_per_read: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
