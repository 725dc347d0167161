use std::env;

use crate::error::QueueError;

pub const DEFAULT_CONCURRENCY: usize = 3;
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
/// Deepest folder nesting the drive accepts below its root.
pub const MAX_FOLDER_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub chunk_size: usize,
    pub max_folder_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_folder_depth: MAX_FOLDER_DEPTH,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        Self {
            concurrency: read_limit("LANZOU_CONCURRENCY", DEFAULT_CONCURRENCY),
            chunk_size: read_limit("LANZOU_CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            max_folder_depth: read_limit("LANZOU_MAX_FOLDER_DEPTH", MAX_FOLDER_DEPTH),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        validate_concurrency(self.concurrency)?;
        if self.chunk_size == 0 {
            return Err(QueueError::InvalidConfig {
                field: "chunk size",
                value: 0,
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_concurrency(concurrency: usize) -> Result<(), QueueError> {
    if concurrency < 1 {
        return Err(QueueError::InvalidConfig {
            field: "concurrency",
            value: concurrency,
        });
    }
    Ok(())
}

fn read_limit(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_drive_limits() {
        let config = QueueConfig::default();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.max_folder_depth, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert_eq!(
            QueueConfig::default().with_concurrency(0).validate(),
            Err(QueueError::InvalidConfig {
                field: "concurrency",
                value: 0
            })
        );
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(QueueConfig::default().with_chunk_size(1).validate().is_ok());
        assert_eq!(
            QueueConfig::default().with_chunk_size(0).validate(),
            Err(QueueError::InvalidConfig {
                field: "chunk size",
                value: 0
            })
        );
    }

    #[test]
    fn missing_env_falls_back_to_default() {
        assert_eq!(read_limit("LANZOU_NO_SUCH_LIMIT_FOR_TEST", 7), 7);
    }
}
