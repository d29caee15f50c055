/// Number of past command lines kept by default.
pub const HISTORY_SIZE: usize = 20;
/// Maximum length of an edited line, in bytes.
pub const MAX_LINE_LEN: usize = 1024;
/// Maximum number of stages in a pipeline.
pub const MAX_STAGES: usize = 10;
/// Maximum number of tokens in a single stage.
pub const MAX_ARGS: usize = 100;

/// Capacity limits of the shell.
///
/// Every limit is a truncation point, never an error: input beyond a limit is
/// dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// How many submitted lines the history keeps.
    pub history_size: usize,
    /// Longest line the editor accepts, in bytes.
    pub max_line_len: usize,
    /// Pipeline segments beyond this count are dropped.
    pub max_stages: usize,
    /// Tokens beyond this count in a segment are dropped.
    pub max_args: usize,
}

impl Limits {
    /// Check that every limit is usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        let named = [
            ("history size", self.history_size),
            ("line length", self.max_line_len),
            ("stage count", self.max_stages),
            ("argument count", self.max_args),
        ];
        for (name, value) in named {
            if value == 0 {
                anyhow::bail!("{} limit must be greater than zero", name);
            }
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            history_size: HISTORY_SIZE,
            max_line_len: MAX_LINE_LEN,
            max_stages: MAX_STAGES,
            max_args: MAX_ARGS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_are_valid() {
        let limits = Limits::default();
        assert_eq!(limits.history_size, 20);
        assert_eq!(limits.max_line_len, 1024);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let limits = Limits {
            max_stages: 0,
            ..Limits::default()
        };
        let err = limits.validate().unwrap_err();
        assert!(err.to_string().contains("stage count"));
    }
}
