use crate::history::History;

/// State that outlives a single command line.
///
/// Owned by the shell loop; the editor borrows the history for recall and the
/// built-ins get mutable access to the whole state.
#[derive(Debug, Clone, Default)]
pub struct ShellState {
    /// Lines submitted so far.
    pub history: History,
    /// Set by `exit`; the loop stops before reading another line.
    pub should_exit: bool,
}

impl ShellState {
    pub fn new(history: History) -> Self {
        Self {
            history,
            should_exit: false,
        }
    }
}
