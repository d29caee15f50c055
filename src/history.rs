use std::collections::VecDeque;

/// Result of moving the recall cursor towards newer entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recall<'a> {
    /// A stored line.
    Entry(&'a str),
    /// The cursor is back at the live-edit position: show an empty line.
    Blank,
}

/// Fixed-capacity log of submitted command lines.
///
/// Entries are kept oldest first. Once the store is full, recording a new line
/// evicts the oldest one. The recall cursor counts how many steps back from the
/// live-edit position the current editing session has gone; zero means
/// "one past the newest entry".
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    recall: usize,
}

impl History {
    /// Create an empty store holding at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            recall: 0,
        }
    }

    /// Store a copy of `line`. Empty lines are never stored.
    pub fn record(&mut self, line: &str) {
        if line.is_empty() || self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_owned());
        self.recall = 0;
    }

    /// Reset the recall cursor to the live-edit position.
    pub fn begin_session(&mut self) {
        self.recall = 0;
    }

    /// Step one entry back in time.
    ///
    /// Returns `None` and leaves the cursor alone when already at the oldest entry.
    pub fn recall_older(&mut self) -> Option<&str> {
        if self.recall >= self.entries.len() {
            return None;
        }
        self.recall += 1;
        self.entry_at_cursor()
    }

    /// Step one entry forward in time.
    ///
    /// Returns [`Recall::Blank`] when the step lands on the live-edit position and
    /// `None` when the cursor is already there.
    pub fn recall_newer(&mut self) -> Option<Recall<'_>> {
        if self.recall == 0 {
            return None;
        }
        self.recall -= 1;
        match self.entry_at_cursor() {
            Some(line) => Some(Recall::Entry(line)),
            None => Some(Recall::Blank),
        }
    }

    /// All stored lines, oldest first, paired with their 1-based index.
    pub fn list(&self) -> impl Iterator<Item = (usize, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, line)| (i + 1, line.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_at_cursor(&self) -> Option<&str> {
        if self.recall == 0 {
            return None;
        }
        self.entries
            .get(self.entries.len() - self.recall)
            .map(String::as_str)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(crate::config::HISTORY_SIZE)
    }
}
