use std::sync::{Arc, Mutex};

use super::running::RunningCommand;
use crate::command::CommandContext;

struct Entry {
    generation: u64,
    command: Arc<RunningCommand>,
}

#[derive(Default)]
struct Inner {
    next_generation: u64,
    entry: Option<Entry>,
}

/// The command the device is currently working on.
///
/// Entries are tagged with a generation so that a finishing job can only
/// clear its own entry, never a newer one installed under the same id.
#[derive(Default)]
pub struct CurrentCommandSlot {
    inner: Mutex<Inner>,
}

impl CurrentCommandSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is recorded. Returns the new entry's generation.
    pub fn install(&self, command: Arc<RunningCommand>) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.entry = Some(Entry {
            generation,
            command,
        });
        generation
    }

    pub fn peek(&self) -> Option<Arc<RunningCommand>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entry.as_ref().map(|e| Arc::clone(&e.command))
    }

    /// Clear the slot if it still holds `command_id` at `generation`.
    pub fn clear_if(&self, command_id: &str, generation: u64) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let matches = inner
            .entry
            .as_ref()
            .is_some_and(|e| e.generation == generation && e.command.command_id() == command_id);
        if matches {
            inner.entry = None;
        }
        matches
    }
}
