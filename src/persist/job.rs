use crate::conversation::AppendTurn;

/// One queued persistence job: a full turn waiting to be written.
#[derive(Debug, Clone)]
pub struct PersistJob {
    pub turn: AppendTurn,
    /// Delivery attempts so far; incremented on re-enqueue after failure.
    pub attempts: u32,
}

impl PersistJob {
    pub fn new(turn: AppendTurn) -> Self {
        Self { turn, attempts: 0 }
    }
}
