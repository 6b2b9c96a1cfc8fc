/// Tool calls a single worker may still make.
///
/// Deliberately not `Clone`: one budget belongs to one running worker.
#[derive(Debug)]
pub struct ToolCallBudget {
    initial: u32,
    remaining: u32,
}

impl ToolCallBudget {
    pub fn new(calls: u32) -> Self {
        Self {
            initial: calls,
            remaining: calls,
        }
    }

    /// Spends one call. Returns `false` once the budget is exhausted.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    pub fn used(&self) -> u32 {
        self.initial - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
