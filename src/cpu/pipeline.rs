// Three-slot pipeline state: prefetch, decode, execute. Any control-flow
// change invalidates it; the next retirement must refill all three slots
// before resuming normal execution.

#[derive(Debug, Clone, Copy, Default)]
pub struct Pipeline {
    prefetch: Option<u32>,
    decode: Option<u32>,
    execute: Option<u32>,
    valid: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Invalidates the pipeline after a branch, exception entry, or any
    /// other write to the program counter.
    pub fn flush(&mut self) {
        self.prefetch = None;
        self.decode = None;
        self.execute = None;
        self.valid = false;
    }

    /// Pushes a freshly fetched word into the pipeline, shifting the other
    /// two slots forward. Returns the word now ready to execute, once all
    /// three slots have been filled following a flush.
    pub fn advance(&mut self, fetched: u32) -> Option<u32> {
        let ready = self.execute;
        self.execute = self.decode;
        self.decode = self.prefetch;
        self.prefetch = Some(fetched);
        self.valid = self.execute.is_some() && self.decode.is_some() && self.prefetch.is_some();
        ready
    }
}
