#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    frames_sent: u64,
    bytes_sent: u64,
    audio_chunks_received: u64,
    total_tokens: i32,
    input_tokens: i32,
    output_tokens: i32,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&mut self, encoded_len: usize) {
        self.frames_sent += 1;
        self.bytes_sent += encoded_len as u64;
    }

    pub(crate) fn record_audio_chunks(&mut self, count: usize) {
        self.audio_chunks_received += count as u64;
    }

    pub(crate) fn update_usage(&mut self, total: i32, input: i32, output: i32) {
        self.total_tokens += total;
        self.input_tokens += input;
        self.output_tokens += output;
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn audio_chunks_received(&self) -> u64 {
        self.audio_chunks_received
    }

    pub fn total_tokens(&self) -> i32 {
        self.total_tokens
    }

    pub fn input_tokens(&self) -> i32 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> i32 {
        self.output_tokens
    }
}
