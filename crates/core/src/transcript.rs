#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptTurn {
    role: Role,
    text: String,
    sealed: bool,
}

impl TranscriptTurn {
    fn new(role: Role, text: &str, sealed: bool) -> Self {
        Self {
            role,
            text: text.to_string(),
            sealed,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sealed turns never change again.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

#[derive(Debug, Clone, Default)]
struct OpenExchange {
    user: String,
    assistant: String,
}

impl OpenExchange {
    fn is_blank(&self) -> bool {
        self.user.trim().is_empty() && self.assistant.trim().is_empty()
    }
}

/// Folds partial transcripts into an ordered list of turns.
///
/// At most one user/assistant pair is open at a time. Partials replace the
/// open text wholesale, so a corrected hypothesis overwrites the previous
/// one instead of being appended to it.
#[derive(Debug, Clone, Default)]
pub struct TranscriptAggregator {
    sealed: Vec<TranscriptTurn>,
    open: Option<OpenExchange>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an empty pair unless one is open already.
    pub fn begin_exchange(&mut self) {
        if self.open.is_none() {
            self.open = Some(OpenExchange::default());
        }
    }

    pub fn on_user_partial(&mut self, text: &str) {
        self.begin_exchange();
        if let Some(open) = self.open.as_mut() {
            open.user = text.to_string();
        }
    }

    pub fn on_assistant_partial(&mut self, text: &str) {
        self.begin_exchange();
        if let Some(open) = self.open.as_mut() {
            open.assistant = text.to_string();
        }
    }

    /// Seals the open pair and opens the next one.
    ///
    /// A pair where both sides are blank is left open and reused, so
    /// silent turns never produce empty entries.
    pub fn on_turn_complete(&mut self) {
        match self.open.take() {
            Some(open) if !open.is_blank() => {
                self.seal(open);
                self.open = Some(OpenExchange::default());
            }
            _ => self.open = Some(OpenExchange::default()),
        }
    }

    /// Closes the conversation at session end: a blank open pair is
    /// dropped, a non-blank one is sealed as it stands.
    pub fn finish(&mut self) {
        if let Some(open) = self.open.take() {
            if !open.is_blank() {
                self.seal(open);
            }
        }
    }

    fn seal(&mut self, open: OpenExchange) {
        tracing::debug!(
            "turn sealed: user={:?}, assistant={:?}",
            open.user,
            open.assistant
        );
        self.sealed
            .push(TranscriptTurn::new(Role::User, &open.user, true));
        self.sealed
            .push(TranscriptTurn::new(Role::Assistant, &open.assistant, true));
    }

    pub fn sealed(&self) -> &[TranscriptTurn] {
        &self.sealed
    }

    pub fn has_open_exchange(&self) -> bool {
        self.open.is_some()
    }

    /// Sealed turns followed by the open pair, if any.
    pub fn conversation(&self) -> Vec<TranscriptTurn> {
        let mut turns = self.sealed.clone();
        if let Some(ref open) = self.open {
            turns.push(TranscriptTurn::new(Role::User, &open.user, false));
            turns.push(TranscriptTurn::new(Role::Assistant, &open.assistant, false));
        }
        turns
    }
}
