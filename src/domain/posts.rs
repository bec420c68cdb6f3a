//! Post submission rules.

use time::OffsetDateTime;

use crate::domain::entities::NewPost;
use crate::domain::error::DomainError;
use crate::domain::types::UserId;

pub const MAX_TEXT_CHARS: usize = 1000;
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Raw post payload as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub author_id: UserId,
    pub text: String,
    pub tags: Vec<String>,
}

impl PostDraft {
    pub fn new(author_id: impl Into<UserId>, text: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            author_id: author_id.into(),
            text: text.into(),
            tags,
        }
    }

    /// Validate the draft and stamp it with its creation time.
    pub fn validate(self, created_at: OffsetDateTime) -> Result<NewPost, DomainError> {
        if self.author_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("authorId", "must not be empty"));
        }

        let length = self.text.chars().count();
        if length == 0 {
            return Err(DomainError::validation("text", "must not be empty"));
        }
        if length > MAX_TEXT_CHARS {
            return Err(DomainError::validation(
                "text",
                format!("{length} characters exceeds the limit of {MAX_TEXT_CHARS}"),
            ));
        }

        Ok(NewPost {
            author_id: self.author_id,
            text: self.text,
            tags: self.tags,
            created_at,
        })
    }
}

/// Truncate `text` to at most `max_chars` Unicode scalar values.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
