//! Model identifier parsing
//!
//! Identifiers are either `"<provider>/<model>"` or a bare `"<model>"`.
//! Routing rules:
//! - no separator: the bare name belongs to the default OAuth provider
//! - prefix is a registered provider: split once, keep the remainder verbatim
//! - anything else: the whole string goes to the fallback key provider, since
//!   its own model names (`openai/gpt-4o`) contain the separator

use super::LlmError;
use std::fmt;

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelIdentifier {
    pub provider: String,
    pub model: String,
}

impl ModelIdentifier {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn parse(
        id: &str,
        is_registered: impl Fn(&str) -> bool,
        default_provider: &str,
        fallback_provider: &str,
    ) -> Result<Self, LlmError> {
        if id.is_empty() {
            return Err(LlmError::BadRequest(
                "model identifier must not be empty".to_string(),
            ));
        }

        match id.split_once(SEPARATOR) {
            None => Ok(Self::new(default_provider, id)),
            Some((prefix, rest)) if is_registered(prefix) => Ok(Self::new(prefix, rest)),
            Some(_) => Ok(Self::new(fallback_provider, id)),
        }
    }
}

impl fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.provider, SEPARATOR, self.model)
    }
}
