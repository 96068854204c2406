use std::collections::BTreeMap;

/// Per-client request settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOptions {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Prepended as a system message when non-empty.
    pub system_message: Option<String>,
    pub extra_headers: BTreeMap<String, String>,
}

impl ProviderOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub(crate) fn system_message(&self) -> Option<&str> {
        self.system_message.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let options = ProviderOptions::new("gpt-4o")
            .with_max_tokens(512)
            .with_temperature(0.2)
            .with_system_message("")
            .with_header("X-Trace", "1");
        assert_eq!(options.model, "gpt-4o");
        assert_eq!(options.max_tokens, Some(512));
        assert_eq!(options.system_message(), None);
        assert_eq!(options.extra_headers["X-Trace"], "1");
    }
}
