/// What to do with empty lines in a name list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyEntryPolicy {
    /// Every line is a recipient, including the empty entry after a final newline.
    #[default]
    Keep,
    /// Drop the single empty entry a final newline produces.
    DropTrailing,
    /// Drop every empty or whitespace-only entry.
    DropAll,
}

/// Ordered recipients, one per line of the source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameList {
    entries: Vec<String>,
}

impl NameList {
    /// Splits on `\n`. A `\r` directly before the newline and a leading byte
    /// order mark are removed; nothing else is trimmed.
    pub fn parse(text: &str, policy: EmptyEntryPolicy) -> Self {
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);
        let mut entries: Vec<String> = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect();

        match policy {
            EmptyEntryPolicy::Keep => {}
            EmptyEntryPolicy::DropTrailing => {
                if text.ends_with('\n') {
                    entries.pop();
                }
            }
            EmptyEntryPolicy::DropAll => entries.retain(|entry| !entry.trim().is_empty()),
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
