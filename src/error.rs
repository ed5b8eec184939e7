use thiserror::Error;

/// Stage of the labeling pipeline an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TemplateParse,
    FontParse,
    Stamp,
    Merge,
    Finalize,
    InvalidConfiguration,
    Io,
}

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("template parse error: {0}")]
    TemplateParse(String),
    #[error("font parse error: {0}")]
    FontParse(String),
    #[error("stamp error{}: {message}", recipient_suffix(.recipient))]
    Stamp {
        recipient: Option<usize>,
        message: String,
    },
    #[error("merge error{}: {message}", recipient_suffix(.recipient))]
    Merge {
        recipient: Option<usize>,
        message: String,
    },
    #[error("finalize error: {0}")]
    Finalize(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn recipient_suffix(recipient: &Option<usize>) -> String {
    match recipient {
        Some(index) => format!(" (recipient {})", index + 1),
        None => String::new(),
    }
}

impl LabelError {
    pub(crate) fn stamp(message: impl Into<String>) -> Self {
        LabelError::Stamp {
            recipient: None,
            message: message.into(),
        }
    }

    pub(crate) fn merge(message: impl Into<String>) -> Self {
        LabelError::Merge {
            recipient: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LabelError::TemplateParse(_) => ErrorKind::TemplateParse,
            LabelError::FontParse(_) => ErrorKind::FontParse,
            LabelError::Stamp { .. } => ErrorKind::Stamp,
            LabelError::Merge { .. } => ErrorKind::Merge,
            LabelError::Finalize(_) => ErrorKind::Finalize,
            LabelError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            LabelError::Io(_) => ErrorKind::Io,
        }
    }

    /// Zero-based index of the name-list entry being processed, if known.
    pub fn recipient(&self) -> Option<usize> {
        match self {
            LabelError::Stamp { recipient, .. } | LabelError::Merge { recipient, .. } => *recipient,
            _ => None,
        }
    }

    /// Attaches the recipient index to stage errors raised inside the per-name loop.
    pub fn with_recipient(self, index: usize) -> Self {
        match self {
            LabelError::Stamp { message, .. } => LabelError::Stamp {
                recipient: Some(index),
                message,
            },
            LabelError::Merge { message, .. } => LabelError::Merge {
                recipient: Some(index),
                message,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_recipient_tags_stage_errors_only() {
        let err = LabelError::stamp("font embedding failed").with_recipient(2);
        assert_eq!(err.kind(), ErrorKind::Stamp);
        assert_eq!(err.recipient(), Some(2));
        assert_eq!(
            err.to_string(),
            "stamp error (recipient 3): font embedding failed"
        );

        let err = LabelError::Finalize("disk full".to_string()).with_recipient(5);
        assert_eq!(err.recipient(), None);
        assert_eq!(err.kind(), ErrorKind::Finalize);
    }

    #[test]
    fn merge_error_without_recipient_has_plain_message() {
        let err = LabelError::merge("page index 4 out of range");
        assert_eq!(err.to_string(), "merge error: page index 4 out of range");
    }
}
