//! Page text assembly from OCR fragments.

use crate::error::CollaboratorError;
use crate::state::TextBlock;

/// Merges OCR fragments into page text.
pub trait TextAssembler: Send + Sync {
    fn assemble(&self, blocks: &[TextBlock]) -> Result<String, CollaboratorError>;
}

/// Joins fragment texts with line breaks, in fragment order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineAssembler;

impl TextAssembler for LineAssembler {
    fn assemble(&self, blocks: &[TextBlock]) -> Result<String, CollaboratorError> {
        Ok(blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
