//! Structured prompts made of ordered, typed sections.
//!
//! A [`Prompt`] always starts with an instruction; further sections are appended in call
//! order and rendered with a human-readable label derived from their [`SectionKind`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role a section plays in the rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Instruction,
    Context,
    Directive,
    Output,
    Example,
    /// Free-form section rendered as `"{tag}: {content}"`.
    Other(String),
}

impl SectionKind {
    /// Prefix placed in front of the section content, `None` for the instruction.
    pub fn label(&self) -> Option<&str> {
        match self {
            SectionKind::Instruction => None,
            SectionKind::Context => Some("Context"),
            SectionKind::Directive => Some("Directive"),
            SectionKind::Output => Some("Expected Output"),
            SectionKind::Example => Some("Example"),
            SectionKind::Other(tag) => Some(tag.as_str()),
        }
    }
}

/// One immutable piece of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSection {
    pub content: String,
    pub kind: SectionKind,
}

impl PromptSection {
    fn render_into(&self, out: &mut String) {
        if let Some(label) = self.kind.label() {
            out.push_str(label);
            out.push_str(": ");
        }
        out.push_str(&self.content);
    }
}

/// Ordered sequence of prompt sections.
///
/// # Examples
///
/// ```
/// use hikaku_llm::prompt::Prompt;
///
/// let prompt = Prompt::new("Summarize this")
///     .with_context("doc A")
///     .with_directive("be concise");
/// assert_eq!(
///     prompt.render(),
///     "Summarize this\n\nContext: doc A\n\nDirective: be concise"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    sections: Vec<PromptSection>,
}

impl Prompt {
    /// Creates a prompt holding a single instruction section.
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            sections: vec![PromptSection {
                content: instruction.into(),
                kind: SectionKind::Instruction,
            }],
        }
    }

    /// Appends a `Context:` section.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        self.with_section(SectionKind::Context, context)
    }

    /// Appends a `Directive:` section.
    pub fn with_directive(self, directive: impl Into<String>) -> Self {
        self.with_section(SectionKind::Directive, directive)
    }

    /// Appends an `Expected Output:` section.
    pub fn with_output(self, output: impl Into<String>) -> Self {
        self.with_section(SectionKind::Output, output)
    }

    /// Appends an `Example:` section.
    pub fn with_example(self, example: impl Into<String>) -> Self {
        self.with_section(SectionKind::Example, example)
    }

    /// Appends a section of any kind, including [`SectionKind::Other`].
    pub fn with_section(mut self, kind: SectionKind, content: impl Into<String>) -> Self {
        self.sections.push(PromptSection {
            content: content.into(),
            kind,
        });
        self
    }

    pub fn sections(&self) -> &[PromptSection] {
        &self.sections
    }

    /// Renders all sections, separated by a blank line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (idx, section) in self.sections.iter().enumerate() {
            if idx > 0 {
                out.push_str("\n\n");
            }
            section.render_into(&mut out);
        }
        out
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
