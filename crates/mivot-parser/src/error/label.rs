//! Labeled source spans for diagnostic messages.

use crate::Span;

/// How a label is drawn under its source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    /// The element at fault, underlined with `^`.
    Primary,
    /// A related element, such as the first TEMPLATES using a tableref
    /// declared twice, underlined with `-`.
    Secondary,
}

impl LabelStyle {
    fn marker(self) -> &'static str {
        match self {
            LabelStyle::Primary => "^",
            LabelStyle::Secondary => "-",
        }
    }
}

/// A message attached to a span of the annotation source.
#[derive(Debug, Clone)]
pub struct Label {
    span: Span,
    message: String,
    style: LabelStyle,
}

impl Label {
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self::new(span, message, LabelStyle::Primary)
    }

    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self::new(span, message, LabelStyle::Secondary)
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn style(&self) -> LabelStyle {
        self.style
    }

    pub fn is_primary(&self) -> bool {
        self.style == LabelStyle::Primary
    }

    /// One-based line and column of the start of the label in `source`.
    ///
    /// Offsets past the end of `source` point at its end.
    pub fn location(&self, source: &str) -> (usize, usize) {
        let before = source.get(..self.span.start()).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |newline| newline + 1);
        let column = before[line_start..].chars().count() + 1;
        (line, column)
    }

    /// Draw the source line holding the label, underlined from the label
    /// start to the end of the span or of the line.
    ///
    /// ```text
    ///   --> annotation:14:3
    ///    |
    /// 14 |   <TEMPLATES tableref="Results">
    ///    |   ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ duplicate declaration
    /// ```
    pub fn render(&self, source: &str, name: &str) -> String {
        let (line, column) = self.location(source);
        let text = source.lines().nth(line - 1).unwrap_or_default();
        let gutter = " ".repeat(line.to_string().len());

        let indent: String = text
            .chars()
            .take(column - 1)
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        let available = text.chars().count().saturating_sub(column - 1);
        let width = self.span.len().min(available).max(1);
        let underline = self.style.marker().repeat(width);

        format!(
            "{gutter}--> {name}:{line}:{column}\n{gutter} |\n{line} | {text}\n{gutter} | {indent}{underline} {}\n",
            self.message
        )
    }

    fn new(span: Span, message: impl Into<String>, style: LabelStyle) -> Self {
        Self {
            span,
            message: message.into(),
            style,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "<VODML>\n  <TEMPLATES tableref=\"Results\">\n  </TEMPLATES>\n</VODML>";

    #[test]
    fn test_styles() {
        let label = Label::primary(Span::new(10..20), "missing dmtype");
        assert_eq!(label.span(), Span::new(10..20));
        assert_eq!(label.message(), "missing dmtype");
        assert!(label.is_primary());

        let label = Label::secondary(Span::new(5..15), "first declared here");
        assert_eq!(label.style(), LabelStyle::Secondary);
        assert!(!label.is_primary());
    }

    #[test]
    fn test_location() {
        assert_eq!(Label::primary(Span::new(0..7), "").location(SOURCE), (1, 1));
        assert_eq!(Label::primary(Span::new(10..40), "").location(SOURCE), (2, 3));
        assert_eq!(Label::primary(Span::new(500..510), "").location(SOURCE), (4, 9));
    }

    #[test]
    fn test_render() {
        let rendered = Label::primary(Span::new(10..100), "duplicate declaration").render(SOURCE, "annotation");
        assert_eq!(
            rendered,
            " --> annotation:2:3\n  |\n2 |   <TEMPLATES tableref=\"Results\">\n  |   \
             ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ duplicate declaration\n"
        );

        let rendered = Label::secondary(Span::new(0..3), "here").render(SOURCE, "annotation");
        assert!(rendered.ends_with("| --- here\n"));
    }
}
