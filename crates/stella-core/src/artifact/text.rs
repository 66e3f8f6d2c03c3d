use super::ArtifactError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextParsingOptions {
    #[serde(rename = "skipEmptyLines", default = "default_true")]
    pub skip_empty_lines: bool,
    #[serde(rename = "commentPrefixes", default = "default_comment_prefixes")]
    pub comment_prefixes: Vec<String>,
}

impl Default for TextParsingOptions {
    fn default() -> Self {
        Self {
            skip_empty_lines: true,
            comment_prefixes: default_comment_prefixes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_comment_prefixes() -> Vec<String> {
    vec!["#".to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub line_number: usize,
    pub tokens: Vec<String>,
}

/// Line-oriented dump (e.g. `final_fields`) split into whitespace-delimited tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextArtifact {
    lines: Vec<TextLine>,
}

impl TextArtifact {
    pub fn load(path: impl AsRef<Path>, options: &TextParsingOptions) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ArtifactError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8(bytes).map_err(|source| ArtifactError::Encoding {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            lines: parse_lines(&content, options),
        })
    }

    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }
}

fn parse_lines(content: &str, options: &TextParsingOptions) -> Vec<TextLine> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, raw_line)| {
            let trimmed = raw_line.trim();
            if options.skip_empty_lines && trimmed.is_empty() {
                return None;
            }
            if starts_with_comment(trimmed, &options.comment_prefixes) {
                return None;
            }
            Some(TextLine {
                line_number: index + 1,
                tokens: trimmed.split_whitespace().map(str::to_string).collect(),
            })
        })
        .collect()
}

fn starts_with_comment(line: &str, comment_prefixes: &[String]) -> bool {
    comment_prefixes
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .any(|prefix| line.starts_with(prefix.as_str()))
}
