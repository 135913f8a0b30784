//! Document block model.
//!
//! # Responsibility
//! - Define the minimal block record rows are anchored to.
//! - Derive the plain display text shown in a row anchor cell.
//!
//! # Invariants
//! - `id` is stable for the lifetime of the block.
//! - Anchor text never contains markdown markers and is at most
//!   `ANCHOR_TEXT_MAX_CHARS` characters.

use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;

/// Upper bound for anchor cell display text.
pub const ANCHOR_TEXT_MAX_CHARS: usize = 64;

static MARKDOWN_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*]\([^)]*\)").expect("valid image regex"));
static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static MARKDOWN_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\*_`#>~\[\]]+"#).expect("valid markdown symbol regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Structural kind of a document block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading,
    List,
    ListItem,
    Code,
    /// Block embedding an attribute view. Cannot be a row of another view.
    AttributeView,
    Other,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::List => "list",
            Self::ListItem => "list_item",
            Self::Code => "code",
            Self::AttributeView => "attribute_view",
            Self::Other => "other",
        }
    }
}

impl FromStr for BlockKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "paragraph" => Ok(Self::Paragraph),
            "heading" => Ok(Self::Heading),
            "list" => Ok(Self::List),
            "list_item" => Ok(Self::ListItem),
            "code" => Ok(Self::Code),
            "attribute_view" => Ok(Self::AttributeView),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown block kind `{other}`")),
        }
    }
}

/// Document block as seen by attribute views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: String,
    pub parent_id: Option<String>,
    pub kind: BlockKind,
    /// Markdown source.
    pub content: String,
}

/// Builds the row anchor display text for a block.
///
/// Images are dropped, links keep their label, markdown markers are stripped
/// and whitespace is collapsed. Falls back to the block ID for blank content.
pub fn anchor_display_text(block: &Block) -> String {
    let without_images = MARKDOWN_IMAGE_RE.replace_all(&block.content, " ");
    let without_links = MARKDOWN_LINK_RE.replace_all(&without_images, "$1");
    let without_symbols = MARKDOWN_SYMBOL_RE.replace_all(&without_links, " ");
    let normalized = WHITESPACE_RE.replace_all(&without_symbols, " ");
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        return block.id.clone();
    }
    trimmed.chars().take(ANCHOR_TEXT_MAX_CHARS).collect()
}
