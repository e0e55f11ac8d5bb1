//! The artifact naming rule: map a source document name to the name its
//! derived audio artifact will appear under.
//!
//! The rule is the only link between the two storage namespaces. The external
//! conversion worker writes its output under exactly this name, so the
//! tracker can test for conversion completion with a single listing call and
//! no shared database.
//!
//! Names lacking the source extension are returned unchanged. That is an
//! accepted edge case, not a fault: such names cannot have been uploaded
//! through the normal flow, and degrading to identity keeps the rule total.

/// Derive the artifact name for `source` using the default `epub` → `mp3`
/// extension mapping.
///
/// ```rust
/// use readsai_sync::naming::derive_artifact_name;
///
/// assert_eq!(derive_artifact_name("notes.epub"), "notes.mp3");
/// assert_eq!(derive_artifact_name("readme"), "readme");
/// ```
pub fn derive_artifact_name(source: &str) -> String {
    derive_artifact_name_with(source, "epub", "mp3")
}

/// Derive the artifact name for `source` with configurable extensions.
///
/// The extension match is case-insensitive (`Book.EPUB` converts like
/// `book.epub`); the stem is preserved verbatim. Extensions are written
/// without the leading dot.
pub fn derive_artifact_name_with(source: &str, source_ext: &str, artifact_ext: &str) -> String {
    let suffix = format!(".{source_ext}");
    let split = source.len().wrapping_sub(suffix.len());
    if source.len() >= suffix.len()
        && source.is_char_boundary(split)
        && source[split..].eq_ignore_ascii_case(&suffix)
    {
        format!("{}.{}", &source[..split], artifact_ext)
    } else {
        source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_recognised_extension() {
        assert_eq!(derive_artifact_name("notes.epub"), "notes.mp3");
        assert_eq!(derive_artifact_name("book1.epub"), "book1.mp3");
    }

    #[test]
    fn passes_through_unrecognised_names() {
        assert_eq!(derive_artifact_name("readme"), "readme");
        assert_eq!(derive_artifact_name("notes.txt"), "notes.txt");
        assert_eq!(derive_artifact_name(""), "");
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert_eq!(derive_artifact_name("Book.EPUB"), "Book.mp3");
        assert_eq!(derive_artifact_name("Book.Epub"), "Book.mp3");
    }

    #[test]
    fn only_a_trailing_extension_counts() {
        assert_eq!(derive_artifact_name("a.epub.bak"), "a.epub.bak");
        assert_eq!(derive_artifact_name("epub"), "epub");
    }

    #[test]
    fn stem_is_preserved_verbatim() {
        assert_eq!(derive_artifact_name("Mémoires d'été.epub"), "Mémoires d'été.mp3");
        assert_eq!(derive_artifact_name("a b c.epub"), "a b c.mp3");
    }

    #[test]
    fn custom_extensions() {
        assert_eq!(
            derive_artifact_name_with("draft.docx", "docx", "wav"),
            "draft.wav"
        );
        assert_eq!(
            derive_artifact_name_with("draft.epub", "docx", "wav"),
            "draft.epub"
        );
    }

    #[test]
    fn non_ascii_tail_does_not_panic() {
        // Shorter than the suffix and ending mid-codepoint territory.
        assert_eq!(derive_artifact_name("é"), "é");
        assert_eq!(derive_artifact_name("livré"), "livré");
    }
}
