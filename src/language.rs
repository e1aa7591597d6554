//! Editor language id → Prettier parser, using Prettier's own support table.

use std::path::Path;

use crate::provider::SupportLanguage;

/// First parser of the language registered for `language_id`.
///
/// Several Prettier languages can share one editor language id (e.g.
/// `javascript` for `.js` and `.mjs` variants, `json` for `.json` and
/// `.importmap`), so a language that also lists the file's extension or
/// file name wins over the first id match.
pub fn parser_from_language_id(
    languages: &[SupportLanguage],
    path: &Path,
    language_id: &str,
) -> Option<String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"));
    let file_name = path.file_name().and_then(|name| name.to_str());

    let mut candidates = languages.iter().filter(|language| {
        !language.parsers.is_empty()
            && language
                .vscode_language_ids
                .iter()
                .any(|id| id == language_id)
    });

    let first = candidates.clone().next();
    let by_file = candidates.find(|language| {
        extension
            .as_ref()
            .is_some_and(|ext| language.extensions.iter().any(|e| e == ext))
            || file_name.is_some_and(|name| language.filenames.iter().any(|f| f == name))
    });

    by_file
        .or(first)
        .and_then(|language| language.parsers.first().cloned())
}
