use globset::GlobBuilder;

/// The candidate whose glob matches `path` most specifically. Catch-all globs
/// rank lowest; equal ranks keep candidate order.
pub(crate) fn select_best_glob_match<'a, T>(
    path: &str,
    candidates: &'a [T],
    glob: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    let mut selected: Option<(&T, (u8, i32))> = None;

    for candidate in candidates {
        let pattern = glob(candidate);
        if !glob_matches_path(pattern, path) {
            continue;
        }
        let rank = glob_specificity_rank(pattern);
        match selected {
            Some((_, existing_rank)) if rank <= existing_rank => {}
            _ => selected = Some((candidate, rank)),
        }
    }

    selected.map(|(candidate, _)| candidate)
}

/// Shell-glob match, case-insensitive, `*` crossing path separators. Invalid
/// patterns match nothing.
pub(crate) fn glob_matches_path(glob: &str, path: &str) -> bool {
    let normalized_glob = glob.trim();
    let normalized_path = path.trim();
    if normalized_glob.is_empty() || normalized_path.is_empty() {
        return false;
    }
    if is_catch_all_glob(normalized_glob) {
        return true;
    }

    GlobBuilder::new(normalized_glob)
        .literal_separator(false)
        .case_insensitive(true)
        .build()
        .map(|compiled| compiled.compile_matcher().is_match(normalized_path))
        .unwrap_or(false)
}

fn glob_specificity_rank(glob: &str) -> (u8, i32) {
    let normalized = glob.trim();
    if is_catch_all_glob(normalized) {
        return (0, i32::MIN);
    }
    (1, glob_specificity_score(normalized))
}

fn glob_specificity_score(glob: &str) -> i32 {
    let mut literal_chars = 0i32;
    let mut wildcard_chars = 0i32;
    for ch in glob.chars() {
        match ch {
            '*' | '?' | '[' | ']' | '{' | '}' => wildcard_chars += 1,
            _ => literal_chars += 1,
        }
    }
    literal_chars - wildcard_chars
}

fn is_catch_all_glob(glob: &str) -> bool {
    glob == "*" || glob == "**/*" || glob == "**"
}

#[cfg(test)]
mod tests {
    use super::{glob_matches_path, select_best_glob_match};

    #[test]
    fn globs_match_case_insensitively_across_separators() {
        assert!(glob_matches_path("*.{md,mdx}", "/notes.MDX"));
        assert!(glob_matches_path("*.json", "/nested/dir/data.json"));
        assert!(glob_matches_path("docs/**/*.md", "docs/nested/readme.md"));
        assert!(!glob_matches_path("docs/**/*.md", "notes/readme.md"));
        assert!(!glob_matches_path("*.{md,mdx", "/notes.md"));
    }

    #[test]
    fn specific_glob_beats_catch_all_and_ties_keep_order() {
        let candidates = [("any", "*"), ("markdown", "*.md"), ("also-markdown", "*.md")];
        let selected =
            select_best_glob_match("/readme.md", &candidates, |candidate| candidate.1)
                .expect("match");
        assert_eq!(selected.0, "markdown");

        let fallback = select_best_glob_match("/image.png", &candidates, |candidate| candidate.1)
            .expect("catch-all");
        assert_eq!(fallback.0, "any");
    }
}
