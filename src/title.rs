use regex::Regex;

/// Break a raw title into searchable parts: an optional issue number and the
/// remaining title tokens, lowercased, in original order.
///
/// The issue number is a trailing numeric token, optionally preceded by `#`
/// and stripped of leading zeros; anything after it (a sub-title) is ignored.
/// The passes run in order; later ones assume the earlier ones already did
/// their cleanup.
pub fn normalised_title(title: &str) -> (Option<String>, Vec<String>) {
    let mut title = collapse_initials(title);
    let passes: &[(&str, &str)] = &[
        // "(of 12)" count annotations
        (r"\s\(?of \d+\)?", ""),
        // volume markers like "v12" or "vol 3"
        (r"(?:v|vol)\s?\d+", ""),
        // any parenthesized aside
        (r"\([^)]+\)", ""),
        // canonicalize the trailing issue number as "#N", dropping leading
        // zeros and anything after it
        (r"(?:# ?)?0*([\d½]+[^:\s]*):?[^\d]*$", "#${1}"),
        (r"\s{2,}", " "),
    ];
    for (pattern, replacement) in passes {
        if let Ok(re) = Regex::new(pattern) {
            title = re.replace_all(&title, *replacement).into_owned();
        }
    }
    let mut issue_number = None;
    if let Ok(issue_re) = Regex::new(r"#([^:\s]+)") {
        if let Some(caps) = issue_re.captures(&title) {
            issue_number = Some(caps[1].to_string());
            title = issue_re.replace_all(&title, "").into_owned();
        }
    }
    (issue_number, title_tokens(&title))
}

/// Collapse dotted initials: "J.R.R." becomes "JRR".
fn collapse_initials(title: &str) -> String {
    match Regex::new(r"((?:^|\s)(?:\w\.){2,})") {
        Ok(re) => re
            .replace_all(title, |caps: &regex::Captures| caps[0].replace('.', ""))
            .into_owned(),
        Err(_) => title.to_string(),
    }
}

/// Split a cleaned title into lowercase tokens, trimming stray punctuation
/// but keeping inner hyphens.
pub fn title_tokens(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .map(|token| {
            token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_without_issue_number() {
        let (issue_number, tokens) = normalised_title("Preacher Special: The Story of You-Know-Who");
        assert_eq!(issue_number, None);
        assert_eq!(
            tokens,
            vec!["preacher", "special", "the", "story", "of", "you-know-who"]
        );
    }

    #[test]
    fn test_long_hash_number() {
        let (issue_number, tokens) = normalised_title("Heavy Metal Magazine #202008");
        assert_eq!(issue_number.as_deref(), Some("202008"));
        assert_eq!(tokens, vec!["heavy", "metal", "magazine"]);
    }

    #[test]
    fn test_bare_trailing_number() {
        let (issue_number, tokens) = normalised_title("Batman 14");
        assert_eq!(issue_number.as_deref(), Some("14"));
        assert_eq!(tokens, vec!["batman"]);
    }

    #[test]
    fn test_leading_zeros_stripped() {
        let (issue_number, _) = normalised_title("Batman #047");
        assert_eq!(issue_number.as_deref(), Some("47"));
    }

    #[test]
    fn test_subtitle_after_number_dropped() {
        let (issue_number, tokens) = normalised_title("Spawn #220: Everything Dies");
        assert_eq!(issue_number.as_deref(), Some("220"));
        assert_eq!(tokens, vec!["spawn"]);
    }

    #[test]
    fn test_parenthetical_and_year_stripped() {
        let (issue_number, tokens) = normalised_title("The Sandman (1989) #7");
        assert_eq!(issue_number.as_deref(), Some("7"));
        assert_eq!(tokens, vec!["the", "sandman"]);
    }

    #[test]
    fn test_of_count_annotation_stripped() {
        let (issue_number, tokens) = normalised_title("Crisis 3 (of 12)");
        assert_eq!(issue_number.as_deref(), Some("3"));
        assert_eq!(tokens, vec!["crisis"]);
    }

    #[test]
    fn test_volume_marker_stripped() {
        let (issue_number, tokens) = normalised_title("Cerebus v12");
        assert_eq!(issue_number, None);
        assert_eq!(tokens, vec!["cerebus"]);
    }

    #[test]
    fn test_dotted_initials_collapsed() {
        let (_, tokens) = normalised_title("J.R.R. Tolkien");
        assert_eq!(tokens, vec!["jrr", "tolkien"]);
    }

    #[test]
    fn test_deterministic() {
        let a = normalised_title("Hellboy: Weird Tales #4");
        let b = normalised_title("Hellboy: Weird Tales #4");
        assert_eq!(a, b);
    }
}
