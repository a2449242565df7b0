use crate::models::{Metadata, ScoredResult};
use crate::title::normalised_title;
use chrono::Datelike;
use regex::Regex;
use std::collections::HashMap;

const NO_PUBDATE_PENALTY: i64 = 10;
const MISSING_TOKEN_PENALTY: i64 = 10;
const ISSUE_MISMATCH_PENALTY: i64 = 50;
const INDEX_NOT_IN_TITLE_PENALTY: i64 = 10;
const COLLECTED_EDITION_PENALTY: i64 = 50;
const MISSING_AUTHOR_PENALTY: i64 = 10;

/// Title-match ranking: accumulate penalties against "series #index".
pub fn score_title(
    metadata: &Metadata,
    title: &str,
    issue_number: Option<&str>,
    title_tokens: &[String],
) -> i64 {
    let mut score = 0;
    let series = metadata
        .series
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let index = metadata.series_index.as_deref().unwrap_or_default();
    let volume = format!("{} #{}", series, index);

    // A parenthesized four-digit year in the query scores against the
    // candidate's publication year
    let mut title = title.to_string();
    if let Ok(year_re) = Regex::new(r"\((\d{4})\)") {
        if let Some(caps) = year_re.captures(&title) {
            let year: i64 = caps[1].parse().unwrap_or(0);
            title = year_re.replace_all(&title, "").into_owned();
            match &metadata.pubdate {
                Some(pubdate) => score += (i64::from(pubdate.year()) - year).abs(),
                None => score += NO_PUBDATE_PENALTY,
            }
        }
    }

    score += (volume.chars().count() as i64 - title.chars().count() as i64).abs();
    for token in title_tokens {
        if !volume.contains(token.as_str()) {
            score += MISSING_TOKEN_PENALTY;
        }
    }
    let similarity = strsim::normalized_levenshtein(&volume, &title);
    score += 100 - (100.0 * similarity) as i64;
    if let Some(number) = issue_number {
        if index != number {
            score += ISSUE_MISMATCH_PENALTY;
        }
    }
    if !index.is_empty() && !title.contains(index) {
        score += INDEX_NOT_IN_TITLE_PENALTY;
    }
    // De-preference collected editions: "collects issues", "containing
    // issues" and friends in the description mean a TPB, not a single issue
    if let Some(comments) = &metadata.comments {
        if let Ok(collection_re) = Regex::new(r"(?:collect|contain)(?:s|ing) issues") {
            if collection_re.is_match(&comments.to_lowercase()) {
                score += COLLECTED_EDITION_PENALTY;
            }
        }
    }
    score
}

/// Multi-result comparison key; lower is a better match.
///
/// 1. An exact catalog-identifier match wins outright (score 0).
/// 2. Similar titles are preferred via edit similarity.
/// 3. Entries whose issue number is not in the title are penalised.
/// 4. The more queried authors a candidate is missing, the worse it ranks.
pub fn keygen(
    metadata: &Metadata,
    title: Option<&str>,
    authors: &[String],
    identifiers: &HashMap<String, String>,
    issue_number: Option<&str>,
    title_tokens: &[String],
) -> i64 {
    if let Some(queried) = identifiers.get("comicvine") {
        if metadata.identifier("comicvine") == Some(queried.as_str()) {
            return 0;
        }
    }
    let mut score = 0;
    if let Some(title) = title {
        score += score_title(metadata, title, issue_number, title_tokens);
    }
    for author in authors {
        if !metadata.authors.contains(author) {
            score += MISSING_AUTHOR_PENALTY;
        }
    }
    score
}

/// Impose the final presentation order on accumulated results.
pub fn ranked_results(
    results: Vec<Metadata>,
    title: Option<&str>,
    authors: &[String],
    identifiers: &HashMap<String, String>,
) -> Vec<ScoredResult> {
    let (issue_number, title_tokens) = match title {
        Some(title) => normalised_title(title),
        None => (None, Vec::new()),
    };
    let mut scored: Vec<ScoredResult> = results
        .into_iter()
        .map(|metadata| {
            let score = keygen(
                &metadata,
                title,
                authors,
                identifiers,
                issue_number.as_deref(),
                &title_tokens,
            );
            ScoredResult { score, metadata }
        })
        .collect();
    scored.sort_by_key(|result| result.score);
    scored
}
