use crate::client::Params;
use crate::collection::LazyCollection;
use crate::error::ApiError;
use crate::resource::Resource;
use crate::title::normalised_title;
use crate::types::ResourceKind;
use crate::Session;
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// Fields a candidate volume needs while searching
const VOLUME_SEARCH_FIELDS: &[&str] = &["id", "name", "count_of_issues", "publisher"];

/// Everything a metadata record is built from, fetched up front for each
/// candidate issue
pub const ISSUE_FIELDS: &[&str] = &[
    "id",
    "name",
    "volume",
    "issue_number",
    "person_credits",
    "description",
    "store_date",
    "cover_date",
    "image",
];

/// Extract the volume name and issue number from an issue title and look up
/// matching candidate volumes.
pub async fn find_title(
    session: &Session,
    title: &str,
    volume_id: Option<u64>,
) -> Result<(Option<String>, Vec<Arc<Resource>>), ApiError> {
    let (issue_number, title_tokens) = normalised_title(title);
    debug!("searching for {:?} #{:?}", title_tokens, issue_number);
    let mut query = title_tokens.join(" AND ");
    if let Some(number) = &issue_number {
        if query.is_empty() {
            query = number.clone();
        } else {
            query = format!("{} AND {}", query, number);
        }
    }
    let candidate_volumes = find_volumes(session, &query, volume_id).await?;
    Ok((issue_number, candidate_volumes))
}

/// Look up volumes matching a search query, or fetch one directly when its
/// id is already known.
pub async fn find_volumes(
    session: &Session,
    query: &str,
    volume_id: Option<u64>,
) -> Result<Vec<Arc<Resource>>, ApiError> {
    let mut candidate_volumes = Vec::new();
    if let Some(id) = volume_id {
        debug!("looking up volume: {}", id);
        candidate_volumes.push(session.fetch(ResourceKind::Volume, id, &[]).await?);
    } else {
        debug!("looking up volume: {}", query);
        let matches = LazyCollection::search(
            session,
            query,
            Some("volume"),
            Params::with_fields(VOLUME_SEARCH_FIELDS),
        )
        .await?;
        let max_volumes = session.config().max_volumes;
        for index in 0..matches.len() {
            if let Some(volume) = matches.get(session, index).await? {
                candidate_volumes.push(volume);
                if candidate_volumes.len() >= max_volumes {
                    break;
                }
            }
        }
    }
    debug!("found {} volume matches", candidate_volumes.len());
    Ok(candidate_volumes)
}

/// Resolve author strings to distinct people. Multi-author strings split on
/// "&"; the placeholder name "Unknown" is skipped.
pub async fn find_authors(
    session: &Session,
    authors: &[String],
) -> Result<Vec<Arc<Resource>>, ApiError> {
    let mut candidate_authors = Vec::new();
    let mut seen = HashSet::new();
    debug!("authors {:?}", authors);
    for author in authors {
        for name in author.split('&') {
            let name = name.trim();
            if name.is_empty() || name == "Unknown" {
                continue;
            }
            debug!("searching for author: {}", name);
            let people = LazyCollection::list(
                session,
                ResourceKind::Person,
                Params::filtered(vec![format!("name:{}", name)], &["id"]),
            )
            .await?;
            if people.is_empty() {
                continue;
            }
            if let Some(person) = people.get(session, 0).await? {
                if seen.insert(person.id()) {
                    candidate_authors.push(person);
                }
            }
        }
    }
    debug!("{} matches found", candidate_authors.len());
    Ok(candidate_authors)
}

/// Find issues in the candidate volumes, optionally filtered to one issue
/// number.
pub async fn find_issues(
    session: &Session,
    candidate_volumes: &[Arc<Resource>],
    issue_number: Option<&str>,
) -> Result<Vec<Arc<Resource>>, ApiError> {
    if candidate_volumes.is_empty() {
        return Ok(Vec::new());
    }
    let volume_filter = format!(
        "volume:{}",
        candidate_volumes
            .iter()
            .map(|volume| volume.id().to_string())
            .collect::<Vec<_>>()
            .join("|")
    );
    let mut issue_filter = vec![volume_filter];
    if let Some(number) = issue_number {
        issue_filter.push(format!("issue_number:{}", number));
    }
    debug!("searching for issues({})", issue_filter.join(","));
    let issues = LazyCollection::list(
        session,
        ResourceKind::Issue,
        Params::filtered(issue_filter, ISSUE_FIELDS),
    )
    .await?;
    let candidate_issues = issues.items(session).await?;
    debug!("{} matches found", candidate_issues.len());
    Ok(candidate_issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::TypeRegistry;

    #[tokio::test]
    async fn test_find_issues_with_no_volumes_is_empty() {
        let config = Config {
            api_key: "test-key".to_string(),
            ..Config::default()
        };
        let session = Session::with_registry(config, TypeRegistry::builtin()).unwrap();
        let issues = find_issues(&session, &[], Some("1")).await.unwrap();
        assert!(issues.is_empty());
    }
}
