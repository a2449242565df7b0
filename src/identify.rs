use crate::error::ApiError;
use crate::models::{IdentifyRequest, Metadata};
use crate::resource::Resource;
use crate::schema::FieldValue;
use crate::search::{self, ISSUE_FIELDS};
use crate::types::ResourceKind;
use crate::Session;
use log::{debug, warn};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared sink the workers push finished records into. The single mutex keeps
/// concurrent pushes from interleaving a partial write.
#[derive(Default)]
pub struct ResultSink {
    results: Mutex<Vec<Metadata>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, metadata: Metadata) {
        self.results.lock().unwrap().push(metadata);
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().unwrap().is_empty()
    }

    /// Take everything accumulated so far.
    pub fn take(&self) -> Vec<Metadata> {
        std::mem::take(&mut *self.results.lock().unwrap())
    }
}

/// Build a metadata record from a catalog issue.
///
/// `Ok(None)` means the issue has no resolvable volume; it is logged and
/// skipped rather than failing the overall operation.
pub async fn build_meta(
    session: &Session,
    issue: &Arc<Resource>,
) -> Result<Option<Metadata>, ApiError> {
    issue.ensure_fields(session, ISSUE_FIELDS).await?;
    let volume = match issue.get(session, "volume").await?.resource().cloned() {
        Some(volume) => volume,
        None => {
            warn!("unable to load issue [{}]: no volume", issue.id());
            return Ok(None);
        }
    };
    let volume_name = volume
        .get(session, "name")
        .await?
        .display()
        .unwrap_or_default();
    let issue_number = issue
        .get(session, "issue_number")
        .await?
        .display()
        .unwrap_or_default();

    let mut title = format!("{} #{}", volume_name, issue_number);
    if let Some(issue_name) = issue.get(session, "name").await?.as_str() {
        if !issue_name.is_empty() {
            title = format!("{}: {}", title, issue_name);
        }
    }

    let mut authors = Vec::new();
    let credits = issue.get(session, "person_credits").await?;
    if let Some(people) = credits.list() {
        for person in people {
            if let Some(name) = person.get(session, "name").await?.display() {
                authors.push(name);
            }
        }
    }

    let mut metadata = Metadata::new(title, authors);
    metadata.series = Some(volume_name);
    metadata.series_index = Some(issue_number);
    metadata.set_identifier("comicvine", issue.id().to_string());
    metadata.set_identifier("comicvine-volume", volume.id().to_string());

    metadata.comments = match issue.get(session, "description").await?.as_str() {
        Some(description) if !description.is_empty() => Some(description.to_string()),
        _ => volume
            .get(session, "description")
            .await?
            .as_str()
            .map(str::to_string),
    };

    metadata.has_cover = !issue.get(session, "image").await?.is_null();

    if let Some(publisher) = volume.get(session, "publisher").await?.resource() {
        metadata.publisher = publisher.get(session, "name").await?.display();
    }

    let store_date = issue.get(session, "store_date").await?.datetime();
    metadata.pubdate = match store_date {
        Some(date) => Some(date),
        None => issue.get(session, "cover_date").await?.datetime(),
    };

    Ok(Some(metadata))
}

/// Convert candidate issues to metadata records concurrently.
///
/// A bounded pool of workers drains the candidate queue; a failed candidate
/// is logged and skipped. Once the abort flag is set workers stop taking new
/// candidates, but whatever is already in flight completes.
pub async fn dispatch(
    session: &Session,
    candidate_issues: Vec<Arc<Resource>>,
    sink: &Arc<ResultSink>,
    abort: &Arc<AtomicBool>,
) {
    let queue = Arc::new(Mutex::new(VecDeque::from(candidate_issues)));
    let workers = session.config().worker_threads.max(1);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let session = session.clone();
        let queue = Arc::clone(&queue);
        let sink = Arc::clone(sink);
        let abort = Arc::clone(abort);
        handles.push(tokio::spawn(async move {
            loop {
                if abort.load(Ordering::SeqCst) {
                    break;
                }
                let issue = { queue.lock().unwrap().pop_front() };
                let Some(issue) = issue else { break };
                debug!("adding issue #{} to queue", issue.id());
                match build_meta(&session, &issue).await {
                    Ok(Some(metadata)) => {
                        debug!("added '{}' to queue", metadata.title);
                        sink.push(metadata);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("skipping issue {}: {}", issue.id(), e),
                }
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

/// Attempt to identify catalog issues matching the given query, pushing each
/// match into the sink. Individual candidate failures never fail the
/// operation; configuration failures (no API key) do, up front.
pub async fn identify(
    session: &Session,
    request: &IdentifyRequest,
    sink: &Arc<ResultSink>,
    abort: &Arc<AtomicBool>,
) -> Result<(), ApiError> {
    let mut volume_id = None;

    if let Some(comicvine_id) = request.identifiers.get("comicvine") {
        // Simple lookup when the issue identifier is already known
        let id: u64 = comicvine_id.parse().map_err(|_| {
            ApiError::IllegalArgument(format!("bad comicvine identifier '{}'", comicvine_id))
        })?;
        debug!("looking up issue({})", id);
        let issue = session.fetch(ResourceKind::Issue, id, ISSUE_FIELDS).await?;
        if let Some(metadata) = build_meta(session, &issue).await? {
            sink.push(metadata);
        }
        return Ok(());
    }
    if let Some(comicvine_volume) = request.identifiers.get("comicvine-volume") {
        debug!("we have a volume({})", comicvine_volume);
        volume_id = comicvine_volume.parse().ok();
    }

    let Some(title) = request.title.as_deref() else {
        return Ok(());
    };

    let (issue_number, candidate_volumes) = search::find_title(session, title, volume_id).await?;

    let candidate_authors = if request.authors.is_empty() {
        Vec::new()
    } else {
        search::find_authors(session, &request.authors).await?
    };

    let mut candidate_issues =
        search::find_issues(session, &candidate_volumes, issue_number.as_deref()).await?;

    // Titles sometimes carry a number the catalog does not; if filtering by
    // it found nothing, query again without it
    if candidate_issues.is_empty() && issue_number.is_some() {
        candidate_issues = search::find_issues(session, &candidate_volumes, None).await?;
    }

    // Refine issue selection based on author credits
    if !candidate_authors.is_empty() {
        let mut credited = HashSet::new();
        for author in &candidate_authors {
            let issues = author.get(session, "issue_credits").await?;
            if let Some(list) = issues.list() {
                credited.extend(list.iter().map(|issue| issue.id()));
            }
        }
        candidate_issues.retain(|issue| credited.contains(&issue.id()));
    }

    dispatch(session, candidate_issues, sink, abort).await;
    Ok(())
}

/// Cover URLs for an issue, best quality first.
///
/// The network fetch happens here; the returned sequence is lazy, finite and
/// non-restartable. Resuming a partially consumed sequence after a failure is
/// unsafe, so retry must wrap this call, never the iterator.
pub async fn cover_urls(
    session: &Session,
    comicvine_id: u64,
    get_best_cover: bool,
) -> Result<CoverUrls, ApiError> {
    let issue = session
        .fetch(ResourceKind::Issue, comicvine_id, &["image"])
        .await?;
    let image = issue.get(session, "image").await?;
    let mut urls = Vec::new();
    if let FieldValue::Raw(Value::Object(image)) = &image {
        for key in ["super_url", "medium_url", "small_url"] {
            if let Some(url) = image.get(key).and_then(|value| value.as_str()) {
                urls.push(url.to_string());
                if get_best_cover {
                    break;
                }
            }
        }
    }
    Ok(CoverUrls {
        urls: urls.into_iter(),
    })
}

pub struct CoverUrls {
    urls: std::vec::IntoIter<String>,
}

impl Iterator for CoverUrls {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.urls.next()
    }
}
