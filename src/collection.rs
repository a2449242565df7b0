use crate::client::Params;
use crate::error::ApiError;
use crate::resource::Resource;
use crate::types::ResourceKind;
use crate::Session;
use log::warn;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// List endpoints paginate with limit/offset; the search endpoint paginates
/// by page number and mixes result types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    List,
    Search,
}

/// One result position. A slot moves placeholder → raw JSON → parsed resource
/// exactly once; `Parsed(None)` is the explicit no-value marker for entries
/// the API delivered empty.
#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Raw(Value),
    Parsed(Option<Arc<Resource>>),
}

/// Paginated sequence over a filtered listing or a search.
///
/// The first request fixes the total length and the page size; indexed and
/// ranged access fetch only the missing page-sized batches. Fetched entries
/// are parsed through the type registry and the identity cache, so a resource
/// appearing in several collections is still one instance.
pub struct LazyCollection {
    kind: Option<ResourceKind>,
    url: String,
    flavor: Flavor,
    total: usize,
    limit: usize,
    args: Params,
    slots: Mutex<Vec<Slot>>,
}

impl LazyCollection {
    /// Open a filtered listing of one resource kind.
    pub async fn list(
        session: &Session,
        kind: ResourceKind,
        args: Params,
    ) -> Result<Self, ApiError> {
        let descriptor = session.registry().descriptor(kind)?.clone();
        let url = format!("{}{}/", session.client().api_base(), descriptor.list_name);
        Self::open(session, Some(kind), url, Flavor::List, args).await
    }

    /// Open a full-text search. Entries may mix types; each one's declared
    /// `resource_type` picks its shape.
    pub async fn search(
        session: &Session,
        query: &str,
        resources: Option<&str>,
        mut args: Params,
    ) -> Result<Self, ApiError> {
        args.query = Some(query.to_string());
        args.resources = resources.map(|r| r.to_string());
        let url = format!("{}search/", session.client().api_base());
        Self::open(session, None, url, Flavor::Search, args).await
    }

    async fn open(
        session: &Session,
        kind: Option<ResourceKind>,
        url: String,
        flavor: Flavor,
        args: Params,
    ) -> Result<Self, ApiError> {
        let mut first = args.clone();
        if flavor == Flavor::Search {
            first.page = Some(1);
        }
        let envelope = session
            .retry()
            .run(|| session.client().execute(&url, &first))
            .await?;
        let total = envelope.number_of_total_results as usize;
        let page_len = match &envelope.results {
            Value::Array(entries) => entries.len(),
            _ => 0,
        };
        let limit = if envelope.limit > 0 {
            envelope.limit as usize
        } else {
            page_len.max(1)
        };
        let collection = LazyCollection {
            kind,
            url,
            flavor,
            total,
            limit,
            args,
            slots: Mutex::new(vec![Slot::Empty; total]),
        };
        collection.fill(&envelope.results, envelope.offset as usize, envelope.number_of_page_results);
        Ok(collection)
    }

    /// A fixed, fully materialized collection. Used for nested list fields
    /// and candidate sets that were assembled locally.
    pub fn from_items(items: Vec<Arc<Resource>>) -> Self {
        let total = items.len();
        LazyCollection {
            kind: None,
            url: String::new(),
            flavor: Flavor::List,
            total,
            limit: total.max(1),
            args: Params::default(),
            slots: Mutex::new(items.into_iter().map(|r| Slot::Parsed(Some(r))).collect()),
        }
    }

    /// Total number of results as reported by the first response. Fixed for
    /// the collection's lifetime; no fetching.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Fetch (if needed) and parse the entry at `index`. `Ok(None)` means the
    /// API delivered no value for that position.
    pub async fn get(
        &self,
        session: &Session,
        index: usize,
    ) -> Result<Option<Arc<Resource>>, ApiError> {
        if index >= self.total {
            return Err(ApiError::IllegalArgument(format!(
                "index {} out of range for collection of {}",
                index, self.total
            )));
        }
        self.ensure_range(session, index, index + 1).await?;
        self.parse_slot(session, index)
    }

    /// Fetch and parse the half-open range `[start, stop)`.
    pub async fn slice(
        &self,
        session: &Session,
        start: usize,
        stop: usize,
    ) -> Result<Vec<Option<Arc<Resource>>>, ApiError> {
        if start > stop || stop > self.total {
            return Err(ApiError::IllegalArgument(format!(
                "range {}..{} out of range for collection of {}",
                start, stop, self.total
            )));
        }
        self.ensure_range(session, start, stop).await?;
        let mut out = Vec::with_capacity(stop - start);
        for index in start..stop {
            out.push(self.parse_slot(session, index)?);
        }
        Ok(out)
    }

    /// Every entry in order; exactly `len()` elements.
    pub async fn to_vec(
        &self,
        session: &Session,
    ) -> Result<Vec<Option<Arc<Resource>>>, ApiError> {
        self.slice(session, 0, self.total).await
    }

    /// Every present entry in order, empty positions dropped.
    pub async fn items(&self, session: &Session) -> Result<Vec<Arc<Resource>>, ApiError> {
        Ok(self.to_vec(session).await?.into_iter().flatten().collect())
    }

    /// Issue page-sized fetches for every unfetched slot in `[start, stop)`.
    async fn ensure_range(
        &self,
        session: &Session,
        start: usize,
        stop: usize,
    ) -> Result<(), ApiError> {
        let step = self.limit.max(1);
        let mut page_start = start - start % step;
        while page_start < stop {
            let page_stop = (page_start + step).min(self.total);
            if self.range_has_empty(page_start, page_stop) {
                let mut params = self.args.clone();
                params.limit = Some(self.limit as u32);
                match self.flavor {
                    Flavor::List => params.offset = Some(page_start as u32),
                    Flavor::Search => params.page = Some((page_start / step + 1) as u32),
                }
                let envelope = session
                    .retry()
                    .run(|| session.client().execute(&self.url, &params))
                    .await?;
                let base = match self.flavor {
                    Flavor::List => page_start,
                    Flavor::Search => envelope.offset as usize,
                };
                self.fill(&envelope.results, base, envelope.number_of_page_results);
            }
            page_start += step;
        }
        Ok(())
    }

    fn range_has_empty(&self, start: usize, stop: usize) -> bool {
        let slots = self.slots.lock().unwrap();
        slots[start..stop].iter().any(|s| matches!(s, Slot::Empty))
    }

    /// Place raw page results by explicit position starting at `base`. Report
    /// counts are verified but not trusted for placement.
    fn fill(&self, results: &Value, base: usize, reported: u32) {
        let entries = match results {
            Value::Array(entries) => entries,
            _ => return,
        };
        if reported as usize != entries.len() {
            warn!(
                "number of page results wrong ({} != {})",
                reported,
                entries.len()
            );
        }
        let mut slots = self.slots.lock().unwrap();
        for (j, entry) in entries.iter().enumerate() {
            let index = base + j;
            if index >= self.total {
                break;
            }
            if matches!(slots[index], Slot::Empty) {
                slots[index] = Slot::Raw(entry.clone());
            }
        }
    }

    fn parse_slot(
        &self,
        session: &Session,
        index: usize,
    ) -> Result<Option<Arc<Resource>>, ApiError> {
        let raw = {
            let slots = self.slots.lock().unwrap();
            match &slots[index] {
                Slot::Parsed(parsed) => return Ok(parsed.clone()),
                // The page fetch came back short of this position; treat as
                // absent but leave the slot refetchable.
                Slot::Empty => return Ok(None),
                Slot::Raw(value) => value.clone(),
            }
        };
        let parsed = self.parse_raw(session, raw);
        let mut slots = self.slots.lock().unwrap();
        if !matches!(slots[index], Slot::Parsed(_)) {
            slots[index] = Slot::Parsed(parsed.clone());
        }
        Ok(parsed)
    }

    fn parse_raw(&self, session: &Session, raw: Value) -> Option<Arc<Resource>> {
        let map = match raw {
            Value::Object(map) => map,
            // Empty or null entries are an explicit "no value", not an empty
            // collection
            Value::Array(entries) if entries.is_empty() => return None,
            Value::Null => return None,
            other => {
                warn!("unparseable collection entry: {}", other);
                return None;
            }
        };
        let descriptor = match self.flavor {
            Flavor::Search => {
                let type_name = map
                    .get("resource_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                session.registry().resolve(type_name)
            }
            Flavor::List => match self.kind.and_then(|k| session.registry().descriptor(k).ok()) {
                Some(descriptor) => descriptor.clone(),
                None => return None,
            },
        };
        let id = match map.get("id").and_then(|v| v.as_u64()) {
            Some(id) => id,
            None => {
                warn!("collection entry without id, skipping");
                return None;
            }
        };
        Some(session.cache().get_or_create(&descriptor, id, Some(map)))
    }
}
