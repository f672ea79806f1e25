//! The content-addressed resource store (spec.md §4.1), grounded in
//! `data_store/resource_store.py`.
//!
//! Every entity is written to `<resource_id>/resource.<timestamp_micros>`,
//! where `<timestamp_micros>` is the fixed-width value from
//! [`falken_core::timestamp::format_micros`]. Exactly one `resource.*` file
//! is permitted per resource id; [`ResourceStore::list`] walks a glob of
//! such files and returns a page of resource ids plus an opaque
//! continuation token.

use crate::error::{Error, Result};
use crate::filesystem::SharedFileSystem;
use crate::records::Keyed;
use falken_core::resource_id::expand_braces;
use falken_core::timestamp::{format_micros, now_micros};
use falken_core::ResourceId;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const RESOURCE_PREFIX: &str = "resource.";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope<T> {
    timestamp_micros: i64,
    payload: T,
}

/// Filters and pagination for [`ResourceStore::list`] (spec.md §4.1 `List`).
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Exclude entries with a timestamp strictly less than this.
    pub min_timestamp_micros: i64,
    /// Continuation token from a previous call's return value.
    pub page_token: Option<String>,
    /// Caps the number of entries returned; `None` returns everything after
    /// `page_token`.
    pub page_size: Option<usize>,
    /// Sort order; `false` is chronological ascending, `true` is
    /// most-recent-first.
    pub descending: bool,
}

fn encode_token(timestamp_micros: i64, resource_id: &str) -> String {
    format!("{timestamp_micros}:{resource_id}")
}

fn decode_token(token: &str) -> Result<(i64, String)> {
    let (timestamp, resource_id) = token
        .split_once(':')
        .ok_or_else(|| Error::InvalidPageToken(token.to_string()))?;
    let timestamp_micros = timestamp
        .parse::<i64>()
        .map_err(|_| Error::InvalidPageToken(token.to_string()))?;
    Ok((timestamp_micros, resource_id.to_string()))
}

/// Splits a `resource.*` file path into `(owning resource id, timestamp)`.
fn split_resource_path(path: &str) -> Result<(i64, String)> {
    let (dir, filename) = path
        .rsplit_once('/')
        .ok_or_else(|| Error::Corrupt(format!("malformed resource path: {path}")))?;
    let timestamp_str = filename
        .strip_prefix(RESOURCE_PREFIX)
        .ok_or_else(|| Error::Corrupt(format!("malformed resource path: {path}")))?;
    let timestamp_micros = timestamp_str
        .parse::<i64>()
        .map_err(|_| Error::Corrupt(format!("malformed resource timestamp: {path}")))?;
    Ok((timestamp_micros, dir.to_string()))
}

/// `x` sorts "before" `y` under the requested direction: for ascending
/// (chronological) order that is plain `<`; for descending it is `>`,
/// matching `resource_store.py`'s direction-parameterized comparator used
/// to skip everything already returned by a previous page.
fn is_before<T: PartialOrd>(x: &T, y: &T, descending: bool) -> bool {
    if descending {
        x > y
    } else {
        x < y
    }
}

/// Typed, content-addressed storage over a [`crate::filesystem::FileSystem`].
pub struct ResourceStore {
    fs: SharedFileSystem,
}

impl ResourceStore {
    pub fn new(fs: SharedFileSystem) -> Self {
        ResourceStore { fs }
    }

    fn resource_path(resource_id: &ResourceId, timestamp_micros: i64) -> String {
        format!(
            "{}/{RESOURCE_PREFIX}{}",
            resource_id.path(),
            format_micros(timestamp_micros)
        )
    }

    /// Writes `payload` at its own resource id (spec.md §4.1 `Write`).
    ///
    /// Timestamp resolution: if `timestamp_micros` is `Some`, it must agree
    /// with any existing stored timestamp or the write is rejected with
    /// [`Error::VersionConflict`]; if `None`, the existing stored timestamp
    /// is reused, or a fresh `now_micros()` is allocated for a new resource.
    pub async fn write<T>(&self, payload: T, timestamp_micros: Option<i64>) -> Result<ResourceId>
    where
        T: Keyed + Serialize,
    {
        let resource_id = payload.resource_id();
        let existing = match self.read_timestamp_micros(&resource_id).await {
            Ok(ts) => Some(ts),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let effective_timestamp = match (timestamp_micros, existing) {
            (Some(provided), Some(existing)) if provided != existing => {
                return Err(Error::VersionConflict {
                    resource_id: resource_id.path().to_string(),
                    existing,
                    attempted: provided,
                })
            }
            (Some(provided), _) => provided,
            (None, Some(existing)) => existing,
            (None, None) => now_micros(),
        };

        let envelope = Envelope {
            timestamp_micros: effective_timestamp,
            payload,
        };
        let bytes = postcard::to_allocvec(&envelope)?;
        self.fs
            .write_file(&Self::resource_path(&resource_id, effective_timestamp), &bytes)
            .await?;
        Ok(resource_id)
    }

    /// Returns the single stored timestamp for `resource_id`, or
    /// [`Error::NotFound`] if no `resource.*` file exists, or
    /// [`Error::Corrupt`] if more than one does (spec.md §4.1 invariant
    /// "exactly one `resource.*` file per resource id").
    pub async fn read_timestamp_micros(&self, resource_id: &ResourceId) -> Result<i64> {
        let pattern = format!("{}/{RESOURCE_PREFIX}*", resource_id.path());
        let files = self.fs.glob(&pattern).await?;
        match files.as_slice() {
            [] => Err(Error::NotFound(resource_id.path().to_string())),
            [single] => Ok(split_resource_path(single)?.0),
            _ => Err(Error::Corrupt(format!(
                "multiple resource files for {}",
                resource_id.path()
            ))),
        }
    }

    /// Reads and decodes the payload at `resource_id`.
    pub async fn read<T: DeserializeOwned>(&self, resource_id: &ResourceId) -> Result<T> {
        let timestamp_micros = self.read_timestamp_micros(resource_id).await?;
        let bytes = self
            .fs
            .read_file(&Self::resource_path(resource_id, timestamp_micros))
            .await?;
        let envelope: Envelope<T> = postcard::from_bytes(&bytes)?;
        Ok(envelope.payload)
    }

    /// Lists resource ids matching `glob_id` (which may contain `*` and a
    /// single `{a,b,c}` brace group), paginated per `options` (spec.md §4.1
    /// `List`). Returns the page plus a continuation token, empty once the
    /// full matching set has been exhausted.
    pub async fn list(
        &self,
        glob_id: &ResourceId,
        options: &ListOptions,
    ) -> Result<(Vec<ResourceId>, Option<String>)> {
        let mut files = Vec::new();
        for pattern in expand_braces(glob_id.path()) {
            let glob_pattern = format!("{pattern}/{RESOURCE_PREFIX}*");
            files.extend(self.fs.glob(&glob_pattern).await?);
        }

        let mut by_timestamp = Vec::with_capacity(files.len());
        for file in &files {
            by_timestamp.push(split_resource_path(file)?);
        }
        // Ascending (timestamp, resource_id) order, then flipped wholesale
        // for descending so both the primary and tie-break keys invert
        // together, matching `sorted(..., reverse=descending)` over tuples.
        by_timestamp.sort();
        if options.descending {
            by_timestamp.reverse();
        }

        let page_token = match &options.page_token {
            Some(token) if !token.is_empty() => Some(decode_token(token)?),
            _ => None,
        };

        let mut page = Vec::new();
        let mut last_read_index: isize = -1;
        let mut last_timestamp_micros = 0i64;
        for (index, (timestamp_micros, resource_id)) in by_timestamp.iter().enumerate() {
            last_read_index = index as isize;

            if *timestamp_micros < options.min_timestamp_micros {
                continue;
            }
            if let Some((token_timestamp, token_resource_id)) = &page_token {
                if is_before(timestamp_micros, token_timestamp, options.descending) {
                    continue;
                }
                if timestamp_micros == token_timestamp
                    && (resource_id == token_resource_id
                        || is_before(resource_id, token_resource_id, options.descending))
                {
                    continue;
                }
            }

            page.push(ResourceId::from_raw(resource_id.clone()));
            last_timestamp_micros = *timestamp_micros;
            if let Some(page_size) = options.page_size {
                if page.len() == page_size {
                    break;
                }
            }
        }

        let next_token = if last_read_index == by_timestamp.len() as isize - 1 {
            None
        } else {
            let last = page
                .last()
                .expect("a non-empty continuation implies at least one page entry");
            Some(encode_token(last_timestamp_micros, last.path()))
        };

        Ok((page, next_token))
    }

    /// The most recently written resource id matching `glob_id`, or `None`
    /// if nothing matches (`GetMostRecent` in `resource_store.py`).
    pub async fn most_recent(&self, glob_id: &ResourceId) -> Result<Option<ResourceId>> {
        let options = ListOptions {
            descending: true,
            page_size: Some(1),
            ..Default::default()
        };
        let (page, _) = self.list(glob_id, &options).await?;
        Ok(page.into_iter().next())
    }

    /// Removes the stored `resource.*` file(s) at `resource_id`, if any.
    pub async fn delete(&self, resource_id: &ResourceId) -> Result<()> {
        let pattern = format!("{}/{RESOURCE_PREFIX}*", resource_id.path());
        for file in self.fs.glob(&pattern).await? {
            self.fs.remove_file(&file).await?;
        }
        Ok(())
    }
}
