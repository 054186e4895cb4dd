use std::collections::HashSet;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use browserless_pool::RenderSession;
use flockwatch_common::{
    ChangeEvent, EventKind, FollowerSnapshot, PostItem, StreamMeta, StreamState,
};

/// Extracts platform data from a rendered page session.
///
/// `follower_count` is the cheap probe used to skip the full follower fetch;
/// implementations that cannot read the count without the full page should
/// return `None` and the executor falls back to fetching everything.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn timeline(
        &self,
        session: &dyn RenderSession,
        target: &str,
    ) -> anyhow::Result<Vec<PostItem>>;

    async fn mentions(
        &self,
        session: &dyn RenderSession,
        target: &str,
    ) -> anyhow::Result<Vec<PostItem>>;

    async fn follower_count(
        &self,
        session: &dyn RenderSession,
        target: &str,
    ) -> anyhow::Result<Option<u64>>;

    async fn followers(
        &self,
        session: &dyn RenderSession,
        target: &str,
    ) -> anyhow::Result<FollowerSnapshot>;
}

/// What a single poll produced. `new_state` is `None` when nothing changed,
/// so unchanged polls cost no state write.
#[derive(Debug)]
pub struct PollOutcome {
    pub events: Vec<ChangeEvent>,
    pub new_state: Option<StreamState>,
}

impl PollOutcome {
    fn unchanged() -> Self {
        Self {
            events: Vec::new(),
            new_state: None,
        }
    }
}

pub async fn poll_timeline(
    extractor: &dyn Extractor,
    session: &dyn RenderSession,
    meta: &StreamMeta,
    state: &StreamState,
    seen_cap: usize,
) -> anyhow::Result<PollOutcome> {
    let items = extractor
        .timeline(session, &meta.target)
        .await
        .context("timeline extraction failed")?;
    Ok(diff_posts(meta, state, items, EventKind::Tweet, seen_cap))
}

pub async fn poll_mentions(
    extractor: &dyn Extractor,
    session: &dyn RenderSession,
    meta: &StreamMeta,
    state: &StreamState,
    seen_cap: usize,
) -> anyhow::Result<PollOutcome> {
    let items = extractor
        .mentions(session, &meta.target)
        .await
        .context("mention extraction failed")?;
    Ok(diff_posts(meta, state, items, EventKind::Mention, seen_cap))
}

/// Relationship polls run in two phases: a cheap count probe, then the full
/// follower list only when the count moved or was unreadable.
///
/// The fast path assumes count and handles were written together, so an
/// unchanged count means an unchanged list. A same-count churn (one gained,
/// one lost between polls) is missed until the count moves again.
pub async fn poll_relationship(
    extractor: &dyn Extractor,
    session: &dyn RenderSession,
    meta: &StreamMeta,
    state: &StreamState,
) -> anyhow::Result<PollOutcome> {
    let (stored_handles, stored_count): (&[String], Option<u64>) = match state {
        StreamState::Followers { handles, count } => (handles, *count),
        _ => (&[], None),
    };

    let new_count = extractor
        .follower_count(session, &meta.target)
        .await
        .context("follower count extraction failed")?;
    if new_count.is_some() && new_count == stored_count {
        return Ok(PollOutcome::unchanged());
    }

    let snapshot = extractor
        .followers(session, &meta.target)
        .await
        .context("follower list extraction failed")?;

    let stored_set: HashSet<&str> = stored_handles.iter().map(String::as_str).collect();
    let current_set: HashSet<&str> = snapshot.handles.iter().map(String::as_str).collect();

    let mut events = Vec::new();
    for handle in &snapshot.handles {
        if !stored_set.contains(handle.as_str()) {
            events.push(ChangeEvent::new(
                EventKind::Follow,
                meta.id,
                &meta.target,
                json!({ "handle": handle }),
            ));
        }
    }
    for handle in stored_handles {
        if !current_set.contains(handle.as_str()) {
            events.push(ChangeEvent::new(
                EventKind::Unfollow,
                meta.id,
                &meta.target,
                json!({ "handle": handle }),
            ));
        }
    }

    let freshest = snapshot.total.or(new_count);
    if events.is_empty() {
        if let (Some(previous), Some(current)) = (stored_count, freshest) {
            if previous != current {
                events.push(ChangeEvent::new(
                    EventKind::CountChange,
                    meta.id,
                    &meta.target,
                    json!({
                        "previous": previous,
                        "current": current,
                        "delta": current as i64 - previous as i64,
                    }),
                ));
            }
        }
    }

    Ok(PollOutcome {
        events,
        new_state: Some(StreamState::Followers {
            handles: snapshot.handles,
            count: freshest,
        }),
    })
}

/// Emit one event per post id not yet seen, newest first, and fold the new
/// ids into the seen window. No new ids means no events and no state write.
fn diff_posts(
    meta: &StreamMeta,
    state: &StreamState,
    items: Vec<PostItem>,
    kind: EventKind,
    seen_cap: usize,
) -> PollOutcome {
    let stored_ids: &[String] = match state {
        StreamState::Seen { ids } => ids,
        _ => &[],
    };
    let seen: HashSet<&str> = stored_ids.iter().map(String::as_str).collect();

    let fresh: Vec<&PostItem> = items
        .iter()
        .filter(|item| !seen.contains(item.id.as_str()))
        .collect();
    if fresh.is_empty() {
        return PollOutcome::unchanged();
    }

    let events = fresh
        .iter()
        .map(|item| {
            ChangeEvent::new(
                kind,
                meta.id,
                &meta.target,
                json!({
                    "id": item.id,
                    "author": item.author,
                    "text": item.text,
                    "url": item.url,
                    "postedAt": item.posted_at,
                }),
            )
        })
        .collect();

    let mut ids: Vec<String> = fresh.iter().map(|item| item.id.clone()).collect();
    ids.extend(stored_ids.iter().cloned());
    ids.truncate(seen_cap);

    PollOutcome {
        events,
        new_state: Some(StreamState::Seen { ids }),
    }
}
