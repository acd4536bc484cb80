use serde_json::Value;
use storekit_reactive::{batch, SignalGet, SignalUpdate, SignalWith};
use tracing::{trace, warn};

use super::{
    options::{ResolvedOptions, StartFrom},
    FetchHandle, FetchRequest, FetchStatus, UsageError,
};

/// Scroll position of the list a [`FetchHandle`] feeds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    /// From a scroll view's viewport: the viewport's top offset inside the
    /// content, the content height and the viewport height.
    pub fn from_viewport(y0: f64, content_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_top: y0,
            scroll_height: content_height,
            client_height: viewport_height,
        }
    }

    /// How far down the content the viewport is, rounded to 0..=100.
    /// `None` when the content does not scroll.
    pub fn progress(&self) -> Option<u8> {
        let range = self.scroll_height - self.client_height;
        if range <= 0.0 || !range.is_finite() {
            return None;
        }
        let percent = (self.scroll_top / range * 100.0).round().clamp(0.0, 100.0);
        Some(percent as u8)
    }
}

/// What one scroll update did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollDispatch {
    pub progress: u8,
    pub top: bool,
    pub bottom: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
    Top,
    Bottom,
}

impl FetchHandle {
    /// Records the scroll progress and starts top or bottom pagination
    /// fetches when their thresholds are crossed. Both may start from the
    /// same update.
    pub fn handle_scroll_update(
        &self,
        metrics: ScrollMetrics,
    ) -> Result<ScrollDispatch, UsageError> {
        let options = self.0.options.borrow().resolve()?;

        let Some(progress) = metrics.progress() else {
            self.0.scroll_progress.set(0);
            return Ok(ScrollDispatch::default());
        };
        trace!(id = ?options.id, progress, "scroll progress");
        self.0.scroll_progress.set(progress);

        let wants_top = options
            .top_percentage
            .is_some_and(|threshold| progress <= threshold)
            && self.0.top_status.get_untracked() != FetchStatus::Pending
            && self.0.is_have_more_top.get_untracked()
            && (options.start_from != Some(StartFrom::Top)
                || self.0.getted_to_top.get_untracked() < 0);

        let wants_bottom = options
            .bot_percentage
            .is_some_and(|threshold| progress >= threshold)
            && self.0.bot_status.get_untracked() != FetchStatus::Pending
            && self.0.is_have_more_bot.get_untracked()
            && (options.start_from != Some(StartFrom::Bot)
                || self.0.getted_to_top.get_untracked() > 0);

        let mut dispatch = ScrollDispatch {
            progress,
            ..ScrollDispatch::default()
        };
        if wants_top {
            dispatch.top = self.trigger(Edge::Top, &options)?;
        }
        if wants_bottom {
            dispatch.bottom = self.trigger(Edge::Bottom, &options)?;
        }
        Ok(dispatch)
    }

    fn trigger(&self, edge: Edge, options: &ResolvedOptions) -> Result<bool, UsageError> {
        let instance = &self.0;
        let path = options.path.as_ref().ok_or(UsageError::MissingDataPath)?;
        if !self.has_stored_source() {
            return Err(UsageError::NoStoredFetch);
        }

        let boundary_id = instance.data.with_untracked(|data| {
            let list = data.as_ref().and_then(|data| path.get(data))?.as_array()?;
            let item = match edge {
                Edge::Top => list.first(),
                Edge::Bottom => list.last(),
            }?;
            item.get(&options.item_key).cloned()
        });
        let Some(boundary_id) = boundary_id else {
            warn!(
                id = ?options.id,
                item_key = %options.item_key,
                "scroll fetch aborted: boundary item has no key"
            );
            return Ok(false);
        };

        let (request, step, toward_origin) = match edge {
            Edge::Top => (FetchRequest::ScrollTop, 1, StartFrom::Top),
            Edge::Bottom => (FetchRequest::ScrollBottom, -1, StartFrom::Bot),
        };

        batch(|| {
            instance.getted_to_top.update(|d| *d += step);
            let displacement = instance.getted_to_top.get_untracked();
            if options.start_from == Some(toward_origin)
                && displacement.unsigned_abs() <= u64::from(options.how_much_getted_to_top)
            {
                instance.window_evicted.set(false);
                match edge {
                    Edge::Top => instance.is_have_more_bot.set(true),
                    Edge::Bottom => instance.is_have_more_top.set(true),
                }
            }
            match edge {
                Edge::Top => instance.top_status.set(FetchStatus::Pending),
                Edge::Bottom => instance.bot_status.set(FetchStatus::Pending),
            }
            if let Some(params) = &options.params {
                params.update(|params| {
                    if let Some(key) = &options.relative_params_key {
                        params.insert(key.clone(), boundary_id);
                    }
                    if let Some(key) = &options.up_or_down_params_key {
                        params.insert(key.clone(), Value::Bool(edge == Edge::Top));
                    }
                });
            }
        });

        let fetch = self.refetch(request)?;
        tokio::task::spawn_local(fetch);
        Ok(true)
    }
}
