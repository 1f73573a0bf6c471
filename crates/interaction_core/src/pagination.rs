//! Paginated views driven by previous/next controls.
//!
//! Pages are rendered on demand and memoised in a cache owned by the
//! [`Paginator`]. With `preload_pages = k` every render also warms up to `k`
//! pages on either side in the background, and anything outside
//! `[index - k, index + k]` is evicted in the same pass.

use std::{collections::BTreeMap, ops::RangeInclusive, sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::{SentMessage, Target, UserId},
    protocol::{Button, ButtonStyle, InboundEvent, OutboundMessage},
};
use tokio::{sync::OnceCell, task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use crate::{
    correlator::{Correlator, Suspension},
    error::FlowError,
};

pub const PREVIOUS_ID: &str = "page:previous";
pub const NEXT_ID: &str = "page:next";

#[derive(Debug, Clone)]
pub enum PageSource<T> {
    /// A fixed number of pages addressed by index.
    Count(usize),
    /// An ordered collection sliced into pages of `per_page` values.
    Values { values: Arc<Vec<T>>, per_page: usize },
}

impl<T: Clone> PageSource<T> {
    pub fn values(values: Vec<T>, per_page: usize) -> Self {
        PageSource::Values {
            values: Arc::new(values),
            per_page,
        }
    }

    fn page_count(&self) -> Result<usize, FlowError> {
        match self {
            PageSource::Count(count) => Ok((*count).max(1)),
            PageSource::Values { per_page: 0, .. } => {
                Err(FlowError::precondition("page size must be at least 1"))
            }
            PageSource::Values { values, per_page } => Ok(values.len().div_ceil(*per_page).max(1)),
        }
    }

    fn page(&self, index: usize) -> Page<T> {
        match self {
            PageSource::Count(_) => Page::Index(index),
            PageSource::Values { values, per_page } => {
                let start = (index * per_page).min(values.len());
                let end = (start + per_page).min(values.len());
                Page::Values {
                    index,
                    values: values[start..end].to_vec(),
                }
            }
        }
    }
}

/// What the renderer is asked to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page<T> {
    Index(usize),
    Values { index: usize, values: Vec<T> },
}

impl<T> Page<T> {
    pub fn index(&self) -> usize {
        match self {
            Page::Index(index) | Page::Values { index, .. } => *index,
        }
    }
}

#[async_trait]
pub trait PageRenderer<T>: Send + Sync {
    async fn render(&self, page: Page<T>) -> anyhow::Result<OutboundMessage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Stay,
    Jump(usize),
    Refresh,
    ClearAndRefresh,
    Close,
}

pub type ControlHook = Arc<dyn Fn(&InboundEvent, usize) -> ControlAction + Send + Sync>;
pub type RefreshHook = Arc<dyn Fn(usize) + Send + Sync>;

pub struct PaginatorOptions<T> {
    pub source: PageSource<T>,
    pub renderer: Arc<dyn PageRenderer<T>>,
    pub owner: UserId,
    pub target: Target,
    pub preload_pages: usize,
    /// Idle time allowed between navigations.
    pub timeout: Option<Duration>,
    pub suppress_single_page_controls: bool,
    pub custom_controls: Vec<Button>,
    pub on_control: Option<ControlHook>,
    pub on_refresh: Option<RefreshHook>,
}

impl<T> PaginatorOptions<T> {
    pub fn new(
        source: PageSource<T>,
        renderer: Arc<dyn PageRenderer<T>>,
        owner: UserId,
        target: Target,
    ) -> Self {
        Self {
            source,
            renderer,
            owner,
            target,
            preload_pages: 0,
            timeout: None,
            suppress_single_page_controls: false,
            custom_controls: Vec::new(),
            on_control: None,
            on_refresh: None,
        }
    }

    pub fn preload(mut self, pages: usize) -> Self {
        self.preload_pages = pages;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn suppress_single_page_controls(mut self) -> Self {
        self.suppress_single_page_controls = true;
        self
    }

    pub fn control(mut self, button: Button) -> Self {
        self.custom_controls.push(button);
        self
    }

    pub fn on_control(
        mut self,
        hook: impl Fn(&InboundEvent, usize) -> ControlAction + Send + Sync + 'static,
    ) -> Self {
        self.on_control = Some(Arc::new(hook));
        self
    }

    pub fn on_refresh(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_refresh = Some(Arc::new(hook));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    TimedOut,
    Closed,
}

struct CacheEntry {
    content: Arc<OnceCell<OutboundMessage>>,
    preload: Option<JoinHandle<()>>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            content: Arc::new(OnceCell::new()),
            preload: None,
        }
    }

    fn fetch_in_flight(&self) -> bool {
        self.preload
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        if let Some(handle) = self.preload.take() {
            handle.abort();
        }
    }
}

#[derive(Default)]
struct PageCache {
    entries: BTreeMap<usize, CacheEntry>,
}

impl PageCache {
    fn entry(&mut self, index: usize) -> &mut CacheEntry {
        self.entries.entry(index).or_insert_with(CacheEntry::new)
    }

    fn retain(&mut self, window: &RangeInclusive<usize>) {
        self.entries.retain(|index, _| window.contains(index));
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn indices(&self) -> Vec<usize> {
        self.entries.keys().copied().collect()
    }
}

pub struct Paginator<T> {
    correlator: Correlator,
    options: PaginatorOptions<T>,
    index: usize,
    last_index: usize,
    cache: PageCache,
    message: Option<SentMessage>,
    rendered: Option<OutboundMessage>,
}

impl<T> Paginator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(correlator: Correlator, options: PaginatorOptions<T>) -> Result<Self, FlowError> {
        let last_index = options.source.page_count()? - 1;
        Ok(Self {
            correlator,
            options,
            index: 0,
            last_index,
            cache: PageCache::default(),
            message: None,
            rendered: None,
        })
    }

    /// Renders the first page, sends it and navigates until the view times
    /// out or a control closes it.
    pub async fn create(
        correlator: Correlator,
        options: PaginatorOptions<T>,
    ) -> Result<ViewOutcome, FlowError> {
        let mut paginator = Self::new(correlator, options)?;
        paginator.refresh().await?;
        paginator.run().await
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn page_count(&self) -> usize {
        self.last_index + 1
    }

    pub fn message(&self) -> Option<SentMessage> {
        self.message
    }

    /// Moves to `index` on the next [`refresh`](Self::refresh). Out of range
    /// requests leave the index unchanged and return `false`.
    pub fn set_index(&mut self, index: usize) -> bool {
        if index > self.last_index {
            return false;
        }
        self.index = index;
        true
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_indices(&self) -> Vec<usize> {
        self.cache.indices()
    }

    pub async fn refresh(&mut self) -> Result<(), FlowError> {
        let content = self.render_current().await?;
        self.preload_and_evict();

        if let Some(hook) = &self.options.on_refresh {
            hook(self.index);
        }

        let payload = self.with_controls(content);
        let responder = self.correlator.responder().clone();
        match self.message {
            Some(message) => responder
                .edit_existing(&message, payload.clone())
                .await
                .map_err(FlowError::Responder)?,
            None => {
                let sent = responder
                    .send(self.options.target, payload.clone())
                    .await
                    .map_err(FlowError::Responder)?;
                self.message = Some(sent);
            }
        }
        self.rendered = Some(payload);
        Ok(())
    }

    pub async fn run(mut self) -> Result<ViewOutcome, FlowError> {
        let Some(message) = self.message else {
            return Err(FlowError::precondition(
                "paginator must be rendered before it can navigate",
            ));
        };

        let control_ids = self.control_ids();
        let control_ids: Vec<&str> = control_ids.iter().map(String::as_str).collect();
        loop {
            let deadline = self.options.timeout.map(|timeout| Instant::now() + timeout);
            let event = match self
                .correlator
                .await_component(&message, self.options.owner, &control_ids, deadline)
                .await?
            {
                Suspension::TimedOut => {
                    debug!(index = self.index, "paginator timed out");
                    self.strip_controls().await?;
                    return Ok(ViewOutcome::TimedOut);
                }
                Suspension::Resumed(event) => event,
            };

            self.correlator
                .responder()
                .acknowledge(&event)
                .await
                .map_err(FlowError::Responder)?;

            match self.action_for(&event) {
                ControlAction::Stay => {}
                ControlAction::Jump(index) => {
                    if index != self.index && self.set_index(index) {
                        self.refresh().await?;
                    }
                }
                ControlAction::Refresh => self.refresh().await?,
                ControlAction::ClearAndRefresh => {
                    self.clear_cache();
                    self.refresh().await?;
                }
                ControlAction::Close => {
                    self.strip_controls().await?;
                    return Ok(ViewOutcome::Closed);
                }
            }
        }
    }

    fn action_for(&self, event: &InboundEvent) -> ControlAction {
        match event.custom_id() {
            Some(PREVIOUS_ID) => ControlAction::Jump(self.index.saturating_sub(1)),
            Some(NEXT_ID) => ControlAction::Jump((self.index + 1).min(self.last_index)),
            _ => self
                .options
                .on_control
                .as_ref()
                .map(|hook| hook(event, self.index))
                .unwrap_or(ControlAction::Stay),
        }
    }

    async fn render_current(&mut self) -> Result<OutboundMessage, FlowError> {
        let index = self.index;
        let cell = self.cache.entry(index).content.clone();
        if let Some(content) = cell.get() {
            return Ok(content.clone());
        }

        let page = self.options.source.page(index);
        let renderer = self.options.renderer.clone();
        let content = cell
            .get_or_try_init(|| async move { renderer.render(page).await })
            .await
            .map_err(FlowError::Render)?;
        Ok(content.clone())
    }

    fn preload_and_evict(&mut self) {
        let radius = self.options.preload_pages;
        let window = self.index.saturating_sub(radius)
            ..=self.index.saturating_add(radius).min(self.last_index);
        self.cache.retain(&window);
        if radius == 0 {
            return;
        }

        for index in window {
            if index == self.index {
                continue;
            }
            let page = self.options.source.page(index);
            let renderer = self.options.renderer.clone();
            let entry = self.cache.entry(index);
            if entry.content.initialized() || entry.fetch_in_flight() {
                continue;
            }

            let cell = entry.content.clone();
            entry.preload = Some(tokio::spawn(async move {
                let result = cell
                    .get_or_try_init(|| async move { renderer.render(page).await })
                    .await;
                if let Err(err) = result {
                    warn!(index, error = %err, "background page render failed");
                }
            }));
        }
    }

    fn with_controls(&self, mut payload: OutboundMessage) -> OutboundMessage {
        let single_page = self.last_index == 0;
        if !(single_page && self.options.suppress_single_page_controls) {
            payload = payload
                .with_button(
                    Button::new(PREVIOUS_ID, "Previous", ButtonStyle::Secondary)
                        .disabled(self.index == 0),
                )
                .with_button(
                    Button::new(NEXT_ID, "Next", ButtonStyle::Secondary)
                        .disabled(self.index == self.last_index),
                );
        }
        for button in &self.options.custom_controls {
            payload = payload.with_button(button.clone());
        }
        payload
    }

    fn control_ids(&self) -> Vec<String> {
        let mut ids = vec![PREVIOUS_ID.to_string(), NEXT_ID.to_string()];
        ids.extend(
            self.options
                .custom_controls
                .iter()
                .map(|button| button.custom_id.clone()),
        );
        ids
    }

    async fn strip_controls(&mut self) -> Result<(), FlowError> {
        let (Some(message), Some(rendered)) = (self.message, self.rendered.take()) else {
            return Ok(());
        };
        let control_ids = self.control_ids();
        let stripped =
            rendered.without_components(|id| control_ids.iter().any(|control| control == id));
        self.correlator
            .responder()
            .edit_existing(&message, stripped.clone())
            .await
            .map_err(FlowError::Responder)?;
        self.rendered = Some(stripped);
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
