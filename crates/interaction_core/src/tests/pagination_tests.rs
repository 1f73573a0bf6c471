use super::*;
use crate::tests_support::*;
use shared::protocol::Component;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

#[derive(Default)]
struct CountingRenderer {
    pages: Mutex<Vec<Page<String>>>,
    extra: Option<Button>,
}

impl CountingRenderer {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_extra(button: Button) -> Arc<Self> {
        Arc::new(Self {
            extra: Some(button),
            ..Self::default()
        })
    }

    fn total(&self) -> usize {
        self.pages.lock().expect("pages").len()
    }

    fn count_for(&self, index: usize) -> usize {
        self.pages
            .lock()
            .expect("pages")
            .iter()
            .filter(|page| page.index() == index)
            .count()
    }

    fn rendered(&self) -> Vec<Page<String>> {
        self.pages.lock().expect("pages").clone()
    }
}

#[async_trait]
impl PageRenderer<String> for CountingRenderer {
    async fn render(&self, page: Page<String>) -> anyhow::Result<OutboundMessage> {
        let content = match &page {
            Page::Index(index) => format!("page {index}"),
            Page::Values { index, values } => format!("page {index}: {}", values.join(",")),
        };
        self.pages.lock().expect("pages").push(page);
        let mut message = OutboundMessage::text(content);
        if let Some(button) = &self.extra {
            message = message.with_button(button.clone());
        }
        Ok(message)
    }
}

fn letters(count: usize) -> Vec<String> {
    (0..count).map(|i| ((b'a' + i as u8) as char).to_string()).collect()
}

fn options(
    source: PageSource<String>,
    renderer: Arc<CountingRenderer>,
) -> PaginatorOptions<String> {
    PaginatorOptions::new(source, renderer, OWNER, Target::Channel(CHANNEL))
}

fn button_ids(payload: &OutboundMessage) -> Vec<(String, bool)> {
    payload
        .components
        .iter()
        .filter_map(|component| match component {
            Component::Button(button) => Some((button.custom_id.clone(), button.disabled)),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn navigates_forward_and_back_with_one_render_per_transition() {
    let responder = RecordingResponder::new();
    let (hub, correlator) = correlator_with(responder.clone());
    let renderer = CountingRenderer::new();

    let view = tokio::spawn(Paginator::create(
        correlator.clone(),
        options(PageSource::values(letters(5), 1), renderer.clone())
            .timeout(Duration::from_secs(60)),
    ));
    wait_until(|| correlator.active_waiters() == 1).await;
    let message = responder.last_with_component(NEXT_ID).expect("view sent");
    assert_eq!(renderer.total(), 1);

    hub.emit(button(OWNER, &message, NEXT_ID));
    wait_until(|| renderer.total() == 2 && correlator.active_waiters() == 1).await;
    hub.emit(button(OWNER, &message, PREVIOUS_ID));
    wait_until(|| renderer.total() == 3 && correlator.active_waiters() == 1).await;

    let edits = responder.edits_of(&message);
    assert_eq!(edits.len(), 2);
    assert_eq!(edits[0].content.as_deref(), Some("page 1: b"));
    assert_eq!(edits[1].content.as_deref(), Some("page 0: a"));
    assert_eq!(renderer.total() - 1, 2);

    let outcome = view.await.expect("join").expect("view");
    assert_eq!(outcome, ViewOutcome::TimedOut);
    let stripped = responder.edits_of(&message).pop().expect("strip edit");
    assert!(button_ids(&stripped).is_empty());
    assert_eq!(responder.ack_count(), 2);
}

#[tokio::test]
async fn cache_window_follows_the_current_index() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let renderer = CountingRenderer::new();
    let mut paginator = Paginator::new(
        correlator,
        options(PageSource::Count(10), renderer.clone()).preload(1),
    )
    .expect("paginator");

    paginator.refresh().await.expect("refresh");
    assert_eq!(paginator.cached_indices(), vec![0, 1]);

    assert!(paginator.set_index(3));
    paginator.refresh().await.expect("refresh");
    assert_eq!(paginator.cached_indices(), vec![2, 3, 4]);

    assert!(paginator.set_index(9));
    paginator.refresh().await.expect("refresh");
    assert_eq!(paginator.cached_indices(), vec![8, 9]);

    settle().await;
    assert_eq!(renderer.count_for(8), 1, "neighbour is fetched in the background");
}

#[tokio::test]
async fn unbounded_preload_radius_caches_every_page() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let renderer = CountingRenderer::new();
    let mut paginator = Paginator::new(
        correlator,
        options(PageSource::Count(4), renderer.clone()).preload(usize::MAX),
    )
    .expect("paginator");

    assert!(paginator.set_index(2));
    paginator.refresh().await.expect("refresh");
    assert_eq!(paginator.cached_indices(), vec![0, 1, 2, 3]);

    settle().await;
    assert_eq!(renderer.total(), 4);
}

#[tokio::test]
async fn preloaded_page_is_a_cache_hit() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let renderer = CountingRenderer::new();
    let mut paginator = Paginator::new(
        correlator,
        options(PageSource::Count(4), renderer.clone()).preload(1),
    )
    .expect("paginator");

    paginator.refresh().await.expect("refresh");
    settle().await;
    assert_eq!(renderer.count_for(1), 1);

    paginator.set_index(1);
    paginator.refresh().await.expect("refresh");
    assert_eq!(renderer.count_for(1), 1);
}

#[tokio::test]
async fn clear_cache_then_refresh_fetches_current_page_once() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let renderer = CountingRenderer::new();
    let mut paginator = Paginator::new(
        correlator,
        options(PageSource::Count(5), renderer.clone()).preload(1),
    )
    .expect("paginator");

    paginator.set_index(2);
    paginator.refresh().await.expect("refresh");
    settle().await;
    assert_eq!(renderer.count_for(2), 1);

    paginator.clear_cache();
    assert!(paginator.cached_indices().is_empty());
    paginator.clear_cache();
    paginator.refresh().await.expect("refresh");
    assert_eq!(renderer.count_for(2), 2);
    assert_eq!(paginator.cached_indices(), vec![1, 2, 3]);
}

#[tokio::test]
async fn without_preload_no_background_work_happens() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let renderer = CountingRenderer::new();
    let mut paginator =
        Paginator::new(correlator, options(PageSource::Count(5), renderer.clone()))
            .expect("paginator");

    paginator.refresh().await.expect("refresh");
    settle().await;
    assert_eq!(renderer.total(), 1);
    assert_eq!(paginator.cached_indices(), vec![0]);
}

#[tokio::test]
async fn out_of_range_index_is_a_no_op() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let mut paginator = Paginator::new(
        correlator,
        options(PageSource::Count(3), CountingRenderer::new()),
    )
    .expect("paginator");

    assert!(paginator.set_index(2));
    assert!(!paginator.set_index(3));
    assert_eq!(paginator.index(), 2);
    assert_eq!(paginator.page_count(), 3);
}

#[tokio::test]
async fn controls_are_appended_after_renderer_components() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder.clone());
    let renderer = CountingRenderer::with_extra(Button::new("buy", "Buy", ButtonStyle::Success));
    let refreshed = Arc::new(AtomicUsize::new(0));
    let counter = refreshed.clone();
    let mut paginator = Paginator::new(
        correlator,
        options(PageSource::Count(3), renderer).on_refresh(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .expect("paginator");

    paginator.refresh().await.expect("refresh");
    let (_, payload) = responder.sent().pop().expect("sent");
    assert_eq!(
        button_ids(&payload),
        vec![
            ("buy".to_string(), false),
            (PREVIOUS_ID.to_string(), true),
            (NEXT_ID.to_string(), false),
        ]
    );
    assert_eq!(refreshed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn single_page_keeps_controls_unless_suppressed() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder.clone());

    let mut shown = Paginator::new(
        correlator.clone(),
        options(PageSource::values(letters(2), 5), CountingRenderer::new()),
    )
    .expect("paginator");
    shown.refresh().await.expect("refresh");
    let (_, payload) = responder.sent().pop().expect("sent");
    assert_eq!(
        button_ids(&payload),
        vec![(PREVIOUS_ID.to_string(), true), (NEXT_ID.to_string(), true)]
    );

    let mut hidden = Paginator::new(
        correlator,
        options(PageSource::values(letters(2), 5), CountingRenderer::new())
            .suppress_single_page_controls(),
    )
    .expect("paginator");
    hidden.refresh().await.expect("refresh");
    let (_, payload) = responder.sent().pop().expect("sent");
    assert!(button_ids(&payload).is_empty());
}

#[tokio::test]
async fn value_pages_receive_their_slice() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let renderer = CountingRenderer::new();
    let mut paginator = Paginator::new(
        correlator,
        options(PageSource::values(letters(7), 3), renderer.clone()),
    )
    .expect("paginator");
    assert_eq!(paginator.page_count(), 3);

    paginator.set_index(2);
    paginator.refresh().await.expect("refresh");
    assert_eq!(
        renderer.rendered(),
        vec![Page::Values {
            index: 2,
            values: vec!["g".to_string()],
        }]
    );
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let result = Paginator::new(
        correlator,
        options(PageSource::values(letters(3), 0), CountingRenderer::new()),
    );
    assert!(matches!(result, Err(FlowError::PreconditionViolated(_))));
}

#[tokio::test]
async fn navigation_requires_a_rendered_message() {
    let responder = RecordingResponder::new();
    let (_hub, correlator) = correlator_with(responder);
    let paginator = Paginator::new(
        correlator,
        options(PageSource::Count(2), CountingRenderer::new()),
    )
    .expect("paginator");
    let result = paginator.run().await;
    assert!(matches!(result, Err(FlowError::PreconditionViolated(_))));
}

#[tokio::test(start_paused = true)]
async fn custom_control_can_jump_and_close() {
    let responder = RecordingResponder::new();
    let (hub, correlator) = correlator_with(responder.clone());
    let renderer = CountingRenderer::new();

    let view = tokio::spawn(Paginator::create(
        correlator.clone(),
        options(PageSource::Count(5), renderer.clone())
            .control(Button::new("last", "Last", ButtonStyle::Primary))
            .control(Button::new("close", "Close", ButtonStyle::Danger))
            .on_control(|event, _| match event.custom_id() {
                Some("last") => ControlAction::Jump(4),
                Some("close") => ControlAction::Close,
                _ => ControlAction::Stay,
            }),
    ));
    wait_until(|| correlator.active_waiters() == 1).await;
    let message = responder.last_with_component("last").expect("view sent");

    hub.emit(button(OWNER, &message, "last"));
    wait_until(|| renderer.count_for(4) == 1 && correlator.active_waiters() == 1).await;
    hub.emit(button(OWNER, &message, "close"));

    let outcome = view.await.expect("join").expect("view");
    assert_eq!(outcome, ViewOutcome::Closed);
    let last = responder.edits_of(&message).pop().expect("closing edit");
    assert_eq!(last.content.as_deref(), Some("page 4"));
    assert!(button_ids(&last).is_empty());
}

#[tokio::test(start_paused = true)]
async fn navigation_by_another_user_is_rejected() {
    let responder = RecordingResponder::new();
    let (hub, correlator) = correlator_with(responder.clone());
    let renderer = CountingRenderer::new();

    let view = tokio::spawn(Paginator::create(
        correlator.clone(),
        options(PageSource::Count(3), renderer.clone()).timeout(Duration::from_secs(30)),
    ));
    wait_until(|| correlator.active_waiters() == 1).await;
    let message = responder.last_with_component(NEXT_ID).expect("view sent");

    hub.emit(button(STRANGER, &message, NEXT_ID));
    wait_until(|| responder.ephemerals().len() == 1).await;
    assert_eq!(renderer.total(), 1);

    let outcome = view.await.expect("join").expect("view");
    assert_eq!(outcome, ViewOutcome::TimedOut);
    assert_eq!(renderer.total(), 1);
}
