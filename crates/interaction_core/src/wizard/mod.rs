//! Resumable multi-step draft editing.
//!
//! A [`Wizard`] walks a [`WizardFlow`] step table. Where it starts is decided
//! only by the persisted draft status and the editing flag (see
//! [`resolve_next`]), so a flow abandoned halfway picks up at the same step
//! after a restart. Every commit is written through the [`DraftStore`]
//! before the next step is chosen.

pub mod flows;
pub mod step;

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{ChannelId, SentMessage, Target, UserId},
    draft::{Draft, DraftKey, DraftStore, DraftUpdate, FieldValue, PublishedRef, StatusUpdate},
    protocol::{
        Button, ButtonStyle, Component, EventPayload, Form, FormInput, InboundEvent,
        OutboundMessage, SelectMenu, SelectOption,
    },
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    correlator::{Correlator, Suspension},
    error::FlowError,
    responder::{DeliveryError, DraftFormatter, Publisher, SideChannel},
};

pub use step::{
    validate_fields, FieldRule, FieldSpec, RejectPolicy, SkipPolicy, StepDescriptor, StepId,
    StepKind, WizardFlow, PREVIEW_STATUS,
};

pub const PUBLISH_ID: &str = "wizard:publish";
pub const EDIT_ID: &str = "wizard:edit";
pub const VIEW_PUBLIC_ID: &str = "wizard:view-public";
pub const EDIT_STEP_ID: &str = "wizard:edit-step";
pub const RETRY_ID: &str = "wizard:retry";
pub const CONTINUE_WITHOUT_ID: &str = "wizard:continue-without";
pub const CANCEL_ID: &str = "wizard:cancel";
pub const YES_ID: &str = "wizard:yes";
pub const NO_ID: &str = "wizard:no";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Step(StepId),
    Preview,
}

/// Where a wizard resumes. Editing always goes to the preview; otherwise the
/// recorded status picks the step, and no status starts from the top.
pub fn resolve_next(flow: &WizardFlow, draft: Option<&Draft>, editing: bool) -> NextStep {
    if editing {
        return NextStep::Preview;
    }

    match draft.and_then(|draft| draft.status.as_deref()) {
        Some(status) => flow
            .step_for_status(status)
            .map(|step| NextStep::Step(step.id))
            .unwrap_or(NextStep::Preview),
        None => flow
            .first()
            .map(|step| NextStep::Step(step.id))
            .unwrap_or(NextStep::Preview),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WizardTimeouts {
    pub prompt: Duration,
    pub side_channel: Duration,
    pub preview: Duration,
}

impl Default for WizardTimeouts {
    fn default() -> Self {
        Self {
            prompt: Duration::from_secs(300),
            side_channel: Duration::from_secs(600),
            preview: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing arrived in the side channel before its deadline.
    SideChannelTimeout,
    /// Input was rejected on a step that cannot re-prompt.
    Rejected(StepId),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardOutcome {
    Published(PublishedRef),
    TimedOut,
    Stopped(StopReason),
}

/// Collaborators shared by every wizard instance.
#[derive(Clone)]
pub struct WizardContext {
    pub correlator: Correlator,
    pub store: Arc<dyn DraftStore>,
    pub side_channel: Arc<dyn SideChannel>,
    pub formatter: Arc<dyn DraftFormatter>,
    pub publisher: Arc<dyn Publisher>,
    pub timeouts: WizardTimeouts,
}

enum StepResult {
    Committed,
    Stop(WizardOutcome),
}

enum PreviewResult {
    Edit(StepId),
    Done(WizardOutcome),
}

pub struct Wizard {
    ctx: WizardContext,
    flow: Arc<WizardFlow>,
    key: DraftKey,
    channel: ChannelId,
    editing: bool,
    pending_edit: Option<StepId>,
    draft: Option<Draft>,
}

impl Wizard {
    pub fn new(ctx: WizardContext, flow: Arc<WizardFlow>, owner: UserId, channel: ChannelId) -> Self {
        let key = DraftKey::new(owner, flow.name);
        Self {
            ctx,
            flow,
            key,
            channel,
            editing: false,
            pending_edit: None,
            draft: None,
        }
    }

    pub fn editing(mut self, editing: bool) -> Self {
        self.editing = editing;
        self
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn next_step(&self) -> NextStep {
        match self.pending_edit {
            Some(step) => NextStep::Step(step),
            None => resolve_next(&self.flow, self.draft.as_ref(), self.editing),
        }
    }

    pub async fn run(mut self) -> Result<WizardOutcome, FlowError> {
        self.flow.validate()?;
        self.draft = self.ctx.store.get(&self.key).await.map_err(FlowError::Store)?;
        if self.editing && self.draft.is_none() {
            return Err(FlowError::precondition(format!(
                "no {} draft to edit for user {}",
                self.flow.name, self.key.owner
            )));
        }
        info!(
            flow = self.flow.name,
            owner = %self.key.owner,
            status = ?self.draft.as_ref().and_then(|draft| draft.status.clone()),
            editing = self.editing,
            "wizard started"
        );

        loop {
            match self.next_step() {
                NextStep::Step(id) => {
                    self.pending_edit = None;
                    if let StepResult::Stop(outcome) = self.run_step(id).await? {
                        info!(flow = self.flow.name, step = %id, ?outcome, "wizard stopped");
                        return Ok(outcome);
                    }
                }
                NextStep::Preview => match self.preview().await? {
                    PreviewResult::Edit(id) => {
                        self.editing = true;
                        self.pending_edit = Some(id);
                    }
                    PreviewResult::Done(outcome) => {
                        info!(flow = self.flow.name, ?outcome, "wizard finished");
                        return Ok(outcome);
                    }
                },
            }
        }
    }

    async fn run_step(&mut self, id: StepId) -> Result<StepResult, FlowError> {
        let flow = self.flow.clone();
        let step = flow
            .step(id)
            .ok_or_else(|| FlowError::precondition(format!("unknown step {id}")))?;
        debug!(flow = flow.name, step = %id, editing = self.editing, "entering step");

        match &step.kind {
            StepKind::Fields {
                title,
                fields,
                on_reject,
            } => self.collect_fields(step, title, fields, *on_reject).await,
            StepKind::Choice {
                key,
                prompt,
                options,
            } => self.collect_choice(step, key, prompt, options).await,
            StepKind::Confirm {
                key,
                question,
                on_no,
            } => self.collect_confirmation(step, key, question, *on_no).await,
            StepKind::SideChannel {
                key,
                label,
                instructions,
                skip,
            } => {
                self.collect_side_channel(step, key, label, instructions, *skip)
                    .await
            }
        }
    }

    async fn collect_fields(
        &mut self,
        step: &StepDescriptor,
        title: &str,
        fields: &[FieldSpec],
        on_reject: RejectPolicy,
    ) -> Result<StepResult, FlowError> {
        let form_id = format!("wizard:{}:{}", self.flow.name, step.id);
        let inputs = fields
            .iter()
            .map(|field| FormInput {
                key: field.key.to_string(),
                label: field.label.to_string(),
                current: self.current_value(field.key),
                multiline: field.multiline,
            })
            .collect();
        let prompt = OutboundMessage::text(format!("**{}**\n{}", self.flow.title, step.label))
            .with_component(Component::Form(Form {
                custom_id: form_id.clone(),
                title: title.to_string(),
                inputs,
            }));
        let sent = self.send(prompt).await?;
        let deadline = Instant::now() + self.ctx.timeouts.prompt;

        loop {
            let event = match self
                .ctx
                .correlator
                .await_submission(&sent, self.key.owner, &form_id, Some(deadline))
                .await?
            {
                Suspension::Resumed(event) => event,
                Suspension::TimedOut => return self.expire(&sent).await,
            };
            let EventPayload::Submission {
                fields: submitted, ..
            } = &event.payload
            else {
                continue;
            };

            match validate_fields(fields, submitted) {
                Ok(values) => {
                    self.acknowledge(&event).await?;
                    let update = values
                        .into_iter()
                        .fold(DraftUpdate::default(), |update, (key, value)| {
                            update.field(key, value)
                        });
                    self.commit(step, update, self.flow.status_after(step.id))
                        .await?;
                    self.close_prompt(&sent, format!("Saved {}.", step.label))
                        .await?;
                    return Ok(StepResult::Committed);
                }
                Err(rejected) => {
                    debug!(flow = self.flow.name, step = %step.id, %rejected, "submission rejected");
                    self.reply_ephemeral(&event, OutboundMessage::ephemeral(rejected.to_string()))
                        .await?;
                    if on_reject == RejectPolicy::Terminate {
                        self.close_prompt(
                            &sent,
                            format!("{rejected}. Run the command again to retry."),
                        )
                        .await?;
                        return Ok(StepResult::Stop(WizardOutcome::Stopped(
                            StopReason::Rejected(step.id),
                        )));
                    }
                }
            }
        }
    }

    async fn collect_choice(
        &mut self,
        step: &StepDescriptor,
        key: &str,
        prompt: &str,
        options: &[(&'static str, &'static str)],
    ) -> Result<StepResult, FlowError> {
        let menu_id = format!("wizard:{}:{}", self.flow.name, step.id);
        let menu = SelectMenu {
            custom_id: menu_id.clone(),
            placeholder: self.current_value(key).unwrap_or_else(|| prompt.to_string()),
            options: options
                .iter()
                .map(|(value, label)| SelectOption {
                    value: value.to_string(),
                    label: label.to_string(),
                })
                .collect(),
        };
        let sent = self
            .send(OutboundMessage::text(prompt).with_component(Component::Select(menu)))
            .await?;
        let deadline = Instant::now() + self.ctx.timeouts.prompt;

        loop {
            let event = match self
                .ctx
                .correlator
                .await_component(&sent, self.key.owner, &[&menu_id], Some(deadline))
                .await?
            {
                Suspension::Resumed(event) => event,
                Suspension::TimedOut => return self.expire(&sent).await,
            };
            let chosen = match &event.payload {
                EventPayload::Select { values, .. } => values
                    .first()
                    .filter(|value| options.iter().any(|(option, _)| *option == value.as_str()))
                    .cloned(),
                _ => None,
            };
            let Some(chosen) = chosen else {
                self.reply_ephemeral(&event, OutboundMessage::ephemeral("Pick one of the listed options."))
                    .await?;
                continue;
            };

            self.acknowledge(&event).await?;
            self.commit(
                step,
                DraftUpdate::default().field(key, FieldValue::Text(chosen.clone())),
                self.flow.status_after(step.id),
            )
            .await?;
            self.close_prompt(&sent, format!("{}: {chosen}", step.label))
                .await?;
            return Ok(StepResult::Committed);
        }
    }

    async fn collect_confirmation(
        &mut self,
        step: &StepDescriptor,
        key: &str,
        question: &str,
        on_no: Option<StepId>,
    ) -> Result<StepResult, FlowError> {
        let prompt = OutboundMessage::text(question)
            .with_button(Button::new(YES_ID, "Yes", ButtonStyle::Primary))
            .with_button(Button::new(NO_ID, "No", ButtonStyle::Secondary));
        let sent = self.send(prompt).await?;
        let deadline = Instant::now() + self.ctx.timeouts.prompt;

        let event = match self
            .ctx
            .correlator
            .await_component(&sent, self.key.owner, &[YES_ID, NO_ID], Some(deadline))
            .await?
        {
            Suspension::Resumed(event) => event,
            Suspension::TimedOut => return self.expire(&sent).await,
        };
        self.acknowledge(&event).await?;

        let confirmed = event.custom_id() == Some(YES_ID);
        let advance_to = if confirmed {
            self.flow.status_after(step.id)
        } else {
            on_no
                .and_then(|target| self.flow.step(target))
                .map(|target| target.status)
                .unwrap_or(PREVIEW_STATUS)
        };
        self.commit(
            step,
            DraftUpdate::default().field(key, FieldValue::Flag(confirmed)),
            advance_to,
        )
        .await?;
        self.close_prompt(&sent, format!("{question} {}", if confirmed { "Yes" } else { "No" }))
            .await?;
        Ok(StepResult::Committed)
    }

    /// Collects content the owner posts in a side channel. A blocked channel
    /// offers retry, and depending on the step's policy, continuing without
    /// the content or cancelling. Running out of time here ends the wizard.
    async fn collect_side_channel(
        &mut self,
        step: &StepDescriptor,
        key: &str,
        label: &str,
        instructions: &str,
        skip: SkipPolicy,
    ) -> Result<StepResult, FlowError> {
        let owner = self.key.owner;
        loop {
            match self
                .ctx
                .side_channel
                .send_to_side_channel(owner, OutboundMessage::text(instructions))
                .await
            {
                Ok(side) => {
                    let notice = self
                        .send(OutboundMessage::text(format!(
                            "Check your direct messages to add {label}."
                        )))
                        .await?;
                    let deadline = Instant::now() + self.ctx.timeouts.side_channel;
                    let event = match self
                        .ctx
                        .correlator
                        .await_follow_up_message(side.channel_id, owner, Some(deadline))
                        .await?
                    {
                        Suspension::Resumed(event) => event,
                        Suspension::TimedOut => {
                            warn!(flow = self.flow.name, step = %step.id, "side channel timed out");
                            self.edit(
                                &notice,
                                OutboundMessage::text(format!(
                                    "Timed out waiting for {label}. Run the command again to pick up where you left off."
                                )),
                            )
                            .await?;
                            return Ok(StepResult::Stop(WizardOutcome::Stopped(
                                StopReason::SideChannelTimeout,
                            )));
                        }
                    };

                    let items = follow_up_items(&event);
                    let count = items.len();
                    self.commit(
                        step,
                        DraftUpdate::default().field(key, FieldValue::List(items)),
                        self.flow.status_after(step.id),
                    )
                    .await?;
                    self.edit(
                        &notice,
                        OutboundMessage::text(format!("Received {count} item(s) for {label}.")),
                    )
                    .await?;
                    return Ok(StepResult::Committed);
                }
                Err(DeliveryError::Blocked(reason)) => {
                    warn!(flow = self.flow.name, step = %step.id, %reason, "side channel blocked");
                    let escape = match skip {
                        SkipPolicy::Allow => {
                            Button::new(CONTINUE_WITHOUT_ID, "Continue without", ButtonStyle::Secondary)
                        }
                        SkipPolicy::Deny => Button::new(CANCEL_ID, "Cancel", ButtonStyle::Danger),
                    };
                    let prompt = OutboundMessage::text(format!(
                        "I couldn't send you a direct message. Allow direct messages and press Retry to add {label}."
                    ))
                    .with_button(Button::new(RETRY_ID, "Retry", ButtonStyle::Primary))
                    .with_button(escape);
                    let sent = self.send(prompt).await?;
                    let deadline = Instant::now() + self.ctx.timeouts.prompt;

                    let event = match self
                        .ctx
                        .correlator
                        .await_component(
                            &sent,
                            owner,
                            &[RETRY_ID, CONTINUE_WITHOUT_ID, CANCEL_ID],
                            Some(deadline),
                        )
                        .await?
                    {
                        Suspension::Resumed(event) => event,
                        Suspension::TimedOut => return self.expire(&sent).await,
                    };
                    self.acknowledge(&event).await?;

                    match event.custom_id() {
                        Some(RETRY_ID) => {
                            self.close_prompt(&sent, "Retrying...").await?;
                        }
                        Some(CONTINUE_WITHOUT_ID) if skip == SkipPolicy::Allow => {
                            self.commit(
                                step,
                                DraftUpdate::default().field(key, FieldValue::Skipped),
                                self.flow.status_after(step.id),
                            )
                            .await?;
                            self.close_prompt(&sent, format!("Continuing without {label}."))
                                .await?;
                            return Ok(StepResult::Committed);
                        }
                        _ => {
                            self.close_prompt(&sent, "Cancelled.").await?;
                            return Ok(StepResult::Stop(WizardOutcome::Stopped(
                                StopReason::Cancelled,
                            )));
                        }
                    }
                }
                Err(DeliveryError::Failed(err)) => return Err(FlowError::Delivery(err)),
            }
        }
    }

    async fn preview(&mut self) -> Result<PreviewResult, FlowError> {
        let draft = self
            .draft
            .clone()
            .ok_or_else(|| FlowError::precondition("preview requires a draft"))?;
        let rendered = self.ctx.formatter.preview(&draft);
        let sent = self
            .send(
                rendered
                    .clone()
                    .with_button(Button::new(PUBLISH_ID, "Publish", ButtonStyle::Success))
                    .with_button(Button::new(EDIT_ID, "Edit", ButtonStyle::Secondary))
                    .with_button(Button::new(VIEW_PUBLIC_ID, "View as others", ButtonStyle::Secondary)),
            )
            .await?;

        loop {
            let deadline = Instant::now() + self.ctx.timeouts.preview;
            let event = match self
                .ctx
                .correlator
                .await_component(
                    &sent,
                    self.key.owner,
                    &[PUBLISH_ID, EDIT_ID, VIEW_PUBLIC_ID],
                    Some(deadline),
                )
                .await?
            {
                Suspension::Resumed(event) => event,
                Suspension::TimedOut => {
                    self.edit(&sent, rendered.clone().without_components(|_| true)).await?;
                    return Ok(PreviewResult::Done(WizardOutcome::TimedOut));
                }
            };

            match event.custom_id() {
                Some(PUBLISH_ID) => {
                    self.acknowledge(&event).await?;
                    let published = self.publish(&draft).await?;
                    self.edit(&sent, rendered.clone().without_components(|_| true)).await?;
                    return Ok(PreviewResult::Done(WizardOutcome::Published(published)));
                }
                Some(EDIT_ID) => {
                    self.acknowledge(&event).await?;
                    self.edit(&sent, rendered.clone().without_components(|_| true)).await?;
                    return Ok(match self.choose_edit_step().await? {
                        Some(step) => PreviewResult::Edit(step),
                        None => PreviewResult::Done(WizardOutcome::TimedOut),
                    });
                }
                _ => {
                    self.reply_ephemeral(&event, self.ctx.formatter.public_view(&draft))
                        .await?;
                }
            }
        }
    }

    async fn choose_edit_step(&mut self) -> Result<Option<StepId>, FlowError> {
        let menu = SelectMenu {
            custom_id: EDIT_STEP_ID.to_string(),
            placeholder: "What do you want to change?".to_string(),
            options: self
                .flow
                .editable_steps()
                .map(|step| SelectOption {
                    value: step.id.0.to_string(),
                    label: step.label.to_string(),
                })
                .collect(),
        };
        let sent = self
            .send(OutboundMessage::text("Pick a section to edit.").with_component(Component::Select(menu)))
            .await?;
        let deadline = Instant::now() + self.ctx.timeouts.prompt;

        loop {
            let event = match self
                .ctx
                .correlator
                .await_component(&sent, self.key.owner, &[EDIT_STEP_ID], Some(deadline))
                .await?
            {
                Suspension::Resumed(event) => event,
                Suspension::TimedOut => {
                    self.close_prompt(&sent, "Timed out.").await?;
                    return Ok(None);
                }
            };
            let step = match &event.payload {
                EventPayload::Select { values, .. } => values
                    .first()
                    .and_then(|value| self.flow.step_named(value))
                    .filter(|step| step.editable)
                    .map(|step| step.id),
                _ => None,
            };
            match step {
                Some(step) => {
                    self.acknowledge(&event).await?;
                    self.close_prompt(&sent, format!("Editing {step}.")).await?;
                    return Ok(Some(step));
                }
                None => {
                    self.reply_ephemeral(&event, OutboundMessage::ephemeral("That section cannot be edited."))
                        .await?;
                }
            }
        }
    }

    /// Updates an existing publication in place when there is one, otherwise
    /// publishes fresh. A failed in-place update is logged and ignored.
    async fn publish(&mut self, draft: &Draft) -> Result<PublishedRef, FlowError> {
        let published = match draft.published {
            Some(existing) => {
                if let Err(err) = self.ctx.publisher.update(&existing, draft).await {
                    warn!(
                        flow = self.flow.name,
                        owner = %self.key.owner,
                        error = %err,
                        "failed to update published draft"
                    );
                }
                existing
            }
            None => self
                .ctx
                .publisher
                .publish(draft)
                .await
                .map_err(FlowError::Publish)?,
        };

        let update = DraftUpdate::default()
            .status(StatusUpdate::Clear)
            .published(published);
        let stored = self
            .ctx
            .store
            .upsert(&self.key, update)
            .await
            .map_err(FlowError::Store)?;
        info!(
            flow = self.flow.name,
            owner = %self.key.owner,
            channel_id = %published.channel_id,
            message_id = %published.message_id,
            "draft published"
        );
        self.draft = Some(stored);
        Ok(published)
    }

    async fn commit(
        &mut self,
        step: &StepDescriptor,
        update: DraftUpdate,
        advance_to: &str,
    ) -> Result<(), FlowError> {
        let status = if self.editing {
            StatusUpdate::Keep
        } else {
            StatusUpdate::Set(advance_to.to_string())
        };
        let stored = self
            .ctx
            .store
            .upsert(&self.key, update.status(status))
            .await
            .map_err(FlowError::Store)?;
        info!(
            flow = self.flow.name,
            step = %step.id,
            status = ?stored.status,
            "step committed"
        );
        self.draft = Some(stored);
        Ok(())
    }

    fn current_value(&self, key: &str) -> Option<String> {
        self.draft
            .as_ref()
            .and_then(|draft| draft.field(key))
            .filter(|value| !matches!(value, FieldValue::Skipped))
            .map(FieldValue::display)
    }

    async fn expire(&self, message: &SentMessage) -> Result<StepResult, FlowError> {
        self.close_prompt(message, "Timed out. Run the command again to continue.")
            .await?;
        Ok(StepResult::Stop(WizardOutcome::TimedOut))
    }

    async fn close_prompt(
        &self,
        message: &SentMessage,
        note: impl Into<String>,
    ) -> Result<(), FlowError> {
        self.edit(message, OutboundMessage::text(note)).await
    }

    async fn send(&self, payload: OutboundMessage) -> Result<SentMessage, FlowError> {
        self.ctx
            .correlator
            .responder()
            .send(Target::Channel(self.channel), payload)
            .await
            .map_err(FlowError::Responder)
    }

    async fn edit(&self, message: &SentMessage, payload: OutboundMessage) -> Result<(), FlowError> {
        self.ctx
            .correlator
            .responder()
            .edit_existing(message, payload)
            .await
            .map_err(FlowError::Responder)
    }

    async fn acknowledge(&self, event: &InboundEvent) -> Result<(), FlowError> {
        self.ctx
            .correlator
            .responder()
            .acknowledge(event)
            .await
            .map_err(FlowError::Responder)
    }

    async fn reply_ephemeral(
        &self,
        event: &InboundEvent,
        payload: OutboundMessage,
    ) -> Result<(), FlowError> {
        self.ctx
            .correlator
            .responder()
            .reply_ephemeral(event, payload)
            .await
            .map_err(FlowError::Responder)
    }
}

/// Attachments win over text; plain text is split into one item per line.
fn follow_up_items(event: &InboundEvent) -> Vec<String> {
    match &event.payload {
        EventPayload::Message {
            attachments,
            content,
        } => {
            if attachments.is_empty() {
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            } else {
                attachments.clone()
            }
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "../tests/wizard_tests.rs"]
mod tests;
