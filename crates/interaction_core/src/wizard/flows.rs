//! Built-in step tables.

use super::step::{FieldSpec, RejectPolicy, SkipPolicy, StepDescriptor, StepKind, WizardFlow};

pub const LISTING_FLOW: &str = "listing";
pub const REQUEST_FLOW: &str = "request";

/// Offering something: title, details, category, then optional photos
/// collected over direct messages.
pub fn listing() -> WizardFlow {
    WizardFlow {
        name: LISTING_FLOW,
        title: "New listing",
        steps: vec![
            StepDescriptor::new(
                "title",
                "Title",
                StepKind::Fields {
                    title: "Listing title",
                    fields: vec![FieldSpec::text("title", "Title", 3, 80).forbid("http")],
                    on_reject: RejectPolicy::Reprompt,
                },
            ),
            StepDescriptor::new(
                "details",
                "Description and price",
                StepKind::Fields {
                    title: "Listing details",
                    fields: vec![
                        FieldSpec::text("description", "Description", 10, 1000).multiline(),
                        FieldSpec::integer("price", "Price", 0, 1_000_000),
                    ],
                    on_reject: RejectPolicy::Reprompt,
                },
            ),
            StepDescriptor::new(
                "category",
                "Category",
                StepKind::Choice {
                    key: "category",
                    prompt: "Which category fits best?",
                    options: vec![
                        ("electronics", "Electronics"),
                        ("furniture", "Furniture"),
                        ("vehicles", "Vehicles"),
                        ("other", "Other"),
                    ],
                },
            ),
            StepDescriptor::new(
                "wants_photos",
                "Photos",
                StepKind::Confirm {
                    key: "has_photos",
                    question: "Do you want to add photos?",
                    on_no: None,
                },
            )
            .locked(),
            StepDescriptor::new(
                "photos",
                "Photos",
                StepKind::SideChannel {
                    key: "photos",
                    label: "photos",
                    instructions: "Reply to this message with the photos for your listing.",
                    skip: SkipPolicy::Allow,
                },
            ),
        ],
    }
}

/// Looking for something: what, budget, urgency, and a contact collected
/// privately. The contact is required, so a blocked side channel can only
/// be retried or cancelled.
pub fn request() -> WizardFlow {
    WizardFlow {
        name: REQUEST_FLOW,
        title: "New request",
        steps: vec![
            StepDescriptor::new(
                "summary",
                "What you are looking for",
                StepKind::Fields {
                    title: "Request",
                    fields: vec![FieldSpec::text("title", "What are you looking for?", 3, 80)],
                    on_reject: RejectPolicy::Reprompt,
                },
            ),
            StepDescriptor::new(
                "budget",
                "Budget and notes",
                StepKind::Fields {
                    title: "Budget",
                    fields: vec![
                        FieldSpec::integer("budget", "Budget", 0, 1_000_000),
                        FieldSpec::text("notes", "Notes", 0, 500).optional().multiline(),
                    ],
                    on_reject: RejectPolicy::Reprompt,
                },
            ),
            StepDescriptor::new(
                "urgency",
                "Urgency",
                StepKind::Choice {
                    key: "urgency",
                    prompt: "How soon do you need it?",
                    options: vec![
                        ("today", "Today"),
                        ("this_week", "This week"),
                        ("flexible", "Flexible"),
                    ],
                },
            ),
            StepDescriptor::new(
                "share_contact",
                "Contact",
                StepKind::Confirm {
                    key: "share_contact",
                    question: "Can sellers contact you directly?",
                    on_no: None,
                },
            )
            .locked(),
            StepDescriptor::new(
                "contact",
                "Contact details",
                StepKind::SideChannel {
                    key: "contact",
                    label: "your contact details",
                    instructions: "Reply with how sellers can reach you.",
                    skip: SkipPolicy::Deny,
                },
            ),
        ],
    }
}

pub fn by_name(name: &str) -> Option<WizardFlow> {
    match name {
        LISTING_FLOW => Some(listing()),
        REQUEST_FLOW => Some(request()),
        _ => None,
    }
}

