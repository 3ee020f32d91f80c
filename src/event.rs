use super::*;

/// Message value of an event whose concrete meaning has not been resolved
/// yet. Chain enumeration requires the event to still carry this.
pub const NO_MESSAGE: u32 = 0;

/// Payload family of an event, as produced by the host's input and
/// mutation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventCategory {
    #[default]
    Basic,
    Gui,
    Mouse,
    Popup,
    MouseScroll,
    Drag,
    Key,
    Text,
    Composition,
    Mutation,
    Command,
    Gesture,
    ScrollArea,
    Transition,
}

/// The low-level event value object threaded through a dispatch. Handlers
/// see and mutate it through the visitors.
pub struct Event {
    pub message: u32,
    pub category: EventCategory,
    pub flags: EventFlags,
    pub target: Option<Rc<dyn EventTarget>>,
    pub original_target: Option<Rc<dyn EventTarget>>,
    pub current_target: Option<Rc<dyn EventTarget>>,
}

impl Event {
    pub fn new(message: u32, category: EventCategory) -> Self {
        Self {
            message,
            category,
            flags: EventFlags::empty(),
            target: None,
            original_target: None,
            current_target: None,
        }
    }

    pub fn trusted(message: u32, category: EventCategory) -> Self {
        let mut event = Self::new(message, category);
        event.flags.insert(EventFlags::TRUSTED);
        event
    }

    pub fn is_trusted(&self) -> bool {
        self.flags.contains(EventFlags::TRUSTED)
    }

    pub fn is_dispatching(&self) -> bool {
        self.flags.contains(EventFlags::DISPATCHING)
    }

    /// Cooperative cancellation: skip the remaining handlers of the
    /// current event group.
    pub fn stop_dispatch(&mut self) {
        self.flags.insert(EventFlags::STOP_DISPATCH);
    }

    pub fn prevent_bubble(&mut self) {
        self.flags.insert(EventFlags::CANT_BUBBLE);
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("message", &self.message)
            .field("category", &self.category)
            .field("flags", &self.flags)
            .field("target", &self.target.as_ref().map(|t| t.target_id()))
            .field(
                "original_target",
                &self.original_target.as_ref().map(|t| t.target_id()),
            )
            .field(
                "current_target",
                &self.current_target.as_ref().map(|t| t.target_id()),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomEventKind {
    Basic,
    Ui,
    Mouse,
    MouseScroll,
    Drag,
    Key,
    Text,
    Mutation,
    Command,
    Gesture,
    ScrollArea,
    Transition,
}

/// Higher-level wrapper handed to script-visible consumers. The
/// dispatcher keeps its mirrored target fields consistent with the
/// payload it was dispatched with.
pub struct DomEvent {
    pub kind: DomEventKind,
    pub type_name: String,
    pub target: Option<Rc<dyn EventTarget>>,
    pub original_target: Option<Rc<dyn EventTarget>>,
    pub trusted: bool,
}

impl DomEvent {
    fn empty(kind: DomEventKind, type_name: &str) -> Self {
        Self {
            kind,
            type_name: type_name.to_string(),
            target: None,
            original_target: None,
            trusted: false,
        }
    }

    fn from_payload(kind: DomEventKind, payload: &Event) -> Self {
        Self {
            kind,
            type_name: String::new(),
            target: payload.target.clone(),
            original_target: payload.original_target.clone(),
            trusted: payload.is_trusted(),
        }
    }
}

impl fmt::Debug for DomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomEvent")
            .field("kind", &self.kind)
            .field("type_name", &self.type_name)
            .field("target", &self.target.as_ref().map(|t| t.target_id()))
            .field("trusted", &self.trusted)
            .finish()
    }
}

struct DomEventSpec {
    kind: DomEventKind,
    categories: &'static [EventCategory],
    type_names: &'static [&'static str],
}

// One row per wrapper variant; payload categories and creation-by-name
// strings both resolve through this table.
const DOM_EVENT_SPECS: &[DomEventSpec] = &[
    DomEventSpec {
        kind: DomEventKind::Basic,
        categories: &[EventCategory::Basic],
        type_names: &["event", "events", "htmlevents"],
    },
    DomEventSpec {
        kind: DomEventKind::Ui,
        categories: &[EventCategory::Gui, EventCategory::Composition],
        type_names: &["uievent", "uievents"],
    },
    DomEventSpec {
        kind: DomEventKind::Mouse,
        categories: &[EventCategory::Mouse, EventCategory::Popup],
        type_names: &["mouseevent", "mouseevents", "popupevents"],
    },
    DomEventSpec {
        kind: DomEventKind::MouseScroll,
        categories: &[EventCategory::MouseScroll],
        type_names: &["mousescrollevents"],
    },
    DomEventSpec {
        kind: DomEventKind::Drag,
        categories: &[EventCategory::Drag],
        type_names: &["dragevent", "dragevents"],
    },
    DomEventSpec {
        kind: DomEventKind::Key,
        categories: &[EventCategory::Key],
        type_names: &["keyboardevent", "keyevents"],
    },
    DomEventSpec {
        kind: DomEventKind::Text,
        categories: &[EventCategory::Text],
        type_names: &["textevent", "textevents"],
    },
    DomEventSpec {
        kind: DomEventKind::Mutation,
        categories: &[EventCategory::Mutation],
        type_names: &["mutationevent", "mutationevents"],
    },
    DomEventSpec {
        kind: DomEventKind::Command,
        categories: &[EventCategory::Command],
        type_names: &["commandevent", "commandevents"],
    },
    DomEventSpec {
        kind: DomEventKind::Gesture,
        categories: &[EventCategory::Gesture],
        type_names: &["simplegestureevent"],
    },
    DomEventSpec {
        kind: DomEventKind::ScrollArea,
        categories: &[EventCategory::ScrollArea],
        type_names: &["scrollareaevent"],
    },
    DomEventSpec {
        kind: DomEventKind::Transition,
        categories: &[EventCategory::Transition],
        type_names: &["transitionevent"],
    },
];

/// Build the higher-level wrapper for a payload, or from a type name when
/// no payload exists yet. Unknown payload categories fall back to the
/// basic wrapper; unknown type names are an error.
pub fn create_event(payload: Option<&Event>, requested_type: &str) -> Result<DomEvent> {
    if let Some(payload) = payload {
        let kind = DOM_EVENT_SPECS
            .iter()
            .find(|spec| spec.categories.contains(&payload.category))
            .map(|spec| spec.kind)
            .unwrap_or(DomEventKind::Basic);
        return Ok(DomEvent::from_payload(kind, payload));
    }

    let wanted = requested_type.to_ascii_lowercase();
    for spec in DOM_EVENT_SPECS {
        if spec.type_names.contains(&wanted.as_str()) {
            return Ok(DomEvent::empty(spec.kind, &wanted));
        }
    }
    Err(Error::UnsupportedEventType(requested_type.to_string()))
}
