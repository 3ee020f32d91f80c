use std::cell::{Cell, RefCell};
use std::rc::Rc;

use event_chain::{
    Error, Event, EventCategory, EventDispatcher, EventTarget, ListenerRegistry, PhaseMask,
    PostVisitor, PreVisitor, Result, TargetId,
};

type Log = Rc<RefCell<Vec<String>>>;
type Handler = Rc<dyn Fn(&mut PostVisitor<'_>, PhaseMask)>;

struct Registry {
    name: &'static str,
    log: Log,
    handlers: RefCell<Vec<Handler>>,
}

impl ListenerRegistry for Registry {
    fn handle_event(&self, visitor: &mut PostVisitor<'_>, phase: PhaseMask) -> Result<()> {
        let label = if phase.contains(PhaseMask::CAPTURE | PhaseMask::BUBBLE) {
            "target"
        } else if phase.contains(PhaseMask::CAPTURE) {
            "capture"
        } else {
            "bubble"
        };
        self.log
            .borrow_mut()
            .push(format!("{label}:{}", self.name));
        let handlers: Vec<Handler> = self.handlers.borrow().clone();
        for handler in handlers {
            handler(visitor, phase);
        }
        Ok(())
    }
}

struct Node {
    id: u64,
    parent: RefCell<Option<Rc<Node>>>,
    registry: Rc<Registry>,
    can_handle: Cell<bool>,
}

impl EventTarget for Node {
    fn target_id(&self) -> TargetId {
        TargetId(self.id)
    }

    fn pre_handle(&self, visitor: &mut PreVisitor<'_>) -> Result<()> {
        visitor.can_handle = self.can_handle.get();
        visitor.parent_target = self
            .parent
            .borrow()
            .clone()
            .map(|parent| parent as Rc<dyn EventTarget>);
        Ok(())
    }

    fn listener_registry(&self) -> Option<Rc<dyn ListenerRegistry>> {
        Some(Rc::clone(&self.registry) as Rc<dyn ListenerRegistry>)
    }
}

fn node(name: &'static str, id: u64, log: &Log) -> Rc<Node> {
    Rc::new(Node {
        id,
        parent: RefCell::new(None),
        registry: Rc::new(Registry {
            name,
            log: Rc::clone(log),
            handlers: RefCell::new(Vec::new()),
        }),
        can_handle: Cell::new(true),
    })
}

fn chain3(log: &Log) -> (Rc<Node>, Rc<Node>, Rc<Node>) {
    let root = node("root", 1, log);
    let middle = node("middle", 2, log);
    let leaf = node("leaf", 3, log);
    *middle.parent.borrow_mut() = Some(Rc::clone(&root));
    *leaf.parent.borrow_mut() = Some(Rc::clone(&middle));
    (root, middle, leaf)
}

fn dispatch_to(dispatcher: &EventDispatcher, target: &Rc<Node>, event: &mut Event) -> Result<()> {
    dispatcher.dispatch(
        Rc::clone(target) as Rc<dyn EventTarget>,
        None,
        event,
        None,
        None,
        None,
        None,
    )
}

const FULL_WALK: [&str; 10] = [
    "capture:root",
    "capture:middle",
    "target:leaf",
    "bubble:middle",
    "bubble:root",
    "capture:root",
    "capture:middle",
    "target:leaf",
    "bubble:middle",
    "bubble:root",
];

#[test]
fn dispatch_recovers_after_a_rejected_leaf() -> Result<()> {
    let log = Log::default();
    let (_root, _middle, leaf) = chain3(&log);
    let dispatcher = EventDispatcher::new();

    leaf.can_handle.set(false);
    let mut event = Event::new(1, EventCategory::Basic);
    assert_eq!(
        dispatch_to(&dispatcher, &leaf, &mut event),
        Err(Error::CannotHandle)
    );
    assert!(log.borrow().is_empty());

    // The rejected chain went back to the pool; the next dispatch over
    // the same nodes is complete and ordered.
    leaf.can_handle.set(true);
    let mut event = Event::new(1, EventCategory::Basic);
    dispatch_to(&dispatcher, &leaf, &mut event)?;
    assert_eq!(*log.borrow(), FULL_WALK);
    Ok(())
}

#[test]
fn truncated_chain_does_not_leak_into_the_next_dispatch() -> Result<()> {
    let log = Log::default();
    let (_root, middle, leaf) = chain3(&log);
    let dispatcher = EventDispatcher::new();

    middle.can_handle.set(false);
    let mut event = Event::new(1, EventCategory::Basic);
    dispatch_to(&dispatcher, &leaf, &mut event)?;
    assert_eq!(*log.borrow(), vec!["target:leaf", "target:leaf"]);

    middle.can_handle.set(true);
    log.borrow_mut().clear();
    let mut event = Event::new(1, EventCategory::Basic);
    dispatch_to(&dispatcher, &leaf, &mut event)?;
    assert_eq!(*log.borrow(), FULL_WALK);
    Ok(())
}

#[test]
fn nested_dispatch_during_bubble_leaves_the_outer_walk_intact() -> Result<()> {
    let log = Log::default();
    let (_root, middle, leaf) = chain3(&log);
    let other = node("other", 20, &log);

    let dispatcher = Rc::new(EventDispatcher::new());
    {
        let dispatcher = Rc::clone(&dispatcher);
        let other = Rc::clone(&other);
        middle
            .registry
            .handlers
            .borrow_mut()
            .push(Rc::new(move |_visitor: &mut PostVisitor<'_>, phase: PhaseMask| {
                if phase.contains(PhaseMask::BUBBLE)
                    && !phase.contains(PhaseMask::CAPTURE)
                    && !phase.contains(PhaseMask::SYSTEM_GROUP)
                {
                    let mut nested = Event::new(2, EventCategory::Basic);
                    dispatch_to(&dispatcher, &other, &mut nested).unwrap();
                }
            }) as Handler);
    }

    let mut event = Event::new(1, EventCategory::Basic);
    dispatch_to(&dispatcher, &leaf, &mut event)?;

    assert_eq!(
        *log.borrow(),
        vec![
            "capture:root",
            "capture:middle",
            "target:leaf",
            "bubble:middle",
            "target:other",
            "target:other",
            "bubble:root",
            "capture:root",
            "capture:middle",
            "target:leaf",
            "bubble:middle",
            "bubble:root",
        ],
    );
    Ok(())
}

#[test]
fn deep_chain_then_shallow_chain_keeps_ordering() -> Result<()> {
    let log = Log::default();
    let mut nodes = vec![node("deep", 1, &log)];
    for id in 2..=200 {
        let child = node("deep", id, &log);
        *child.parent.borrow_mut() = Some(Rc::clone(nodes.last().unwrap()));
        nodes.push(child);
    }
    let dispatcher = EventDispatcher::new();
    let mut event = Event::new(1, EventCategory::Basic);
    dispatch_to(&dispatcher, nodes.last().unwrap(), &mut event)?;
    // 200 hops, two walks each, two groups.
    assert_eq!(log.borrow().len(), 2 * (2 * 200 - 1));

    // The oversized arena is gone; a fresh shallow dispatch still walks
    // in order.
    log.borrow_mut().clear();
    let (_root, _middle, leaf) = chain3(&log);
    let mut event = Event::new(1, EventCategory::Basic);
    dispatch_to(&dispatcher, &leaf, &mut event)?;
    assert_eq!(*log.borrow(), FULL_WALK);
    Ok(())
}

#[test]
fn recycled_event_can_target_a_different_subtree() -> Result<()> {
    let log = Log::default();
    let (_root, _middle, leaf) = chain3(&log);
    let b_leaf = node("b_leaf", 30, &log);
    let dispatcher = EventDispatcher::new();

    let mut event = Event::new(1, EventCategory::Basic);
    dispatcher.dispatch_dom_event(
        Rc::clone(&leaf) as Rc<dyn EventTarget>,
        None,
        &mut event,
        None,
        true,
        None,
    )?;
    assert_eq!(event.target.as_ref().map(|t| t.target_id()), Some(TargetId(3)));

    log.borrow_mut().clear();
    dispatcher.dispatch_dom_event(
        Rc::clone(&b_leaf) as Rc<dyn EventTarget>,
        None,
        &mut event,
        None,
        true,
        None,
    )?;
    assert_eq!(
        event.target.as_ref().map(|t| t.target_id()),
        Some(TargetId(30))
    );
    assert_eq!(*log.borrow(), vec!["target:b_leaf", "target:b_leaf"]);
    Ok(())
}
