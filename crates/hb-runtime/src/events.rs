//! Deferred event dispatch.
//!
//! Registrations land in a pending list that is merged into the active list
//! at the start of the next dispatch, so a listener added while an event is
//! being delivered only sees later events. The active list sits behind a
//! re-entrant lock and is walked by index without holding a `RefCell` borrow
//! across the callback, which lets callbacks add, remove or clear listeners.
//! Lock order is always active list, then pending list.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use hb_core::{BridgeError, EntityRef, Event};
use parking_lot::{Mutex, ReentrantMutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventListenerHandle {
    pub id: u64,
}

#[derive(Debug, Clone)]
pub struct EventListener<C> {
    pub id: u64,
    pub event: String,
    pub entity: Option<EntityRef>,
    pub callback: C,
    pub is_volatile: bool,
    pub is_deleted: bool,
    pub endon_conditions: BTreeSet<String>,
}

impl<C> EventListener<C> {
    pub fn new(event: impl Into<String>, callback: C) -> Self {
        Self {
            id: 0,
            event: event.into(),
            entity: None,
            callback,
            is_volatile: false,
            is_deleted: false,
            endon_conditions: BTreeSet::new(),
        }
    }

    /// Listener removed after its first delivery.
    pub fn once(event: impl Into<String>, callback: C) -> Self {
        Self {
            is_volatile: true,
            ..Self::new(event, callback)
        }
    }

    pub fn on_entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    fn matches(&self, event: &Event) -> bool {
        self.event == event.name && self.entity == event.entity
    }
}

type ListenerList<C> = Vec<EventListener<C>>;

pub struct EventHandler<C> {
    current_listener_id: AtomicU64,
    new_callbacks: Mutex<ListenerList<C>>,
    callbacks: ReentrantMutex<RefCell<ListenerList<C>>>,
    dispatch_depth: AtomicUsize,
    clear_epoch: AtomicU64,
}

impl<C> Default for EventHandler<C> {
    fn default() -> Self {
        Self {
            current_listener_id: AtomicU64::new(0),
            new_callbacks: Mutex::new(Vec::new()),
            callbacks: ReentrantMutex::new(RefCell::new(Vec::new())),
            dispatch_depth: AtomicUsize::new(0),
            clear_epoch: AtomicU64::new(0),
        }
    }
}

impl<C: Clone> EventHandler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event_listener(&self, mut listener: EventListener<C>) -> EventListenerHandle {
        let id = self.current_listener_id.fetch_add(1, Ordering::Relaxed) + 1;
        listener.id = id;
        listener.is_deleted = false;
        self.new_callbacks.lock().push(listener);
        EventListenerHandle { id }
    }

    /// Returns whether the handle still referred to a listener.
    pub fn remove(&self, handle: EventListenerHandle) -> bool {
        let callbacks = self.callbacks.lock();
        let mut found = false;
        {
            let mut tasks = callbacks.borrow_mut();
            for task in tasks.iter_mut().filter(|task| task.id == handle.id) {
                found |= !task.is_deleted;
                task.is_deleted = true;
            }
            if self.dispatch_depth.load(Ordering::Acquire) == 0 {
                tasks.retain(|task| !task.is_deleted);
            }
        }

        let mut new_tasks = self.new_callbacks.lock();
        let before = new_tasks.len();
        new_tasks.retain(|task| task.id != handle.id);
        found || new_tasks.len() != before
    }

    pub fn add_endon_condition(
        &self,
        handle: EventListenerHandle,
        event: &str,
    ) -> Result<(), BridgeError> {
        let mut found = false;
        let mut merger = |tasks: &mut ListenerList<C>| {
            for task in tasks
                .iter_mut()
                .filter(|task| task.id == handle.id && !task.is_deleted)
            {
                task.endon_conditions.insert(event.to_string());
                found = true;
            }
        };

        let callbacks = self.callbacks.lock();
        merger(&mut callbacks.borrow_mut());
        merger(&mut self.new_callbacks.lock());

        if found {
            Ok(())
        } else {
            Err(BridgeError::StaleHandle(handle.id))
        }
    }

    /// Delivers `event` to every matching listener in registration order.
    ///
    /// `build_arguments` runs at most once, on the first match; `invoke`
    /// errors are logged and do not stop delivery to later listeners.
    pub fn dispatch<A, B, F>(&self, event: &Event, build_arguments: B, mut invoke: F)
    where
        B: FnOnce(&Event) -> A,
        F: FnMut(&C, &A) -> Result<(), BridgeError>,
    {
        let callbacks = self.callbacks.lock();
        self.dispatch_depth.fetch_add(1, Ordering::AcqRel);

        self.merge_callbacks(&callbacks);
        Self::handle_endon_conditions(&callbacks, event);

        let epoch = self.clear_epoch.load(Ordering::Acquire);
        let end = callbacks.borrow().len();
        let mut builder = Some(build_arguments);
        let mut arguments: Option<A> = None;
        let mut index = 0usize;

        while index < end && self.clear_epoch.load(Ordering::Acquire) == epoch {
            let callback = {
                let mut tasks = callbacks.borrow_mut();
                let Some(task) = tasks.get_mut(index) else {
                    break;
                };
                index += 1;
                if task.is_deleted || !task.matches(event) {
                    continue;
                }
                if task.is_volatile {
                    task.is_deleted = true;
                }
                task.callback.clone()
            };

            if let Some(build) = builder.take() {
                arguments = Some(build(event));
            }
            let Some(arguments) = arguments.as_ref() else {
                break;
            };
            if let Err(error) = invoke(&callback, arguments) {
                log::error!("listener for \"{}\" failed: {}", event.name, error);
            }
        }

        if self.dispatch_depth.fetch_sub(1, Ordering::AcqRel) == 1 {
            callbacks.borrow_mut().retain(|task| !task.is_deleted);
        }
    }

    pub fn clear(&self) {
        let callbacks = self.callbacks.lock();
        let mut new_tasks = self.new_callbacks.lock();
        new_tasks.clear();
        callbacks.borrow_mut().clear();
        self.clear_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Live listeners, pending ones included.
    pub fn len(&self) -> usize {
        let callbacks = self.callbacks.lock();
        let active = callbacks
            .borrow()
            .iter()
            .filter(|task| !task.is_deleted)
            .count();
        active + self.new_callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn merge_callbacks(&self, callbacks: &RefCell<ListenerList<C>>) {
        let mut new_tasks = std::mem::take(&mut *self.new_callbacks.lock());
        callbacks.borrow_mut().append(&mut new_tasks);
    }

    fn handle_endon_conditions(callbacks: &RefCell<ListenerList<C>>, event: &Event) {
        for task in callbacks.borrow_mut().iter_mut() {
            if task.endon_conditions.contains(&event.name) {
                task.is_deleted = true;
            }
        }
    }
}

#[cfg(test)]
mod events_tests {
    use std::rc::Rc;

    use hb_core::VmValue;

    use super::*;

    type Log = Rc<RefCell<Vec<String>>>;
    type Outcome = Result<(), BridgeError>;

    fn record(log: &Log) -> impl FnMut(&&'static str, &Vec<String>) -> Outcome + '_ {
        move |name, args| {
            log.borrow_mut().push(format!("{}{:?}", name, args));
            Ok(())
        }
    }

    fn event(name: &str) -> Event {
        Event::new(name, vec![VmValue::Int(1)])
    }

    fn no_args(_: &Event) -> Vec<String> {
        Vec::new()
    }

    #[test]
    fn dispatch_runs_listeners_in_registration_order() {
        let handler = EventHandler::new();
        handler.add_event_listener(EventListener::new("E", "first"));
        handler.add_event_listener(EventListener::new("other", "skipped"));
        handler.add_event_listener(EventListener::new("E", "second"));

        let log = Log::default();
        handler.dispatch(&event("E"), no_args, record(&log));
        assert_eq!(*log.borrow(), vec!["first[]", "second[]"]);
    }

    #[test]
    fn arguments_are_built_once_and_only_on_match() {
        let handler = EventHandler::new();
        handler.add_event_listener(EventListener::new("E", "a"));
        handler.add_event_listener(EventListener::new("E", "b"));

        let builds = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&builds);
        handler.dispatch(
            &event("E"),
            move |event| {
                *counter.borrow_mut() += 1;
                vec![format!("{:?}", event.arguments)]
            },
            |_, _| Ok(()),
        );
        assert_eq!(*builds.borrow(), 1);

        let counter = Rc::clone(&builds);
        handler.dispatch(
            &event("none"),
            move |_| {
                *counter.borrow_mut() += 1;
                Vec::<String>::new()
            },
            |_, _| Ok(()),
        );
        assert_eq!(*builds.borrow(), 1);
    }

    #[test]
    fn listener_added_during_dispatch_waits_for_next_event() {
        let handler = Rc::new(EventHandler::new());
        handler.add_event_listener(EventListener::new("E", "outer"));

        let log = Log::default();
        let inner = Rc::clone(&handler);
        let inner_log = Rc::clone(&log);
        handler.dispatch(&event("E"), no_args, move |name, _| {
            inner_log.borrow_mut().push(name.to_string());
            inner.add_event_listener(EventListener::new("E", "late"));
            Ok(())
        });
        assert_eq!(*log.borrow(), vec!["outer"]);

        let log = Log::default();
        handler.dispatch(&event("E"), no_args, record(&log));
        assert_eq!(*log.borrow(), vec!["outer[]", "late[]"]);
    }

    #[test]
    fn one_shot_listener_fires_at_most_once() {
        let handler = EventHandler::new();
        handler.add_event_listener(EventListener::once("E", "once"));

        let log = Log::default();
        for _ in 0..3 {
            handler.dispatch(&event("E"), no_args, record(&log));
        }
        assert_eq!(log.borrow().len(), 1);
        assert!(handler.is_empty());
    }

    #[test]
    fn one_shot_is_not_redelivered_by_nested_dispatch() {
        let handler = Rc::new(EventHandler::new());
        handler.add_event_listener(EventListener::once("E", "once"));

        let calls = Rc::new(RefCell::new(0));
        let nested = Rc::clone(&handler);
        let counter = Rc::clone(&calls);
        handler.dispatch(&event("E"), no_args, move |_, _| {
            *counter.borrow_mut() += 1;
            let counter = Rc::clone(&counter);
            nested.dispatch(&event("E"), no_args, move |_, _| {
                *counter.borrow_mut() += 1;
                Ok(())
            });
            Ok(())
        });
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn endon_cancels_listener_for_later_dispatches() {
        let handler = EventHandler::new();
        let handle = handler.add_event_listener(EventListener::new("E", "watch"));
        handler
            .add_endon_condition(handle, "X")
            .expect("pending listener accepts endon");

        let log = Log::default();
        handler.dispatch(&event("E"), no_args, record(&log));
        handler.dispatch(&event("X"), no_args, record(&log));
        handler.dispatch(&event("E"), no_args, record(&log));
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(
            handler.add_endon_condition(handle, "Y"),
            Err(BridgeError::StaleHandle(handle.id))
        );
    }

    #[test]
    fn removal_during_dispatch_skips_later_listener() {
        let handler = Rc::new(EventHandler::new());
        handler.add_event_listener(EventListener::new("E", "remover"));
        let victim = handler.add_event_listener(EventListener::new("E", "victim"));
        handler.add_event_listener(EventListener::new("E", "tail"));

        let log = Log::default();
        let inner = Rc::clone(&handler);
        let inner_log = Rc::clone(&log);
        handler.dispatch(&event("E"), no_args, move |name, _| {
            inner_log.borrow_mut().push(name.to_string());
            if *name == "remover" {
                assert!(inner.remove(victim));
            }
            Ok(())
        });
        assert_eq!(*log.borrow(), vec!["remover", "tail"]);
        assert_eq!(handler.len(), 2);
        assert!(!handler.remove(victim));
    }

    #[test]
    fn clear_during_dispatch_ends_the_pass() {
        let handler = Rc::new(EventHandler::new());
        handler.add_event_listener(EventListener::new("E", "clearer"));
        handler.add_event_listener(EventListener::new("E", "never"));

        let log = Log::default();
        let inner = Rc::clone(&handler);
        let inner_log = Rc::clone(&log);
        handler.dispatch(&event("E"), no_args, move |name, _| {
            inner_log.borrow_mut().push(name.to_string());
            inner.clear();
            Ok(())
        });
        assert_eq!(*log.borrow(), vec!["clearer"]);
        assert!(handler.is_empty());
    }

    #[test]
    fn failing_listener_does_not_stop_delivery() {
        let handler = EventHandler::new();
        handler.add_event_listener(EventListener::new("E", "bad"));
        handler.add_event_listener(EventListener::new("E", "good"));

        let log = Log::default();
        handler.dispatch(&event("E"), no_args, |name, _| {
            if *name == "bad" {
                return Err(BridgeError::callback_fault("boom"));
            }
            log.borrow_mut().push(name.to_string());
            Ok(())
        });
        assert_eq!(*log.borrow(), vec!["good"]);
    }

    #[test]
    fn entity_scoped_listeners_match_only_their_entity() {
        let handler = EventHandler::new();
        handler.add_event_listener(EventListener::new("say", "p1").on_entity(EntityRef(1)));
        handler.add_event_listener(EventListener::new("say", "p2").on_entity(EntityRef(2)));

        let log = Log::default();
        handler.dispatch(
            &Event::on_entity(EntityRef(2), "say", Vec::new()),
            no_args,
            record(&log),
        );
        assert_eq!(*log.borrow(), vec!["p2[]"]);
    }
}
