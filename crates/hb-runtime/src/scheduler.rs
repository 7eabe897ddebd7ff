//! Frame-driven timers on a virtual clock.
//!
//! The host advances the clock once per server frame through
//! [`FrameScheduler::run_frame`]. Tasks follow the same pending/active
//! discipline as [`crate::EventHandler`]: a task added during a frame is first
//! considered on the next one.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use hb_core::{BridgeError, Event};
use parking_lot::{Mutex, ReentrantMutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub id: u64,
}

#[derive(Debug, Clone)]
pub struct ScheduledTask<C> {
    pub id: u64,
    pub callback: C,
    pub interval: Duration,
    pub due_at: Duration,
    pub is_volatile: bool,
    pub is_deleted: bool,
    pub endon_conditions: BTreeSet<String>,
}

type TaskList<C> = Vec<ScheduledTask<C>>;

pub struct FrameScheduler<C> {
    current_task_id: AtomicU64,
    clock: Mutex<Duration>,
    new_callbacks: Mutex<TaskList<C>>,
    callbacks: ReentrantMutex<RefCell<TaskList<C>>>,
    run_depth: AtomicUsize,
    clear_epoch: AtomicU64,
}

impl<C> Default for FrameScheduler<C> {
    fn default() -> Self {
        Self {
            current_task_id: AtomicU64::new(0),
            clock: Mutex::new(Duration::ZERO),
            new_callbacks: Mutex::new(Vec::new()),
            callbacks: ReentrantMutex::new(RefCell::new(Vec::new())),
            run_depth: AtomicUsize::new(0),
            clear_epoch: AtomicU64::new(0),
        }
    }
}

impl<C: Clone> FrameScheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        *self.clock.lock()
    }

    /// Schedules `callback` to run once `delay` has elapsed, then every
    /// `delay` after that unless `is_volatile`.
    pub fn add(&self, callback: C, delay: Duration, is_volatile: bool) -> TaskId {
        let id = self.current_task_id.fetch_add(1, Ordering::Relaxed) + 1;
        let due_at = self.now() + delay;
        self.new_callbacks.lock().push(ScheduledTask {
            id,
            callback,
            interval: delay,
            due_at,
            is_volatile,
            is_deleted: false,
            endon_conditions: BTreeSet::new(),
        });
        TaskId { id }
    }

    pub fn remove(&self, handle: TaskId) -> bool {
        let callbacks = self.callbacks.lock();
        let mut found = false;
        {
            let mut tasks = callbacks.borrow_mut();
            for task in tasks.iter_mut().filter(|task| task.id == handle.id) {
                found |= !task.is_deleted;
                task.is_deleted = true;
            }
            if self.run_depth.load(Ordering::Acquire) == 0 {
                tasks.retain(|task| !task.is_deleted);
            }
        }

        let mut new_tasks = self.new_callbacks.lock();
        let before = new_tasks.len();
        new_tasks.retain(|task| task.id != handle.id);
        found || new_tasks.len() != before
    }

    pub fn add_endon_condition(&self, handle: TaskId, event: &str) -> Result<(), BridgeError> {
        let mut found = false;
        let mut merger = |tasks: &mut TaskList<C>| {
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

    /// Cancels every task that registered `event` as an end condition.
    pub fn dispatch(&self, event: &Event) {
        let callbacks = self.callbacks.lock();
        self.merge_callbacks(&callbacks);
        for task in callbacks.borrow_mut().iter_mut() {
            if task.endon_conditions.contains(&event.name) {
                task.is_deleted = true;
            }
        }
        if self.run_depth.load(Ordering::Acquire) == 0 {
            callbacks.borrow_mut().retain(|task| !task.is_deleted);
        }
    }

    /// Advances the clock by `elapsed` and runs every due task in order.
    pub fn run_frame<F>(&self, elapsed: Duration, mut invoke: F)
    where
        F: FnMut(&C) -> Result<(), BridgeError>,
    {
        let callbacks = self.callbacks.lock();
        self.run_depth.fetch_add(1, Ordering::AcqRel);

        let now = {
            let mut clock = self.clock.lock();
            *clock += elapsed;
            *clock
        };
        self.merge_callbacks(&callbacks);

        let epoch = self.clear_epoch.load(Ordering::Acquire);
        let end = callbacks.borrow().len();
        let mut index = 0usize;

        while index < end && self.clear_epoch.load(Ordering::Acquire) == epoch {
            let callback = {
                let mut tasks = callbacks.borrow_mut();
                let Some(task) = tasks.get_mut(index) else {
                    break;
                };
                index += 1;
                if task.is_deleted || task.due_at > now {
                    continue;
                }
                if task.is_volatile {
                    task.is_deleted = true;
                } else {
                    task.due_at = now + task.interval;
                }
                task.callback.clone()
            };

            if let Err(error) = invoke(&callback) {
                log::error!("scheduled task failed: {}", error);
            }
        }

        if self.run_depth.fetch_sub(1, Ordering::AcqRel) == 1 {
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

    fn merge_callbacks(&self, callbacks: &RefCell<TaskList<C>>) {
        let mut new_tasks = std::mem::take(&mut *self.new_callbacks.lock());
        callbacks.borrow_mut().append(&mut new_tasks);
    }
}

#[cfg(test)]
mod scheduler_tests {
    use std::rc::Rc;

    use super::*;

    const FRAME: Duration = Duration::from_millis(50);

    fn run(scheduler: &FrameScheduler<&'static str>, elapsed: Duration) -> Vec<&'static str> {
        let mut ran = Vec::new();
        scheduler.run_frame(elapsed, |name| {
            ran.push(*name);
            Ok(())
        });
        ran
    }

    #[test]
    fn timeout_runs_once_after_delay() {
        let scheduler = FrameScheduler::new();
        scheduler.add("timeout", Duration::from_millis(100), true);

        assert!(run(&scheduler, FRAME).is_empty());
        assert_eq!(run(&scheduler, FRAME), vec!["timeout"]);
        assert!(run(&scheduler, FRAME).is_empty());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn interval_repeats_until_removed() {
        let scheduler = FrameScheduler::new();
        let handle = scheduler.add("tick", FRAME, false);

        assert_eq!(run(&scheduler, FRAME), vec!["tick"]);
        assert_eq!(run(&scheduler, FRAME), vec!["tick"]);
        assert!(scheduler.remove(handle));
        assert!(run(&scheduler, FRAME).is_empty());
        assert!(!scheduler.remove(handle));
    }

    #[test]
    fn zero_delay_task_runs_on_next_frame() {
        let scheduler = FrameScheduler::new();
        scheduler.add("next", Duration::ZERO, true);
        assert_eq!(run(&scheduler, Duration::ZERO), vec!["next"]);
    }

    #[test]
    fn task_added_while_running_waits_a_frame() {
        let scheduler = Rc::new(FrameScheduler::new());
        scheduler.add("outer", Duration::ZERO, true);

        let inner = Rc::clone(&scheduler);
        let mut ran = Vec::new();
        scheduler.run_frame(FRAME, |name| {
            ran.push(*name);
            inner.add("inner", Duration::ZERO, true);
            Ok(())
        });
        assert_eq!(ran, vec!["outer"]);
        assert_eq!(run(&scheduler, FRAME), vec!["inner"]);
    }

    #[test]
    fn endon_event_cancels_pending_task() {
        let scheduler = FrameScheduler::new();
        let handle = scheduler.add("guarded", FRAME, false);
        scheduler
            .add_endon_condition(handle, "disconnect")
            .expect("task should accept endon");

        scheduler.dispatch(&Event::new("disconnect", Vec::new()));
        assert!(run(&scheduler, FRAME).is_empty());
        assert!(matches!(
            scheduler.add_endon_condition(handle, "again"),
            Err(BridgeError::StaleHandle(_))
        ));
    }

    #[test]
    fn clear_while_running_stops_the_frame() {
        let scheduler = Rc::new(FrameScheduler::new());
        scheduler.add("first", Duration::ZERO, false);
        scheduler.add("second", Duration::ZERO, false);

        let inner = Rc::clone(&scheduler);
        let mut ran = Vec::new();
        scheduler.run_frame(FRAME, |name| {
            ran.push(*name);
            inner.clear();
            Ok(())
        });
        assert_eq!(ran, vec!["first"]);
        assert!(scheduler.is_empty());
    }
}
