//! Observable state with throttled change notification.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::timer::{Timer, TimerBehavior};

/// A piece of state that notifies its manager only when the value actually
/// changes. Handles are cheap to clone and share the value.
pub struct State<T> {
    value: Arc<Mutex<T>>,
    on_change: Arc<dyn Fn() + Send + Sync>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            on_change: Arc::clone(&self.on_change),
        }
    }
}

impl<T: Clone + PartialEq> State<T> {
    pub fn get(&self) -> T {
        self.value.lock().expect("state lock poisoned").clone()
    }

    /// Store a new value. Schedules a change notification only when the new
    /// value differs from the current one.
    pub fn set(&self, value: T) {
        let changed = {
            let mut current = self.value.lock().expect("state lock poisoned");
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            (self.on_change)();
        }
    }
}

/// Batches change notifications from any number of [`State`] values into at
/// most one `on_change` call per throttle window.
pub struct StateManager {
    core: Arc<Core>,
    timer: Arc<Timer>,
}

struct Core {
    control: Mutex<Control>,
    trigger_on_start: bool,
    on_change: Box<dyn Fn() + Send + Sync>,
}

struct Control {
    is_running: bool,
    has_pending: bool,
    last_update: Option<Instant>,
    throttle: Duration,
}

impl StateManager {
    pub fn new(
        throttle: Duration,
        trigger_on_start: bool,
        on_change: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let core = Arc::new(Core {
            control: Mutex::new(Control {
                is_running: false,
                has_pending: false,
                last_update: None,
                throttle,
            }),
            trigger_on_start,
            on_change: Box::new(on_change),
        });
        let timer_core = Arc::clone(&core);
        let timer = Arc::new(Timer::new(TimerBehavior::Wait, move || {
            let core = Arc::clone(&timer_core);
            async move {
                core.flush();
            }
        }));
        Self { core, timer }
    }

    /// Begin delivering change notifications. When constructed with
    /// `trigger_on_start`, one notification fires immediately.
    pub fn start(&self) {
        let fire = {
            let mut control = self.core.lock_control();
            control.is_running = true;
            control.has_pending = self.core.trigger_on_start;
            control.has_pending
        };
        if fire {
            self.timer.once(Duration::ZERO);
        }
    }

    /// Stop delivering change notifications and drop any pending one.
    pub fn stop(&self) {
        {
            let mut control = self.core.lock_control();
            control.is_running = false;
            control.has_pending = false;
        }
        self.timer.stop();
    }

    pub fn set_throttle(&self, throttle: Duration) {
        self.core.lock_control().throttle = throttle;
    }

    /// Create a state value whose changes funnel through this manager.
    pub fn state<T: Clone + PartialEq>(&self, initial: T) -> State<T> {
        let core = Arc::clone(&self.core);
        let timer = Arc::clone(&self.timer);
        State {
            value: Arc::new(Mutex::new(initial)),
            on_change: Arc::new(move || Core::schedule(&core, &timer)),
        }
    }
}

impl Core {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().expect("state manager lock poisoned")
    }

    fn flush(&self) {
        {
            let mut control = self.lock_control();
            control.has_pending = false;
            control.last_update = Some(Instant::now());
        }
        (self.on_change)();
    }

    fn schedule(core: &Arc<Core>, timer: &Timer) {
        let delay = {
            let mut control = core.lock_control();
            if control.has_pending || !control.is_running {
                return;
            }
            let elapsed = control
                .last_update
                .map(|at| at.elapsed())
                .unwrap_or(control.throttle);
            control.has_pending = true;
            control.throttle.saturating_sub(elapsed)
        };
        timer.once(delay);
    }
}
