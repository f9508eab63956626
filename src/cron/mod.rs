//! Time-based scheduling of recurring callbacks.
//!
//! A [`Cron`] job fires a callback on a fixed interval, once a day at a given
//! wall-clock time, or according to a [`CronExpression`]. Each scheduled job
//! runs its own timer thread; callbacks run on that thread unless the job is
//! configured to dispatch them onto a [`ThreadPool`].

use std::{
    convert::TryFrom,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Condvar,
        Mutex,
        MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

use chrono::{DateTime, Duration as ChronoDuration, Local};

use crate::{
    error::{Error, Result},
    global::global,
    pool::ThreadPool,
    sync::recover,
    task::panic_message,
};

mod expression;

pub use self::expression::CronExpression;

/// Longest time a wall-clock timer sleeps before looking at the clock again,
/// so that clock adjustments are picked up.
const MAX_WALL_CLOCK_WAIT: Duration = Duration::from_secs(60);

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
enum Schedule {
    /// Fire repeatedly, timed on the monotonic clock.
    Interval(Duration),

    /// Fire whenever the local wall-clock time matches the expression.
    Calendar(CronExpression),
}

#[derive(Clone)]
enum Dispatch {
    Inline,
    Pool(Arc<ThreadPool>),
    Global,
}

/// A recurring job firing a callback on a schedule.
///
/// A job is created by one of the factory functions, started with
/// [`schedule`](Cron::schedule) or [`schedule_with_delay`](Cron::schedule_with_delay)
/// and stopped with [`cancel`](Cron::cancel). A cancelled job may be scheduled
/// again. Dropping the job cancels it.
///
/// # Examples
///
/// ```
/// use std::{
///     sync::{atomic::{AtomicUsize, Ordering}, Arc},
///     thread,
///     time::Duration,
/// };
/// use threadkit::Cron;
///
/// let fired = Arc::new(AtomicUsize::new(0));
/// let job = Cron::every(Duration::from_millis(10)).unwrap();
///
/// let counter = fired.clone();
/// job.schedule(move || {
///     counter.fetch_add(1, Ordering::SeqCst);
/// })
/// .unwrap();
///
/// thread::sleep(Duration::from_millis(100));
/// job.cancel();
///
/// assert!(!job.is_running());
/// assert!(fired.load(Ordering::SeqCst) > 0);
/// ```
pub struct Cron {
    schedule: Schedule,
    dispatch: Dispatch,
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    cvar: Condvar,
    fire_count: AtomicUsize,
}

struct State {
    running: bool,

    /// Incremented every time the job is scheduled, so that a timer loop left
    /// over from before a cancel never fires again.
    generation: u64,

    /// For interval jobs, when the next fire is due. For calendar jobs, when
    /// the initial delay ends, if one is still pending.
    pending_until: Option<Instant>,
}

impl Cron {
    /// Create a job firing repeatedly every `interval`.
    ///
    /// Returns [`Error::InvalidArgument`] if the interval is zero.
    pub fn every(interval: Duration) -> Result<Self> {
        if interval == Duration::ZERO {
            return Err(Error::invalid_argument("cron interval must be positive"));
        }

        Ok(Self::new(Schedule::Interval(interval)))
    }

    /// Create a job firing once a day at the given local wall-clock time.
    ///
    /// Returns [`Error::InvalidArgument`] if `hour` is not in 0-23 or `minute`
    /// is not in 0-59.
    pub fn at(hour: u32, minute: u32) -> Result<Self> {
        CronExpression::daily(hour, minute).map(|expression| Self::new(Schedule::Calendar(expression)))
    }

    /// Create a job firing according to a cron expression, evaluated against
    /// the local wall clock.
    ///
    /// Returns [`Error::InvalidExpression`] if the expression cannot be parsed.
    pub fn parse(expression: &str) -> Result<Self> {
        CronExpression::parse(expression).map(Self::with_expression)
    }

    /// Create a job from an already parsed cron expression.
    pub fn with_expression(expression: CronExpression) -> Self {
        Self::new(Schedule::Calendar(expression))
    }

    fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            dispatch: Dispatch::Inline,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    running: false,
                    generation: 0,
                    pending_until: None,
                }),
                cvar: Condvar::new(),
                fire_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Run the callback on the given pool each time the job fires, rather than
    /// on the job's timer thread.
    pub fn on_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.dispatch = Dispatch::Pool(pool);
        self
    }

    /// Run the callback on the [global](crate::global) pool each time the job
    /// fires.
    pub fn on_global_pool(mut self) -> Self {
        self.dispatch = Dispatch::Global;
        self
    }

    /// Start firing `callback` on this job's schedule. Returns immediately.
    ///
    /// For interval jobs the first fire happens one interval from now.
    /// Returns [`Error::AlreadyScheduled`] if the job is already running.
    pub fn schedule<F>(&self, callback: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.start(None, Arc::new(callback))
    }

    /// Like [`schedule`](Cron::schedule), but nothing fires until `delay` has
    /// elapsed. Interval jobs fire first right when the delay ends; calendar
    /// jobs fire at the first matching time after it.
    pub fn schedule_with_delay<F>(&self, delay: Duration, callback: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.start(Some(delay), Arc::new(callback))
    }

    fn start(&self, delay: Option<Duration>, callback: Callback) -> Result<()> {
        let mut state = self.shared.lock_state();

        if state.running {
            return Err(Error::AlreadyScheduled);
        }

        let now = Instant::now();

        state.running = true;
        state.generation += 1;
        state.pending_until = match (&self.schedule, delay) {
            (Schedule::Interval(interval), None) => Some(now + *interval),
            (_, Some(delay)) => Some(now + delay),
            (Schedule::Calendar(_), None) => None,
        };

        let generation = state.generation;
        let timer = Timer {
            generation,
            initial: state.pending_until,
            schedule: self.schedule.clone(),
            dispatch: self.dispatch.clone(),
            callback,
            shared: self.shared.clone(),
        };

        drop(state);

        log::debug!("scheduling cron job {:?}", self.schedule);

        if let Err(e) = thread::Builder::new()
            .name(String::from("cron-timer"))
            .spawn(move || timer.run())
        {
            self.shared.finish(generation);
            panic!("failed to spawn cron timer thread: {}", e);
        }

        Ok(())
    }

    /// Stop future fires. A callback that is currently running is allowed to
    /// finish.
    pub fn cancel(&self) {
        let mut state = self.shared.lock_state();

        if state.running {
            log::debug!("cancelling cron job {:?}", self.schedule);
            state.running = false;
            state.pending_until = None;
            self.shared.cvar.notify_all();
        }
    }

    /// Check whether the job is currently scheduled.
    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    /// Get the number of times this job has fired.
    pub fn fire_count(&self) -> usize {
        self.shared.fire_count.load(Ordering::SeqCst)
    }

    /// Compute when the job would fire next, given its configuration and the
    /// current time. Has no side effects.
    ///
    /// Returns `None` only for a cron expression that never matches.
    pub fn next_fire_time(&self) -> Option<DateTime<Local>> {
        let pending_until = {
            let state = self.shared.lock_state();

            if state.running {
                state.pending_until
            } else {
                None
            }
        };

        let now = Local::now();
        let pending = match pending_until {
            Some(until) => Some(add(now, until.saturating_duration_since(Instant::now()))?),
            None => None,
        };

        match &self.schedule {
            Schedule::Interval(interval) => pending.or_else(|| add(now, *interval)),
            Schedule::Calendar(expression) => expression.next_after(&pending.unwrap_or(now)),
        }
    }
}

impl Drop for Cron {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Cron {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cron")
            .field("schedule", &self.schedule)
            .field("running", &self.is_running())
            .field("fire_count", &self.fire_count())
            .finish()
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Interval(interval) => write!(f, "every {:?}", interval),
            Schedule::Calendar(expression) => write!(f, "`{}`", expression),
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        recover(self.state.lock())
    }

    /// Sleep until `deadline`, waking early if the job is cancelled.
    ///
    /// Returns `false` if the timer loop belonging to `generation` should stop.
    fn sleep_until(&self, generation: u64, deadline: Instant) -> bool {
        let mut state = self.lock_state();

        loop {
            if !state.running || state.generation != generation {
                return false;
            }

            match deadline.checked_duration_since(Instant::now()) {
                Some(timeout) if timeout > Duration::ZERO => {
                    state = recover(self.cvar.wait_timeout(state, timeout)).0;
                }
                _ => return true,
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock_state();
        state.running && state.generation == generation
    }

    fn set_pending_until(&self, generation: u64, until: Option<Instant>) {
        let mut state = self.lock_state();

        if state.generation == generation {
            state.pending_until = until;
        }
    }

    /// Mark the job as no longer running if `generation` is still current.
    fn finish(&self, generation: u64) {
        let mut state = self.lock_state();

        if state.generation == generation {
            state.running = false;
            state.pending_until = None;
        }
    }
}

/// The timer loop of one scheduling of a job.
struct Timer {
    generation: u64,
    initial: Option<Instant>,
    schedule: Schedule,
    dispatch: Dispatch,
    callback: Callback,
    shared: Arc<Shared>,
}

impl Timer {
    fn run(self) {
        log::trace!("cron timer started");

        match &self.schedule {
            Schedule::Interval(interval) => self.run_interval(*interval),
            Schedule::Calendar(expression) => self.run_calendar(expression),
        }

        log::trace!("cron timer exiting");
    }

    fn run_interval(&self, interval: Duration) {
        let mut next = self.initial.unwrap_or_else(|| Instant::now() + interval);

        while self.shared.sleep_until(self.generation, next) {
            next = next_tick(next, interval, Instant::now());
            self.shared.set_pending_until(self.generation, Some(next));

            self.fire();

            // Fixed rate; fires missed while a slow callback ran are skipped.
            let now = Instant::now();
            if next <= now {
                next = next_tick(next, interval, now);
                self.shared.set_pending_until(self.generation, Some(next));
            }
        }
    }

    fn run_calendar(&self, expression: &CronExpression) {
        if let Some(delay_end) = self.initial {
            if !self.shared.sleep_until(self.generation, delay_end) {
                return;
            }

            self.shared.set_pending_until(self.generation, None);
        }

        loop {
            let target = match expression.next_after(&Local::now()) {
                Some(target) => target,
                None => {
                    log::warn!("cron expression `{}` never fires, stopping job", expression);
                    self.shared.finish(self.generation);
                    return;
                }
            };

            // Sleep in bounded steps, rechecking the wall clock each time.
            loop {
                let remaining = match (target - Local::now()).to_std() {
                    Ok(remaining) if remaining > Duration::ZERO => remaining,
                    _ => break,
                };

                let wait = remaining.min(MAX_WALL_CLOCK_WAIT);

                if !self.shared.sleep_until(self.generation, Instant::now() + wait) {
                    return;
                }
            }

            // Cancelled at the very moment the target arrived.
            if !self.shared.is_current(self.generation) {
                return;
            }

            self.fire();
        }
    }

    fn fire(&self) {
        let count = self.shared.fire_count.fetch_add(1, Ordering::SeqCst) + 1;
        log::trace!("cron job {:?} firing (#{})", self.schedule, count);

        match &self.dispatch {
            Dispatch::Inline => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| (self.callback)())) {
                    log::warn!("cron callback panicked: {}", panic_message(&*payload));
                }
            }
            Dispatch::Pool(pool) => {
                let callback = self.callback.clone();
                pool.execute(move || callback());
            }
            Dispatch::Global => {
                let callback = self.callback.clone();
                global().execute(move || callback());
            }
        }
    }
}

/// Get the first tick of the series `last + n * interval` (n >= 1) that lies
/// strictly after `now`.
fn next_tick(last: Instant, interval: Duration, now: Instant) -> Instant {
    let interval_nanos = interval.as_nanos();
    let ticks = now.saturating_duration_since(last).as_nanos() / interval_nanos + 1;

    ticks
        .checked_mul(interval_nanos)
        .and_then(|offset| u64::try_from(offset).ok())
        .and_then(|offset| last.checked_add(Duration::from_nanos(offset)))
        .unwrap_or_else(|| now + interval)
}

fn add(time: DateTime<Local>, duration: Duration) -> Option<DateTime<Local>> {
    time.checked_add_signed(ChronoDuration::from_std(duration).ok()?)
}
