/*
 * Thread scheduling core.
 *
 * A single round-robin ready queue, a sorted sleeping queue with a cached
 * next-wakeup tick, and a cooperative `switch`/`schedule_tail` context
 * switch protocol -- the whole of it grounded on Pintos's `threads/thread.c`
 * (the teaching kernel this module's test suite is modeled after) and
 * rendered in the stackful-coroutine style of a `Scheduler { runnable: ... }`
 * plus `Arc<Thread>` + interior mutability, rather than Pintos's intrusive
 * linked lists over a single fixed-size thread pool.
 *
 * Mutual exclusion is the interrupts-off discipline, not a spinlock: this
 * is a uniprocessor core, and every interrupt handler that could touch
 * this module's state respects `intr_context()`/the `Level` contract. The
 * `spin::Mutex` wrapping the queues below is defense in depth, not the
 * primary synchronization mechanism -- it is never held across a context
 * switch.
 */

pub mod context;
pub mod thread;

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use spin::Mutex;

use crate::arch::x86_64::interrupts;
use crate::memory::pages;
pub use thread::AddressSpace;
use thread::{ERROR_ID, Status, THREAD_MAGIC, Thread, ThreadId};

struct SchedulerState {
    ready: VecDeque<Arc<Thread>>,
    sleeping: Vec<Arc<Thread>>,
    all_threads: Vec<Arc<Thread>>,
    idle_thread: Option<Arc<Thread>>,
    initial_thread: Option<Arc<Thread>>,
}

impl SchedulerState {
    const fn new() -> Self {
        SchedulerState {
            ready: VecDeque::new(),
            sleeping: Vec::new(),
            all_threads: Vec::new(),
            idle_thread: None,
            initial_thread: None,
        }
    }
}

static STATE: Mutex<SchedulerState> = Mutex::new(SchedulerState::new());

/// Cached head of the sleeping queue, read lock-free by `wake_due`'s fast
/// path. `thread::EMPTY_SENTINEL` when nothing is sleeping.
static MIN_WAKE: AtomicI64 = AtomicI64::new(thread::EMPTY_SENTINEL);

static TICKS: AtomicU64 = AtomicU64::new(0);
static SLICE_TICKS: AtomicU64 = AtomicU64::new(0);
static IDLE_TICKS: AtomicU64 = AtomicU64::new(0);
static KERNEL_TICKS: AtomicU64 = AtomicU64::new(0);
static USER_TICKS: AtomicU64 = AtomicU64::new(0);

static NEXT_TID: Mutex<ThreadId> = Mutex::new(1);

struct ThreadCell(UnsafeCell<Option<Arc<Thread>>>);
// SAFETY: only ever touched with interrupts off, by the single CPU this
// core runs on.
unsafe impl Sync for ThreadCell {}

static CURRENT: ThreadCell = ThreadCell(UnsafeCell::new(None));

/// Thread this `switch_to` is in the middle of switching away from, handed
/// to whichever code resumes next (either `schedule_tail` called right
/// after a normal `switch_stack` return, or the first-run trampoline).
static PENDING_PREV: ThreadCell = ThreadCell(UnsafeCell::new(None));

fn allocate_tid() -> ThreadId {
    let mut next = NEXT_TID.lock();
    let id = *next;
    *next += 1;
    id
}

fn current_thread() -> Arc<Thread> {
    unsafe { (*CURRENT.0.get()).clone().expect("scheduler::init was never called") }
}

fn set_current(t: Arc<Thread>) {
    unsafe {
        *CURRENT.0.get() = Some(t);
    }
}

fn is_idle(t: &Arc<Thread>) -> bool {
    STATE.lock().idle_thread.as_ref().is_some_and(|idle| Arc::ptr_eq(idle, t))
}

fn initial_thread_handle() -> Arc<Thread> {
    STATE.lock().initial_thread.clone().expect("scheduler::init was never called")
}

fn ready_enqueue_locked(state: &mut SchedulerState, t: Arc<Thread>) {
    t.set_status(Status::Ready);
    state.ready.push_back(t);
}

/// Install the thread already running (the one that called this function)
/// as the scheduler's notion of `current`. Must run before anything else
/// in this module.
pub fn init() {
    let id = allocate_tid();
    let initial = Arc::new(Thread::new_initial(id, "main"));
    set_current(Arc::clone(&initial));
    {
        let mut state = STATE.lock();
        state.initial_thread = Some(Arc::clone(&initial));
        state.all_threads.push(initial);
    }
    log::info!("scheduler initialized, initial thread tid={}", id);
}

fn idle_main() {
    let me = current();
    STATE.lock().idle_thread = Some(Arc::clone(&me));
    unblock(initial_thread_handle());

    loop {
        interrupts::disable();
        block();
        x86_64::instructions::interrupts::enable_and_hlt();
    }
}

/// Create the idle thread and block the caller until it has captured its
/// own record, so `start` only returns once the scheduler is fully primed.
pub fn start() {
    let _ = create("idle", thread::PRI_MIN, idle_main);
    interrupts::enable();
    let prev = interrupts::intr_disable();
    block();
    interrupts::intr_set_level(prev);
    log::info!("scheduler started");
}

/// Spawn a new thread running `f`, returning its id, or `ERROR_ID` if the
/// stack page pool is exhausted.
pub fn create<F>(name: &str, priority: u8, f: F) -> ThreadId
where
    F: FnOnce() + Send + 'static,
{
    assert!(
        (thread::PRI_MIN..=thread::PRI_MAX).contains(&priority),
        "priority {} out of range",
        priority
    );

    let Some(mut page) = pages::page_alloc_zeroed() else {
        return ERROR_ID;
    };

    let prev = interrupts::intr_disable();
    let id = allocate_tid();
    let sp = context::prepare_first_run(&mut page);
    let t = Arc::new(Thread::new(id, name, priority, page, sp, Box::new(f)));
    STATE.lock().all_threads.push(Arc::clone(&t));
    interrupts::intr_set_level(prev);

    unblock(t);
    id
}

/// The thread currently executing. Re-checks the overflow canary at the
/// base of its stack, the one place this core still performs that check.
pub fn current() -> Arc<Thread> {
    let t = current_thread();
    if let Some(base) = t.stack_base() {
        let magic = unsafe { *(base as *const u32) };
        assert_eq!(magic, THREAD_MAGIC, "stack overflow detected in thread {}", t.id);
    }
    t
}

pub fn tid() -> ThreadId {
    current().id
}

pub fn name() -> String {
    current().name()
}

/// Give up the CPU voluntarily; the caller goes back on the ready queue.
pub fn yield_now() {
    assert!(!interrupts::intr_context());
    let prev = interrupts::intr_disable();
    let cur = current_thread();
    if !is_idle(&cur) {
        STATE.lock().ready.push_back(Arc::clone(&cur));
    }
    cur.set_status(Status::Ready);
    schedule();
    interrupts::intr_set_level(prev);
}

/// Block the caller. The caller must already be off the ready queue and
/// must arrange for someone to `unblock` it later; otherwise it sleeps
/// forever. Must be called with interrupts already off.
pub fn block() {
    assert!(!interrupts::intr_context());
    current_thread().set_status(Status::Blocked);
    schedule();
}

/// Move a blocked thread back onto the ready queue.
pub fn unblock(t: Arc<Thread>) {
    let prev = interrupts::intr_disable();
    assert!(t.status() == Status::Blocked);
    {
        let mut state = STATE.lock();
        ready_enqueue_locked(&mut state, t);
    }
    interrupts::intr_set_level(prev);
}

/// Terminate the calling thread. Never returns.
pub fn exit() -> ! {
    assert!(!interrupts::intr_context());
    interrupts::disable();
    let cur = current_thread();
    STATE.lock().all_threads.retain(|t| !Arc::ptr_eq(t, &cur));
    cur.set_status(Status::Dying);
    schedule();
    unreachable!("a dying thread was redispatched");
}

/// Call `f` with every live thread, including blocked and sleeping ones.
/// Must be called with interrupts off.
pub fn for_each<F: FnMut(&Thread)>(mut f: F) {
    assert!(!interrupts::are_enabled());
    let state = STATE.lock();
    for t in state.all_threads.iter() {
        f(t);
    }
}

/// Block the caller until `deadline` (in ticks since boot) has passed.
/// Returns immediately if `deadline` is already in the past.
pub fn sleep_until(deadline: i64) {
    assert!(deadline >= 0);
    assert!(!interrupts::intr_context());

    if deadline < now() {
        return;
    }

    let prev = interrupts::intr_disable();
    let cur = current_thread();
    if is_idle(&cur) {
        interrupts::intr_set_level(prev);
        return;
    }

    cur.set_status(Status::Blocked);
    cur.set_wake_tick(deadline);
    {
        let mut state = STATE.lock();
        let pos = state.sleeping.partition_point(|t| t.wake_tick() <= deadline);
        state.sleeping.insert(pos, Arc::clone(&cur));
        if pos == 0 {
            MIN_WAKE.store(deadline, Ordering::Release);
        }
    }
    schedule();
    interrupts::intr_set_level(prev);
}

/// Move every sleeper whose deadline has passed onto the ready queue.
/// Lock-free no-op when nothing is due.
pub fn wake_due() {
    let min = MIN_WAKE.load(Ordering::Acquire);
    let now_tick = now();
    if min == thread::EMPTY_SENTINEL || now_tick < min {
        return;
    }

    let prev = interrupts::intr_disable();
    {
        let mut state = STATE.lock();
        while let Some(front) = state.sleeping.first() {
            if front.wake_tick() > now_tick {
                break;
            }
            let t = state.sleeping.remove(0);
            t.set_wake_tick(thread::NOT_SLEEPING);
            ready_enqueue_locked(&mut state, t);
        }
        let next_min =
            state.sleeping.first().map(|t| t.wake_tick()).unwrap_or(thread::EMPTY_SENTINEL);
        MIN_WAKE.store(next_min, Ordering::Release);
    }
    interrupts::intr_set_level(prev);
}

pub fn ready_count() -> usize {
    let prev = interrupts::intr_disable();
    let n = STATE.lock().ready.len();
    interrupts::intr_set_level(prev);
    n
}

pub fn sleeping_count() -> usize {
    let prev = interrupts::intr_disable();
    let n = STATE.lock().sleeping.len();
    interrupts::intr_set_level(prev);
    n
}

pub fn get_priority() -> u8 {
    current().priority()
}

pub fn set_priority(priority: u8) {
    assert!((thread::PRI_MIN..=thread::PRI_MAX).contains(&priority));
    current().set_priority(priority);
}

/// MLFQS is a declared non-goal of this core; these three accessors exist
/// only so callers written against the fuller contract still link, and
/// always report the "nothing to report" value a non-MLFQS scheduler would.
pub fn get_nice() -> i32 {
    0
}

pub fn set_nice(_nice: i32) {}

pub fn get_load_avg() -> i32 {
    0
}

pub fn get_recent_cpu() -> i32 {
    0
}

/// Monotonic tick count since `scheduler::init`.
pub fn now() -> i64 {
    TICKS.load(Ordering::Relaxed) as i64
}

/// O(1), lock-free per-tick bookkeeping, called from the timer IDT handler
/// with interrupt context marked. Never performs a switch itself -- it only
/// ever asks for one via `intr_yield_on_return`, honored at interrupt
/// return by `context::timer_return`.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);

    let cur = current_thread();
    cur.add_cpu_tick();
    if is_idle(&cur) {
        IDLE_TICKS.fetch_add(1, Ordering::Relaxed);
    } else if cur.is_user() {
        USER_TICKS.fetch_add(1, Ordering::Relaxed);
    } else {
        KERNEL_TICKS.fetch_add(1, Ordering::Relaxed);
    }

    if SLICE_TICKS.fetch_add(1, Ordering::Relaxed) + 1 >= thread::TIME_SLICE {
        interrupts::intr_yield_on_return();
    }
}

pub fn print_stats() {
    log::info!(
        "thread ticks: idle={} kernel={} user={}",
        IDLE_TICKS.load(Ordering::Relaxed),
        KERNEL_TICKS.load(Ordering::Relaxed),
        USER_TICKS.load(Ordering::Relaxed),
    );
}

/// Pick the next thread to run and switch to it, then unconditionally run
/// `schedule_tail` -- whether or not an actual stack switch happened.
/// Must be called with interrupts off and `current`'s status already
/// updated away from `Running`.
fn schedule() {
    assert!(!interrupts::are_enabled());
    let next = pick_next();
    switch_to(next);
}

fn pick_next() -> Arc<Thread> {
    let mut state = STATE.lock();
    match state.ready.pop_front() {
        Some(t) => t,
        None => Arc::clone(state.idle_thread.as_ref().expect("idle thread not started")),
    }
}

fn switch_to(next: Arc<Thread>) {
    let current = current_thread();
    if !Arc::ptr_eq(&current, &next) {
        let prev_sp = current.stack_pointer_cell();
        let next_sp = next.stack_pointer_cell();
        unsafe {
            *PENDING_PREV.0.get() = Some(current);
        }
        set_current(next);
        unsafe {
            context::switch_stack(prev_sp, next_sp);
        }
    }
    schedule_tail();
}

/// Finish a dispatch: mark the new current thread running, reset its time
/// slice, and reap the thread just switched away from if it was exiting.
/// Runs once per switch, either right after `switch_stack` returns or,
/// for a thread's first dispatch, from the trampoline.
fn schedule_tail() {
    let prev = unsafe { (*PENDING_PREV.0.get()).take() };

    let cur = current_thread();
    if let Some(space) = cur.address_space() {
        space.activate();
    }
    cur.set_status(Status::Running);
    SLICE_TICKS.store(0, Ordering::Relaxed);

    if let Some(prev) = prev {
        let is_initial =
            STATE.lock().initial_thread.as_ref().is_some_and(|t| Arc::ptr_eq(t, &prev));
        if prev.status() == Status::Dying && !is_initial {
            if let Some(page) = prev.take_stack() {
                pages::page_free(page);
            }
        }
    }
}
