/*
 * Thread control block.
 *
 * Mirrors a Pintos-style `struct thread`: a fixed identity, a short name,
 * a saved stack pointer used only while the thread is not the one running,
 * a priority, and a sleep deadline. Unlike Pintos, the control block is not
 * embedded at a fixed offset inside the stack page it describes -- it's a
 * separate heap allocation (`Arc<Thread>`), shared between whichever queue
 * currently holds the thread and the `CURRENT` cell in `scheduler::mod`.
 *
 * The overflow canary that used to live at a computed offset inside the
 * thread's own page now lives at the lowest address of the stack buffer
 * instead, and is checked by `scheduler::current()`.
 */

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::memory::pages::Page;

/// Hook for a higher layer (user-program support) to hang a page table or
/// similar per-thread context off a `Thread`. No implementation of this
/// trait exists in this core; the field and the `schedule_tail` call site
/// that would invoke it both exist so one can be added without touching
/// the scheduler's own state machine.
pub trait AddressSpace: Send + Sync {
    /// Called from `schedule_tail`, after the switch into this thread has
    /// completed, before it is marked `Running`.
    fn activate(&self);
}

pub const PRI_MIN: u8 = 0;
pub const PRI_DEFAULT: u8 = 31;
pub const PRI_MAX: u8 = 63;

/// Ticks a thread may run before `on_tick` requests a yield.
pub const TIME_SLICE: u64 = 4;

pub type ThreadId = i64;

/// Returned by `create` when the thread table/page pool is exhausted.
pub const ERROR_ID: ThreadId = -1;

/// `wake_tick` value meaning "not sleeping".
pub const NOT_SLEEPING: i64 = -1;

/// `min_wake` value meaning "the sleeping queue is empty".
pub const EMPTY_SENTINEL: i64 = -1;

/// Canary written at the lowest address of a thread's stack page.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Ready,
    Blocked,
    Dying,
}

const NAME_LEN: usize = 16;

pub(super) type Entry = dyn FnOnce() + Send + 'static;

pub struct Thread {
    pub id: ThreadId,
    name: [u8; NAME_LEN],
    status: UnsafeCell<Status>,
    stack_pointer: UnsafeCell<u64>,
    stack: UnsafeCell<Option<Page>>,
    entry: UnsafeCell<Option<Box<Entry>>>,
    priority: UnsafeCell<u8>,
    wake_tick: AtomicI64,
    cpu_ticks: AtomicU64,
    address_space: UnsafeCell<Option<Arc<dyn AddressSpace>>>,
}

// SAFETY: every field is mutated only by whichever thread holds `intr off`
// and is the one the scheduler currently considers CURRENT, or is mutated
// exactly once before the thread is ever made runnable (name, entry at
// creation). The core never runs on more than one CPU at a time.
unsafe impl Sync for Thread {}

impl Thread {
    fn encode_name(name: &str) -> [u8; NAME_LEN] {
        let mut buf = [0u8; NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_LEN - 1);
        buf[..n].copy_from_slice(&bytes[..n]);
        buf
    }

    /// Build a thread record around an already-primed stack page. `sp` is
    /// the value installed into `stack_pointer`, produced by
    /// `context::prepare_first_run`.
    pub(super) fn new(
        id: ThreadId,
        name: &str,
        priority: u8,
        stack: Page,
        sp: u64,
        entry: Box<Entry>,
    ) -> Thread {
        Thread {
            id,
            name: Self::encode_name(name),
            status: UnsafeCell::new(Status::Blocked),
            stack_pointer: UnsafeCell::new(sp),
            stack: UnsafeCell::new(Some(stack)),
            entry: UnsafeCell::new(Some(entry)),
            priority: UnsafeCell::new(priority),
            wake_tick: AtomicI64::new(NOT_SLEEPING),
            cpu_ticks: AtomicU64::new(0),
            address_space: UnsafeCell::new(None),
        }
    }

    /// Build the record for the thread that was already running when
    /// `scheduler::init` runs -- it owns no page of its own.
    pub(super) fn new_initial(id: ThreadId, name: &str) -> Thread {
        Thread {
            id,
            name: Self::encode_name(name),
            status: UnsafeCell::new(Status::Running),
            stack_pointer: UnsafeCell::new(0),
            stack: UnsafeCell::new(None),
            entry: UnsafeCell::new(None),
            priority: UnsafeCell::new(PRI_DEFAULT),
            wake_tick: AtomicI64::new(NOT_SLEEPING),
            cpu_ticks: AtomicU64::new(0),
            address_space: UnsafeCell::new(None),
        }
    }

    pub fn name(&self) -> String {
        let nul = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..nul]).into_owned()
    }

    pub(super) fn status(&self) -> Status {
        unsafe { *self.status.get() }
    }

    pub(super) fn set_status(&self, status: Status) {
        unsafe {
            *self.status.get() = status;
        }
    }

    pub(super) fn stack_pointer_cell(&self) -> *mut u64 {
        self.stack_pointer.get()
    }

    /// Raw pointer to the lowest address of the stack buffer, for the magic
    /// canary check. `None` for the initial thread, which owns no page.
    pub(super) fn stack_base(&self) -> Option<*const u8> {
        unsafe { (*self.stack.get()).as_ref().map(Page::as_ptr) }
    }

    pub(super) fn take_stack(&self) -> Option<Page> {
        unsafe { (*self.stack.get()).take() }
    }

    pub(super) fn take_entry(&self) -> Option<Box<Entry>> {
        unsafe { (*self.entry.get()).take() }
    }

    pub fn priority(&self) -> u8 {
        unsafe { *self.priority.get() }
    }

    pub(super) fn set_priority(&self, priority: u8) {
        unsafe {
            *self.priority.get() = priority;
        }
    }

    pub fn wake_tick(&self) -> i64 {
        self.wake_tick.load(Ordering::Relaxed)
    }

    pub(super) fn set_wake_tick(&self, tick: i64) {
        self.wake_tick.store(tick, Ordering::Relaxed);
    }

    pub(super) fn add_cpu_tick(&self) {
        self.cpu_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cpu_ticks(&self) -> u64 {
        self.cpu_ticks.load(Ordering::Relaxed)
    }

    /// Hang a user-program address space off this thread; activated on
    /// every subsequent switch into it.
    pub fn set_address_space(&self, space: Arc<dyn AddressSpace>) {
        unsafe {
            *self.address_space.get() = Some(space);
        }
    }

    pub(super) fn address_space(&self) -> Option<Arc<dyn AddressSpace>> {
        unsafe { (*self.address_space.get()).clone() }
    }

    /// Whether this thread runs in a user address space, for `on_tick`'s
    /// idle/user/kernel accounting.
    pub(super) fn is_user(&self) -> bool {
        unsafe { (*self.address_space.get()).is_some() }
    }
}
