/*
 * Low-level context switch and first-run trampoline.
 *
 * `switch_stack` saves the callee-saved registers of the outgoing thread
 * onto its own stack, swaps `rsp`, and restores the incoming thread's. It
 * doesn't know or care whether the incoming thread has ever run before: a
 * thread that's never run has had its stack primed by `prepare_first_run`
 * to look exactly like one that called `switch_stack` and is about to
 * return, except the return address points at `trampoline_entry` instead
 * of back into `mod::switch_to`.
 *
 * Grounded on the same stackful-coroutine shape as a classic Pintos
 * `switch_threads`/`switch_entry`/`kernel_thread` trio, collapsed to one
 * asm routine plus one trampoline since the `(function, aux)` pair that
 * Pintos stacks by hand is carried here as a boxed closure on the thread
 * record instead.
 */

use core::arch::naked_asm;

use super::{current, schedule_tail};
use crate::memory::pages::{PAGE_SIZE, Page};

/// Reserved bit 1 set, interrupt flag clear: threads start with interrupts
/// disabled and enable them explicitly in the trampoline, mirroring the
/// `intr_disable()` .. `thread_unblock()` .. `intr_set_level()` dance
/// `thread_create` performs before a new thread ever runs.
const DEFAULT_RFLAGS: u64 = 0x2;

unsafe fn push(sp: *mut u64, value: u64) -> *mut u64 {
    unsafe {
        let sp = sp.sub(1);
        sp.write(value);
        sp
    }
}

/// Write the overflow canary at the base of `page` and build a stack frame
/// that, once switched to, lands in `trampoline_entry`.
pub(super) fn prepare_first_run(page: &mut Page) -> u64 {
    unsafe {
        let base = page.as_mut_ptr();
        (base as *mut u32).write(super::thread::THREAD_MAGIC);

        let top = base.add(PAGE_SIZE) as *mut u64;
        let mut sp = top;
        sp = push(sp, trampoline_entry as usize as u64);
        sp = push(sp, DEFAULT_RFLAGS);
        sp = push(sp, 0); // rbp
        sp = push(sp, 0); // rbx
        sp = push(sp, 0); // r12
        sp = push(sp, 0); // r13
        sp = push(sp, 0); // r14
        sp = push(sp, 0); // r15
        sp as u64
    }
}

/// Save the caller's callee-saved registers onto its own stack, switch
/// `rsp` to `*next_sp`, and restore the registers found there.
///
/// # Safety
///
/// Both pointers must point at a live `Thread::stack_pointer` cell, and
/// must not alias. Must be called with interrupts off.
#[unsafe(naked)]
pub(super) unsafe extern "sysv64" fn switch_stack(prev_sp: *mut u64, next_sp: *mut u64) {
    naked_asm!(
        "pushfq",
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, [rsi]",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "popfq",
        "ret",
    )
}

/// Landing pad for a thread's first dispatch. Reached via `switch_stack`'s
/// closing `ret`, not a `call`, so there is no return address or caller
/// frame to honor -- realign the stack defensively and hand off to Rust.
#[unsafe(naked)]
unsafe extern "C" fn trampoline_entry() -> ! {
    naked_asm!("and rsp, -16", "call {finish}", "ud2", finish = sym trampoline_finish)
}

extern "C" fn trampoline_finish() -> ! {
    schedule_tail();
    crate::arch::x86_64::interrupts::enable();

    let thread = current();
    if let Some(entry) = thread.take_entry() {
        entry();
    }

    super::exit();
}

/// Consumed once per interrupt return; performs the yield the timer
/// handler requested, if any. Never called from inside the handler body.
pub fn timer_return() {
    if crate::arch::x86_64::interrupts::take_yield_on_return() {
        super::yield_now();
    }
}
