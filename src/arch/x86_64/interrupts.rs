/*
 * Interrupt Management Module
 *
 * This module provides utilities for managing CPU interrupts, including
 * enabling/disabling interrupts and checking interrupt status. It serves
 * as a high-level interface to x86_64 interrupt control instructions.
 *
 * It also implements the interrupt-level contract the scheduling core is
 * written against: a two-valued "interrupt level" that can be saved and
 * restored around a critical section (`intr_disable`/`intr_set_level`),
 * a way to ask whether the CPU is currently servicing a hardware interrupt
 * (`intr_context`), and a one-shot "please yield when this interrupt
 * returns" flag (`intr_yield_on_return`/`take_yield_on_return`) that the
 * timer IDT handler consumes after its body runs, never from inside it.
 */

use core::sync::atomic::{AtomicBool, Ordering};

use x86_64::instructions::interrupts;

/// Enable interrupts globally.
pub fn enable() {
    interrupts::enable();
}

/// Disable interrupts globally.
pub fn disable() {
    interrupts::disable();
}

/// Check if interrupts are enabled.
pub fn are_enabled() -> bool {
    interrupts::are_enabled()
}

/// The saved interrupt level returned by `intr_disable`, consumed by `intr_set_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Enabled,
    Disabled,
}

/// Disable interrupts and return the level that was in effect before the call.
///
/// Pairs with `intr_set_level`: `let prev = intr_disable(); ...; intr_set_level(prev);`
pub fn intr_disable() -> Level {
    let prev = if are_enabled() {
        Level::Enabled
    } else {
        Level::Disabled
    };
    disable();
    prev
}

/// Restore a previously saved interrupt level.
pub fn intr_set_level(level: Level) {
    match level {
        Level::Enabled => enable(),
        Level::Disabled => disable(),
    }
}

/// Read the current interrupt level without changing it.
pub fn intr_get_level() -> Level {
    if are_enabled() {
        Level::Enabled
    } else {
        Level::Disabled
    }
}

/// True while a hardware interrupt handler is executing on this CPU.
static IN_INTERRUPT_CONTEXT: AtomicBool = AtomicBool::new(false);

/// Whether the calling code is running inside a hardware interrupt handler.
///
/// The scheduling core's suspension points (`block`, `sleep_until`, `yield`,
/// `exit`) must never be called while this is true.
pub fn intr_context() -> bool {
    IN_INTERRUPT_CONTEXT.load(Ordering::Acquire)
}

/// RAII marker set for the duration of a hardware interrupt handler body.
///
/// Constructed at the top of the timer IDT handler and dropped before the
/// handler checks `take_yield_on_return`, so that flag-check itself is not
/// considered interrupt context.
pub(crate) struct InterruptContextGuard;

impl InterruptContextGuard {
    pub(crate) fn enter() -> Self {
        IN_INTERRUPT_CONTEXT.store(true, Ordering::Release);
        InterruptContextGuard
    }
}

impl Drop for InterruptContextGuard {
    fn drop(&mut self) {
        IN_INTERRUPT_CONTEXT.store(false, Ordering::Release);
    }
}

/// Set by `on_tick` when a time slice has expired; consumed once at the
/// interrupt-return safe point, which then performs the actual `yield()`.
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

/// Request that the interrupt-return epilogue perform a yield.
///
/// Called only from `on_tick`; never triggers a switch itself.
pub fn intr_yield_on_return() {
    YIELD_ON_RETURN.store(true, Ordering::Release);
}

/// Consume the pending-yield flag, returning whether a yield was requested.
///
/// Called once per interrupt return, after the handler body (and this
/// module's `InterruptContextGuard`) has finished.
pub fn take_yield_on_return() -> bool {
    YIELD_ON_RETURN.swap(false, Ordering::AcqRel)
}
