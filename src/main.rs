/*
 * Thread scheduling core -- teaching kernel entry point
 *
 * Boots to a flat-mapped, single-core x86_64 environment and hands off
 * almost immediately to the scheduling core: GDT/IDT/PIC+PIT bring-up,
 * the two allocators, the logger, then `scheduler::init`/`start`. Once
 * the timer is ticking, this function becomes the idle path's fallback
 * only in the sense that it never runs again -- the initial thread it's
 * running on is folded into the scheduler as a regular (if page-less)
 * thread the moment `scheduler::init` returns.
 */

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(alloc_error_handler)]
#![allow(dead_code)]

extern crate alloc;

use core::panic::PanicInfo;

mod arch;
mod memory;
mod scheduler;
mod tests;
mod utils;

#[repr(C, align(16))]
pub struct AlignedBspStack([u8; 64 * 1024]);

#[unsafe(no_mangle)]
pub static mut BSP_STACK: AlignedBspStack = AlignedBspStack([0; 64 * 1024]);

/// Entry point called directly by the bootloader. Switches onto our own
/// 64 KiB stack and jumps into `kstart`; never returns.
#[unsafe(naked)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "lea rax, [rip + BSP_STACK]",
        "add rax, {stack_size}",
        "mov rsp, rax",
        "jmp kstart",
        stack_size = const 64 * 1024,
    );
}

#[unsafe(no_mangle)]
pub extern "C" fn kstart() -> ! {
    arch::x86_64::uart_16550::init_debug_port();
    utils::logger::init(true);
    log::info!("thread scheduling core starting...");

    arch::x86_64::gdt::init();
    arch::x86_64::idt::init();
    arch::x86_64::pic::init_pic();
    arch::x86_64::pic::init_pit(100);

    memory::init();

    scheduler::init();
    scheduler::start();

    tests::run_boot_self_checks();
    scheduler::print_stats();

    log::info!("idle");
    loop {
        x86_64::instructions::hlt();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();

    if let Some(location) = info.location() {
        log::error!("PANIC at {}:{}: {}", location.file(), location.line(), info.message());
    } else {
        log::error!("PANIC: {}", info.message());
    }

    loop {
        x86_64::instructions::hlt();
    }
}
