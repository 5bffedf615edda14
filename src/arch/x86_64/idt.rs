/*
 * Interrupt Descriptor Table (IDT) Implementation
 *
 * Wires up the CPU exception vectors (so a fault halts with a message
 * instead of triple-faulting) and the one hardware interrupt this kernel
 * cares about: IRQ0, the PIT timer that drives the scheduler's tick.
 */

use lazy_static::lazy_static;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame};

unsafe fn pic_eoi() {
    use x86_64::instructions::port::Port;
    unsafe { Port::<u8>::new(0x20).write(0x20u8) };
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.debug.set_handler_fn(debug_handler);
        idt.non_maskable_interrupt.set_handler_fn(nmi_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.overflow.set_handler_fn(overflow_handler);
        idt.bound_range_exceeded.set_handler_fn(bound_range_exceeded_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.device_not_available.set_handler_fn(device_not_available_handler);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.invalid_tss.set_handler_fn(invalid_tss_handler);
        idt.segment_not_present.set_handler_fn(segment_not_present_handler);
        idt.stack_segment_fault.set_handler_fn(stack_segment_fault_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.x87_floating_point.set_handler_fn(x87_floating_point_handler);
        idt.alignment_check.set_handler_fn(alignment_check_handler);
        idt.machine_check.set_handler_fn(machine_check_handler);
        idt.simd_floating_point.set_handler_fn(simd_floating_point_handler);
        idt.virtualization.set_handler_fn(virtualization_handler);
        idt.security_exception.set_handler_fn(security_exception_handler);

        // IRQ 0 - PIT timer, remapped to vector 32 by arch::x86_64::pic::init_pic.
        idt[32].set_handler_fn(timer_interrupt_handler);

        idt
    };
}

/// Initialize the Interrupt Descriptor Table.
pub fn init() {
    log::info!("Loading IDT...");
    IDT.load();
    log::info!("IDT loaded");
}

fn halt_forever() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    log::error!("DIVIDE_ERROR at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn debug_handler(_stack_frame: InterruptStackFrame) {
    log::warn!("DEBUG exception");
}

extern "x86-interrupt" fn nmi_handler(stack_frame: InterruptStackFrame) {
    log::error!("NMI at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("BREAKPOINT at {:?}", stack_frame.instruction_pointer);
}

extern "x86-interrupt" fn overflow_handler(stack_frame: InterruptStackFrame) {
    log::error!("OVERFLOW at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn bound_range_exceeded_handler(stack_frame: InterruptStackFrame) {
    log::error!("BOUND_RANGE_EXCEEDED at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    log::error!("INVALID_OPCODE at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn device_not_available_handler(stack_frame: InterruptStackFrame) {
    log::error!("DEVICE_NOT_AVAILABLE at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    log::error!("DOUBLE_FAULT at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn invalid_tss_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    log::error!("INVALID_TSS (code {:#x}) at {:?}", error_code, stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn segment_not_present_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    log::error!("SEGMENT_NOT_PRESENT (code {:#x}) at {:?}", error_code, stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn stack_segment_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    log::error!("STACK_SEGMENT_FAULT (code {:#x}) at {:?}", error_code, stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    log::error!("GENERAL_PROTECTION_FAULT (code {:#x}) at {:?}", error_code, stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: x86_64::structures::idt::PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    let fault_addr = Cr2::read().ok();
    log::error!(
        "PAGE_FAULT at {:?} (addr {:?}, code {:?})",
        stack_frame.instruction_pointer,
        fault_addr,
        error_code
    );
    halt_forever();
}

extern "x86-interrupt" fn x87_floating_point_handler(stack_frame: InterruptStackFrame) {
    log::error!("X87_FP_EXCEPTION at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn alignment_check_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    log::error!("ALIGNMENT_CHECK (code {:#x}) at {:?}", error_code, stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn machine_check_handler(stack_frame: InterruptStackFrame) -> ! {
    log::error!("MACHINE_CHECK at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn simd_floating_point_handler(stack_frame: InterruptStackFrame) {
    log::error!("SIMD_FP_EXCEPTION at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn virtualization_handler(stack_frame: InterruptStackFrame) {
    log::error!("VIRTUALIZATION_EXCEPTION at {:?}", stack_frame.instruction_pointer);
    halt_forever();
}

extern "x86-interrupt" fn security_exception_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    log::error!("SECURITY_EXCEPTION (code {:#x}) at {:?}", error_code, stack_frame.instruction_pointer);
    halt_forever();
}

/// Timer interrupt: the only hardware IRQ this kernel services.
///
/// Runs the scheduler's O(1) per-tick bookkeeping, sends EOI, and only then
/// checks whether a yield was requested -- the actual `yield()` happens here,
/// at the interrupt-return safe point, never from inside `on_tick` itself.
extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    {
        let _guard = crate::arch::x86_64::interrupts::InterruptContextGuard::enter();
        crate::scheduler::on_tick();
    }

    unsafe {
        pic_eoi();
    }

    crate::scheduler::context::timer_return();
}
