/*
 * x86_64 Architecture Support Module
 *
 * This module contains all x86_64-specific code backing the scheduling core:
 * the GDT/IDT/PIC bring-up needed to take a timer interrupt, the low-level
 * port-I/O primitive used by the serial console, and the interrupt-level
 * control functions the scheduler relies on for its interrupts-off critical
 * sections.
 *
 * Submodules:
 * - gdt: Global Descriptor Table management
 * - idt: Interrupt Descriptor Table and exception handling
 * - interrupts: Interrupt control utilities (the intr_* contract)
 * - pic: 8259 PIC remap/mask
 * - pio: port I/O primitive
 * - uart_16550: serial port driver backing the kernel logger
 */

pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod pic;
pub mod pio;
pub mod uart_16550;
