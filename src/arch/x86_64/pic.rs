/*
 * 8259 Programmable Interrupt Controller (PIC) and 8253/8254 PIT bring-up.
 *
 * Remaps the two PICs so hardware IRQs land at vectors 32-47 (clear of the
 * CPU exception vectors) and masks every line except IRQ0, the timer that
 * drives `scheduler::on_tick`. `init_pit` programs that timer's frequency.
 */

use x86_64::instructions::port::Port;

pub fn init_pic() {
    let mut master_command = Port::new(0x20);
    let mut master_data = Port::new(0x21);
    let mut slave_command = Port::new(0xA0);
    let mut slave_data = Port::new(0xA1);

    unsafe {
        master_command.write(0x11u8);
        slave_command.write(0x11u8);

        master_data.write(0x20u8); // master PIC vector offset: 32
        slave_data.write(0x28u8); // slave PIC vector offset: 40

        master_data.write(0x04u8); // slave PIC is wired to IRQ2
        slave_data.write(0x02u8); // cascade identity

        master_data.write(0x01u8); // 8086 mode
        slave_data.write(0x01u8);

        master_data.write(0xFEu8); // unmask IRQ0 (timer) only
        slave_data.write(0xFFu8); // mask everything on the slave PIC
    }
}

/// Program PIT channel 0 to fire at `frequency_hz`, driving IRQ0.
pub fn init_pit(frequency_hz: u32) {
    let pit_frequency: u32 = 1_193_182;
    let divisor: u16 = (pit_frequency / frequency_hz) as u16;

    unsafe {
        let mut command = Port::<u8>::new(0x43);
        let mut channel0 = Port::<u8>::new(0x40);

        command.write(0x36u8); // channel 0, lo/hi byte, mode 3, binary
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }
}
