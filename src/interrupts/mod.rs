// https://wiki.osdev.org/Interrupt_Descriptor_Table
//
// Minimal 32-bit GDT/TSS/IDT bring-up, grounded on
// `kernel/arch/i386/gdt.c`/`idt.c`/`irq.c`: a flat ring-0 GDT, one TSS, and
// an IDT whose only populated vectors are the ones `task::fault`'s
// `classify_fault` models plus `breakpoint`/`double_fault` for early
// debugging. No IRQ routing or driver dispatch lives here.

pub mod gdt;
pub mod tss;

use core::arch::asm;

use crate::io_port::IoPort;
use crate::log;
use crate::task::fault::{classify_fault, FaultOutcome, FaultVector, NoCow, Signal};

use gdt::Gdt;
use tss::Tss;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptArgs {
    pub instruction_pointer: u32,
    pub code_segment: u32,
    pub cpu_flags: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct InterruptDescriptor {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl InterruptDescriptor {
    const fn missing() -> Self {
        InterruptDescriptor { offset_low: 0, selector: 0, zero: 0, type_attr: 0, offset_high: 0 }
    }

    fn set_handler(&mut self, handler_addr: u32) {
        self.offset_low = (handler_addr & 0xffff) as u16;
        self.offset_high = (handler_addr >> 16) as u16;
        self.selector = gdt::KERNEL_CODE_SELECTOR;
        self.zero = 0;
        self.type_attr = 0x8e; // present, ring 0, 32-bit interrupt gate
    }
}

const IDT_ENTRIES: usize = 256;

#[repr(C, packed)]
pub struct InterruptDescriptorTable([InterruptDescriptor; IDT_ENTRIES]);

impl InterruptDescriptorTable {
    pub const fn new() -> Self {
        InterruptDescriptorTable([InterruptDescriptor::missing(); IDT_ENTRIES])
    }

    pub fn set_fn(&mut self, vector: u8, handler: extern "x86-interrupt" fn(InterruptArgs)) {
        self.0[vector as usize].set_handler(handler as usize as u32);
    }

    pub fn set_fn_with_error_code(&mut self, vector: u8, handler: extern "x86-interrupt" fn(InterruptArgs, u32)) {
        self.0[vector as usize].set_handler(handler as usize as u32);
    }

    /// # Safety
    ///
    /// `self` must live at a stable `'static` address for as long as the
    /// loaded IDT is in use.
    pub unsafe fn load(&'static self) {
        #[repr(C, packed)]
        struct Idtr {
            limit: u16,
            base: u32,
        }

        let idtr = Idtr { limit: (size_of::<Self>() - 1) as u16, base: self as *const _ as u32 };
        unsafe { asm!("lidt [{0}]", in(reg) &idtr, options(readonly, nostack, preserves_flags)) };
    }
}

const VEC_DIVIDE_BY_ZERO: u8 = 0;
const VEC_BREAKPOINT: u8 = 3;
const VEC_INVALID_OPCODE: u8 = 6;
const VEC_DOUBLE_FAULT: u8 = 8;
const VEC_GENERAL_PROTECTION: u8 = 13;
const VEC_PAGE_FAULT: u8 = 14;
const VEC_FPU_ERROR: u8 = 16;

static mut TSS: Tss = Tss::new();
static mut GDT: Gdt = Gdt::new();
static mut IDT: InterruptDescriptorTable = InterruptDescriptorTable::new();

const PIC1_CMD: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// Remaps the legacy PICs' vectors to 32..=47, so a stray hardware IRQ
/// can never alias a CPU exception, then masks every line. No IRQ is
/// routed to a handler; this crate does no driver dispatch.
pub fn disable_pics() {
    const ICW1_INIT_ICW4: u8 = 0x11;
    const ICW4_8086: u8 = 0x01;

    IoPort::write_u8(PIC1_CMD, ICW1_INIT_ICW4);
    IoPort::write_u8(PIC2_CMD, ICW1_INIT_ICW4);
    IoPort::write_u8(PIC1_DATA, 32);
    IoPort::write_u8(PIC2_DATA, 40);
    IoPort::write_u8(PIC1_DATA, 4);
    IoPort::write_u8(PIC2_DATA, 2);
    IoPort::write_u8(PIC1_DATA, ICW4_8086);
    IoPort::write_u8(PIC2_DATA, ICW4_8086);

    IoPort::write_u8(PIC1_DATA, 0xff);
    IoPort::write_u8(PIC2_DATA, 0xff);
}

pub fn enable_interrupts() {
    unsafe { asm!("sti", options(nomem, nostack)) };
}

/// Builds the GDT/TSS/IDT, wires the five `task::fault::FaultVector`
/// vectors (plus breakpoint/double-fault) to `classify_fault`, and loads
/// everything. Must be called exactly once.
pub fn init() {
    assert_called_once!("interrupts::init called more than once");

    unsafe {
        let tss_ref: &'static Tss = &*(&raw const TSS);
        (*(&raw mut GDT)).fill(tss_ref);
        (*(&raw const GDT)).load();

        let idt = &mut *(&raw mut IDT);
        idt.set_fn(VEC_DIVIDE_BY_ZERO, divide_by_zero_handler);
        idt.set_fn(VEC_INVALID_OPCODE, invalid_opcode_handler);
        idt.set_fn(VEC_BREAKPOINT, breakpoint_handler);
        idt.set_fn_with_error_code(VEC_DOUBLE_FAULT, double_fault_handler);
        idt.set_fn_with_error_code(VEC_GENERAL_PROTECTION, general_protection_handler);
        idt.set_fn_with_error_code(VEC_PAGE_FAULT, page_fault_handler);
        idt.set_fn(VEC_FPU_ERROR, fpu_error_handler);
        (*(&raw const IDT)).load();
    }

    disable_pics();
    enable_interrupts();
    log!(ok, "Interrupt descriptor table loaded.");
}

fn handle_fault(vector: FaultVector, args: InterruptArgs, faulting_addr: u32, is_write: bool) {
    // Every handler below runs straight from the IDT, so there is no real
    // process context yet to signal; a fault here is always fatal for now.
    match classify_fault(vector, true, faulting_addr, is_write, &mut NoCow) {
        FaultOutcome::DeliverSignal(Signal::Sigfpe) => {
            log!(failed, "SIGFPE-class fault at {:#x}", args.instruction_pointer);
            crate::hlt();
        }
        FaultOutcome::DeliverSignal(Signal::Sigill) => {
            log!(failed, "SIGILL-class fault at {:#x}", args.instruction_pointer);
            crate::hlt();
        }
        FaultOutcome::DeliverSignal(Signal::Sigsegv) => {
            log!(failed, "SIGSEGV-class fault at {:#x}", args.instruction_pointer);
            crate::hlt();
        }
        FaultOutcome::Resolved => {}
        FaultOutcome::KernelPanic => {
            log!(failed, "unresolvable fault at {:#x}", args.instruction_pointer);
            crate::hlt();
        }
    }
}

extern "x86-interrupt" fn divide_by_zero_handler(args: InterruptArgs) {
    handle_fault(FaultVector::DivideByZero, args, 0, false);
}

extern "x86-interrupt" fn invalid_opcode_handler(args: InterruptArgs) {
    handle_fault(FaultVector::InvalidOpcode, args, 0, false);
}

extern "x86-interrupt" fn breakpoint_handler(args: InterruptArgs) {
    log!(warn, "breakpoint hit at {:#x}", args.instruction_pointer);
}

extern "x86-interrupt" fn double_fault_handler(args: InterruptArgs, error_code: u32) {
    log!(failed, "double fault (error {:#x}) at {:#x}, halting", error_code, args.instruction_pointer);
    crate::hlt();
}

extern "x86-interrupt" fn general_protection_handler(args: InterruptArgs, error_code: u32) {
    handle_fault(FaultVector::GeneralProtection, args, 0, error_code & 0x2 != 0);
}

extern "x86-interrupt" fn page_fault_handler(args: InterruptArgs, error_code: u32) {
    let faulting_addr: u32;
    unsafe { asm!("mov {0}, cr2", out(reg) faulting_addr, options(nomem, nostack, preserves_flags)) };
    handle_fault(FaultVector::PageFault, args, faulting_addr, error_code & 0x2 != 0);
}

extern "x86-interrupt" fn fpu_error_handler(args: InterruptArgs) {
    handle_fault(FaultVector::FpuError, args, 0, false);
}
