#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]
#![feature(custom_test_frameworks)]
#![test_runner(halcyon::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use core::panic::PanicInfo;

use halcyon::memory::simple_heap_allocator::HEAP_ALLOCATOR;
use halcyon::{interrupts, log, println};

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log!(failed, "Kernel Panic occurred!");
    println!("{}", info);
    halcyon::hlt();
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    halcyon::test_panic_handler(info);
}

/// # Safety
///
/// Called once by the assembly bootstrap after entering 32-bit protected
/// mode. This function may only be called once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn main() -> ! {
    log!(ok, "Rust kernel code started.");

    unsafe {
        HEAP_ALLOCATOR.init();
    }
    log!(ok, "Heap allocator initialized.");

    interrupts::init();

    #[cfg(test)]
    test_main();

    halcyon::kernel_subsystems_init();

    println!("Hello, World!");
    loop {
        halcyon::hlt_once();
    }
}
