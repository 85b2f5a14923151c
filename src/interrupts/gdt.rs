// https://wiki.osdev.org/Global_Descriptor_Table
// https://wiki.osdev.org/GDT_Tutorial

use core::arch::asm;

use super::tss::Tss;

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const TSS_SELECTOR: u16 = 0x18;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct SegmentDescriptor {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    limit_high_flags: u8,
    base_high: u8,
}

impl SegmentDescriptor {
    const fn null() -> Self {
        SegmentDescriptor { limit_low: 0, base_low: 0, base_mid: 0, access: 0, limit_high_flags: 0, base_high: 0 }
    }

    const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        SegmentDescriptor {
            limit_low: (limit & 0xffff) as u16,
            base_low: (base & 0xffff) as u16,
            base_mid: ((base >> 16) & 0xff) as u8,
            access,
            limit_high_flags: (((limit >> 16) & 0x0f) as u8) | (flags << 4),
            base_high: ((base >> 24) & 0xff) as u8,
        }
    }
}

/// Flat ring-0-only GDT: one code segment, one data segment, one TSS
/// descriptor. No per-process segments, no ring 3, matching the minimal
/// contract the scheduler actually needs right now.
#[repr(C, packed)]
pub struct Gdt {
    null: SegmentDescriptor,
    kernel_code: SegmentDescriptor,
    kernel_data: SegmentDescriptor,
    tss: SegmentDescriptor,
}

impl Gdt {
    pub const fn new() -> Self {
        Gdt {
            null: SegmentDescriptor::null(),
            kernel_code: SegmentDescriptor::null(),
            kernel_data: SegmentDescriptor::null(),
            tss: SegmentDescriptor::null(),
        }
    }

    pub fn fill(&mut self, tss: &'static Tss) {
        // 4KiB-granularity, 32-bit, present, ring 0, whole address space.
        self.kernel_code = SegmentDescriptor::new(0, 0xfffff, 0x9a, 0xc);
        self.kernel_data = SegmentDescriptor::new(0, 0xfffff, 0x92, 0xc);

        let tss_base = tss as *const Tss as u32;
        let tss_limit = size_of::<Tss>() as u32 - 1;
        self.tss = SegmentDescriptor::new(tss_base, tss_limit, 0x89, 0x0);
    }

    /// # Safety
    ///
    /// `self` must live at a stable `'static` address for as long as the
    /// loaded selectors are in use.
    pub unsafe fn load(&'static self) {
        #[repr(C, packed)]
        struct Gdtr {
            limit: u16,
            base: u32,
        }

        let gdtr = Gdtr { limit: (size_of::<Gdt>() - 1) as u16, base: self as *const Gdt as u32 };

        unsafe {
            asm!("lgdt [{0}]", in(reg) &gdtr, options(readonly, nostack, preserves_flags));
            reload_segments();
            asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack, preserves_flags));
        }
    }
}

/// Reloads every segment register from the freshly-loaded GDT. `cs` can
/// only be reloaded via a (far) control transfer, hence the push/retf
/// trick rather than a plain `mov`.
unsafe fn reload_segments() {
    unsafe {
        asm!(
            "push {code_sel}",
            "lea {tmp}, [2f]",
            "push {tmp}",
            "retf",
            "2:",
            "mov {tmp:x}, {data_sel:x}",
            "mov ds, {tmp:x}",
            "mov es, {tmp:x}",
            "mov fs, {tmp:x}",
            "mov gs, {tmp:x}",
            "mov ss, {tmp:x}",
            code_sel = const KERNEL_CODE_SELECTOR as u32,
            data_sel = in(reg) KERNEL_DATA_SELECTOR as u32,
            tmp = out(reg) _,
        );
    }
}
