/*
 * Page pool.
 *
 * Stands in for the `page_alloc_zeroed`/`page_free` external contract the
 * scheduling core is written against: a fixed-size, fixed-count pool of
 * 4 KiB zeroed regions used exclusively to back thread stacks, one page
 * per thread. Deliberately kept separate from the general kernel heap in
 * `memory::heap` -- the core treats this as the only heap-like resource
 * it uses, once per thread creation and once per reap.
 */

use alloc::vec::Vec;
use spin::Mutex;

pub const PAGE_SIZE: usize = 4096;

/// Sized to comfortably cover the "creation under load" scenario (1,024
/// threads live at once) with headroom for the initial and idle threads.
const POOL_PAGES: usize = 1280;

#[repr(align(4096))]
struct Pool([[u8; PAGE_SIZE]; POOL_PAGES]);

static mut POOL: Pool = Pool([[0; PAGE_SIZE]; POOL_PAGES]);

static FREE_LIST: Mutex<Vec<usize>> = Mutex::new(Vec::new());

/// Populate the free list. Must run once, before the first `page_alloc_zeroed`.
pub fn init() {
    let mut free = FREE_LIST.lock();
    free.reserve(POOL_PAGES);
    for index in (0..POOL_PAGES).rev() {
        free.push(index);
    }
    log::info!("page pool initialized: {} pages of {} bytes", POOL_PAGES, PAGE_SIZE);
}

/// A single zeroed page, owning its pool slot until freed.
pub struct Page {
    index: usize,
    ptr: *mut u8,
}

impl Page {
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        PAGE_SIZE
    }
}

/// Allocate a zeroed page, or `None` if the pool is exhausted.
pub fn page_alloc_zeroed() -> Option<Page> {
    let index = FREE_LIST.lock().pop()?;
    // SAFETY: `index` was popped from the free list, so no other `Page`
    // holds it; the pool itself is 'static and never moves.
    let ptr = unsafe { (&raw mut (*(&raw mut POOL)).0[index]) as *mut u8 };
    unsafe {
        core::ptr::write_bytes(ptr, 0, PAGE_SIZE);
    }
    Some(Page { index, ptr })
}

/// Release a page back to the pool.
pub fn page_free(page: Page) {
    FREE_LIST.lock().push(page.index);
}
