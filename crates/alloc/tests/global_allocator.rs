//! The slots backing the whole test binary
//!
//! Every allocation here, the harness's own included, goes through
//! `SlotGlobalAlloc`, so std types with over-aligned internals must work.

use std::ffi::c_void;
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use seam_alloc::allocator::{AllocatorTable, SlotGlobalAlloc, default_malloc, global};

#[global_allocator]
static GLOBAL: SlotGlobalAlloc = SlotGlobalAlloc;

static MALLOC_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn counting_malloc(size: usize) -> *mut c_void {
    MALLOC_CALLS.fetch_add(1, Ordering::SeqCst);
    unsafe { default_malloc(size) }
}

#[repr(align(64))]
struct CacheLine([u8; 64]);

#[repr(align(4096))]
struct Page([u8; 4096]);

#[test]
fn test_channel_between_threads() {
    let (tx, rx) = mpsc::channel::<Vec<u32>>();

    let producers: Vec<_> = (0..4)
        .map(|id| {
            let tx = tx.clone();
            thread::spawn(move || {
                for n in 0..100 {
                    tx.send(vec![id; n]).unwrap();
                }
            })
        })
        .collect();
    drop(tx);

    let received: usize = rx.iter().map(|batch| batch.len()).sum();
    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(received, 4 * (0..100).sum::<usize>());
}

#[test]
fn test_over_aligned_boxes() {
    let line = Box::new(CacheLine([7; 64]));
    assert_eq!((&raw const *line) as usize % 64, 0);
    assert_eq!(line.0[63], 7);

    let pages: Vec<Page> = (0..3).map(|i| Page([i; 4096])).collect();
    assert_eq!(pages.as_ptr() as usize % 4096, 0);
    assert_eq!(pages[2].0[4095], 2);

    let mut lines: Vec<CacheLine> = Vec::new();
    for i in 0..50 {
        lines.push(CacheLine([i; 64]));
    }
    assert_eq!(lines.as_ptr() as usize % 64, 0);
    assert!(lines.iter().enumerate().all(|(i, l)| l.0[0] == i as u8));
}

#[test]
fn test_rust_allocations_reach_installed_slot() {
    let before = MALLOC_CALLS.load(Ordering::SeqCst);
    {
        let _guard =
            global::override_with(unsafe { AllocatorTable::new().with_malloc(counting_malloc) });
        let boxed = black_box(Box::new([0u64; 32]));
        let line = black_box(Box::new(CacheLine([1; 64])));
        assert_eq!(boxed.len() + line.0.len(), 96);
    }
    // other harness threads may allocate meanwhile
    assert!(MALLOC_CALLS.load(Ordering::SeqCst) >= before + 2);
    assert!(global::is_default());
}
