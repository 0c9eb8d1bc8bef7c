#![allow(unsafe_code)]
//! Lock-free Chase-Lev work-stealing deque (§4.7), specialized to
//! [`crate::walker::WorkItem`] pointers.
//!
//! The owner pushes and pops at `bottom` (LIFO, for cache locality: the
//! directory just discovered is usually still hot). Stealers compete at
//! `top` via CAS (FIFO across the deque's lifetime, for fairness between
//! threads). The backing ring buffer doubles on overflow; old buffers are
//! retained rather than freed, accepting the bounded per-doubling leak
//! the spec calls out in §9 rather than adding hazard-pointer reclamation.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicIsize, AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

struct Buffer<T> {
    cap: usize,
    storage: Box<[AtomicPtr<T>]>,
}

impl<T> Buffer<T> {
    fn new(cap: usize) -> Self {
        let mut v = Vec::with_capacity(cap);
        for _ in 0..cap {
            v.push(AtomicPtr::new(std::ptr::null_mut()));
        }
        Buffer { cap, storage: v.into_boxed_slice() }
    }

    #[inline]
    fn at(&self, i: isize) -> &AtomicPtr<T> {
        let idx = (i as usize) & (self.cap - 1);
        &self.storage[idx]
    }
}

/// Shared inner state between a [`Worker`] and its [`Stealer`] clones.
struct Inner<T> {
    top: AtomicIsize,
    bottom: AtomicIsize,
    buffer: AtomicPtr<Buffer<T>>,
    /// Every buffer ever allocated for this deque, kept alive until the
    /// deque itself is dropped (§9: accept the bounded leak).
    retired: UnsafeCell<Vec<Box<Buffer<T>>>>,
}

// SAFETY: all mutation of `retired` happens only from `push`, which is
// owner-exclusive by construction (only `Worker` calls it); `Stealer`
// never touches `retired`.
unsafe impl<T> Sync for Inner<T> {}

/// Owner-only handle: `push`/`pop` at the bottom. Not `Clone`.
pub struct Worker<T> {
    inner: Arc<Inner<T>>,
}

/// Clonable stealer handle: `steal` at the top, contending with other
/// stealers and racing the owner's `pop`.
#[derive(Clone)]
pub struct Stealer<T> {
    inner: Arc<Inner<T>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Steal<T> {
    Empty,
    Retry,
    Success(T),
}

const MIN_CAP: usize = 32;

/// Creates a new empty deque, returning its owner `Worker` and a
/// [`Stealer`] that may be cloned freely for every other worker thread.
pub fn new<T>() -> (Worker<T>, Stealer<T>) {
    let buffer = Box::new(Buffer::new(MIN_CAP));
    let inner = Arc::new(Inner {
        top: AtomicIsize::new(0),
        bottom: AtomicIsize::new(0),
        buffer: AtomicPtr::new(Box::into_raw(buffer)),
        retired: UnsafeCell::new(Vec::new()),
    });
    (Worker { inner: inner.clone() }, Stealer { inner })
}

impl<T> Worker<T> {
    /// Returns a new stealer handle sharing this deque.
    pub fn stealer(&self) -> Stealer<T> {
        Stealer { inner: self.inner.clone() }
    }

    /// Pushes `x` (as a raw owned pointer) onto the bottom. Grows the
    /// buffer first if it's at capacity (§4.7).
    pub fn push(&self, x: *mut T) {
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let t = self.inner.top.load(Ordering::Acquire);
        let mut buf = self.current_buffer();
        let size = b - t;
        if size as usize >= buf.cap {
            buf = self.grow(buf, t, b);
        }
        buf.at(b).store(x, Ordering::Relaxed);
        self.inner.bottom.store(b + 1, Ordering::Release);
    }

    fn current_buffer(&self) -> &Buffer<T> {
        // SAFETY: the buffer is only ever replaced by `grow`, which retires
        // (never frees) the old one and stores the new pointer with
        // `Release`; the owner thread is the only writer of `buffer`.
        unsafe { &*self.inner.buffer.load(Ordering::Acquire) }
    }

    fn grow<'a>(&'a self, old: &'a Buffer<T>, t: isize, b: isize) -> &'a Buffer<T> {
        let new_cap = old.cap * 2;
        let new_buf = Box::new(Buffer::new(new_cap));
        for i in t..b {
            new_buf.at(i).store(old.at(i).load(Ordering::Relaxed), Ordering::Relaxed);
        }
        let raw = Box::into_raw(new_buf);
        self.inner.buffer.store(raw, Ordering::Release);
        // SAFETY: `retired` is only touched here, on the owner thread.
        unsafe {
            (*self.inner.retired.get()).push(Box::from_raw(old as *const _ as *mut Buffer<T>));
        }
        // SAFETY: just stored above.
        unsafe { &*raw }
    }

    /// Pops from the bottom. `None` if the deque is empty; may race a
    /// concurrent `steal` for the very last element, in which case at most
    /// one of them wins (§4.7).
    pub fn pop(&self) -> Option<*mut T> {
        let b = self.inner.bottom.load(Ordering::Relaxed) - 1;
        let buf = self.current_buffer();
        self.inner.bottom.store(b, Ordering::SeqCst);
        let t = self.inner.top.load(Ordering::SeqCst);
        if t > b {
            self.inner.bottom.store(b + 1, Ordering::Relaxed);
            return None;
        }
        let x = buf.at(b).load(Ordering::Relaxed);
        if t == b {
            let won = self
                .inner
                .top
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok();
            self.inner.bottom.store(b + 1, Ordering::Relaxed);
            if !won {
                return None;
            }
        }
        Some(x)
    }
}

impl<T> Stealer<T> {
    /// Attempts to steal one item from the top. See [`Steal`] for the
    /// three possible outcomes (§4.7).
    pub fn steal(&self) -> Steal<T> {
        let t = self.inner.top.load(Ordering::Acquire);
        let b = self.inner.bottom.load(Ordering::SeqCst);
        if t >= b {
            return Steal::Empty;
        }
        // SAFETY: the buffer outlives this read because old buffers are
        // retired, never freed, and `buffer` is only ever replaced with a
        // strictly larger one covering the same live range.
        let buf = unsafe { &*self.inner.buffer.load(Ordering::Acquire) };
        let x = buf.at(t).load(Ordering::Relaxed);
        match self.inner.top.compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => Steal::Success(x),
            Err(_) => Steal::Retry,
        }
    }

    /// Best-effort emptiness check (racy, for idle/termination heuristics
    /// only — never relied on for correctness).
    pub fn is_empty(&self) -> bool {
        let t = self.inner.top.load(Ordering::Acquire);
        let b = self.inner.bottom.load(Ordering::SeqCst);
        t >= b
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        // Drain remaining elements so their payloads are freed; this only
        // runs once per deque since `Worker` isn't `Clone`.
        while let Some(ptr) = self.pop() {
            // SAFETY: `ptr` was produced from `Box::into_raw` by the
            // enqueuing side and never freed elsewhere.
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
        let raw = self.inner.buffer.load(Ordering::Acquire);
        // SAFETY: sole remaining owner at this point (stealers hold no
        // buffer pointers across calls); frees the final live buffer.
        unsafe {
            drop(Box::from_raw(raw));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn boxed(n: u32) -> *mut u32 {
        Box::into_raw(Box::new(n))
    }

    unsafe fn read(ptr: *mut u32) -> u32 {
        unsafe { *Box::from_raw(ptr) }
    }

    #[test]
    fn owner_push_pop_is_lifo() {
        let (w, _s) = new::<u32>();
        for i in 0..5 {
            w.push(boxed(i));
        }
        let mut got = Vec::new();
        while let Some(p) = w.pop() {
            got.push(unsafe { read(p) });
        }
        assert_eq!(got, vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn steal_takes_from_the_front() {
        let (w, s) = new::<u32>();
        for i in 0..5 {
            w.push(boxed(i));
        }
        let mut stolen = Vec::new();
        loop {
            match s.steal() {
                Steal::Success(p) => stolen.push(unsafe { read(p) }),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
        assert_eq!(stolen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn pop_on_empty_returns_none() {
        let (w, _s) = new::<u32>();
        assert!(w.pop().is_none());
    }

    #[test]
    fn steal_on_empty_returns_empty() {
        let (_w, s) = new::<u32>();
        assert_eq!(s.steal(), Steal::Empty);
    }

    #[test]
    fn grows_past_initial_capacity() {
        let (w, _s) = new::<u32>();
        for i in 0..500 {
            w.push(boxed(i));
        }
        let mut count = 0;
        while w.pop().is_some() {
            count += 1;
        }
        assert_eq!(count, 500);
    }

    #[test]
    fn concurrent_push_and_steal_preserve_all_items() {
        use std::sync::atomic::AtomicUsize;
        use std::thread;

        let (w, s) = new::<u32>();
        const N: u32 = 2000;
        let stolen_count = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let s = s.clone();
            let stolen_count = stolen_count.clone();
            handles.push(thread::spawn(move || loop {
                match s.steal() {
                    Steal::Success(p) => {
                        unsafe { read(p) };
                        stolen_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Steal::Retry => continue,
                    Steal::Empty => {
                        if stolen_count.load(Ordering::SeqCst) >= N as usize {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }));
        }
        let mut popped = 0;
        for i in 0..N {
            w.push(boxed(i));
            if i % 3 == 0 {
                if w.pop().is_some() {
                    popped += 1;
                }
            }
        }
        while popped + stolen_count.load(Ordering::SeqCst) < N as usize {
            if w.pop().is_some() {
                popped += 1;
            }
            thread::yield_now();
        }
        for h in handles {
            let _ = h.join();
        }
        assert_eq!(popped + stolen_count.load(Ordering::SeqCst), N as usize);
    }
}
