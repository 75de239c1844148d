//! Process-wide handle table.
//!
//! Native descriptors handed to the engine cannot hold Rust references, so
//! they hold opaque tokens instead. A [`Handle`] owns a strong reference to
//! its target; a [`WeakHandle`] observes a target without keeping it alive.
//!
//! Tokens carry a generation, so a token used after its release is caught
//! rather than aliasing whatever now occupies the slot. Resolving a stale,
//! released or wrong-typed token panics: those are lifetime bugs in the
//! bridge, not conditions a caller can recover from.

use std::any::Any;
use std::num::NonZeroUsize;
use std::os::raw::c_void;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, const_mutex};
use tracing::trace;

type Erased = Arc<dyn Any + Send + Sync>;
type ErasedWeak = Weak<dyn Any + Send + Sync>;

const INDEX_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: usize = INDEX_MASK;

/// Strong token: owns its target until released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroUsize);

/// Weak token: resolves to `None` once the target has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeakHandle(NonZeroUsize);

macro_rules! token_conversions {
    ($ty:ident) => {
        impl $ty {
            /// The raw token value.
            #[must_use]
            pub const fn as_raw(self) -> usize {
                self.0.get()
            }

            /// Rebuild a token from its raw value. Zero is never a token.
            #[must_use]
            pub const fn from_raw(raw: usize) -> Option<Self> {
                match NonZeroUsize::new(raw) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            /// Encode the token in a pointer-sized user-data slot.
            #[must_use]
            pub fn into_ptr(self) -> *mut c_void {
                std::ptr::without_provenance_mut(self.0.get())
            }

            #[must_use]
            pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
                Self::from_raw(ptr.addr())
            }
        }
    };
}

token_conversions!(Handle);
token_conversions!(WeakHandle);

fn encode(index: usize, generation: usize) -> NonZeroUsize {
    assert!(index < INDEX_MASK, "handle table exhausted");
    let raw = (generation << INDEX_BITS) | (index + 1);
    NonZeroUsize::new(raw).unwrap_or(NonZeroUsize::MIN)
}

const fn decode(token: NonZeroUsize) -> (usize, usize) {
    let raw = token.get();
    ((raw & INDEX_MASK) - 1, raw >> INDEX_BITS)
}

struct Slot<T> {
    generation: usize,
    value: Option<T>,
}

/// Generational slot arena.
struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    live: usize,
}

impl<T> Arena<T> {
    const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    fn insert(&mut self, value: T) -> NonZeroUsize {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.value = Some(value);
            return encode(index, slot.generation);
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        encode(index, 0)
    }

    fn get(&self, token: NonZeroUsize, kind: &str) -> &T {
        let (index, generation) = decode(token);
        match self.slots.get(index) {
            Some(Slot {
                generation: current,
                value: Some(value),
            }) if *current == generation => value,
            _ => panic!("stale or released {kind} handle {:#x}", token.get()),
        }
    }

    fn remove(&mut self, token: NonZeroUsize, kind: &str) -> T {
        let (index, generation) = decode(token);
        let value = match self.slots.get_mut(index) {
            Some(slot) if slot.generation == generation => slot.value.take().map(|value| {
                slot.generation = (slot.generation + 1) & GENERATION_MASK;
                value
            }),
            _ => None,
        };
        let Some(value) = value else {
            panic!("release of stale or released {kind} handle {:#x}", token.get());
        };
        self.free.push(index);
        self.live -= 1;
        value
    }
}

/// Maps tokens to shared objects.
///
/// Safe for concurrent use from unrelated connections. The lock is never
/// held while a target is dropped or while implementation code runs.
pub struct HandleTable {
    strong: Mutex<Arena<Erased>>,
    weak: Mutex<Arena<ErasedWeak>>,
}

impl HandleTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            strong: const_mutex(Arena::new()),
            weak: const_mutex(Arena::new()),
        }
    }

    /// Take a strong reference to `target` and return its token.
    pub fn wrap<T: Any + Send + Sync>(&self, target: Arc<T>) -> Handle {
        let token = self.strong.lock().insert(target);
        trace!(target: "vtbridge.handle", handle = token.get(), "handle wrapped");
        Handle(token)
    }

    /// Resolve a strong token.
    ///
    /// # Panics
    ///
    /// If the token is stale or released, or `T` is not the wrapped type.
    pub fn resolve<T: Any + Send + Sync>(&self, handle: Handle) -> Arc<T> {
        let erased = Arc::clone(self.strong.lock().get(handle.0, "strong"));
        match erased.downcast::<T>() {
            Ok(target) => target,
            Err(_) => panic!(
                "handle {:#x} resolved as the wrong type {}",
                handle.as_raw(),
                std::any::type_name::<T>()
            ),
        }
    }

    /// Invalidate `handle` and give back the strong reference it held.
    ///
    /// The caller decides where the target is dropped.
    ///
    /// # Panics
    ///
    /// If the token is stale or already released.
    pub fn release(&self, handle: Handle) -> Arc<dyn Any + Send + Sync> {
        let target = self.strong.lock().remove(handle.0, "strong");
        trace!(target: "vtbridge.handle", handle = handle.as_raw(), "handle released");
        target
    }

    /// Observe `target` without extending its lifetime.
    pub fn wrap_weak<T: Any + Send + Sync>(&self, target: &Arc<T>) -> WeakHandle {
        let weak: Weak<T> = Arc::downgrade(target);
        let weak: ErasedWeak = weak;
        let token = self.weak.lock().insert(weak);
        trace!(target: "vtbridge.handle", handle = token.get(), "weak handle wrapped");
        WeakHandle(token)
    }

    /// Resolve a weak token; `None` once the target is gone.
    ///
    /// # Panics
    ///
    /// If the token itself is stale or released, or `T` is not the wrapped
    /// type.
    pub fn resolve_weak<T: Any + Send + Sync>(&self, handle: WeakHandle) -> Option<Arc<T>> {
        let erased = self.weak.lock().get(handle.0, "weak").upgrade()?;
        match erased.downcast::<T>() {
            Ok(target) => Some(target),
            Err(_) => panic!(
                "weak handle {:#x} resolved as the wrong type {}",
                handle.as_raw(),
                std::any::type_name::<T>()
            ),
        }
    }

    /// Invalidate a weak token.
    ///
    /// # Panics
    ///
    /// If the token is stale or already released.
    pub fn release_weak(&self, handle: WeakHandle) {
        drop(self.weak.lock().remove(handle.0, "weak"));
        trace!(target: "vtbridge.handle", handle = handle.as_raw(), "weak handle released");
    }

    /// Number of strong tokens currently issued.
    pub fn live(&self) -> usize {
        self.strong.lock().live
    }

    /// Number of weak tokens currently issued.
    pub fn live_weak(&self) -> usize {
        self.weak.lock().live
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The table every native descriptor resolves through.
pub static HANDLES: HandleTable = HandleTable::new();
