// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Interception registry entries.
//!
//! A [`Slot`] is one mutable entry point of the host. Host code always calls
//! through the slot's current value; the relay swaps that value for a wrapper
//! and later puts the original back. The original is snapshotted at the first
//! install so wrapping is never applied twice and restoring always lands on
//! the pre-activation primitive.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

struct SlotState<T: ?Sized> {
    current: Arc<T>,
    /// Snapshot taken at install time. `Some` means the slot is patched.
    original: Option<Arc<T>>,
}

pub struct Slot<T: ?Sized> {
    state: RwLock<SlotState<T>>,
    // serializes install/restore so two installs cannot both observe "unpatched"
    patch_lock: Mutex<()>,
}

impl<T: ?Sized> Slot<T> {
    pub fn new(primitive: Arc<T>) -> Self {
        Slot {
            state: RwLock::new(SlotState {
                current: primitive,
                original: None,
            }),
            patch_lock: Mutex::new(()),
        }
    }

    /// The primitive host calls currently go through.
    pub fn get(&self) -> Arc<T> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.current)
    }

    /// The unwrapped primitive: the install-time snapshot when patched,
    /// the current value otherwise.
    pub fn original(&self) -> Arc<T> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(state.original.as_ref().unwrap_or(&state.current))
    }

    pub fn is_patched(&self) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.original.is_some()
    }

    /// Replaces the host's own primitive.
    ///
    /// Any installed wrapper is discarded along with its snapshot; the next
    /// activation wraps the replacement.
    pub fn replace(&self, primitive: Arc<T>) {
        let _guard = self.patch_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.current = primitive;
        state.original = None;
    }

    /// Wraps the current primitive. No-op when the slot is already patched.
    ///
    /// Returns whether a wrapper was installed.
    pub fn install<F>(&self, wrap: F) -> bool
    where
        F: FnOnce(Arc<T>) -> Arc<T>,
    {
        let _guard = self.patch_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let original = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if state.original.is_some() {
                return false;
            }
            Arc::clone(&state.current)
        };
        // built outside the state lock: the wrapper may call `get` on other slots
        let wrapper = wrap(Arc::clone(&original));
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.current = wrapper;
        state.original = Some(original);
        true
    }

    /// Puts the install-time snapshot back. No-op when not patched.
    ///
    /// Returns whether anything was restored.
    pub fn restore(&self) -> bool {
        let _guard = self.patch_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match state.original.take() {
            Some(original) => {
                state.current = original;
                true
            }
            None => false,
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("patched", &self.is_patched())
            .finish()
    }
}
