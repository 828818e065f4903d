//! Note this only contains [`AssumeUnlockable`] which is not generally recommended.
//! Use of the `spin` crate's mutex with [`Segallock`](crate::Segallock) is a good default.

/// #### WARNING: [`AssumeUnlockable`] may cause undefined behaviour without `unsafe` code!
///
/// A dummy [`RawMutex`](lock_api::RawMutex) implementation to skip synchronization
/// for single threaded programs, such as those using the C interface.
///
/// # Safety
/// [`AssumeUnlockable`] is highly unsafe and may cause undefined behaviour if multiple
/// threads enter a critical section it guards, even without explicit unsafe code.
///
/// Note that uncontended spin locks are cheap. Usage is only recommended on
/// platforms that don't have atomics or are exclusively single threaded.
pub struct AssumeUnlockable;

// SAFETY: nope
unsafe impl lock_api::RawMutex for AssumeUnlockable {
    const INIT: AssumeUnlockable = AssumeUnlockable;

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {}

    fn try_lock(&self) -> bool {
        true
    }

    unsafe fn unlock(&self) {}
}
