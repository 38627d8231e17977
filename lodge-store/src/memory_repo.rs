use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodge_core::{CoreError, CoreResult, ReservationStore, Transaction};
use lodge_shared::{
    Booking, BookingFilter, BookingPage, BookingRoom, BookingRoomWithLock, BookingStatus,
    GuestInfoUpdate, NewBooking, NewBookingRoom, NewRoomLock, RoomLock,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Points at which a test can make the in-memory store fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    BeginTx,
    CreateBooking,
    CreateBookingRoom,
    CreateRoomLock,
    Commit,
}

#[derive(Default)]
struct MemoryState {
    bookings: HashMap<Uuid, Booking>,
    rooms: Vec<BookingRoom>,
    locks: Vec<RoomLock>,
    /// Locks inserted by open transactions. They take part in the exclusion
    /// check right away, like index entries of an in-flight insert.
    uncommitted_locks: Vec<(u64, RoomLock)>,
    /// Confirmed copies of committed locks, written by open transactions.
    /// Like `uncommitted_locks` they block other writers straight away.
    pending_confirmations: Vec<(u64, RoomLock)>,
    /// booking id -> owning transaction, held from `get_booking_for_update` to commit/rollback.
    row_locks: HashMap<Uuid, u64>,
    next_tx_id: u64,
}

#[derive(Default)]
struct Inner {
    state: Mutex<MemoryState>,
    faults: Mutex<Vec<(FaultPoint, usize)>>,
    latency: Mutex<Duration>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn trip(&self, point: FaultPoint) -> CoreResult<()> {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = faults.iter().position(|(p, _)| *p == point) {
            if faults[pos].1 == 0 {
                faults.remove(pos);
                return Err(CoreError::InternalServer(format!("injected fault at {:?}", point)));
            }
            faults[pos].1 -= 1;
        }
        Ok(())
    }

    async fn delay(&self) {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Process-local store with the same transactional guarantees as the
/// Postgres one: buffered writes, all-or-nothing commit, lock exclusion
/// checked on insert. Used by tests and by local runs without a database.
#[derive(Clone, Default)]
pub struct MemoryReservationStore {
    inner: Arc<Inner>,
}

pub struct MemoryTransaction {
    id: u64,
    store: Arc<Inner>,
    bookings: Vec<Booking>,
    rooms: Vec<BookingRoom>,
    status_updates: Vec<(Uuid, BookingStatus, DateTime<Utc>)>,
    deactivations: Vec<Uuid>,
    confirmations: Vec<Uuid>,
    finished: bool,
}

impl MemoryTransaction {
    fn release(&mut self, state: &mut MemoryState) {
        let id = self.id;
        state.uncommitted_locks.retain(|(owner, _)| *owner != id);
        state.pending_confirmations.retain(|(owner, _)| *owner != id);
        state.row_locks.retain(|_, owner| *owner != id);
        self.finished = true;
    }

    fn own_booking(&self, id: Uuid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let store = Arc::clone(&self.store);
            let mut state = store.state();
            self.release(&mut state);
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(mut self) -> CoreResult<()> {
        let store = Arc::clone(&self.store);
        store.trip(FaultPoint::Commit)?;

        let mut state = store.state();
        let id = self.id;

        for booking in self.bookings.drain(..) {
            state.bookings.insert(booking.id, booking);
        }
        state.rooms.append(&mut self.rooms);

        let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(&mut state.uncommitted_locks)
            .into_iter()
            .partition(|(owner, _)| *owner == id);
        state.uncommitted_locks = others;
        state.locks.extend(mine.into_iter().map(|(_, lock)| lock));

        for (booking_id, status, at) in self.status_updates.drain(..) {
            if let Some(booking) = state.bookings.get_mut(&booking_id) {
                booking.status = status;
                booking.updated_at = at;
            }
        }
        for booking_id in self.deactivations.drain(..) {
            for lock in state.locks.iter_mut().filter(|l| l.booking_id == booking_id) {
                lock.is_active = false;
            }
        }
        for booking_id in self.confirmations.drain(..) {
            for lock in state
                .locks
                .iter_mut()
                .filter(|l| l.booking_id == booking_id && l.is_active)
            {
                lock.is_active = false;
                lock.confirmed = true;
            }
        }

        self.release(&mut state);
        Ok(())
    }

    async fn rollback(mut self) -> CoreResult<()> {
        let store = Arc::clone(&self.store);
        let mut state = store.state();
        self.release(&mut state);
        Ok(())
    }
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `skip + 1`-th call that reaches `point`.
    pub fn inject_fault(&self, point: FaultPoint, skip: usize) {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((point, skip));
    }

    /// Delay applied to every transactional write.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Insert an already-committed lock, e.g. one whose hold has lapsed.
    pub fn seed_lock(&self, lock: RoomLock) {
        self.inner.state().locks.push(lock);
    }

    pub fn booking_count(&self) -> usize {
        self.inner.state().bookings.len()
    }

    pub fn booking_room_count(&self) -> usize {
        self.inner.state().rooms.len()
    }

    pub fn room_lock_count(&self) -> usize {
        self.inner.state().locks.len()
    }

    pub fn locks_for_room(&self, room_id: Uuid) -> Vec<RoomLock> {
        self.inner
            .state()
            .locks
            .iter()
            .filter(|l| l.room_id == room_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ReservationStore for MemoryReservationStore {
    type Tx = MemoryTransaction;

    async fn begin_tx(&self) -> CoreResult<MemoryTransaction> {
        self.inner.trip(FaultPoint::BeginTx)?;

        let mut state = self.inner.state();
        state.next_tx_id += 1;

        Ok(MemoryTransaction {
            id: state.next_tx_id,
            store: Arc::clone(&self.inner),
            bookings: Vec::new(),
            rooms: Vec::new(),
            status_updates: Vec::new(),
            deactivations: Vec::new(),
            confirmations: Vec::new(),
            finished: false,
        })
    }

    async fn create_booking(&self, tx: &mut MemoryTransaction, booking: &NewBooking) -> CoreResult<Booking> {
        self.inner.delay().await;
        self.inner.trip(FaultPoint::CreateBooking)?;

        let booking = booking.clone().into_booking(Uuid::new_v4(), Utc::now());
        tx.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn create_booking_room(
        &self,
        tx: &mut MemoryTransaction,
        room: &NewBookingRoom,
    ) -> CoreResult<BookingRoom> {
        self.inner.delay().await;
        self.inner.trip(FaultPoint::CreateBookingRoom)?;

        let booking_known = tx.own_booking(room.booking_id).is_some()
            || self.inner.state().bookings.contains_key(&room.booking_id);
        if !booking_known {
            return Err(CoreError::BookingNotFound(room.booking_id));
        }

        let room = room.clone().into_booking_room(Uuid::new_v4(), Utc::now());
        tx.rooms.push(room.clone());
        Ok(room)
    }

    async fn create_room_lock(&self, tx: &mut MemoryTransaction, lock: &NewRoomLock) -> CoreResult<RoomLock> {
        self.inner.delay().await;
        self.inner.trip(FaultPoint::CreateRoomLock)?;

        let now = Utc::now();
        let mut state = self.inner.state();

        let clash = state
            .locks
            .iter()
            .chain(state.uncommitted_locks.iter().map(|(_, l)| l))
            .chain(state.pending_confirmations.iter().map(|(_, l)| l))
            .any(|existing| existing.blocks(lock.room_id, &lock.stay_range, now));
        if clash {
            return Err(CoreError::RoomLockAlreadyExist { room_id: lock.room_id });
        }

        let lock = lock.clone().into_room_lock(Uuid::new_v4(), now);
        state.uncommitted_locks.push((tx.id, lock.clone()));
        Ok(lock)
    }

    async fn deactivate_locks(&self, tx: &mut MemoryTransaction, booking_id: Uuid) -> CoreResult<u64> {
        self.inner.delay().await;

        let state = self.inner.state();
        let committed = state
            .locks
            .iter()
            .filter(|l| l.booking_id == booking_id && l.is_active)
            .count();
        let own = state
            .uncommitted_locks
            .iter()
            .filter(|(owner, l)| *owner == tx.id && l.booking_id == booking_id)
            .count();
        drop(state);

        tx.deactivations.push(booking_id);
        Ok((committed + own) as u64)
    }

    async fn confirm_locks(&self, tx: &mut MemoryTransaction, booking_id: Uuid) -> CoreResult<u64> {
        self.inner.delay().await;

        let mut state = self.inner.state();
        let held: Vec<RoomLock> = state
            .locks
            .iter()
            .filter(|l| l.booking_id == booking_id && l.is_active)
            .chain(
                state
                    .uncommitted_locks
                    .iter()
                    .filter(|(owner, l)| *owner == tx.id && l.booking_id == booking_id)
                    .map(|(_, l)| l),
            )
            .cloned()
            .collect();

        // Same rule as the Postgres exclusion: the confirmed row's hold window
        // runs from its creation to forever.
        for lock in &held {
            let clash = state
                .locks
                .iter()
                .chain(
                    state
                        .uncommitted_locks
                        .iter()
                        .chain(state.pending_confirmations.iter())
                        .filter(|(owner, _)| *owner != tx.id)
                        .map(|(_, l)| l),
                )
                .any(|other| {
                    other.booking_id != booking_id
                        && other.room_id == lock.room_id
                        && other.stay_range.overlaps(&lock.stay_range)
                        && other.held_after(lock.created_at)
                });
            if clash {
                return Err(CoreError::RoomLockAlreadyExist { room_id: lock.room_id });
            }
        }

        for lock in &held {
            state.pending_confirmations.push((
                tx.id,
                RoomLock {
                    is_active: false,
                    confirmed: true,
                    ..lock.clone()
                },
            ));
        }
        drop(state);

        tx.confirmations.push(booking_id);
        Ok(held.len() as u64)
    }

    async fn get_booking_for_update(&self, tx: &mut MemoryTransaction, id: Uuid) -> CoreResult<Booking> {
        if let Some(own) = tx.own_booking(id) {
            return Ok(own.clone());
        }

        loop {
            let acquired = {
                let mut state = self.inner.state();
                let booking = state
                    .bookings
                    .get(&id)
                    .cloned()
                    .ok_or(CoreError::BookingNotFound(id))?;
                match state.row_locks.get(&id) {
                    Some(owner) if *owner != tx.id => None,
                    _ => {
                        state.row_locks.insert(id, tx.id);
                        Some(booking)
                    }
                }
            };

            if let Some(mut booking) = acquired {
                if let Some((_, status, at)) = tx.status_updates.iter().rev().find(|(b, _, _)| *b == id) {
                    booking.status = *status;
                    booking.updated_at = *at;
                }
                return Ok(booking);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn count_live_locks(
        &self,
        tx: &mut MemoryTransaction,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<u64> {
        if tx.deactivations.contains(&booking_id) || tx.confirmations.contains(&booking_id) {
            return Ok(0);
        }

        let state = self.inner.state();
        let committed = state
            .locks
            .iter()
            .filter(|l| l.booking_id == booking_id && l.is_live(now))
            .count();
        let own = state
            .uncommitted_locks
            .iter()
            .filter(|(owner, l)| *owner == tx.id && l.booking_id == booking_id && l.is_live(now))
            .count();

        Ok((committed + own) as u64)
    }

    async fn update_booking_status(
        &self,
        tx: &mut MemoryTransaction,
        id: Uuid,
        status: BookingStatus,
    ) -> CoreResult<DateTime<Utc>> {
        self.inner.delay().await;

        let now = Utc::now();
        if let Some(own) = tx.bookings.iter_mut().find(|b| b.id == id) {
            own.status = status;
            own.updated_at = now;
            return Ok(now);
        }
        if !self.inner.state().bookings.contains_key(&id) {
            return Err(CoreError::BookingNotFound(id));
        }

        tx.status_updates.push((id, status, now));
        Ok(now)
    }

    async fn update_guest_info(&self, id: Uuid, update: &GuestInfoUpdate) -> CoreResult<()> {
        let mut state = self.inner.state();
        let booking = state.bookings.get_mut(&id).ok_or(CoreError::BookingNotFound(id))?;

        booking.guest_name = update.guest_name.clone();
        booking.guest_email = update.guest_email.clone();
        booking.guest_phone = update.guest_phone.clone();
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_booking(&self, id: Uuid) -> CoreResult<()> {
        let mut state = self.inner.state();
        if state.bookings.remove(&id).is_none() {
            return Err(CoreError::BookingNotFound(id));
        }
        state.rooms.retain(|r| r.booking_id != id);
        state.locks.retain(|l| l.booking_id != id);
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Booking> {
        self.inner
            .state()
            .bookings
            .get(&id)
            .cloned()
            .ok_or(CoreError::BookingNotFound(id))
    }

    async fn get_booking_rooms(&self, booking_id: Uuid) -> CoreResult<Vec<BookingRoomWithLock>> {
        let state = self.inner.state();

        Ok(state
            .rooms
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .map(|room| BookingRoomWithLock {
                room: room.clone(),
                lock: state
                    .locks
                    .iter()
                    .find(|l| l.booking_id == booking_id && l.room_id == room.room_id)
                    .cloned(),
            })
            .collect())
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        limit: u64,
        offset: u64,
    ) -> CoreResult<BookingPage> {
        let state = self.inner.state();

        let mut matching: Vec<&Booking> = state.bookings.values().filter(|b| filter.matches(b)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total_count = matching.len() as u64;
        let bookings = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(BookingPage { bookings, total_count })
    }

    async fn find_lapsed_pending_bookings(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> CoreResult<Vec<Uuid>> {
        let state = self.inner.state();

        let mut lapsed: Vec<&Booking> = state
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending)
            .filter(|b| !state.locks.iter().any(|l| l.booking_id == b.id && l.is_live(now)))
            .collect();
        lapsed.sort_by_key(|b| b.created_at);

        Ok(lapsed
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|b| b.id)
            .collect())
    }

    async fn deactivate_expired_locks(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let mut state = self.inner.state();
        let mut touched = 0;
        for lock in state.locks.iter_mut().filter(|l| l.is_active && l.expires_at <= now) {
            lock.is_active = false;
            touched += 1;
        }
        Ok(touched)
    }
}
