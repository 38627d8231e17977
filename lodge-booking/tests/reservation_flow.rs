use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use lodge_booking::{BookingEngine, BookingService, CoordinatorConfig, CreateBookingRequest, RoomRequest};
use lodge_core::{CoreError, ReservationStore, Transaction};
use lodge_shared::{BookingStatus, NewRoomLock, StayRange};
use lodge_store::{FaultPoint, MemoryReservationStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn request(room_ids: &[Uuid], check_in: NaiveDate, check_out: NaiveDate) -> CreateBookingRequest {
    CreateBookingRequest {
        user_id: 11,
        hotel_id: Uuid::nil(),
        check_in,
        check_out,
        guest_name: "Margaret Hamilton".to_string(),
        guest_email: None,
        guest_phone: None,
        currency: "USD".to_string(),
        expected_total: None,
        rooms: room_ids
            .iter()
            .map(|room_id| RoomRequest {
                room_id: *room_id,
                adults: 2,
                children: 0,
                price_per_night: Decimal::new(120, 0),
            })
            .collect(),
    }
}

fn engine(config: CoordinatorConfig) -> (Arc<MemoryReservationStore>, BookingService<MemoryReservationStore>) {
    let store = Arc::new(MemoryReservationStore::new());
    let service = BookingService::new(Arc::clone(&store), config);
    (store, service)
}

#[tokio::test]
async fn test_induced_failures_leave_no_partial_booking() {
    let rooms = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let faults = [
        (FaultPoint::BeginTx, 0),
        (FaultPoint::CreateBooking, 0),
        (FaultPoint::CreateBookingRoom, 0),
        (FaultPoint::CreateBookingRoom, 2),
        (FaultPoint::CreateRoomLock, 0),
        (FaultPoint::CreateRoomLock, 1),
        (FaultPoint::CreateRoomLock, 2),
        (FaultPoint::Commit, 0),
    ];

    for (point, skip) in faults {
        let (store, service) = engine(CoordinatorConfig::default());
        store.inject_fault(point, skip);

        let result = service
            .create_booking(request(&rooms, date(2024, 4, 1), date(2024, 4, 3)), &CancellationToken::new())
            .await;

        assert!(result.is_err(), "fault at {:?}/{} should fail the booking", point, skip);
        assert_eq!(store.booking_count(), 0, "fault at {:?}/{}", point, skip);
        assert_eq!(store.booking_room_count(), 0, "fault at {:?}/{}", point, skip);
        assert_eq!(store.room_lock_count(), 0, "fault at {:?}/{}", point, skip);

        // The failed attempt must not keep the rooms held
        let retry = service
            .create_booking(request(&rooms, date(2024, 4, 1), date(2024, 4, 3)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.booking_count(), 1);
        assert_eq!(store.booking_room_count(), 3);
        assert_eq!(store.room_lock_count(), 3);
        assert_eq!(retry.final_total, Decimal::new(720, 0));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overlapping_bookings_one_wins() {
    let (store, service) = engine(CoordinatorConfig::default());
    let service = Arc::new(service);
    let room_id = Uuid::new_v4();

    let a = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .create_booking(request(&[room_id], date(2024, 7, 1), date(2024, 7, 5)), &CancellationToken::new())
                .await
        })
    };
    let b = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .create_booking(request(&[room_id], date(2024, 7, 3), date(2024, 7, 8)), &CancellationToken::new())
                .await
        })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| *r == Err(CoreError::RoomLockAlreadyExist { room_id })));
    assert_eq!(store.booking_count(), 1);
    assert_eq!(store.room_lock_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_requests_keep_locks_disjoint() {
    let (store, service) = engine(CoordinatorConfig::default());
    let service = Arc::new(service);
    let room_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for offset in 0..16u32 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let check_in = date(2024, 9, 1 + offset % 8);
            let check_out = check_in + ChronoDuration::days(2);
            service
                .create_booking(request(&[room_id], check_in, check_out), &CancellationToken::new())
                .await
        }));
    }
    for handle in handles {
        let _ = handle.await.unwrap();
    }

    let now = Utc::now();
    let live: Vec<_> = store
        .locks_for_room(room_id)
        .into_iter()
        .filter(|l| l.is_live(now))
        .collect();
    assert!(!live.is_empty());
    for (i, a) in live.iter().enumerate() {
        for b in &live[i + 1..] {
            assert!(!a.stay_range.overlaps(&b.stay_range), "{:?} overlaps {:?}", a.stay_range, b.stay_range);
        }
    }
}

#[tokio::test]
async fn test_adjacent_stays_share_a_room() {
    let (_, service) = engine(CoordinatorConfig::default());
    let room_id = Uuid::new_v4();
    let cancel = CancellationToken::new();

    service
        .create_booking(request(&[room_id], date(2024, 3, 1), date(2024, 3, 3)), &cancel)
        .await
        .unwrap();
    service
        .create_booking(request(&[room_id], date(2024, 3, 3), date(2024, 3, 5)), &cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancellation_frees_the_range() {
    let (_, service) = engine(CoordinatorConfig::default());
    let room_id = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let first = service
        .create_booking(request(&[room_id], date(2024, 5, 1), date(2024, 5, 4)), &cancel)
        .await
        .unwrap();
    let blocked = service
        .create_booking(request(&[room_id], date(2024, 5, 2), date(2024, 5, 3)), &cancel)
        .await;
    assert_eq!(blocked, Err(CoreError::RoomLockAlreadyExist { room_id }));

    let cancelled = service
        .update_booking_status(first.id, BookingStatus::Cancelled, &cancel)
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    service
        .create_booking(request(&[room_id], date(2024, 5, 2), date(2024, 5, 3)), &cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expired_lock_does_not_block() {
    let (store, service) = engine(CoordinatorConfig::default());
    let room_id = Uuid::new_v4();
    let an_hour_ago = Utc::now() - ChronoDuration::hours(1);

    store.seed_lock(
        NewRoomLock {
            room_id,
            booking_id: Uuid::new_v4(),
            stay_range: StayRange::new(date(2024, 10, 1), date(2024, 10, 10)),
            expires_at: an_hour_ago + ChronoDuration::minutes(15),
        }
        .into_room_lock(Uuid::new_v4(), an_hour_ago),
    );

    service
        .create_booking(request(&[room_id], date(2024, 10, 2), date(2024, 10, 4)), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_empty_room_list_fails_before_any_write() {
    let (store, service) = engine(CoordinatorConfig::default());
    store.inject_fault(FaultPoint::BeginTx, 0);

    let err = service
        .create_booking(request(&[], date(2024, 1, 1), date(2024, 1, 2)), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::EmptyRoomList);

    // The BeginTx fault is still armed, so no transaction was opened
    let err = service
        .create_booking(request(&[Uuid::new_v4()], date(2024, 1, 1), date(2024, 1, 2)), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InternalServer(_)));
}

#[tokio::test]
async fn test_invalid_dates_fail_before_any_write() {
    let (store, service) = engine(CoordinatorConfig::default());

    let err = service
        .create_booking(request(&[Uuid::new_v4()], date(2024, 1, 1), date(2024, 1, 1)), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::InvalidDates);
    assert_eq!(store.booking_count(), 0);
}

#[tokio::test]
async fn test_confirm_then_no_further_transitions() {
    let (store, service) = engine(CoordinatorConfig::default());
    let room_id = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let booking = service
        .create_booking(request(&[room_id], date(2024, 6, 1), date(2024, 6, 2)), &cancel)
        .await
        .unwrap();
    let confirmed = service
        .update_booking_status(booking.id, BookingStatus::Confirmed, &cancel)
        .await
        .unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert!(store.locks_for_room(room_id).iter().all(|l| !l.is_active && l.confirmed));

    let err = service
        .update_booking_status(booking.id, BookingStatus::Cancelled, &cancel)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CoreError::InvalidStatusTransition {
            from: BookingStatus::Confirmed,
            to: BookingStatus::Cancelled,
        }
    );

    let err = service
        .update_booking_status(Uuid::new_v4(), BookingStatus::Confirmed, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::BookingNotFound(_)));
}

#[tokio::test]
async fn test_confirming_a_lapsed_hold_fails() {
    let config = CoordinatorConfig {
        hold_window: Duration::ZERO,
        ..CoordinatorConfig::default()
    };
    let (store, service) = engine(config);
    let cancel = CancellationToken::new();

    let booking = service
        .create_booking(request(&[Uuid::new_v4()], date(2024, 6, 1), date(2024, 6, 2)), &cancel)
        .await
        .unwrap();

    let err = service
        .update_booking_status(booking.id, BookingStatus::Confirmed, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::HoldExpired(booking.id));
    assert_eq!(service.get_booking(booking.id).await.unwrap().status, BookingStatus::Pending);
    assert_eq!(store.booking_count(), 1);
}

#[tokio::test]
async fn test_confirmed_booking_keeps_its_room() {
    let (store, service) = engine(CoordinatorConfig::default());
    let room_id = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let booking = service
        .create_booking(request(&[room_id], date(2024, 5, 1), date(2024, 5, 4)), &cancel)
        .await
        .unwrap();
    service
        .update_booking_status(booking.id, BookingStatus::Confirmed, &cancel)
        .await
        .unwrap();

    for (check_in, check_out) in [
        (date(2024, 5, 1), date(2024, 5, 4)),
        (date(2024, 4, 28), date(2024, 5, 2)),
        (date(2024, 5, 3), date(2024, 5, 9)),
    ] {
        let second = service
            .create_booking(request(&[room_id], check_in, check_out), &cancel)
            .await;
        assert_eq!(second, Err(CoreError::RoomLockAlreadyExist { room_id }));
    }
    assert_eq!(store.booking_count(), 1);

    // The reaper sweep leaves confirmed stays alone
    store.deactivate_expired_locks(Utc::now() + ChronoDuration::days(1)).await.unwrap();
    let again = service
        .create_booking(request(&[room_id], date(2024, 5, 2), date(2024, 5, 3)), &cancel)
        .await;
    assert_eq!(again, Err(CoreError::RoomLockAlreadyExist { room_id }));

    service
        .create_booking(request(&[room_id], date(2024, 5, 4), date(2024, 5, 6)), &cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_confirm_write_rejects_a_retaken_room() {
    let (store, service) = engine(CoordinatorConfig::default());
    let room_id = Uuid::new_v4();
    let lapsed_booking = Uuid::new_v4();
    let an_hour_ago = Utc::now() - ChronoDuration::hours(1);

    store.seed_lock(
        NewRoomLock {
            room_id,
            booking_id: lapsed_booking,
            stay_range: StayRange::new(date(2024, 5, 1), date(2024, 5, 4)),
            expires_at: an_hour_ago + ChronoDuration::minutes(15),
        }
        .into_room_lock(Uuid::new_v4(), an_hour_ago),
    );

    service
        .create_booking(request(&[room_id], date(2024, 5, 2), date(2024, 5, 3)), &CancellationToken::new())
        .await
        .unwrap();

    // Confirming the lapsed hold now must lose to the newer lock
    let mut tx = store.begin_tx().await.unwrap();
    let err = store.confirm_locks(&mut tx, lapsed_booking).await.unwrap_err();
    assert_eq!(err, CoreError::RoomLockAlreadyExist { room_id });
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_cancellation_token_rolls_back() {
    let (store, service) = engine(CoordinatorConfig::default());
    store.set_latency(Duration::from_millis(50));
    let service = Arc::new(service);
    let rooms = [Uuid::new_v4(), Uuid::new_v4()];

    let cancel = CancellationToken::new();
    let handle = {
        let service = Arc::clone(&service);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            service
                .create_booking(request(&rooms, date(2024, 11, 1), date(2024, 11, 3)), &cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(170)).await;
    cancel.cancel();

    assert_eq!(handle.await.unwrap(), Err(CoreError::Cancelled));
    assert_eq!(store.booking_count(), 0);
    assert_eq!(store.room_lock_count(), 0);

    store.set_latency(Duration::ZERO);
    service
        .create_booking(request(&rooms, date(2024, 11, 1), date(2024, 11, 3)), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_deadline_rolls_back() {
    let config = CoordinatorConfig {
        operation_timeout: Duration::from_millis(60),
        ..CoordinatorConfig::default()
    };
    let (store, service) = engine(config);
    store.set_latency(Duration::from_millis(40));

    let err = service
        .create_booking(request(&[Uuid::new_v4()], date(2024, 12, 1), date(2024, 12, 3)), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::DeadlineExceeded);
    assert_eq!(store.booking_count(), 0);
    assert_eq!(store.room_lock_count(), 0);
}
