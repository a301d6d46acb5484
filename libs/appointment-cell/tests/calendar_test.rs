mod common;

use std::sync::Arc;

use appointment_cell::error::BookingError;
use appointment_cell::models::{AppointmentStatus, CalendarQuery, CallerIdentity, Role};
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::calendar::CalendarService;
use appointment_cell::store::MemoryStore;

use common::*;

/// Student 1 with doctor 10 at 09:00 (approved), student 2 with doctor 11 at
/// 11:00 the next day (pending, empty reason).
async fn booked_clinic() -> Arc<MemoryStore> {
    let store = clinic().await;
    add_slot(&store, 1, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;
    add_slot(&store, 2, OTHER_DOCTOR, at(3, 11, 0), at(3, 11, 30)).await;
    add_slot(&store, 3, DOCTOR, at(4, 9, 0), at(4, 9, 30)).await;

    let manager = AppointmentBookingService::new(store.clone());
    let first = manager.create(&staff(), booking(STUDENT, DOCTOR, 1)).await.unwrap();
    manager.approve(&staff(), first.id).await.unwrap();

    let mut second = booking(OTHER_STUDENT, OTHER_DOCTOR, 2);
    second.reason = None;
    manager.create(&staff(), second).await.unwrap();

    store
}

#[tokio::test]
async fn test_staff_see_everything_in_start_order() {
    let store = booked_clinic().await;

    let events = CalendarService::new(store)
        .list_appointments(&staff(), &CalendarQuery::default())
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].extended_props.time_slot_id, 1);
    assert_eq!(events[1].extended_props.time_slot_id, 2);
}

#[tokio::test]
async fn test_students_and_doctors_see_their_own() {
    let store = booked_clinic().await;
    let calendar = CalendarService::new(store);

    let mine = calendar.list_appointments(&student(), &CalendarQuery::default()).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].extended_props.user_id, STUDENT);

    let other_doctor = CallerIdentity::new(OTHER_DOCTOR, Role::Doctor);
    let theirs = calendar.list_appointments(&other_doctor, &CalendarQuery::default()).await.unwrap();
    assert_eq!(theirs.len(), 1);
    assert_eq!(theirs[0].extended_props.doctor_id, OTHER_DOCTOR);
}

#[tokio::test]
async fn test_window_keeps_intersecting_slots() {
    let store = booked_clinic().await;
    let calendar = CalendarService::new(store);

    let window = CalendarQuery {
        start: Some(at(2, 9, 15)),
        end: Some(at(3, 11, 0)),
    };
    let events = calendar.list_appointments(&staff(), &window).await.unwrap();
    assert_eq!(events.iter().map(|e| e.extended_props.time_slot_id).collect::<Vec<_>>(), vec![1]);

    let open_ended = CalendarQuery { start: Some(at(3, 0, 0)), end: None };
    let events = calendar.list_appointments(&staff(), &open_ended).await.unwrap();
    assert_eq!(events.iter().map(|e| e.extended_props.time_slot_id).collect::<Vec<_>>(), vec![2]);
}

#[tokio::test]
async fn test_event_decoration() {
    let store = booked_clinic().await;

    let events = CalendarService::new(store)
        .list_appointments(&staff(), &CalendarQuery::default())
        .await
        .unwrap();

    let approved = &events[0];
    assert_eq!(approved.title, "Ana Cruz - Check-up");
    assert_eq!(approved.start, at(2, 9, 0));
    assert_eq!(approved.end, at(2, 9, 30));
    // branch 3 takes the fourth palette colour
    assert_eq!(approved.background_color, "#ffc107");
    assert_eq!(approved.border_color, "#ffc107");
    assert_eq!(approved.class_name, "appointment-approved");
    assert_eq!(approved.extended_props.doctor_name, "Maria Santos");
    assert_eq!(approved.extended_props.branch_name, "Main Campus");
    assert!(approved.extended_props.is_approved);

    let pending = &events[1];
    assert_eq!(pending.title, "Ben Reyes");
    assert_eq!(pending.extended_props.status, AppointmentStatus::Pending);
    assert!(!pending.extended_props.is_approved);

    let json = serde_json::to_value(approved).unwrap();
    assert!(json.get("backgroundColor").is_some());
    assert_eq!(json["extendedProps"]["userFullName"], "Ana Cruz");
}

#[tokio::test]
async fn test_get_appointment_view() {
    let store = booked_clinic().await;
    let calendar = CalendarService::new(store);

    let events = calendar.list_appointments(&student(), &CalendarQuery::default()).await.unwrap();
    let view = calendar.get_appointment(&student(), events[0].id).await.unwrap();

    assert_eq!(view.user_full_name, "Ana Cruz");
    assert_eq!(view.doctor_name, "Maria Santos");
    assert_eq!(view.branch_name, "Main Campus");
    assert_eq!(view.start_time, at(2, 9, 0));
    assert!(view.is_approved);
    assert!(view.formatted_time_range.ends_with("9:00 AM - 9:30 AM"));

    assert_eq!(
        calendar
            .get_appointment(&CallerIdentity::new(OTHER_STUDENT, Role::Student), events[0].id)
            .await,
        Err(BookingError::Forbidden)
    );
    assert_eq!(calendar.get_appointment(&staff(), 404).await, Err(BookingError::AppointmentNotFound));
}
