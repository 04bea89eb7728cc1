//! Scheduler ordering, preemption, cadence, and cancellation tests.
use super::*;
use crate::core::command;
use crate::protocol::scheduling::{PRIORITY_EXTERNAL, PRIORITY_MAIN, PRIORITY_SUB};
use crate::protocol::transport::frame::Frame;
use crate::protocol::transport::packet::Packet;
use crate::protocol::transport::address::PlayerIndex;

fn at(micros: u64) -> Instant {
    Instant::from_micros(micros)
}

fn host() -> MapleAddress {
    MapleAddress::host(PlayerIndex::new(0).unwrap())
}

fn main_addr() -> MapleAddress {
    MapleAddress::main_peripheral(PlayerIndex::new(0).unwrap())
}

fn sub_addr(slot: u8) -> MapleAddress {
    MapleAddress::sub_peripheral(PlayerIndex::new(0).unwrap(), slot).unwrap()
}

fn request_to(recipient: MapleAddress, priority: u8, due: Instant) -> TransmissionRequest {
    let packet = Packet::from_frame(Frame::new(
        command::GET_CONDITION,
        recipient.to_byte(),
        0xFF, // Overwritten by the scheduler.
    ));
    TransmissionRequest::new(priority, due, packet)
}

fn pop_next<const CAP: usize>(
    sched: &mut TransmissionScheduler<CAP>,
    now: Instant,
) -> Option<Transmission> {
    let cursor = sched.peek_next(now)?;
    sched.pop(cursor, now)
}

//==================================================================================Stamping

#[test]
fn test_add_stamps_sender_and_ids() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    let first = sched.add(request_to(main_addr(), PRIORITY_MAIN, at(0))).unwrap();
    let second = sched.add(request_to(main_addr(), PRIORITY_MAIN, at(0))).unwrap();
    assert_ne!(first, second);

    let tx = pop_next(&mut sched, at(0)).unwrap();
    assert_eq!(tx.packet.frame.sender, host().to_byte());
    assert_eq!(tx.recipient, main_addr());
}

#[test]
fn test_add_rejects_bad_recipient_byte() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    let packet = Packet::from_frame(Frame::new(command::GET_CONDITION, 0x21, 0x00));
    assert!(matches!(
        sched.add(TransmissionRequest::new(PRIORITY_MAIN, at(0), packet)),
        Err(ScheduleError::InvalidRecipient(_))
    ));
}

#[test]
fn test_add_full_slab() {
    let mut sched: TransmissionScheduler<2> = TransmissionScheduler::new(host());
    sched.add(request_to(main_addr(), PRIORITY_MAIN, at(0))).unwrap();
    sched.add(request_to(main_addr(), PRIORITY_MAIN, at(1))).unwrap();
    assert_eq!(
        sched.add(request_to(main_addr(), PRIORITY_MAIN, at(2))),
        Err(ScheduleError::QueueFull)
    );
}

//==================================================================================Ordering

#[test]
/// Same-priority entries pop in non-decreasing due-time order.
fn test_same_priority_due_time_order() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    // Distinct recipients so only due time decides.
    sched.add(request_to(sub_addr(1), PRIORITY_SUB, at(300))).unwrap();
    sched.add(request_to(sub_addr(0), PRIORITY_SUB, at(100))).unwrap();
    sched.add(request_to(sub_addr(2), PRIORITY_SUB, at(200))).unwrap();

    let now = at(1_000);
    let mut due_times = [0u64; 3];
    for slot in due_times.iter_mut() {
        *slot = pop_next(&mut sched, now).unwrap().next_due.as_micros();
    }
    assert_eq!(due_times, [100, 200, 300]);
    assert!(sched.is_empty());
}

#[test]
/// Equal due times fall back to insertion (id) order.
fn test_equal_due_insertion_order() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    let first = sched.add(request_to(sub_addr(0), PRIORITY_SUB, at(100))).unwrap();
    let second = sched.add(request_to(sub_addr(1), PRIORITY_SUB, at(100))).unwrap();
    assert_eq!(pop_next(&mut sched, at(100)).unwrap().id, first);
    assert_eq!(pop_next(&mut sched, at(100)).unwrap().id, second);
}

#[test]
/// A ready higher-priority entry always runs before a ready lower one.
fn test_higher_priority_runs_first() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    sched.add(request_to(sub_addr(0), PRIORITY_SUB, at(50))).unwrap();
    let urgent = sched.add(request_to(main_addr(), PRIORITY_MAIN, at(80))).unwrap();
    assert_eq!(pop_next(&mut sched, at(100)).unwrap().id, urgent);
}

#[test]
/// A lower-priority entry is held back when a higher-priority entry for a
/// different recipient falls due before it would complete.
fn test_imminent_higher_priority_blocks_lower() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    // ~40 bits on the wire: the estimate rounds up to 20 us.
    sched.add(request_to(sub_addr(0), PRIORITY_SUB, at(100))).unwrap();
    let urgent = sched.add(request_to(main_addr(), PRIORITY_MAIN, at(110))).unwrap();

    // At t=100 the sub entry is ready, but main falls due at 110 < 100+20.
    assert!(sched.peek_next(at(100)).is_none());

    // Once the urgent entry has run, the sub entry is free to go.
    let cursor = sched.peek_next(at(110)).unwrap();
    assert_eq!(sched.pop(cursor, at(110)).unwrap().id, urgent);
    assert!(pop_next(&mut sched, at(110)).is_some());
}

#[test]
/// A lower-priority entry whose exchange finishes before the higher one
/// falls due is not held back.
fn test_distant_higher_priority_does_not_block() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    let background = sched.add(request_to(sub_addr(0), PRIORITY_SUB, at(100))).unwrap();
    sched.add(request_to(main_addr(), PRIORITY_MAIN, at(10_000))).unwrap();
    assert_eq!(pop_next(&mut sched, at(100)).unwrap().id, background);
}

#[test]
/// Two entries for the same recipient are never reordered, even when the
/// later one sits in a higher-priority bucket.
fn test_same_recipient_fifo_across_buckets() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    let polled = sched.add(request_to(main_addr(), PRIORITY_MAIN, at(100))).unwrap();
    let stolen = sched.add(request_to(main_addr(), PRIORITY_EXTERNAL, at(150))).unwrap();

    // Both ready; the earlier main-bucket entry must still go first.
    assert_eq!(pop_next(&mut sched, at(200)).unwrap().id, polled);
    assert_eq!(pop_next(&mut sched, at(200)).unwrap().id, stolen);
}

//==================================================================================Cadence

#[test]
fn test_cadence_always_future_and_congruent() {
    let period = Duration::from_micros(1_000);
    for (now, offset, expected) in [
        (100u64, 100u64, 1_100u64),
        (999, 100, 1_100),
        (1_100, 100, 2_100),
        // Many missed periods collapse into one recompute.
        (987_654, 100, 988_100),
        // A future offset is already a valid cadence point.
        (100, 500, 500),
    ] {
        let next = compute_next_cadence(at(now), period, at(offset));
        assert!(next > at(now));
        assert_eq!(next.as_micros() % 1_000, offset % 1_000);
        assert_eq!(next, at(expected));
    }
}

#[test]
/// Popping an auto-repeating entry re-queues the same logical entry at the
/// next cadence point.
fn test_pop_requeues_repeating_entry() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    let request = request_to(sub_addr(0), PRIORITY_SUB, at(100))
        .repeating(Duration::from_micros(1_000));
    let id = sched.add(request).unwrap();

    let popped = pop_next(&mut sched, at(100)).unwrap();
    assert_eq!(popped.id, id);
    assert_eq!(sched.len(), 1);

    // Not due again until the next cadence point.
    assert!(sched.peek_next(at(500)).is_none());
    let again = pop_next(&mut sched, at(1_100)).unwrap();
    assert_eq!(again.id, id);
    assert_eq!(again.next_due, at(1_100));
}

#[test]
fn test_repeat_window_end_stops_requeue() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    let request = request_to(sub_addr(0), PRIORITY_SUB, at(100))
        .repeating(Duration::from_micros(1_000))
        .until(at(1_050));
    sched.add(request).unwrap();

    // First pop at t=100: still inside the window, re-queued for t=1100.
    assert!(pop_next(&mut sched, at(100)).is_some());
    assert_eq!(sched.len(), 1);

    // Second pop at t=1100: past the window end, gone for good.
    assert!(pop_next(&mut sched, at(1_100)).is_some());
    assert!(sched.is_empty());
}

//==================================================================================Cancellation

#[test]
fn test_cancel_by_id_and_stale_cursor() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    let id = sched.add(request_to(main_addr(), PRIORITY_MAIN, at(0))).unwrap();
    let cursor = sched.peek_next(at(0)).unwrap();

    assert!(sched.cancel_by_id(id));
    assert!(!sched.cancel_by_id(id));
    // The cursor now points at nothing.
    assert!(sched.pop(cursor, at(0)).is_none());
}

#[test]
fn test_cancel_by_recipient_and_counts() {
    let mut sched: TransmissionScheduler<8> = TransmissionScheduler::new(host());
    sched.add(request_to(main_addr(), PRIORITY_MAIN, at(0))).unwrap();
    sched.add(request_to(main_addr(), PRIORITY_EXTERNAL, at(5))).unwrap();
    sched.add(request_to(sub_addr(0), PRIORITY_SUB, at(10))).unwrap();

    assert_eq!(sched.count_recipients(main_addr()), 2);
    assert_eq!(sched.count_recipients(sub_addr(0)), 1);
    assert_eq!(sched.cancel_by_recipient(main_addr()), 2);
    assert_eq!(sched.count_recipients(main_addr()), 0);
    assert_eq!(sched.len(), 1);
    assert_eq!(sched.cancel_all(), 1);
    assert!(sched.is_empty());
}
