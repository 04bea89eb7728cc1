//! The prioritized transmission scheduler: a pure, bus-agnostic queue of
//! pending exchanges with per-recipient ordering guarantees.
use embassy_time::{Duration, Instant};

use crate::error::ScheduleError;
use crate::protocol::scheduling::transmission::{Transmission, TransmissionId, TransmissionRequest};
use crate::protocol::scheduling::NUM_PRIORITIES;
use crate::protocol::transport::address::MapleAddress;

//==================================================================================CADENCE

/// Advance `offset` by the smallest number of whole `period`s needed to
/// land strictly after `now`.
///
/// The result is always `> now` and congruent to `offset` modulo `period`,
/// preserving phase alignment even when many periods were missed.
pub fn compute_next_cadence(now: Instant, period: Duration, offset: Instant) -> Instant {
    if offset > now {
        return offset;
    }
    let elapsed = now.duration_since(offset).as_micros();
    let periods = elapsed / period.as_micros() + 1;
    offset + Duration::from_micros(periods * period.as_micros())
}

//==================================================================================CURSOR
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Handle to a peeked entry; stale cursors (entry cancelled or re-queued in
/// between) are detected by the id snapshot and simply miss.
pub struct TxCursor {
    index: usize,
    id: TransmissionId,
}

//==================================================================================SCHEDULER
/// Fixed-capacity prioritized transmission queue.
///
/// Entries live in a slab of `CAP` slots; every lookup is a linear scan.
/// Priority levels and per-bucket population are small by construction
/// (three levels, tens of entries), so no ordering structure is maintained
/// beyond the records themselves.
pub struct TransmissionScheduler<const CAP: usize> {
    host_addr: MapleAddress,
    slots: [Option<Transmission>; CAP],
    next_id: TransmissionId,
}

impl<const CAP: usize> TransmissionScheduler<CAP> {
    /// Scheduler for one bus; `host_addr` is stamped as the sender of every
    /// queued packet.
    pub fn new(host_addr: MapleAddress) -> Self {
        Self {
            host_addr,
            slots: core::array::from_fn(|_| None),
            next_id: 0,
        }
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Queue a transmission. Stamps the packet's sender address and the
    /// entry's unique id; fails on an invalid recipient byte, a full slab,
    /// or id-space exhaustion (practically unreachable).
    pub fn add(&mut self, request: TransmissionRequest) -> Result<TransmissionId, ScheduleError> {
        let mut packet = request.packet.clone();
        packet.frame.sender = self.host_addr.to_byte();
        let recipient = MapleAddress::from_byte(packet.frame.recipient)?;

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(ScheduleError::IdSpaceExhausted)?;

        let estimated_duration = request.estimated_duration();
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(ScheduleError::QueueFull)?;
        *slot = Some(Transmission {
            id,
            priority: request.priority.min(NUM_PRIORITIES - 1),
            packet,
            recipient,
            expect_response: request.expect_response,
            expected_response_words: request.expected_response_words,
            repeat_period: request.repeat_period,
            repeat_until: request.repeat_until,
            next_due: request.next_due,
            estimated_duration,
        });
        Ok(id)
    }

    /// Read access to a peeked entry.
    pub fn get(&self, cursor: &TxCursor) -> Option<&Transmission> {
        match self.slots.get(cursor.index)? {
            Some(tx) if tx.id == cursor.id => Some(tx),
            _ => None,
        }
    }

    /// Select the next transmission to put on the wire.
    ///
    /// Buckets are scanned from highest priority to lowest; the candidate of
    /// a bucket is its earliest `(due, id)` entry that is ready
    /// (`next_due <= now`). A candidate is passed over when:
    ///
    /// - an earlier `(due, id)` entry for the *same* recipient exists in any
    ///   bucket — a recipient's requests are never reordered, regardless of
    ///   which priority bucket they sit in; or
    /// - running it to completion (`now + estimated_duration`) would overlap
    ///   the due time of a waiting higher-priority entry for a *different*
    ///   recipient — urgent traffic must find the bus free.
    ///
    /// Every call walks the slab once per level; capacities are bounded by
    /// construction and the scan stays trivially cheap.
    pub fn peek_next(&self, now: Instant) -> Option<TxCursor> {
        for priority in 0..NUM_PRIORITIES {
            let Some(index) = self.earliest_in_bucket(priority) else {
                continue;
            };
            let Some(candidate) = &self.slots[index] else {
                continue;
            };
            if candidate.next_due > now {
                continue;
            }
            if self.has_earlier_same_recipient(candidate) {
                continue;
            }
            if self.blocked_by_higher_priority(candidate, now) {
                continue;
            }
            return Some(TxCursor {
                index,
                id: candidate.id,
            });
        }
        None
    }

    /// Remove a peeked entry and hand it out. An auto-repeating entry still
    /// inside its repeat window is immediately re-queued (same id) at the
    /// next cadence point past `now`.
    pub fn pop(&mut self, cursor: TxCursor, now: Instant) -> Option<Transmission> {
        let slot = self.slots.get_mut(cursor.index)?;
        match slot {
            Some(tx) if tx.id == cursor.id => {}
            _ => return None,
        }
        let tx = slot.take()?;
        if let Some(period) = tx.repeat_period {
            let within_window = tx.repeat_until.map_or(true, |end| now < end);
            if within_window {
                let mut requeued = tx.clone();
                requeued.next_due = compute_next_cadence(now, period, tx.next_due);
                *slot = Some(requeued);
            }
        }
        Some(tx)
    }

    /// Cancel one entry. Returns whether it existed.
    pub fn cancel_by_id(&mut self, id: TransmissionId) -> bool {
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(tx) if tx.id == id) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Cancel every entry addressed to `recipient`. Returns the count.
    pub fn cancel_by_recipient(&mut self, recipient: MapleAddress) -> usize {
        let mut cancelled = 0;
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(tx) if tx.recipient == recipient) {
                *slot = None;
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Number of queued entries addressed to `recipient`.
    pub fn count_recipients(&self, recipient: MapleAddress) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|tx| tx.recipient == recipient)
            .count()
    }

    /// Drop everything. Returns the count.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for slot in self.slots.iter_mut() {
            if slot.take().is_some() {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Restricted facade handed to peripheral function drivers.
    pub fn queue(&mut self) -> TxQueue<'_, CAP> {
        TxQueue { inner: self }
    }

    //==================================================================================Scan helpers

    fn earliest_in_bucket(&self, priority: u8) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|tx| (index, tx)))
            .filter(|(_, tx)| tx.priority == priority)
            .min_by_key(|(_, tx)| (tx.next_due, tx.id))
            .map(|(index, _)| index)
    }

    fn has_earlier_same_recipient(&self, candidate: &Transmission) -> bool {
        self.slots.iter().flatten().any(|tx| {
            tx.recipient == candidate.recipient
                && (tx.next_due, tx.id) < (candidate.next_due, candidate.id)
        })
    }

    fn blocked_by_higher_priority(&self, candidate: &Transmission, now: Instant) -> bool {
        let completion = now + candidate.estimated_duration;
        self.slots.iter().flatten().any(|tx| {
            tx.priority < candidate.priority
                && tx.recipient != candidate.recipient
                && tx.next_due < completion
        })
    }
}

//==================================================================================TX_QUEUE
/// The only scheduler surface peripheral function drivers are allowed to
/// touch: queueing and cancellation, never peek/pop.
pub struct TxQueue<'a, const CAP: usize> {
    inner: &'a mut TransmissionScheduler<CAP>,
}

impl<'a, const CAP: usize> TxQueue<'a, CAP> {
    pub fn add(&mut self, request: TransmissionRequest) -> Result<TransmissionId, ScheduleError> {
        self.inner.add(request)
    }

    pub fn cancel_by_id(&mut self, id: TransmissionId) -> bool {
        self.inner.cancel_by_id(id)
    }

    pub fn cancel_by_recipient(&mut self, recipient: MapleAddress) -> usize {
        self.inner.cancel_by_recipient(recipient)
    }

    pub fn count_recipients(&self, recipient: MapleAddress) -> usize {
        self.inner.count_recipients(recipient)
    }
}

//==================================================================================TESTS
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
